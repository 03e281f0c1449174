//! Background coordinator
//!
//! Routes panel requests to the agent of the active permitted page. With no
//! agent, or one that does not answer in time, the panel gets rest-state
//! defaults.

use super::{BusRequest, BusResponse};
use crate::agent::AgentHandle;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;

/// How long to wait for an agent reply
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_millis(1000);

#[derive(Default)]
struct Registry {
    agents: HashMap<String, AgentHandle>,
    active: Option<String>,
}

pub struct Coordinator {
    registry: Mutex<Registry>,
    reply_timeout: Duration,
}

impl Coordinator {
    pub fn new() -> Self {
        Self::with_reply_timeout(DEFAULT_REPLY_TIMEOUT)
    }

    pub fn with_reply_timeout(reply_timeout: Duration) -> Self {
        Self {
            registry: Mutex::new(Registry::default()),
            reply_timeout,
        }
    }

    /// Add an agent; the first one becomes active
    pub fn register(&self, agent: AgentHandle) {
        let mut registry = self.registry.lock();
        let page_id = agent.page_id().to_string();
        if registry.active.is_none() {
            registry.active = Some(page_id.clone());
        }
        tracing::info!("Agent registered for page {}", page_id);
        registry.agents.insert(page_id, agent);
    }

    /// Drop an agent; returns the handle so the caller decides when it ends
    pub fn unregister(&self, page_id: &str) -> Option<AgentHandle> {
        let mut registry = self.registry.lock();
        if registry.active.as_deref() == Some(page_id) {
            registry.active = None;
        }
        let removed = registry.agents.remove(page_id);
        if removed.is_some() {
            tracing::info!("Agent unregistered for page {}", page_id);
        }
        removed
    }

    /// Route requests to `page_id`; false when no agent is registered for it
    pub fn set_active(&self, page_id: &str) -> bool {
        let mut registry = self.registry.lock();
        if !registry.agents.contains_key(page_id) {
            return false;
        }
        if registry.active.as_deref() != Some(page_id) {
            tracing::debug!("Active page is now {}", page_id);
            registry.active = Some(page_id.to_string());
        }
        true
    }

    /// Stop routing; requests get rest-state replies until a page is active
    pub fn clear_active(&self) {
        if let Some(previous) = self.registry.lock().active.take() {
            tracing::debug!("Page {} is no longer active", previous);
        }
    }

    pub fn active_page(&self) -> Option<String> {
        self.registry.lock().active.clone()
    }

    pub fn page_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.registry.lock().agents.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Relay a request to the active agent
    pub async fn dispatch(&self, request: BusRequest) -> BusResponse {
        let agent = {
            let registry = self.registry.lock();
            registry
                .active
                .as_ref()
                .and_then(|id| registry.agents.get(id))
                .cloned()
        };

        let Some(agent) = agent else {
            tracing::debug!("No active agent for {:?}, replying with rest state", request);
            return BusResponse::rest_for(request);
        };

        match tokio::time::timeout(self.reply_timeout, agent.request(request)).await {
            Ok(Some(response)) => response,
            Ok(None) => {
                tracing::debug!("Agent for page {} is gone", agent.page_id());
                BusResponse::rest_for(request)
            }
            Err(_) => {
                tracing::warn!(
                    "Agent for page {} did not answer {:?} within {:?}",
                    agent.page_id(),
                    request,
                    self.reply_timeout
                );
                BusResponse::rest_for(request)
            }
        }
    }
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::new()
    }
}
