//! Page watcher
//!
//! Binds agents to browser tabs. Every scan lists the tabs over CDP, starts
//! an agent for each new tab whose URL is permitted, drops the agents of
//! tabs that closed, navigated or reloaded, and points the coordinator at
//! the foreground tab. A foreground tab that is not permitted leaves the
//! coordinator with no active page.

use crate::agent::{spawn_agent, AgentContext};
use crate::bus::Coordinator;
use crate::capture::CaptureBackend;
use crate::cdp::{self, CdpPage, PageTarget};
use crate::config::{GestureConfig, InjectorConfig};
use crate::gesture::CommandMap;
use crate::injector::{CommandInjector, PageError, PageSurface};
use async_trait::async_trait;
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// URL filter from a match pattern such as `http://127.0.0.1:50080/*`
///
/// `*` matches any run of characters; `<all_urls>` matches everything.
#[derive(Debug, Clone)]
pub struct PageMatcher {
    pattern: String,
    regex: Regex,
}

impl PageMatcher {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        let source = if pattern.trim() == "<all_urls>" {
            "^.*$".to_string()
        } else {
            let parts: Vec<String> = pattern.trim().split('*').map(regex::escape).collect();
            format!("^{}$", parts.join(".*"))
        };
        Ok(Self {
            pattern: pattern.to_string(),
            regex: Regex::new(&source)?,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn matches(&self, url: &str) -> bool {
        self.regex.is_match(url)
    }
}

/// Opens the page surface for a tab
#[async_trait]
pub trait PageConnector: Send + Sync {
    async fn connect(&self, target: &PageTarget) -> Result<Arc<dyn PageSurface>, PageError>;
}

/// Connects over the tab's DevTools WebSocket
pub struct CdpConnector;

#[async_trait]
impl PageConnector for CdpConnector {
    async fn connect(&self, target: &PageTarget) -> Result<Arc<dyn PageSurface>, PageError> {
        let ws_url = target
            .web_socket_debugger_url
            .as_deref()
            .ok_or_else(|| PageError::Unexpected(format!("tab {} is already being debugged", target.id)))?;
        let page = CdpPage::connect(ws_url).await?;
        Ok(Arc::new(page))
    }
}

/// Settings every new agent is started with
#[derive(Debug, Clone, Default)]
pub struct AgentTemplate {
    pub commands: CommandMap,
    pub gestures: GestureConfig,
    pub injector: InjectorConfig,
}

/// An agent bound to one document of a tab
struct RunningAgent {
    url: String,
    /// Marked on the document at attach time; gone after a reload
    token: String,
    surface: Arc<dyn PageSurface>,
    task: JoinHandle<()>,
}

pub struct PageWatcher {
    coordinator: Arc<Coordinator>,
    backend: Arc<dyn CaptureBackend>,
    connector: Arc<dyn PageConnector>,
    matcher: PageMatcher,
    template: AgentTemplate,
    agents: HashMap<String, RunningAgent>,
}

impl PageWatcher {
    pub fn new(
        coordinator: Arc<Coordinator>,
        backend: Arc<dyn CaptureBackend>,
        connector: Arc<dyn PageConnector>,
        matcher: PageMatcher,
        template: AgentTemplate,
    ) -> Self {
        Self {
            coordinator,
            backend,
            connector,
            matcher,
            template,
            agents: HashMap::new(),
        }
    }

    /// Ids of tabs that currently have an agent
    pub fn attached(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.agents.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Bring the agents in line with the current tab list
    ///
    /// `targets` is in Chrome's order, most recently used first, so the
    /// first page is the foreground tab. An agent lives as long as the
    /// document it was attached to: a closed, navigated or reloaded tab
    /// loses its agent, and a still-permitted tab gets a fresh one.
    pub async fn reconcile(&mut self, targets: &[PageTarget]) {
        let permitted: Vec<&PageTarget> = targets
            .iter()
            .filter(|t| t.is_page() && self.matcher.matches(&t.url))
            .collect();

        let mut stale: Vec<(String, &'static str)> = Vec::new();
        for (id, agent) in &self.agents {
            let reason = match permitted.iter().find(|t| &t.id == id) {
                None => Some("closed or not permitted"),
                Some(_) if agent.task.is_finished() => Some("agent ended"),
                Some(target) if target.url != agent.url => Some("navigated"),
                Some(_) => match agent.surface.has_session(&agent.token).await {
                    Ok(true) => None,
                    Ok(false) => Some("reloaded"),
                    Err(e) => {
                        tracing::debug!("Session check failed for {}: {}", id, e);
                        Some("unreachable")
                    }
                },
            };
            if let Some(reason) = reason {
                stale.push((id.clone(), reason));
            }
        }
        for (id, reason) in stale {
            self.detach(&id, reason);
        }

        for target in &permitted {
            if !self.agents.contains_key(&target.id) {
                self.attach(target).await;
            }
        }

        match targets.iter().find(|t| t.is_page()) {
            Some(front) if self.agents.contains_key(&front.id) => {
                self.coordinator.set_active(&front.id);
            }
            _ => self.coordinator.clear_active(),
        }
    }

    /// Scan the browser forever
    pub async fn run(mut self, endpoint: String, interval: Duration) {
        tracing::info!(
            "Watching {} for pages matching {}",
            endpoint,
            self.matcher.pattern()
        );
        let mut browser_reachable = true;
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match cdp::list_targets(&endpoint).await {
                Ok(targets) => {
                    if !browser_reachable {
                        tracing::info!("Browser reachable again at {}", endpoint);
                        browser_reachable = true;
                    }
                    self.reconcile(&targets).await;
                }
                Err(e) => {
                    if browser_reachable {
                        tracing::warn!("{}", e);
                        browser_reachable = false;
                    }
                    // No browser means no pages
                    self.reconcile(&[]).await;
                }
            }
        }
    }

    async fn attach(&mut self, target: &PageTarget) {
        let surface = match self.connector.connect(target).await {
            Ok(surface) => surface,
            Err(e) => {
                tracing::warn!("Cannot attach to {} ({}): {}", target.id, target.url, e);
                return;
            }
        };

        let token = Uuid::new_v4().to_string();
        if let Err(e) = surface.mark_session(&token).await {
            tracing::warn!("Cannot mark {} ({}): {}", target.id, target.url, e);
            return;
        }

        let (handle, task) = spawn_agent(AgentContext {
            page_id: target.id.clone(),
            backend: self.backend.clone(),
            injector: CommandInjector::new(surface.clone(), &self.template.injector),
            commands: self.template.commands.clone(),
            gestures: self.template.gestures.clone(),
        });
        self.coordinator.register(handle);
        tracing::info!("Attached to {} ({})", target.id, target.url);

        self.agents.insert(
            target.id.clone(),
            RunningAgent {
                url: target.url.clone(),
                token,
                surface,
                task,
            },
        );
    }

    /// Dropping the coordinator's handle ends the agent, which releases
    /// its capture on the way out
    fn detach(&mut self, page_id: &str, reason: &str) {
        self.coordinator.unregister(page_id);
        if let Some(agent) = self.agents.remove(page_id) {
            tracing::info!("Detached from {} ({}): {}", page_id, agent.url, reason);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{BusRequest, BusResponse, StatusReport, ToggleReport};
    use crate::capture::{CaptureError, CaptureHandle, CaptureStream, DetectionFrame};
    use crate::injector::{ElementRef, Notice};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;

    #[test]
    fn test_matcher_default_pattern() {
        let matcher = PageMatcher::new("http://127.0.0.1:50080/*").unwrap();
        assert!(matcher.matches("http://127.0.0.1:50080/"));
        assert!(matcher.matches("http://127.0.0.1:50080/chat?id=3"));
        assert!(!matcher.matches("http://127.0.0.1:50081/"));
        assert!(!matcher.matches("https://127.0.0.1:50080/"));
        // Dots are literal
        assert!(!matcher.matches("http://127x0.0.1:50080/"));
    }

    #[test]
    fn test_matcher_host_wildcard() {
        let matcher = PageMatcher::new("https://*.example.com/*").unwrap();
        assert!(matcher.matches("https://chat.example.com/c/1"));
        assert!(!matcher.matches("https://example.org/"));
    }

    #[test]
    fn test_matcher_all_urls() {
        let matcher = PageMatcher::new("<all_urls>").unwrap();
        assert!(matcher.matches("file:///tmp/index.html"));
    }

    /// A tab whose document can be replaced
    #[derive(Default)]
    struct TabSurface {
        session: Mutex<Option<String>>,
    }

    impl TabSurface {
        fn reload(&self) {
            self.session.lock().take();
        }
    }

    #[async_trait]
    impl PageSurface for TabSurface {
        async fn find_visible(&self, _: &str) -> Result<Option<ElementRef>, PageError> {
            Ok(None)
        }
        async fn fill(&self, _: &ElementRef, _: &str) -> Result<(), PageError> {
            Ok(())
        }
        async fn press_enter(&self, _: &ElementRef) -> Result<(), PageError> {
            Ok(())
        }
        async fn click(&self, _: &ElementRef) -> Result<(), PageError> {
            Ok(())
        }
        async fn read_value(&self, _: &ElementRef) -> Result<String, PageError> {
            Ok(String::new())
        }
        async fn notify(&self, _: &Notice) -> Result<(), PageError> {
            Ok(())
        }
        async fn mark_session(&self, token: &str) -> Result<(), PageError> {
            *self.session.lock() = Some(token.to_string());
            Ok(())
        }
        async fn has_session(&self, token: &str) -> Result<bool, PageError> {
            Ok(self.session.lock().as_deref() == Some(token))
        }
    }

    #[derive(Default)]
    struct RecordingConnector {
        connected: Mutex<Vec<String>>,
        surfaces: Mutex<Vec<Arc<TabSurface>>>,
    }

    impl RecordingConnector {
        fn connections(&self) -> usize {
            self.connected.lock().len()
        }

        /// Surface handed out by the `n`th connection
        fn surface(&self, n: usize) -> Arc<TabSurface> {
            self.surfaces.lock()[n].clone()
        }
    }

    #[async_trait]
    impl PageConnector for RecordingConnector {
        async fn connect(&self, target: &PageTarget) -> Result<Arc<dyn PageSurface>, PageError> {
            self.connected.lock().push(target.id.clone());
            let surface = Arc::new(TabSurface::default());
            self.surfaces.lock().push(surface.clone());
            let surface: Arc<dyn PageSurface> = surface;
            Ok(surface)
        }
    }

    struct NoCamera;

    #[async_trait]
    impl CaptureBackend for NoCamera {
        async fn start(&self) -> Result<CaptureStream, CaptureError> {
            Err(CaptureError::Detector("no camera".to_string()))
        }
    }

    struct CountingHandle(Arc<AtomicUsize>);

    impl CaptureHandle for CountingHandle {
        fn stop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Starts at once and streams nothing; counts releases
    #[derive(Default)]
    struct QuietCamera {
        senders: Mutex<Vec<mpsc::Sender<DetectionFrame>>>,
        stops: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl CaptureBackend for QuietCamera {
        async fn start(&self) -> Result<CaptureStream, CaptureError> {
            let (tx, rx) = mpsc::channel(1);
            self.senders.lock().push(tx);
            Ok(CaptureStream::new(
                rx,
                Box::new(CountingHandle(self.stops.clone())),
            ))
        }
    }

    fn target(id: &str, url: &str) -> PageTarget {
        PageTarget {
            id: id.to_string(),
            target_type: "page".to_string(),
            title: String::new(),
            url: url.to_string(),
            web_socket_debugger_url: Some(format!("ws://127.0.0.1:9222/devtools/page/{}", id)),
        }
    }

    fn watcher_with(
        coordinator: Arc<Coordinator>,
        backend: Arc<dyn CaptureBackend>,
        connector: Arc<RecordingConnector>,
    ) -> PageWatcher {
        PageWatcher::new(
            coordinator,
            backend,
            connector,
            PageMatcher::new("http://127.0.0.1:50080/*").unwrap(),
            AgentTemplate::default(),
        )
    }

    fn watcher(coordinator: Arc<Coordinator>, connector: Arc<RecordingConnector>) -> PageWatcher {
        watcher_with(coordinator, Arc::new(NoCamera), connector)
    }

    async fn wait_until<F: Fn() -> bool>(check: F) -> bool {
        for _ in 0..200 {
            if check() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        check()
    }

    #[tokio::test]
    async fn test_attaches_only_permitted_pages() {
        let coordinator = Arc::new(Coordinator::new());
        let connector = Arc::new(RecordingConnector::default());
        let mut watcher = watcher(coordinator.clone(), connector.clone());

        watcher
            .reconcile(&[
                target("A", "http://127.0.0.1:50080/"),
                target("B", "https://news.example.com/"),
            ])
            .await;

        assert_eq!(watcher.attached(), vec!["A"]);
        assert_eq!(*connector.connected.lock(), vec!["A".to_string()]);
        assert_eq!(coordinator.active_page().as_deref(), Some("A"));
    }

    #[tokio::test]
    async fn test_foreground_unpermitted_tab_leaves_no_active_page() {
        let coordinator = Arc::new(Coordinator::new());
        let connector = Arc::new(RecordingConnector::default());
        let mut watcher = watcher(coordinator.clone(), connector);

        watcher
            .reconcile(&[
                target("NEWS", "https://news.example.com/"),
                target("A", "http://127.0.0.1:50080/"),
            ])
            .await;

        // The background agent stays attached but is not routed to
        assert_eq!(watcher.attached(), vec!["A"]);
        assert_eq!(coordinator.active_page(), None);
        assert_eq!(
            coordinator.dispatch(BusRequest::ToggleGesture).await,
            BusResponse::Toggle(ToggleReport::default())
        );

        // Switching back to the agent tab routes to it again
        watcher
            .reconcile(&[
                target("A", "http://127.0.0.1:50080/"),
                target("NEWS", "https://news.example.com/"),
            ])
            .await;
        assert_eq!(coordinator.active_page().as_deref(), Some("A"));
    }

    #[tokio::test]
    async fn test_non_page_targets_are_not_the_foreground() {
        let coordinator = Arc::new(Coordinator::new());
        let connector = Arc::new(RecordingConnector::default());
        let mut watcher = watcher(coordinator.clone(), connector);

        let mut worker = target("SW", "http://127.0.0.1:50080/sw.js");
        worker.target_type = "service_worker".to_string();
        watcher
            .reconcile(&[worker, target("A", "http://127.0.0.1:50080/")])
            .await;

        assert_eq!(coordinator.active_page().as_deref(), Some("A"));
    }

    #[tokio::test]
    async fn test_existing_agents_are_kept() {
        let coordinator = Arc::new(Coordinator::new());
        let connector = Arc::new(RecordingConnector::default());
        let mut watcher = watcher(coordinator, connector.clone());
        let tabs = [target("A", "http://127.0.0.1:50080/")];

        watcher.reconcile(&tabs).await;
        watcher.reconcile(&tabs).await;

        assert_eq!(connector.connections(), 1);
    }

    #[tokio::test]
    async fn test_closed_or_navigated_away_pages_are_detached() {
        let coordinator = Arc::new(Coordinator::new());
        let connector = Arc::new(RecordingConnector::default());
        let mut watcher = watcher(coordinator.clone(), connector);

        watcher
            .reconcile(&[
                target("A", "http://127.0.0.1:50080/"),
                target("B", "http://127.0.0.1:50080/other"),
            ])
            .await;
        assert_eq!(watcher.attached(), vec!["A", "B"]);

        // A navigated away, B closed
        watcher
            .reconcile(&[target("A", "https://elsewhere.example.com/")])
            .await;
        assert!(watcher.attached().is_empty());
        assert!(coordinator.page_ids().is_empty());
        assert_eq!(coordinator.active_page(), None);
    }

    #[tokio::test]
    async fn test_navigation_within_permitted_urls_starts_fresh_agent() {
        let coordinator = Arc::new(Coordinator::new());
        let connector = Arc::new(RecordingConnector::default());
        let mut watcher = watcher(coordinator.clone(), connector.clone());

        watcher
            .reconcile(&[target("A", "http://127.0.0.1:50080/chat/1")])
            .await;
        watcher
            .reconcile(&[target("A", "http://127.0.0.1:50080/chat/2")])
            .await;

        assert_eq!(connector.connections(), 2);
        assert_eq!(watcher.attached(), vec!["A"]);
        assert_eq!(coordinator.active_page().as_deref(), Some("A"));
    }

    #[tokio::test]
    async fn test_reload_releases_camera_and_starts_at_rest() {
        let coordinator = Arc::new(Coordinator::new());
        let connector = Arc::new(RecordingConnector::default());
        let camera = Arc::new(QuietCamera::default());
        let mut watcher = watcher_with(coordinator.clone(), camera.clone(), connector.clone());
        let tabs = [target("A", "http://127.0.0.1:50080/chat")];

        watcher.reconcile(&tabs).await;
        coordinator.dispatch(BusRequest::ToggleGesture).await;
        let mut active = false;
        for _ in 0..200 {
            let status = coordinator.dispatch(BusRequest::GetStatus).await.into_status();
            if status.camera_active {
                active = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(active);

        // Same URL, new document
        connector.surface(0).reload();
        watcher.reconcile(&tabs).await;

        assert_eq!(connector.connections(), 2);
        let stops = camera.stops.clone();
        assert!(wait_until(|| stops.load(Ordering::SeqCst) == 1).await);
        assert_eq!(
            coordinator.dispatch(BusRequest::GetStatus).await,
            BusResponse::Status(StatusReport::rest())
        );
    }

    #[tokio::test]
    async fn test_foreground_page_is_active() {
        let coordinator = Arc::new(Coordinator::new());
        let connector = Arc::new(RecordingConnector::default());
        let mut watcher = watcher(coordinator.clone(), connector);

        watcher
            .reconcile(&[
                target("A", "http://127.0.0.1:50080/"),
                target("B", "http://127.0.0.1:50080/"),
            ])
            .await;
        assert_eq!(coordinator.active_page().as_deref(), Some("A"));

        // B was brought to the front
        watcher
            .reconcile(&[
                target("B", "http://127.0.0.1:50080/"),
                target("A", "http://127.0.0.1:50080/"),
            ])
            .await;
        assert_eq!(coordinator.active_page().as_deref(), Some("B"));
    }
}
