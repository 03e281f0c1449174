//! Command injection into an unknown chat page
//!
//! ```text
//! find input ──► fill ──► wait ──► Enter ──► click send
//!     │
//!     └─ nothing visible ──► "Input field not found!" notice
//! ```
//!
//! Enter and the send button are independent paths. Pages that only react
//! to one of them still get the command. Failures are reported in the
//! outcome and on the page; nothing here panics.

pub mod browser;
pub mod page;
pub mod selectors;

pub use page::{ElementRef, Notice, NoticeKind, PageError, PageSurface};
pub use selectors::{SelectorHint, SelectorRule, SelectorTable};

use crate::config::{InjectorConfig, SubmitStrategy};
use crate::gesture::Gesture;
use std::sync::Arc;
use std::time::Duration;

pub const INPUT_NOT_FOUND: &str = "Input field not found!";

/// What happened on a successful delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Selector that located the input
    pub input_selector: String,
    /// Whether the Enter key events were dispatched
    pub enter_sent: bool,
    /// Selector of the clicked send button, if any
    pub clicked: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InjectOutcome {
    Delivered(DeliveryReport),
    /// No visible text input on the page
    NoTarget,
    Failed(String),
}

impl InjectOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, InjectOutcome::Delivered(_))
    }
}

/// Injects commands into one page
#[derive(Clone)]
pub struct CommandInjector {
    page: Arc<dyn PageSurface>,
    inputs: SelectorTable,
    submits: SelectorTable,
    submit_delay: Duration,
    strategy: SubmitStrategy,
    notification: Duration,
}

impl CommandInjector {
    pub fn new(page: Arc<dyn PageSurface>, config: &InjectorConfig) -> Self {
        Self {
            page,
            inputs: SelectorTable::default_inputs().with_extra(&config.extra_input_selectors),
            submits: SelectorTable::default_submits().with_extra(&config.extra_submit_selectors),
            submit_delay: Duration::from_millis(config.submit_delay_ms),
            strategy: config.submit_strategy,
            notification: Duration::from_millis(config.notification_ms),
        }
    }

    pub fn inputs(&self) -> &SelectorTable {
        &self.inputs
    }

    pub fn submits(&self) -> &SelectorTable {
        &self.submits
    }

    /// Show the gesture and its command on the page
    pub async fn announce(&self, gesture: Gesture, command: &str) {
        let notice = Notice::gesture(gesture, command, self.notification);
        if let Err(e) = self.page.notify(&notice).await {
            tracing::warn!("Failed to show gesture notification: {}", e);
        }
    }

    /// Type `command` into the page's chat input and submit it
    pub async fn inject(&self, command: &str) -> InjectOutcome {
        let Some(input) = self.first_visible(&self.inputs).await else {
            tracing::error!("Could not find input element");
            let notice = Notice::error(INPUT_NOT_FOUND, self.notification);
            if let Err(e) = self.page.notify(&notice).await {
                tracing::warn!("Failed to show error notification: {}", e);
            }
            return InjectOutcome::NoTarget;
        };

        if let Err(e) = self.page.fill(&input, command).await {
            tracing::error!("Failed to fill input {}: {}", input.selector, e);
            return InjectOutcome::Failed(e.to_string());
        }

        tokio::time::sleep(self.submit_delay).await;

        let enter_sent = match self.page.press_enter(&input).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Failed to send Enter: {}", e);
                false
            }
        };

        let clicked = if self.host_already_submitted(&input, enter_sent).await {
            tracing::debug!("Input cleared after Enter, skipping send button");
            None
        } else {
            self.click_submit().await
        };

        tracing::info!(
            "Command injected: {:?} (input: {}, enter: {}, clicked: {:?})",
            command,
            input.selector,
            enter_sent,
            clicked
        );

        InjectOutcome::Delivered(DeliveryReport {
            input_selector: input.selector,
            enter_sent,
            clicked,
        })
    }

    /// Only the single-submission strategy looks; an emptied input after
    /// Enter means the page already sent the message.
    async fn host_already_submitted(&self, input: &ElementRef, enter_sent: bool) -> bool {
        if self.strategy != SubmitStrategy::Single || !enter_sent {
            return false;
        }
        match self.page.read_value(input).await {
            Ok(value) => value.trim().is_empty(),
            Err(e) => {
                tracing::debug!("Could not read input back: {}", e);
                false
            }
        }
    }

    async fn click_submit(&self) -> Option<String> {
        let button = self.first_visible(&self.submits).await?;
        match self.page.click(&button).await {
            Ok(()) => Some(button.selector),
            Err(e) => {
                tracing::warn!("Failed to click {}: {}", button.selector, e);
                None
            }
        }
    }

    async fn first_visible(&self, table: &SelectorTable) -> Option<ElementRef> {
        for rule in table.rules() {
            match self.page.find_visible(&rule.css).await {
                Ok(Some(element)) => return Some(element),
                Ok(None) => {}
                Err(e) => tracing::debug!("Selector {} failed: {}", rule.css, e),
            }
        }
        None
    }
}

impl std::fmt::Debug for CommandInjector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandInjector")
            .field("inputs", &self.inputs.len())
            .field("submits", &self.submits.len())
            .field("submit_delay", &self.submit_delay)
            .field("strategy", &self.strategy)
            .finish_non_exhaustive()
    }
}
