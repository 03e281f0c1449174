//! Ordered selector tables for finding the chat input and send button
//!
//! Rules are tried in order and the first one with a visible match wins, so
//! the specific hints come first and the generic fallbacks last.

use serde::{Deserialize, Serialize};

/// What a rule is keyed on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectorHint {
    Placeholder,
    Class,
    Id,
    AriaLabel,
    Generic,
    /// Supplied through configuration
    Custom,
}

/// One CSS selector and the hint it encodes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorRule {
    pub css: String,
    pub hint: SelectorHint,
}

impl SelectorRule {
    pub fn new(css: impl Into<String>, hint: SelectorHint) -> Self {
        Self {
            css: css.into(),
            hint,
        }
    }
}

const DEFAULT_INPUT_RULES: &[(&str, SelectorHint)] = &[
    (r#"textarea[placeholder*="message"]"#, SelectorHint::Placeholder),
    (r#"textarea[placeholder*="Message"]"#, SelectorHint::Placeholder),
    (r#"input[type="text"][placeholder*="message"]"#, SelectorHint::Placeholder),
    ("textarea.chat-input", SelectorHint::Class),
    ("input.chat-input", SelectorHint::Class),
    ("#message-input", SelectorHint::Id),
    (".message-input textarea", SelectorHint::Class),
    (".message-input input", SelectorHint::Class),
    ("textarea", SelectorHint::Generic),
    (r#"input[type="text"]"#, SelectorHint::Generic),
];

const DEFAULT_SUBMIT_RULES: &[(&str, SelectorHint)] = &[
    (r#"button[type="submit"]"#, SelectorHint::Generic),
    ("button.send-button", SelectorHint::Class),
    (".send-button", SelectorHint::Class),
    (r#"button[aria-label*="send"]"#, SelectorHint::AriaLabel),
    (r#"button[aria-label*="Send"]"#, SelectorHint::AriaLabel),
    (r#"button svg[class*="send"]"#, SelectorHint::Class),
];

/// An ordered list of selector rules
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SelectorTable(Vec<SelectorRule>);

impl SelectorTable {
    pub fn new(rules: Vec<SelectorRule>) -> Self {
        Self(rules)
    }

    /// Text inputs, most specific first
    pub fn default_inputs() -> Self {
        Self::from_static(DEFAULT_INPUT_RULES)
    }

    /// Send buttons, most specific first
    pub fn default_submits() -> Self {
        Self::from_static(DEFAULT_SUBMIT_RULES)
    }

    fn from_static(rules: &[(&str, SelectorHint)]) -> Self {
        Self(
            rules
                .iter()
                .map(|(css, hint)| SelectorRule::new(*css, *hint))
                .collect(),
        )
    }

    /// Put extra selectors in front, keeping their order
    ///
    /// Blank entries are skipped.
    pub fn with_extra(mut self, extra: &[String]) -> Self {
        let custom: Vec<SelectorRule> = extra
            .iter()
            .map(|css| css.trim())
            .filter(|css| !css.is_empty())
            .map(|css| SelectorRule::new(css, SelectorHint::Custom))
            .collect();
        self.0.splice(0..0, custom);
        self
    }

    pub fn rules(&self) -> &[SelectorRule] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
