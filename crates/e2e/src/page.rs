//! Page interaction capability consumed by the scenario executor

use std::fmt;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::E2eResult;

/// How a name or text predicate matches
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "value", rename_all = "snake_case")]
pub enum TextMatch {
    /// Whole string, case-sensitive
    Exact(String),
    /// Substring, case-insensitive
    Contains(String),
    /// Case-insensitive regular expression
    Pattern(String),
}

impl TextMatch {
    pub fn exact(s: impl Into<String>) -> Self {
        TextMatch::Exact(s.into())
    }

    pub fn contains(s: impl Into<String>) -> Self {
        TextMatch::Contains(s.into())
    }

    pub fn pattern(s: impl Into<String>) -> Self {
        TextMatch::Pattern(s.into())
    }
}

impl fmt::Display for TextMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TextMatch::Exact(s) => write!(f, "'{}'", s),
            TextMatch::Contains(s) => write!(f, "~'{}'", s),
            TextMatch::Pattern(s) => write!(f, "/{}/i", s),
        }
    }
}

/// Element predicate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Locator {
    /// ARIA role plus accessible name
    Role { role: String, name: TextMatch },
    /// Visible text
    Text { text: TextMatch },
    /// CSS selector, optionally narrowed to elements containing text
    Css {
        selector: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        has_text: Option<String>,
    },
    /// First element matched by the inner locator
    First { of: Box<Locator> },
}

impl Locator {
    pub fn role(role: impl Into<String>, name: TextMatch) -> Self {
        Locator::Role {
            role: role.into(),
            name,
        }
    }

    pub fn text(text: TextMatch) -> Self {
        Locator::Text { text }
    }

    pub fn css(selector: impl Into<String>) -> Self {
        Locator::Css {
            selector: selector.into(),
            has_text: None,
        }
    }

    /// `selector` elements that contain `text`
    pub fn css_with_text(selector: impl Into<String>, text: impl Into<String>) -> Self {
        Locator::Css {
            selector: selector.into(),
            has_text: Some(text.into()),
        }
    }

    pub fn first(self) -> Self {
        Locator::First { of: Box::new(self) }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Role { role, name } => write!(f, "role={}[name={}]", role, name),
            Locator::Text { text } => write!(f, "text={}", text),
            Locator::Css { selector, has_text: None } => write!(f, "css={}", selector),
            Locator::Css {
                selector,
                has_text: Some(text),
            } => write!(f, "css={}[has-text='{}']", selector, text),
            Locator::First { of } => write!(f, "{} >> first", of),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitState {
    #[default]
    Visible,
    Hidden,
    Attached,
    Detached,
}

/// A live, interactive browser page.
///
/// Every call is a suspension point and is bounded by the given timeout; an
/// element that never becomes actionable surfaces as `E2eError::Timeout`.
#[async_trait]
pub trait Page: Send {
    async fn goto(&mut self, url: &str, timeout: Duration) -> E2eResult<()>;

    /// Wait until the page URL matches a case-insensitive pattern.
    async fn wait_for_url(&mut self, pattern: &str, timeout: Duration) -> E2eResult<()>;

    async fn click(&mut self, target: &Locator, timeout: Duration) -> E2eResult<()>;

    async fn double_click(&mut self, target: &Locator, timeout: Duration) -> E2eResult<()>;

    async fn fill(&mut self, target: &Locator, value: &str, timeout: Duration) -> E2eResult<()>;

    /// Select a checkbox or radio button.
    async fn check(&mut self, target: &Locator, timeout: Duration) -> E2eResult<()>;

    async fn wait_for(
        &mut self,
        target: &Locator,
        state: WaitState,
        timeout: Duration,
    ) -> E2eResult<()>;

    /// Fixed delay, for waits with no observable readiness signal.
    async fn pause(&mut self, duration: Duration) -> E2eResult<()> {
        tokio::time::sleep(duration).await;
        Ok(())
    }

    async fn screenshot(&mut self, path: &Path, full_page: bool) -> E2eResult<()>;

    async fn close(&mut self) -> E2eResult<()>;
}

/// Opens one fresh page per row.
#[async_trait]
pub trait PageFactory: Send + Sync {
    async fn open(&self) -> E2eResult<Box<dyn Page>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locator_wire_format() {
        let locator = Locator::role("checkbox", TextMatch::pattern("happy for")).first();
        let json = serde_json::to_value(&locator).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "kind": "first",
                "of": {
                    "kind": "role",
                    "role": "checkbox",
                    "name": { "mode": "pattern", "value": "happy for" }
                }
            })
        );
    }

    #[test]
    fn test_css_without_text_omits_filter() {
        let json = serde_json::to_value(Locator::css("#address-btn")).unwrap();
        assert_eq!(json, serde_json::json!({ "kind": "css", "selector": "#address-btn" }));
    }

    #[test]
    fn test_locator_display() {
        let locator = Locator::css_with_text("button", "Next");
        assert_eq!(locator.to_string(), "css=button[has-text='Next']");
        assert_eq!(
            Locator::text(TextMatch::exact("Widowed")).first().to_string(),
            "text='Widowed' >> first"
        );
    }
}
