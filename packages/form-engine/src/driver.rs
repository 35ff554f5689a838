use async_trait::async_trait;
use serde::Deserialize;

/// Failure modes surfaced by a concrete automation backend.
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("element interaction failed: {0}")]
    Interaction(String),

    #[error("script execution failed: {0}")]
    Script(String),

    #[error("session error: {0}")]
    Session(String),
}

/// One option inside a `<select>` control.
#[derive(Debug, Clone, Deserialize)]
pub struct SelectOption {
    pub text: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub disabled: bool,
}

/// Handle to a single interactive control on the current page.
///
/// Handles are only valid for the page state they were enumerated against;
/// a backend may report stale handles as `Interaction` errors, which callers
/// treat as per-control soft failures.
#[async_trait]
pub trait ControlHandle: Send + Sync {
    async fn tag_name(&self) -> Result<String, DriverError>;

    /// A single attribute value, `None` when absent.
    async fn attribute(&self, name: &str) -> Result<Option<String>, DriverError>;

    /// Visible text content of the control.
    async fn text(&self) -> Result<String, DriverError>;

    /// Resolved `<label>` text: `label[for=<id>]` linkage first, then the
    /// closest ancestor label. Empty string when neither exists.
    async fn label_text(&self) -> Result<String, DriverError>;

    async fn is_displayed(&self) -> Result<bool, DriverError>;
    async fn is_enabled(&self) -> Result<bool, DriverError>;
    async fn is_selected(&self) -> Result<bool, DriverError>;

    async fn click(&self) -> Result<(), DriverError>;
    async fn clear(&self) -> Result<(), DriverError>;
    async fn type_text(&self, text: &str) -> Result<(), DriverError>;
    async fn scroll_into_view(&self) -> Result<(), DriverError>;

    /// Options of a `<select>` control, in document order.
    async fn select_options(&self) -> Result<Vec<SelectOption>, DriverError>;
    async fn select_by_visible_text(&self, text: &str) -> Result<(), DriverError>;

    /// Child elements matching a CSS selector (list items of a widget, etc).
    async fn find_children(&self, css: &str) -> Result<Vec<Box<dyn ControlHandle>>, DriverError>;
}

/// Narrow capability interface over a real browser.
///
/// Any automation backend that can satisfy this trait is substitutable; the
/// engine never touches a concrete library.
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<(), DriverError>;

    /// All `<input>`, `<textarea>` and `<select>` elements on the page.
    async fn find_controls(&self) -> Result<Vec<Box<dyn ControlHandle>>, DriverError>;

    /// Elements matching an arbitrary CSS selector.
    async fn find_elements(&self, css: &str) -> Result<Vec<Box<dyn ControlHandle>>, DriverError>;

    async fn execute_script(&self, js: &str) -> Result<serde_json::Value, DriverError>;

    async fn page_source(&self) -> Result<String, DriverError>;

    async fn current_url(&self) -> Result<String, DriverError>;

    /// Tear down the session. Must be safe to call on a broken session.
    async fn quit(&self);
}

/// Creates one exclusively-owned browser session per job.
#[async_trait]
pub trait DriverFactory: Send + Sync {
    async fn create_session(&self) -> Result<Box<dyn BrowserDriver>, DriverError>;
}
