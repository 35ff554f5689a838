pub mod captcha;
pub mod classifier;
pub mod driver;
pub mod error;
pub mod orchestrator;
pub mod payload;
pub mod strategy;
pub mod types;

// Re-exports for clean API
pub use captcha::{CaptchaChallenge, CaptchaSolver};
pub use classifier::{classify, FIELD_KEYWORDS};
pub use driver::{BrowserDriver, ControlHandle, DriverError, DriverFactory, SelectOption};
pub use error::EngineError;
pub use orchestrator::{FormFillOrchestrator, OrchestratorConfig};
pub use payload::FormPayload;
pub use strategy::{resolve_submit_actions, SubmitAction, SUBMIT_TEXT_KEYWORDS};
pub use types::{ControlKind, FieldRole, FillReport, OutcomeKind, SubmissionOutcome};
