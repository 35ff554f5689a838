use crate::driver::DriverError;

/// Per-attempt failures with distinct bookkeeping consequences.
///
/// Everything here is caught at the orchestrator boundary and folded into a
/// [`crate::SubmissionOutcome`]; only the lease manager decides whether an
/// outcome becomes a retry or a terminal failure.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The target URL could not be loaded at all. Terminal for this attempt;
    /// retries belong to the lease manager.
    #[error("navigation failed: {url}")]
    Navigation {
        url: String,
        #[source]
        source: DriverError,
    },

    /// No `<form>` and no interactive controls after scrolling. Recorded
    /// distinctly from a submission failure so operators can separate bad
    /// targets from bugs.
    #[error("form not found")]
    FormNotFound { evidence: String },

    /// Every tier of the submit ladder raised.
    #[error("all submit strategies exhausted")]
    SubmissionExhausted { evidence: String },

    /// A CAPTCHA challenge was detected but no token was obtained. Never
    /// fatal: submission proceeds and the outcome reports the result.
    #[error("captcha challenge unsolved")]
    CaptchaUnsolved,

    /// The driver failed outside any of the cases above.
    #[error(transparent)]
    Driver(#[from] DriverError),
}
