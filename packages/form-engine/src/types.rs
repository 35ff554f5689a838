use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The kind of interactive control as rendered in the DOM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlKind {
    Text,
    Textarea,
    Select,
    Checkbox,
    Radio,
    File,
}

/// Semantic role inferred for a form control.
///
/// `classify` returns `None` when no role can be inferred; there is no
/// explicit "none" variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldRole {
    Name,
    Email,
    Subject,
    Message,
    Phone,
    Company,
    File,
}

impl FieldRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldRole::Name => "name",
            FieldRole::Email => "email",
            FieldRole::Subject => "subject",
            FieldRole::Message => "message",
            FieldRole::Phone => "phone",
            FieldRole::Company => "company",
            FieldRole::File => "file",
        }
    }
}

impl std::fmt::Display for FieldRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a fill attempt actually touched, plus soft notes for anything that
/// could not be filled without aborting the attempt.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FillReport {
    pub filled: HashMap<String, String>,
    pub notes: Vec<String>,
}

impl FillReport {
    pub fn record(&mut self, field: impl Into<String>, value: impl Into<String>) {
        self.filled.insert(field.into(), value.into());
    }

    pub fn note(&mut self, note: impl Into<String>) {
        self.notes.push(note.into());
    }
}

/// Terminal disposition of a single fill-and-submit attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    /// The attempt ran to the success-heuristic check; `success` carries the verdict.
    Attempted,
    /// Navigation to the target URL failed before anything else happened.
    NavigationFailed,
    /// No form and no interactive controls were found on the page.
    FormNotFound,
    /// Every submit strategy in the ladder raised.
    SubmissionExhausted,
    /// The driver failed in a way that ended the attempt early.
    AttemptError,
}

/// Structured result of one attempt against one target page.
///
/// This is the only thing that crosses the orchestrator boundary; errors
/// inside an attempt never escape as panics or raw driver failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionOutcome {
    pub success: bool,
    pub kind: OutcomeKind,
    pub error: Option<String>,
    /// Truncated page snapshot taken after the attempt settled.
    pub evidence: String,
    pub filled: FillReport,
    pub submission_time: DateTime<Utc>,
}

impl SubmissionOutcome {
    pub fn failure(kind: OutcomeKind, error: impl Into<String>, evidence: String) -> Self {
        Self {
            success: false,
            kind,
            error: Some(error.into()),
            evidence,
            filled: FillReport::default(),
            submission_time: Utc::now(),
        }
    }

    pub fn form_not_found(&self) -> bool {
        self.kind == OutcomeKind::FormNotFound
    }
}
