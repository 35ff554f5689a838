use serde::Serialize;

/// Button/link text that marks a control as a submit candidate.
pub const SUBMIT_TEXT_KEYWORDS: &[&str] = &["send", "submit", "contact", "enquire", "apply", "message"];

/// Submit controls scoped inside a `<form>` element. In-form controls always
/// win over free-floating buttons: forms with custom JS submit handlers are
/// the common case on real sites.
pub const FORM_SCOPED_SUBMIT_SELECTOR: &str = "form input[type='submit'], form button[type='submit']";

/// One way of attempting to submit the current page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "action")]
pub enum SubmitAction {
    /// Click the first visible control matching a CSS selector.
    ClickSelector { selector: &'static str },
    /// Click the first visible button whose text matches the submit keyword set.
    ClickByText { keywords: &'static [&'static str] },
    /// Invoke the first form's native submit through the script interface.
    NativeSubmit,
}

impl std::fmt::Display for SubmitAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubmitAction::ClickSelector { selector } => write!(f, "click:{selector}"),
            SubmitAction::ClickByText { .. } => write!(f, "click-by-text"),
            SubmitAction::NativeSubmit => write!(f, "native-submit"),
        }
    }
}

/// The ordered submit ladder.
///
/// Actions are evaluated against live page state at execution time; the
/// orchestrator walks the ladder and stops at the first action that applies
/// without raising. The ladder is finite and its order is part of the
/// contract.
pub fn resolve_submit_actions() -> Vec<SubmitAction> {
    vec![
        SubmitAction::ClickSelector {
            selector: FORM_SCOPED_SUBMIT_SELECTOR,
        },
        SubmitAction::ClickByText {
            keywords: SUBMIT_TEXT_KEYWORDS,
        },
        SubmitAction::NativeSubmit,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ladder_order_is_fixed() {
        let ladder = resolve_submit_actions();
        assert_eq!(ladder.len(), 3);
        assert!(matches!(
            ladder[0],
            SubmitAction::ClickSelector {
                selector: FORM_SCOPED_SUBMIT_SELECTOR
            }
        ));
        assert!(matches!(ladder[1], SubmitAction::ClickByText { .. }));
        assert_eq!(ladder[2], SubmitAction::NativeSubmit);
    }

    #[test]
    fn test_in_form_selector_precedes_text_match() {
        // The form-scoped tier must come before the keyword tier so a submit
        // button living inside a form beats an identical one outside it.
        let ladder = resolve_submit_actions();
        let form_tier = ladder
            .iter()
            .position(|a| matches!(a, SubmitAction::ClickSelector { .. }))
            .unwrap();
        let text_tier = ladder
            .iter()
            .position(|a| matches!(a, SubmitAction::ClickByText { .. }))
            .unwrap();
        assert!(form_tier < text_tier);
    }
}
