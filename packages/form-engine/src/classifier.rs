use std::collections::HashMap;

use crate::types::{ControlKind, FieldRole};

/// Keyword sets per role, in classification priority order.
///
/// The order is load-bearing: a control whose text matches several sets
/// (e.g. "email-subject") always resolves to the first matching role.
pub const FIELD_KEYWORDS: [(FieldRole, &[&str]); 6] = [
    (
        FieldRole::Name,
        &[
            "name",
            "full name",
            "fullname",
            "your-name",
            "contact-name",
            "first",
            "last",
            "first-name",
            "last-name",
        ],
    ),
    (FieldRole::Email, &["email", "e-mail", "mail"]),
    (FieldRole::Subject, &["subject", "topic", "reason"]),
    (
        FieldRole::Message,
        &[
            "message",
            "comment",
            "comments",
            "enquiry",
            "inquiry",
            "description",
            "body",
            "describe",
        ],
    ),
    (
        FieldRole::Phone,
        &["phone", "tel", "mobile", "contact-number"],
    ),
    (
        FieldRole::Company,
        &["company", "organization", "organisation", "org"],
    ),
];

/// Attribute names inspected when building the classification haystack.
const INSPECTED_ATTRIBUTES: [&str; 6] = ["name", "id", "placeholder", "aria-label", "title", "class"];

pub fn matches_keywords(text: &str, keywords: &[&str]) -> bool {
    if text.is_empty() {
        return false;
    }
    let text = text.to_lowercase();
    keywords.iter().any(|kw| text.contains(kw))
}

/// Infer the semantic role of a form control.
///
/// Pure and total: concatenates the inspected attribute values and the
/// resolved label text into one lowercase haystack, tests each role's
/// keyword set in priority order, then falls back on the declared input
/// type. Returns `None` when nothing matches.
pub fn classify(
    attributes: &HashMap<String, String>,
    label_text: &str,
    kind: ControlKind,
    input_type: &str,
) -> Option<FieldRole> {
    let mut haystack = String::new();
    for attr in INSPECTED_ATTRIBUTES {
        if let Some(value) = attributes.get(attr) {
            if !value.is_empty() {
                haystack.push_str(value);
                haystack.push(' ');
            }
        }
    }
    haystack.push_str(label_text);
    let haystack = haystack.to_lowercase();

    for (role, keywords) in FIELD_KEYWORDS {
        if matches_keywords(&haystack, keywords) {
            return Some(role);
        }
    }

    // Type-based fallbacks when no keyword matched.
    let input_type = input_type.to_lowercase();
    if input_type == "email" {
        return Some(FieldRole::Email);
    }
    if matches!(input_type.as_str(), "tel" | "tel-national" | "tel-local") {
        return Some(FieldRole::Phone);
    }
    if kind == ControlKind::Textarea {
        return Some(FieldRole::Message);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_classify_by_attribute_keyword() {
        let cases = [
            ("your-name", FieldRole::Name),
            ("email_address", FieldRole::Email),
            ("topic", FieldRole::Subject),
            ("enquiry", FieldRole::Message),
            ("mobile", FieldRole::Phone),
            ("organisation", FieldRole::Company),
        ];
        for (name, expected) in cases {
            let role = classify(&attrs(&[("name", name)]), "", ControlKind::Text, "text");
            assert_eq!(role, Some(expected), "attribute {name}");
        }
    }

    #[test]
    fn test_priority_order_breaks_ties() {
        // "subject-message" matches both Subject and Message; Subject is
        // earlier in the priority order and must win.
        let role = classify(
            &attrs(&[("name", "subject-message")]),
            "",
            ControlKind::Text,
            "text",
        );
        assert_eq!(role, Some(FieldRole::Subject));

        // Likewise "email-subject" resolves to Email (Email precedes Subject).
        let role = classify(
            &attrs(&[("id", "email-subject")]),
            "",
            ControlKind::Text,
            "text",
        );
        assert_eq!(role, Some(FieldRole::Email));
    }

    #[test]
    fn test_label_text_participates() {
        let role = classify(
            &attrs(&[("id", "f_17")]),
            "Your phone number",
            ControlKind::Text,
            "text",
        );
        assert_eq!(role, Some(FieldRole::Phone));
    }

    #[test]
    fn test_type_fallbacks() {
        assert_eq!(
            classify(&attrs(&[]), "", ControlKind::Text, "email"),
            Some(FieldRole::Email)
        );
        assert_eq!(
            classify(&attrs(&[]), "", ControlKind::Text, "tel"),
            Some(FieldRole::Phone)
        );
        assert_eq!(
            classify(&attrs(&[]), "", ControlKind::Text, "tel-national"),
            Some(FieldRole::Phone)
        );
        assert_eq!(
            classify(&attrs(&[]), "", ControlKind::Textarea, ""),
            Some(FieldRole::Message)
        );
    }

    #[test]
    fn test_keyword_wins_over_type_fallback() {
        // A textarea with a subject-like name is a subject field, not a message.
        let role = classify(
            &attrs(&[("name", "topic")]),
            "",
            ControlKind::Textarea,
            "",
        );
        assert_eq!(role, Some(FieldRole::Subject));
    }

    #[test]
    fn test_total_on_arbitrary_input() {
        assert_eq!(classify(&attrs(&[]), "", ControlKind::Text, "text"), None);
        assert_eq!(
            classify(
                &attrs(&[("name", "\u{1F600} ~!@#$%"), ("class", "")]),
                "\0",
                ControlKind::Checkbox,
                "checkbox"
            ),
            None
        );
    }
}
