use serde::{Deserialize, Serialize};

use crate::types::FieldRole;

/// Values available for filling a form, keyed by semantic role.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FormPayload {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub subject: Option<String>,
    pub message: Option<String>,
    pub company: Option<String>,
    /// Local path for file-upload controls. Rarely present.
    pub file: Option<String>,
}

impl FormPayload {
    /// The payload value for a classified role, if any.
    pub fn value_for(&self, role: FieldRole) -> Option<&str> {
        let value = match role {
            FieldRole::Name => &self.name,
            FieldRole::Email => &self.email,
            FieldRole::Phone => &self.phone,
            FieldRole::Subject => &self.subject,
            FieldRole::Message => &self.message,
            FieldRole::Company => &self.company,
            FieldRole::File => &self.file,
        };
        value.as_deref().filter(|v| !v.is_empty())
    }

    /// Build a payload from an outreach-target record.
    ///
    /// Fallbacks mirror the campaign data model: a missing full name is
    /// assembled from first/last, the message falls back to a generated
    /// greeting, and the subject falls back to the campaign name.
    #[allow(clippy::too_many_arguments)]
    pub fn from_contact_fields(
        full_name: Option<&str>,
        first_name: Option<&str>,
        last_name: Option<&str>,
        company_name: Option<&str>,
        email_address: Option<&str>,
        phone_number: Option<&str>,
        website_url: Option<&str>,
        personalized_message: Option<&str>,
        campaign_name: Option<&str>,
    ) -> Self {
        let name = match full_name.filter(|s| !s.is_empty()) {
            Some(full) => Some(full.to_string()),
            None => {
                let joined = [first_name, last_name]
                    .iter()
                    .filter_map(|part| part.filter(|s| !s.is_empty()))
                    .collect::<Vec<_>>()
                    .join(" ");
                (!joined.is_empty()).then_some(joined)
            }
        };

        let message = personalized_message
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| {
                format!(
                    "Hello, I'm interested in your services on {}",
                    website_url.unwrap_or_default()
                )
            });

        let subject = campaign_name
            .filter(|s| !s.is_empty())
            .unwrap_or("Business Inquiry")
            .to_string();

        Self {
            name,
            email: email_address.filter(|s| !s.is_empty()).map(str::to_string),
            phone: phone_number.filter(|s| !s.is_empty()).map(str::to_string),
            subject: Some(subject),
            message: Some(message),
            company: company_name.filter(|s| !s.is_empty()).map(str::to_string),
            file: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_falls_back_to_first_last() {
        let payload = FormPayload::from_contact_fields(
            None,
            Some("Ada"),
            Some("Lovelace"),
            None,
            None,
            None,
            None,
            None,
            None,
        );
        assert_eq!(payload.name.as_deref(), Some("Ada Lovelace"));
    }

    #[test]
    fn test_subject_and_message_fallbacks() {
        let payload = FormPayload::from_contact_fields(
            Some("Ada"),
            None,
            None,
            None,
            None,
            None,
            Some("https://example.com"),
            None,
            None,
        );
        assert_eq!(payload.subject.as_deref(), Some("Business Inquiry"));
        assert_eq!(
            payload.message.as_deref(),
            Some("Hello, I'm interested in your services on https://example.com")
        );
    }

    #[test]
    fn test_value_for_skips_empty_strings() {
        let payload = FormPayload {
            email: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(payload.value_for(FieldRole::Email), None);
    }
}
