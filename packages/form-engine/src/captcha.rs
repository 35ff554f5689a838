use async_trait::async_trait;
use url::Url;

use crate::driver::{BrowserDriver, DriverError};

/// Pluggable CAPTCHA-solving capability.
///
/// Returns `Ok(None)` when the service gave up within its budget; the
/// orchestrator treats that the same as absence of the capability.
#[async_trait]
pub trait CaptchaSolver: Send + Sync {
    async fn solve_recaptcha(&self, site_key: &str, page_url: &str) -> anyhow::Result<Option<String>>;
}

/// An embedded reCAPTCHA challenge found on the page.
#[derive(Debug, Clone)]
pub struct CaptchaChallenge {
    pub site_key: String,
    pub frame_src: String,
}

/// Extract the `k` site-key parameter from a challenge iframe src.
pub fn site_key_from_frame_src(src: &str) -> Option<String> {
    let url = Url::parse(src).ok()?;
    url.query_pairs()
        .find(|(key, _)| key == "k")
        .map(|(_, value)| value.into_owned())
        .filter(|v| !v.is_empty())
}

/// Scan page iframes for a recoverable reCAPTCHA challenge.
pub async fn detect_recaptcha(
    driver: &dyn BrowserDriver,
) -> Result<Option<CaptchaChallenge>, DriverError> {
    for frame in driver.find_elements("iframe").await? {
        let Some(src) = frame.attribute("src").await? else {
            continue;
        };
        if !src.contains("google.com/recaptcha") {
            continue;
        }
        if let Some(site_key) = site_key_from_frame_src(&src) {
            return Ok(Some(CaptchaChallenge {
                site_key,
                frame_src: src,
            }));
        }
    }
    Ok(None)
}

/// Inject a solved token into the hidden response element and fire the
/// change event most integrations listen for.
pub async fn inject_token(driver: &dyn BrowserDriver, token: &str) -> Result<(), DriverError> {
    let sanitized: String = token
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        .collect();
    driver
        .execute_script(&format!(
            r#"document.getElementById("g-recaptcha-response").innerHTML="{sanitized}";"#
        ))
        .await?;
    driver
        .execute_script(
            r#"document.getElementById("g-recaptcha-response").dispatchEvent(new Event("change"));"#,
        )
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_site_key_extraction() {
        let src = "https://www.google.com/recaptcha/api2/anchor?ar=1&k=6LdSiteKey123&co=aHR0cHM&hl=en";
        assert_eq!(
            site_key_from_frame_src(src).as_deref(),
            Some("6LdSiteKey123")
        );
    }

    #[test]
    fn test_site_key_missing_or_invalid() {
        assert_eq!(
            site_key_from_frame_src("https://www.google.com/recaptcha/api2/anchor?hl=en"),
            None
        );
        assert_eq!(site_key_from_frame_src("not a url"), None);
        assert_eq!(
            site_key_from_frame_src("https://www.google.com/recaptcha/api2/anchor?k="),
            None
        );
    }
}
