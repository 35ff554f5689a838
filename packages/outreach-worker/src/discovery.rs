use std::collections::HashSet;
use std::time::Duration;

use anyhow::{Context, Result};
use scraper::{Html, Selector};
use url::Url;

/// Finds a target's "contact us" page when the job record does not already
/// carry one. HTTP + static HTML only; JS-rendered navigation falls through
/// to the browser-driven attempt itself.
pub struct ContactPageDiscovery {
    client: reqwest::Client,
}

impl ContactPageDiscovery {
    pub fn new() -> Result<Self> {
        // Use a browser-like User-Agent to avoid bot detection
        let user_agent = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::ACCEPT,
            "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"
                .parse()
                .unwrap(),
        );
        headers.insert(
            reqwest::header::ACCEPT_LANGUAGE,
            "en-US,en;q=0.5".parse().unwrap(),
        );

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(user_agent)
            .default_headers(headers)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client })
    }

    /// Fetch the website and look for a contact page. `Ok(None)` means the
    /// site answered but no usable candidate was found.
    pub async fn discover(&self, website_url: &str) -> Result<Option<Url>> {
        let website = ensure_scheme(website_url);
        let response = self
            .client
            .get(&website)
            .send()
            .await
            .context("website fetch failed")?;

        let final_url = response.url().clone();
        let html = response.text().await.context("failed to read website body")?;

        let Some(candidate) = find_contact_url_in_html(&html, &final_url) else {
            tracing::debug!(website = %website, "no contact link found");
            return Ok(None);
        };

        if self.validate(&candidate).await {
            tracing::info!(website = %website, contact_url = %candidate, "contact page discovered");
            Ok(Some(candidate))
        } else {
            tracing::debug!(website = %website, candidate = %candidate, "contact candidate failed validation");
            Ok(None)
        }
    }

    /// Check that the candidate answers with a non-empty HTML response.
    async fn validate(&self, url: &Url) -> bool {
        match self.client.get(url.clone()).send().await {
            Ok(response) => match response.text().await {
                Ok(body) => !body.is_empty(),
                Err(_) => false,
            },
            Err(_) => false,
        }
    }
}

/// Find a contact page URL in an HTML document: anchors whose text or href
/// mentions "contact", then forms whose action does. Returns the first
/// candidate that normalises against the base URL.
pub fn find_contact_url_in_html(html: &str, base_url: &Url) -> Option<Url> {
    let document = Html::parse_document(html);
    let mut candidates: Vec<String> = Vec::new();

    if let Ok(anchors) = Selector::parse("a[href]") {
        for anchor in document.select(&anchors) {
            let Some(href) = anchor.value().attr("href") else {
                continue;
            };
            let text = anchor.text().collect::<String>().to_lowercase();
            if text.contains("contact") || href.to_lowercase().contains("contact") {
                candidates.push(href.to_string());
            }
        }
    }

    if let Ok(forms) = Selector::parse("form[action]") {
        for form in document.select(&forms) {
            if let Some(action) = form.value().attr("action") {
                if action.to_lowercase().contains("contact") {
                    candidates.push(action.to_string());
                }
            }
        }
    }

    let mut seen = HashSet::new();
    for href in candidates {
        if href.starts_with("javascript:") || href.starts_with('#') {
            continue;
        }
        if let Ok(full) = base_url.join(&href) {
            if seen.insert(full.to_string()) {
                return Some(full);
            }
        }
    }
    None
}

fn ensure_scheme(website: &str) -> String {
    if website.starts_with("http://") || website.starts_with("https://") {
        website.to_string()
    } else {
        format!("http://{website}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://example.com/").unwrap()
    }

    #[test]
    fn test_finds_contact_link_by_text() {
        let html = r#"<html><body>
            <a href="/about">About</a>
            <a href="/reach-us">Contact Us</a>
        </body></html>"#;
        let found = find_contact_url_in_html(html, &base()).unwrap();
        assert_eq!(found.as_str(), "https://example.com/reach-us");
    }

    #[test]
    fn test_finds_contact_link_by_href() {
        let html = r#"<html><body><a href="/contact.html">Get in touch</a></body></html>"#;
        let found = find_contact_url_in_html(html, &base()).unwrap();
        assert_eq!(found.as_str(), "https://example.com/contact.html");
    }

    #[test]
    fn test_finds_form_action() {
        let html = r#"<html><body><form action="/contact-submit"><input name="email"></form></body></html>"#;
        let found = find_contact_url_in_html(html, &base()).unwrap();
        assert_eq!(found.as_str(), "https://example.com/contact-submit");
    }

    #[test]
    fn test_skips_javascript_and_fragment_links() {
        let html = r##"<html><body>
            <a href="javascript:void(0)">Contact</a>
            <a href="#contact">Contact</a>
        </body></html>"##;
        assert!(find_contact_url_in_html(html, &base()).is_none());
    }

    #[test]
    fn test_absolute_links_pass_through() {
        let html = r#"<html><body><a href="https://other.example.net/contact">Contact</a></body></html>"#;
        let found = find_contact_url_in_html(html, &base()).unwrap();
        assert_eq!(found.as_str(), "https://other.example.net/contact");
    }

    #[test]
    fn test_no_candidates() {
        let html = "<html><body><p>Nothing to see</p></body></html>";
        assert!(find_contact_url_in_html(html, &base()).is_none());
    }

    #[test]
    fn test_ensure_scheme() {
        assert_eq!(ensure_scheme("example.com"), "http://example.com");
        assert_eq!(ensure_scheme("https://example.com"), "https://example.com");
    }
}
