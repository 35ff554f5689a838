// https://2captcha.com/2captcha-api#solving_recaptchav2_new

use std::collections::HashMap;
use std::time::Duration;

pub mod models;

use crate::models::ApiResponse;
use reqwest::Client;

const SUBMIT_URL: &str = "http://2captcha.com/in.php";
const RESULT_URL: &str = "http://2captcha.com/res.php";

/// How often and how long to poll for an answer.
const POLL_INTERVAL: Duration = Duration::from_secs(5);
const MAX_POLL_ATTEMPTS: usize = 15;

#[derive(Debug, Clone)]
pub struct TwoCaptchaOptions {
    pub api_key: String,
}

#[derive(Debug, Clone)]
pub struct TwoCaptchaService {
    options: TwoCaptchaOptions,
}

impl TwoCaptchaService {
    pub fn new(options: TwoCaptchaOptions) -> Self {
        Self { options }
    }

    /// Submit a reCAPTCHA v2 challenge, returning the challenge id to poll.
    pub async fn submit_recaptcha(
        &self,
        site_key: &str,
        page_url: &str,
    ) -> Result<String, &'static str> {
        let mut form_body: HashMap<&str, &str> = HashMap::new();
        form_body.insert("key", &self.options.api_key);
        form_body.insert("method", "userrecaptcha");
        form_body.insert("googlekey", site_key);
        form_body.insert("pageurl", page_url);
        form_body.insert("json", "1");

        let client = Client::new();
        let res = client.post(SUBMIT_URL).form(&form_body).send().await;

        match res {
            Ok(response) => {
                let status = response.status();
                if !status.is_success() {
                    let error_body = response.text().await.unwrap_or_default();
                    eprintln!("2Captcha error ({}): {}", status, error_body);
                    return Err("2Captcha returned an error");
                }
                match response.json::<ApiResponse>().await {
                    Ok(data) if data.is_ok() => Ok(data.request),
                    Ok(data) => {
                        eprintln!("2Captcha rejected challenge: {}", data.request);
                        Err("2Captcha rejected the challenge")
                    }
                    Err(e) => {
                        eprintln!("Failed to parse 2Captcha response: {}", e);
                        Err("Error parsing 2Captcha response")
                    }
                }
            }
            Err(e) => {
                eprintln!("Request to 2Captcha failed: {}", e);
                Err("Error submitting challenge")
            }
        }
    }

    /// Poll once for a solved token. `Ok(None)` means not ready yet.
    pub async fn poll(&self, challenge_id: &str) -> Result<Option<String>, &'static str> {
        let url = format!(
            "{}?key={}&action=get&id={}&json=1",
            RESULT_URL, self.options.api_key, challenge_id
        );

        let client = Client::new();
        let res = client.get(url).send().await;

        match res {
            Ok(response) => match response.json::<ApiResponse>().await {
                Ok(data) if data.is_ok() => Ok(Some(data.request)),
                Ok(data) if data.is_pending() => Ok(None),
                Ok(data) => {
                    eprintln!("2Captcha poll error: {}", data.request);
                    Err("2Captcha could not solve the challenge")
                }
                Err(e) => {
                    eprintln!("Failed to parse 2Captcha poll response: {}", e);
                    Err("Error parsing 2Captcha response")
                }
            },
            Err(e) => {
                eprintln!("Request to 2Captcha failed: {}", e);
                Err("Error polling challenge")
            }
        }
    }

    /// Submit then poll until solved or the attempt budget runs out.
    /// `Ok(None)` means the budget ran out without an answer.
    pub async fn solve_recaptcha(
        &self,
        site_key: &str,
        page_url: &str,
    ) -> Result<Option<String>, &'static str> {
        let challenge_id = self.submit_recaptcha(site_key, page_url).await?;

        for _ in 0..MAX_POLL_ATTEMPTS {
            tokio::time::sleep(POLL_INTERVAL).await;
            if let Some(token) = self.poll(&challenge_id).await? {
                return Ok(Some(token));
            }
        }
        Ok(None)
    }
}
