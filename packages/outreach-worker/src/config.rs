use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;

use crate::lease::{LOCK_TIMEOUT_MINUTES, MAX_RETRIES};

/// Worker configuration loaded from environment variables.
///
/// Optional services degrade gracefully: a missing CAPTCHA key disables
/// solving, nothing else.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub queue_url: String,
    pub aws_region: Option<String>,
    pub captcha_api_key: Option<String>,
    pub webdriver_url: String,
    /// Long-poll wait per receive call, seconds.
    pub queue_wait_seconds: i32,
    /// Must sit generously above worst-case browser execution time.
    pub visibility_timeout: i32,
    pub max_retries: i32,
    pub lock_timeout_minutes: i64,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            queue_url: env::var("QUEUE_URL").context("QUEUE_URL must be set")?,
            aws_region: env::var("AWS_REGION").ok(),
            captcha_api_key: env::var("API_KEY_2CAPTCHA").ok().filter(|k| !k.is_empty()),
            webdriver_url: env::var("WEBDRIVER_URL")
                .unwrap_or_else(|_| "http://localhost:9515".to_string()),
            queue_wait_seconds: env::var("QUEUE_WAIT_SECONDS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .context("QUEUE_WAIT_SECONDS must be a valid number")?,
            visibility_timeout: env::var("QUEUE_VISIBILITY_TIMEOUT")
                .unwrap_or_else(|_| "1200".to_string())
                .parse()
                .context("QUEUE_VISIBILITY_TIMEOUT must be a valid number")?,
            max_retries: MAX_RETRIES,
            lock_timeout_minutes: LOCK_TIMEOUT_MINUTES,
        })
    }
}
