use anyhow::anyhow;
use async_trait::async_trait;
use form_engine::CaptchaSolver;
use twocaptcha::{TwoCaptchaOptions, TwoCaptchaService};

/// Adapts the 2Captcha client to the engine's solving capability.
pub struct TwoCaptchaSolver {
    service: TwoCaptchaService,
}

impl TwoCaptchaSolver {
    pub fn new(api_key: String) -> Self {
        Self {
            service: TwoCaptchaService::new(TwoCaptchaOptions { api_key }),
        }
    }
}

#[async_trait]
impl CaptchaSolver for TwoCaptchaSolver {
    async fn solve_recaptcha(
        &self,
        site_key: &str,
        page_url: &str,
    ) -> anyhow::Result<Option<String>> {
        self.service
            .solve_recaptcha(site_key, page_url)
            .await
            .map_err(|e| anyhow!(e))
    }
}
