use std::collections::{HashMap, HashSet};
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use rand::Rng;

use crate::captcha::{self, CaptchaSolver};
use crate::classifier::{classify, matches_keywords};
use crate::driver::{BrowserDriver, ControlHandle, DriverError};
use crate::error::EngineError;
use crate::payload::FormPayload;
use crate::strategy::{resolve_submit_actions, SubmitAction};
use crate::types::{ControlKind, FieldRole, FillReport, OutcomeKind, SubmissionOutcome};

/// Literal markers whose presence in the settled page signals success.
///
/// Intentionally conservative: false negatives feed the retry path, false
/// positives would end a job that never went through.
pub const SUCCESS_MARKERS: &[&str] = &["thank you", "success", "submitted", "received", "sent"];

/// Label text marking a checkbox as a consent control.
pub const CONSENT_LABEL_KEYWORDS: &[&str] = &["accept", "agree", "terms", "consent", "i agree"];

/// Button/link text for consent overlays and cookie banners.
pub const CONSENT_BUTTON_KEYWORDS: &[&str] = &[
    "accept all",
    "accept cookies",
    "agree and continue",
    "i agree",
    "i accept",
    "accept",
    "agree",
];

/// Case-insensitive success-marker check over a page snapshot.
pub fn page_indicates_success(source: &str) -> bool {
    let source = source.to_lowercase();
    SUCCESS_MARKERS.iter().any(|marker| source.contains(marker))
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Pause after navigation before inspecting the page.
    pub navigation_settle: Duration,
    /// Pause after a submit action before the success check.
    pub submit_settle: Duration,
    /// Short pause between element interactions.
    pub interaction_pause: Duration,
    /// Ceiling for the lazy-content scroll loop.
    pub max_scroll_iterations: usize,
    /// Per-control fill attempts before recording a soft note.
    pub max_fill_attempts: usize,
    /// Evidence snapshot length, in characters.
    pub evidence_limit: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            navigation_settle: Duration::from_secs(3),
            submit_settle: Duration::from_secs(5),
            interaction_pause: Duration::from_millis(500),
            max_scroll_iterations: 8,
            max_fill_attempts: 10,
            evidence_limit: 1000,
        }
    }
}

/// Composes the classifier and the submit ladder into a single
/// "attempt to fill and submit this page" operation.
///
/// All DOM access goes through the [`BrowserDriver`] capability; every
/// failure inside an attempt is folded into the returned outcome.
pub struct FormFillOrchestrator {
    config: OrchestratorConfig,
}

impl FormFillOrchestrator {
    pub fn new(config: OrchestratorConfig) -> Self {
        Self { config }
    }

    /// Run one fill-and-submit attempt against `url`.
    ///
    /// The session is owned exclusively by this attempt and is released on
    /// every exit path.
    pub async fn submit(
        &self,
        driver: Box<dyn BrowserDriver>,
        url: &str,
        payload: &FormPayload,
        solver: Option<&dyn CaptchaSolver>,
    ) -> SubmissionOutcome {
        let result = self.run_attempt(driver.as_ref(), url, payload, solver).await;
        driver.quit().await;

        match result {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::warn!(url = %url, error = %err, "attempt ended early");
                let (kind, evidence) = match &err {
                    EngineError::Navigation { .. } => (OutcomeKind::NavigationFailed, String::new()),
                    EngineError::FormNotFound { evidence } => {
                        (OutcomeKind::FormNotFound, evidence.clone())
                    }
                    EngineError::SubmissionExhausted { evidence } => {
                        (OutcomeKind::SubmissionExhausted, evidence.clone())
                    }
                    _ => (OutcomeKind::AttemptError, String::new()),
                };
                SubmissionOutcome::failure(kind, err.to_string(), evidence)
            }
        }
    }

    async fn run_attempt(
        &self,
        driver: &dyn BrowserDriver,
        url: &str,
        payload: &FormPayload,
        solver: Option<&dyn CaptchaSolver>,
    ) -> Result<SubmissionOutcome, EngineError> {
        let mut report = FillReport::default();

        // No retries here; retrying a dead URL is the lease manager's call.
        driver
            .navigate(url)
            .await
            .map_err(|source| EngineError::Navigation {
                url: url.to_string(),
                source,
            })?;
        tokio::time::sleep(self.config.navigation_settle).await;

        self.dismiss_consent_overlays(driver).await;

        let controls = self.enumerate_controls(driver).await?;
        let forms = driver.find_elements("form").await.unwrap_or_default();
        if controls.is_empty() && forms.is_empty() {
            let evidence = self.snapshot(driver).await;
            return Err(EngineError::FormNotFound { evidence });
        }

        let mut seen_radio_groups = HashSet::new();
        self.fill_controls(driver, &controls, payload, &mut report, &mut seen_radio_groups)
            .await;

        // Best-effort auxiliary passes, independent of the main mapping.
        self.fill_decoy_dates(&controls, &mut report).await;
        self.select_list_widget_options(driver, &mut report).await;
        self.select_remaining_radios(driver, &mut report, &mut seen_radio_groups)
            .await;
        self.opt_in_consent_checkboxes(driver, &mut report).await;
        self.dismiss_consent_overlays(driver).await;

        if let Some(solver) = solver {
            match self.solve_captcha(driver, solver).await {
                Ok(true) => report.record("captcha", "solved"),
                Ok(false) => {}
                Err(err) => {
                    // Non-fatal: submit anyway and let the outcome tell the story.
                    tracing::info!(url = %url, error = %err, "captcha handling failed");
                    report.note(format!("captcha handling failed: {err}"));
                }
            }
        }

        let mut applied = false;
        for action in resolve_submit_actions() {
            match self.apply_submit_action(driver, &action).await {
                Ok(true) => {
                    tracing::info!(url = %url, action = %action, "submit action applied");
                    applied = true;
                    tokio::time::sleep(self.config.submit_settle).await;
                    break;
                }
                Ok(false) => continue,
                Err(err) => {
                    tracing::debug!(url = %url, action = %action, error = %err, "submit action raised");
                    continue;
                }
            }
        }

        if !applied {
            let evidence = self.snapshot(driver).await;
            let err = EngineError::SubmissionExhausted {
                evidence: evidence.clone(),
            };
            return Ok(SubmissionOutcome {
                success: false,
                kind: OutcomeKind::SubmissionExhausted,
                error: Some(err.to_string()),
                evidence,
                filled: report,
                submission_time: Utc::now(),
            });
        }

        let settled = driver.page_source().await.unwrap_or_default();
        let success = page_indicates_success(&settled);
        Ok(SubmissionOutcome {
            success,
            kind: OutcomeKind::Attempted,
            error: (!success).then(|| "no success marker in response page".to_string()),
            evidence: self.truncate_evidence(settled),
            filled: report,
            submission_time: Utc::now(),
        })
    }

    /// Enumerate interactive controls, scrolling to trigger lazy-loaded
    /// content. Terminates when controls appear, when the page height
    /// stabilises, or after a fixed iteration ceiling.
    async fn enumerate_controls(
        &self,
        driver: &dyn BrowserDriver,
    ) -> Result<Vec<Box<dyn ControlHandle>>, EngineError> {
        let mut controls = driver.find_controls().await.unwrap_or_default();
        let mut last_height = self.page_height(driver).await;

        for _ in 0..self.config.max_scroll_iterations {
            if !controls.is_empty() {
                break;
            }
            let _ = driver
                .execute_script("window.scrollTo(0, document.body.scrollHeight);")
                .await;
            tokio::time::sleep(self.config.interaction_pause).await;

            controls = driver.find_controls().await.unwrap_or_default();
            let height = self.page_height(driver).await;
            if height == last_height {
                break;
            }
            last_height = height;
        }

        Ok(controls)
    }

    async fn page_height(&self, driver: &dyn BrowserDriver) -> i64 {
        driver
            .execute_script("return document.body.scrollHeight;")
            .await
            .ok()
            .and_then(|v| v.as_i64())
            .unwrap_or(0)
    }

    async fn fill_controls(
        &self,
        driver: &dyn BrowserDriver,
        controls: &[Box<dyn ControlHandle>],
        payload: &FormPayload,
        report: &mut FillReport,
        seen_radio_groups: &mut HashSet<String>,
    ) {
        for control in controls {
            if !control.is_displayed().await.unwrap_or(false) {
                continue;
            }
            let tag = control.tag_name().await.unwrap_or_default().to_lowercase();
            let input_type = control
                .attribute("type")
                .await
                .ok()
                .flatten()
                .unwrap_or_default()
                .to_lowercase();

            // Submit candidates are located by the ladder, not filled here.
            if matches!(input_type.as_str(), "hidden" | "submit" | "button" | "image") {
                continue;
            }

            let attributes = collect_attributes(control.as_ref()).await;
            let label = control.label_text().await.unwrap_or_default();
            let kind = control_kind(&tag, &input_type);
            let role = classify(&attributes, &label, kind, &input_type);

            match kind {
                ControlKind::File => {
                    if let Some(path) = payload.value_for(FieldRole::File) {
                        match control.type_text(path).await {
                            Ok(()) => report.record("file", path),
                            Err(err) => report.note(format!("file upload failed: {err}")),
                        }
                    }
                }
                ControlKind::Checkbox => {
                    // Opt-in controls: toggle on if unset. Consent-specific
                    // handling runs again in the auxiliary pass.
                    if !control.is_selected().await.unwrap_or(false) {
                        match control.click().await {
                            Ok(()) => report.record("subscribe", "true"),
                            Err(err) => report.note(format!("checkbox click failed: {err}")),
                        }
                    }
                }
                ControlKind::Radio => {
                    let group = attributes
                        .get("name")
                        .cloned()
                        .unwrap_or_else(|| "__unnamed__".to_string());
                    if seen_radio_groups.insert(group.clone())
                        && control.is_enabled().await.unwrap_or(false)
                    {
                        match control.click().await {
                            Ok(()) => report.record(format!("radio:{group}"), "first"),
                            Err(err) => report.note(format!("radio click failed: {err}")),
                        }
                    }
                }
                ControlKind::Select => {
                    self.fill_select(control.as_ref(), role, payload, report).await;
                }
                ControlKind::Text | ControlKind::Textarea => {
                    let role = role.or_else(|| {
                        // Short message-like placeholders are a usable last hint.
                        attributes
                            .get("placeholder")
                            .filter(|p| p.len() < 30 && p.to_lowercase().contains("message"))
                            .map(|_| FieldRole::Message)
                    });
                    let Some(role) = role else { continue };
                    let Some(value) = payload.value_for(role) else {
                        continue;
                    };
                    self.fill_text_control(driver, control.as_ref(), role, value, report)
                        .await;
                }
            }
        }
    }

    async fn fill_select(
        &self,
        control: &dyn ControlHandle,
        role: Option<FieldRole>,
        payload: &FormPayload,
        report: &mut FillReport,
    ) {
        let options = match control.select_options().await {
            Ok(options) => options,
            Err(err) => {
                report.note(format!("select error: {err}"));
                return;
            }
        };

        let wanted = role.and_then(|r| payload.value_for(r)).map(str::to_lowercase);
        let chosen = wanted
            .as_deref()
            .and_then(|needle| {
                options
                    .iter()
                    .find(|option| option.text.to_lowercase().contains(needle))
            })
            .or_else(|| {
                // First enabled non-placeholder option.
                options
                    .iter()
                    .find(|option| !option.value.is_empty() && !option.disabled)
            });

        if let Some(option) = chosen {
            match control.select_by_visible_text(&option.text).await {
                Ok(()) => {
                    let key = role
                        .map(|r| format!("select:{r}"))
                        .unwrap_or_else(|| "select".to_string());
                    report.record(key, option.text.clone());
                }
                Err(err) => report.note(format!("select error: {err}")),
            }
        }
    }

    /// Clear-and-type with bounded retries, scrolling the control into view
    /// before each attempt. Exhausting retries is a soft note, never an abort.
    async fn fill_text_control(
        &self,
        driver: &dyn BrowserDriver,
        control: &dyn ControlHandle,
        role: FieldRole,
        value: &str,
        report: &mut FillReport,
    ) {
        let mut last_error: Option<DriverError> = None;
        for attempt in 0..self.config.max_fill_attempts {
            if attempt == 0 {
                let _ = driver.execute_script("window.scrollBy(0, -300);").await;
            } else {
                let _ = control.scroll_into_view().await;
            }
            let _ = control.clear().await;

            let interaction = match control.click().await {
                Ok(()) => control.type_text(value).await,
                Err(err) => Err(err),
            };
            match interaction {
                Ok(()) => {
                    report.record(role.as_str(), value);
                    return;
                }
                Err(err) => last_error = Some(err),
            }
        }
        if let Some(err) = last_error {
            report.note(format!("couldn't fill {role}: {err}"));
        }
    }

    /// Fill date-of-birth-looking and pattern-matched date inputs with a
    /// pseudo-random date. Decoy values: many forms require these fields
    /// non-empty even for a plain contact enquiry.
    async fn fill_decoy_dates(&self, controls: &[Box<dyn ControlHandle>], report: &mut FillReport) {
        for control in controls {
            if !control.is_displayed().await.unwrap_or(false) {
                continue;
            }
            let input_type = control
                .attribute("type")
                .await
                .ok()
                .flatten()
                .unwrap_or_default()
                .to_lowercase();
            if input_type == "checkbox" || input_type == "radio" || input_type == "file" {
                continue;
            }

            let attributes = collect_attributes(control.as_ref()).await;
            let pattern = control
                .attribute("pattern")
                .await
                .ok()
                .flatten()
                .unwrap_or_default();
            let placeholder = attributes
                .get("placeholder")
                .cloned()
                .unwrap_or_default()
                .to_lowercase();

            let date_like = input_type == "date"
                || ["name", "id", "placeholder"].iter().any(|attr| {
                    attributes
                        .get(*attr)
                        .map(|v| {
                            let v = v.to_lowercase();
                            v.contains("dob") || v.contains("birth")
                        })
                        .unwrap_or(false)
                });
            let pattern_like =
                pattern.contains("[0-9]{4}-[0-9]{2}-[0-9]{2}") || placeholder.contains("yyyy");

            if !date_like && !pattern_like {
                continue;
            }

            let value = random_date_since_1995();
            let _ = control.scroll_into_view().await;
            let _ = control.clear().await;
            let ok = control.click().await.is_ok() && control.type_text(&value).await.is_ok();
            if ok {
                let key = attributes
                    .get("name")
                    .or_else(|| attributes.get("id"))
                    .cloned()
                    .unwrap_or_else(|| "date".to_string());
                report.record(format!("date:{key}"), value);
            }
        }
    }

    /// Open custom dropdown widgets built from list markup and pick the
    /// first visible option.
    async fn select_list_widget_options(&self, driver: &dyn BrowserDriver, report: &mut FillReport) {
        let lists = driver.find_elements("ul").await.unwrap_or_default();
        for list in lists {
            if !list.is_displayed().await.unwrap_or(false) {
                continue;
            }
            let class = list
                .attribute("class")
                .await
                .ok()
                .flatten()
                .unwrap_or_default()
                .to_lowercase();
            let role = list
                .attribute("role")
                .await
                .ok()
                .flatten()
                .unwrap_or_default()
                .to_lowercase();
            let looks_like_dropdown = class.contains("dropdown")
                || class.contains("select")
                || matches!(role.as_str(), "listbox" | "menu");
            if !looks_like_dropdown {
                continue;
            }

            let _ = list.scroll_into_view().await;
            let _ = list.click().await;
            tokio::time::sleep(self.config.interaction_pause).await;

            let items = list.find_children("li").await.unwrap_or_default();
            for item in items {
                if item.is_displayed().await.unwrap_or(false) {
                    if item.click().await.is_ok() {
                        let key = list
                            .attribute("id")
                            .await
                            .ok()
                            .flatten()
                            .unwrap_or_else(|| "list-widget".to_string());
                        let text = item.text().await.unwrap_or_else(|_| "first_option".to_string());
                        report.record(format!("select:{key}"), text);
                    }
                    break;
                }
            }
        }
    }

    /// One selection per radio group not already handled by the main pass.
    async fn select_remaining_radios(
        &self,
        driver: &dyn BrowserDriver,
        report: &mut FillReport,
        seen_radio_groups: &mut HashSet<String>,
    ) {
        let radios = driver
            .find_elements("input[type='radio']")
            .await
            .unwrap_or_default();
        for radio in radios {
            let group = radio
                .attribute("name")
                .await
                .ok()
                .flatten()
                .unwrap_or_else(|| "__unnamed__".to_string());
            if seen_radio_groups.contains(&group) {
                continue;
            }
            if radio.is_displayed().await.unwrap_or(false)
                && radio.is_enabled().await.unwrap_or(false)
                && radio.click().await.is_ok()
            {
                seen_radio_groups.insert(group.clone());
                report.record(format!("radio:{group}"), "first");
            }
        }
    }

    /// Consent checkboxes are always opted in, independent of classification:
    /// unconsented forms commonly refuse submission server-side.
    async fn opt_in_consent_checkboxes(&self, driver: &dyn BrowserDriver, report: &mut FillReport) {
        let checkboxes = driver
            .find_elements("input[type='checkbox']")
            .await
            .unwrap_or_default();
        for checkbox in checkboxes {
            if !checkbox.is_displayed().await.unwrap_or(false) {
                continue;
            }
            let label = checkbox.label_text().await.unwrap_or_default();
            if !matches_keywords(&label, CONSENT_LABEL_KEYWORDS) {
                continue;
            }
            if !checkbox.is_selected().await.unwrap_or(false) && checkbox.click().await.is_ok() {
                let key = collect_attributes(checkbox.as_ref())
                    .await
                    .get("name")
                    .cloned()
                    .unwrap_or_else(|| "consent".to_string());
                report.record(format!("consent:{key}"), "true");
            }
        }
    }

    /// Click visible consent-styled buttons/links. Best-effort; failures are
    /// never fatal.
    async fn dismiss_consent_overlays(&self, driver: &dyn BrowserDriver) {
        let candidates = driver.find_elements("button, a").await.unwrap_or_default();
        for candidate in candidates {
            if !candidate.is_displayed().await.unwrap_or(false) {
                continue;
            }
            let text = candidate
                .text()
                .await
                .unwrap_or_default()
                .trim()
                .to_lowercase();
            if text.is_empty() || !CONSENT_BUTTON_KEYWORDS.iter().any(|kw| text.contains(kw)) {
                continue;
            }
            let _ = candidate.click().await;
        }
    }

    async fn solve_captcha(
        &self,
        driver: &dyn BrowserDriver,
        solver: &dyn CaptchaSolver,
    ) -> Result<bool, EngineError> {
        let Some(challenge) = captcha::detect_recaptcha(driver).await? else {
            return Ok(false);
        };
        tracing::info!(site_key = %challenge.site_key, "recaptcha challenge detected");

        let page_url = driver.current_url().await.unwrap_or_default();
        let token = solver
            .solve_recaptcha(&challenge.site_key, &page_url)
            .await
            .map_err(|_| EngineError::CaptchaUnsolved)?
            .ok_or(EngineError::CaptchaUnsolved)?;

        captcha::inject_token(driver, &token).await?;
        Ok(true)
    }

    async fn apply_submit_action(
        &self,
        driver: &dyn BrowserDriver,
        action: &SubmitAction,
    ) -> Result<bool, DriverError> {
        match action {
            SubmitAction::ClickSelector { selector } => {
                for candidate in driver.find_elements(selector).await? {
                    if candidate.is_displayed().await.unwrap_or(false) {
                        let _ = candidate.scroll_into_view().await;
                        candidate.click().await?;
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            SubmitAction::ClickByText { keywords } => {
                for button in driver.find_elements("button").await? {
                    if !button.is_displayed().await.unwrap_or(false) {
                        continue;
                    }
                    let text = button.text().await.unwrap_or_default().to_lowercase();
                    if keywords.iter().any(|kw| text.contains(kw)) {
                        let _ = button.scroll_into_view().await;
                        button.click().await?;
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            SubmitAction::NativeSubmit => {
                driver
                    .execute_script("document.querySelector('form').submit();")
                    .await?;
                Ok(true)
            }
        }
    }

    async fn snapshot(&self, driver: &dyn BrowserDriver) -> String {
        self.truncate_evidence(driver.page_source().await.unwrap_or_default())
    }

    fn truncate_evidence(&self, source: String) -> String {
        if source.chars().count() <= self.config.evidence_limit {
            source
        } else {
            source.chars().take(self.config.evidence_limit).collect()
        }
    }
}

fn control_kind(tag: &str, input_type: &str) -> ControlKind {
    match tag {
        "textarea" => ControlKind::Textarea,
        "select" => ControlKind::Select,
        _ => match input_type {
            "checkbox" => ControlKind::Checkbox,
            "radio" => ControlKind::Radio,
            "file" => ControlKind::File,
            _ => ControlKind::Text,
        },
    }
}

async fn collect_attributes(control: &dyn ControlHandle) -> HashMap<String, String> {
    let mut attributes = HashMap::new();
    for name in ["name", "id", "placeholder", "aria-label", "title", "class"] {
        if let Ok(Some(value)) = control.attribute(name).await {
            if !value.is_empty() {
                attributes.insert(name.to_string(), value);
            }
        }
    }
    attributes
}

/// Uniform pseudo-random date in [1995-01-01, today], formatted YYYY-MM-DD.
fn random_date_since_1995() -> String {
    let start = NaiveDate::from_ymd_opt(1995, 1, 1).expect("valid date");
    let today = Utc::now().date_naive();
    let span = (today - start).num_days();
    if span <= 0 {
        return today.format("%Y-%m-%d").to_string();
    }
    let offset = rand::thread_rng().gen_range(0..=span);
    (start + chrono::Duration::days(offset))
        .format("%Y-%m-%d")
        .to_string()
}
