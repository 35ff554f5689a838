//! WebDriver-protocol implementation of the engine's browser capability.
//!
//! Speaks the W3C wire protocol over HTTP against a local chromedriver (or
//! any compatible remote end). The engine only sees [`BrowserDriver`] /
//! [`ControlHandle`]; swapping the backend means swapping this module.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use form_engine::driver::{BrowserDriver, ControlHandle, DriverError, DriverFactory, SelectOption};
use serde_json::{json, Value};

const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

const LABEL_SCRIPT: &str = r#"
var el = arguments[0];
if (el.id) {
    var labels = document.querySelectorAll('label[for="' + el.id + '"]');
    if (labels.length) {
        return Array.prototype.map.call(labels, function (l) { return l.textContent; }).join(' ').trim();
    }
}
var ancestor = el.closest('label');
return ancestor ? ancestor.textContent.trim() : '';
"#;

const DISPLAYED_SCRIPT: &str = r#"
var el = arguments[0];
return !!(el.offsetWidth || el.offsetHeight || el.getClientRects().length);
"#;

const SELECT_OPTIONS_SCRIPT: &str = r#"
return Array.prototype.map.call(arguments[0].options || [], function (o) {
    return { text: o.text, value: o.value, disabled: o.disabled };
});
"#;

const SELECT_BY_TEXT_SCRIPT: &str = r#"
var select = arguments[0];
var wanted = arguments[1];
for (var i = 0; i < select.options.length; i++) {
    if (select.options[i].text === wanted) {
        select.selectedIndex = i;
        select.dispatchEvent(new Event('change', { bubbles: true }));
        return true;
    }
}
return false;
"#;

/// Creates chromedriver-backed sessions.
pub struct WebDriverFactory {
    endpoint: String,
    client: reqwest::Client,
}

impl WebDriverFactory {
    pub fn new(endpoint: impl Into<String>) -> Self {
        let endpoint = endpoint.into().trim_end_matches('/').to_string();
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .expect("reqwest client");
        Self { endpoint, client }
    }
}

#[async_trait]
impl DriverFactory for WebDriverFactory {
    async fn create_session(&self) -> Result<Box<dyn BrowserDriver>, DriverError> {
        let capabilities = json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": {
                        "args": [
                            "--headless=new",
                            "--no-sandbox",
                            "--disable-dev-shm-usage",
                            "--disable-gpu",
                            "--disable-extensions"
                        ]
                    }
                }
            }
        });

        let response = self
            .client
            .post(format!("{}/session", self.endpoint))
            .json(&capabilities)
            .send()
            .await
            .map_err(|e| DriverError::Session(e.to_string()))?;
        let body: Value = response
            .json()
            .await
            .map_err(|e| DriverError::Session(e.to_string()))?;

        let session_id = body["value"]["sessionId"]
            .as_str()
            .ok_or_else(|| DriverError::Session(format!("unexpected session response: {body}")))?;

        Ok(Box::new(WebDriverSession {
            remote: Arc::new(Remote {
                client: self.client.clone(),
                base: format!("{}/session/{}", self.endpoint, session_id),
            }),
        }))
    }
}

struct Remote {
    client: reqwest::Client,
    base: String,
}

impl Remote {
    async fn post(&self, path: &str, body: Value) -> Result<Value, String> {
        let response = self
            .client
            .post(format!("{}{}", self.base, path))
            .json(&body)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        Self::unwrap_value(response).await
    }

    async fn get(&self, path: &str) -> Result<Value, String> {
        let response = self
            .client
            .get(format!("{}{}", self.base, path))
            .send()
            .await
            .map_err(|e| e.to_string())?;
        Self::unwrap_value(response).await
    }

    async fn unwrap_value(response: reqwest::Response) -> Result<Value, String> {
        let status = response.status();
        let body: Value = response.json().await.map_err(|e| e.to_string())?;
        if status.is_success() {
            Ok(body["value"].clone())
        } else {
            let message = body["value"]["message"]
                .as_str()
                .unwrap_or("webdriver error")
                .to_string();
            Err(message)
        }
    }

    async fn execute(&self, script: &str, args: Vec<Value>) -> Result<Value, String> {
        self.post("/execute/sync", json!({ "script": script, "args": args }))
            .await
    }

    fn elements_from(&self, value: Value) -> Vec<Box<dyn ControlHandle>> {
        value
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item[ELEMENT_KEY].as_str())
                    .map(|id| {
                        Box::new(Element {
                            remote: Arc::new(Remote {
                                client: self.client.clone(),
                                base: self.base.clone(),
                            }),
                            id: id.to_string(),
                        }) as Box<dyn ControlHandle>
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

pub struct WebDriverSession {
    remote: Arc<Remote>,
}

#[async_trait]
impl BrowserDriver for WebDriverSession {
    async fn navigate(&self, url: &str) -> Result<(), DriverError> {
        self.remote
            .post("/url", json!({ "url": url }))
            .await
            .map(|_| ())
            .map_err(DriverError::Navigation)
    }

    async fn find_controls(&self) -> Result<Vec<Box<dyn ControlHandle>>, DriverError> {
        self.find_elements("input, textarea, select").await
    }

    async fn find_elements(&self, css: &str) -> Result<Vec<Box<dyn ControlHandle>>, DriverError> {
        let value = self
            .remote
            .post("/elements", json!({ "using": "css selector", "value": css }))
            .await
            .map_err(DriverError::Interaction)?;
        Ok(self.remote.elements_from(value))
    }

    async fn execute_script(&self, js: &str) -> Result<Value, DriverError> {
        self.remote
            .execute(js, vec![])
            .await
            .map_err(DriverError::Script)
    }

    async fn page_source(&self) -> Result<String, DriverError> {
        let value = self
            .remote
            .get("/source")
            .await
            .map_err(DriverError::Session)?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn current_url(&self) -> Result<String, DriverError> {
        let value = self.remote.get("/url").await.map_err(DriverError::Session)?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn quit(&self) {
        let _ = self
            .remote
            .client
            .delete(self.remote.base.clone())
            .send()
            .await;
    }
}

struct Element {
    remote: Arc<Remote>,
    id: String,
}

impl Element {
    fn path(&self, suffix: &str) -> String {
        format!("/element/{}/{}", self.id, suffix)
    }

    fn as_arg(&self) -> Value {
        let mut map = serde_json::Map::new();
        map.insert(ELEMENT_KEY.to_string(), Value::String(self.id.clone()));
        Value::Object(map)
    }

    async fn script(&self, script: &str, extra: Vec<Value>) -> Result<Value, DriverError> {
        let mut args = vec![self.as_arg()];
        args.extend(extra);
        self.remote
            .execute(script, args)
            .await
            .map_err(DriverError::Interaction)
    }
}

#[async_trait]
impl ControlHandle for Element {
    async fn tag_name(&self) -> Result<String, DriverError> {
        let value = self
            .remote
            .get(&self.path("name"))
            .await
            .map_err(DriverError::Interaction)?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn attribute(&self, name: &str) -> Result<Option<String>, DriverError> {
        let value = self
            .remote
            .get(&self.path(&format!("attribute/{name}")))
            .await
            .map_err(DriverError::Interaction)?;
        Ok(value.as_str().map(str::to_string))
    }

    async fn text(&self) -> Result<String, DriverError> {
        let value = self
            .remote
            .get(&self.path("text"))
            .await
            .map_err(DriverError::Interaction)?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn label_text(&self) -> Result<String, DriverError> {
        let value = self.script(LABEL_SCRIPT, vec![]).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn is_displayed(&self) -> Result<bool, DriverError> {
        let value = self.script(DISPLAYED_SCRIPT, vec![]).await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn is_enabled(&self) -> Result<bool, DriverError> {
        let value = self
            .remote
            .get(&self.path("enabled"))
            .await
            .map_err(DriverError::Interaction)?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn is_selected(&self) -> Result<bool, DriverError> {
        let value = self
            .remote
            .get(&self.path("selected"))
            .await
            .map_err(DriverError::Interaction)?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn click(&self) -> Result<(), DriverError> {
        self.remote
            .post(&self.path("click"), json!({}))
            .await
            .map(|_| ())
            .map_err(DriverError::Interaction)
    }

    async fn clear(&self) -> Result<(), DriverError> {
        self.remote
            .post(&self.path("clear"), json!({}))
            .await
            .map(|_| ())
            .map_err(DriverError::Interaction)
    }

    async fn type_text(&self, text: &str) -> Result<(), DriverError> {
        self.remote
            .post(&self.path("value"), json!({ "text": text }))
            .await
            .map(|_| ())
            .map_err(DriverError::Interaction)
    }

    async fn scroll_into_view(&self) -> Result<(), DriverError> {
        self.script("arguments[0].scrollIntoView({block: 'center'});", vec![])
            .await
            .map(|_| ())
    }

    async fn select_options(&self) -> Result<Vec<SelectOption>, DriverError> {
        let value = self.script(SELECT_OPTIONS_SCRIPT, vec![]).await?;
        serde_json::from_value(value).map_err(|e| DriverError::Interaction(e.to_string()))
    }

    async fn select_by_visible_text(&self, text: &str) -> Result<(), DriverError> {
        let value = self
            .script(SELECT_BY_TEXT_SCRIPT, vec![Value::String(text.to_string())])
            .await?;
        if value.as_bool().unwrap_or(false) {
            Ok(())
        } else {
            Err(DriverError::Interaction(format!(
                "no option with text {text:?}"
            )))
        }
    }

    async fn find_children(&self, css: &str) -> Result<Vec<Box<dyn ControlHandle>>, DriverError> {
        let value = self
            .remote
            .post(
                &self.path("elements"),
                json!({ "using": "css selector", "value": css }),
            )
            .await
            .map_err(DriverError::Interaction)?;
        Ok(self.remote.elements_from(value))
    }
}
