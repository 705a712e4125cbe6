//! Minimal W3C WebDriver wire client over HTTP. Only the endpoints the
//! audit flows need; responses are `{"value": ...}` envelopes, errors carry
//! `{"value": {"error", "message"}}`.

use std::time::Duration;

use serde_json::{json, Value};
use url::Url;

use super::DriverError;

/// W3C element identifier key in element references.
pub const ELEMENT_KEY: &str = "element-6066-11e4-a852-e4f5c35dcc7d";

/// Keyboard codepoints used by the audit flows.
pub const KEY_SHIFT: char = '\u{E008}';
pub const KEY_ARROW_DOWN: char = '\u{E015}';

/// Opaque element handle returned by element finds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementRef(pub String);

/// Extract the payload out of a WebDriver response envelope, mapping
/// protocol-level errors to [`DriverError`].
pub(crate) fn unwrap_value(http_status: u16, mut body: Value) -> Result<Value, DriverError> {
    let value = body
        .get_mut("value")
        .map(Value::take)
        .unwrap_or(Value::Null);
    let protocol_error = value.get("error").and_then(Value::as_str).map(str::to_string);
    if http_status >= 400 || protocol_error.is_some() {
        let error = protocol_error.unwrap_or_else(|| format!("http {http_status}"));
        let message = value
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        if error == "no such element" {
            return Err(DriverError::ElementNotFound(message));
        }
        return Err(DriverError::Protocol { error, message });
    }
    Ok(value)
}

pub(crate) fn element_from_value(value: &Value) -> Result<ElementRef, DriverError> {
    value
        .get(ELEMENT_KEY)
        .and_then(Value::as_str)
        .map(|id| ElementRef(id.to_string()))
        .ok_or_else(|| DriverError::Protocol {
            error: "invalid element reference".into(),
            message: value.to_string(),
        })
}

/// Key action sequence pressing `keys` in order and releasing in reverse,
/// so chords like Shift+N work.
pub(crate) fn key_chord_actions(keys: &[char]) -> Value {
    let mut actions = Vec::new();
    for k in keys {
        actions.push(json!({"type": "keyDown", "value": k.to_string()}));
    }
    for k in keys.iter().rev() {
        actions.push(json!({"type": "keyUp", "value": k.to_string()}));
    }
    json!({"actions": [{"type": "key", "id": "keyboard", "actions": actions}]})
}

pub struct WebDriverClient {
    http: reqwest::Client,
    base: Url,
    session_id: Option<String>,
}

impl WebDriverClient {
    pub fn new(webdriver_url: &str, timeout: Duration) -> Result<Self, DriverError> {
        let mut normalized = webdriver_url.trim_end_matches('/').to_string();
        normalized.push('/');
        let base = Url::parse(&normalized)
            .map_err(|e| DriverError::Session(format!("invalid webdriver url: {e}")))?;
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base,
            session_id: None,
        })
    }

    #[must_use]
    pub fn has_session(&self) -> bool {
        self.session_id.is_some()
    }

    fn endpoint(&self, path: &str) -> Result<Url, DriverError> {
        self.base
            .join(path)
            .map_err(|e| DriverError::Session(format!("invalid endpoint {path}: {e}")))
    }

    fn session_path(&self, tail: &str) -> Result<String, DriverError> {
        let sid = self
            .session_id
            .as_deref()
            .ok_or_else(|| DriverError::Session("no active session".into()))?;
        if tail.is_empty() {
            Ok(format!("session/{sid}"))
        } else {
            Ok(format!("session/{sid}/{tail}"))
        }
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value, DriverError> {
        let resp = self.http.post(self.endpoint(path)?).json(body).send().await?;
        let status = resp.status().as_u16();
        unwrap_value(status, resp.json().await?)
    }

    async fn get(&self, path: &str) -> Result<Value, DriverError> {
        let resp = self.http.get(self.endpoint(path)?).send().await?;
        let status = resp.status().as_u16();
        unwrap_value(status, resp.json().await?)
    }

    async fn delete(&self, path: &str) -> Result<Value, DriverError> {
        let resp = self.http.delete(self.endpoint(path)?).send().await?;
        let status = resp.status().as_u16();
        unwrap_value(status, resp.json().await?)
    }

    /// Create a session with the given `capabilities` payload.
    pub async fn create_session(&mut self, capabilities: &Value) -> Result<(), DriverError> {
        let value = self.post("session", capabilities).await?;
        let sid = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| DriverError::Session(format!("no sessionId in response: {value}")))?;
        self.session_id = Some(sid.to_string());
        Ok(())
    }

    pub async fn end_session(&mut self) -> Result<(), DriverError> {
        if self.session_id.is_some() {
            let path = self.session_path("")?;
            self.delete(&path).await?;
            self.session_id = None;
        }
        Ok(())
    }

    pub async fn navigate(&self, url: &str) -> Result<(), DriverError> {
        let path = self.session_path("url")?;
        self.post(&path, &json!({"url": url})).await.map(|_| ())
    }

    pub async fn current_url(&self) -> Result<String, DriverError> {
        let path = self.session_path("url")?;
        let value = self.get(&path).await?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| DriverError::Protocol {
                error: "invalid url response".into(),
                message: value.to_string(),
            })
    }

    pub async fn refresh(&self) -> Result<(), DriverError> {
        let path = self.session_path("refresh")?;
        self.post(&path, &json!({})).await.map(|_| ())
    }

    /// Execute synchronous script in the page; returns its value.
    pub async fn execute(&self, script: &str, args: Value) -> Result<Value, DriverError> {
        let path = self.session_path("execute/sync")?;
        self.post(&path, &json!({"script": script, "args": args}))
            .await
    }

    pub async fn find_element(&self, using: &str, value: &str) -> Result<ElementRef, DriverError> {
        let path = self.session_path("element")?;
        let v = self
            .post(&path, &json!({"using": using, "value": value}))
            .await?;
        element_from_value(&v)
    }

    pub async fn find_elements(
        &self,
        using: &str,
        value: &str,
    ) -> Result<Vec<ElementRef>, DriverError> {
        let path = self.session_path("elements")?;
        let v = self
            .post(&path, &json!({"using": using, "value": value}))
            .await?;
        let arr = v.as_array().cloned().unwrap_or_default();
        arr.iter().map(element_from_value).collect()
    }

    /// Element-scoped find, for digging inside a known container.
    pub async fn find_element_from(
        &self,
        el: &ElementRef,
        using: &str,
        value: &str,
    ) -> Result<ElementRef, DriverError> {
        let path = self.session_path(&format!("element/{}/element", el.0))?;
        let v = self
            .post(&path, &json!({"using": using, "value": value}))
            .await?;
        element_from_value(&v)
    }

    pub async fn element_attr(
        &self,
        el: &ElementRef,
        name: &str,
    ) -> Result<Option<String>, DriverError> {
        let path = self.session_path(&format!("element/{}/attribute/{name}", el.0))?;
        let v = self.get(&path).await?;
        Ok(v.as_str().map(str::to_string))
    }

    pub async fn element_text(&self, el: &ElementRef) -> Result<String, DriverError> {
        let path = self.session_path(&format!("element/{}/text", el.0))?;
        let v = self.get(&path).await?;
        Ok(v.as_str().unwrap_or_default().to_string())
    }

    pub async fn element_click(&self, el: &ElementRef) -> Result<(), DriverError> {
        let path = self.session_path(&format!("element/{}/click", el.0))?;
        self.post(&path, &json!({})).await.map(|_| ())
    }

    pub async fn element_send_keys(&self, el: &ElementRef, text: &str) -> Result<(), DriverError> {
        let path = self.session_path(&format!("element/{}/value", el.0))?;
        self.post(&path, &json!({"text": text})).await.map(|_| ())
    }

    /// Press and release a key chord via the actions endpoint.
    pub async fn key_chord(&self, keys: &[char]) -> Result<(), DriverError> {
        let path = self.session_path("actions")?;
        self.post(&path, &key_chord_actions(keys)).await.map(|_| ())
    }
}
