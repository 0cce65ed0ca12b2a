//! HTTP completion client for `appcat enrich`.
//!
//! Speaks the chat-completions wire shape: one system message, one user
//! message carrying the prompt, JSON-object response format. Status codes
//! are classified once here; the engine decides what a failure means for
//! the run.

use std::time::Duration;

use serde_json::json;
use tracing::debug;

use appcat_catalog::{CompletionClient, CompletionError, CompletionRequest};

const USER_AGENT: &str = concat!("appcat/", env!("CARGO_PKG_VERSION"));

const SYSTEM_PROMPT: &str = "You describe educational software for a school's application catalog. \
Answer with a single JSON object and nothing else.";

pub struct HttpCompletionClient {
    http: reqwest::blocking::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

impl HttpCompletionClient {
    pub fn new(
        endpoint: &str,
        model: &str,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, String> {
        let http = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| format!("failed to build HTTP client: {}", e))?;

        Ok(Self {
            http,
            endpoint: endpoint.to_string(),
            model: model.to_string(),
            api_key,
        })
    }

    fn body(&self, request: &CompletionRequest) -> serde_json::Value {
        json!({
            "model": self.model,
            "temperature": 0.2,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": request.prompt },
            ],
        })
    }
}

/// Pull a readable message out of an error body, falling back to the status.
fn error_message(body: &serde_json::Value, status: u16) -> String {
    body.get("error")
        .and_then(|e| e.get("message").or(Some(e)))
        .and_then(|m| m.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| format!("HTTP {}", status))
}

impl CompletionClient for HttpCompletionClient {
    fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        let mut req = self.http.post(&self.endpoint).json(&self.body(request));
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let resp = req
            .send()
            .map_err(|e| CompletionError::Unavailable(e.to_string()))?;
        let status = resp.status().as_u16();
        debug!(product = %request.product_name, status, "completion response");

        if status == 429 {
            let body: serde_json::Value = resp.json().unwrap_or(serde_json::Value::Null);
            return Err(CompletionError::RateLimited(error_message(&body, status)));
        }
        if !(200..300).contains(&status) {
            let body: serde_json::Value = resp.json().unwrap_or(serde_json::Value::Null);
            let msg = error_message(&body, status);
            return Err(CompletionError::Unavailable(match status {
                401 | 403 => format!("auth failed ({}): {}", status, msg),
                _ => format!("{} ({})", msg, status),
            }));
        }

        let body: serde_json::Value = resp
            .json()
            .map_err(|e| CompletionError::Malformed(format!("response is not JSON: {}", e)))?;

        body.pointer("/choices/0/message/content")
            .and_then(|c| c.as_str())
            .filter(|c| !c.trim().is_empty())
            .map(str::to_string)
            .ok_or_else(|| CompletionError::Malformed("response has no message content".to_string()))
    }
}
