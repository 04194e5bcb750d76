//! Authorized JSON calls against Google REST endpoints.
//!
//! Every backend speaks the same envelope: JSON bodies in, JSON bodies
//! out, and failures reported as
//! `{"error": {"code": 400, "message": "...", "status": "INVALID_ARGUMENT"}}`.

use serde_json::Value;
use std::sync::Arc;

use crate::config::Config;
use crate::credentials::{self, TokenSource};
use crate::error::{Error, Result};

/// Shared HTTP client plus token source. Cheap to clone.
#[derive(Clone)]
pub struct GoogleClient {
    http: reqwest::Client,
    tokens: Arc<TokenSource>,
}

impl GoogleClient {
    pub fn new(http: reqwest::Client, tokens: Arc<TokenSource>) -> Self {
        Self { http, tokens }
    }

    /// Load credentials from the resolved config and build a client.
    pub fn from_config(config: &Config) -> Result<Self> {
        let key = credentials::from_config(&config.credentials)?;
        let http = reqwest::Client::new();
        let tokens = Arc::new(TokenSource::new(key, http.clone()));
        Ok(Self::new(http, tokens))
    }

    pub async fn post_json(&self, service: &'static str, url: &str, body: &Value) -> Result<Value> {
        tracing::debug!(service, url, "POST");
        let token = self.tokens.access_token().await?;
        let resp = self
            .http
            .post(url)
            .bearer_auth(token)
            .json(body)
            .send()
            .await?;
        read_json(service, resp).await
    }

    pub async fn get_json(
        &self,
        service: &'static str,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<Value> {
        tracing::debug!(service, url, "GET");
        let token = self.tokens.access_token().await?;
        let resp = self
            .http
            .get(url)
            .bearer_auth(token)
            .query(query)
            .send()
            .await?;
        read_json(service, resp).await
    }
}

async fn read_json(service: &'static str, resp: reqwest::Response) -> Result<Value> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(backend_error(service, status.as_u16(), &body));
    }
    Ok(resp.json().await?)
}

/// Build an [`Error::Backend`] from a failed response body.
///
/// Understands the Google error envelope and the OAuth2 error shape
/// (`{"error": "invalid_grant", "error_description": "..."}`); anything
/// else is kept as a truncated raw message.
pub fn backend_error(service: &'static str, status: u16, body: &str) -> Error {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let (code, message) = match parsed.as_ref().and_then(|v| v.get("error")) {
        Some(Value::Object(err)) => (
            err.get("status")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            err.get("message")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        ),
        Some(Value::String(code)) => (
            code.clone(),
            parsed
                .as_ref()
                .and_then(|v| v.get("error_description"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        ),
        _ => (String::new(), body.chars().take(500).collect()),
    };

    Error::Backend {
        service,
        status,
        code,
        message,
    }
}
