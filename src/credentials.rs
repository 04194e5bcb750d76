//! Service-account credential loading and OAuth2 access tokens.
//!
//! Key material comes either inline (the parsed JSON of
//! `GCP_SERVICE_ACCOUNT_KEY_JSON`) or from a key file. The inline secret
//! wins when both are present.
//!
//! [`TokenSource`] turns the key into bearer tokens using the JWT bearer
//! grant: an RS256-signed assertion is posted to the key's `token_uri` and
//! the returned access token is reused until shortly before it expires.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tokio::sync::Mutex;

use crate::config::CredentialsConfig;
use crate::error::{Error, Result};
use crate::http::backend_error;

const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
const REFRESH_MARGIN_SECS: i64 = 60;

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

/// The subset of a service-account key file needed to mint tokens.
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default)]
    pub project_id: Option<String>,
}

impl fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("token_uri", &self.token_uri)
            .field("project_id", &self.project_id)
            .finish_non_exhaustive()
    }
}

/// Resolve a service-account key from inline JSON or a key file path.
///
/// # Errors
///
/// - [`Error::NotFound`] if `path` is given but the file does not exist.
/// - [`Error::Configuration`] if neither source is given or the key is
///   missing required fields.
pub fn load_service_account(
    inline: Option<&serde_json::Value>,
    path: Option<&Path>,
) -> Result<ServiceAccountKey> {
    if let Some(value) = inline {
        return parse_key(value.clone(), "GCP_SERVICE_ACCOUNT_KEY_JSON");
    }

    if let Some(path) = path {
        if !path.exists() {
            return Err(Error::NotFound(format!(
                "service account key file: {}",
                path.display()
            )));
        }
        let content = std::fs::read_to_string(path)?;
        let value: serde_json::Value = serde_json::from_str(&content).map_err(|e| {
            Error::config(format!("{} is not valid JSON: {}", path.display(), e))
        })?;
        return parse_key(value, &path.display().to_string());
    }

    Err(Error::config(
        "service account credentials are not configured: \
         set GCP_SERVICE_ACCOUNT_KEY_PATH or GCP_SERVICE_ACCOUNT_KEY_JSON",
    ))
}

/// [`load_service_account`] over the resolved `[credentials]` section.
pub fn from_config(config: &CredentialsConfig) -> Result<ServiceAccountKey> {
    load_service_account(config.key_json.as_ref(), config.key_path.as_deref())
}

fn parse_key(value: serde_json::Value, origin: &str) -> Result<ServiceAccountKey> {
    serde_json::from_value(value)
        .map_err(|e| Error::config(format!("invalid service account key in {}: {}", origin, e)))
}

#[derive(Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

/// Build the signed JWT assertion for the token exchange.
pub fn build_assertion(key: &ServiceAccountKey, now: DateTime<Utc>) -> Result<String> {
    let claims = AssertionClaims {
        iss: &key.client_email,
        scope: CLOUD_PLATFORM_SCOPE,
        aud: &key.token_uri,
        iat: now.timestamp(),
        exp: now.timestamp() + ASSERTION_LIFETIME_SECS,
    };
    let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes()).map_err(|e| {
        Error::config(format!("service account private_key is not an RSA PEM key: {}", e))
    })?;
    jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &encoding_key)
        .map_err(|e| Error::config(format!("failed to sign token assertion: {}", e)))
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    ASSERTION_LIFETIME_SECS
}

struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

/// Mints and caches OAuth2 access tokens for one service account.
pub struct TokenSource {
    key: ServiceAccountKey,
    http: reqwest::Client,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenSource {
    pub fn new(key: ServiceAccountKey, http: reqwest::Client) -> Self {
        Self {
            key,
            http,
            cached: Mutex::new(None),
        }
    }

    pub fn client_email(&self) -> &str {
        &self.key.client_email
    }

    /// Return a valid access token, exchanging a new assertion if needed.
    pub async fn access_token(&self) -> Result<String> {
        let mut cached = self.cached.lock().await;
        let now = Utc::now();
        if let Some(token) = cached.as_ref() {
            if token.expires_at - Duration::seconds(REFRESH_MARGIN_SECS) > now {
                return Ok(token.token.clone());
            }
        }

        let assertion = build_assertion(&self.key, now)?;
        tracing::debug!(client_email = %self.key.client_email, "exchanging token assertion");
        let resp = self
            .http
            .post(&self.key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(backend_error("oauth2", status.as_u16(), &body));
        }

        let body: TokenResponse = resp.json().await?;
        let token = body.access_token.clone();
        *cached = Some(CachedToken {
            token: body.access_token,
            expires_at: now + Duration::seconds(body.expires_in),
        });
        Ok(token)
    }
}
