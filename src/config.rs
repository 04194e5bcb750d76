//! Configuration loading.
//!
//! Settings come from an optional TOML file, then environment variables
//! override individual values. The resolved [`Config`] is built once at
//! process start and passed by reference into every gateway constructor.
//!
//! ```toml
//! [gcp]
//! project_id = "my-project"
//! location = "global"        # search + notebook backends
//! region = "us-central1"     # generation backend
//!
//! [search]
//! engine_id = "my-search-app"
//!
//! [generation]
//! model = "gemini-2.5-flash"
//!
//! [credentials]
//! key_path = "./secrets/service-account.json"
//!
//! [storage]
//! bucket = "my-docs"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::Error;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub gcp: GcpConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub credentials: CredentialsConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GcpConfig {
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default = "default_location")]
    pub location: String,
    #[serde(default = "default_region")]
    pub region: String,
}

impl Default for GcpConfig {
    fn default() -> Self {
        Self {
            project_id: None,
            location: default_location(),
            region: default_region(),
        }
    }
}

fn default_location() -> String {
    "global".to_string()
}
fn default_region() -> String {
    "us-central1".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default)]
    pub engine_id: Option<String>,
    #[serde(default = "default_language_code")]
    pub language_code: String,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            engine_id: None,
            language_code: default_language_code(),
            page_size: default_page_size(),
        }
    }
}

fn default_language_code() -> String {
    "ja".to_string()
}
fn default_page_size() -> u32 {
    20
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_model")]
    pub model: String,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
        }
    }
}

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct CredentialsConfig {
    #[serde(default)]
    pub key_path: Option<PathBuf>,
    /// Inline service-account key. Only settable through
    /// `GCP_SERVICE_ACCOUNT_KEY_JSON`.
    #[serde(skip)]
    pub key_json: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct StorageConfig {
    #[serde(default)]
    pub bucket: Option<String>,
}

impl Config {
    /// Merge a parsed file (or defaults) with environment overrides.
    ///
    /// `lookup` returns the value of an environment variable; empty values
    /// count as unset.
    pub fn resolve<F>(mut self, lookup: F) -> crate::error::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("GCP_PROJECT_ID") {
            self.gcp.project_id = Some(v);
        }
        // GCP_LOCATION wins over the older LOCATION key.
        if let Some(v) = get("GCP_LOCATION").or_else(|| get("LOCATION")) {
            self.gcp.location = v;
        }
        if let Some(v) = get("GCP_REGION") {
            self.gcp.region = v;
        }
        if let Some(v) = get("ENGINE_ID") {
            self.search.engine_id = Some(v);
        }
        if let Some(v) = get("GEMINI_MODEL") {
            self.generation.model = v;
        }
        if let Some(v) = get("GCS_BUCKET_NAME") {
            self.storage.bucket = Some(v);
        }
        if let Some(v) = get("GCP_SERVICE_ACCOUNT_KEY_PATH") {
            self.credentials.key_path = Some(PathBuf::from(v));
        }
        if let Some(v) = get("GCP_SERVICE_ACCOUNT_KEY_JSON") {
            let parsed: serde_json::Value = serde_json::from_str(&v).map_err(|e| {
                Error::config(format!("GCP_SERVICE_ACCOUNT_KEY_JSON is malformed: {}", e))
            })?;
            self.credentials.key_json = Some(parsed);
        }

        if self.search.page_size == 0 {
            return Err(Error::config("search.page_size must be > 0"));
        }

        Ok(self)
    }

    pub fn project_id(&self) -> crate::error::Result<&str> {
        self.gcp.project_id.as_deref().ok_or_else(|| {
            Error::config("GCP_PROJECT_ID is not set (env or [gcp].project_id in the config file)")
        })
    }

    pub fn engine_id(&self) -> crate::error::Result<&str> {
        self.search.engine_id.as_deref().ok_or_else(|| {
            Error::config("ENGINE_ID is not set (env or [search].engine_id in the config file)")
        })
    }

    pub fn bucket(&self) -> crate::error::Result<&str> {
        self.storage.bucket.as_deref().ok_or_else(|| {
            Error::config("no bucket given: pass --bucket or set GCS_BUCKET_NAME")
        })
    }
}

/// Load the config file (if it exists) and apply process environment overrides.
pub fn load_config(path: &Path) -> Result<Config> {
    let file_config = if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str::<Config>(&content).with_context(|| "Failed to parse config file")?
    } else {
        Config::default()
    };

    Ok(file_config.resolve(|key| std::env::var(key).ok())?)
}
