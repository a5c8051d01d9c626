//! Bearer token discovery
//!
//! Tokens live under one of several historical keys. The first key whose value
//! looks like a real token wins; no token means unauthenticated requests.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use tracing::{debug, warn};

use crate::constants::api::{MIN_TOKEN_LEN, TOKEN_KEYS};
use crate::constants::config::{APP_DIR, CREDENTIALS_FILENAME};

/// Key/value store that may hold an auth token
pub trait TokenSource: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
}

/// First populated token among [`TOKEN_KEYS`]
pub fn bearer_token(source: &dyn TokenSource) -> Option<String> {
    for key in TOKEN_KEYS {
        if let Some(token) = source.get(key)
            && token.len() > MIN_TOKEN_LEN
        {
            debug!(key, "Using bearer token");
            return Some(token);
        }
    }
    None
}

/// In-memory token map
#[derive(Debug, Default, Clone)]
pub struct MapTokenSource {
    values: HashMap<String, String>,
}

impl MapTokenSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.values.insert(key.to_string(), value.to_string());
        self
    }
}

impl TokenSource for MapTokenSource {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

/// Flat JSON object on disk (`credentials.json` next to the config)
#[derive(Debug, Default, Clone)]
pub struct FileTokenSource {
    values: HashMap<String, String>,
}

impl FileTokenSource {
    /// Default credentials path, if a config dir exists
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join(CREDENTIALS_FILENAME))
    }

    /// Missing file means no credentials; a malformed file is an error
    pub fn load(path: &PathBuf) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "No credentials file");
            return Ok(Self::default());
        }
        let contents =
            fs::read_to_string(path).with_context(|| format!("Failed to read credentials from {}", path.display()))?;
        let raw: HashMap<String, serde_json::Value> = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse credentials in {}", path.display()))?;

        // Non-string values are not tokens
        let values = raw
            .into_iter()
            .filter_map(|(k, v)| match v {
                serde_json::Value::String(s) => Some((k, s)),
                _ => None,
            })
            .collect();
        Ok(Self { values })
    }

    /// Load from the default location, logging instead of failing
    pub fn load_default() -> Self {
        let Some(path) = Self::default_path() else {
            return Self::default();
        };
        Self::load(&path).unwrap_or_else(|e| {
            warn!(error = %e, "Ignoring unreadable credentials file");
            Self::default()
        })
    }
}

impl TokenSource for FileTokenSource {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}
