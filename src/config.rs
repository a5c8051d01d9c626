//! Runtime configuration for the sync client
//!
//! Stored as JSON under the platform config dir. Every field has a default so
//! partial files load; out-of-range values are clamped with a warning.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::constants::{api, config, retry, timing};
use crate::gateway::GatewaySettings;
use crate::gateway::retry::RetryPolicy;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_multiplier")]
    pub multiplier: f32,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            multiplier: default_multiplier(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Used when LOG_LEVEL is not set
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Minimum spacing between saves (0 = disabled)
    #[serde(default = "default_throttle_ms")]
    pub throttle_ms: u64,

    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    #[serde(default = "default_drag_commit_threshold_ms")]
    pub drag_commit_threshold_ms: u64,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Directory for local fallback blobs; platform data dir when unset
    #[serde(default)]
    pub fallback_dir: Option<PathBuf>,
}

fn default_api_base_url() -> String {
    api::DEFAULT_BASE_URL.to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_debounce_ms() -> u64 {
    timing::SAVE_DEBOUNCE_MS
}

fn default_throttle_ms() -> u64 {
    timing::SAVE_THROTTLE_MS
}

fn default_cache_ttl_secs() -> u64 {
    timing::CACHE_TTL_SECS
}

fn default_drag_commit_threshold_ms() -> u64 {
    timing::DRAG_COMMIT_THRESHOLD_MS
}

fn default_request_timeout_secs() -> u64 {
    timing::REQUEST_TIMEOUT_SECS
}

fn default_max_attempts() -> u32 {
    retry::MAX_ATTEMPTS
}

fn default_initial_delay_ms() -> u64 {
    retry::INITIAL_DELAY_MS
}

fn default_multiplier() -> f32 {
    retry::MULTIPLIER
}

fn default_max_delay_ms() -> u64 {
    retry::MAX_DELAY_MS
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            log_level: default_log_level(),
            debounce_ms: default_debounce_ms(),
            throttle_ms: default_throttle_ms(),
            cache_ttl_secs: default_cache_ttl_secs(),
            drag_commit_threshold_ms: default_drag_commit_threshold_ms(),
            retry: RetryConfig::default(),
            request_timeout_secs: default_request_timeout_secs(),
            fallback_dir: None,
        }
    }
}

impl SyncConfig {
    pub fn config_path() -> PathBuf {
        let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push(config::APP_DIR);
        path.push(config::FILENAME);
        path
    }

    /// Load from the default location; a missing file yields defaults
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!(path = %path.display(), "No config file found, using defaults");
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut loaded: Self = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        loaded.validate_and_clamp();
        info!(path = %path.display(), base_url = %loaded.api_base_url, "Loaded config");
        Ok(loaded)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, json).with_context(|| format!("Failed to write config file {}", path.display()))?;
        Ok(())
    }

    /// Clamp values to ranges the gateway can work with
    pub fn validate_and_clamp(&mut self) {
        use crate::constants::validation::*;

        if self.api_base_url.trim().is_empty() {
            warn!(using = api::DEFAULT_BASE_URL, "api_base_url is empty, using default");
            self.api_base_url = default_api_base_url();
        }
        let trimmed = self.api_base_url.trim_end_matches('/').len();
        self.api_base_url.truncate(trimmed);

        if !matches!(self.log_level.to_lowercase().as_str(), "trace" | "debug" | "info" | "warn" | "error") {
            warn!(log_level = %self.log_level, "Unknown log_level, using info");
            self.log_level = default_log_level();
        }

        if self.debounce_ms < MIN_DEBOUNCE_MS {
            warn!(debounce_ms = self.debounce_ms, min = MIN_DEBOUNCE_MS, "debounce_ms below minimum, clamping");
            self.debounce_ms = MIN_DEBOUNCE_MS;
        } else if self.debounce_ms > MAX_DEBOUNCE_MS {
            warn!(debounce_ms = self.debounce_ms, max = MAX_DEBOUNCE_MS, "debounce_ms exceeds maximum, clamping");
            self.debounce_ms = MAX_DEBOUNCE_MS;
        }

        if self.throttle_ms > MAX_THROTTLE_MS {
            warn!(throttle_ms = self.throttle_ms, max = MAX_THROTTLE_MS, "throttle_ms exceeds maximum, clamping");
            self.throttle_ms = MAX_THROTTLE_MS;
        }

        // A debounced save firing inside the throttle window would have to wait it out
        if self.debounce_ms < self.throttle_ms {
            warn!(
                debounce_ms = self.debounce_ms,
                throttle_ms = self.throttle_ms,
                "debounce_ms shorter than throttle_ms, raising"
            );
            self.debounce_ms = self.throttle_ms;
        }

        if self.cache_ttl_secs < MIN_CACHE_TTL_SECS {
            warn!(cache_ttl_secs = self.cache_ttl_secs, min = MIN_CACHE_TTL_SECS, "cache_ttl_secs below minimum, clamping");
            self.cache_ttl_secs = MIN_CACHE_TTL_SECS;
        } else if self.cache_ttl_secs > MAX_CACHE_TTL_SECS {
            warn!(cache_ttl_secs = self.cache_ttl_secs, max = MAX_CACHE_TTL_SECS, "cache_ttl_secs exceeds maximum, clamping");
            self.cache_ttl_secs = MAX_CACHE_TTL_SECS;
        }

        if self.drag_commit_threshold_ms > MAX_DRAG_THRESHOLD_MS {
            warn!(
                drag_commit_threshold_ms = self.drag_commit_threshold_ms,
                max = MAX_DRAG_THRESHOLD_MS,
                "drag_commit_threshold_ms exceeds maximum, clamping"
            );
            self.drag_commit_threshold_ms = MAX_DRAG_THRESHOLD_MS;
        }

        if self.request_timeout_secs == 0 {
            warn!(using = default_request_timeout_secs(), "request_timeout_secs is zero, using default");
            self.request_timeout_secs = default_request_timeout_secs();
        }

        let retry = &mut self.retry;
        if retry.max_attempts < MIN_RETRY_ATTEMPTS {
            warn!(max_attempts = retry.max_attempts, min = MIN_RETRY_ATTEMPTS, "retry.max_attempts below minimum, clamping");
            retry.max_attempts = MIN_RETRY_ATTEMPTS;
        } else if retry.max_attempts > MAX_RETRY_ATTEMPTS {
            warn!(max_attempts = retry.max_attempts, max = MAX_RETRY_ATTEMPTS, "retry.max_attempts exceeds maximum, clamping");
            retry.max_attempts = MAX_RETRY_ATTEMPTS;
        }

        if !retry.multiplier.is_finite() || retry.multiplier < MIN_RETRY_MULTIPLIER {
            warn!(multiplier = retry.multiplier, min = MIN_RETRY_MULTIPLIER, "retry.multiplier below minimum, clamping");
            retry.multiplier = MIN_RETRY_MULTIPLIER;
        } else if retry.multiplier > MAX_RETRY_MULTIPLIER {
            warn!(multiplier = retry.multiplier, max = MAX_RETRY_MULTIPLIER, "retry.multiplier exceeds maximum, clamping");
            retry.multiplier = MAX_RETRY_MULTIPLIER;
        }

        if retry.max_delay_ms < retry.initial_delay_ms {
            warn!(
                max_delay_ms = retry.max_delay_ms,
                initial_delay_ms = retry.initial_delay_ms,
                "retry.max_delay_ms below initial delay, raising"
            );
            retry.max_delay_ms = retry.initial_delay_ms;
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            initial_delay: Duration::from_millis(self.retry.initial_delay_ms),
            multiplier: self.retry.multiplier,
            max_delay: Duration::from_millis(self.retry.max_delay_ms),
        }
    }

    pub fn gateway_settings(&self) -> GatewaySettings {
        GatewaySettings {
            throttle: Duration::from_millis(self.throttle_ms),
            debounce: Duration::from_millis(self.debounce_ms),
            cache_ttl: Duration::from_secs(self.cache_ttl_secs),
            retry: self.retry_policy(),
        }
    }

    pub fn drag_threshold(&self) -> Duration {
        Duration::from_millis(self.drag_commit_threshold_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Configured fallback dir, else the platform data dir
    pub fn fallback_dir(&self) -> PathBuf {
        self.fallback_dir
            .clone()
            .or_else(crate::fallback::FileFallbackStore::default_dir)
            .unwrap_or_else(|| PathBuf::from("."))
    }
}
