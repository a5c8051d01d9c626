//! Local fallback store for payloads that could not reach the server
//!
//! One blob per device, `{config, sensors}`, overwritten on every write.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::{debug, info};

use crate::constants::config::{APP_DIR, FALLBACK_PREFIX};
use crate::error::{Result, SyncError};
use crate::types::SavePayload;

pub trait FallbackStore: Send + Sync {
    fn write(&self, device_id: &str, payload: &SavePayload) -> Result<()>;

    fn read(&self, device_id: &str) -> Result<Option<SavePayload>>;

    fn remove(&self, device_id: &str) -> Result<()>;
}

/// Storage key for a device (`greenhouse_{deviceId}`)
pub fn fallback_key(device_id: &str) -> String {
    format!("{FALLBACK_PREFIX}{device_id}")
}

/// JSON files in the platform data dir
#[derive(Debug, Clone)]
pub struct FileFallbackStore {
    dir: PathBuf,
}

impl FileFallbackStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn default_dir() -> Option<PathBuf> {
        dirs::data_local_dir().map(|dir| dir.join(APP_DIR))
    }

    /// File for a device. Bytes outside `[A-Za-z0-9_-]` are percent-escaped,
    /// so distinct ids never share a file and none can leave the dir.
    pub fn path_for(&self, device_id: &str) -> PathBuf {
        let mut safe = String::with_capacity(device_id.len());
        for byte in device_id.bytes() {
            if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
                safe.push(byte as char);
            } else {
                safe.push_str(&format!("%{byte:02X}"));
            }
        }
        self.dir.join(format!("{}.json", fallback_key(&safe)))
    }
}

impl FallbackStore for FileFallbackStore {
    fn write(&self, device_id: &str, payload: &SavePayload) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .map_err(|e| SyncError::Fallback(format!("failed to create {}: {e}", self.dir.display())))?;
        let path = self.path_for(device_id);
        let json = serde_json::to_string_pretty(payload)?;
        fs::write(&path, json).map_err(|e| SyncError::Fallback(format!("failed to write {}: {e}", path.display())))?;
        info!(device = %device_id, path = %path.display(), sensors = payload.sensors.len(), "Saved local fallback");
        Ok(())
    }

    fn read(&self, device_id: &str) -> Result<Option<SavePayload>> {
        let path = self.path_for(device_id);
        if !path.exists() {
            debug!(device = %device_id, "No local fallback");
            return Ok(None);
        }
        let contents = fs::read_to_string(&path)
            .map_err(|e| SyncError::Fallback(format!("failed to read {}: {e}", path.display())))?;
        Ok(Some(serde_json::from_str(&contents)?))
    }

    fn remove(&self, device_id: &str) -> Result<()> {
        let path = self.path_for(device_id);
        if path.exists() {
            fs::remove_file(&path)
                .map_err(|e| SyncError::Fallback(format!("failed to remove {}: {e}", path.display())))?;
        }
        Ok(())
    }
}

/// In-memory store that counts writes
#[derive(Debug, Default)]
pub struct MemoryFallbackStore {
    blobs: Mutex<HashMap<String, SavePayload>>,
    writes: Mutex<usize>,
}

impl MemoryFallbackStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_count(&self) -> usize {
        *self.writes.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl FallbackStore for MemoryFallbackStore {
    fn write(&self, device_id: &str, payload: &SavePayload) -> Result<()> {
        self.blobs
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(fallback_key(device_id), payload.clone());
        *self.writes.lock().unwrap_or_else(|p| p.into_inner()) += 1;
        Ok(())
    }

    fn read(&self, device_id: &str) -> Result<Option<SavePayload>> {
        Ok(self
            .blobs
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(&fallback_key(device_id))
            .cloned())
    }

    fn remove(&self, device_id: &str) -> Result<()> {
        self.blobs
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .remove(&fallback_key(device_id));
        Ok(())
    }
}
