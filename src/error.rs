use thiserror::Error;

use crate::types::ViewType;

/// Errors produced while loading or persisting sensor positions
#[derive(Error, Debug)]
pub enum SyncError {
    /// Request never reached the server (offline, DNS, timeout)
    #[error("network unavailable: {0}")]
    Network(String),

    /// Server answered with a non-success status or `success: false`
    #[error("server responded {status}: {message}")]
    Server { status: u16, message: String },

    /// One of the two view records failed; the other one stays written
    #[error("{} record failed to save: {source}", failed.label())]
    PartialSave {
        failed: ViewType,
        #[source]
        source: Box<SyncError>,
    },

    /// Response body did not match the expected shape
    #[error("invalid response: {0}")]
    Decode(String),

    /// Greenhouse dimensions or name out of range
    #[error("invalid greenhouse configuration: {0}")]
    InvalidConfig(String),

    /// Position update addressed to an id the store does not hold
    #[error("unknown sensor: {0}")]
    UnknownSensor(String),

    /// Local fallback store could not be read or written
    #[error("local fallback store: {0}")]
    Fallback(String),
}

pub type Result<T> = std::result::Result<T, SyncError>;

impl SyncError {
    /// Whether the backoff policy should try again
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::Network(_) | SyncError::Server { .. })
    }

    /// Network failures are queued silently; everything else is surfaced
    pub fn is_network(&self) -> bool {
        matches!(self, SyncError::Network(_))
    }

    /// Human-readable banner text
    pub fn user_message(&self) -> String {
        match self {
            SyncError::Network(_) => "You are offline. Changes will sync when the connection returns.".to_string(),
            SyncError::Server { status, message } if message.is_empty() => {
                format!("Save failed: server error {status}")
            }
            SyncError::Server { status, message } => format!("Save failed: server error {status} ({message})"),
            SyncError::PartialSave { failed, .. } => {
                format!("Save failed: the {} view could not be stored", failed.label())
            }
            other => format!("Save failed: {other}"),
        }
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_builder() {
            // Bad URL or headers: retrying cannot help
            SyncError::InvalidConfig(err.to_string())
        } else if let Some(status) = err.status() {
            SyncError::Server {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else if err.is_decode() {
            SyncError::Decode(err.to_string())
        } else {
            SyncError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Decode(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(SyncError::Network("offline".into()).is_retryable());
        assert!(SyncError::Server { status: 503, message: String::new() }.is_retryable());
        assert!(!SyncError::Decode("bad json".into()).is_retryable());
        assert!(!SyncError::InvalidConfig("width".into()).is_retryable());
    }

    #[test]
    fn test_request_build_error_is_not_retried() {
        let err = reqwest::Client::new().get("not a url").build().unwrap_err();
        let mapped = SyncError::from(err);
        assert!(matches!(mapped, SyncError::InvalidConfig(_)));
        assert!(!mapped.is_retryable());
    }

    #[test]
    fn test_partial_save_message_names_view() {
        let err = SyncError::PartialSave {
            failed: ViewType::SideView,
            source: Box::new(SyncError::Server { status: 500, message: "boom".into() }),
        };
        assert!(err.user_message().contains("side view"));
        assert!(err.to_string().contains("side view"));
    }
}
