//! User-visible sync status: in-flight flags, save state and banners
//!
//! Success banners expire on their own; error banners stay until dismissed
//! or replaced by a newer error.

use std::time::{Duration, SystemTime};
use tokio::time::Instant;

use crate::constants::timing::TRANSIENT_BANNER_MS;

/// Outcome-state of the most recent save
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SaveState {
    #[default]
    Idle,
    Saving,
    /// Payload parked in the pending slot until connectivity returns
    OfflineQueued,
    /// Save failed and the failure was shown to the user
    ErrorReported,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BannerKind {
    Success,
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Banner {
    pub kind: BannerKind,
    pub message: String,
    /// `None` for banners that persist until dismissed
    pub expires_at: Option<Instant>,
}

impl Banner {
    pub fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyncStatus {
    pub loading: bool,
    pub saving: bool,
    pub save_state: SaveState,
    pub last_saved: Option<SystemTime>,
    banner: Option<Banner>,
    transient_ttl: Duration,
    /// Saves between `begin_save` and `end_save`
    in_flight: u32,
}

impl Default for SyncStatus {
    fn default() -> Self {
        Self {
            loading: false,
            saving: false,
            save_state: SaveState::Idle,
            last_saved: None,
            banner: None,
            transient_ttl: Duration::from_millis(TRANSIENT_BANNER_MS),
            in_flight: 0,
        }
    }
}

impl SyncStatus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current banner, with expired transient banners hidden
    pub fn banner(&self) -> Option<&Banner> {
        self.banner.as_ref().filter(|b| !b.is_expired(Instant::now()))
    }

    pub fn error_message(&self) -> Option<&str> {
        self.banner()
            .filter(|b| b.kind == BannerKind::Error)
            .map(|b| b.message.as_str())
    }

    pub fn begin_save(&mut self) {
        self.in_flight += 1;
        self.saving = true;
        self.save_state = SaveState::Saving;
    }

    /// One save finished; `saving` stays set while others are in flight
    pub fn end_save(&mut self) {
        self.in_flight = self.in_flight.saturating_sub(1);
        self.saving = self.in_flight > 0;
    }

    pub fn in_flight(&self) -> u32 {
        self.in_flight
    }

    pub fn save_succeeded(&mut self) {
        self.save_state = if self.in_flight > 0 { SaveState::Saving } else { SaveState::Idle };
        self.last_saved = Some(SystemTime::now());
        self.show_transient(BannerKind::Success, "Saved");
    }

    pub fn save_queued(&mut self) {
        self.save_state = SaveState::OfflineQueued;
        self.show_transient(BannerKind::Info, "Offline: changes queued");
    }

    pub fn save_failed(&mut self, message: String) {
        self.save_state = SaveState::ErrorReported;
        self.show_error(message);
    }

    pub fn show_transient(&mut self, kind: BannerKind, message: &str) {
        // Transient messages never hide a pending error
        if self.error_message().is_some() {
            return;
        }
        self.banner = Some(Banner {
            kind,
            message: message.to_string(),
            expires_at: Some(Instant::now() + self.transient_ttl),
        });
    }

    pub fn show_error(&mut self, message: String) {
        self.banner = Some(Banner {
            kind: BannerKind::Error,
            message,
            expires_at: None,
        });
    }

    pub fn dismiss_error(&mut self) {
        if self.banner.as_ref().is_some_and(|b| b.kind == BannerKind::Error) {
            self.banner = None;
        }
        if self.save_state == SaveState::ErrorReported {
            self.save_state = SaveState::Idle;
        }
    }

    /// Hide transient indicators (drag start suspends commit visuals)
    pub fn clear_transient(&mut self) {
        if self.banner.as_ref().is_some_and(|b| b.kind != BannerKind::Error) {
            self.banner = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_success_banner_expires() {
        let mut status = SyncStatus::new();
        status.begin_save();
        assert!(status.saving);
        status.end_save();
        status.save_succeeded();
        assert!(!status.saving);
        assert!(status.last_saved.is_some());
        assert_eq!(status.banner().unwrap().kind, BannerKind::Success);

        tokio::time::advance(Duration::from_millis(1000)).await;
        assert!(status.banner().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_banner_persists_until_dismissed() {
        let mut status = SyncStatus::new();
        status.save_failed("Save failed: server error 500".into());
        tokio::time::advance(Duration::from_secs(3600)).await;
        assert_eq!(status.error_message(), Some("Save failed: server error 500"));

        // success does not hide it
        status.save_succeeded();
        assert!(status.error_message().is_some());

        status.show_error("newer".into());
        assert_eq!(status.error_message(), Some("newer"));

        status.dismiss_error();
        assert!(status.banner().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_saves_keep_saving_flag() {
        let mut status = SyncStatus::new();
        status.begin_save();
        status.begin_save();
        assert_eq!(status.in_flight(), 2);

        status.end_save();
        status.save_succeeded();
        assert!(status.saving);
        assert_eq!(status.save_state, SaveState::Saving);

        status.end_save();
        status.save_succeeded();
        assert!(!status.saving);
        assert_eq!(status.save_state, SaveState::Idle);

        // an unmatched end never underflows
        status.end_save();
        assert_eq!(status.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_transient_keeps_errors() {
        let mut status = SyncStatus::new();
        status.save_queued();
        assert_eq!(status.save_state, SaveState::OfflineQueued);
        status.clear_transient();
        assert!(status.banner().is_none());

        status.show_error("boom".into());
        status.clear_transient();
        assert!(status.error_message().is_some());
    }
}
