//! Connectivity event source
//!
//! The host owns a [`Connectivity`] and flips it when the platform reports
//! online/offline. Consumers subscribe through a `watch` receiver and hold a
//! [`Subscription`] that stops listening when dropped.

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct Connectivity {
    tx: watch::Sender<bool>,
}

impl Connectivity {
    pub fn new(online: bool) -> Self {
        let (tx, _rx) = watch::channel(online);
        Self { tx }
    }

    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    /// Publish a state; repeated identical states are not re-sent
    pub fn set_online(&self, online: bool) {
        let changed = self.tx.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
        if changed {
            info!(online, "Connectivity changed");
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for Connectivity {
    fn default() -> Self {
        Self::new(true)
    }
}

/// Listener task handle; aborts the listener on drop
#[derive(Debug)]
pub struct Subscription {
    task: JoinHandle<()>,
}

impl Subscription {
    pub(crate) fn new(task: JoinHandle<()>) -> Self {
        Self { task }
    }

    pub fn unsubscribe(self) {}

    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        debug!("Connectivity subscription dropped");
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_only_changes_are_published() {
        let connectivity = Connectivity::new(true);
        let mut rx = connectivity.subscribe();

        connectivity.set_online(true);
        assert!(!rx.has_changed().unwrap());

        connectivity.set_online(false);
        assert!(rx.has_changed().unwrap());
        assert!(!*rx.borrow_and_update());
        assert!(!connectivity.is_online());
    }

    #[tokio::test]
    async fn test_dropping_subscription_aborts_listener() {
        let connectivity = Connectivity::new(true);
        let mut rx = connectivity.subscribe();
        let subscription = Subscription::new(tokio::spawn(async move {
            while rx.changed().await.is_ok() {}
        }));
        assert!(subscription.is_active());
        drop(subscription);
        for _ in 0..10 {
            if connectivity.tx.receiver_count() == 0 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(connectivity.tx.receiver_count(), 0);
    }
}
