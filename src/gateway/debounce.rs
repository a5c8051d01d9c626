//! Trailing-edge debounce
//!
//! Each call to [`Debouncer::schedule`] aborts the previously scheduled timer
//! and starts a fresh one. Only the last action in a burst runs. Once a timer
//! fires, its action runs on its own task and is never aborted.

use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::trace;

#[derive(Debug)]
pub struct Debouncer {
    delay: Duration,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: Mutex::new(None),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Run `action` once `delay` passes without another call
    pub fn schedule<F>(&self, action: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let delay = self.delay;
        let task = tokio::spawn(async move {
            sleep(delay).await;
            tokio::spawn(action);
        });
        let mut pending = self.pending.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(previous) = pending.replace(task) {
            trace!("Debounce timer reset");
            previous.abort();
        }
    }

    /// Drop the scheduled action, if any
    pub fn cancel(&self) -> bool {
        let mut pending = self.pending.lock().unwrap_or_else(|p| p.into_inner());
        match pending.take() {
            Some(task) => {
                let was_waiting = !task.is_finished();
                task.abort();
                was_waiting
            }
            None => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        if let Some(task) = self.pending.get_mut().unwrap_or_else(|p| p.into_inner()).take() {
            task.abort();
        }
    }
}
