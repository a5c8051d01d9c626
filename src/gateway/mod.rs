//! Persistence gateway: moves position snapshots to and from the remote API
//!
//! One gateway per device. It owns the read cache, the save throttle, the
//! debounce timer, the offline pending slot and the connectivity flag; none
//! of that state is shared across devices. Locks are never held across an
//! `.await`.

pub mod cache;
pub mod debounce;
pub mod retry;

use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

use crate::api::{PositionRecord, RemoteApi, ViewFilter};
use crate::connectivity::Subscription;
use crate::constants::api::{GLOBAL_LAST_CONTEXT_FIELD, GLOBAL_LAST_DEVICE_FIELD};
use crate::constants::timing::{CACHE_TTL_SECS, SAVE_DEBOUNCE_MS, SAVE_THROTTLE_MS};
use crate::error::{Result, SyncError};
use crate::fallback::FallbackStore;
use crate::status::SyncStatus;
use crate::types::{SavePayload, ViewAggregate, ViewSettings, ViewType};

use cache::TtlCache;
use debounce::Debouncer;
use retry::{RetryPolicy, log_failure, retry_with_backoff};

/// Timing knobs for one gateway
#[derive(Debug, Clone, PartialEq)]
pub struct GatewaySettings {
    pub throttle: Duration,
    pub debounce: Duration,
    pub cache_ttl: Duration,
    pub retry: RetryPolicy,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            throttle: Duration::from_millis(SAVE_THROTTLE_MS),
            debounce: Duration::from_millis(SAVE_DEBOUNCE_MS),
            cache_ttl: Duration::from_secs(CACHE_TTL_SECS),
            retry: RetryPolicy::default(),
        }
    }
}

/// How a save call ended when it did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Both view records written
    Saved,
    /// Inside the throttle window; nothing was sent
    Throttled,
    /// Parked in the pending slot and the local fallback
    Queued,
}

struct Inner {
    device_id: String,
    api: Arc<dyn RemoteApi>,
    fallback: Arc<dyn FallbackStore>,
    settings: GatewaySettings,
    online: AtomicBool,
    last_save_started: Mutex<Option<Instant>>,
    cache: Mutex<TtlCache<ViewType, ViewAggregate>>,
    /// Bumped after every successful write of a view
    write_generation: Mutex<HashMap<ViewType, u64>>,
    /// Bumped by every `schedule_save`; older debounced payloads give way
    scheduled_generation: AtomicU64,
    pending: Mutex<Option<SavePayload>>,
    status: Mutex<SyncStatus>,
    view_settings: Mutex<HashMap<ViewType, ViewSettings>>,
    selected_sensor: Mutex<Option<String>>,
    debouncer: Debouncer,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Cloneable handle; clones share the same state
#[derive(Clone)]
pub struct PersistenceGateway {
    inner: Arc<Inner>,
}

impl PersistenceGateway {
    pub fn new(
        device_id: &str,
        api: Arc<dyn RemoteApi>,
        fallback: Arc<dyn FallbackStore>,
        settings: GatewaySettings,
    ) -> Self {
        let inner = Inner {
            device_id: device_id.to_string(),
            api,
            fallback,
            online: AtomicBool::new(true),
            last_save_started: Mutex::new(None),
            cache: Mutex::new(TtlCache::new(settings.cache_ttl)),
            write_generation: Mutex::new(HashMap::new()),
            scheduled_generation: AtomicU64::new(0),
            pending: Mutex::new(None),
            status: Mutex::new(SyncStatus::new()),
            view_settings: Mutex::new(HashMap::new()),
            selected_sensor: Mutex::new(None),
            debouncer: Debouncer::new(settings.debounce),
            settings,
        };
        Self { inner: Arc::new(inner) }
    }

    fn from_weak(weak: &Weak<Inner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    pub fn device_id(&self) -> &str {
        &self.inner.device_id
    }

    pub fn settings(&self) -> &GatewaySettings {
        &self.inner.settings
    }

    pub fn is_online(&self) -> bool {
        self.inner.online.load(Ordering::SeqCst)
    }

    /// Snapshot of the user-visible status
    pub fn status(&self) -> SyncStatus {
        lock(&self.inner.status).clone()
    }

    pub fn dismiss_error(&self) {
        lock(&self.inner.status).dismiss_error();
    }

    /// A drag started: hide transient save indicators until it commits
    pub fn drag_started(&self) {
        lock(&self.inner.status).clear_transient();
    }

    /// Payload waiting for connectivity, if any
    pub fn pending_payload(&self) -> Option<SavePayload> {
        lock(&self.inner.pending).clone()
    }

    /// Sensor id written into the filter records as `selectedSensor`
    pub fn set_selected_sensor(&self, sensor_id: Option<&str>) {
        *lock(&self.inner.selected_sensor) = sensor_id.map(str::to_string);
    }

    // ----- loading -----

    /// Read one view's aggregate, from cache when fresh
    pub async fn load(&self, view: ViewType) -> Result<ViewAggregate> {
        let cached = lock(&self.inner.cache).get(&view);
        if let Some(cached) = cached {
            debug!(device = %self.inner.device_id, view = view.label(), "Cache hit");
            return Ok(cached);
        }

        let generation = self.write_generation(view);
        lock(&self.inner.status).loading = true;
        let result = self.fetch(view).await;
        lock(&self.inner.status).loading = false;

        match result {
            Ok(aggregate) => {
                lock(&self.inner.view_settings).insert(view, aggregate.view_settings.clone());
                // A write that landed mid-fetch makes this snapshot stale
                if self.write_generation(view) == generation {
                    lock(&self.inner.cache).insert(view, aggregate.clone());
                } else {
                    debug!(device = %self.inner.device_id, view = view.label(), "View written during load, not caching");
                }
                info!(
                    device = %self.inner.device_id,
                    view = view.label(),
                    sensors = aggregate.sensors.len(),
                    "Loaded view"
                );
                Ok(aggregate)
            }
            Err(err) => {
                log_failure("load", &err);
                Err(err)
            }
        }
    }

    fn write_generation(&self, view: ViewType) -> u64 {
        lock(&self.inner.write_generation).get(&view).copied().unwrap_or(0)
    }

    async fn fetch(&self, view: ViewType) -> Result<ViewAggregate> {
        let api = &self.inner.api;
        let device_id = self.inner.device_id.as_str();
        let policy = &self.inner.settings.retry;

        let (filter, positions) = tokio::join!(
            retry_with_backoff(policy, "get filter", || api.get_filter(device_id, view)),
            retry_with_backoff(policy, "get positions", || api.get_positions(device_id, view)),
        );
        let filter = filter?;
        let positions = positions?;

        let (config, view_settings) = match filter.effective() {
            Some(effective) => (effective.greenhouse_config.clone().into_config(), effective.settings(view)),
            None => {
                debug!(view = view.label(), "No filter or default filter, using built-in defaults");
                (Default::default(), ViewSettings::default_for(view))
            }
        };

        Ok(ViewAggregate {
            config,
            sensors: positions.into_positions(device_id),
            view_settings,
        })
    }

    /// Drop every cached view
    pub fn refresh(&self) {
        lock(&self.inner.cache).clear();
        debug!(device = %self.inner.device_id, "Cache cleared");
    }

    // ----- saving -----

    /// Save both view records now, subject to the throttle.
    ///
    /// Offline, the payload is queued instead. Network failures also queue
    /// and return `Ok(Queued)`; other failures queue, raise an error banner
    /// and return the error.
    pub async fn save(&self, payload: SavePayload) -> Result<SaveOutcome> {
        if !self.is_online() {
            self.queue(payload);
            return Ok(SaveOutcome::Queued);
        }

        {
            let mut last = lock(&self.inner.last_save_started);
            let now = Instant::now();
            if let Some(previous) = *last
                && now.duration_since(previous) < self.inner.settings.throttle
            {
                debug!(
                    device = %self.inner.device_id,
                    since_ms = now.duration_since(previous).as_millis() as u64,
                    "Save throttled"
                );
                return Ok(SaveOutcome::Throttled);
            }
            *last = Some(now);
        }

        self.perform(payload).await
    }

    /// Debounced save; only the last payload of a burst is written.
    ///
    /// A throttled attempt waits out the throttle window and tries again,
    /// unless a newer payload was scheduled in the meantime.
    pub fn schedule_save(&self, payload: SavePayload) {
        let generation = self.inner.scheduled_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let weak = Arc::downgrade(&self.inner);
        self.inner.debouncer.schedule(async move {
            loop {
                let Some(gateway) = Self::from_weak(&weak) else {
                    return;
                };
                if gateway.inner.scheduled_generation.load(Ordering::SeqCst) != generation {
                    debug!("Debounced save superseded");
                    return;
                }
                let wait = match gateway.save(payload.clone()).await {
                    Ok(SaveOutcome::Throttled) => gateway.throttle_remaining(),
                    Ok(outcome) => {
                        debug!(?outcome, "Debounced save finished");
                        return;
                    }
                    Err(err) => {
                        warn!(error = %err, "Debounced save failed");
                        return;
                    }
                };
                drop(gateway);
                debug!(wait_ms = wait.as_millis() as u64, "Debounced save throttled, retrying");
                sleep(wait.max(Duration::from_millis(1))).await;
            }
        });
    }

    /// Time until the throttle lets the next save through
    fn throttle_remaining(&self) -> Duration {
        match *lock(&self.inner.last_save_started) {
            Some(previous) => self.inner.settings.throttle.saturating_sub(previous.elapsed()),
            None => Duration::ZERO,
        }
    }

    /// True while a debounced save is waiting for its timer
    pub fn has_scheduled_save(&self) -> bool {
        self.inner.debouncer.is_pending()
    }

    async fn perform(&self, payload: SavePayload) -> Result<SaveOutcome> {
        lock(&self.inner.status).begin_save();
        let result = self.write_both(&payload).await;
        lock(&self.inner.status).end_save();

        match result {
            Ok(()) => {
                lock(&self.inner.pending).take();
                lock(&self.inner.status).save_succeeded();
                info!(device = %self.inner.device_id, sensors = payload.sensors.len(), "Saved both views");
                Ok(SaveOutcome::Saved)
            }
            Err(err) if err.is_network() => {
                log_failure("save", &err);
                self.queue(payload);
                Ok(SaveOutcome::Queued)
            }
            Err(err) => {
                log_failure("save", &err);
                self.park(payload);
                lock(&self.inner.status).save_failed(err.user_message());
                Err(err)
            }
        }
    }

    /// Offline path: pending slot, local mirror, queued status
    fn queue(&self, payload: SavePayload) {
        self.park(payload);
        lock(&self.inner.status).save_queued();
        info!(device = %self.inner.device_id, "Save queued until connectivity returns");
    }

    fn park(&self, payload: SavePayload) {
        if let Err(err) = self.inner.fallback.write(&self.inner.device_id, &payload) {
            warn!(device = %self.inner.device_id, error = %err, "Local fallback write failed");
        }
        *lock(&self.inner.pending) = Some(payload);
    }

    async fn write_both(&self, payload: &SavePayload) -> Result<()> {
        let (floor, side) = tokio::join!(
            self.write_view(ViewType::FloorPlan, payload),
            self.write_view(ViewType::SideView, payload),
        );

        match (floor, side) {
            (Ok(()), Ok(())) => Ok(()),
            (Err(source), Ok(())) => Err(self.partial(ViewType::FloorPlan, source)),
            (Ok(()), Err(source)) => Err(self.partial(ViewType::SideView, source)),
            (Err(err), Err(_)) => Err(err),
        }
    }

    fn partial(&self, failed: ViewType, source: SyncError) -> SyncError {
        warn!(
            device = %self.inner.device_id,
            failed = failed.label(),
            error = %source,
            "Partial save, the other view stays written"
        );
        SyncError::PartialSave {
            failed,
            source: Box::new(source),
        }
    }

    /// Filter record, then positions record, for one view
    async fn write_view(&self, view: ViewType, payload: &SavePayload) -> Result<()> {
        let api = &self.inner.api;
        let device_id = self.inner.device_id.as_str();
        let policy = &self.inner.settings.retry;

        let settings = lock(&self.inner.view_settings)
            .get(&view)
            .cloned()
            .unwrap_or_else(|| ViewSettings::default_for(view));
        let selected = lock(&self.inner.selected_sensor).clone();
        let filter = ViewFilter::new(&payload.config, view, &settings, selected.as_deref());
        let records: Vec<PositionRecord> = payload.sensors.iter().map(PositionRecord::from_position).collect();

        retry_with_backoff(policy, "save filter", || api.save_filter(device_id, view, &filter)).await?;
        retry_with_backoff(policy, "save positions", || api.save_positions(device_id, view, &records)).await?;

        *lock(&self.inner.write_generation).entry(view).or_insert(0) += 1;
        lock(&self.inner.cache).invalidate(&view);
        Ok(())
    }

    // ----- connectivity -----

    /// Update the connectivity flag; going online flushes the pending slot.
    ///
    /// Returns the flush result when a flush happened.
    pub async fn set_online(&self, online: bool) -> Option<Result<SaveOutcome>> {
        let was_online = self.inner.online.swap(online, Ordering::SeqCst);
        if online && !was_online {
            info!(device = %self.inner.device_id, "Back online");
            return self.flush_pending().await;
        }
        if !online && was_online {
            info!(device = %self.inner.device_id, "Offline, saves will be queued");
        }
        None
    }

    /// Send the pending payload once, bypassing the throttle
    pub async fn flush_pending(&self) -> Option<Result<SaveOutcome>> {
        let payload = lock(&self.inner.pending).take()?;
        info!(device = %self.inner.device_id, sensors = payload.sensors.len(), "Flushing queued save");
        Some(self.perform(payload).await)
    }

    /// Follow a connectivity source until the returned subscription is dropped
    pub fn attach_connectivity(&self, mut rx: watch::Receiver<bool>) -> Subscription {
        let initial = *rx.borrow_and_update();
        self.inner.online.store(initial, Ordering::SeqCst);

        let weak = Arc::downgrade(&self.inner);
        let task = tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let online = *rx.borrow_and_update();
                let Some(gateway) = Self::from_weak(&weak) else {
                    break;
                };
                if let Some(Err(err)) = gateway.set_online(online).await {
                    warn!(error = %err, "Flush after reconnect failed");
                }
            }
        });
        Subscription::new(task)
    }

    // ----- misc -----

    /// Last payload mirrored to the local fallback store
    pub fn restore_local(&self) -> Result<Option<SavePayload>> {
        self.inner.fallback.read(&self.inner.device_id)
    }

    /// Global bookkeeping of the device the operator looked at last
    pub async fn remember_last_selected_device(&self, context: &str) -> Result<()> {
        let api = &self.inner.api;
        api.patch_global(GLOBAL_LAST_DEVICE_FIELD, Value::from(self.inner.device_id.clone()))
            .await?;
        api.patch_global(GLOBAL_LAST_CONTEXT_FIELD, Value::from(context))
            .await?;
        debug!(device = %self.inner.device_id, context, "Remembered last selected device");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::memory::{Failure, MemoryApi, Operation};
    use crate::connectivity::Connectivity;
    use crate::fallback::MemoryFallbackStore;
    use crate::status::SaveState;
    use crate::types::{GreenhouseConfig, SensorPosition};

    struct Harness {
        api: Arc<MemoryApi>,
        fallback: Arc<MemoryFallbackStore>,
        gateway: PersistenceGateway,
    }

    fn harness() -> Harness {
        harness_with(GatewaySettings::default())
    }

    fn harness_with(settings: GatewaySettings) -> Harness {
        let api = Arc::new(MemoryApi::new());
        let fallback = Arc::new(MemoryFallbackStore::new());
        let gateway = PersistenceGateway::new("dev1", api.clone(), fallback.clone(), settings);
        Harness { api, fallback, gateway }
    }

    fn payload(x: f64) -> SavePayload {
        SavePayload {
            config: GreenhouseConfig::default(),
            sensors: vec![SensorPosition {
                device_id: "dev1".into(),
                device_name: "North".into(),
                sensor_type: "CO2".into(),
                sensor_id: "dev1_scd30".into(),
                x,
                y: 10.0,
                z: 20.0,
                sensor_info: None,
            }],
        }
    }

    fn stored_x(api: &MemoryApi, view: ViewType) -> Option<f64> {
        api.stored_positions("dev1", view).map(|records| records[0].x)
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounce_coalesces_burst_into_one_save() {
        let h = harness();
        for i in 0..5 {
            h.gateway.schedule_save(payload(i as f64));
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert_eq!(h.api.total_calls(), 0);

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(h.api.count(Operation::SavePositions), 2);
        assert_eq!(h.api.count(Operation::SaveFilter), 2);
        assert_eq!(stored_x(&h.api, ViewType::FloorPlan), Some(4.0));
        assert_eq!(stored_x(&h.api, ViewType::SideView), Some(4.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_save_inside_window_is_throttled() {
        let h = harness();
        assert_eq!(h.gateway.save(payload(1.0)).await.unwrap(), SaveOutcome::Saved);
        let calls = h.api.total_calls();

        tokio::time::advance(Duration::from_millis(500)).await;
        assert_eq!(h.gateway.save(payload(2.0)).await.unwrap(), SaveOutcome::Throttled);
        assert_eq!(h.api.total_calls(), calls);

        tokio::time::advance(Duration::from_millis(600)).await;
        assert_eq!(h.gateway.save(payload(3.0)).await.unwrap(), SaveOutcome::Saved);
        assert_eq!(stored_x(&h.api, ViewType::FloorPlan), Some(3.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_offline_saves_queue_and_flush_once() {
        let h = harness();
        h.gateway.set_online(false).await;

        assert_eq!(h.gateway.save(payload(1.0)).await.unwrap(), SaveOutcome::Queued);
        assert_eq!(h.fallback.write_count(), 1);
        assert_eq!(h.gateway.save(payload(2.0)).await.unwrap(), SaveOutcome::Queued);
        assert_eq!(h.fallback.write_count(), 2);
        assert_eq!(h.api.total_calls(), 0);
        assert_eq!(h.gateway.status().save_state, SaveState::OfflineQueued);

        let flushed = h.gateway.set_online(true).await;
        assert_eq!(flushed.unwrap().unwrap(), SaveOutcome::Saved);
        assert_eq!(h.api.count(Operation::SaveFilter), 2);
        assert_eq!(stored_x(&h.api, ViewType::SideView), Some(2.0));
        assert!(h.gateway.pending_payload().is_none());

        // repeated online notification does not flush again
        assert!(h.gateway.set_online(true).await.is_none());
        assert_eq!(h.api.count(Operation::SaveFilter), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_bypasses_throttle() {
        let h = harness();
        h.gateway.save(payload(1.0)).await.unwrap();
        h.gateway.set_online(false).await;
        h.gateway.save(payload(2.0)).await.unwrap();
        // still inside the throttle window of the first save
        let flushed = h.gateway.set_online(true).await;
        assert_eq!(flushed.unwrap().unwrap(), SaveOutcome::Saved);
        assert_eq!(stored_x(&h.api, ViewType::FloorPlan), Some(2.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_connectivity_subscription_drives_flush() {
        let h = harness();
        let connectivity = Connectivity::new(true);
        let subscription = h.gateway.attach_connectivity(connectivity.subscribe());

        connectivity.set_online(false);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!h.gateway.is_online());
        h.gateway.save(payload(7.0)).await.unwrap();
        assert_eq!(h.api.total_calls(), 0);

        connectivity.set_online(true);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(h.api.count(Operation::SavePositions), 2);
        assert_eq!(stored_x(&h.api, ViewType::FloorPlan), Some(7.0));

        drop(subscription);
        tokio::time::sleep(Duration::from_millis(10)).await;
        connectivity.set_online(false);
        tokio::time::sleep(Duration::from_millis(10)).await;
        // unsubscribed: the gateway no longer follows the source
        assert!(h.gateway.is_online());
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_save_reports_failure_without_rollback() {
        let h = harness();
        h.api.fail_next(Operation::SaveFilter, Some(ViewType::SideView), Failure::Decode);

        let err = h.gateway.save(payload(5.0)).await.unwrap_err();
        assert!(matches!(err, SyncError::PartialSave { failed: ViewType::SideView, .. }));
        assert_eq!(stored_x(&h.api, ViewType::FloorPlan), Some(5.0));
        assert!(h.api.stored_positions("dev1", ViewType::SideView).is_none());

        let status = h.gateway.status();
        assert_eq!(status.save_state, SaveState::ErrorReported);
        assert!(status.error_message().unwrap().contains("side view"));
        assert!(h.gateway.pending_payload().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_errors_retry_then_succeed() {
        let h = harness();
        h.api.fail_next(Operation::SavePositions, Some(ViewType::FloorPlan), Failure::Server(503));
        h.api.fail_next(Operation::SavePositions, Some(ViewType::FloorPlan), Failure::Server(503));

        let start = Instant::now();
        assert_eq!(h.gateway.save(payload(1.0)).await.unwrap(), SaveOutcome::Saved);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(3000) && elapsed < Duration::from_millis(3100));
        assert_eq!(h.api.count(Operation::SavePositions), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_server_errors_report_and_queue() {
        let h = harness();
        for _ in 0..6 {
            h.api.fail_next(Operation::SaveFilter, None, Failure::Server(500));
        }

        let err = h.gateway.save(payload(1.0)).await.unwrap_err();
        assert!(matches!(err, SyncError::Server { status: 500, .. }));
        assert_eq!(h.api.count(Operation::SaveFilter), 6);
        assert_eq!(h.api.count(Operation::SavePositions), 0);

        let status = h.gateway.status();
        assert_eq!(status.save_state, SaveState::ErrorReported);
        assert!(status.error_message().is_some());
        assert!(!status.saving);
        assert!(h.gateway.pending_payload().is_some());
        assert_eq!(h.fallback.write_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounced_save_waits_out_throttle() {
        let h = harness_with(GatewaySettings {
            debounce: Duration::from_millis(200),
            ..GatewaySettings::default()
        });
        h.gateway.schedule_save(payload(1.0));
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(stored_x(&h.api, ViewType::FloorPlan), Some(1.0));

        // fires inside the throttle window of the first save
        h.gateway.schedule_save(payload(2.0));
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(stored_x(&h.api, ViewType::FloorPlan), Some(2.0));
        assert_eq!(stored_x(&h.api, ViewType::SideView), Some(2.0));
        assert_eq!(h.api.count(Operation::SavePositions), 4);
        assert!(!h.gateway.has_scheduled_save());
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttled_debounced_save_yields_to_newer_payload() {
        let h = harness_with(GatewaySettings {
            debounce: Duration::from_millis(200),
            ..GatewaySettings::default()
        });
        h.gateway.schedule_save(payload(1.0));
        tokio::time::sleep(Duration::from_millis(300)).await;
        h.gateway.schedule_save(payload(2.0));
        tokio::time::sleep(Duration::from_millis(300)).await;
        h.gateway.schedule_save(payload(3.0));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(stored_x(&h.api, ViewType::FloorPlan), Some(3.0));
        assert_eq!(h.api.count(Operation::SavePositions), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_network_failure_queues_silently() {
        let h = harness();
        h.api.set_unreachable(true);
        assert_eq!(h.gateway.save(payload(1.0)).await.unwrap(), SaveOutcome::Queued);
        let status = h.gateway.status();
        assert_eq!(status.save_state, SaveState::OfflineQueued);
        assert!(status.error_message().is_none());
        assert_eq!(h.fallback.write_count(), 1);
        assert_eq!(h.gateway.restore_local().unwrap().unwrap().sensors[0].x, 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_uses_cache_until_ttl() {
        let h = harness();
        h.api.seed(
            "dev1",
            ViewType::FloorPlan,
            &GreenhouseConfig { width: 30.0, ..GreenhouseConfig::default() },
            vec![PositionRecord::from_position(&payload(12.0).sensors[0])],
        );

        let first = h.gateway.load(ViewType::FloorPlan).await.unwrap();
        assert_eq!(first.config.width, 30.0);
        assert_eq!(first.sensors[0].x, 12.0);
        assert_eq!(first.sensors[0].type_code(), 4);
        h.gateway.load(ViewType::FloorPlan).await.unwrap();
        assert_eq!(h.api.count(Operation::GetFilter), 1);

        tokio::time::advance(Duration::from_secs(300)).await;
        h.gateway.load(ViewType::FloorPlan).await.unwrap();
        assert_eq!(h.api.count(Operation::GetFilter), 2);

        h.gateway.refresh();
        h.gateway.load(ViewType::FloorPlan).await.unwrap();
        assert_eq!(h.api.count(Operation::GetFilter), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_successful_save_invalidates_cache() {
        let h = harness();
        h.gateway.load(ViewType::FloorPlan).await.unwrap();
        h.gateway.save(payload(9.0)).await.unwrap();
        let reloaded = h.gateway.load(ViewType::FloorPlan).await.unwrap();
        assert_eq!(h.api.count(Operation::GetFilter), 2);
        assert_eq!(reloaded.sensors[0].x, 9.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_during_load_is_not_cached_over() {
        let h = harness_with(GatewaySettings {
            throttle: Duration::ZERO,
            ..GatewaySettings::default()
        });
        h.gateway.save(payload(1.0)).await.unwrap();
        h.api.fail_next(Operation::GetFilter, Some(ViewType::FloorPlan), Failure::Network);

        // positions are read at once, the filter read backs off for a second
        let (loaded, saved) = tokio::join!(h.gateway.load(ViewType::FloorPlan), async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            h.gateway.save(payload(2.0)).await
        });
        assert_eq!(saved.unwrap(), SaveOutcome::Saved);
        assert_eq!(loaded.unwrap().sensors[0].x, 1.0);

        let reloaded = h.gateway.load(ViewType::FloorPlan).await.unwrap();
        assert_eq!(reloaded.sensors[0].x, 2.0);
        assert_eq!(h.api.count(Operation::GetPositions), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_retries_reads() {
        let h = harness();
        h.api.fail_next(Operation::GetFilter, None, Failure::Network);
        h.api.fail_next(Operation::GetFilter, None, Failure::Network);
        let start = Instant::now();
        let aggregate = h.gateway.load(ViewType::SideView).await.unwrap();
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(3000) && elapsed < Duration::from_millis(3100));
        assert!(aggregate.sensors.is_empty());
        assert!(!h.gateway.status().loading);
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_failure_propagates() {
        let h = harness();
        h.api.set_unreachable(true);
        assert!(h.gateway.load(ViewType::FloorPlan).await.unwrap_err().is_network());
    }

    #[tokio::test(start_paused = true)]
    async fn test_selected_sensor_written_into_filters() {
        let h = harness();
        h.gateway.set_selected_sensor(Some("dev1_scd30"));
        h.gateway.save(payload(1.0)).await.unwrap();
        let filter = h.api.stored_filter("dev1", ViewType::FloorPlan).unwrap();
        assert_eq!(filter.selected_sensor, "dev1_scd30");
    }

    #[tokio::test]
    async fn test_remember_last_selected_device() {
        let h = harness();
        h.gateway.remember_last_selected_device("home").await.unwrap();
        assert_eq!(h.api.global(GLOBAL_LAST_DEVICE_FIELD), Some(Value::from("dev1")));
        assert_eq!(h.api.global(GLOBAL_LAST_CONTEXT_FIELD), Some(Value::from("home")));
    }
}
