//! Floor-plan editing session for one device group
//!
//! Ties together the position store, drag controller, layout generator and
//! persistence gateway. Pointer handling is synchronous; anything touching
//! the network is async.

use std::time::Duration;
use tracing::{debug, info, warn};

use crate::drag::{DragController, DragSignal, InputEvent};
use crate::error::Result;
use crate::gateway::{PersistenceGateway, SaveOutcome};
use crate::layout::{generate_layout, reconcile_saved};
use crate::store::PositionStore;
use crate::transform::ViewProjection;
use crate::types::{ConfigLimits, DeviceSensors, GreenhouseConfig, PositionUpdate, SavePayload, ViewType};

/// Where the positions shown after a load came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadSource {
    Remote,
    Generated,
}

pub struct FloorPlanSession {
    config: GreenhouseConfig,
    devices: Vec<DeviceSensors>,
    store: PositionStore,
    drag: DragController,
    gateway: PersistenceGateway,
}

impl FloorPlanSession {
    pub fn new(gateway: PersistenceGateway, devices: Vec<DeviceSensors>, drag_threshold: Duration) -> Self {
        Self {
            config: GreenhouseConfig::default(),
            devices,
            store: PositionStore::new(),
            drag: DragController::new(drag_threshold),
            gateway,
        }
    }

    pub fn config(&self) -> &GreenhouseConfig {
        &self.config
    }

    pub fn store(&self) -> &PositionStore {
        &self.store
    }

    pub fn gateway(&self) -> &PersistenceGateway {
        &self.gateway
    }

    pub fn devices(&self) -> &[DeviceSensors] {
        &self.devices
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_capturing()
    }

    pub fn set_devices(&mut self, devices: Vec<DeviceSensors>) {
        self.devices = devices;
    }

    /// Current config and positions, as handed to the gateway
    pub fn payload(&self) -> SavePayload {
        SavePayload {
            config: self.config.clone(),
            sensors: self.store.snapshot(),
        }
    }

    /// Load the floor plan; generate and persist a layout if nothing usable exists
    pub async fn load(&mut self) -> Result<LoadSource> {
        match self.gateway.load(ViewType::FloorPlan).await {
            Ok(aggregate) => {
                match aggregate.config.validate(ConfigLimits::STORED) {
                    Ok(()) => self.config = aggregate.config,
                    Err(err) => warn!(error = %err, "Stored greenhouse config rejected, keeping current"),
                }

                // Without a live device list the stored set is taken as is
                let usable = if self.devices.is_empty() {
                    aggregate.sensors
                } else {
                    reconcile_saved(&aggregate.sensors, &self.devices)
                };
                if !usable.is_empty() {
                    self.store.replace_all(usable);
                    info!(sensors = self.store.len(), "Using stored sensor positions");
                    return Ok(LoadSource::Remote);
                }
                debug!("No stored positions for active sensors");
            }
            Err(err) => {
                warn!(error = %err, "Loading stored positions failed, generating layout");
            }
        }

        self.generate_and_persist().await;
        Ok(LoadSource::Generated)
    }

    /// Replace positions with a fresh layout and write it through
    async fn generate_and_persist(&mut self) {
        self.store.replace_all(generate_layout(&self.devices));
        self.persist_now().await;
    }

    /// Save immediately; a throttled save is re-issued through the debounce
    async fn persist_now(&self) -> Option<SaveOutcome> {
        let payload = self.payload();
        match self.gateway.save(payload.clone()).await {
            Ok(SaveOutcome::Throttled) => {
                debug!("Save throttled, rescheduling");
                self.gateway.schedule_save(payload);
                Some(SaveOutcome::Throttled)
            }
            Ok(outcome) => Some(outcome),
            Err(err) => {
                // Already queued and shown by the gateway
                warn!(error = %err, "Save failed");
                None
            }
        }
    }

    /// Feed one pointer/touch event through the drag controller
    pub fn handle_input(&mut self, event: InputEvent<'_>, view: ViewType) -> DragSignal {
        let projection = match view {
            ViewType::FloorPlan => ViewProjection::plan(),
            ViewType::SideView => ViewProjection::elevation(&self.config),
        };
        let signal = self.drag.handle(event, &mut self.store, &projection);
        if let DragSignal::Started { sensor_id } = &signal {
            self.gateway.drag_started();
            self.gateway.set_selected_sensor(Some(sensor_id));
        }
        signal
    }

    /// Persist after a [`DragSignal::Commit`]
    pub async fn commit(&self) -> Option<SaveOutcome> {
        self.persist_now().await
    }

    /// Numeric edit from a form; persisted through the debounce
    pub fn edit_position(&mut self, sensor_id: &str, update: PositionUpdate) -> Result<()> {
        self.store.apply_edit(sensor_id, update)?;
        self.gateway.schedule_save(self.payload());
        Ok(())
    }

    /// Validate and apply a new greenhouse config, saving it with the positions
    pub async fn update_config(&mut self, config: GreenhouseConfig) -> Result<Option<SaveOutcome>> {
        config.validate(ConfigLimits::EDITOR)?;
        info!(name = %config.name, width = config.width, length = config.length, height = config.height, "Greenhouse config updated");
        self.config = config;
        Ok(self.persist_now().await)
    }

    /// Clear, regenerate and persist all positions
    pub async fn reset_layout(&mut self) {
        info!(devices = self.devices.len(), "Resetting sensor layout");
        self.drag.cancel(&mut self.store);
        self.store.clear();
        self.generate_and_persist().await;
    }

    /// Toggle selection
    pub fn select(&mut self, sensor_id: &str) -> Option<String> {
        let selected = self.store.select(sensor_id).map(str::to_string);
        self.gateway.set_selected_sensor(selected.as_deref());
        selected
    }

    /// Set selection directly (list controls)
    pub fn set_selection(&mut self, sensor_id: Option<&str>) {
        self.store.set_selection(sensor_id);
        self.gateway.set_selected_sensor(sensor_id);
    }

    /// Drop cached reads and load again
    pub async fn refresh(&mut self) -> Result<LoadSource> {
        self.gateway.refresh();
        self.load().await
    }

    /// Apply the locally mirrored payload, if any. Returns whether one existed.
    pub fn restore_local(&mut self) -> Result<bool> {
        let Some(payload) = self.gateway.restore_local()? else {
            return Ok(false);
        };
        self.config = payload.config;
        self.store.replace_all(payload.sensors);
        info!(sensors = self.store.len(), "Restored local fallback");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::PositionRecord;
    use crate::api::memory::{MemoryApi, Operation};
    use crate::drag::PointerSource;
    use crate::fallback::MemoryFallbackStore;
    use crate::gateway::GatewaySettings;
    use crate::transform::{Point, SurfaceRect};
    use crate::types::DetectedSensor;
    use std::sync::Arc;
    use std::time::Instant;

    fn devices() -> Vec<DeviceSensors> {
        vec![DeviceSensors {
            device_id: "dev1".into(),
            device_name: "North".into(),
            sensors: vec![
                DetectedSensor { name: "scd30".into(), channel: 0, type_code: 4, active: true, values: vec![] },
                DetectedSensor { name: "bh1750".into(), channel: 1, type_code: 2, active: true, values: vec![] },
            ],
        }]
    }

    fn session(api: Arc<MemoryApi>) -> FloorPlanSession {
        let gateway = PersistenceGateway::new(
            "dev1",
            api,
            Arc::new(MemoryFallbackStore::new()),
            GatewaySettings::default(),
        );
        FloorPlanSession::new(gateway, devices(), Duration::from_millis(100))
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_remote_generates_and_writes_back() {
        let api = Arc::new(MemoryApi::new());
        let mut session = session(api.clone());

        assert_eq!(session.load().await.unwrap(), LoadSource::Generated);
        assert_eq!(session.store().len(), 2);
        let stored = api.stored_positions("dev1", ViewType::FloorPlan).unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].x, session.store().positions()[0].x);
        assert!(api.stored_positions("dev1", ViewType::SideView).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stored_positions_win_over_generation() {
        let api = Arc::new(MemoryApi::new());
        let mut seeded = session(api.clone());
        seeded.load().await.unwrap();
        let mut record = PositionRecord::from_position(&seeded.store().positions()[0]);
        record.x = 33.0;
        api.seed("dev1", ViewType::FloorPlan, &GreenhouseConfig::default(), vec![record]);

        let mut fresh = session(api.clone());
        assert_eq!(fresh.load().await.unwrap(), LoadSource::Remote);
        assert_eq!(fresh.store().len(), 1);
        assert_eq!(fresh.store().positions()[0].x, 33.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_load_falls_back_to_layout() {
        let api = Arc::new(MemoryApi::new());
        api.set_unreachable(true);
        let mut session = session(api.clone());
        assert_eq!(session.load().await.unwrap(), LoadSource::Generated);
        assert_eq!(session.store().len(), 2);
        // write-back could not reach the server and was queued
        assert!(session.gateway().pending_payload().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drag_commit_persists_snapshot() {
        let api = Arc::new(MemoryApi::new());
        let mut session = session(api.clone());
        session.load().await.unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;

        let id = session.store().positions()[0].sensor_id.clone();
        let start = Instant::now();
        let surface = SurfaceRect::new(0.0, 0.0, 400.0, 300.0);
        session.handle_input(InputEvent::Press { sensor_id: &id, source: PointerSource::Mouse, at: start }, ViewType::FloorPlan);
        assert!(session.is_dragging());
        session.handle_input(InputEvent::Move { pointer: Point::new(200.0, 150.0), surface }, ViewType::FloorPlan);
        // no network during the drag
        let calls = api.total_calls();

        let signal = session.handle_input(
            InputEvent::Release { at: start + Duration::from_millis(300) },
            ViewType::FloorPlan,
        );
        assert!(matches!(signal, DragSignal::Commit { .. }));
        assert_eq!(api.total_calls(), calls);

        assert_eq!(session.commit().await, Some(SaveOutcome::Saved));
        let stored = api.stored_positions("dev1", ViewType::FloorPlan).unwrap();
        let moved = stored.iter().find(|r| r.sensor_id == id).unwrap();
        assert!((moved.x - 50.0).abs() < 1e-9);
        assert_eq!(api.stored_filter("dev1", ViewType::FloorPlan).unwrap().selected_sensor, id);
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttled_commit_is_rescheduled() {
        let api = Arc::new(MemoryApi::new());
        let mut session = session(api.clone());
        session.load().await.unwrap();

        // immediately after the write-back: inside the throttle window
        assert_eq!(session.commit().await, Some(SaveOutcome::Throttled));
        assert!(session.gateway().has_scheduled_save());
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(api.count(Operation::SavePositions), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_edits_are_debounced() {
        let api = Arc::new(MemoryApi::new());
        let mut session = session(api.clone());
        session.load().await.unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;
        let before = api.count(Operation::SavePositions);

        let id = session.store().positions()[1].sensor_id.clone();
        for z in [10.0, 20.0, 30.0] {
            session.edit_position(&id, PositionUpdate { z: Some(z), ..Default::default() }).unwrap();
        }
        assert!(session.edit_position("ghost", PositionUpdate::plan(1.0, 1.0)).is_err());
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert_eq!(api.count(Operation::SavePositions), before + 2);
        let stored = api.stored_positions("dev1", ViewType::SideView).unwrap();
        assert_eq!(stored.iter().find(|r| r.sensor_id == id).unwrap().z, 30.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_config_validates_editor_limits() {
        let api = Arc::new(MemoryApi::new());
        let mut session = session(api.clone());
        let too_wide = GreenhouseConfig { width: 150.0, ..GreenhouseConfig::default() };
        assert!(session.update_config(too_wide).await.is_err());
        assert_eq!(api.total_calls(), 0);

        let taller = GreenhouseConfig { height: 8.0, ..GreenhouseConfig::default() };
        assert_eq!(session.update_config(taller).await.unwrap(), Some(SaveOutcome::Saved));
        assert_eq!(session.config().height, 8.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_regenerates_layout() {
        let api = Arc::new(MemoryApi::new());
        let mut session = session(api.clone());
        session.load().await.unwrap();
        let id = session.store().positions()[0].sensor_id.clone();
        tokio::time::sleep(Duration::from_secs(2)).await;
        session.edit_position(&id, PositionUpdate::plan(1.0, 1.0)).unwrap();
        tokio::time::sleep(Duration::from_secs(3)).await;

        session.reset_layout().await;
        let generated = generate_layout(&devices());
        assert_eq!(session.store().positions(), generated.as_slice());
        let stored = api.stored_positions("dev1", ViewType::FloorPlan).unwrap();
        assert_eq!(stored[0].x, generated[0].x);
    }

    #[tokio::test(start_paused = true)]
    async fn test_selection_toggle_and_direct_set() {
        let api = Arc::new(MemoryApi::new());
        let mut session = session(api);
        session.load().await.unwrap();
        let id = session.store().positions()[0].sensor_id.clone();

        assert_eq!(session.select(&id), Some(id.clone()));
        assert_eq!(session.select(&id), None);
        session.set_selection(Some(&id));
        session.set_selection(Some(&id));
        assert_eq!(session.store().selected(), Some(id.as_str()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_restore_local_applies_queued_payload() {
        let api = Arc::new(MemoryApi::new());
        api.set_unreachable(true);
        let mut session = session(api.clone());
        session.load().await.unwrap();

        let mut other = self::session(api);
        assert!(!other.restore_local().unwrap());
        // separate fallback stores per session
        assert!(other.store().is_empty());

        assert!(session.restore_local().unwrap());
        assert_eq!(session.store().len(), 2);
    }
}
