//! Canonical in-memory sensor positions plus selection and drag state

use std::collections::{BTreeMap, HashSet};
use tracing::{debug, warn};

use crate::error::{Result, SyncError};
use crate::types::{PositionUpdate, SensorPosition, clamp_percent};

/// Position list with a single-slot selection and the current drag target
#[derive(Debug, Default, Clone)]
pub struct PositionStore {
    positions: Vec<SensorPosition>,
    selected: Option<String>,
    drag_target: Option<String>,
}

impl PositionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_positions(positions: Vec<SensorPosition>) -> Self {
        let mut store = Self::new();
        store.replace_all(positions);
        store
    }

    /// Replace the whole list. Coordinates are clamped and duplicate ids keep
    /// their first occurrence.
    pub fn replace_all(&mut self, positions: Vec<SensorPosition>) {
        let mut seen = HashSet::new();
        let mut kept = Vec::with_capacity(positions.len());
        for mut position in positions {
            if !seen.insert(position.sensor_id.clone()) {
                warn!(sensor_id = %position.sensor_id, "Duplicate sensor id in position list, keeping first");
                continue;
            }
            position.clamp_coordinates();
            kept.push(position);
        }
        self.positions = kept;

        // Drop transient references to sensors that disappeared
        if let Some(id) = &self.selected
            && !seen.contains(id)
        {
            self.selected = None;
        }
        if let Some(id) = &self.drag_target
            && !seen.contains(id)
        {
            self.drag_target = None;
        }
        debug!(count = self.positions.len(), "Position store replaced");
    }

    /// Empty the list and forget selection/drag state
    pub fn clear(&mut self) {
        self.positions.clear();
        self.selected = None;
        self.drag_target = None;
    }

    pub fn positions(&self) -> &[SensorPosition] {
        &self.positions
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn get(&self, sensor_id: &str) -> Option<&SensorPosition> {
        self.positions.iter().find(|p| p.sensor_id == sensor_id)
    }

    fn get_mut(&mut self, sensor_id: &str) -> Option<&mut SensorPosition> {
        self.positions.iter_mut().find(|p| p.sensor_id == sensor_id)
    }

    /// Drag-time update: local only, silently ignores unknown ids
    pub fn apply_transient(&mut self, sensor_id: &str, update: PositionUpdate) -> bool {
        match self.get_mut(sensor_id) {
            Some(position) => {
                apply_update(position, update);
                true
            }
            None => false,
        }
    }

    /// Numeric edit from a form; the caller persists afterwards
    pub fn apply_edit(&mut self, sensor_id: &str, update: PositionUpdate) -> Result<&SensorPosition> {
        let position = self
            .get_mut(sensor_id)
            .ok_or_else(|| SyncError::UnknownSensor(sensor_id.to_string()))?;
        apply_update(position, update);
        Ok(position)
    }

    /// Toggle selection: re-selecting the selected sensor clears it
    pub fn select(&mut self, sensor_id: &str) -> Option<&str> {
        if self.selected.as_deref() == Some(sensor_id) {
            self.selected = None;
        } else {
            self.selected = Some(sensor_id.to_string());
        }
        self.selected.as_deref()
    }

    /// Set the selection without toggling (list controls, drag start)
    pub fn set_selection(&mut self, sensor_id: Option<&str>) {
        self.selected = sensor_id.map(str::to_string);
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn selected_position(&self) -> Option<&SensorPosition> {
        self.selected.as_deref().and_then(|id| self.get(id))
    }

    pub fn set_drag_target(&mut self, sensor_id: &str) {
        self.drag_target = Some(sensor_id.to_string());
    }

    pub fn clear_drag_target(&mut self) -> Option<String> {
        self.drag_target.take()
    }

    pub fn drag_target(&self) -> Option<&str> {
        self.drag_target.as_deref()
    }

    /// Owned copy of the positions for a persistence write
    pub fn snapshot(&self) -> Vec<SensorPosition> {
        self.positions.clone()
    }

    /// Other sensors within `radius` of `sensor_id`, nearest first
    pub fn nearby(&self, sensor_id: &str, radius: f64) -> Vec<(&SensorPosition, f64)> {
        let Some(origin) = self.get(sensor_id) else {
            return Vec::new();
        };
        let mut found: Vec<_> = self
            .positions
            .iter()
            .filter(|p| p.sensor_id != sensor_id)
            .map(|p| (p, origin.distance_to(p)))
            .filter(|(_, d)| *d <= radius)
            .collect();
        found.sort_by(|a, b| a.1.total_cmp(&b.1));
        found
    }

    /// Positions grouped by device id
    pub fn group_by_device(&self) -> BTreeMap<&str, Vec<&SensorPosition>> {
        let mut groups: BTreeMap<&str, Vec<&SensorPosition>> = BTreeMap::new();
        for position in &self.positions {
            groups.entry(position.device_id.as_str()).or_default().push(position);
        }
        groups
    }
}

fn apply_update(position: &mut SensorPosition, update: PositionUpdate) {
    if let Some(x) = update.x {
        position.x = clamp_percent(x);
    }
    if let Some(y) = update.y {
        position.y = clamp_percent(y);
    }
    if let Some(z) = update.z {
        position.z = clamp_percent(z);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(device: &str, name: &str, x: f64, y: f64, z: f64) -> SensorPosition {
        SensorPosition {
            device_id: device.to_string(),
            device_name: device.to_string(),
            sensor_type: "Temperature".to_string(),
            sensor_id: SensorPosition::compose_id(device, name),
            x,
            y,
            z,
            sensor_info: None,
        }
    }

    #[test]
    fn test_replace_all_dedupes_and_clamps() {
        let mut store = PositionStore::new();
        store.replace_all(vec![
            position("a", "t", 150.0, -3.0, 50.0),
            position("a", "t", 10.0, 10.0, 10.0),
            position("b", "t", 20.0, 20.0, 20.0),
        ]);
        assert_eq!(store.len(), 2);
        let first = store.get("a_t").unwrap();
        assert_eq!((first.x, first.y, first.z), (100.0, 0.0, 50.0));
    }

    #[test]
    fn test_transient_update_only_touches_given_axes() {
        let mut store = PositionStore::from_positions(vec![position("a", "t", 10.0, 20.0, 30.0)]);
        assert!(store.apply_transient("a_t", PositionUpdate::elevation(55.0, 120.0)));
        let p = store.get("a_t").unwrap();
        assert_eq!((p.x, p.y, p.z), (55.0, 20.0, 100.0));
        assert!(!store.apply_transient("missing", PositionUpdate::plan(1.0, 1.0)));
    }

    #[test]
    fn test_apply_edit_unknown_sensor() {
        let mut store = PositionStore::new();
        let err = store.apply_edit("nope", PositionUpdate::plan(1.0, 2.0)).unwrap_err();
        assert!(matches!(err, SyncError::UnknownSensor(id) if id == "nope"));
    }

    #[test]
    fn test_select_toggles_and_replaces() {
        let mut store = PositionStore::from_positions(vec![
            position("a", "t", 1.0, 1.0, 1.0),
            position("b", "t", 2.0, 2.0, 2.0),
        ]);
        assert_eq!(store.select("a_t"), Some("a_t"));
        assert_eq!(store.select("b_t"), Some("b_t"));
        assert_eq!(store.select("b_t"), None);

        store.set_selection(Some("a_t"));
        store.set_selection(Some("a_t"));
        assert_eq!(store.selected(), Some("a_t"));
    }

    #[test]
    fn test_replace_all_drops_stale_selection() {
        let mut store = PositionStore::from_positions(vec![position("a", "t", 1.0, 1.0, 1.0)]);
        store.set_selection(Some("a_t"));
        store.set_drag_target("a_t");
        store.replace_all(vec![position("b", "t", 2.0, 2.0, 2.0)]);
        assert!(store.selected().is_none());
        assert!(store.drag_target().is_none());
    }

    #[test]
    fn test_clear_resets_everything() {
        let mut store = PositionStore::from_positions(vec![position("a", "t", 1.0, 1.0, 1.0)]);
        store.set_selection(Some("a_t"));
        store.clear();
        assert!(store.is_empty());
        assert!(store.selected().is_none());
    }

    #[test]
    fn test_nearby_sorted_by_distance() {
        let store = PositionStore::from_positions(vec![
            position("a", "o", 50.0, 50.0, 50.0),
            position("a", "far", 90.0, 90.0, 90.0),
            position("a", "mid", 55.0, 50.0, 50.0),
            position("b", "near", 51.0, 50.0, 50.0),
        ]);
        let ids: Vec<_> = store.nearby("a_o", 10.0).iter().map(|(p, _)| p.sensor_id.clone()).collect();
        assert_eq!(ids, vec!["b_near", "a_mid"]);
    }

    #[test]
    fn test_group_by_device() {
        let store = PositionStore::from_positions(vec![
            position("a", "1", 1.0, 1.0, 1.0),
            position("b", "1", 1.0, 1.0, 1.0),
            position("a", "2", 1.0, 1.0, 1.0),
        ]);
        let groups = store.group_by_device();
        assert_eq!(groups["a"].len(), 2);
        assert_eq!(groups["b"].len(), 1);
    }
}
