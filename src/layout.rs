//! Deterministic initial placement of sensors
//!
//! Devices get an anchor point (single row for up to three devices, a
//! three-column grid beyond that) and their active sensors are spread on a
//! circle around it. Heights step upward per sensor. No randomness: the same
//! device list always yields the same positions.

use std::collections::HashSet;
use tracing::{debug, info, warn};

use crate::constants::layout::*;
use crate::sensor_meta::metadata_for;
use crate::types::{DetectedSensor, DeviceSensors, SensorInfo, SensorPosition};

/// Anchor point of a device in percentage space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Anchor {
    pub x: f64,
    pub y: f64,
}

/// Anchor for the device at `device_index` out of `device_count`
pub fn device_anchor(device_index: usize, device_count: usize) -> Anchor {
    if device_count <= SINGLE_ROW_MAX_DEVICES {
        Anchor {
            x: ROW_BASE_X + device_index as f64 * ROW_STEP_X,
            y: ROW_BASE_Y,
        }
    } else {
        let row = device_index / GRID_COLUMNS;
        let col = device_index % GRID_COLUMNS;
        Anchor {
            x: GRID_BASE_X + col as f64 * GRID_STEP_X,
            y: GRID_BASE_Y + row as f64 * GRID_STEP_Y,
        }
    }
}

/// Circle radius for a device with `sensor_count` active sensors
pub fn ring_radius(sensor_count: usize) -> f64 {
    MAX_RADIUS.min(BASE_RADIUS + sensor_count as f64 * RADIUS_PER_SENSOR)
}

/// Coordinates of one sensor on its device's ring
pub fn place_sensor(anchor: Anchor, sensor_index: usize, sensor_count: usize) -> (f64, f64, f64) {
    let count = sensor_count.max(1) as f64;
    let angle = (sensor_index as f64 * 360.0 / count).to_radians();
    let radius = ring_radius(sensor_count);

    let x = (anchor.x + radius * angle.cos()).clamp(MIN_XY, MAX_XY);
    let y = (anchor.y + radius * angle.sin()).clamp(MIN_XY, MAX_XY);

    let increment = MAX_HEIGHT_INCREMENT.min(HEIGHT_SPREAD / count);
    let z = (BASE_HEIGHT + sensor_index as f64 * increment).clamp(MIN_Z, MAX_Z);

    (x, y, z)
}

/// Generate one position per active sensor of every device.
///
/// Devices without active sensors still occupy their slot in the anchor
/// layout. Duplicate sensor names within a device are placed once.
pub fn generate_layout(devices: &[DeviceSensors]) -> Vec<SensorPosition> {
    let device_count = devices.len();
    let mut seen = HashSet::new();
    let mut positions = Vec::new();

    for (device_index, device) in devices.iter().enumerate() {
        let active = unique_active_sensors(device);
        let anchor = device_anchor(device_index, device_count);
        debug!(device = %device.device_id, index = device_index, active = active.len(), "Placing device sensors");

        for (sensor_index, sensor) in active.iter().enumerate() {
            let sensor_id = SensorPosition::compose_id(&device.device_id, &sensor.name);
            if !seen.insert(sensor_id.clone()) {
                warn!(sensor_id = %sensor_id, "Duplicate sensor id across devices, skipping");
                continue;
            }
            let (x, y, z) = place_sensor(anchor, sensor_index, active.len());
            positions.push(build_position(device, sensor, sensor_id, x, y, z));
        }
    }

    info!(devices = device_count, sensors = positions.len(), "Generated default sensor layout");
    positions
}

/// Keep saved positions for sensors that are still active.
///
/// Output follows live device order; display metadata is refreshed from the
/// metadata table while coordinates come from the saved record.
pub fn reconcile_saved(saved: &[SensorPosition], devices: &[DeviceSensors]) -> Vec<SensorPosition> {
    let mut reconciled = Vec::new();

    for device in devices {
        for sensor in unique_active_sensors(device) {
            let sensor_id = SensorPosition::compose_id(&device.device_id, &sensor.name);
            let Some(stored) = saved.iter().find(|s| s.sensor_id == sensor_id) else {
                continue;
            };
            let mut refreshed = build_position(device, sensor, sensor_id, stored.x, stored.y, stored.z);
            refreshed.clamp_coordinates();
            reconciled.push(refreshed);
        }
    }

    if reconciled.len() != saved.len() {
        info!(
            saved = saved.len(),
            kept = reconciled.len(),
            "Dropped saved positions for sensors no longer active"
        );
    }
    reconciled
}

fn unique_active_sensors(device: &DeviceSensors) -> Vec<&DetectedSensor> {
    let mut names = HashSet::new();
    device
        .active_sensors()
        .filter(|sensor| names.insert(sensor.name.as_str()))
        .collect()
}

fn build_position(
    device: &DeviceSensors,
    sensor: &DetectedSensor,
    sensor_id: String,
    x: f64,
    y: f64,
    z: f64,
) -> SensorPosition {
    let meta = metadata_for(sensor.type_code);
    SensorPosition {
        device_id: device.device_id.clone(),
        device_name: device.device_name.clone(),
        sensor_type: meta.name.to_string(),
        sensor_id,
        x,
        y,
        z,
        sensor_info: Some(SensorInfo {
            type_code: sensor.type_code,
            channel: sensor.channel,
            value_index: 0,
            unit: meta.unit.to_string(),
            color: meta.color.to_string(),
            all_values: sensor.values.clone(),
            all_labels: meta.value_labels.iter().map(|l| l.to_string()).collect(),
        }),
    }
}
