//! Core domain types shared by layout, store, drag and persistence

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::percent;
use crate::error::{Result, SyncError};

/// Structure material
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GreenhouseType {
    #[default]
    Vinyl,
    Glass,
}

/// Physical greenhouse description (meters)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GreenhouseConfig {
    #[serde(rename = "type", default)]
    pub kind: GreenhouseType,
    pub width: f64,
    pub length: f64,
    pub height: f64,
    #[serde(default)]
    pub name: String,
}

impl Default for GreenhouseConfig {
    fn default() -> Self {
        Self {
            kind: GreenhouseType::Vinyl,
            width: 20.0,
            length: 50.0,
            height: 4.0,
            name: "Greenhouse".to_string(),
        }
    }
}

/// Upper bounds for greenhouse dimensions
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfigLimits {
    pub max_width: f64,
    pub max_length: f64,
    pub max_height: f64,
}

impl ConfigLimits {
    /// Limits enforced on operator edits
    pub const EDITOR: ConfigLimits = ConfigLimits {
        max_width: 100.0,
        max_length: 200.0,
        max_height: 20.0,
    };

    /// Limits accepted from stored/remote data
    pub const STORED: ConfigLimits = ConfigLimits {
        max_width: 200.0,
        max_length: 500.0,
        max_height: 20.0,
    };
}

impl GreenhouseConfig {
    pub fn validate(&self, limits: ConfigLimits) -> Result<()> {
        check_dimension("width", self.width, limits.max_width)?;
        check_dimension("length", self.length, limits.max_length)?;
        check_dimension("height", self.height, limits.max_height)?;
        if self.name.trim().is_empty() {
            return Err(SyncError::InvalidConfig("name must not be empty".to_string()));
        }
        Ok(())
    }
}

fn check_dimension(field: &str, value: f64, max: f64) -> Result<()> {
    if !value.is_finite() || value <= 0.0 || value > max {
        return Err(SyncError::InvalidConfig(format!(
            "{field} must be in (0, {max}], got {value}"
        )));
    }
    Ok(())
}

/// Extra per-sensor display and hardware info
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SensorInfo {
    #[serde(rename = "type")]
    pub type_code: u16,
    #[serde(default)]
    pub channel: u32,
    #[serde(rename = "valueIndex", default)]
    pub value_index: u32,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub color: String,
    #[serde(rename = "allValues", default, skip_serializing_if = "Vec::is_empty")]
    pub all_values: Vec<Value>,
    #[serde(rename = "allLabels", default, skip_serializing_if = "Vec::is_empty")]
    pub all_labels: Vec<String>,
}

/// A sensor placed in percentage space
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorPosition {
    pub device_id: String,
    pub device_name: String,
    /// Display label
    pub sensor_type: String,
    /// `{device_id}_{raw sensor name}`
    pub sensor_id: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    #[serde(rename = "sensorInfo", default, skip_serializing_if = "Option::is_none")]
    pub sensor_info: Option<SensorInfo>,
}

impl SensorPosition {
    /// Composite key for a raw sensor on a device
    pub fn compose_id(device_id: &str, sensor_name: &str) -> String {
        format!("{device_id}_{sensor_name}")
    }

    pub fn type_code(&self) -> u16 {
        self.sensor_info.as_ref().map(|info| info.type_code).unwrap_or(0)
    }

    /// Force all coordinates into percentage space
    pub fn clamp_coordinates(&mut self) {
        self.x = clamp_percent(self.x);
        self.y = clamp_percent(self.y);
        self.z = clamp_percent(self.z);
    }

    /// True when ids are present and every axis is within [0, 100]
    pub fn is_valid(&self) -> bool {
        let in_range = |v: f64| (percent::MIN..=percent::MAX).contains(&v);
        in_range(self.x)
            && in_range(self.y)
            && in_range(self.z)
            && !self.device_id.is_empty()
            && !self.sensor_id.is_empty()
    }

    /// Euclidean distance in percentage space
    pub fn distance_to(&self, other: &SensorPosition) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

/// Clamp into [0, 100]; NaN becomes 0
pub fn clamp_percent(value: f64) -> f64 {
    if value.is_nan() {
        return percent::MIN;
    }
    value.clamp(percent::MIN, percent::MAX)
}

/// Partial coordinate update (any subset of axes)
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PositionUpdate {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub z: Option<f64>,
}

impl PositionUpdate {
    pub fn plan(x: f64, y: f64) -> Self {
        Self { x: Some(x), y: Some(y), z: None }
    }

    pub fn elevation(x: f64, z: f64) -> Self {
        Self { x: Some(x), y: None, z: Some(z) }
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_none() && self.y.is_none() && self.z.is_none()
    }
}

/// The two persisted views
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewType {
    FloorPlan,
    SideView,
}

impl ViewType {
    pub const ALL: [ViewType; 2] = [ViewType::FloorPlan, ViewType::SideView];

    /// Path segment for filter endpoints
    pub fn filter_segment(self) -> &'static str {
        match self {
            ViewType::FloorPlan => "floor-plan",
            ViewType::SideView => "side-view",
        }
    }

    /// Path segment for sensor-position endpoints
    pub fn positions_segment(self) -> &'static str {
        match self {
            ViewType::FloorPlan => "floor_plan",
            ViewType::SideView => "side_view",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ViewType::FloorPlan => "floor plan",
            ViewType::SideView => "side view",
        }
    }
}

/// Floor-plan view preferences
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FloorPlanSettings {
    pub zoom: f64,
    pub center_x: f64,
    pub center_y: f64,
    pub show_grid: bool,
    pub show_labels: bool,
}

impl Default for FloorPlanSettings {
    fn default() -> Self {
        Self {
            zoom: 1.0,
            center_x: 50.0,
            center_y: 50.0,
            show_grid: true,
            show_labels: true,
        }
    }
}

/// Side-view preferences
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SideViewSettings {
    pub show_grid: bool,
    pub show_labels: bool,
    pub show_height_guides: bool,
    pub show_ground_line: bool,
}

impl Default for SideViewSettings {
    fn default() -> Self {
        Self {
            show_grid: true,
            show_labels: true,
            show_height_guides: true,
            show_ground_line: true,
        }
    }
}

/// View settings for either persisted view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ViewSettings {
    FloorPlan(FloorPlanSettings),
    SideView(SideViewSettings),
}

impl ViewSettings {
    pub fn default_for(view: ViewType) -> Self {
        match view {
            ViewType::FloorPlan => ViewSettings::FloorPlan(FloorPlanSettings::default()),
            ViewType::SideView => ViewSettings::SideView(SideViewSettings::default()),
        }
    }
}

/// One persisted (device, view) record as seen by the rest of the crate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewAggregate {
    pub config: GreenhouseConfig,
    pub sensors: Vec<SensorPosition>,
    pub view_settings: ViewSettings,
}

/// Snapshot handed to the gateway for a save; also the local fallback blob
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavePayload {
    pub config: GreenhouseConfig,
    pub sensors: Vec<SensorPosition>,
}

/// Hardware sensor reported by a device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedSensor {
    pub name: String,
    #[serde(default)]
    pub channel: u32,
    #[serde(rename = "type", default)]
    pub type_code: u16,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub values: Vec<Value>,
}

/// A device and the sensors it currently reports
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSensors {
    pub device_id: String,
    pub device_name: String,
    #[serde(default)]
    pub sensors: Vec<DetectedSensor>,
}

impl DeviceSensors {
    pub fn active_sensors(&self) -> impl Iterator<Item = &DetectedSensor> {
        self.sensors.iter().filter(|s| s.active)
    }
}
