//! Remote data-manager boundary
//!
//! [`RemoteApi`] is the seam between the gateway and the REST backend. Wire
//! types here mirror the backend's loosely-typed JSON; conversion into the
//! crate's typed values happens in this module so nothing untyped reaches the
//! position store.

pub mod http;
pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::Result;
use crate::sensor_meta::{coerce_number, coerce_sensor_label, coerce_sensor_type, label_for_code, metadata_for};
use crate::types::{
    FloorPlanSettings, GreenhouseConfig, GreenhouseType, SensorInfo, SensorPosition, SideViewSettings, ViewSettings,
    ViewType, clamp_percent,
};

pub use http::HttpApi;
pub use memory::MemoryApi;

/// REST operations the gateway needs. One implementation talks HTTP, the
/// other keeps everything in memory for tests and offline tooling.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    async fn get_filter(&self, device_id: &str, view: ViewType) -> Result<FilterResponse>;

    async fn save_filter(&self, device_id: &str, view: ViewType, filter: &ViewFilter) -> Result<()>;

    async fn get_positions(&self, device_id: &str, view: ViewType) -> Result<PositionsResponse>;

    async fn save_positions(&self, device_id: &str, view: ViewType, positions: &[PositionRecord]) -> Result<()>;

    /// PATCH one field of the global (non-device) settings document
    async fn patch_global(&self, field: &str, value: Value) -> Result<()>;
}

/// Generic `{success, message}` acknowledgement
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Ack {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl Ack {
    pub fn reason(&self) -> String {
        self.error
            .clone()
            .or_else(|| self.message.clone())
            .unwrap_or_default()
    }
}

/// Greenhouse config as the filter endpoints store it.
///
/// The side-view record only carries width, height and type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WireGreenhouseConfig {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub width: Value,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub length: Value,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub height: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl WireGreenhouseConfig {
    pub fn from_config(config: &GreenhouseConfig, view: ViewType) -> Self {
        let kind = match config.kind {
            GreenhouseType::Vinyl => "vinyl",
            GreenhouseType::Glass => "glass",
        };
        match view {
            ViewType::FloorPlan => Self {
                kind: Some(kind.to_string()),
                width: Value::from(config.width),
                length: Value::from(config.length),
                height: Value::from(config.height),
                name: Some(config.name.clone()),
            },
            ViewType::SideView => Self {
                kind: Some(kind.to_string()),
                width: Value::from(config.width),
                length: Value::Null,
                height: Value::from(config.height),
                name: None,
            },
        }
    }

    /// Missing, garbled or non-positive fields fall back to the defaults
    pub fn into_config(self) -> GreenhouseConfig {
        let defaults = GreenhouseConfig::default();
        let dimension = |value: &Value, fallback: f64| {
            let parsed = coerce_number(value);
            if parsed > 0.0 { parsed } else { fallback }
        };
        GreenhouseConfig {
            kind: match self.kind.as_deref() {
                Some(k) if k.eq_ignore_ascii_case("glass") => GreenhouseType::Glass,
                _ => GreenhouseType::Vinyl,
            },
            width: dimension(&self.width, defaults.width),
            length: dimension(&self.length, defaults.length),
            height: dimension(&self.height, defaults.height),
            name: self
                .name
                .filter(|n| !n.trim().is_empty())
                .unwrap_or(defaults.name),
        }
    }
}

/// Body of the per-view filter record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewFilter {
    pub greenhouse_config: WireGreenhouseConfig,
    #[serde(default)]
    pub selected_sensor: String,
    #[serde(default)]
    pub view_settings: Value,
}

impl ViewFilter {
    pub fn new(config: &GreenhouseConfig, view: ViewType, settings: &ViewSettings, selected: Option<&str>) -> Self {
        Self {
            greenhouse_config: WireGreenhouseConfig::from_config(config, view),
            selected_sensor: selected.unwrap_or_default().to_string(),
            view_settings: serde_json::to_value(settings).unwrap_or(Value::Null),
        }
    }

    /// Typed view settings; unparseable settings fall back to defaults
    pub fn settings(&self, view: ViewType) -> ViewSettings {
        let parsed = match view {
            ViewType::FloorPlan => {
                serde_json::from_value::<FloorPlanSettings>(self.view_settings.clone()).map(ViewSettings::FloorPlan)
            }
            ViewType::SideView => {
                serde_json::from_value::<SideViewSettings>(self.view_settings.clone()).map(ViewSettings::SideView)
            }
        };
        parsed.unwrap_or_else(|err| {
            debug!(view = view.label(), error = %err, "View settings unreadable, using defaults");
            ViewSettings::default_for(view)
        })
    }
}

/// GET filter response
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub has_filter: bool,
    #[serde(default)]
    pub filter: Option<ViewFilter>,
    #[serde(default)]
    pub default_filter: Option<ViewFilter>,
    #[serde(default)]
    pub message: Option<String>,
}

impl FilterResponse {
    /// The stored filter if there is one, else the server's default
    pub fn effective(&self) -> Option<&ViewFilter> {
        if self.has_filter {
            self.filter.as_ref().or(self.default_filter.as_ref())
        } else {
            self.default_filter.as_ref()
        }
    }
}

/// Position item as sent to the backend
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionRecord {
    pub sensor_id: String,
    pub device_name: String,
    pub sensor_type: u16,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub rotation: f64,
}

impl PositionRecord {
    pub fn from_position(position: &SensorPosition) -> Self {
        let sensor_type = match &position.sensor_info {
            Some(info) if info.type_code != 0 => info.type_code,
            _ => coerce_sensor_label(&position.sensor_type),
        };
        Self {
            sensor_id: position.sensor_id.clone(),
            device_name: position.device_name.clone(),
            sensor_type,
            x: finite_or_zero(position.x),
            y: finite_or_zero(position.y),
            z: finite_or_zero(position.z),
            rotation: 0.0,
        }
    }

    /// Typed position owned by `device_id`, display metadata from the table
    pub fn into_position(self, device_id: &str) -> SensorPosition {
        let meta = metadata_for(self.sensor_type);
        SensorPosition {
            device_id: device_id.to_string(),
            device_name: self.device_name,
            sensor_type: label_for_code(self.sensor_type),
            sensor_id: self.sensor_id,
            x: clamp_percent(self.x),
            y: clamp_percent(self.y),
            z: clamp_percent(self.z),
            sensor_info: Some(SensorInfo {
                type_code: self.sensor_type,
                channel: 0,
                value_index: 0,
                unit: meta.unit.to_string(),
                color: meta.color.to_string(),
                all_values: Vec::new(),
                all_labels: Vec::new(),
            }),
        }
    }
}

fn finite_or_zero(v: f64) -> f64 {
    if v.is_finite() { v } else { 0.0 }
}

/// Position item as received; every field may arrive in any JSON shape
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawPositionRecord {
    #[serde(default)]
    pub sensor_id: Value,
    #[serde(default)]
    pub device_name: Value,
    #[serde(default)]
    pub sensor_type: Value,
    #[serde(default)]
    pub x: Value,
    #[serde(default)]
    pub y: Value,
    #[serde(default)]
    pub z: Value,
    #[serde(default)]
    pub rotation: Value,
}

impl RawPositionRecord {
    /// Coerce into a typed record. Items without a sensor id are dropped.
    pub fn into_record(self) -> Option<PositionRecord> {
        let sensor_id = value_to_string(&self.sensor_id).filter(|id| !id.is_empty())?;
        Some(PositionRecord {
            sensor_id,
            device_name: value_to_string(&self.device_name).unwrap_or_default(),
            sensor_type: coerce_sensor_type(&self.sensor_type),
            x: coerce_number(&self.x),
            y: coerce_number(&self.y),
            z: coerce_number(&self.z),
            rotation: coerce_number(&self.rotation),
        })
    }
}

impl From<&PositionRecord> for RawPositionRecord {
    fn from(record: &PositionRecord) -> Self {
        Self {
            sensor_id: Value::from(record.sensor_id.clone()),
            device_name: Value::from(record.device_name.clone()),
            sensor_type: Value::from(record.sensor_type),
            x: Value::from(record.x),
            y: Value::from(record.y),
            z: Value::from(record.z),
            rotation: Value::from(record.rotation),
        }
    }
}

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// GET sensor-positions response
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PositionsResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub positions: Option<Vec<RawPositionRecord>>,
    #[serde(default)]
    pub message: Option<String>,
}

impl PositionsResponse {
    /// Typed positions; an unsuccessful response yields none
    pub fn into_positions(self, device_id: &str) -> Vec<SensorPosition> {
        if !self.success {
            return Vec::new();
        }
        self.positions
            .unwrap_or_default()
            .into_iter()
            .filter_map(RawPositionRecord::into_record)
            .map(|record| record.into_position(device_id))
            .collect()
    }
}
