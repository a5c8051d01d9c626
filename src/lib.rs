//! Sensor position sync and layout engine for greenhouse floor plans
//!
//! Keeps sensor markers on a floor-plan and a side-view canvas in sync with a
//! REST backend: layout generation, pointer-to-percent transforms, drag
//! commits, and a throttled/debounced persistence gateway with an offline
//! queue and local fallback.

#![forbid(unsafe_code)]

pub mod api;
pub mod auth;
pub mod config;
pub mod connectivity;
pub mod constants;
pub mod drag;
pub mod error;
pub mod fallback;
pub mod gateway;
pub mod layout;
pub mod sensor_meta;
pub mod session;
pub mod status;
pub mod store;
pub mod transform;
pub mod types;

pub use error::{Result, SyncError};
pub use gateway::{GatewaySettings, PersistenceGateway, SaveOutcome};
pub use session::{FloorPlanSession, LoadSource};
pub use store::PositionStore;
pub use types::{DeviceSensors, GreenhouseConfig, SavePayload, SensorPosition, ViewType};
