//! Application-wide constants
//!
//! This module contains all magic numbers and string literals used throughout
//! the crate, providing a single source of truth for constant values.

/// Logical canvas geometry shared by both views
pub mod canvas {
    /// Logical width of both drawing surfaces
    pub const LOGICAL_WIDTH: f64 = 400.0;

    /// Logical height of the plan-view surface
    pub const PLAN_LOGICAL_HEIGHT: f64 = 300.0;

    /// Greenhouse drawable bounds inside the plan-view canvas
    pub const PLAN_BOUNDS_LEFT: f64 = 10.0;
    pub const PLAN_BOUNDS_TOP: f64 = 10.0;
    pub const PLAN_BOUNDS_WIDTH: f64 = 380.0;
    pub const PLAN_BOUNDS_HEIGHT: f64 = 280.0;

    /// Horizontal greenhouse bounds inside the elevation canvas
    pub const ELEVATION_BOUNDS_LEFT: f64 = 10.0;
    pub const ELEVATION_BOUNDS_WIDTH: f64 = 380.0;

    /// Elevation canvas height before scaling by the height multiplier
    pub const ELEVATION_BASE_HEIGHT: f64 = 300.0;

    /// Ground line before scaling by the height multiplier
    pub const ELEVATION_BASE_GROUND_Y: f64 = 250.0;

    /// Top of the drawable column before scaling by the height multiplier
    pub const ELEVATION_BASE_MIN_Y: f64 = 50.0;

    /// Greenhouse height (meters) that fills the unscaled elevation canvas
    pub const ELEVATION_REFERENCE_HEIGHT_M: f64 = 4.0;
}

/// Auto-layout constants
pub mod layout {
    /// Devices up to this count are laid out on a single horizontal row
    pub const SINGLE_ROW_MAX_DEVICES: usize = 3;

    pub const ROW_BASE_X: f64 = 25.0;
    pub const ROW_STEP_X: f64 = 50.0;
    pub const ROW_BASE_Y: f64 = 50.0;

    pub const GRID_COLUMNS: usize = 3;
    pub const GRID_BASE_X: f64 = 20.0;
    pub const GRID_STEP_X: f64 = 30.0;
    pub const GRID_BASE_Y: f64 = 30.0;
    pub const GRID_STEP_Y: f64 = 40.0;

    /// Circle radius grows with sensor count up to this cap
    pub const MAX_RADIUS: f64 = 15.0;
    pub const BASE_RADIUS: f64 = 8.0;
    pub const RADIUS_PER_SENSOR: f64 = 2.0;

    pub const MIN_XY: f64 = 5.0;
    pub const MAX_XY: f64 = 95.0;

    pub const BASE_HEIGHT: f64 = 40.0;
    pub const MAX_HEIGHT_INCREMENT: f64 = 10.0;
    pub const HEIGHT_SPREAD: f64 = 40.0;
    pub const MIN_Z: f64 = 15.0;
    pub const MAX_Z: f64 = 85.0;
}

/// Percentage-space bounds
pub mod percent {
    pub const MIN: f64 = 0.0;
    pub const MAX: f64 = 100.0;
}

/// Timing defaults for interaction and persistence
pub mod timing {
    /// Drags held for this long or less count as clicks (milliseconds)
    pub const DRAG_COMMIT_THRESHOLD_MS: u64 = 100;

    /// Minimum spacing between save attempts (milliseconds)
    pub const SAVE_THROTTLE_MS: u64 = 1000;

    /// Trailing-edge debounce for sensor updates (milliseconds)
    pub const SAVE_DEBOUNCE_MS: u64 = 1000;

    /// Read cache lifetime (seconds)
    pub const CACHE_TTL_SECS: u64 = 5 * 60;

    /// Lifetime of transient success banners (milliseconds)
    pub const TRANSIENT_BANNER_MS: u64 = 1000;

    /// Default HTTP request timeout (seconds)
    pub const REQUEST_TIMEOUT_SECS: u64 = 15;
}

/// Retry defaults
pub mod retry {
    pub const MAX_ATTEMPTS: u32 = 3;
    pub const INITIAL_DELAY_MS: u64 = 1000;
    pub const MULTIPLIER: f32 = 2.0;
    pub const MAX_DELAY_MS: u64 = 30_000;
}

/// Remote API constants
pub mod api {
    pub const DEFAULT_BASE_URL: &str = "http://localhost:3000/api";

    /// Local-storage keys probed for a bearer token, in priority order
    pub const TOKEN_KEYS: [&str; 6] = [
        "token",
        "authToken",
        "access_token",
        "accessToken",
        "auth_token",
        "jwt",
    ];

    /// Tokens this short are treated as absent
    pub const MIN_TOKEN_LEN: usize = 10;

    pub const GLOBAL_LAST_DEVICE_FIELD: &str = "lastSelectedDeviceId";
    pub const GLOBAL_LAST_CONTEXT_FIELD: &str = "lastSelectedContext";
}

/// Config and storage paths
pub mod config {
    /// Application directory name under the platform config/data dirs
    pub const APP_DIR: &str = "greenhouse-sync";

    /// Config file name
    pub const FILENAME: &str = "config.json";

    /// Credentials file probed for bearer tokens
    pub const CREDENTIALS_FILENAME: &str = "credentials.json";

    /// Local fallback file prefix (`greenhouse_{deviceId}.json`)
    pub const FALLBACK_PREFIX: &str = "greenhouse_";
}

/// Config validation ranges
pub mod validation {
    pub const MIN_DEBOUNCE_MS: u64 = 50;
    pub const MAX_DEBOUNCE_MS: u64 = 60_000;
    pub const MAX_THROTTLE_MS: u64 = 60_000;
    pub const MIN_CACHE_TTL_SECS: u64 = 1;
    pub const MAX_CACHE_TTL_SECS: u64 = 24 * 60 * 60;
    pub const MAX_DRAG_THRESHOLD_MS: u64 = 5_000;
    pub const MIN_RETRY_ATTEMPTS: u32 = 1;
    pub const MAX_RETRY_ATTEMPTS: u32 = 10;
    pub const MIN_RETRY_MULTIPLIER: f32 = 1.0;
    pub const MAX_RETRY_MULTIPLIER: f32 = 10.0;
}
