//! Pointer <-> percentage-space projections for the plan and elevation views
//!
//! Both projections are pure functions of (pointer, on-screen bounds, config).
//! Pointer coordinates are in the same space as the surface rectangle
//! (typically client pixels).

use crate::constants::canvas::*;
use crate::types::{GreenhouseConfig, PositionUpdate, clamp_percent};

/// A pointer location in client space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// On-screen bounding box of a rendering surface
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceRect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl SurfaceRect {
    pub fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self { left, top, width, height }
    }

    pub fn right(&self) -> f64 {
        self.left + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }

    /// A collapsed or unmeasured surface cannot be projected onto
    pub fn is_degenerate(&self) -> bool {
        !(self.width > 0.0 && self.height > 0.0) || !self.width.is_finite() || !self.height.is_finite()
    }
}

/// Plan-view percentage coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlanPoint {
    pub x: f64,
    pub y: f64,
}

/// Elevation-view percentage coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ElevationPoint {
    pub x: f64,
    pub z: f64,
}

/// Top-down projection onto the fixed 400x300 logical canvas
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PlanProjection;

impl PlanProjection {
    pub fn to_percent(&self, pointer: Point, surface: SurfaceRect) -> Option<PlanPoint> {
        if surface.is_degenerate() {
            return None;
        }
        let logical_x = (pointer.x - surface.left) / surface.width * LOGICAL_WIDTH;
        let logical_y = (pointer.y - surface.top) / surface.height * PLAN_LOGICAL_HEIGHT;

        let relative_x = (logical_x - PLAN_BOUNDS_LEFT) / PLAN_BOUNDS_WIDTH;
        let relative_y = (logical_y - PLAN_BOUNDS_TOP) / PLAN_BOUNDS_HEIGHT;

        Some(PlanPoint {
            x: clamp_percent(relative_x * 100.0),
            y: clamp_percent(relative_y * 100.0),
        })
    }

    /// Inverse of [`to_percent`](Self::to_percent) for in-range coordinates
    pub fn to_pointer(&self, point: PlanPoint, surface: SurfaceRect) -> Point {
        let logical_x = PLAN_BOUNDS_LEFT + point.x / 100.0 * PLAN_BOUNDS_WIDTH;
        let logical_y = PLAN_BOUNDS_TOP + point.y / 100.0 * PLAN_BOUNDS_HEIGHT;
        Point {
            x: surface.left + logical_x / LOGICAL_WIDTH * surface.width,
            y: surface.top + logical_y / PLAN_LOGICAL_HEIGHT * surface.height,
        }
    }
}

/// Logical-canvas geometry of the elevation view for one greenhouse height.
///
/// `min_y..ground_y` is the drawable column that percent z maps onto.
/// `apex_y` is where the roof line is drawn; it uses the capped height ratio
/// and is informational only.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ElevationGeometry {
    pub height_multiplier: f64,
    pub logical_height: f64,
    pub ground_y: f64,
    pub available_height: f64,
    pub min_y: f64,
    pub apex_y: f64,
}

impl ElevationGeometry {
    pub fn from_config(config: &GreenhouseConfig) -> Self {
        let ratio = if config.height.is_finite() {
            config.height / ELEVATION_REFERENCE_HEIGHT_M
        } else {
            1.0
        };
        let height_multiplier = ratio.max(1.0);
        let logical_height = ELEVATION_BASE_HEIGHT * height_multiplier;
        let ground_y = ELEVATION_BASE_GROUND_Y * height_multiplier;
        let available_height = (ELEVATION_BASE_GROUND_Y - ELEVATION_BASE_MIN_Y) * height_multiplier;
        let min_y = ground_y - available_height;
        let apex_y = ground_y - available_height * ratio.clamp(0.0, 1.0);

        Self {
            height_multiplier,
            logical_height,
            ground_y,
            available_height,
            min_y,
            apex_y,
        }
    }
}

/// Side projection whose vertical extent depends on greenhouse height
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ElevationProjection {
    geometry: ElevationGeometry,
}

impl ElevationProjection {
    pub fn new(config: &GreenhouseConfig) -> Self {
        Self {
            geometry: ElevationGeometry::from_config(config),
        }
    }

    pub fn geometry(&self) -> &ElevationGeometry {
        &self.geometry
    }

    pub fn to_percent(&self, pointer: Point, surface: SurfaceRect) -> Option<ElevationPoint> {
        if surface.is_degenerate() {
            return None;
        }
        let g = &self.geometry;
        let normalized_x = ((pointer.x - surface.left) / surface.width).clamp(0.0, 1.0);
        let normalized_y = ((pointer.y - surface.top) / surface.height).clamp(0.0, 1.0);

        let logical_x = normalized_x * LOGICAL_WIDTH;
        let logical_y = normalized_y * g.logical_height;

        let relative_x = (logical_x - ELEVATION_BOUNDS_LEFT) / ELEVATION_BOUNDS_WIDTH;
        let relative_y = (logical_y - g.min_y) / g.available_height;

        Some(ElevationPoint {
            x: clamp_percent(relative_x * 100.0),
            // screen y grows downward, height grows upward
            z: clamp_percent(100.0 - relative_y * 100.0),
        })
    }

    /// Inverse of [`to_percent`](Self::to_percent) for in-range coordinates
    pub fn to_pointer(&self, point: ElevationPoint, surface: SurfaceRect) -> Point {
        let g = &self.geometry;
        let logical_x = ELEVATION_BOUNDS_LEFT + point.x / 100.0 * ELEVATION_BOUNDS_WIDTH;
        let logical_y = g.min_y + (1.0 - point.z / 100.0) * g.available_height;
        Point {
            x: surface.left + logical_x / LOGICAL_WIDTH * surface.width,
            y: surface.top + logical_y / g.logical_height * surface.height,
        }
    }
}

/// Projection for whichever view a drag started in
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ViewProjection {
    Plan(PlanProjection),
    Elevation(ElevationProjection),
}

impl ViewProjection {
    pub fn plan() -> Self {
        ViewProjection::Plan(PlanProjection)
    }

    pub fn elevation(config: &GreenhouseConfig) -> Self {
        ViewProjection::Elevation(ElevationProjection::new(config))
    }

    /// Project a pointer into the axes this view edits
    pub fn project(&self, pointer: Point, surface: SurfaceRect) -> Option<PositionUpdate> {
        match self {
            ViewProjection::Plan(plan) => plan
                .to_percent(pointer, surface)
                .map(|p| PositionUpdate::plan(p.x, p.y)),
            ViewProjection::Elevation(elevation) => elevation
                .to_percent(pointer, surface)
                .map(|p| PositionUpdate::elevation(p.x, p.z)),
        }
    }
}
