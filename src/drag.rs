//! Pointer/touch drag state machine
//!
//! Moves are applied to the [`PositionStore`] synchronously and never touch
//! the network. Only a release after the commit threshold produces a
//! [`DragSignal::Commit`]; shorter interactions count as clicks.

use std::time::{Duration, Instant};
use tracing::{debug, trace};

use crate::constants::timing::DRAG_COMMIT_THRESHOLD_MS;
use crate::store::PositionStore;
use crate::transform::{Point, SurfaceRect, ViewProjection};

/// Which input device started the interaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerSource {
    Mouse,
    Touch,
}

/// Input events, captured globally while a drag is active
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent<'a> {
    /// Pointer-down or touch-start over a sensor marker
    Press {
        sensor_id: &'a str,
        source: PointerSource,
        at: Instant,
    },
    Move {
        pointer: Point,
        surface: SurfaceRect,
    },
    /// Pointer-up or touch-end
    Release { at: Instant },
    /// Pointer left the document
    Leave { at: Instant },
}

/// What the host should do after an event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DragSignal {
    /// Drag began; suspend pending commit visuals
    Started { sensor_id: String },
    /// Store was updated transiently
    Moved,
    /// Persist the current store snapshot
    Commit { sensor_id: String, held: Duration },
    /// Short interaction; selection stands, nothing to persist
    Click { sensor_id: String },
    Ignored,
}

#[derive(Debug, Clone, PartialEq)]
enum DragState {
    Idle,
    Dragging {
        sensor_id: String,
        source: PointerSource,
        started_at: Instant,
    },
}

#[derive(Debug, Clone)]
pub struct DragController {
    state: DragState,
    commit_threshold: Duration,
}

impl Default for DragController {
    fn default() -> Self {
        Self::new(Duration::from_millis(DRAG_COMMIT_THRESHOLD_MS))
    }
}

impl DragController {
    pub fn new(commit_threshold: Duration) -> Self {
        Self {
            state: DragState::Idle,
            commit_threshold,
        }
    }

    pub fn commit_threshold(&self) -> Duration {
        self.commit_threshold
    }

    /// True while global move/release listeners must stay attached
    pub fn is_capturing(&self) -> bool {
        matches!(self.state, DragState::Dragging { .. })
    }

    pub fn active_sensor(&self) -> Option<&str> {
        match &self.state {
            DragState::Dragging { sensor_id, .. } => Some(sensor_id),
            DragState::Idle => None,
        }
    }

    pub fn active_source(&self) -> Option<PointerSource> {
        match &self.state {
            DragState::Dragging { source, .. } => Some(*source),
            DragState::Idle => None,
        }
    }

    pub fn handle(
        &mut self,
        event: InputEvent<'_>,
        store: &mut PositionStore,
        projection: &ViewProjection,
    ) -> DragSignal {
        match event {
            InputEvent::Press { sensor_id, source, at } => self.press(sensor_id, source, at, store),
            InputEvent::Move { pointer, surface } => self.motion(pointer, surface, store, projection),
            InputEvent::Release { at } | InputEvent::Leave { at } => self.release(at, store),
        }
    }

    fn press(&mut self, sensor_id: &str, source: PointerSource, at: Instant, store: &mut PositionStore) -> DragSignal {
        if self.is_capturing() {
            trace!(sensor_id, "Press while already dragging, ignoring");
            return DragSignal::Ignored;
        }
        if store.get(sensor_id).is_none() {
            debug!(sensor_id, "Press on unknown sensor, ignoring");
            return DragSignal::Ignored;
        }

        store.set_selection(Some(sensor_id));
        store.set_drag_target(sensor_id);
        self.state = DragState::Dragging {
            sensor_id: sensor_id.to_string(),
            source,
            started_at: at,
        };
        debug!(sensor_id, ?source, "Drag started");
        DragSignal::Started {
            sensor_id: sensor_id.to_string(),
        }
    }

    fn motion(
        &mut self,
        pointer: Point,
        surface: SurfaceRect,
        store: &mut PositionStore,
        projection: &ViewProjection,
    ) -> DragSignal {
        let DragState::Dragging { sensor_id, .. } = &self.state else {
            return DragSignal::Ignored;
        };
        let Some(update) = projection.project(pointer, surface) else {
            trace!("Degenerate surface, dropping move");
            return DragSignal::Ignored;
        };
        if store.apply_transient(sensor_id, update) {
            DragSignal::Moved
        } else {
            DragSignal::Ignored
        }
    }

    fn release(&mut self, at: Instant, store: &mut PositionStore) -> DragSignal {
        let DragState::Dragging { sensor_id, started_at, .. } = std::mem::replace(&mut self.state, DragState::Idle)
        else {
            return DragSignal::Ignored;
        };
        store.clear_drag_target();

        let held = at.saturating_duration_since(started_at);
        if held > self.commit_threshold {
            debug!(sensor_id = %sensor_id, held_ms = held.as_millis() as u64, "Drag committed");
            DragSignal::Commit { sensor_id, held }
        } else {
            debug!(sensor_id = %sensor_id, held_ms = held.as_millis() as u64, "Drag treated as click");
            DragSignal::Click { sensor_id }
        }
    }

    /// Abandon an active drag without committing (teardown)
    pub fn cancel(&mut self, store: &mut PositionStore) {
        if self.is_capturing() {
            self.state = DragState::Idle;
            store.clear_drag_target();
        }
    }
}
