//! In-process [`RemoteApi`]
//!
//! Keeps filter and position records in a map, records every call with its
//! timestamp and lets tests script failures. Timestamps use
//! `tokio::time::Instant`, so they follow a paused test clock.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use tokio::time::Instant;

use super::{FilterResponse, PositionRecord, PositionsResponse, RawPositionRecord, RemoteApi, ViewFilter};
use crate::error::{Result, SyncError};
use crate::types::{GreenhouseConfig, ViewSettings, ViewType};

/// Remote operation kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    GetFilter,
    SaveFilter,
    GetPositions,
    SavePositions,
    PatchGlobal,
}

/// Failure to inject into a scripted call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    Network,
    Server(u16),
    Decode,
}

impl Failure {
    fn to_error(self) -> SyncError {
        match self {
            Failure::Network => SyncError::Network("connection refused".to_string()),
            Failure::Server(status) => SyncError::Server {
                status,
                message: "injected failure".to_string(),
            },
            Failure::Decode => SyncError::Decode("injected malformed body".to_string()),
        }
    }
}

/// One recorded call
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub operation: Operation,
    pub device_id: String,
    pub view: Option<ViewType>,
    pub at: Instant,
}

#[derive(Debug)]
struct ScriptedFailure {
    operation: Operation,
    view: Option<ViewType>,
    failure: Failure,
}

#[derive(Debug, Default)]
struct MemoryState {
    filters: HashMap<(String, ViewType), ViewFilter>,
    positions: HashMap<(String, ViewType), Vec<PositionRecord>>,
    globals: HashMap<String, Value>,
    calls: Vec<Call>,
    script: VecDeque<ScriptedFailure>,
    unreachable: bool,
}

#[derive(Debug, Default)]
pub struct MemoryApi {
    state: Mutex<MemoryState>,
}

impl MemoryApi {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        // A panicking test thread must not hide the recorded calls
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Pre-populate both records of one view
    pub fn seed(&self, device_id: &str, view: ViewType, config: &GreenhouseConfig, positions: Vec<PositionRecord>) {
        let filter = ViewFilter::new(config, view, &ViewSettings::default_for(view), None);
        let mut state = self.lock();
        state.filters.insert((device_id.to_string(), view), filter);
        state.positions.insert((device_id.to_string(), view), positions);
    }

    /// Fail the next matching call; `view: None` matches any view
    pub fn fail_next(&self, operation: Operation, view: Option<ViewType>, failure: Failure) {
        self.lock().script.push_back(ScriptedFailure {
            operation,
            view,
            failure,
        });
    }

    /// Every call fails with a network error while set
    pub fn set_unreachable(&self, unreachable: bool) {
        self.lock().unreachable = unreachable;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    pub fn count(&self, operation: Operation) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.operation == operation)
            .count()
    }

    pub fn total_calls(&self) -> usize {
        self.lock().calls.len()
    }

    pub fn stored_positions(&self, device_id: &str, view: ViewType) -> Option<Vec<PositionRecord>> {
        self.lock()
            .positions
            .get(&(device_id.to_string(), view))
            .cloned()
    }

    pub fn stored_filter(&self, device_id: &str, view: ViewType) -> Option<ViewFilter> {
        self.lock().filters.get(&(device_id.to_string(), view)).cloned()
    }

    pub fn global(&self, field: &str) -> Option<Value> {
        self.lock().globals.get(field).cloned()
    }

    /// Record the call and return an injected failure, if any
    fn enter(&self, operation: Operation, device_id: &str, view: Option<ViewType>) -> Result<MutexGuard<'_, MemoryState>> {
        let mut state = self.lock();
        state.calls.push(Call {
            operation,
            device_id: device_id.to_string(),
            view,
            at: Instant::now(),
        });
        if state.unreachable {
            return Err(Failure::Network.to_error());
        }
        let scripted = state
            .script
            .iter()
            .position(|s| s.operation == operation && (s.view.is_none() || s.view == view));
        if let Some(index) = scripted
            && let Some(entry) = state.script.remove(index)
        {
            return Err(entry.failure.to_error());
        }
        Ok(state)
    }
}

#[async_trait]
impl RemoteApi for MemoryApi {
    async fn get_filter(&self, device_id: &str, view: ViewType) -> Result<FilterResponse> {
        let state = self.enter(Operation::GetFilter, device_id, Some(view))?;
        let stored = state.filters.get(&(device_id.to_string(), view)).cloned();
        let default_filter = ViewFilter::new(
            &GreenhouseConfig::default(),
            view,
            &ViewSettings::default_for(view),
            None,
        );
        Ok(FilterResponse {
            success: true,
            has_filter: stored.is_some(),
            filter: stored,
            default_filter: Some(default_filter),
            message: None,
        })
    }

    async fn save_filter(&self, device_id: &str, view: ViewType, filter: &ViewFilter) -> Result<()> {
        let mut state = self.enter(Operation::SaveFilter, device_id, Some(view))?;
        state
            .filters
            .insert((device_id.to_string(), view), filter.clone());
        Ok(())
    }

    async fn get_positions(&self, device_id: &str, view: ViewType) -> Result<PositionsResponse> {
        let state = self.enter(Operation::GetPositions, device_id, Some(view))?;
        let positions = state
            .positions
            .get(&(device_id.to_string(), view))
            .map(|records| records.iter().map(RawPositionRecord::from).collect())
            .unwrap_or_default();
        Ok(PositionsResponse {
            success: true,
            positions: Some(positions),
            message: None,
        })
    }

    async fn save_positions(&self, device_id: &str, view: ViewType, positions: &[PositionRecord]) -> Result<()> {
        let mut state = self.enter(Operation::SavePositions, device_id, Some(view))?;
        state
            .positions
            .insert((device_id.to_string(), view), positions.to_vec());
        Ok(())
    }

    async fn patch_global(&self, field: &str, value: Value) -> Result<()> {
        let mut state = self.enter(Operation::PatchGlobal, "global", None)?;
        state.globals.insert(field.to_string(), value);
        Ok(())
    }
}
