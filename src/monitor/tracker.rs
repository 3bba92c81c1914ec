//! Transition detection over the last known state of each project.

use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use super::models::{ProbeResult, ProjectState, TransitionEvent};
use crate::db::{MonitorStore, StoreError};

#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("Failed to load state for project '{project_id}': {source}")]
    StateLoad { project_id: String, source: StoreError },
    #[error("Failed to append probe result for project '{project_id}': {source}")]
    HistoryAppend { project_id: String, source: StoreError },
    #[error("Failed to write state for project '{project_id}': {source}")]
    StateWrite { project_id: String, source: StoreError },
}

impl TrackerError {
    pub fn project_id(&self) -> &str {
        match self {
            TrackerError::StateLoad { project_id, .. }
            | TrackerError::HistoryAppend { project_id, .. }
            | TrackerError::StateWrite { project_id, .. } => project_id,
        }
    }
}

pub struct StatusTracker {
    store: Arc<dyn MonitorStore>,
    // Serializes load-compare-write per project so that overlapping triggers
    // cannot both observe the same previous status.
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl StatusTracker {
    pub fn new(store: Arc<dyn MonitorStore>) -> Self {
        Self {
            store,
            locks: DashMap::new(),
        }
    }

    fn lock_for(&self, project_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(project_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drops the locks of projects outside `active` that nobody is holding.
    pub fn retain_projects(&self, active: &HashSet<String>) {
        self.locks
            .retain(|project_id, lock| active.contains(project_id) || Arc::strong_count(lock) > 1);
    }

    pub fn tracked_projects(&self) -> usize {
        self.locks.len()
    }

    /// Records a probe result and returns the transition it caused, if any.
    ///
    /// History is appended unconditionally and the state row is rewritten on
    /// every call. Both writes complete before a transition is returned.
    pub async fn record(&self, result: &ProbeResult) -> Result<Option<TransitionEvent>, TrackerError> {
        let project_id = result.project_id.as_str();
        let lock = self.lock_for(project_id);
        let _guard = lock.lock().await;

        let previous = self
            .store
            .project_state(project_id)
            .await
            .map_err(|source| TrackerError::StateLoad {
                project_id: project_id.to_string(),
                source,
            })?
            .unwrap_or_else(|| ProjectState::initial(project_id));

        self.store.append_probe(result).await.map_err(|source| {
            error!(project_id, outcome = result.outcome.as_str(), error = %source, "History append failed.");
            TrackerError::HistoryAppend {
                project_id: project_id.to_string(),
                source,
            }
        })?;

        let next = previous.advance(result);
        self.store.upsert_project_state(&next).await.map_err(|source| {
            error!(
                project_id,
                status = %next.last_status,
                consecutive_failures = next.consecutive_failures,
                error = %source,
                "State write failed."
            );
            TrackerError::StateWrite {
                project_id: project_id.to_string(),
                source,
            }
        })?;

        if next.last_status == previous.last_status {
            debug!(project_id, status = %next.last_status, "Status unchanged.");
            return Ok(None);
        }

        info!(
            project_id,
            previous = %previous.last_status,
            current = %next.last_status,
            "Status transition detected."
        );
        Ok(Some(TransitionEvent {
            project_id: project_id.to_string(),
            previous_status: previous.last_status,
            new_status: next.last_status,
            timestamp: result.timestamp,
            latency_ms: result.latency_ms,
        }))
    }
}
