//! Run Repository
//!
//! In-memory storage of run records and their log entries.

use sluice_core::domain::log::LogEntry;
use sluice_core::domain::run::{Run, RunResult, RunStatus};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// Runs kept when no limit is configured
pub const DEFAULT_RETENTION: usize = 1000;

pub struct RunRepository {
    runs: RwLock<HashMap<Uuid, Run>>,
    logs: RwLock<HashMap<Uuid, Vec<LogEntry>>>,
    retention: usize,
}

impl Default for RunRepository {
    fn default() -> Self {
        Self::with_retention(DEFAULT_RETENTION)
    }
}

impl RunRepository {
    /// Keeps at most `retention` runs; active runs are never evicted
    pub fn with_retention(retention: usize) -> Self {
        Self {
            runs: RwLock::new(HashMap::new()),
            logs: RwLock::new(HashMap::new()),
            retention,
        }
    }

    pub async fn insert(&self, run: Run) {
        self.logs.write().await.entry(run.id).or_default();

        let evicted = {
            let mut runs = self.runs.write().await;
            runs.insert(run.id, run);
            evict_finished(&mut runs, self.retention)
        };

        if !evicted.is_empty() {
            debug!("Evicting {} finished run(s) past retention", evicted.len());
            let mut logs = self.logs.write().await;
            for id in &evicted {
                logs.remove(id);
            }
        }
    }

    pub async fn find_by_id(&self, id: Uuid) -> Option<Run> {
        self.runs.read().await.get(&id).cloned()
    }

    /// All runs, newest first
    pub async fn list_all(&self) -> Vec<Run> {
        let mut runs: Vec<Run> = self.runs.read().await.values().cloned().collect();
        runs.sort_by(|a, b| b.requested_at.cmp(&a.requested_at));
        runs
    }

    /// Moves a queued run to `Running`; returns false if it was not queued
    pub async fn mark_running(&self, id: Uuid) -> bool {
        let mut runs = self.runs.write().await;
        match runs.get_mut(&id) {
            Some(run) if run.status == RunStatus::Queued => {
                run.status = RunStatus::Running;
                run.started_at = Some(chrono::Utc::now());
                true
            }
            _ => false,
        }
    }

    /// Stores the terminal result of a run
    pub async fn complete(&self, id: Uuid, result: RunResult) -> Option<Run> {
        let mut runs = self.runs.write().await;
        let run = runs.get_mut(&id)?;
        run.status = result.status;
        run.completed_at = Some(chrono::Utc::now());
        run.result = Some(result);
        Some(run.clone())
    }

    pub async fn add_logs(&self, id: Uuid, entries: Vec<LogEntry>) {
        if entries.is_empty() {
            return;
        }
        self.logs
            .write()
            .await
            .entry(id)
            .or_default()
            .extend(entries);
    }

    pub async fn find_logs(&self, id: Uuid) -> Option<Vec<LogEntry>> {
        self.logs.read().await.get(&id).cloned()
    }
}

/// Removes the oldest terminal runs until `runs` fits in `retention`
fn evict_finished(runs: &mut HashMap<Uuid, Run>, retention: usize) -> Vec<Uuid> {
    let excess = runs.len().saturating_sub(retention);
    if excess == 0 {
        return Vec::new();
    }

    let mut finished: Vec<(chrono::DateTime<chrono::Utc>, Uuid)> = runs
        .values()
        .filter(|run| run.status.is_terminal())
        .map(|run| (run.requested_at, run.id))
        .collect();
    finished.sort();

    let evicted: Vec<Uuid> = finished.into_iter().take(excess).map(|(_, id)| id).collect();
    for id in &evicted {
        runs.remove(id);
    }
    evicted
}
