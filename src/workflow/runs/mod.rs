// Registry of event-triggered runs
// Each event starts one background run whose status and output can be polled


use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::config::WorkflowConfig;
use crate::{RagError, Result};

/// How long finished runs stay pollable unless configured otherwise
pub const DEFAULT_RUN_RETENTION: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    #[inline]
    pub fn is_finished(self) -> bool {
        !matches!(self, Self::Running)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub event_name: String,
    pub status: RunStatus,
    #[serde(default)]
    pub output: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
}

/// Runs keyed by the id of the event that triggered them.
///
/// Finished runs are kept for the retention window and evicted when new
/// runs start. Running records are never evicted.
#[derive(Debug)]
pub struct RunRegistry {
    runs: RwLock<HashMap<String, Vec<RunRecord>>>,
    retention: Duration,
}

impl Default for RunRegistry {
    #[inline]
    fn default() -> Self {
        Self::with_retention(DEFAULT_RUN_RETENTION)
    }
}

impl RunRegistry {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn with_retention(retention: Duration) -> Self {
        Self {
            runs: RwLock::new(HashMap::new()),
            retention,
        }
    }

    #[inline]
    pub fn from_config(config: &WorkflowConfig) -> Self {
        Self::with_retention(config.run_retention())
    }

    /// Record a new event and execute `run` for it in the background.
    ///
    /// Returns the event id immediately.
    #[inline]
    pub fn spawn<F>(self: &Arc<Self>, event_name: &str, run: F) -> String
    where
        F: Future<Output = Result<Value>> + Send + 'static,
    {
        let event_id = Uuid::new_v4().to_string();
        let run_id = self.start(&event_id, event_name);

        let registry = Arc::clone(self);
        let task_event_id = event_id.clone();
        tokio::spawn(async move {
            // The run gets its own task so a panic surfaces as a JoinError
            let outcome = match tokio::spawn(run).await {
                Ok(outcome) => outcome,
                Err(e) => Err(RagError::Other(anyhow::anyhow!("Run aborted: {}", e))),
            };
            registry.finish(&task_event_id, &run_id, outcome);
        });

        event_id
    }

    /// Record a running run for `event_id` and return its run id
    #[inline]
    pub fn start(&self, event_id: &str, event_name: &str) -> String {
        self.evict_expired();

        let run_id = Uuid::new_v4().to_string();
        info!("Event {} ({}) started run {}", event_id, event_name, run_id);

        let record = RunRecord {
            run_id: run_id.clone(),
            event_name: event_name.to_string(),
            status: RunStatus::Running,
            output: None,
            error: None,
            started_at: Utc::now(),
            ended_at: None,
        };
        self.runs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(event_id.to_string())
            .or_default()
            .push(record);

        run_id
    }

    /// Store the outcome of a run
    #[inline]
    pub fn finish(&self, event_id: &str, run_id: &str, outcome: Result<Value>) {
        let mut runs = self.runs.write().unwrap_or_else(PoisonError::into_inner);
        let Some(record) = runs
            .get_mut(event_id)
            .and_then(|records| records.iter_mut().find(|r| r.run_id == run_id))
        else {
            error!("Unknown run {} for event {}", run_id, event_id);
            return;
        };

        match outcome {
            Ok(output) => {
                info!("Run {} completed", run_id);
                record.status = RunStatus::Completed;
                record.output = Some(output);
            }
            Err(e) => {
                error!("Run {} failed: {}", run_id, e);
                record.status = RunStatus::Failed;
                record.error = Some(e.to_string());
            }
        }
        record.ended_at = Some(Utc::now());
    }

    /// Runs triggered by `event_id`, empty if the event is unknown
    #[inline]
    pub fn runs_for(&self, event_id: &str) -> Vec<RunRecord> {
        self.runs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(event_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Drop finished runs that ended before the retention window, returning
    /// how many were removed
    #[inline]
    pub fn evict_expired(&self) -> usize {
        let now = Utc::now();
        let Some(cutoff) = TimeDelta::from_std(self.retention)
            .ok()
            .and_then(|retention| now.checked_sub_signed(retention))
        else {
            return 0;
        };

        let mut runs = self.runs.write().unwrap_or_else(PoisonError::into_inner);
        let mut evicted = 0;
        runs.retain(|_, records| {
            let before = records.len();
            records.retain(|record| record.ended_at.is_none_or(|ended| ended > cutoff));
            evicted += before - records.len();
            !records.is_empty()
        });

        if evicted > 0 {
            debug!("Evicted {} finished runs", evicted);
        }
        evicted
    }
}
