//! # Work Item Models
//!
//! Work items are owned by the persistence store; the engine reads them to derive
//! ground-truth executor load and patches them when redistributing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkItemStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl WorkItemStatus {
    /// Whether the item still occupies its executor
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::InProgress)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    pub work_item_id: String,
    pub executor_id: String,
    pub status: WorkItemStatus,
    /// Blocking items must stay on their executor
    pub blocking: bool,
    /// Capability a receiving executor must have
    pub required_capability: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl WorkItem {
    pub fn new(work_item_id: impl Into<String>, executor_id: impl Into<String>) -> Self {
        Self {
            work_item_id: work_item_id.into(),
            executor_id: executor_id.into(),
            status: WorkItemStatus::Pending,
            blocking: false,
            required_capability: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Not yet started and free to move between executors
    pub fn is_movable(&self) -> bool {
        self.status == WorkItemStatus::Pending && !self.blocking
    }

    /// Execution time for completed items
    pub fn duration_ms(&self) -> Option<f64> {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) if end >= start => {
                Some((end - start).num_milliseconds() as f64)
            }
            _ => None,
        }
    }
}

/// Query filter for `PersistenceStore::get_work_items`
#[derive(Debug, Clone, Default)]
pub struct WorkItemFilter {
    pub executor_id: Option<String>,
    pub statuses: Option<Vec<WorkItemStatus>>,
}

impl WorkItemFilter {
    pub fn active_for(executor_id: &str) -> Self {
        Self {
            executor_id: Some(executor_id.to_string()),
            statuses: Some(vec![WorkItemStatus::Pending, WorkItemStatus::InProgress]),
        }
    }

    pub fn matches(&self, item: &WorkItem) -> bool {
        let executor_ok = self
            .executor_id
            .as_ref()
            .map(|id| *id == item.executor_id)
            .unwrap_or(true);
        let status_ok = self
            .statuses
            .as_ref()
            .map(|statuses| statuses.contains(&item.status))
            .unwrap_or(true);
        executor_ok && status_ok
    }
}

/// Partial update applied by `PersistenceStore::update_work_item`
#[derive(Debug, Clone, Default)]
pub struct WorkItemPatch {
    pub executor_id: Option<String>,
    pub status: Option<WorkItemStatus>,
}

impl WorkItemPatch {
    pub fn reassign(executor_id: &str) -> Self {
        Self {
            executor_id: Some(executor_id.to_string()),
            status: None,
        }
    }

    pub fn apply(&self, item: &mut WorkItem) {
        if let Some(executor_id) = &self.executor_id {
            item.executor_id = executor_id.clone();
        }
        if let Some(status) = self.status {
            item.status = status;
        }
    }
}
