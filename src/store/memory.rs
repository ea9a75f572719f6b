//! In-memory persistence store used by the runner binary and tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use super::{PersistenceStore, StoreError, StoreResult};
use crate::models::{
    ExecutorRecord, OrchestrationId, PipelineCoordinationContext, WorkItem, WorkItemFilter,
    WorkItemPatch, WorkItemStatus,
};

#[derive(Debug, Default)]
pub struct InMemoryStore {
    orchestrations: RwLock<HashMap<OrchestrationId, PipelineCoordinationContext>>,
    executors: RwLock<Vec<ExecutorRecord>>,
    work_items: RwLock<Vec<WorkItem>>,
    failing: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with `StoreError::Unavailable`
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn add_executor(&self, record: ExecutorRecord) {
        let mut executors = self.executors.write();
        if !executors.iter().any(|e| e.executor_id == record.executor_id) {
            executors.push(record);
        }
    }

    pub fn add_work_item(&self, item: WorkItem) {
        self.work_items.write().push(item);
    }

    /// Snapshot of all stored work items
    pub fn work_items(&self) -> Vec<WorkItem> {
        self.work_items.read().clone()
    }

    pub fn orchestration_count(&self) -> usize {
        self.orchestrations.read().len()
    }

    fn check_available(&self, operation: &str) -> StoreResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(format!(
                "in-memory store is in failing mode ({operation})"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl PersistenceStore for InMemoryStore {
    async fn create_orchestration(&self, record: &PipelineCoordinationContext) -> StoreResult<()> {
        self.check_available("create_orchestration")?;
        self.orchestrations
            .write()
            .insert(record.orchestration_id, record.clone());
        Ok(())
    }

    async fn get_executors_by_registry(&self) -> StoreResult<Vec<ExecutorRecord>> {
        self.check_available("get_executors_by_registry")?;
        Ok(self.executors.read().clone())
    }

    async fn get_work_items(&self, filter: &WorkItemFilter) -> StoreResult<Vec<WorkItem>> {
        self.check_available("get_work_items")?;
        Ok(self
            .work_items
            .read()
            .iter()
            .filter(|item| filter.matches(item))
            .cloned()
            .collect())
    }

    async fn update_work_item(&self, work_item_id: &str, patch: &WorkItemPatch) -> StoreResult<WorkItem> {
        self.check_available("update_work_item")?;
        let mut items = self.work_items.write();
        let item = items
            .iter_mut()
            .find(|item| item.work_item_id == work_item_id)
            .ok_or_else(|| StoreError::NotFound(format!("work item {work_item_id}")))?;
        patch.apply(item);
        Ok(item.clone())
    }

    async fn get_completed_work_items_by_executor_in_range(
        &self,
        executor_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<WorkItem>> {
        self.check_available("get_completed_work_items_by_executor_in_range")?;
        Ok(self
            .work_items
            .read()
            .iter()
            .filter(|item| item.executor_id == executor_id)
            .filter(|item| {
                matches!(item.status, WorkItemStatus::Completed | WorkItemStatus::Failed)
            })
            .filter(|item| {
                item.completed_at
                    .map(|at| at >= from && at <= to)
                    .unwrap_or(false)
            })
            .cloned()
            .collect())
    }

    fn store_name(&self) -> &'static str {
        "in_memory"
    }
}
