//! # Persistence Store Boundary
//!
//! The engine consumes an external store for orchestration records, the
//! executor registry and work items. It never owns durability; failures are
//! surfaced as [`StoreError`] and treated by the background loops as "no data
//! this cycle".

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::error::OrchestrationError;
use crate::models::{
    ExecutorRecord, PipelineCoordinationContext, WorkItem, WorkItemFilter, WorkItemPatch,
};

pub use memory::InMemoryStore;

/// Errors raised by a persistence store implementation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Store operation {operation} failed: {message}")]
    OperationFailed { operation: String, message: String },
}

impl From<StoreError> for OrchestrationError {
    fn from(err: StoreError) -> Self {
        OrchestrationError::CollaboratorUnavailable {
            collaborator: "persistence_store".to_string(),
            message: err.to_string(),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence collaborator consumed by the engine
#[async_trait]
pub trait PersistenceStore: Send + Sync {
    /// Persist a newly created orchestration record
    async fn create_orchestration(&self, record: &PipelineCoordinationContext) -> StoreResult<()>;

    /// All executors currently known to the registry, in discovery order
    async fn get_executors_by_registry(&self) -> StoreResult<Vec<ExecutorRecord>>;

    async fn get_work_items(&self, filter: &WorkItemFilter) -> StoreResult<Vec<WorkItem>>;

    async fn update_work_item(&self, work_item_id: &str, patch: &WorkItemPatch) -> StoreResult<WorkItem>;

    /// Completed or failed work items finished by `executor_id` within `[from, to]`
    async fn get_completed_work_items_by_executor_in_range(
        &self,
        executor_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<WorkItem>>;

    /// Store name used in logs
    fn store_name(&self) -> &'static str {
        "persistence_store"
    }
}
