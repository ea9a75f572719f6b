//! # Data Models
//!
//! Executors, orchestrations, allocations and work items.

pub mod allocation;
pub mod executor;
pub mod orchestration;
pub mod work_item;

pub use allocation::{CapacitySnapshot, ResourceAllocation};
pub use executor::{ExecutorHealth, ExecutorRecord, ExecutorTier, ExecutorWorkload};
pub use orchestration::{
    CompletionCriteria, CoordinationType, FailureInfo, OrchestrationId, OrchestrationMetadata,
    OrchestrationOptions, PipelineCoordinationContext, Priority, ResourceOverrides,
    SchedulingTimestamps, StatusDetail, SuspensionInfo, SuspensionKind,
};
pub use work_item::{WorkItem, WorkItemFilter, WorkItemPatch, WorkItemStatus};
