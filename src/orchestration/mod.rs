//! # Orchestration Engine
//!
//! Admission control, executor selection and runtime rebalancing for
//! multi-stage pipeline orchestrations.
//!
//! ## Core Components
//!
//! - **OrchestrationEngine**: public facade and owner of the shared tables
//! - **ResourceLedger**: capacity ceiling, held allocations and availability
//! - **ExecutorWorkloadTable**: per-executor work-item counts, utilization and health
//! - **ExecutorSelector**: eligibility filter and composite scoring
//! - **PriorityQueue**: five FIFO buckets of orchestrations awaiting admission
//! - **OrchestrationRegistry**: lifecycle state of every known orchestration
//! - **LoopCoordinator**: the monitoring, rebalancing and load-balancing loops
//!
//! Admission, suspension and priority rebalancing live in `scheduler`; member
//! execution strategies in `coordination`; redistribution and pressure relief
//! in `contention`.

pub mod contention;
pub mod coordination;
pub mod coordinator;
pub mod engine;
pub mod executor_selection;
pub mod pipeline_executor;
pub mod priority_queue;
pub mod registry;
pub mod resource_ledger;
pub mod scheduler;
pub mod workload;

pub use contention::{LoadBalanceReport, MonitoringReport, Redistribution, SystemLoad};
pub use coordinator::LoopCoordinator;
pub use engine::{OrchestrationEngine, SystemMetrics};
pub use executor_selection::{ExecutorSelector, ScoredExecutor};
pub use pipeline_executor::{
    DeclaredOrder, MemberOrdering, NoopPipelineExecutor, PipelineExecutionError, PipelineExecutor,
    WeightedOrdering,
};
pub use priority_queue::PriorityQueue;
pub use registry::{OrchestrationRegistry, RegistryStats};
pub use resource_ledger::ResourceLedger;
pub use scheduler::{recompute_priority, PriorityChange, RebalanceReport};
pub use workload::{ExecutorWorkloadTable, HealthCounts};
