//! # Orchestration Engine
//!
//! The public entry point. `OrchestrationEngine` is a cheap, cloneable handle
//! over `EngineShared`, which owns the four scheduling tables and the injected
//! collaborators. Scheduling, execution and contention logic live in sibling
//! modules as further `impl EngineShared` blocks.
//!
//! ## Locking
//!
//! Tables are guarded individually and always taken in the order
//! registry → ledger → workloads → queue. Guards are never held across an
//! `.await`; store and executor calls happen between critical sections.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use pipeline_conductor::config::EngineConfig;
//! use pipeline_conductor::models::{CoordinationType, OrchestrationOptions};
//! use pipeline_conductor::orchestration::{NoopPipelineExecutor, OrchestrationEngine};
//! use pipeline_conductor::store::InMemoryStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = OrchestrationEngine::new(
//!     EngineConfig::default(),
//!     Arc::new(InMemoryStore::new()),
//!     Arc::new(NoopPipelineExecutor),
//! )?;
//! engine.start().await?;
//!
//! let id = engine
//!     .create_pipeline_orchestration(
//!         "nightly-etl",
//!         "extract, transform, load",
//!         vec!["extract".into(), "transform".into(), "load".into()],
//!         CoordinationType::Sequential,
//!         OrchestrationOptions::default(),
//!     )
//!     .await?;
//! let _allocation = engine.allocate_resources_for_orchestration(id).await?;
//!
//! engine.shutdown().await;
//! # Ok(())
//! # }
//! ```

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

use super::contention::{LoadBalanceReport, MonitoringReport, SystemLoad};
use super::coordinator::LoopCoordinator;
use super::executor_selection::ExecutorSelector;
use super::pipeline_executor::{DeclaredOrder, MemberOrdering, PipelineExecutor};
use super::priority_queue::PriorityQueue;
use super::registry::{OrchestrationRegistry, RegistryStats};
use super::resource_ledger::ResourceLedger;
use super::scheduler::RebalanceReport;
use super::workload::{ExecutorWorkloadTable, HealthCounts};
use crate::config::EngineConfig;
use crate::constants::events;
use crate::error::{OrchestrationError, OrchestrationResult};
use crate::logging::log_orchestration_operation;
use crate::models::{
    CapacitySnapshot, CoordinationType, ExecutorRecord, ExecutorWorkload, OrchestrationId,
    OrchestrationOptions, PipelineCoordinationContext, Priority, ResourceAllocation,
    SuspensionKind,
};
use crate::store::PersistenceStore;

/// Point-in-time view of the engine's tables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemMetrics {
    /// Orchestrations currently holding an allocation
    pub active_allocations: usize,
    pub executor_count: usize,
    /// Utilization percentage per executor, in registration order
    pub executor_utilization: Vec<(String, f64)>,
    pub health_counts: HealthCounts,
    /// Queue length per priority bucket
    pub queue_lengths: BTreeMap<u8, usize>,
    pub system_load: SystemLoad,
    pub registry: RegistryStats,
    pub held_capacity: CapacitySnapshot,
    /// Allocatable total before subtracting held capacity
    pub capacity_ceiling: CapacitySnapshot,
    pub available_capacity: CapacitySnapshot,
}

/// State shared by the facade, the control loops and execution tasks
pub struct EngineShared {
    pub(crate) config: EngineConfig,
    pub(crate) store: Arc<dyn PersistenceStore>,
    pub(crate) pipeline_executor: Arc<dyn PipelineExecutor>,
    pub(crate) member_ordering: RwLock<Arc<dyn MemberOrdering>>,
    pub(crate) selector: ExecutorSelector,
    pub(crate) registry: RwLock<OrchestrationRegistry>,
    pub(crate) ledger: Mutex<ResourceLedger>,
    pub(crate) workloads: RwLock<ExecutorWorkloadTable>,
    pub(crate) queue: Mutex<PriorityQueue>,
}

impl EngineShared {
    fn new(
        config: EngineConfig,
        store: Arc<dyn PersistenceStore>,
        pipeline_executor: Arc<dyn PipelineExecutor>,
    ) -> Self {
        let workloads = ExecutorWorkloadTable::new(
            config.policy.clone(),
            config.resources.max_work_items_per_executor,
        );
        Self {
            selector: ExecutorSelector::new(config.policy.clone()),
            ledger: Mutex::new(ResourceLedger::new(config.resources.clone())),
            workloads: RwLock::new(workloads),
            registry: RwLock::new(OrchestrationRegistry::new()),
            queue: Mutex::new(PriorityQueue::new()),
            member_ordering: RwLock::new(Arc::new(DeclaredOrder)),
            store,
            pipeline_executor,
            config,
        }
    }

    pub(crate) fn member_ordering(&self) -> Arc<dyn MemberOrdering> {
        Arc::clone(&self.member_ordering.read())
    }

    fn clear_tables(&self) {
        self.registry.write().clear();
        self.ledger.lock().clear();
        self.workloads.write().clear();
        self.queue.lock().clear();
    }
}

impl std::fmt::Debug for EngineShared {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineShared")
            .field("store", &self.store.store_name())
            .field("pipeline_executor", &self.pipeline_executor.executor_name())
            .field("orchestrations", &self.registry.read().len())
            .field("executors", &self.workloads.read().len())
            .finish()
    }
}

/// Cloneable handle over a running (or stopped) engine
#[derive(Debug, Clone)]
pub struct OrchestrationEngine {
    inner: Arc<EngineShared>,
    loops: Arc<Mutex<Option<LoopCoordinator>>>,
}

impl OrchestrationEngine {
    /// Build an engine with no registered executors. Loops do not run until `start`.
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn PersistenceStore>,
        pipeline_executor: Arc<dyn PipelineExecutor>,
    ) -> OrchestrationResult<Self> {
        config.validate()?;
        info!(
            store = store.store_name(),
            pipeline_executor = pipeline_executor.executor_name(),
            max_concurrent_pipelines = config.resources.max_concurrent_pipelines,
            "🏗️ ENGINE: Initializing orchestration engine"
        );
        Ok(Self {
            inner: Arc::new(EngineShared::new(config, store, pipeline_executor)),
            loops: Arc::new(Mutex::new(None)),
        })
    }

    /// Replace the ordering used by priority-weighted orchestrations
    pub fn with_member_ordering(self, ordering: Arc<dyn MemberOrdering>) -> Self {
        *self.inner.member_ordering.write() = ordering;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn is_running(&self) -> bool {
        self.loops.lock().is_some()
    }

    /// Discover executors once, then start the three control loops
    pub async fn start(&self) -> OrchestrationResult<()> {
        if self.is_running() {
            return Err(OrchestrationError::Validation(
                "engine is already running".to_string(),
            ));
        }

        info!("🚀 ENGINE: Starting orchestration engine");
        if let Err(err) = self.inner.sync_executors().await {
            warn!(error = %err, "ENGINE: Initial executor discovery failed, monitor will retry");
        }

        let mut loops = self.loops.lock();
        if loops.is_some() {
            return Err(OrchestrationError::Validation(
                "engine is already running".to_string(),
            ));
        }
        *loops = Some(LoopCoordinator::start(Arc::clone(&self.inner)));
        info!(
            executors = self.inner.workloads.read().len(),
            "✅ ENGINE: Orchestration engine started"
        );
        Ok(())
    }

    /// Stop the loops and clear every table. Safe to call repeatedly.
    pub async fn shutdown(&self) {
        let coordinator = self.loops.lock().take();
        match coordinator {
            Some(coordinator) => {
                info!("🛑 ENGINE: Shutting down orchestration engine");
                coordinator.stop().await;
            }
            None => info!("ENGINE: Shutdown requested while not running"),
        }
        self.inner.clear_tables();
        info!("✅ ENGINE: Orchestration engine shut down");
    }

    /// Register an executor directly; false when it is already known
    pub fn register_executor(&self, record: &ExecutorRecord) -> bool {
        let added = self.inner.workloads.write().register(record);
        if added {
            info!(executor_id = %record.executor_id, tier = %record.tier, "ENGINE: Registered executor");
        }
        added
    }

    /// Remove an executor that holds no active allocation
    pub fn unregister_executor(&self, executor_id: &str) -> OrchestrationResult<()> {
        let ledger = self.inner.ledger.lock();
        if ledger.holds_executor(executor_id) {
            return Err(OrchestrationError::Validation(format!(
                "executor {executor_id} is held by an active allocation"
            )));
        }
        let mut workloads = self.inner.workloads.write();
        match workloads.unregister(executor_id) {
            Some(_) => {
                info!(executor_id = %executor_id, "ENGINE: Unregistered executor");
                Ok(())
            }
            None => Err(OrchestrationError::Validation(format!(
                "executor {executor_id} is not registered"
            ))),
        }
    }

    /// Pull new executors from the store; returns how many were added
    pub async fn sync_executors(&self) -> OrchestrationResult<usize> {
        self.inner.sync_executors().await
    }

    /// Validate, persist, register and enqueue a new orchestration in the pending state
    pub async fn create_pipeline_orchestration(
        &self,
        name: &str,
        description: &str,
        member_pipelines: Vec<String>,
        coordination_type: CoordinationType,
        options: OrchestrationOptions,
    ) -> OrchestrationResult<OrchestrationId> {
        if name.trim().is_empty() {
            return Err(OrchestrationError::Validation(
                "orchestration name must not be empty".to_string(),
            ));
        }
        if member_pipelines.is_empty() {
            return Err(OrchestrationError::Validation(
                "orchestration needs at least one member pipeline".to_string(),
            ));
        }
        if member_pipelines.iter().any(|id| id.trim().is_empty()) {
            return Err(OrchestrationError::Validation(
                "member pipeline ids must not be empty".to_string(),
            ));
        }
        let priority = match options.priority {
            Some(level) => Priority::new(level).ok_or_else(|| {
                OrchestrationError::Validation(format!(
                    "priority must be between 1 and 5, got {level}"
                ))
            })?,
            None => Priority::default(),
        };

        let mut context = PipelineCoordinationContext::new(
            name,
            description,
            member_pipelines,
            coordination_type,
            priority,
            options,
        );
        let id = context.orchestration_id;
        context.metadata.timestamps.queued_at = Some(context.metadata.timestamps.created_at);

        self.inner.store.create_orchestration(&context).await?;

        {
            let mut registry = self.inner.registry.write();
            let mut queue = self.inner.queue.lock();
            registry.insert(context);
            queue.enqueue(id, priority);
        }

        log_orchestration_operation(
            events::ORCHESTRATION_CREATED,
            Some(id.to_string().as_str()),
            Some(name),
            "pending",
            Some(&format!("{coordination_type} priority={priority}")),
        );
        Ok(id)
    }

    /// Try to admit an orchestration now; a denial leaves it queued
    pub async fn allocate_resources_for_orchestration(
        &self,
        id: OrchestrationId,
    ) -> OrchestrationResult<ResourceAllocation> {
        self.inner.admit_and_spawn(id, None)
    }

    /// Operator suspension; releases held capacity without re-queueing
    pub async fn suspend_orchestration(
        &self,
        id: OrchestrationId,
        suspended_by: &str,
        reason: Option<String>,
    ) -> OrchestrationResult<()> {
        self.inner
            .suspend(id, SuspensionKind::Requested, suspended_by, reason)
    }

    /// Re-admit a suspended orchestration through the normal admission path
    pub async fn resume_orchestration(
        &self,
        id: OrchestrationId,
        resumed_by: &str,
    ) -> OrchestrationResult<()> {
        self.inner.admit_and_spawn(id, Some(resumed_by)).map(|_| ())
    }

    /// Cancel a pending, running or suspended orchestration
    pub async fn cancel_orchestration(
        &self,
        id: OrchestrationId,
        cancelled_by: &str,
    ) -> OrchestrationResult<()> {
        self.inner.suspend(
            id,
            SuspensionKind::Cancelled,
            cancelled_by,
            Some("cancelled".to_string()),
        )
    }

    /// Snapshot of an orchestration's context, or None for an unknown id
    pub fn get_orchestration_status(&self, id: OrchestrationId) -> Option<PipelineCoordinationContext> {
        self.inner.registry.read().get(id).cloned()
    }

    /// Every known orchestration, oldest first
    pub fn list_orchestrations(&self) -> Vec<PipelineCoordinationContext> {
        self.inner.registry.read().list()
    }

    /// The active allocation held by an orchestration, if any
    pub fn get_allocation(&self, id: OrchestrationId) -> Option<ResourceAllocation> {
        self.inner.ledger.lock().get(id).cloned()
    }

    pub fn get_executor_workload(&self, executor_id: &str) -> Option<ExecutorWorkload> {
        self.inner.workloads.read().get(executor_id).cloned()
    }

    pub fn queued_priority(&self, id: OrchestrationId) -> Option<Priority> {
        self.inner.queue.lock().priority_of(id)
    }

    pub fn get_system_metrics(&self) -> SystemMetrics {
        let registry = self.inner.registry.read();
        let ledger = self.inner.ledger.lock();
        let workloads = self.inner.workloads.read();
        let queue = self.inner.queue.lock();

        SystemMetrics {
            active_allocations: ledger.active_count(),
            executor_count: workloads.len(),
            executor_utilization: workloads
                .as_slice()
                .iter()
                .map(|w| (w.executor_id.clone(), w.utilization))
                .collect(),
            health_counts: workloads.health_counts(),
            queue_lengths: queue.lengths(),
            system_load: SystemLoad::from_average_utilization(workloads.average_utilization()),
            registry: registry.stats(),
            held_capacity: ledger.held(),
            capacity_ceiling: ledger
                .capacity_ceiling(workloads.as_slice(), &self.inner.config.policy),
            available_capacity: ledger
                .available_capacity(workloads.as_slice(), &self.inner.config.policy),
        }
    }

    /// Run one monitoring cycle immediately
    pub async fn run_monitoring_cycle(&self) -> OrchestrationResult<MonitoringReport> {
        self.inner.run_monitoring_cycle().await
    }

    /// Run one priority rebalancing and admission cycle immediately
    pub fn run_rebalancing_cycle(&self) -> RebalanceReport {
        self.inner.run_rebalancing_cycle()
    }

    /// Run one load-balancing cycle immediately
    pub async fn run_load_balancing_cycle(&self) -> LoadBalanceReport {
        self.inner.run_load_balancing_cycle().await
    }
}
