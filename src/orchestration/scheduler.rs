//! # Scheduler Core
//!
//! Admission (check-then-reserve), suspension and release, dynamic priority
//! rebalancing and the queue-driven admission pass.
//!
//! Every mutation here runs synchronously under the engine's table locks,
//! taken in the fixed order registry → ledger → workloads → queue. Nothing in
//! this module awaits while holding a lock.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::coordination;
use super::engine::EngineShared;
use super::resource_ledger::ResourceLedger;
use super::workload::ExecutorWorkloadTable;
use crate::config::PolicyThresholds;
use crate::constants::{cost, events, scoring};
use crate::error::{DenialReason, OrchestrationError, OrchestrationResult};
use crate::logging::{log_allocation_operation, log_orchestration_operation};
use crate::models::{
    CapacitySnapshot, CoordinationType, OrchestrationId, PipelineCoordinationContext, Priority,
    ResourceAllocation, StatusDetail, SuspensionInfo, SuspensionKind,
};
use crate::state_machine::{OrchestrationEvent, OrchestrationState, OrchestrationStateMachine};

/// A granted admission and the run epoch its execution must carry
#[derive(Debug, Clone)]
pub(crate) struct Admission {
    pub allocation: ResourceAllocation,
    pub epoch: u64,
}

/// One priority recomputation that changed an orchestration's level
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorityChange {
    pub orchestration_id: OrchestrationId,
    pub from: Priority,
    pub to: Priority,
}

/// Outcome of one rebalancing cycle
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RebalanceReport {
    pub priority_changes: Vec<PriorityChange>,
    pub admitted: Vec<OrchestrationId>,
}

/// Recompute an orchestration's priority from its declared level.
///
/// `waiting` marks orchestrations still awaiting admission; only those age.
pub fn recompute_priority(
    context: &PipelineCoordinationContext,
    waiting: bool,
    now: DateTime<Utc>,
    policy: &PolicyThresholds,
) -> Priority {
    let mut level = context.metadata.declared_priority.get() as i64;

    if let Some(deadline) = context.metadata.deadline {
        let remaining = deadline - now;
        if remaining <= Duration::hours(policy.urgent_deadline_hours) {
            return Priority::HIGHEST;
        }
        if remaining <= Duration::hours(policy.near_deadline_hours) {
            level = level.min(2);
        }
    }

    if context
        .metadata
        .business_value
        .is_some_and(|value| value > policy.high_business_value)
    {
        level = level.min(2);
    }

    let age = now - context.metadata.timestamps.created_at;
    if waiting && age > Duration::hours(policy.aging_threshold_hours) {
        level -= 1;
    }

    Priority::clamped(level)
}

fn denied(
    reason: DenialReason,
    required: CapacitySnapshot,
    available: CapacitySnapshot,
) -> OrchestrationError {
    OrchestrationError::AdmissionDenied {
        reason,
        required,
        available,
    }
}

impl EngineShared {
    /// Admit an orchestration if capacity allows, reserving it in the same critical section.
    ///
    /// `resumed_by` forces resume semantics. Without it, a suspended
    /// orchestration is only admitted when it is queued after a denied resume;
    /// operator, pressure and cancel suspensions are rejected. A denial leaves
    /// the orchestration queued.
    pub(crate) fn admit(
        &self,
        id: OrchestrationId,
        resumed_by: Option<&str>,
    ) -> OrchestrationResult<Admission> {
        let now = Utc::now();
        let mut registry = self.registry.write();

        let (dependencies_met, running) = {
            let ctx = registry.get(id).ok_or_else(|| OrchestrationError::not_found(id))?;
            (registry.dependencies_met(ctx), registry.running_count())
        };
        let ctx = registry
            .get_mut(id)
            .ok_or_else(|| OrchestrationError::not_found(id))?;

        // without an explicit resume, only a suspension whose resume was denied may re-enter
        let awaiting_resume =
            ctx.status == OrchestrationState::Suspended && self.queue.lock().contains(id);
        let event = match (resumed_by, awaiting_resume) {
            (Some(_), _) | (None, true) => OrchestrationEvent::Resume,
            (None, false) => OrchestrationEvent::Admit,
        };
        let target = OrchestrationStateMachine::determine_target_state(ctx.status, &event)?;
        let priority = ctx.priority();

        let mut ledger = self.ledger.lock();
        let mut workloads = self.workloads.write();

        let mut required = ResourceLedger::required_capacity(ctx);
        let available = ledger.available_capacity(workloads.as_slice(), &self.config.policy);

        let selection = self.check_admission(
            ctx,
            &workloads,
            dependencies_met,
            running,
            &mut required,
            &available,
            now,
        );

        let executor_ids = match selection {
            Ok(executor_ids) => executor_ids,
            Err(reason) => {
                let mut queue = self.queue.lock();
                if !queue.contains(id) {
                    ctx.metadata.timestamps.queued_at = Some(now);
                }
                queue.enqueue(id, priority);

                info!(
                    orchestration_id = %id,
                    reason = %reason,
                    required = %required,
                    available = %available,
                    event = events::ORCHESTRATION_DENIED,
                    "⏸️ SCHEDULER: Admission denied, orchestration remains queued"
                );
                return Err(denied(reason, required, available));
            }
        };

        let multiplier = ctx.coordination_type.multiplier(ctx.member_count());
        let work_items = cost::BASE_WORK_ITEMS * multiplier as u32;
        let allocation = ResourceAllocation {
            orchestration_id: id,
            executor_ids,
            memory_mb: required.memory_mb,
            cpu_percent: required.cpu_percent,
            priority_multiplier: priority.allocation_multiplier(),
            work_items_per_executor: work_items,
            allocated_at: now,
            released_at: None,
        };

        workloads.assign_work_items(&allocation.executor_ids, work_items, now);
        ledger.record(allocation.clone());

        ctx.status = target;
        ctx.run_epoch += 1;
        ctx.allocations.push(allocation.clone());
        ctx.metadata.timestamps.started_at.get_or_insert(now);
        ctx.metadata.timestamps.queued_at = None;
        ctx.metadata.detail = match event {
            OrchestrationEvent::Resume => StatusDetail::Resumed {
                resumed_by: resumed_by.unwrap_or("scheduler").to_string(),
                resumed_at: now,
            },
            _ => StatusDetail::None,
        };
        if ctx.coordination_type == CoordinationType::Parallel {
            ctx.current_stage = 0;
            ctx.completed_members = 0;
        }
        let epoch = ctx.run_epoch;

        self.queue.lock().remove(id);

        log_allocation_operation(
            events::ALLOCATION_GRANTED,
            &id.to_string(),
            allocation.executor_ids.len(),
            allocation.memory_mb,
            allocation.cpu_percent,
            "granted",
        );
        log_orchestration_operation(
            if event == OrchestrationEvent::Resume {
                events::ORCHESTRATION_RESUMED
            } else {
                events::ORCHESTRATION_ADMITTED
            },
            Some(id.to_string().as_str()),
            Some(ctx.name.as_str()),
            "running",
            None,
        );

        Ok(Admission { allocation, epoch })
    }

    /// Gate checks and executor selection for one admission attempt
    #[allow(clippy::too_many_arguments)]
    fn check_admission(
        &self,
        ctx: &PipelineCoordinationContext,
        workloads: &ExecutorWorkloadTable,
        dependencies_met: bool,
        running: usize,
        required: &mut CapacitySnapshot,
        available: &CapacitySnapshot,
        now: DateTime<Utc>,
    ) -> Result<Vec<String>, DenialReason> {
        if !dependencies_met {
            return Err(DenialReason::DependenciesPending);
        }
        if running >= self.config.resources.max_concurrent_pipelines {
            return Err(DenialReason::ConcurrencyLimit);
        }
        if !ResourceLedger::can_allocate(available, required) {
            return Err(DenialReason::InsufficientCapacity);
        }

        let target = required
            .executors
            .max(scoring::MIN_EXECUTORS_PER_ALLOCATION);
        let selected = self.selector.select(
            workloads.as_slice(),
            &ctx.required_capabilities,
            target,
            ctx.priority(),
            now,
        )?;

        // capability cover may have picked extra executors
        required.executors = selected.len();
        if !ResourceLedger::can_allocate(available, required) {
            return Err(DenialReason::InsufficientCapacity);
        }

        Ok(selected)
    }

    /// Admit and start execution
    pub(crate) fn admit_and_spawn(
        self: &Arc<Self>,
        id: OrchestrationId,
        resumed_by: Option<&str>,
    ) -> OrchestrationResult<ResourceAllocation> {
        let admission = self.admit(id, resumed_by)?;
        coordination::spawn_execution(Arc::clone(self), id, admission.epoch);
        Ok(admission.allocation)
    }

    /// Suspend (or cancel) an orchestration, releasing its held capacity.
    ///
    /// The allocation history stays on the context; resume goes through
    /// admission again.
    pub(crate) fn suspend(
        &self,
        id: OrchestrationId,
        kind: SuspensionKind,
        suspended_by: &str,
        reason: Option<String>,
    ) -> OrchestrationResult<()> {
        let now = Utc::now();
        let mut registry = self.registry.write();
        let ctx = registry
            .get_mut(id)
            .ok_or_else(|| OrchestrationError::not_found(id))?;

        let event = match kind {
            SuspensionKind::Cancelled => OrchestrationEvent::Cancel,
            SuspensionKind::Requested | SuspensionKind::Pressure => OrchestrationEvent::Suspend,
        };
        let from = ctx.status;
        ctx.status = OrchestrationStateMachine::determine_target_state(from, &event)?;
        ctx.metadata.detail = StatusDetail::Suspended(SuspensionInfo {
            kind,
            suspended_by: suspended_by.to_string(),
            reason: reason.clone(),
            suspended_at: now,
        });

        if from == OrchestrationState::Running {
            let mut ledger = self.ledger.lock();
            let mut workloads = self.workloads.write();
            Self::release_allocation(ctx, &mut ledger, &mut workloads, now);
        }

        self.queue.lock().remove(id);
        ctx.metadata.timestamps.queued_at = None;

        log_orchestration_operation(
            if kind == SuspensionKind::Cancelled {
                events::ORCHESTRATION_CANCELLED
            } else {
                events::ORCHESTRATION_SUSPENDED
            },
            Some(id.to_string().as_str()),
            Some(ctx.name.as_str()),
            "suspended",
            reason.as_deref(),
        );

        Ok(())
    }

    /// Drop the active allocation and its work-item estimate; history keeps a released copy
    pub(crate) fn release_allocation(
        ctx: &mut PipelineCoordinationContext,
        ledger: &mut ResourceLedger,
        workloads: &mut ExecutorWorkloadTable,
        now: DateTime<Utc>,
    ) {
        let Some(allocation) = ledger.release(ctx.orchestration_id) else {
            return;
        };
        workloads.release_work_items(&allocation.executor_ids, allocation.work_items_per_executor);

        if let Some(record) = ctx.allocations.iter_mut().rev().find(|a| a.is_active()) {
            record.released_at = Some(now);
        }

        log_allocation_operation(
            events::ALLOCATION_RELEASED,
            &ctx.orchestration_id.to_string(),
            allocation.executor_ids.len(),
            allocation.memory_mb,
            allocation.cpu_percent,
            "released",
        );
    }

    /// Recompute every non-terminal orchestration's priority and move queued ones between buckets
    pub(crate) fn rebalance_priorities(&self, now: DateTime<Utc>) -> Vec<PriorityChange> {
        let policy = &self.config.policy;
        let mut registry = self.registry.write();
        let mut queue = self.queue.lock();
        let mut changes = Vec::new();

        for ctx in registry.iter_mut().filter(|ctx| !ctx.status.is_terminal()) {
            let id = ctx.orchestration_id;
            let waiting = ctx.status == OrchestrationState::Pending || queue.contains(id);
            let updated = recompute_priority(ctx, waiting, now, policy);
            let current = ctx.priority();
            if updated == current {
                continue;
            }

            ctx.metadata.priority = updated;
            ctx.metadata.timestamps.last_rebalanced_at = Some(now);
            queue.reprioritize(id, updated);

            info!(
                orchestration_id = %id,
                from = %current,
                to = %updated,
                event = events::PRIORITY_CHANGED,
                "🔀 SCHEDULER: Priority rebalanced"
            );
            changes.push(PriorityChange {
                orchestration_id: id,
                from: current,
                to: updated,
            });
        }

        changes
    }

    /// Admit queued orchestrations bucket by bucket.
    ///
    /// When bucket 1 or 2 has entries, lower buckets are skipped for this pass.
    pub(crate) fn run_admission_pass(self: &Arc<Self>) -> Vec<OrchestrationId> {
        let per_bucket = self.config.scheduling.admissions_per_bucket;
        let (urgent_only, buckets) = {
            let queue = self.queue.lock();
            let urgent_only = queue.has_urgent();
            let last = if urgent_only { 2 } else { 5 };
            let buckets: Vec<Vec<OrchestrationId>> = (1..=last)
                .map(|level| queue.bucket(Priority::clamped(level)))
                .collect();
            (urgent_only, buckets)
        };

        if urgent_only {
            debug!("SCHEDULER: Urgent work queued, skipping buckets 3-5 this pass");
        }

        let mut admitted = Vec::new();
        for bucket in buckets {
            let mut admitted_here = 0;
            for id in bucket {
                if admitted_here >= per_bucket {
                    break;
                }
                match self.admit_and_spawn(id, None) {
                    Ok(_) => {
                        admitted_here += 1;
                        admitted.push(id);
                    }
                    Err(err) if err.is_admission_denied() => {
                        debug!(orchestration_id = %id, error = %err, "SCHEDULER: Still waiting");
                    }
                    Err(err) => {
                        warn!(orchestration_id = %id, error = %err, "SCHEDULER: Dropping stale queue entry");
                        self.queue.lock().remove(id);
                    }
                }
            }
        }

        admitted
    }

    /// Priority rebalancing followed by an admission pass
    pub(crate) fn run_rebalancing_cycle(self: &Arc<Self>) -> RebalanceReport {
        let priority_changes = self.rebalance_priorities(Utc::now());
        let admitted = self.run_admission_pass();

        if !priority_changes.is_empty() || !admitted.is_empty() {
            info!(
                priority_changes = priority_changes.len(),
                admitted = admitted.len(),
                "🔄 SCHEDULER: Rebalancing cycle complete"
            );
        }

        RebalanceReport {
            priority_changes,
            admitted,
        }
    }
}
