//! # Resource Ledger
//!
//! Holds the global capacity constraints and the allocations currently held
//! against them. Capacity reported to the scheduler is the reserved-capacity
//! ceiling minus what active allocations already hold.

use std::collections::HashMap;
use tracing::debug;

use crate::config::{PolicyThresholds, ResourceConstraints};
use crate::constants::cost;
use crate::models::{
    CapacitySnapshot, ExecutorWorkload, OrchestrationId, PipelineCoordinationContext,
    ResourceAllocation,
};

#[derive(Debug)]
pub struct ResourceLedger {
    constraints: ResourceConstraints,
    allocations: HashMap<OrchestrationId, ResourceAllocation>,
}

impl ResourceLedger {
    pub fn new(constraints: ResourceConstraints) -> Self {
        Self {
            constraints,
            allocations: HashMap::new(),
        }
    }

    pub fn constraints(&self) -> &ResourceConstraints {
        &self.constraints
    }

    /// Fraction of each dimension that may be handed out
    fn allocatable_share(&self) -> f64 {
        1.0 - self.constraints.reserved_capacity
    }

    /// Total allocatable capacity before subtracting held allocations.
    ///
    /// Executors count while healthy and below the ledger utilization limit,
    /// or while an active allocation holds them; the figure is also capped by
    /// the configured executor maximum. It never drops below the executors
    /// already held, so load added by a grant cannot push holdings over it.
    pub fn capacity_ceiling(
        &self,
        workloads: &[ExecutorWorkload],
        policy: &PolicyThresholds,
    ) -> CapacitySnapshot {
        let share = self.allocatable_share();
        let eligible = workloads
            .iter()
            .filter(|w| {
                (w.health.is_healthy() && w.utilization < policy.ledger_eligible_utilization)
                    || self.holds_executor(&w.executor_id)
            })
            .count();

        let from_pool = (eligible as f64 * share).floor() as usize;
        let from_limit = (self.constraints.max_concurrent_executors as f64 * share).floor() as usize;
        let held_executors = self.held().executors;

        CapacitySnapshot::new(
            from_pool.min(from_limit).max(held_executors),
            (self.constraints.max_memory_mb as f64 * share).floor() as u64,
            self.constraints.max_cpu_percent * share,
        )
    }

    /// Capacity held by active allocations
    pub fn held(&self) -> CapacitySnapshot {
        self.allocations
            .values()
            .fold(CapacitySnapshot::default(), |acc, allocation| {
                acc.add(&allocation.held())
            })
    }

    /// Capacity still grantable right now
    pub fn available_capacity(
        &self,
        workloads: &[ExecutorWorkload],
        policy: &PolicyThresholds,
    ) -> CapacitySnapshot {
        self.capacity_ceiling(workloads, policy)
            .saturating_sub(&self.held())
    }

    /// Resources an orchestration needs, scaled by its coordination type and
    /// replaced field-by-field by any per-orchestration overrides
    pub fn required_capacity(context: &PipelineCoordinationContext) -> CapacitySnapshot {
        let multiplier = context
            .coordination_type
            .multiplier(context.member_count());

        let mut required = CapacitySnapshot::new(
            cost::BASE_EXECUTORS * multiplier,
            cost::BASE_MEMORY_MB * multiplier as u64,
            cost::BASE_CPU_PERCENT * multiplier as f64,
        );

        if let Some(overrides) = &context.resource_overrides {
            if let Some(executors) = overrides.executors {
                required.executors = executors;
            }
            if let Some(memory_mb) = overrides.memory_mb {
                required.memory_mb = memory_mb;
            }
            if let Some(cpu_percent) = overrides.cpu_percent {
                required.cpu_percent = cpu_percent;
            }
        }

        required
    }

    /// All three dimensions must fit; there are no partial grants
    pub fn can_allocate(available: &CapacitySnapshot, required: &CapacitySnapshot) -> bool {
        available.executors >= required.executors
            && available.memory_mb >= required.memory_mb
            && available.cpu_percent >= required.cpu_percent
    }

    pub fn record(&mut self, allocation: ResourceAllocation) {
        debug!(
            orchestration_id = %allocation.orchestration_id,
            executors = allocation.executor_ids.len(),
            memory_mb = allocation.memory_mb,
            "LEDGER: Recording allocation"
        );
        self.allocations
            .insert(allocation.orchestration_id, allocation);
    }

    /// Drop the active allocation for an orchestration, returning it
    pub fn release(&mut self, orchestration_id: OrchestrationId) -> Option<ResourceAllocation> {
        let released = self.allocations.remove(&orchestration_id);
        if released.is_some() {
            debug!(orchestration_id = %orchestration_id, "LEDGER: Released allocation");
        }
        released
    }

    pub fn get(&self, orchestration_id: OrchestrationId) -> Option<&ResourceAllocation> {
        self.allocations.get(&orchestration_id)
    }

    pub fn active_count(&self) -> usize {
        self.allocations.len()
    }

    /// Whether any active allocation includes the executor
    pub fn holds_executor(&self, executor_id: &str) -> bool {
        self.allocations
            .values()
            .any(|allocation| allocation.executor_ids.iter().any(|id| id == executor_id))
    }

    pub fn clear(&mut self) {
        self.allocations.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        CoordinationType, ExecutorRecord, ExecutorTier, OrchestrationOptions, Priority,
        ResourceOverrides,
    };
    use chrono::Utc;

    fn workloads(count: usize, cap: u32) -> Vec<ExecutorWorkload> {
        (0..count)
            .map(|i| {
                ExecutorWorkload::from_record(
                    &ExecutorRecord::new(format!("exec-{i}"), ExecutorTier::Manager, vec![]),
                    cap,
                )
            })
            .collect()
    }

    fn context(coordination_type: CoordinationType, members: usize) -> PipelineCoordinationContext {
        PipelineCoordinationContext::new(
            "batch",
            "",
            (0..members).map(|i| format!("p{i}")).collect(),
            coordination_type,
            Priority::default(),
            OrchestrationOptions::default(),
        )
    }

    #[test]
    fn test_reserved_capacity_scenario() {
        let ledger = ResourceLedger::new(ResourceConstraints {
            max_concurrent_executors: 4,
            reserved_capacity: 0.5,
            max_work_items_per_executor: 1,
            ..ResourceConstraints::default()
        });
        let pool = workloads(2, 1);
        let available = ledger.available_capacity(&pool, &PolicyThresholds::default());
        assert_eq!(available.executors, 1);

        let required = ResourceLedger::required_capacity(&context(CoordinationType::Sequential, 1));
        assert_eq!(required.executors, 2);
        assert!(!ResourceLedger::can_allocate(&available, &required));
    }

    #[test]
    fn test_ceiling_excludes_busy_and_unhealthy_executors() {
        let ledger = ResourceLedger::new(ResourceConstraints {
            reserved_capacity: 0.0,
            ..ResourceConstraints::default()
        });
        let policy = PolicyThresholds::default();
        let mut pool = workloads(4, 10);
        pool[0].current_work_items = 9; // 90% -> degraded
        pool[0].refresh(&policy);
        pool[1].current_work_items = 10; // 100% -> unhealthy
        pool[1].refresh(&policy);

        assert_eq!(ledger.capacity_ceiling(&pool, &policy).executors, 2);
    }

    #[test]
    fn test_required_capacity_scaling_and_overrides() {
        let parallel = ResourceLedger::required_capacity(&context(CoordinationType::Parallel, 3));
        assert_eq!(parallel, CapacitySnapshot::new(6, 768, 45.0));

        let mut ctx = context(CoordinationType::Conditional, 5);
        assert_eq!(ResourceLedger::required_capacity(&ctx).executors, 6);

        ctx.resource_overrides = Some(ResourceOverrides {
            executors: Some(2),
            memory_mb: None,
            cpu_percent: Some(5.0),
        });
        let overridden = ResourceLedger::required_capacity(&ctx);
        assert_eq!(overridden.executors, 2);
        assert_eq!(overridden.memory_mb, 768);
        assert_eq!(overridden.cpu_percent, 5.0);
    }

    #[test]
    fn test_can_allocate_rejects_any_short_dimension() {
        let available = CapacitySnapshot::new(4, 1024, 30.0);
        assert!(ResourceLedger::can_allocate(&available, &CapacitySnapshot::new(4, 1024, 30.0)));
        assert!(!ResourceLedger::can_allocate(&available, &CapacitySnapshot::new(5, 10, 1.0)));
        assert!(!ResourceLedger::can_allocate(&available, &CapacitySnapshot::new(1, 2048, 1.0)));
        assert!(!ResourceLedger::can_allocate(&available, &CapacitySnapshot::new(1, 10, 30.5)));
    }

    #[test]
    fn test_held_allocations_reduce_available() {
        let mut ledger = ResourceLedger::new(ResourceConstraints {
            reserved_capacity: 0.0,
            ..ResourceConstraints::default()
        });
        let policy = PolicyThresholds::default();
        let pool = workloads(6, 10);
        let id = uuid::Uuid::new_v4();

        ledger.record(ResourceAllocation {
            orchestration_id: id,
            executor_ids: vec!["exec-0".into(), "exec-1".into()],
            memory_mb: 256,
            cpu_percent: 15.0,
            priority_multiplier: 1.0,
            work_items_per_executor: 4,
            allocated_at: Utc::now(),
            released_at: None,
        });

        assert_eq!(ledger.available_capacity(&pool, &policy).executors, 4);
        assert!(ledger.holds_executor("exec-1"));
        assert!(!ledger.holds_executor("exec-2"));

        assert!(ledger.release(id).is_some());
        assert_eq!(ledger.available_capacity(&pool, &policy).executors, 6);
        assert_eq!(ledger.active_count(), 0);
    }

    #[test]
    fn test_ceiling_keeps_held_executors_after_they_saturate() {
        let mut ledger = ResourceLedger::new(ResourceConstraints {
            reserved_capacity: 0.0,
            ..ResourceConstraints::default()
        });
        let policy = PolicyThresholds::default();
        let mut pool: Vec<ExecutorWorkload> = (0..3)
            .map(|i| {
                ExecutorWorkload::from_record(
                    &ExecutorRecord::new(format!("exec-{i}"), ExecutorTier::Coordinator, vec![]),
                    10,
                )
            })
            .collect();
        assert_eq!(ledger.capacity_ceiling(&pool, &policy).executors, 3);

        ledger.record(ResourceAllocation {
            orchestration_id: uuid::Uuid::new_v4(),
            executor_ids: vec!["exec-0".into(), "exec-1".into()],
            memory_mb: 256,
            cpu_percent: 15.0,
            priority_multiplier: 1.0,
            work_items_per_executor: 4,
            allocated_at: Utc::now(),
            released_at: None,
        });
        // 4 items on a 3-slot coordinator is 133% -> unhealthy
        for workload in pool.iter_mut().take(2) {
            workload.current_work_items = 4;
            workload.refresh(&policy);
        }

        let ceiling = ledger.capacity_ceiling(&pool, &policy);
        assert_eq!(ceiling.executors, 3);
        assert!(ledger.held().executors <= ceiling.executors);
        assert_eq!(ledger.available_capacity(&pool, &policy).executors, 1);
    }
}
