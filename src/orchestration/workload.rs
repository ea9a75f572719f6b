//! # Executor Workload Table
//!
//! Per-executor live state kept in registration order. Work-item counts move
//! by estimate on admission/release and are overwritten with ground truth on
//! every sampling cycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::PolicyThresholds;
use crate::models::{ExecutorHealth, ExecutorRecord, ExecutorWorkload};

/// Count of executors per health class
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCounts {
    pub healthy: usize,
    pub degraded: usize,
    pub unhealthy: usize,
}

#[derive(Debug)]
pub struct ExecutorWorkloadTable {
    workloads: Vec<ExecutorWorkload>,
    policy: PolicyThresholds,
    max_work_items_cap: u32,
}

impl ExecutorWorkloadTable {
    pub fn new(policy: PolicyThresholds, max_work_items_cap: u32) -> Self {
        Self {
            workloads: Vec::new(),
            policy,
            max_work_items_cap,
        }
    }

    /// Register an executor; returns `false` if it was already known
    pub fn register(&mut self, record: &ExecutorRecord) -> bool {
        if self.get(&record.executor_id).is_some() {
            return false;
        }
        let workload = ExecutorWorkload::from_record(record, self.max_work_items_cap);
        info!(
            executor_id = %workload.executor_id,
            tier = %workload.tier,
            max_work_items = workload.max_work_items,
            "➕ WORKLOAD: Registered executor"
        );
        self.workloads.push(workload);
        true
    }

    pub fn unregister(&mut self, executor_id: &str) -> Option<ExecutorWorkload> {
        let index = self
            .workloads
            .iter()
            .position(|w| w.executor_id == executor_id)?;
        Some(self.workloads.remove(index))
    }

    pub fn get(&self, executor_id: &str) -> Option<&ExecutorWorkload> {
        self.workloads.iter().find(|w| w.executor_id == executor_id)
    }

    pub fn get_mut(&mut self, executor_id: &str) -> Option<&mut ExecutorWorkload> {
        self.workloads
            .iter_mut()
            .find(|w| w.executor_id == executor_id)
    }

    /// Workloads in registration order
    pub fn as_slice(&self) -> &[ExecutorWorkload] {
        &self.workloads
    }

    pub fn executor_ids(&self) -> Vec<String> {
        self.workloads
            .iter()
            .map(|w| w.executor_id.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.workloads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workloads.is_empty()
    }

    pub fn policy(&self) -> &PolicyThresholds {
        &self.policy
    }

    /// Add estimated work items to each executor and stamp the assignment time
    pub fn assign_work_items(&mut self, executor_ids: &[String], count: u32, now: DateTime<Utc>) {
        let policy = self.policy.clone();
        for id in executor_ids {
            if let Some(workload) = self.get_mut(id) {
                workload.current_work_items = workload.current_work_items.saturating_add(count);
                workload.last_assigned_at = Some(now);
                workload.refresh(&policy);
            }
        }
    }

    /// Remove previously assigned work items, never going below zero
    pub fn release_work_items(&mut self, executor_ids: &[String], count: u32) {
        let policy = self.policy.clone();
        for id in executor_ids {
            if let Some(workload) = self.get_mut(id) {
                workload.current_work_items = workload.current_work_items.saturating_sub(count);
                workload.refresh(&policy);
            }
        }
    }

    /// Overwrite an executor's count with the store's ground truth
    pub fn set_ground_truth(&mut self, executor_id: &str, active_items: u32) {
        let policy = self.policy.clone();
        if let Some(workload) = self.get_mut(executor_id) {
            if workload.current_work_items != active_items {
                debug!(
                    executor_id = %executor_id,
                    estimated = workload.current_work_items,
                    actual = active_items,
                    "WORKLOAD: Correcting work-item estimate"
                );
            }
            workload.current_work_items = active_items;
            workload.refresh(&policy);
        }
    }

    /// Move one work item between executors
    pub fn transfer_work_item(&mut self, from: &str, to: &str, now: DateTime<Utc>) {
        let policy = self.policy.clone();
        if let Some(source) = self.get_mut(from) {
            source.current_work_items = source.current_work_items.saturating_sub(1);
            source.refresh(&policy);
        }
        if let Some(target) = self.get_mut(to) {
            target.current_work_items = target.current_work_items.saturating_add(1);
            target.last_assigned_at = Some(now);
            target.refresh(&policy);
        }
    }

    /// Record sampled performance for an executor
    pub fn record_performance(&mut self, executor_id: &str, success_rate: f64, avg_task_duration_ms: f64) {
        if let Some(workload) = self.get_mut(executor_id) {
            workload.success_rate = success_rate.clamp(0.0, 1.0);
            workload.avg_task_duration_ms = avg_task_duration_ms.max(0.0);
        }
    }

    /// Executors above the overload threshold
    pub fn overloaded(&self) -> Vec<&ExecutorWorkload> {
        self.workloads
            .iter()
            .filter(|w| w.utilization > self.policy.overloaded_threshold)
            .collect()
    }

    /// Healthy executors below the underutilization threshold
    pub fn underutilized(&self) -> Vec<&ExecutorWorkload> {
        self.workloads
            .iter()
            .filter(|w| w.health.is_healthy() && w.utilization < self.policy.underutilized_threshold)
            .collect()
    }

    pub fn average_utilization(&self) -> f64 {
        if self.workloads.is_empty() {
            return 0.0;
        }
        self.workloads.iter().map(|w| w.utilization).sum::<f64>() / self.workloads.len() as f64
    }

    /// `max - min` utilization across the fleet
    pub fn utilization_spread(&self) -> f64 {
        let mut utilizations = self.workloads.iter().map(|w| w.utilization);
        let Some(first) = utilizations.next() else {
            return 0.0;
        };
        let (min, max) = utilizations.fold((first, first), |(lo, hi), u| (lo.min(u), hi.max(u)));
        max - min
    }

    pub fn health_counts(&self) -> HealthCounts {
        self.workloads
            .iter()
            .fold(HealthCounts::default(), |mut counts, w| {
                match w.health {
                    ExecutorHealth::Healthy => counts.healthy += 1,
                    ExecutorHealth::Degraded => counts.degraded += 1,
                    ExecutorHealth::Unhealthy => counts.unhealthy += 1,
                }
                counts
            })
    }

    pub fn clear(&mut self) {
        self.workloads.clear();
    }
}
