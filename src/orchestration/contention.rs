//! # Contention Detection & Redistribution
//!
//! The monitoring cycle resyncs the executor registry, replaces estimated
//! work-item counts with ground truth, moves movable work off overloaded
//! executors and relieves aggregate pressure by suspending low-priority
//! orchestrations. The load-balancing cycle refreshes executor performance
//! figures and evens out utilization spread.
//!
//! Store calls are awaited with no table lock held; every mutation after an
//! await re-reads the tables.

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::engine::EngineShared;
use crate::constants::{events, load};
use crate::error::OrchestrationResult;
use crate::logging::log_error;
use crate::models::{OrchestrationId, SuspensionKind, WorkItemFilter, WorkItemPatch, WorkItemStatus};

/// Estimated aggregate load derived from average executor utilization
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemLoad {
    pub cpu_percent: f64,
    pub memory_percent: f64,
}

impl SystemLoad {
    pub fn from_average_utilization(average: f64) -> Self {
        Self {
            cpu_percent: average * load::CPU_FACTOR,
            memory_percent: average * load::MEMORY_FACTOR,
        }
    }
}

/// One work item moved between executors
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Redistribution {
    pub work_item_id: String,
    pub from_executor: String,
    pub to_executor: String,
}

/// Outcome of one monitoring cycle
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonitoringReport {
    pub executors_discovered: usize,
    pub executors_sampled: usize,
    pub redistributed: Vec<Redistribution>,
    pub system_load: SystemLoad,
    pub pressure_suspended: Vec<OrchestrationId>,
}

/// Outcome of one load-balancing cycle
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadBalanceReport {
    pub executors_sampled: usize,
    pub utilization_spread: f64,
    pub redistributed: Vec<Redistribution>,
}

impl EngineShared {
    /// Register executors the store knows about and this engine does not, in discovery order
    pub(crate) async fn sync_executors(&self) -> OrchestrationResult<usize> {
        let records = self.store.get_executors_by_registry().await?;
        let mut workloads = self.workloads.write();
        let added = records
            .iter()
            .filter(|record| workloads.register(record))
            .count();
        if added > 0 {
            info!(added, total = workloads.len(), "🔍 MONITOR: Discovered executors");
        }
        Ok(added)
    }

    /// Replace work-item estimates with the store's active counts; returns executors sampled
    pub(crate) async fn sample_workloads(&self) -> usize {
        let executor_ids = self.workloads.read().executor_ids();
        let mut sampled = 0;

        for executor_id in executor_ids {
            match self
                .store
                .get_work_items(&WorkItemFilter::active_for(&executor_id))
                .await
            {
                Ok(items) => {
                    self.workloads
                        .write()
                        .set_ground_truth(&executor_id, items.len() as u32);
                    sampled += 1;
                }
                Err(err) => {
                    log_error("monitor", "sample_workloads", &err.to_string(), Some(&executor_id));
                }
            }
        }

        sampled
    }

    /// Move up to the policy limit of movable work items off each source onto
    /// a target with a matching capability and a free slot.
    pub(crate) async fn redistribute(
        &self,
        sources: Vec<String>,
        targets: Vec<String>,
    ) -> Vec<Redistribution> {
        let limit = self.config.policy.max_items_moved_per_executor;
        let mut moved = Vec::new();
        if targets.is_empty() {
            return moved;
        }

        for source in sources {
            let items = match self
                .store
                .get_work_items(&WorkItemFilter {
                    executor_id: Some(source.clone()),
                    statuses: Some(vec![WorkItemStatus::Pending]),
                })
                .await
            {
                Ok(items) => items,
                Err(err) => {
                    log_error("monitor", "redistribute", &err.to_string(), Some(&source));
                    continue;
                }
            };

            let mut moved_here = 0;
            for item in items.into_iter().filter(|item| item.is_movable()) {
                if moved_here >= limit {
                    break;
                }

                let Some(target) = self.pick_redistribution_target(&source, &targets, item.required_capability.as_deref()) else {
                    debug!(work_item_id = %item.work_item_id, "MONITOR: No matching target for work item");
                    continue;
                };

                if let Err(err) = self
                    .store
                    .update_work_item(&item.work_item_id, &WorkItemPatch::reassign(&target))
                    .await
                {
                    log_error("monitor", "update_work_item", &err.to_string(), Some(&item.work_item_id));
                    continue;
                }

                self.workloads
                    .write()
                    .transfer_work_item(&source, &target, Utc::now());
                moved_here += 1;

                info!(
                    work_item_id = %item.work_item_id,
                    from = %source,
                    to = %target,
                    event = events::WORK_ITEM_REDISTRIBUTED,
                    "↔️ MONITOR: Redistributed work item"
                );
                moved.push(Redistribution {
                    work_item_id: item.work_item_id,
                    from_executor: source.clone(),
                    to_executor: target,
                });
            }
        }

        moved
    }

    /// Least-utilized target with the required capability and a free slot
    fn pick_redistribution_target(
        &self,
        source: &str,
        targets: &[String],
        required_capability: Option<&str>,
    ) -> Option<String> {
        let workloads = self.workloads.read();
        let target = targets
            .iter()
            .filter(|id| id.as_str() != source)
            .filter_map(|id| workloads.get(id))
            .filter(|w| w.available_slots() > 0)
            .filter(|w| required_capability.map_or(true, |tag| w.has_capability(tag)))
            .min_by(|a, b| {
                a.utilization
                    .partial_cmp(&b.utilization)
                    .unwrap_or(Ordering::Equal)
            })
            .map(|w| w.executor_id.clone());
        target
    }

    /// Suspend low-priority running orchestrations when estimated load crosses the pressure limits
    pub(crate) fn relieve_pressure(&self, system_load: SystemLoad) -> Vec<OrchestrationId> {
        let policy = &self.config.policy;
        if system_load.cpu_percent <= policy.cpu_pressure_threshold
            && system_load.memory_percent <= policy.memory_pressure_threshold
        {
            return Vec::new();
        }

        let candidates = self.registry.read().pressure_candidates(
            policy.pressure_suspension_min_priority,
            policy.max_pressure_suspensions,
        );
        let reason = format!(
            "resource pressure: cpu {:.1}%, memory {:.1}%",
            system_load.cpu_percent, system_load.memory_percent
        );

        warn!(
            cpu_percent = system_load.cpu_percent,
            memory_percent = system_load.memory_percent,
            candidates = candidates.len(),
            "🔥 MONITOR: Resource pressure detected"
        );

        candidates
            .into_iter()
            .filter(|id| {
                match self.suspend(*id, SuspensionKind::Pressure, "resource_monitor", Some(reason.clone())) {
                    Ok(()) => true,
                    Err(err) => {
                        debug!(orchestration_id = %id, error = %err, "MONITOR: Pressure suspension skipped");
                        false
                    }
                }
            })
            .collect()
    }

    /// Resync, sample, redistribute, then relieve pressure.
    ///
    /// A registry sync failure skips the whole cycle.
    pub(crate) async fn run_monitoring_cycle(self: &Arc<Self>) -> OrchestrationResult<MonitoringReport> {
        let executors_discovered = match self.sync_executors().await {
            Ok(added) => added,
            Err(err) => {
                log_error("monitor", "sync_executors", &err.to_string(), None);
                return Err(err);
            }
        };
        let executors_sampled = self.sample_workloads().await;

        let (sources, targets) = {
            let workloads = self.workloads.read();
            let sources: Vec<String> = workloads
                .overloaded()
                .iter()
                .map(|w| w.executor_id.clone())
                .collect();
            let targets: Vec<String> = workloads
                .underutilized()
                .iter()
                .map(|w| w.executor_id.clone())
                .collect();
            (sources, targets)
        };
        let redistributed = if sources.is_empty() {
            Vec::new()
        } else {
            self.redistribute(sources, targets).await
        };

        let system_load =
            SystemLoad::from_average_utilization(self.workloads.read().average_utilization());
        let pressure_suspended = self.relieve_pressure(system_load);
        if !pressure_suspended.is_empty() {
            self.run_rebalancing_cycle();
        }

        debug!(
            executors_sampled,
            redistributed = redistributed.len(),
            cpu_percent = system_load.cpu_percent,
            memory_percent = system_load.memory_percent,
            "MONITOR: Monitoring cycle complete"
        );

        Ok(MonitoringReport {
            executors_discovered,
            executors_sampled,
            redistributed,
            system_load,
            pressure_suspended,
        })
    }

    /// Refresh success rate and average duration from recently finished work items
    pub(crate) async fn sample_performance(&self) -> usize {
        let to = Utc::now();
        let from = to - Duration::hours(self.config.policy.performance_window_hours);
        let executor_ids = self.workloads.read().executor_ids();
        let mut sampled = 0;

        for executor_id in executor_ids {
            let items = match self
                .store
                .get_completed_work_items_by_executor_in_range(&executor_id, from, to)
                .await
            {
                Ok(items) => items,
                Err(err) => {
                    log_error("load_balancer", "sample_performance", &err.to_string(), Some(&executor_id));
                    continue;
                }
            };
            if items.is_empty() {
                continue;
            }

            let succeeded = items
                .iter()
                .filter(|item| item.status == WorkItemStatus::Completed)
                .count();
            let durations: Vec<f64> = items.iter().filter_map(|item| item.duration_ms()).collect();
            let success_rate = succeeded as f64 / items.len() as f64;
            let mut workloads = self.workloads.write();
            let avg_duration = if durations.is_empty() {
                workloads
                    .get(&executor_id)
                    .map(|w| w.avg_task_duration_ms)
                    .unwrap_or_default()
            } else {
                durations.iter().sum::<f64>() / durations.len() as f64
            };
            workloads.record_performance(&executor_id, success_rate, avg_duration);
            sampled += 1;
        }

        sampled
    }

    /// Performance sampling plus spread-driven redistribution
    pub(crate) async fn run_load_balancing_cycle(&self) -> LoadBalanceReport {
        let executors_sampled = self.sample_performance().await;
        let threshold = self.config.policy.load_imbalance_threshold;

        let (utilization_spread, sources, targets) = {
            let workloads = self.workloads.read();
            let spread = workloads.utilization_spread();
            let average = workloads.average_utilization();
            let sources: Vec<String> = workloads
                .as_slice()
                .iter()
                .filter(|w| w.utilization > average + threshold / 2.0)
                .map(|w| w.executor_id.clone())
                .collect();
            let targets: Vec<String> = workloads
                .as_slice()
                .iter()
                .filter(|w| w.health.is_healthy() && w.utilization < average - threshold / 2.0)
                .map(|w| w.executor_id.clone())
                .collect();
            (spread, sources, targets)
        };

        let redistributed = if utilization_spread > threshold && !sources.is_empty() {
            info!(
                spread = utilization_spread,
                sources = sources.len(),
                targets = targets.len(),
                "⚖️ LOAD_BALANCER: Utilization imbalance detected"
            );
            self.redistribute(sources, targets).await
        } else {
            Vec::new()
        };

        LoadBalanceReport {
            executors_sampled,
            utilization_spread,
            redistributed,
        }
    }
}
