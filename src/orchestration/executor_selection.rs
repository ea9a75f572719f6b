//! # Executor Selection
//!
//! Scores pooled executors for an orchestration and picks a set that covers
//! every required capability tag before filling remaining slots with the best
//! unused candidates. This is a greedy cover, not an optimal assignment.

use chrono::{DateTime, Duration, Utc};
use std::cmp::Ordering;
use tracing::debug;

use crate::config::PolicyThresholds;
use crate::constants::scoring;
use crate::error::DenialReason;
use crate::models::{ExecutorTier, ExecutorWorkload, Priority};

/// A candidate executor with its computed score
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredExecutor {
    pub executor_id: String,
    pub score: f64,
}

#[derive(Debug, Clone)]
pub struct ExecutorSelector {
    policy: PolicyThresholds,
}

impl ExecutorSelector {
    pub fn new(policy: PolicyThresholds) -> Self {
        Self { policy }
    }

    /// Healthy, below the selection utilization limit and under its own cap
    pub fn is_eligible(&self, workload: &ExecutorWorkload) -> bool {
        workload.health.is_healthy()
            && workload.utilization < self.policy.selection_max_utilization
            && workload.current_work_items < workload.max_work_items
    }

    pub fn score(&self, workload: &ExecutorWorkload, priority: Priority, now: DateTime<Utc>) -> f64 {
        let utilization = (100.0 - workload.utilization) * scoring::UTILIZATION_WEIGHT;
        let success = workload.success_rate * 100.0 * scoring::SUCCESS_RATE_WEIGHT;
        let tier = match workload.tier {
            ExecutorTier::Specialist => scoring::SPECIALIST_TIER_BONUS,
            ExecutorTier::Manager => scoring::MANAGER_TIER_BONUS,
            ExecutorTier::Coordinator => 0.0,
        };
        let health = if workload.health.is_healthy() {
            scoring::HEALTH_BONUS
        } else {
            0.0
        };
        let capabilities = (workload.capabilities.len() as f64 * scoring::CAPABILITY_BONUS_PER_TAG)
            .min(scoring::CAPABILITY_BONUS_CAP);
        let urgency = if priority.get() <= scoring::PRIORITY_BONUS_CUTOFF {
            scoring::PRIORITY_BONUS
        } else {
            0.0
        };
        let idle_window = Duration::minutes(self.policy.idle_bonus_minutes);
        let idle = match workload.last_assigned_at {
            Some(at) if now - at <= idle_window => 0.0,
            _ => scoring::IDLE_BONUS,
        };

        utilization + success + tier + health + capabilities + urgency + idle
    }

    /// Eligible executors, best first; equal scores keep registration order
    pub fn rank(
        &self,
        workloads: &[ExecutorWorkload],
        priority: Priority,
        now: DateTime<Utc>,
    ) -> Vec<ScoredExecutor> {
        let mut ranked: Vec<ScoredExecutor> = workloads
            .iter()
            .filter(|w| self.is_eligible(w))
            .map(|w| ScoredExecutor {
                executor_id: w.executor_id.clone(),
                score: self.score(w, priority, now),
            })
            .collect();

        // stable sort
        ranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        ranked
    }

    /// Pick at least `target` executors covering every tag in `required_capabilities`.
    ///
    /// Capability cover may return more than `target`; fewer is a denial.
    pub fn select(
        &self,
        workloads: &[ExecutorWorkload],
        required_capabilities: &[String],
        target: usize,
        priority: Priority,
        now: DateTime<Utc>,
    ) -> Result<Vec<String>, DenialReason> {
        let ranked = self.rank(workloads, priority, now);
        let mut selected: Vec<String> = Vec::with_capacity(target);

        for tag in required_capabilities {
            if selected.iter().any(|id| has_capability(workloads, id, tag)) {
                continue;
            }
            let holder = ranked
                .iter()
                .find(|candidate| {
                    !selected.contains(&candidate.executor_id)
                        && has_capability(workloads, &candidate.executor_id, tag)
                })
                .ok_or_else(|| DenialReason::MissingCapability(tag.clone()))?;
            selected.push(holder.executor_id.clone());
        }

        for candidate in &ranked {
            if selected.len() >= target {
                break;
            }
            if !selected.contains(&candidate.executor_id) {
                selected.push(candidate.executor_id.clone());
            }
        }

        if selected.len() < target {
            debug!(
                eligible = ranked.len(),
                target = target,
                "SELECTOR: Not enough eligible executors"
            );
            return Err(DenialReason::NoEligibleExecutors);
        }

        Ok(selected)
    }
}

fn has_capability(workloads: &[ExecutorWorkload], executor_id: &str, tag: &str) -> bool {
    workloads
        .iter()
        .find(|w| w.executor_id == executor_id)
        .map(|w| w.has_capability(tag))
        .unwrap_or(false)
}
