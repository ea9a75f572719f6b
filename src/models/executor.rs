//! # Task Executor Models
//!
//! Registration records and live workload state for pooled task executors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::PolicyThresholds;

/// Capability tier of a task executor, ordered least to most specialized
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutorTier {
    /// Broad coordinator-style executors
    Coordinator,
    /// Mid-level manager-style executors
    Manager,
    /// Narrow, highly specialized executors
    Specialist,
}

impl ExecutorTier {
    /// Base concurrent work-item allowance before capability adjustment
    pub fn base_work_items(&self) -> u32 {
        match self {
            Self::Coordinator => 3,
            Self::Manager => 5,
            Self::Specialist => 8,
        }
    }
}

impl fmt::Display for ExecutorTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Coordinator => write!(f, "coordinator"),
            Self::Manager => write!(f, "manager"),
            Self::Specialist => write!(f, "specialist"),
        }
    }
}

/// Health classification derived solely from utilization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutorHealth {
    Healthy,
    Degraded,
    Unhealthy,
}

impl ExecutorHealth {
    /// Classify a utilization percentage against the configured thresholds
    pub fn from_utilization(utilization: f64, policy: &PolicyThresholds) -> Self {
        if utilization > policy.unhealthy_utilization {
            Self::Unhealthy
        } else if utilization > policy.degraded_utilization {
            Self::Degraded
        } else {
            Self::Healthy
        }
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }
}

impl fmt::Display for ExecutorHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded => write!(f, "degraded"),
            Self::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// Executor record as held by the persistence store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutorRecord {
    pub executor_id: String,
    pub tier: ExecutorTier,
    pub capabilities: Vec<String>,
}

impl ExecutorRecord {
    pub fn new(executor_id: impl Into<String>, tier: ExecutorTier, capabilities: Vec<String>) -> Self {
        Self {
            executor_id: executor_id.into(),
            tier,
            capabilities,
        }
    }
}

/// Live workload state for one registered executor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorWorkload {
    /// Executor identity
    pub executor_id: String,
    /// Capability tier
    pub tier: ExecutorTier,
    /// Capability tags this executor can serve
    pub capabilities: Vec<String>,
    /// Work items currently assigned
    pub current_work_items: u32,
    /// Maximum concurrent work items (tier/capability derived, globally capped)
    pub max_work_items: u32,
    /// `current / max * 100`
    pub utilization: f64,
    /// Rolling average task duration in milliseconds
    pub avg_task_duration_ms: f64,
    /// Rolling success rate (0.0 - 1.0)
    pub success_rate: f64,
    /// Utilization-derived health
    pub health: ExecutorHealth,
    /// Last time work was assigned to this executor
    pub last_assigned_at: Option<DateTime<Utc>>,
}

impl ExecutorWorkload {
    /// Build the initial workload for a newly registered executor
    pub fn from_record(record: &ExecutorRecord, max_work_items_cap: u32) -> Self {
        let derived = record.tier.base_work_items() + (record.capabilities.len() as u32) / 2;
        let max_work_items = derived.min(max_work_items_cap).max(1);

        Self {
            executor_id: record.executor_id.clone(),
            tier: record.tier,
            capabilities: record.capabilities.clone(),
            current_work_items: 0,
            max_work_items,
            utilization: 0.0,
            avg_task_duration_ms: 0.0,
            success_rate: 1.0,
            health: ExecutorHealth::Healthy,
            last_assigned_at: None,
        }
    }

    /// Recompute utilization and health from the current work-item count
    pub fn refresh(&mut self, policy: &PolicyThresholds) {
        self.utilization = if self.max_work_items == 0 {
            0.0
        } else {
            (self.current_work_items as f64 / self.max_work_items as f64) * 100.0
        };
        self.health = ExecutorHealth::from_utilization(self.utilization, policy);
    }

    pub fn has_capability(&self, tag: &str) -> bool {
        self.capabilities.iter().any(|c| c == tag)
    }

    pub fn available_slots(&self) -> u32 {
        self.max_work_items.saturating_sub(self.current_work_items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> PolicyThresholds {
        PolicyThresholds::default()
    }

    #[test]
    fn test_health_thresholds() {
        let p = policy();
        assert_eq!(ExecutorHealth::from_utilization(96.0, &p), ExecutorHealth::Unhealthy);
        assert_eq!(ExecutorHealth::from_utilization(95.0, &p), ExecutorHealth::Degraded);
        assert_eq!(ExecutorHealth::from_utilization(81.0, &p), ExecutorHealth::Degraded);
        assert_eq!(ExecutorHealth::from_utilization(80.0, &p), ExecutorHealth::Healthy);
        assert_eq!(ExecutorHealth::from_utilization(0.0, &p), ExecutorHealth::Healthy);
    }

    #[test]
    fn test_max_work_items_derivation() {
        let record = ExecutorRecord::new(
            "spec-1",
            ExecutorTier::Specialist,
            vec!["parse".into(), "score".into(), "draft".into()],
        );
        // 8 base + 3/2
        assert_eq!(ExecutorWorkload::from_record(&record, 50).max_work_items, 9);
        // globally capped
        assert_eq!(ExecutorWorkload::from_record(&record, 1).max_work_items, 1);
    }

    #[test]
    fn test_refresh_updates_utilization_and_health() {
        let record = ExecutorRecord::new("mgr-1", ExecutorTier::Manager, vec![]);
        let mut workload = ExecutorWorkload::from_record(&record, 50);
        assert_eq!(workload.max_work_items, 5);

        workload.current_work_items = 5;
        workload.refresh(&policy());
        assert_eq!(workload.utilization, 100.0);
        assert_eq!(workload.health, ExecutorHealth::Unhealthy);

        workload.current_work_items = 2;
        workload.refresh(&policy());
        assert_eq!(workload.utilization, 40.0);
        assert!(workload.health.is_healthy());
    }

    #[test]
    fn test_tier_ordering() {
        assert!(ExecutorTier::Coordinator < ExecutorTier::Manager);
        assert!(ExecutorTier::Manager < ExecutorTier::Specialist);
        assert_eq!(ExecutorTier::Specialist.to_string(), "specialist");
    }
}
