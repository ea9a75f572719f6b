//! # Engine Configuration System
//!
//! Layered configuration for the orchestration engine: built-in defaults, an
//! optional TOML (or YAML/JSON) file per environment, then `CONDUCTOR_*`
//! environment variables.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use pipeline_conductor::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let reserved = manager.config().resources.reserved_capacity;
//! let rebalance_every = manager.config().scheduling.rebalance_interval();
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Global capacity constraints
    pub resources: ResourceConstraints,

    /// Background loop cadence and admission batch sizes
    pub scheduling: SchedulingConfig,

    /// Heuristic thresholds for health, contention and rebalancing
    pub policy: PolicyThresholds,

    /// Structured logging settings
    pub logging: LoggingConfig,
}

impl EngineConfig {
    /// Validate cross-field invariants
    pub fn validate(&self) -> ConfigResult<()> {
        let resources = &self.resources;
        if !(0.0..1.0).contains(&resources.reserved_capacity) {
            return Err(ConfigurationError::invalid_value(
                "resources.reserved_capacity",
                format!("must be in [0, 1), got {}", resources.reserved_capacity),
            ));
        }
        if resources.max_work_items_per_executor == 0 {
            return Err(ConfigurationError::invalid_value(
                "resources.max_work_items_per_executor",
                "must be greater than 0",
            ));
        }
        if resources.max_concurrent_pipelines == 0 {
            return Err(ConfigurationError::invalid_value(
                "resources.max_concurrent_pipelines",
                "must be greater than 0",
            ));
        }

        let scheduling = &self.scheduling;
        for (field, value) in [
            ("scheduling.monitor_interval_seconds", scheduling.monitor_interval_seconds),
            ("scheduling.rebalance_interval_seconds", scheduling.rebalance_interval_seconds),
            ("scheduling.load_balance_interval_seconds", scheduling.load_balance_interval_seconds),
        ] {
            if value == 0 {
                return Err(ConfigurationError::invalid_value(field, "must be greater than 0"));
            }
        }

        let policy = &self.policy;
        if policy.degraded_utilization >= policy.unhealthy_utilization {
            return Err(ConfigurationError::invalid_value(
                "policy.degraded_utilization",
                "must be below policy.unhealthy_utilization",
            ));
        }
        if policy.underutilized_threshold >= policy.overloaded_threshold {
            return Err(ConfigurationError::invalid_value(
                "policy.underutilized_threshold",
                "must be below policy.overloaded_threshold",
            ));
        }
        if policy.urgent_deadline_hours > policy.near_deadline_hours {
            return Err(ConfigurationError::invalid_value(
                "policy.urgent_deadline_hours",
                "must not exceed policy.near_deadline_hours",
            ));
        }

        Ok(())
    }
}

/// Process-wide capacity constraints
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ResourceConstraints {
    pub max_concurrent_pipelines: usize,
    pub max_concurrent_executors: usize,
    pub max_memory_mb: u64,
    pub max_cpu_percent: f64,
    /// Fraction of every capacity dimension permanently withheld (0.0 - 1.0)
    pub reserved_capacity: f64,
    pub max_work_items_per_executor: u32,
}

impl Default for ResourceConstraints {
    fn default() -> Self {
        Self {
            max_concurrent_pipelines: 10,
            max_concurrent_executors: 50,
            max_memory_mb: 8192,
            max_cpu_percent: 400.0,
            reserved_capacity: 0.2,
            max_work_items_per_executor: 10,
        }
    }
}

/// Background loop cadence
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SchedulingConfig {
    pub monitor_interval_seconds: u64,
    pub rebalance_interval_seconds: u64,
    pub load_balance_interval_seconds: u64,
    /// Orchestrations admitted per priority bucket per rebalancing cycle
    pub admissions_per_bucket: usize,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            monitor_interval_seconds: 30,
            rebalance_interval_seconds: 15,
            load_balance_interval_seconds: 45,
            admissions_per_bucket: 3,
        }
    }
}

impl SchedulingConfig {
    pub fn monitor_interval(&self) -> Duration {
        Duration::from_secs(self.monitor_interval_seconds)
    }

    pub fn rebalance_interval(&self) -> Duration {
        Duration::from_secs(self.rebalance_interval_seconds)
    }

    pub fn load_balance_interval(&self) -> Duration {
        Duration::from_secs(self.load_balance_interval_seconds)
    }
}

/// Heuristic thresholds; percentages are 0-100 utilization figures
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PolicyThresholds {
    pub unhealthy_utilization: f64,
    pub degraded_utilization: f64,
    /// Executors at or above this utilization do not count toward ledger capacity
    pub ledger_eligible_utilization: f64,
    /// Executors at or above this utilization are not selected
    pub selection_max_utilization: f64,
    pub overloaded_threshold: f64,
    pub underutilized_threshold: f64,
    pub cpu_pressure_threshold: f64,
    pub memory_pressure_threshold: f64,
    /// Work items moved off one overloaded executor per cycle
    pub max_items_moved_per_executor: usize,
    /// Running orchestrations suspended per pressure event
    pub max_pressure_suspensions: usize,
    /// Only orchestrations at this priority or lower (numerically higher) are pressure-suspended
    pub pressure_suspension_min_priority: u8,
    pub urgent_deadline_hours: i64,
    pub near_deadline_hours: i64,
    pub high_business_value: f64,
    pub aging_threshold_hours: i64,
    pub idle_bonus_minutes: i64,
    /// Look-back window for success-rate and duration sampling
    pub performance_window_hours: i64,
    /// Utilization spread (max - min) that triggers load-balancing redistribution
    pub load_imbalance_threshold: f64,
}

impl Default for PolicyThresholds {
    fn default() -> Self {
        Self {
            unhealthy_utilization: 95.0,
            degraded_utilization: 80.0,
            ledger_eligible_utilization: 90.0,
            selection_max_utilization: 85.0,
            overloaded_threshold: 90.0,
            underutilized_threshold: 30.0,
            cpu_pressure_threshold: 85.0,
            memory_pressure_threshold: 90.0,
            max_items_moved_per_executor: 2,
            max_pressure_suspensions: 3,
            pressure_suspension_min_priority: 4,
            urgent_deadline_hours: 6,
            near_deadline_hours: 24,
            high_business_value: 100_000.0,
            aging_threshold_hours: 2,
            idle_bonus_minutes: 5,
            performance_window_hours: 24,
            load_imbalance_threshold: 50.0,
        }
    }
}

/// Structured logging settings
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive, e.g. `info` or `pipeline_conductor=debug`; environment-derived when unset
    pub level: Option<String>,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}
