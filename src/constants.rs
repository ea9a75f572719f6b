//! # System Constants
//!
//! Fixed cost model, scoring weights and lifecycle event names that define the
//! operational boundaries of the orchestration engine.
//!
//! Tunable heuristics (utilization thresholds, pressure limits, deadline windows)
//! are deliberately *not* here; they live in [`crate::config::PolicyThresholds`].

/// Lifecycle events emitted through structured logging
pub mod events {
    pub const ORCHESTRATION_CREATED: &str = "orchestration.created";
    pub const ORCHESTRATION_ADMITTED: &str = "orchestration.admitted";
    pub const ORCHESTRATION_DENIED: &str = "orchestration.admission_denied";
    pub const ORCHESTRATION_SUSPENDED: &str = "orchestration.suspended";
    pub const ORCHESTRATION_RESUMED: &str = "orchestration.resumed";
    pub const ORCHESTRATION_CANCELLED: &str = "orchestration.cancelled";
    pub const ORCHESTRATION_COMPLETED: &str = "orchestration.completed";
    pub const ORCHESTRATION_FAILED: &str = "orchestration.failed";
    pub const PRIORITY_CHANGED: &str = "orchestration.priority_changed";

    pub const ALLOCATION_GRANTED: &str = "allocation.granted";
    pub const ALLOCATION_RELEASED: &str = "allocation.released";

    pub const WORK_ITEM_REDISTRIBUTED: &str = "work_item.redistributed";
}

/// Per-pipeline base cost used by the resource ledger
pub mod cost {
    /// Executors required by one pipeline before the coordination multiplier
    pub const BASE_EXECUTORS: usize = 2;
    /// Memory (MB) required by one pipeline before the coordination multiplier
    pub const BASE_MEMORY_MB: u64 = 256;
    /// CPU share (percent) required by one pipeline before the coordination multiplier
    pub const BASE_CPU_PERCENT: f64 = 15.0;
    /// Work items one pipeline is expected to place on each granted executor
    pub const BASE_WORK_ITEMS: u32 = 4;
    /// Priority-weighted orchestrations never scale beyond this many members
    pub const PRIORITY_WEIGHTED_MAX_MULTIPLIER: usize = 3;
}

/// Executor scoring weights used by the selector
pub mod scoring {
    pub const UTILIZATION_WEIGHT: f64 = 0.3;
    pub const SUCCESS_RATE_WEIGHT: f64 = 0.25;
    pub const SPECIALIST_TIER_BONUS: f64 = 20.0;
    pub const MANAGER_TIER_BONUS: f64 = 10.0;
    pub const HEALTH_BONUS: f64 = 15.0;
    pub const CAPABILITY_BONUS_PER_TAG: f64 = 2.0;
    pub const CAPABILITY_BONUS_CAP: f64 = 20.0;
    pub const PRIORITY_BONUS: f64 = 10.0;
    /// Orchestrations at or above this priority (numerically at or below) earn [`PRIORITY_BONUS`]
    pub const PRIORITY_BONUS_CUTOFF: u8 = 2;
    pub const IDLE_BONUS: f64 = 5.0;
    /// Minimum executors granted to any orchestration
    pub const MIN_EXECUTORS_PER_ALLOCATION: usize = 2;
}

/// Priority levels
pub mod priority {
    pub const HIGHEST: u8 = 1;
    pub const LOWEST: u8 = 5;
    pub const DEFAULT: u8 = 3;
    pub const LEVELS: usize = 5;
}

/// Estimated system load factors applied to average executor utilization
pub mod load {
    pub const CPU_FACTOR: f64 = 0.8;
    pub const MEMORY_FACTOR: f64 = 0.6;
}
