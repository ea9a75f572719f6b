//! # Allocation Models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::orchestration::OrchestrationId;

/// A three-dimensional capacity figure (available, required or held)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CapacitySnapshot {
    pub executors: usize,
    pub memory_mb: u64,
    pub cpu_percent: f64,
}

impl CapacitySnapshot {
    pub fn new(executors: usize, memory_mb: u64, cpu_percent: f64) -> Self {
        Self {
            executors,
            memory_mb,
            cpu_percent,
        }
    }

    /// `self - other` per dimension, never below zero
    pub fn saturating_sub(&self, other: &CapacitySnapshot) -> Self {
        Self {
            executors: self.executors.saturating_sub(other.executors),
            memory_mb: self.memory_mb.saturating_sub(other.memory_mb),
            cpu_percent: (self.cpu_percent - other.cpu_percent).max(0.0),
        }
    }

    pub fn add(&self, other: &CapacitySnapshot) -> Self {
        Self {
            executors: self.executors + other.executors,
            memory_mb: self.memory_mb + other.memory_mb,
            cpu_percent: self.cpu_percent + other.cpu_percent,
        }
    }
}

impl fmt::Display for CapacitySnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} executors / {}MB / {:.1}% CPU",
            self.executors, self.memory_mb, self.cpu_percent
        )
    }
}

/// Resources granted to one admitted orchestration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceAllocation {
    pub orchestration_id: OrchestrationId,
    /// Executors granted, in selection order
    pub executor_ids: Vec<String>,
    pub memory_mb: u64,
    pub cpu_percent: f64,
    /// Priority-derived weight on the effective resource share
    pub priority_multiplier: f64,
    /// Work items added to each granted executor at admission
    pub work_items_per_executor: u32,
    pub allocated_at: DateTime<Utc>,
    /// Set when the holding orchestration is suspended; released capacity no longer counts as held
    pub released_at: Option<DateTime<Utc>>,
}

impl ResourceAllocation {
    pub fn is_active(&self) -> bool {
        self.released_at.is_none()
    }

    /// Capacity this allocation holds against the ledger
    pub fn held(&self) -> CapacitySnapshot {
        if self.is_active() {
            CapacitySnapshot::new(self.executor_ids.len(), self.memory_mb, self.cpu_percent)
        } else {
            CapacitySnapshot::default()
        }
    }
}
