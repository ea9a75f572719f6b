//! # Orchestration Models
//!
//! The `PipelineCoordinationContext` record and the typed metadata that travels
//! with it through admission, execution and rebalancing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

use crate::constants::{cost, priority};
use crate::models::allocation::ResourceAllocation;
use crate::state_machine::OrchestrationState;

/// Orchestration identifier
pub type OrchestrationId = Uuid;

/// Execution strategy applied to an orchestration's member pipelines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinationType {
    /// One member at a time in list order
    Sequential,
    /// All members at once
    Parallel,
    /// A computed subset of members in list order
    Conditional,
    /// Members reordered by an injected ordering, then run one at a time
    PriorityWeighted,
}

impl CoordinationType {
    /// Resource and work-item multiplier for an orchestration of `member_count` pipelines
    pub fn multiplier(&self, member_count: usize) -> usize {
        let members = member_count.max(1);
        match self {
            Self::Sequential => 1,
            Self::Parallel => members,
            Self::Conditional => members.div_ceil(2),
            Self::PriorityWeighted => members.min(cost::PRIORITY_WEIGHTED_MAX_MULTIPLIER),
        }
    }
}

impl fmt::Display for CoordinationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sequential => write!(f, "sequential"),
            Self::Parallel => write!(f, "parallel"),
            Self::Conditional => write!(f, "conditional"),
            Self::PriorityWeighted => write!(f, "priority_weighted"),
        }
    }
}

/// Scheduling priority, 1 (highest) through 5 (lowest)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Priority(u8);

impl Priority {
    pub const HIGHEST: Priority = Priority(priority::HIGHEST);
    pub const LOWEST: Priority = Priority(priority::LOWEST);

    /// Create a priority, rejecting values outside 1..=5
    pub fn new(level: u8) -> Option<Self> {
        (priority::HIGHEST..=priority::LOWEST)
            .contains(&level)
            .then_some(Self(level))
    }

    /// Create a priority, clamping any value into 1..=5
    pub fn clamped(level: i64) -> Self {
        Self(level.clamp(priority::HIGHEST as i64, priority::LOWEST as i64) as u8)
    }

    pub fn get(&self) -> u8 {
        self.0
    }

    /// Zero-based index of this priority's queue bucket
    pub fn bucket_index(&self) -> usize {
        (self.0 - priority::HIGHEST) as usize
    }

    /// Multiplier applied to an allocation's effective resource share
    pub fn allocation_multiplier(&self) -> f64 {
        match self.0 {
            1 => 2.0,
            2 => 1.5,
            3 => 1.0,
            4 => 0.8,
            _ => 0.6,
        }
    }

    /// One level more urgent, saturating at the highest level
    pub fn promoted(&self) -> Self {
        Self::clamped(self.0 as i64 - 1)
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self(priority::DEFAULT)
    }
}

impl TryFrom<u8> for Priority {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value).ok_or_else(|| format!("Priority must be between 1 and 5, got {value}"))
    }
}

impl From<Priority> for u8 {
    fn from(value: Priority) -> Self {
        value.0
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.0)
    }
}

/// Conditions an orchestration must meet to count as completed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionCriteria {
    /// Minimum member pipelines that must have executed successfully
    pub min_completed_members: Option<usize>,
    /// Free-form description for operators
    pub description: Option<String>,
}

/// Per-orchestration replacements for the computed resource requirement
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceOverrides {
    pub executors: Option<usize>,
    pub memory_mb: Option<u64>,
    pub cpu_percent: Option<f64>,
}

/// Optional inputs to `create_pipeline_orchestration`
#[derive(Debug, Clone, Default)]
pub struct OrchestrationOptions {
    /// Declared priority; defaults to 3
    pub priority: Option<u8>,
    pub deadline: Option<DateTime<Utc>>,
    pub business_value: Option<f64>,
    /// Capability tags that must each be covered by at least one granted executor
    pub required_capabilities: Vec<String>,
    /// Orchestrations that must complete before this one is admitted
    pub dependencies: Vec<OrchestrationId>,
    pub completion_criteria: CompletionCriteria,
    pub resource_overrides: Option<ResourceOverrides>,
    pub extensions: HashMap<String, serde_json::Value>,
}

/// Scheduling timestamps tracked across the lifecycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulingTimestamps {
    pub created_at: DateTime<Utc>,
    pub queued_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub last_rebalanced_at: Option<DateTime<Utc>>,
}

impl SchedulingTimestamps {
    pub fn new(created_at: DateTime<Utc>) -> Self {
        Self {
            created_at,
            queued_at: Some(created_at),
            started_at: None,
            finished_at: None,
            last_rebalanced_at: None,
        }
    }
}

/// Who or what requested a suspension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuspensionKind {
    /// Operator or API caller
    Requested,
    /// Resource pressure relief
    Pressure,
    /// Cancellation, modelled as suspension
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuspensionInfo {
    pub kind: SuspensionKind,
    pub suspended_by: String,
    pub reason: Option<String>,
    pub suspended_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureInfo {
    /// Member pipeline that failed, if the failure came from execution
    pub pipeline_id: Option<String>,
    pub reason: String,
    pub failed_at: DateTime<Utc>,
}

/// Status-specific detail recorded on the context
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StatusDetail {
    #[default]
    None,
    Suspended(SuspensionInfo),
    Resumed {
        resumed_by: String,
        resumed_at: DateTime<Utc>,
    },
    Failed(FailureInfo),
    Completed {
        completed_members: usize,
        completed_at: DateTime<Utc>,
    },
}

/// Typed orchestration metadata with an extension map for dynamic fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestrationMetadata {
    /// Current (possibly rebalanced) priority
    pub priority: Priority,
    /// Priority declared at creation; rebalancing recomputes from this
    pub declared_priority: Priority,
    pub deadline: Option<DateTime<Utc>>,
    pub business_value: Option<f64>,
    pub timestamps: SchedulingTimestamps,
    pub detail: StatusDetail,
    pub extensions: HashMap<String, serde_json::Value>,
}

/// The orchestration record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineCoordinationContext {
    pub orchestration_id: OrchestrationId,
    pub name: String,
    pub description: String,
    /// Member pipeline IDs in declared order
    pub member_pipelines: Vec<String>,
    pub coordination_type: CoordinationType,
    /// Members processed so far
    pub current_stage: usize,
    pub total_stages: usize,
    pub required_capabilities: Vec<String>,
    pub resource_overrides: Option<ResourceOverrides>,
    /// Every allocation ever granted, oldest first
    pub allocations: Vec<ResourceAllocation>,
    pub dependencies: Vec<OrchestrationId>,
    pub completion_criteria: CompletionCriteria,
    pub status: OrchestrationState,
    pub metadata: OrchestrationMetadata,
    /// Incremented on every admission; execution runs carry the epoch they started under
    pub run_epoch: u64,
    /// Members that executed successfully in the current run
    pub completed_members: usize,
}

impl PipelineCoordinationContext {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        member_pipelines: Vec<String>,
        coordination_type: CoordinationType,
        priority: Priority,
        options: OrchestrationOptions,
    ) -> Self {
        let now = Utc::now();
        let total_stages = member_pipelines.len();

        Self {
            orchestration_id: Uuid::new_v4(),
            name: name.into(),
            description: description.into(),
            member_pipelines,
            coordination_type,
            current_stage: 0,
            total_stages,
            required_capabilities: options.required_capabilities,
            resource_overrides: options.resource_overrides,
            allocations: Vec::new(),
            dependencies: options.dependencies,
            completion_criteria: options.completion_criteria,
            status: OrchestrationState::Pending,
            metadata: OrchestrationMetadata {
                priority,
                declared_priority: priority,
                deadline: options.deadline,
                business_value: options.business_value,
                timestamps: SchedulingTimestamps::new(now),
                detail: StatusDetail::None,
                extensions: options.extensions,
            },
            run_epoch: 0,
            completed_members: 0,
        }
    }

    pub fn priority(&self) -> Priority {
        self.metadata.priority
    }

    pub fn member_count(&self) -> usize {
        self.member_pipelines.len()
    }
}
