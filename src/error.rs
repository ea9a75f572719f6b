//! # Error Handling
//!
//! Typed error taxonomy for the orchestration engine. Admission and state
//! transition failures are returned to callers as values; background loops log
//! and swallow them per iteration.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::config::ConfigurationError;
use crate::models::{CapacitySnapshot, OrchestrationId};
use crate::state_machine::{OrchestrationState, StateMachineError};

/// Why an admission attempt was refused
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum DenialReason {
    /// Required executors, memory or CPU exceed what the ledger can grant
    InsufficientCapacity,
    /// The concurrent-pipeline limit has been reached
    ConcurrencyLimit,
    /// No eligible executor carries a required capability tag
    MissingCapability(String),
    /// Fewer eligible executors than the allocation needs
    NoEligibleExecutors,
    /// Declared dependencies have not all completed
    DependenciesPending,
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InsufficientCapacity => write!(f, "insufficient capacity"),
            Self::ConcurrencyLimit => write!(f, "concurrent pipeline limit reached"),
            Self::MissingCapability(tag) => write!(f, "no eligible executor with capability '{tag}'"),
            Self::NoEligibleExecutors => write!(f, "not enough eligible executors"),
            Self::DependenciesPending => write!(f, "dependencies not yet completed"),
        }
    }
}

/// Engine-wide error type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OrchestrationError {
    #[error("Admission denied ({reason}): required {required}, available {available}")]
    AdmissionDenied {
        reason: DenialReason,
        required: CapacitySnapshot,
        available: CapacitySnapshot,
    },

    #[error("Orchestration not found: {orchestration_id}")]
    OrchestrationNotFound { orchestration_id: OrchestrationId },

    #[error("Invalid state transition from {from} on {event}")]
    InvalidStateTransition {
        from: OrchestrationState,
        event: String,
    },

    #[error("Pipeline {pipeline_id} failed: {reason}")]
    ExecutionFailure { pipeline_id: String, reason: String },

    #[error("Collaborator unavailable ({collaborator}): {message}")]
    CollaboratorUnavailable {
        collaborator: String,
        message: String,
    },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl OrchestrationError {
    pub fn not_found(orchestration_id: OrchestrationId) -> Self {
        Self::OrchestrationNotFound { orchestration_id }
    }

    pub fn is_admission_denied(&self) -> bool {
        matches!(self, Self::AdmissionDenied { .. })
    }
}

impl From<StateMachineError> for OrchestrationError {
    fn from(err: StateMachineError) -> Self {
        match err {
            StateMachineError::InvalidTransition { from, event } => {
                Self::InvalidStateTransition { from, event }
            }
            StateMachineError::Terminal { state } => Self::InvalidStateTransition {
                from: state,
                event: "terminal".to_string(),
            },
        }
    }
}

impl From<ConfigurationError> for OrchestrationError {
    fn from(err: ConfigurationError) -> Self {
        Self::Configuration(err.to_string())
    }
}

pub type OrchestrationResult<T> = std::result::Result<T, OrchestrationError>;
