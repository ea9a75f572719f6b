//! # Pipeline Execution Collaborator
//!
//! The engine delegates each member pipeline to a [`PipelineExecutor`] and
//! only observes success, failure and elapsed time. Member reordering for
//! priority-weighted orchestrations is likewise injected via [`MemberOrdering`].

use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;

use crate::error::OrchestrationError;

/// Errors reported by a pipeline execution collaborator
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineExecutionError {
    /// The pipeline ran and failed
    #[error("Pipeline {pipeline_id} failed: {reason}")]
    Failed { pipeline_id: String, reason: String },

    /// The collaborator could not run the pipeline at all
    #[error("Pipeline executor unavailable: {0}")]
    Unavailable(String),
}

impl PipelineExecutionError {
    pub fn failed(pipeline_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Failed {
            pipeline_id: pipeline_id.into(),
            reason: reason.into(),
        }
    }

    pub fn reason(&self) -> String {
        match self {
            Self::Failed { reason, .. } => reason.clone(),
            Self::Unavailable(message) => format!("executor unavailable: {message}"),
        }
    }
}

impl From<PipelineExecutionError> for OrchestrationError {
    fn from(err: PipelineExecutionError) -> Self {
        match err {
            PipelineExecutionError::Failed {
                pipeline_id,
                reason,
            } => OrchestrationError::ExecutionFailure {
                pipeline_id,
                reason,
            },
            PipelineExecutionError::Unavailable(message) => {
                OrchestrationError::CollaboratorUnavailable {
                    collaborator: "pipeline_executor".to_string(),
                    message,
                }
            }
        }
    }
}

/// Runs one member pipeline to completion
#[async_trait]
pub trait PipelineExecutor: Send + Sync {
    async fn execute_pipeline(&self, pipeline_id: &str) -> Result<(), PipelineExecutionError>;

    /// Executor name used in logs
    fn executor_name(&self) -> &'static str {
        "pipeline_executor"
    }
}

/// Accepts every pipeline immediately; used by the runner binary
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPipelineExecutor;

#[async_trait]
impl PipelineExecutor for NoopPipelineExecutor {
    async fn execute_pipeline(&self, pipeline_id: &str) -> Result<(), PipelineExecutionError> {
        tracing::debug!(pipeline_id = %pipeline_id, "NOOP_EXECUTOR: Accepted pipeline");
        Ok(())
    }

    fn executor_name(&self) -> &'static str {
        "noop"
    }
}

/// Orders members of a priority-weighted orchestration.
///
/// Implementations must be deterministic for a given member list: a resumed
/// run continues from its stage counter over the same ordering.
pub trait MemberOrdering: Send + Sync {
    fn order(&self, members: &[String]) -> Vec<String>;
}

/// Keeps the declared member order
#[derive(Debug, Clone, Copy, Default)]
pub struct DeclaredOrder;

impl MemberOrdering for DeclaredOrder {
    fn order(&self, members: &[String]) -> Vec<String> {
        members.to_vec()
    }
}

/// Orders members by an externally supplied relative weight, highest first.
/// Unweighted members sort last; ties keep declared order.
#[derive(Debug, Clone, Default)]
pub struct WeightedOrdering {
    weights: HashMap<String, i64>,
}

impl WeightedOrdering {
    pub fn new(weights: HashMap<String, i64>) -> Self {
        Self { weights }
    }

    pub fn with_weight(mut self, pipeline_id: impl Into<String>, weight: i64) -> Self {
        self.weights.insert(pipeline_id.into(), weight);
        self
    }
}

impl MemberOrdering for WeightedOrdering {
    fn order(&self, members: &[String]) -> Vec<String> {
        let mut ordered = members.to_vec();
        ordered.sort_by_key(|member| {
            std::cmp::Reverse(self.weights.get(member).copied().unwrap_or(i64::MIN))
        });
        ordered
    }
}
