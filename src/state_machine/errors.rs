use thiserror::Error;

use super::events::OrchestrationEvent;
use super::states::OrchestrationState;

/// Error types for orchestration state machine operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StateMachineError {
    #[error("Invalid state transition from {from} on event {event}")]
    InvalidTransition {
        from: OrchestrationState,
        event: String,
    },

    #[error("Orchestration is in terminal state {state}")]
    Terminal { state: OrchestrationState },
}

impl StateMachineError {
    pub fn invalid(from: OrchestrationState, event: &OrchestrationEvent) -> Self {
        if from.is_terminal() {
            Self::Terminal { state: from }
        } else {
            Self::InvalidTransition {
                from,
                event: event.event_type().to_string(),
            }
        }
    }
}

pub type StateMachineResult<T> = Result<T, StateMachineError>;
