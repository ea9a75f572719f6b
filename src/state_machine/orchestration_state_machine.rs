use tracing::debug;

use super::{
    errors::{StateMachineError, StateMachineResult},
    events::OrchestrationEvent,
    states::OrchestrationState,
};

/// Transition table for orchestration lifecycle management
///
/// Stateless; callers hold the current state on the orchestration record and
/// ask the machine where an event leads.
#[derive(Debug, Clone, Copy, Default)]
pub struct OrchestrationStateMachine;

impl OrchestrationStateMachine {
    /// Determine the target state based on current state and event
    pub fn determine_target_state(
        current_state: OrchestrationState,
        event: &OrchestrationEvent,
    ) -> StateMachineResult<OrchestrationState> {
        let target = match (current_state, event) {
            (OrchestrationState::Pending, OrchestrationEvent::Admit) => OrchestrationState::Running,
            (OrchestrationState::Suspended, OrchestrationEvent::Resume) => {
                OrchestrationState::Running
            }

            (OrchestrationState::Running, OrchestrationEvent::Suspend) => {
                OrchestrationState::Suspended
            }

            (OrchestrationState::Pending, OrchestrationEvent::Cancel) => {
                OrchestrationState::Suspended
            }
            (OrchestrationState::Running, OrchestrationEvent::Cancel) => {
                OrchestrationState::Suspended
            }
            // withdraws a suspended orchestration from any pending resume
            (OrchestrationState::Suspended, OrchestrationEvent::Cancel) => {
                OrchestrationState::Suspended
            }

            (OrchestrationState::Running, OrchestrationEvent::Complete) => {
                OrchestrationState::Completed
            }
            (OrchestrationState::Running, OrchestrationEvent::Fail(_)) => {
                OrchestrationState::Failed
            }

            (from_state, _) => return Err(StateMachineError::invalid(from_state, event)),
        };

        debug!(
            from = %current_state,
            to = %target,
            event = event.event_type(),
            "STATE_MACHINE: transition accepted"
        );

        Ok(target)
    }

    /// Apply an event to a state in place
    pub fn transition(
        state: &mut OrchestrationState,
        event: &OrchestrationEvent,
    ) -> StateMachineResult<OrchestrationState> {
        let target = Self::determine_target_state(*state, event)?;
        *state = target;
        Ok(target)
    }
}
