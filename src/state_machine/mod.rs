// State machine module for orchestration lifecycle management
//
// Orchestrations move pending -> running -> {completed | failed | suspended};
// suspended orchestrations may be resumed back to running. Completed and
// failed are terminal.

pub mod errors;
pub mod events;
pub mod orchestration_state_machine;
pub mod states;

pub use errors::{StateMachineError, StateMachineResult};
pub use events::OrchestrationEvent;
pub use orchestration_state_machine::OrchestrationStateMachine;
pub use states::OrchestrationState;
