use serde::{Deserialize, Serialize};

/// Events that can trigger orchestration state transitions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OrchestrationEvent {
    /// Resources granted to a pending orchestration
    Admit,
    /// Resources re-granted to a suspended orchestration
    Resume,
    /// Pause a running orchestration
    Suspend,
    /// Cancel a non-terminal orchestration (modelled as suspension)
    Cancel,
    /// All required members succeeded
    Complete,
    /// A member failed, with the failure reason
    Fail(String),
}

impl OrchestrationEvent {
    /// Get a string representation of the event type for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Admit => "admit",
            Self::Resume => "resume",
            Self::Suspend => "suspend",
            Self::Cancel => "cancel",
            Self::Complete => "complete",
            Self::Fail(_) => "fail",
        }
    }

    /// Extract error message if this is a failure event
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Fail(msg) => Some(msg),
            _ => None,
        }
    }
}
