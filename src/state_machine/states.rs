use serde::{Deserialize, Serialize};
use std::fmt;

/// Orchestration lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrchestrationState {
    /// Created and waiting for admission
    #[default]
    Pending,
    /// Admitted; member pipelines are executing
    Running,
    /// Paused with its work-item hold released; may resume
    Suspended,
    /// All required members executed successfully
    Completed,
    /// A member failed or completion criteria were not met
    Failed,
}

impl OrchestrationState {
    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Check if the orchestration currently holds executors
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Running)
    }

    /// Check if the orchestration can be admitted (or re-admitted)
    pub fn is_admissible(&self) -> bool {
        matches!(self, Self::Pending | Self::Suspended)
    }
}

impl fmt::Display for OrchestrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Suspended => write!(f, "suspended"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for OrchestrationState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "suspended" => Ok(Self::Suspended),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid orchestration state: {s}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(OrchestrationState::Completed.is_terminal());
        assert!(OrchestrationState::Failed.is_terminal());
        assert!(!OrchestrationState::Pending.is_terminal());
        assert!(!OrchestrationState::Running.is_terminal());
        assert!(!OrchestrationState::Suspended.is_terminal());
    }

    #[test]
    fn test_admissible_states() {
        assert!(OrchestrationState::Pending.is_admissible());
        assert!(OrchestrationState::Suspended.is_admissible());
        assert!(!OrchestrationState::Running.is_admissible());
        assert!(!OrchestrationState::Failed.is_admissible());
    }

    #[test]
    fn test_state_string_conversion() {
        assert_eq!(OrchestrationState::Suspended.to_string(), "suspended");
        assert_eq!(
            "running".parse::<OrchestrationState>().unwrap(),
            OrchestrationState::Running
        );
        assert!("in_progress".parse::<OrchestrationState>().is_err());
    }

    #[test]
    fn test_state_serde() {
        let json = serde_json::to_string(&OrchestrationState::Completed).unwrap();
        assert_eq!(json, "\"completed\"");
        let parsed: OrchestrationState = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, OrchestrationState::Completed);
    }
}
