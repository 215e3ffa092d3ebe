use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::audit::ActionRecord;
use crate::errors::ErrorKind;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum DenyReason {
    /// Recoverable: the turn suspends until credentials are supplied.
    CredentialsRequired,
    Policy(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum ValidationVerdict {
    Allow,
    Deny { reason: DenyReason },
    AllowWithWarning { reason: String },
}

impl ValidationVerdict {
    pub fn permits_execution(&self) -> bool {
        matches!(self, Self::Allow | Self::AllowWithWarning { .. })
    }

    pub fn warning(&self) -> Option<&str> {
        match self {
            Self::AllowWithWarning { reason } => Some(reason),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    Success { result: Value },
    Failure { kind: ErrorKind, detail: String },
}

impl ExecutionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnState {
    Routing,
    Validating,
    AwaitingCredentials,
    Executing,
    Synthesizing,
    Done,
}

/// What the orchestrator hands back to the transport for one submitted turn.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TurnResult {
    pub response_text: String,
    pub actions_taken: Vec<ActionRecord>,
    pub requires_credentials: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    pub trace: Vec<TurnState>,
}

impl TurnResult {
    pub fn rejected(error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            response_text: format!("I could not process that request: {error}"),
            actions_taken: Vec::new(),
            requires_credentials: false,
            error: Some(error),
            warning: None,
            trace: vec![TurnState::Done],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{DenyReason, TurnResult, ValidationVerdict};

    #[test]
    fn only_allow_variants_permit_execution() {
        assert!(ValidationVerdict::Allow.permits_execution());
        assert!(ValidationVerdict::AllowWithWarning { reason: "broad".into() }.permits_execution());
        assert!(!ValidationVerdict::Deny { reason: DenyReason::CredentialsRequired }
            .permits_execution());
    }

    #[test]
    fn verdict_serializes_with_tagged_reason() {
        let verdict = ValidationVerdict::Deny { reason: DenyReason::CredentialsRequired };
        let json = serde_json::to_value(&verdict).expect("verdict should serialize");
        assert_eq!(json["verdict"], "deny");
        assert_eq!(json["reason"]["reason"], "credentials_required");
    }

    #[test]
    fn rejected_result_carries_error_and_no_actions() {
        let result = TurnResult::rejected("session has ended");
        assert_eq!(result.error.as_deref(), Some("session has ended"));
        assert!(result.actions_taken.is_empty());
        assert!(!result.requires_credentials);
    }
}
