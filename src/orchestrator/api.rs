//! HS-009: Orchestration API contract and remote status classification.
//!
//! The transport (HTTP client, token handling) lives outside this crate;
//! implementations plug in through [`OrchestrationApi`].

use crate::core::resolver::ResolvedParameters;
use crate::core::types::Bundle;
use crate::error::ApiError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Lifecycle operation requested for a stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum StackAction {
    Create,
    Update,
    Delete,
}

impl fmt::Display for StackAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "CREATE"),
            Self::Update => write!(f, "UPDATE"),
            Self::Delete => write!(f, "DELETE"),
        }
    }
}

/// Everything needed to create or update a stack.
#[derive(Debug, Clone)]
pub struct StackRequest {
    pub stack_name: String,
    pub template_name: String,
    pub template: String,
    pub parameters: ResolvedParameters,
}

impl StackRequest {
    pub fn new(stack_name: &str, bundle: &Bundle, parameters: &ResolvedParameters) -> Self {
        Self {
            stack_name: stack_name.to_string(),
            template_name: bundle.name.clone(),
            template: bundle.source.clone(),
            parameters: parameters.clone(),
        }
    }
}

/// Status reported by the orchestration service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteStatus {
    pub status: String,
    #[serde(default)]
    pub reason: String,
}

impl RemoteStatus {
    pub fn new(status: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            reason: reason.into(),
        }
    }
}

/// Remote orchestration service.
#[async_trait]
pub trait OrchestrationApi: Send + Sync {
    async fn create_stack(&self, request: &StackRequest) -> Result<(), ApiError>;

    async fn update_stack(&self, request: &StackRequest) -> Result<(), ApiError>;

    async fn delete_stack(&self, stack_name: &str) -> Result<(), ApiError>;

    /// Current status; `None` when the stack does not exist.
    async fn stack_status(&self, stack_name: &str) -> Result<Option<RemoteStatus>, ApiError>;

    async fn stack_outputs(&self, stack_name: &str) -> Result<BTreeMap<String, String>, ApiError>;

    /// Authenticate and return without touching any stack.
    async fn check_connection(&self) -> Result<(), ApiError>;
}

/// What a single status observation means for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    Pending,
    Complete,
    Failed,
    RolledBack,
}

/// Classify a remote status for the requested action.
///
/// Statuses compare case-insensitively. A `*_COMPLETE` belonging to a
/// different action (e.g. the previous `CREATE_COMPLETE` seen while an
/// update starts) is still pending.
pub fn classify(action: StackAction, status: Option<&RemoteStatus>) -> Observation {
    let Some(status) = status else {
        return match action {
            StackAction::Delete => Observation::Complete,
            StackAction::Create | StackAction::Update => Observation::Failed,
        };
    };

    let status = status.status.trim().to_ascii_uppercase();
    if status.ends_with("ROLLBACK_COMPLETE") {
        Observation::RolledBack
    } else if status.ends_with("_FAILED") {
        Observation::Failed
    } else if status == format!("{}_COMPLETE", action) {
        Observation::Complete
    } else {
        Observation::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn st(s: &str) -> RemoteStatus {
        RemoteStatus::new(s, "")
    }

    #[test]
    fn test_hs009_action_display() {
        assert_eq!(StackAction::Create.to_string(), "CREATE");
        assert_eq!(StackAction::Delete.to_string(), "DELETE");
    }

    #[test]
    fn test_hs009_in_progress_is_pending() {
        assert_eq!(
            classify(StackAction::Create, Some(&st("CREATE_IN_PROGRESS"))),
            Observation::Pending
        );
        assert_eq!(
            classify(StackAction::Update, Some(&st("ROLLBACK_IN_PROGRESS"))),
            Observation::Pending
        );
    }

    #[test]
    fn test_hs009_completion_matches_action() {
        assert_eq!(
            classify(StackAction::Create, Some(&st("CREATE_COMPLETE"))),
            Observation::Complete
        );
        assert_eq!(
            classify(StackAction::Update, Some(&st("UPDATE_COMPLETE"))),
            Observation::Complete
        );
        assert_eq!(
            classify(StackAction::Update, Some(&st("CREATE_COMPLETE"))),
            Observation::Pending
        );
    }

    #[test]
    fn test_hs009_lowercase_status() {
        assert_eq!(
            classify(StackAction::Create, Some(&st("create_complete"))),
            Observation::Complete
        );
    }

    #[test]
    fn test_hs009_failures_and_rollback() {
        assert_eq!(
            classify(StackAction::Create, Some(&st("CREATE_FAILED"))),
            Observation::Failed
        );
        assert_eq!(
            classify(StackAction::Create, Some(&st("ROLLBACK_COMPLETE"))),
            Observation::RolledBack
        );
        assert_eq!(
            classify(StackAction::Update, Some(&st("UPDATE_ROLLBACK_COMPLETE"))),
            Observation::RolledBack
        );
        assert_eq!(
            classify(StackAction::Update, Some(&st("ROLLBACK_FAILED"))),
            Observation::Failed
        );
    }

    #[test]
    fn test_hs009_not_found() {
        assert_eq!(classify(StackAction::Delete, None), Observation::Complete);
        assert_eq!(classify(StackAction::Create, None), Observation::Failed);
        assert_eq!(classify(StackAction::Update, None), Observation::Failed);
    }

    #[test]
    fn test_hs009_delete_complete() {
        assert_eq!(
            classify(StackAction::Delete, Some(&st("DELETE_COMPLETE"))),
            Observation::Complete
        );
        assert_eq!(
            classify(StackAction::Delete, Some(&st("DELETE_IN_PROGRESS"))),
            Observation::Pending
        );
    }
}
