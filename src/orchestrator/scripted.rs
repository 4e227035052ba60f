//! HS-012: Scripted orchestration API, replaying a YAML fixture.
//!
//! Used by `hotstack rehearse` to dry-run a template's lifecycle and by the
//! runner tests. Status steps are consumed one per poll; the last step
//! repeats once the script runs out.
//!
//! ```yaml
//! statuses:
//!   - status: CREATE_IN_PROGRESS
//!   - poll_error: connection reset
//!   - status: CREATE_COMPLETE
//! outputs:
//!   instance_ip: 192.168.1.19
//! ```

use super::api::{OrchestrationApi, RemoteStatus, StackRequest};
use crate::error::ApiError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

/// One scripted answer to a status poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScriptStep {
    Status {
        status: String,
        #[serde(default)]
        reason: String,
    },
    NotFound {
        not_found: bool,
    },
    PollError {
        poll_error: String,
    },
}

impl ScriptStep {
    pub fn status(status: &str) -> Self {
        Self::Status {
            status: status.to_string(),
            reason: String::new(),
        }
    }
}

/// Fixture describing how the remote service behaves.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Script {
    /// Reject the create/update/delete call with this message.
    #[serde(default)]
    pub submit_error: Option<String>,
    /// Fail `check_connection` with this message.
    #[serde(default)]
    pub connection_error: Option<String>,
    #[serde(default)]
    pub statuses: Vec<ScriptStep>,
    #[serde(default)]
    pub outputs: BTreeMap<String, String>,
    /// Fail the outputs fetch with this message.
    #[serde(default)]
    pub outputs_error: Option<String>,
}

impl Script {
    /// Load a script from a YAML file.
    pub fn load(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
        Self::parse(&content).map_err(|e| format!("{}: {}", path.display(), e))
    }

    pub fn parse(yaml: &str) -> Result<Self, String> {
        serde_yaml_ng::from_str(yaml).map_err(|e| format!("invalid script: {}", e))
    }

    pub fn with_statuses(statuses: &[&str]) -> Self {
        Self {
            statuses: statuses.iter().map(|s| ScriptStep::status(s)).collect(),
            ..Self::default()
        }
    }
}

/// A call received by the scripted API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiCall {
    Create { stack: String, template: String },
    Update { stack: String, template: String },
    Delete { stack: String },
    Status { stack: String },
    Outputs { stack: String },
    CheckConnection,
}

/// [`OrchestrationApi`] answering from a [`Script`].
#[derive(Debug)]
pub struct ScriptedApi {
    script: Script,
    cursor: AtomicUsize,
    calls: Mutex<Vec<ApiCall>>,
}

impl ScriptedApi {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            cursor: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Every call received so far, in order.
    pub fn calls(&self) -> Vec<ApiCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn status_polls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, ApiCall::Status { .. }))
            .count()
    }

    fn record(&self, call: ApiCall) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
    }

    fn submitted(&self) -> Result<(), ApiError> {
        match &self.script.submit_error {
            Some(message) => Err(ApiError::Rejected(message.clone())),
            None => Ok(()),
        }
    }

    fn next_step(&self) -> Option<&ScriptStep> {
        let steps = &self.script.statuses;
        if steps.is_empty() {
            return None;
        }
        let i = self.cursor.fetch_add(1, Ordering::SeqCst);
        steps.get(i.min(steps.len() - 1))
    }
}

#[async_trait]
impl OrchestrationApi for ScriptedApi {
    async fn create_stack(&self, request: &StackRequest) -> Result<(), ApiError> {
        self.record(ApiCall::Create {
            stack: request.stack_name.clone(),
            template: request.template_name.clone(),
        });
        self.submitted()
    }

    async fn update_stack(&self, request: &StackRequest) -> Result<(), ApiError> {
        self.record(ApiCall::Update {
            stack: request.stack_name.clone(),
            template: request.template_name.clone(),
        });
        self.submitted()
    }

    async fn delete_stack(&self, stack_name: &str) -> Result<(), ApiError> {
        self.record(ApiCall::Delete {
            stack: stack_name.to_string(),
        });
        self.submitted()
    }

    async fn stack_status(&self, stack_name: &str) -> Result<Option<RemoteStatus>, ApiError> {
        self.record(ApiCall::Status {
            stack: stack_name.to_string(),
        });
        match self.next_step() {
            None => Ok(None),
            Some(ScriptStep::Status { status, reason }) => {
                Ok(Some(RemoteStatus::new(status.as_str(), reason.as_str())))
            }
            Some(ScriptStep::NotFound { not_found: true }) => Ok(None),
            Some(ScriptStep::NotFound { not_found: false }) => Err(ApiError::Other(
                "script step 'not_found: false' carries no status".to_string(),
            )),
            Some(ScriptStep::PollError { poll_error }) => {
                Err(ApiError::Network(poll_error.clone()))
            }
        }
    }

    async fn stack_outputs(&self, stack_name: &str) -> Result<BTreeMap<String, String>, ApiError> {
        self.record(ApiCall::Outputs {
            stack: stack_name.to_string(),
        });
        match &self.script.outputs_error {
            Some(message) => Err(ApiError::Other(message.clone())),
            None => Ok(self.script.outputs.clone()),
        }
    }

    async fn check_connection(&self) -> Result<(), ApiError> {
        self.record(ApiCall::CheckConnection);
        match &self.script.connection_error {
            Some(message) => Err(ApiError::Auth(message.clone())),
            None => Ok(()),
        }
    }
}
