//! HS-011: Stack lifecycle runner. Submit, poll to a terminal state, resolve outputs.
//!
//! One run is one task. Preconditions are checked before any remote call;
//! after that every outcome (rejection, failure, timeout, abort) is reported
//! in the [`RunResult`] rather than as an error.

use super::api::{
    classify, Observation, OrchestrationApi, RemoteStatus, StackAction, StackRequest,
};
use super::trail::{RunState, Trail, TrailRecord};
use crate::connection::profile::ConnectionProfile;
use crate::core::resolver::ResolvedParameters;
use crate::core::types::Bundle;
use crate::error::{ApiError, RunError};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;
pub const DEFAULT_MAX_POLL_FAILURES: u32 = 3;
/// Floor for the poll interval; a run never polls more often than this.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// What to do and how patiently.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub stack_name: String,
    pub action: StackAction,
    pub poll_interval: Duration,
    /// `None` waits indefinitely.
    pub timeout: Option<Duration>,
    /// Consecutive poll errors tolerated before the run fails.
    pub max_poll_failures: u32,
    /// Receives each trail record as it happens.
    pub progress: Option<UnboundedSender<TrailRecord>>,
}

impl RunOptions {
    pub fn new(stack_name: &str, action: StackAction) -> Self {
        Self {
            stack_name: stack_name.to_string(),
            action,
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            timeout: None,
            max_poll_failures: DEFAULT_MAX_POLL_FAILURES,
            progress: None,
        }
    }

    /// Values below one second are raised to one second.
    pub fn with_poll_interval_secs(mut self, secs: u64) -> Self {
        self.poll_interval = Duration::from_secs(secs).max(MIN_POLL_INTERVAL);
        self
    }

    /// Interval actually slept between polls.
    pub fn effective_poll_interval(&self) -> Duration {
        self.poll_interval.max(MIN_POLL_INTERVAL)
    }

    /// Zero or negative disables the timeout.
    pub fn with_timeout_secs(mut self, secs: i64) -> Self {
        self.timeout = u64::try_from(secs)
            .ok()
            .filter(|s| *s > 0)
            .map(Duration::from_secs);
        self
    }

    pub fn with_max_poll_failures(mut self, n: u32) -> Self {
        self.max_poll_failures = n;
        self
    }

    /// Stream trail records to `sender`. The stream closes when the run ends
    /// and these options are dropped.
    pub fn with_progress(mut self, sender: UnboundedSender<TrailRecord>) -> Self {
        self.progress = Some(sender);
        self
    }
}

/// Build outcome reported to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BuildStatus {
    Success,
    Failure,
    Unstable,
    Aborted,
}

impl fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Success => "SUCCESS",
            Self::Failure => "FAILURE",
            Self::Unstable => "UNSTABLE",
            Self::Aborted => "ABORTED",
        };
        write!(f, "{}", s)
    }
}

/// A declared output after the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum OutputValue {
    Resolved(String),
    Missing,
}

impl OutputValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Resolved(v) => Some(v),
            Self::Missing => None,
        }
    }
}

/// Outcome of a run.
#[derive(Debug, Clone)]
pub struct RunResult {
    pub status: BuildStatus,
    pub state: RunState,
    pub reason: String,
    /// Declared outputs; empty unless a create or update succeeded.
    pub outputs: BTreeMap<String, OutputValue>,
    pub trail: Trail,
}

impl RunResult {
    fn finish(trail: Trail, status: BuildStatus, reason: String) -> Self {
        info!(run = trail.run_id(), %status, reason = %reason, "run finished");
        Self {
            status,
            state: trail.state(),
            reason,
            outputs: BTreeMap::new(),
            trail,
        }
    }
}

/// Run one lifecycle action against the orchestration service.
///
/// Fails only on precondition errors, before any remote call.
pub async fn run(
    api: &dyn OrchestrationApi,
    bundle: &Bundle,
    profile: &ConnectionProfile,
    params: &ResolvedParameters,
    options: &RunOptions,
    abort: &CancellationToken,
) -> Result<RunResult, RunError> {
    profile.validate()?;
    params.ensure_resolved_for(bundle)?;

    let stack = options.stack_name.as_str();
    let mut trail = Trail::new(stack);
    if let Some(sender) = &options.progress {
        trail.stream_to(sender.clone());
    }
    info!(
        run = trail.run_id(),
        stack,
        action = %options.action,
        template = %bundle.name,
        fingerprint = %bundle.fingerprint,
        "starting run"
    );

    let mut result = drive(api, bundle, params, options, abort, trail).await;
    result.trail.close_stream();
    Ok(result)
}

/// Submit, poll and resolve outputs. Every outcome ends up in the result.
async fn drive(
    api: &dyn OrchestrationApi,
    bundle: &Bundle,
    params: &ResolvedParameters,
    options: &RunOptions,
    abort: &CancellationToken,
    mut trail: Trail,
) -> RunResult {
    let stack = options.stack_name.as_str();

    if abort.is_cancelled() {
        trail.transition(RunState::Aborted, "aborted before submission");
        return RunResult::finish(
            trail,
            BuildStatus::Aborted,
            "aborted before submission".to_string(),
        );
    }

    if let Err(e) = submit(api, bundle, params, options).await {
        let reason = format!("{} {} rejected: {}", options.action, stack, e);
        trail.transition(RunState::Failed, &reason);
        return RunResult::finish(trail, BuildStatus::Failure, reason);
    }
    trail.transition(RunState::InProgress, "submitted");

    let (state, reason) = poll(api, options, abort, &mut trail).await;
    trail.transition(state, &reason);

    let mut result = match state {
        RunState::Complete => RunResult::finish(trail, BuildStatus::Success, reason),
        RunState::TimedOut => RunResult::finish(trail, BuildStatus::Unstable, reason),
        RunState::Aborted => RunResult::finish(trail, BuildStatus::Aborted, reason),
        _ => RunResult::finish(trail, BuildStatus::Failure, reason),
    };

    if result.status == BuildStatus::Success && options.action != StackAction::Delete {
        resolve_outputs(api, bundle, stack, &mut result).await;
    }
    result
}

async fn submit(
    api: &dyn OrchestrationApi,
    bundle: &Bundle,
    params: &ResolvedParameters,
    options: &RunOptions,
) -> Result<(), ApiError> {
    match options.action {
        StackAction::Create => {
            api.create_stack(&StackRequest::new(&options.stack_name, bundle, params))
                .await
        }
        StackAction::Update => {
            api.update_stack(&StackRequest::new(&options.stack_name, bundle, params))
                .await
        }
        StackAction::Delete => api.delete_stack(&options.stack_name).await,
    }
}

/// Poll until a terminal state. Returns the state and its reason.
async fn poll(
    api: &dyn OrchestrationApi,
    options: &RunOptions,
    abort: &CancellationToken,
    trail: &mut Trail,
) -> (RunState, String) {
    let stack = options.stack_name.as_str();
    let started = Instant::now();
    let mut consecutive_failures = 0u32;

    loop {
        if abort.is_cancelled() {
            return (RunState::Aborted, "aborted while waiting".to_string());
        }
        if let Some(limit) = options.timeout {
            if started.elapsed() >= limit {
                return (
                    RunState::TimedOut,
                    format!(
                        "{} {} timed out after {}s",
                        options.action,
                        stack,
                        limit.as_secs()
                    ),
                );
            }
        }

        let status = match api.stack_status(stack).await {
            Ok(status) => Ok(status),
            Err(ApiError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        };
        match status {
            Ok(status) => {
                consecutive_failures = 0;
                match &status {
                    Some(s) => trail.observe(&s.status, &s.reason),
                    None => trail.stack_missing(),
                }
                let terminal = match classify(options.action, status.as_ref()) {
                    Observation::Pending => None,
                    Observation::Complete => Some(RunState::Complete),
                    Observation::Failed => Some(RunState::Failed),
                    Observation::RolledBack => Some(RunState::RollbackComplete),
                };
                if let Some(state) = terminal {
                    return (state, describe(status.as_ref(), stack));
                }
            }
            Err(e) => {
                consecutive_failures += 1;
                trail.poll_failed(&e.to_string(), consecutive_failures);
                if consecutive_failures > options.max_poll_failures {
                    return (
                        RunState::Failed,
                        format!(
                            "status of {} unavailable after {} consecutive failures: {}",
                            stack, consecutive_failures, e
                        ),
                    );
                }
            }
        }

        tokio::select! {
            _ = abort.cancelled() => {}
            _ = tokio::time::sleep(options.effective_poll_interval()) => {}
        }
    }
}

fn describe(status: Option<&RemoteStatus>, stack: &str) -> String {
    match status {
        Some(s) if s.reason.is_empty() => s.status.clone(),
        Some(s) => format!("{}: {}", s.status, s.reason),
        None => format!("stack {} not found", stack),
    }
}

/// Fetch remote outputs once and map every declared output.
async fn resolve_outputs(
    api: &dyn OrchestrationApi,
    bundle: &Bundle,
    stack: &str,
    result: &mut RunResult,
) {
    match api.stack_outputs(stack).await {
        Ok(mut remote) => {
            result.outputs = bundle
                .outputs
                .keys()
                .map(|name| {
                    let value = remote
                        .remove(name)
                        .map_or(OutputValue::Missing, OutputValue::Resolved);
                    (name.clone(), value)
                })
                .collect();
        }
        Err(e) => {
            result.trail.outputs_unavailable(&e.to_string());
            result.status = BuildStatus::Unstable;
            result.reason = format!("{}; outputs unavailable: {}", result.reason, e);
        }
    }
}
