//! HS-010: Run trail, an ordered, timestamped diagnostic record of one run.
//!
//! Every record is also emitted as a `tracing` event. The trail renders as
//! JSON lines so a host can replay it into its own build log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

/// Lifecycle state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Submitting,
    InProgress,
    Complete,
    Failed,
    RollbackComplete,
    TimedOut,
    Aborted,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Submitting | Self::InProgress)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Submitting => "SUBMITTING",
            Self::InProgress => "IN_PROGRESS",
            Self::Complete => "COMPLETE",
            Self::Failed => "FAILED",
            Self::RollbackComplete => "ROLLBACK_COMPLETE",
            Self::TimedOut => "TIMED_OUT",
            Self::Aborted => "ABORTED",
        };
        write!(f, "{}", s)
    }
}

/// One thing that happened during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TrailEvent {
    StateChanged {
        from: RunState,
        to: RunState,
        reason: String,
    },
    RemoteStatus {
        status: String,
        reason: String,
    },
    StackMissing,
    PollFailed {
        error: String,
        consecutive: u32,
    },
    OutputsUnavailable {
        error: String,
    },
}

impl fmt::Display for TrailEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StateChanged { from, to, reason } => {
                write!(f, "{} -> {}: {}", from, to, reason)
            }
            Self::RemoteStatus { status, reason } if reason.is_empty() => {
                write!(f, "{}", status)
            }
            Self::RemoteStatus { status, reason } => write!(f, "{}: {}", status, reason),
            Self::StackMissing => write!(f, "stack not found"),
            Self::PollFailed { error, consecutive } => {
                write!(f, "poll failed ({} in a row): {}", consecutive, error)
            }
            Self::OutputsUnavailable { error } => write!(f, "outputs unavailable: {}", error),
        }
    }
}

/// A trail event with its wall-clock time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrailRecord {
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub event: TrailEvent,
}

/// Diagnostic trail of a single run.
#[derive(Debug, Clone)]
pub struct Trail {
    run_id: String,
    stack: String,
    state: RunState,
    last_remote: Option<(String, String)>,
    records: Vec<TrailRecord>,
    progress: Option<UnboundedSender<TrailRecord>>,
}

impl Trail {
    pub fn new(stack: &str) -> Self {
        Self {
            run_id: generate_run_id(),
            stack: stack.to_string(),
            state: RunState::Submitting,
            last_remote: None,
            records: Vec::new(),
            progress: None,
        }
    }

    /// Also send every new record to `sender` as it is appended.
    pub fn stream_to(&mut self, sender: UnboundedSender<TrailRecord>) {
        self.progress = Some(sender);
    }

    /// Stop streaming; the receiver sees the channel close once all
    /// other senders are gone.
    pub fn close_stream(&mut self) {
        self.progress = None;
    }

    pub fn stack(&self) -> &str {
        &self.stack
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn records(&self) -> &[TrailRecord] {
        &self.records
    }

    /// Move to a new state. Transitions out of a terminal state are ignored.
    pub fn transition(&mut self, to: RunState, reason: &str) {
        if self.state.is_terminal() || self.state == to {
            return;
        }
        let from = self.state;
        self.state = to;
        info!(run = %self.run_id, stack = %self.stack, %from, %to, reason, "state changed");
        self.push(TrailEvent::StateChanged {
            from,
            to,
            reason: reason.to_string(),
        });
    }

    /// Record a remote status, once per change.
    pub fn observe(&mut self, status: &str, reason: &str) {
        let current = (status.to_string(), reason.to_string());
        if self.last_remote.as_ref() == Some(&current) {
            return;
        }
        debug!(run = %self.run_id, stack = %self.stack, status, reason, "remote status");
        self.last_remote = Some(current);
        self.push(TrailEvent::RemoteStatus {
            status: status.to_string(),
            reason: reason.to_string(),
        });
    }

    pub fn stack_missing(&mut self) {
        debug!(run = %self.run_id, stack = %self.stack, "stack not found");
        self.last_remote = None;
        self.push(TrailEvent::StackMissing);
    }

    pub fn poll_failed(&mut self, error: &str, consecutive: u32) {
        warn!(run = %self.run_id, stack = %self.stack, error, consecutive, "status poll failed");
        self.push(TrailEvent::PollFailed {
            error: error.to_string(),
            consecutive,
        });
    }

    pub fn outputs_unavailable(&mut self, error: &str) {
        warn!(run = %self.run_id, stack = %self.stack, error, "stack outputs unavailable");
        self.push(TrailEvent::OutputsUnavailable {
            error: error.to_string(),
        });
    }

    /// Render as JSON lines, one record per line.
    pub fn to_jsonl(&self) -> String {
        let mut out = String::new();
        for record in &self.records {
            // TrailRecord has only string, enum and timestamp fields
            if let Ok(line) = serde_json::to_string(record) {
                out.push_str(&line);
                out.push('\n');
            }
        }
        out
    }

    fn push(&mut self, event: TrailEvent) {
        let record = TrailRecord {
            at: Utc::now(),
            event,
        };
        if let Some(progress) = &self.progress {
            // a dropped receiver only means nobody is watching
            let _ = progress.send(record.clone());
        }
        self.records.push(record);
    }
}

/// Generate a run ID.
pub fn generate_run_id() -> String {
    let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default() as u64;
    format!("r-{:012x}", nanos & 0xFFFF_FFFF_FFFF)
}
