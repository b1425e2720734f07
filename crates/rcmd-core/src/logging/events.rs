//! Structured event names and stages for logging.
//!
//! Every event carries the run id and machine id so that agent and operator
//! logs from different hosts can be correlated by command.

use serde::{Deserialize, Serialize};

/// Phases of the relay protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Startup and configuration.
    Init,
    /// Agent writes `lastSeen`.
    Heartbeat,
    /// Agent reads the `cmd` slot.
    Poll,
    /// Agent executes a command.
    Dispatch,
    /// Agent writes `result` and clears `cmd`.
    Report,
    /// Agent sleeps after a loop-level failure.
    Backoff,
    /// Operator computes the online set.
    Liveness,
    /// Operator writes `cmd` and polls `result`.
    Submit,
    /// Auxiliary chat stream.
    Chat,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::Init => "init",
            Stage::Heartbeat => "heartbeat",
            Stage::Poll => "poll",
            Stage::Dispatch => "dispatch",
            Stage::Report => "report",
            Stage::Backoff => "backoff",
            Stage::Liveness => "liveness",
            Stage::Submit => "submit",
            Stage::Chat => "chat",
        };
        write!(f, "{}", s)
    }
}

/// Standard event names used in logging.
pub mod event_names {
    // Agent lifecycle
    pub const AGENT_STARTED: &str = "agent.started";
    pub const AGENT_STOPPED: &str = "agent.stopped";

    // Agent cycle
    pub const HEARTBEAT_FAILED: &str = "heartbeat.failed";
    pub const COMMAND_RECEIVED: &str = "command.received";
    pub const COMMAND_FINISHED: &str = "command.finished";
    pub const RESULT_WRITTEN: &str = "result.written";
    pub const LOOP_BACKOFF: &str = "loop.backoff";

    // Operator side
    pub const MACHINES_REFRESHED: &str = "machines.refreshed";
    pub const COMMAND_SUBMITTED: &str = "command.submitted";
    pub const RESULT_RECEIVED: &str = "result.received";
    pub const RESULT_TIMEOUT: &str = "result.timeout";

    // Chat
    pub const CHAT_ROOM_OPENED: &str = "chat.room_opened";
    pub const CHAT_MESSAGE: &str = "chat.message";

    // Config/init events
    pub const CONFIG_LOADED: &str = "config.loaded";
}

/// Correlation fields attached to every event.
#[derive(Debug, Clone)]
pub struct LogContext {
    /// Unique ID for this invocation.
    pub run_id: String,
    /// Machine the events concern (own id on agents, target id on operators).
    pub machine_id: String,
}

impl LogContext {
    pub fn new(run_id: impl Into<String>, machine_id: impl Into<String>) -> Self {
        LogContext {
            run_id: run_id.into(),
            machine_id: machine_id.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_display_matches_serde() {
        for stage in [Stage::Heartbeat, Stage::Dispatch, Stage::Submit] {
            let json = serde_json::to_string(&stage).unwrap();
            assert_eq!(json, format!("\"{}\"", stage));
        }
    }

    #[test]
    fn test_log_context() {
        let ctx = LogContext::new("run-abc", "m1");
        assert_eq!(ctx.run_id, "run-abc");
        assert_eq!(ctx.machine_id, "m1");
    }
}
