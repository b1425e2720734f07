//! Machine-side agent loop.
//!
//! One cycle is: heartbeat → read `cmd` → (dispatch → write `result` →
//! clear `cmd`). The loop repeats until its [`StopToken`] is stopped, which
//! is checked only between steps; a running command always finishes.
//!
//! The agent is the only writer of `lastSeen`, `result` and the clearing
//! write of `cmd` for its own machine id. The result is written before the
//! command slot is cleared, so an observer never sees an empty `cmd` with a
//! result that is still missing.

pub mod identity;
pub mod stop;

pub use identity::{detect_machine_id, machine_id_from_host};
pub use stop::StopToken;

use crate::exec::{Dispatcher, ExecutionResult, Launcher};
use crate::log_event;
use crate::logging::{event_names, truncate_for_log, LogContext, Stage};
use crate::store::{paths, Store, StoreError};
use chrono::{SecondsFormat, Utc};
use rcmd_common::MachineId;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Loop timing and execution context.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Sleep after every cycle.
    pub poll_interval: Duration,
    /// Sleep after a loop-level failure.
    pub backoff: Duration,
    /// Working directory for every command.
    pub working_dir: PathBuf,
    /// Stop after this many cycles (`None` runs until stopped).
    pub max_cycles: Option<u64>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self::from_settings(&rcmd_config::AgentSettings::default())
    }
}

impl AgentConfig {
    pub fn from_settings(settings: &rcmd_config::AgentSettings) -> Self {
        Self {
            poll_interval: settings.poll_interval(),
            backoff: settings.backoff(),
            working_dir: settings.working_dir(),
            max_cycles: None,
        }
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Result of one cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// No pending command.
    Idle,
    /// A command ran and its result was published.
    Executed(ExecutionResult),
}

/// Counters reported when the loop stops.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AgentStats {
    pub cycles: u64,
    pub executed: u64,
    pub failed: u64,
    pub heartbeat_failures: u64,
    pub store_errors: u64,
}

/// The agent for one machine.
pub struct Agent<S, L> {
    store: S,
    machine_id: MachineId,
    dispatcher: Dispatcher<L>,
    config: AgentConfig,
    stats: AgentStats,
    ctx: LogContext,
}

impl<S: Store, L: Launcher> Agent<S, L> {
    pub fn new(
        store: S,
        machine_id: MachineId,
        dispatcher: Dispatcher<L>,
        config: AgentConfig,
        run_id: impl Into<String>,
    ) -> Self {
        let ctx = LogContext::new(run_id, machine_id.as_str());
        Self {
            store,
            machine_id,
            dispatcher,
            config,
            stats: AgentStats::default(),
            ctx,
        }
    }

    pub fn machine_id(&self) -> &MachineId {
        &self.machine_id
    }

    pub fn stats(&self) -> &AgentStats {
        &self.stats
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Run one Heartbeat → CheckCommand → (Dispatching → Reporting) pass.
    ///
    /// A failed heartbeat is logged and skipped. Any other store failure is
    /// returned; the command slot is then left as it was, so the command is
    /// picked up again on a later cycle.
    pub fn run_cycle(&mut self) -> Result<CycleOutcome, StoreError> {
        self.stats.cycles += 1;

        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        if let Err(e) = self.store.write_str(&paths::last_seen(&self.machine_id), &now) {
            self.stats.heartbeat_failures += 1;
            log_event!(self.ctx, WARN, event_names::HEARTBEAT_FAILED, Stage::Heartbeat,
                "heartbeat write failed", error = %e);
        }

        let cmd_path = paths::cmd(&self.machine_id);
        let raw = self.store.read_str(&cmd_path)?;
        let line = raw.trim();
        if line.is_empty() {
            return Ok(CycleOutcome::Idle);
        }

        log_event!(self.ctx, INFO, event_names::COMMAND_RECEIVED, Stage::Poll,
            "command received", command = %truncate_for_log(line, 200));

        let result = self.dispatcher.execute(line, &self.config.working_dir);
        self.stats.executed += 1;
        if !result.is_ok() {
            self.stats.failed += 1;
        }
        log_event!(self.ctx, INFO, event_names::COMMAND_FINISHED, Stage::Dispatch,
            "command finished",
            status = ?result.status,
            elapsed_ms = result.elapsed.as_millis() as u64);

        // Result first, then clear: never an empty mailbox with no result.
        self.store
            .write_str(&paths::result(&self.machine_id), &result.to_string())?;
        self.store.write_str(&cmd_path, "")?;
        log_event!(self.ctx, DEBUG, event_names::RESULT_WRITTEN, Stage::Report,
            "result written and command cleared");

        Ok(CycleOutcome::Executed(result))
    }

    /// Loop until `stop` is stopped or `max_cycles` is reached.
    pub fn run(&mut self, stop: &StopToken) -> AgentStats {
        log_event!(self.ctx, INFO, event_names::AGENT_STARTED, Stage::Init,
            "agent started",
            working_dir = %self.config.working_dir.display(),
            poll_interval_ms = self.config.poll_interval.as_millis() as u64);

        while !stop.is_stopped() {
            let delay = match self.run_cycle() {
                Ok(_) => self.config.poll_interval,
                Err(e) => {
                    self.stats.store_errors += 1;
                    log_event!(self.ctx, WARN, event_names::LOOP_BACKOFF, Stage::Backoff,
                        "cycle failed, backing off",
                        error = %e,
                        backoff_ms = self.config.backoff.as_millis() as u64);
                    // Best effort: the store may be the thing that failed.
                    let _ = self.store.write_str(
                        &paths::result(&self.machine_id),
                        &format!("Ошибка: {}", e),
                    );
                    self.config.backoff
                }
            };

            if self
                .config
                .max_cycles
                .is_some_and(|max| self.stats.cycles >= max)
            {
                break;
            }
            if stop.sleep(delay) {
                break;
            }
        }

        log_event!(self.ctx, INFO, event_names::AGENT_STOPPED, Stage::Init,
            "agent stopped",
            cycles = self.stats.cycles,
            executed = self.stats.executed,
            failed = self.stats.failed,
            store_errors = self.stats.store_errors);
        self.stats.clone()
    }
}
