//! Command submission with a bounded wait for the result.
//!
//! The operator writes `cmd` and then polls. A result counts as the answer
//! only once the agent has also cleared `cmd`: the agent writes `result`
//! before clearing, so "cmd empty and result non-empty" means the result
//! belongs to a command the agent finished after ours was written. Without
//! that check the previous command's result would be returned immediately.
//!
//! There are no sequence numbers, so a late result for an older command
//! written by another operator cannot be told apart from ours.

use crate::agent::StopToken;
use crate::log_event;
use crate::logging::{event_names, truncate_for_log, LogContext, Stage};
use crate::store::{paths, Store};
use rcmd_common::{Error, MachineId, Result};
use std::time::Duration;

/// How a wait for a result ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The agent published this result text.
    Completed(String),
    /// No result within the polling bound. The command may still run later.
    Timeout { attempts: u32 },
    /// The operator gave up before the bound.
    Cancelled,
}

impl SubmitOutcome {
    /// Convert a timeout into the operator-facing error.
    pub fn into_result(self, machine: &MachineId) -> Result<Option<String>> {
        match self {
            SubmitOutcome::Completed(text) => Ok(Some(text)),
            SubmitOutcome::Timeout { attempts } => Err(Error::Timeout {
                machine: machine.to_string(),
                attempts,
            }),
            SubmitOutcome::Cancelled => Ok(None),
        }
    }
}

/// Writes commands into machines' mailboxes.
pub struct Submitter<S> {
    store: S,
    ctx: LogContext,
}

impl<S: Store> Submitter<S> {
    pub fn new(store: S, run_id: impl Into<String>) -> Self {
        Submitter {
            store,
            ctx: LogContext::new(run_id, "-"),
        }
    }

    /// Write `line` into `machine`'s `cmd` slot.
    ///
    /// A command still pending in the slot is overwritten; the mailbox holds
    /// one command, not a queue.
    pub fn submit(&self, machine: &MachineId, line: &str) -> Result<PollHandle<'_, S>> {
        let line = line.trim();
        if line.is_empty() {
            return Err(Error::MalformedCommand("empty command".to_string()));
        }

        let ctx = LogContext::new(self.ctx.run_id.clone(), machine.as_str());
        self.store.write_str(&paths::cmd(machine), line)?;
        log_event!(ctx, INFO, event_names::COMMAND_SUBMITTED, Stage::Submit,
            "command submitted", command = %truncate_for_log(line, 200));

        Ok(PollHandle {
            store: &self.store,
            machine: machine.clone(),
            ctx,
        })
    }
}

/// Handle for polling the result of one submission.
pub struct PollHandle<'a, S> {
    store: &'a S,
    machine: MachineId,
    ctx: LogContext,
}

impl<'a, S: Store> PollHandle<'a, S> {
    pub fn machine(&self) -> &MachineId {
        &self.machine
    }

    /// One look at the mailbox: `Some(result)` once the agent has answered.
    pub fn poll_once(&self) -> Result<Option<String>> {
        let cmd = self.store.read_str(&paths::cmd(&self.machine))?;
        if !cmd.trim().is_empty() {
            return Ok(None);
        }
        let result = self.store.read_str(&paths::result(&self.machine))?;
        Ok((!result.trim().is_empty()).then_some(result))
    }

    /// Sleep `interval`, then poll; up to `attempts` times.
    pub fn await_result(
        &self,
        attempts: u32,
        interval: Duration,
        stop: &StopToken,
    ) -> Result<SubmitOutcome> {
        for attempt in 1..=attempts {
            if stop.sleep(interval) {
                return Ok(SubmitOutcome::Cancelled);
            }
            if let Some(result) = self.poll_once()? {
                log_event!(self.ctx, INFO, event_names::RESULT_RECEIVED, Stage::Submit,
                    "result received", attempt = attempt);
                return Ok(SubmitOutcome::Completed(result));
            }
        }

        log_event!(self.ctx, WARN, event_names::RESULT_TIMEOUT, Stage::Submit,
            "no result within polling bound", attempts = attempts);
        Ok(SubmitOutcome::Timeout { attempts })
    }
}
