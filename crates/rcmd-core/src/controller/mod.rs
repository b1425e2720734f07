//! Operator-side logic: who is online, and command submission.

pub mod liveness;
pub mod submit;

pub use liveness::{
    online_machines, parse_timestamp, LivenessMonitor, MachineRecord, Selection,
};
pub use submit::{PollHandle, SubmitOutcome, Submitter};
