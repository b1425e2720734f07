//! Remote command relay over a shared key/value store.
//!
//! - `agent`: machine-side heartbeat / command / result loop
//! - `controller`: operator-side liveness and bounded submission
//! - `exec`: command grammar, dispatcher, process runner, downloader
//! - `store`: store client trait, REST and in-memory backends, watcher
//! - `chat`: auxiliary chat rooms on the same store
//!
//! The binary entry point is in `main.rs`.

pub mod agent;
pub mod chat;
pub mod controller;
pub mod exec;
pub mod exit_codes;
pub mod logging;
pub mod store;

pub use rcmd_common::{Error, MachineId, Result};
