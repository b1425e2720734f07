//! Remote command relay common types, IDs, and errors.
//!
//! This crate provides foundational types shared across rcmd crates:
//! - Machine identity with case normalization
//! - Common error types with stable codes
//! - Output formats

pub mod error;
pub mod id;
pub mod output;

pub use error::{Error, Result};
pub use id::MachineId;
pub use output::OutputFormat;
