//! Remote command relay configuration loading and validation.
//!
//! This crate provides:
//! - Typed Rust structs for `rcmd.toml`
//! - Config resolution (CLI → env → XDG → system → defaults)
//! - Semantic validation of intervals, bounds and the store URL

pub mod resolve;
pub mod settings;
pub mod validate;

pub use resolve::{load_settings, resolve_config, ConfigError, ConfigSource, LoadedSettings};
pub use settings::{AgentSettings, ControllerSettings, RunnerSettings, Settings, StoreSettings};
pub use validate::{validate_settings, ValidationError, ValidationResult};

/// Standard config file name.
pub const CONFIG_FILENAME: &str = "rcmd.toml";
