//! Configuration validation errors and semantic validation.

use crate::settings::Settings;
use thiserror::Error;

/// Validation result type.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Configuration validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

impl ValidationError {
    fn invalid(field: &str, message: impl Into<String>) -> Self {
        ValidationError::InvalidValue {
            field: field.to_string(),
            message: message.into(),
        }
    }

    /// Error code for structured error reporting.
    pub fn code(&self) -> u32 {
        match self {
            ValidationError::InvalidValue { .. } => 11,
        }
    }
}

/// Validate settings semantically.
pub fn validate_settings(settings: &Settings) -> ValidationResult<()> {
    let url = settings.store.url.trim();
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(ValidationError::invalid(
            "store.url",
            format!("expected an http(s) URL, got {:?}", url),
        ));
    }

    positive("store.request_timeout_secs", settings.store.request_timeout_secs)?;
    positive("agent.poll_interval_secs", settings.agent.poll_interval_secs)?;
    positive("agent.backoff_secs", settings.agent.backoff_secs)?;
    positive(
        "controller.online_timeout_secs",
        settings.controller.online_timeout_secs,
    )?;
    positive(
        "controller.refresh_interval_secs",
        settings.controller.refresh_interval_secs,
    )?;
    positive(
        "controller.poll_interval_secs",
        settings.controller.poll_interval_secs,
    )?;
    positive(
        "controller.poll_attempts",
        u64::from(settings.controller.poll_attempts),
    )?;
    positive(
        "runner.max_output_bytes",
        settings.runner.max_output_bytes as u64,
    )?;

    Ok(())
}

fn positive(field: &str, value: u64) -> ValidationResult<()> {
    if value == 0 {
        return Err(ValidationError::invalid(field, "must be greater than zero"));
    }
    Ok(())
}
