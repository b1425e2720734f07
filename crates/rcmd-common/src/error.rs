//! Error types for the remote command relay.
//!
//! This module provides structured error handling with:
//! - Stable error codes for machine parsing
//! - Category classification for error grouping
//! - Recoverability hints for automation
//! - Remediation suggestions for humans
//!
//! # Human-Facing Output
//!
//! ```text
//! ✗ Store Unavailable
//!   Reason: store unavailable: connection refused
//!   Fix: Check network connectivity and the [store] url in rcmd.toml.
//! ```
//!
//! # Machine-Facing Output
//!
//! ```json
//! {
//!   "code": 20,
//!   "category": "store",
//!   "message": "store unavailable: connection refused",
//!   "recoverable": true
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Result type alias for relay operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Configuration file errors.
    Config,
    /// Shared store connectivity and protocol errors.
    Store,
    /// Command grammar errors.
    Command,
    /// Process launch and download errors on the agent.
    Execution,
    /// Operator-side submission outcomes.
    Operator,
    /// File I/O and serialization errors.
    Io,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Config => write!(f, "config"),
            ErrorCategory::Store => write!(f, "store"),
            ErrorCategory::Command => write!(f, "command"),
            ErrorCategory::Execution => write!(f, "execution"),
            ErrorCategory::Operator => write!(f, "operator"),
            ErrorCategory::Io => write!(f, "io"),
        }
    }
}

/// Unified error type for the relay.
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors (10-19)
    #[error("configuration error: {0}")]
    Config(String),

    // Store errors (20-29)
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("store rejected request for {path}: HTTP {status}")]
    StoreRejected { path: String, status: u16 },

    // Command errors (30-39)
    #[error("malformed command: {0}")]
    MalformedCommand(String),

    // Execution errors (40-49)
    #[error("failed to launch {program}: {reason}")]
    LaunchFailure { program: String, reason: String },

    #[error("download failed: {0}")]
    DownloadFailure(String),

    // Operator errors (50-59)
    #[error("no result from {machine} after {attempts} polls")]
    Timeout { machine: String, attempts: u32 },

    // I/O errors (60-69)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns the error code for this error type.
    ///
    /// Error codes are stable and grouped by category:
    /// - 10-19: Configuration errors
    /// - 20-29: Store errors
    /// - 30-39: Command errors
    /// - 40-49: Execution errors
    /// - 50-59: Operator errors
    /// - 60-69: I/O errors
    pub fn code(&self) -> u32 {
        match self {
            Error::Config(_) => 10,
            Error::StoreUnavailable(_) => 20,
            Error::StoreRejected { .. } => 21,
            Error::MalformedCommand(_) => 30,
            Error::LaunchFailure { .. } => 40,
            Error::DownloadFailure(_) => 41,
            Error::Timeout { .. } => 50,
            Error::Io(_) => 60,
            Error::Json(_) => 61,
        }
    }

    /// Returns the error category for grouping and filtering.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Config(_) => ErrorCategory::Config,
            Error::StoreUnavailable(_) | Error::StoreRejected { .. } => ErrorCategory::Store,
            Error::MalformedCommand(_) => ErrorCategory::Command,
            Error::LaunchFailure { .. } | Error::DownloadFailure(_) => ErrorCategory::Execution,
            Error::Timeout { .. } => ErrorCategory::Operator,
            Error::Io(_) | Error::Json(_) => ErrorCategory::Io,
        }
    }

    /// Returns whether this error is potentially recoverable by retrying.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Error::Config(_) => false,
            // Transient: the agent loop backs off and retries
            Error::StoreUnavailable(_) => true,
            Error::StoreRejected { status, .. } => *status >= 500,
            Error::MalformedCommand(_) => false,
            Error::LaunchFailure { .. } => false,
            Error::DownloadFailure(_) => true,
            // The command may still complete later
            Error::Timeout { .. } => true,
            Error::Io(_) => true,
            Error::Json(_) => false,
        }
    }

    /// Returns a human-readable remediation hint.
    pub fn remediation(&self) -> &'static str {
        match self {
            Error::Config(_) => "Run 'rcmd config check' and fix the reported keys in rcmd.toml.",
            Error::StoreUnavailable(_) => {
                "Check network connectivity and the [store] url in rcmd.toml."
            }
            Error::StoreRejected { .. } => {
                "Check the store rules and the [store] auth_token; the path may not be writable."
            }
            Error::MalformedCommand(_) => {
                "Check the command syntax, e.g. 'download <url> [dest]' or 'install <path> [args]'."
            }
            Error::LaunchFailure { .. } => {
                "Verify the executable exists on the agent and is permitted to run."
            }
            Error::DownloadFailure(_) => {
                "Verify the URL is reachable from the agent and the destination is writable."
            }
            Error::Timeout { .. } => {
                "The agent may be offline or still busy. Check 'rcmd machines' and poll again later."
            }
            Error::Io(_) => "Check disk space and permissions, then retry the operation.",
            Error::Json(_) => "The store returned unexpected data; inspect the path manually.",
        }
    }

    /// Returns a short headline for human-readable output.
    pub fn headline(&self) -> &'static str {
        match self {
            Error::Config(_) => "Configuration Error",
            Error::StoreUnavailable(_) => "Store Unavailable",
            Error::StoreRejected { .. } => "Store Rejected Request",
            Error::MalformedCommand(_) => "Malformed Command",
            Error::LaunchFailure { .. } => "Launch Failure",
            Error::DownloadFailure(_) => "Download Failure",
            Error::Timeout { .. } => "No Response",
            Error::Io(_) => "I/O Error",
            Error::Json(_) => "JSON Parse Error",
        }
    }
}

/// Structured error response for JSON output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredError {
    /// Stable error code.
    pub code: u32,

    /// Error category for grouping.
    pub category: ErrorCategory,

    /// Human-readable error message.
    pub message: String,

    /// Whether the error is potentially recoverable.
    pub recoverable: bool,

    /// Additional structured context (e.g., machine, path).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, serde_json::Value>,
}

impl From<&Error> for StructuredError {
    fn from(err: &Error) -> Self {
        let mut context = HashMap::new();

        match err {
            Error::StoreRejected { path, status } => {
                context.insert("path".to_string(), serde_json::json!(path));
                context.insert("status".to_string(), serde_json::json!(status));
            }
            Error::LaunchFailure { program, .. } => {
                context.insert("program".to_string(), serde_json::json!(program));
            }
            Error::Timeout { machine, attempts } => {
                context.insert("machine".to_string(), serde_json::json!(machine));
                context.insert("attempts".to_string(), serde_json::json!(attempts));
            }
            _ => {}
        }

        StructuredError {
            code: err.code(),
            category: err.category(),
            message: err.to_string(),
            recoverable: err.is_recoverable(),
            context,
        }
    }
}

impl StructuredError {
    /// Add additional context to the error.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.context.insert(key.into(), v);
        }
        self
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(r#"{{"code":{},"error":"serialization_failed"}}"#, self.code)
        })
    }
}

/// Format an error for human-readable stderr output.
///
/// Output format:
/// ```text
/// ✗ [Headline]
///   Reason: [Error message]
///   Fix: [Remediation hint]
/// ```
pub fn format_error_human(err: &Error, use_color: bool) -> String {
    let (red, cyan, reset) = if use_color {
        ("\x1b[31m", "\x1b[36m", "\x1b[0m")
    } else {
        ("", "", "")
    };

    format!(
        "{red}✗{reset} {headline}\n  Reason: {message}\n  {cyan}Fix:{reset} {remediation}",
        red = red,
        cyan = cyan,
        reset = reset,
        headline = err.headline(),
        message = err,
        remediation = err.remediation()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code() {
        assert_eq!(Error::Config("test".into()).code(), 10);
        assert_eq!(Error::StoreUnavailable("down".into()).code(), 20);
        assert_eq!(Error::MalformedCommand("x".into()).code(), 30);
        assert_eq!(
            Error::Timeout {
                machine: "m1".into(),
                attempts: 20
            }
            .code(),
            50
        );
    }

    #[test]
    fn test_error_category() {
        assert_eq!(
            Error::StoreRejected {
                path: "machines".into(),
                status: 401
            }
            .category(),
            ErrorCategory::Store
        );
        assert_eq!(
            Error::DownloadFailure("404".into()).category(),
            ErrorCategory::Execution
        );
        assert_eq!(
            Error::MalformedCommand("x".into()).category(),
            ErrorCategory::Command
        );
    }

    #[test]
    fn test_error_recoverable() {
        assert!(Error::StoreUnavailable("down".into()).is_recoverable());
        assert!(!Error::MalformedCommand("x".into()).is_recoverable());
        assert!(!Error::StoreRejected {
            path: "p".into(),
            status: 403
        }
        .is_recoverable());
        assert!(Error::StoreRejected {
            path: "p".into(),
            status: 503
        }
        .is_recoverable());
    }

    #[test]
    fn test_structured_error_from_timeout() {
        let err = Error::Timeout {
            machine: "m1".into(),
            attempts: 20,
        };
        let structured = StructuredError::from(&err);

        assert_eq!(structured.code, 50);
        assert_eq!(structured.category, ErrorCategory::Operator);
        assert!(structured.recoverable);
        assert_eq!(structured.context.get("machine"), Some(&serde_json::json!("m1")));
        assert_eq!(structured.context.get("attempts"), Some(&serde_json::json!(20)));
    }

    #[test]
    fn test_structured_error_json() {
        let err = Error::LaunchFailure {
            program: "missing.exe".into(),
            reason: "not found".into(),
        };
        let json = StructuredError::from(&err)
            .with_context("machine", "m1")
            .to_json();

        assert!(json.contains(r#""code":40"#));
        assert!(json.contains(r#""category":"execution""#));
        assert!(json.contains(r#""recoverable":false"#));
        assert!(json.contains(r#""machine":"m1""#));
    }

    #[test]
    fn test_format_error_human() {
        let err = Error::StoreUnavailable("connection refused".into());
        let formatted = format_error_human(&err, false);

        assert!(formatted.contains("Store Unavailable"));
        assert!(formatted.contains("store unavailable: connection refused"));
        assert!(formatted.contains("rcmd.toml"));
    }

    #[test]
    fn test_error_category_display() {
        assert_eq!(ErrorCategory::Store.to_string(), "store");
        assert_eq!(ErrorCategory::Operator.to_string(), "operator");
    }
}
