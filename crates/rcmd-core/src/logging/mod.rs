//! Structured logging foundation for rcmd.
//!
//! Provides dual-mode logging:
//! - Human-readable console output for interactive use
//! - Machine-parseable JSONL for unattended agents
//!
//! # Design Notes
//!
//! - stdout is reserved for command payloads (results, machine lists)
//! - stderr receives all log output (human or JSONL)
//! - Log events include correlation IDs (run_id, machine_id)

pub mod config;
pub mod events;

pub use config::{LogConfig, LogFormat};
pub use events::{event_names, LogContext, Stage};

use std::io::IsTerminal;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Initialize the logging subsystem.
///
/// Must be called once at startup before any logging occurs. A second call
/// (e.g. from tests) is ignored.
pub fn init_logging(config: &LogConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("rcmd_core={},rcmd={}", config.level, config.level))
    });

    let result = match config.format {
        LogFormat::Human => {
            let use_ansi = std::io::stderr().is_terminal();
            let fmt_layer = fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_ansi(use_ansi);
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt_layer)
                .try_init()
        }
        LogFormat::Jsonl => {
            let json_layer = fmt::layer()
                .json()
                .flatten_event(true)
                .with_current_span(false)
                .with_writer(std::io::stderr);
            tracing_subscriber::registry()
                .with(filter)
                .with(json_layer)
                .try_init()
        }
    };

    if let Err(e) = result {
        eprintln!("Warning: logging already initialized: {}", e);
    }
}

/// Generate a unique run ID for this invocation.
pub fn generate_run_id() -> String {
    let uuid = uuid::Uuid::new_v4().simple().to_string();
    format!("run-{}", &uuid[..12])
}

/// Shorten a potentially long string (command line, result body) for logging.
pub fn truncate_for_log(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let head: String = s.chars().take(max_chars).collect();
    format!("{}...(truncated)", head)
}

/// Convenience macro for structured event logging with context.
///
/// Usage:
/// ```ignore
/// log_event!(ctx, INFO, event_names::COMMAND_RECEIVED, Stage::Poll, "command received",
///     command = %line);
/// ```
#[macro_export]
macro_rules! log_event {
    ($ctx:expr, INFO, $event:expr, $stage:expr, $msg:expr $(, $($field:tt)+)?) => {
        tracing::info!(
            event = $event,
            run_id = %$ctx.run_id,
            machine_id = %$ctx.machine_id,
            stage = %$stage,
            $($($field)+,)?
            "{}", $msg
        )
    };
    ($ctx:expr, DEBUG, $event:expr, $stage:expr, $msg:expr $(, $($field:tt)+)?) => {
        tracing::debug!(
            event = $event,
            run_id = %$ctx.run_id,
            machine_id = %$ctx.machine_id,
            stage = %$stage,
            $($($field)+,)?
            "{}", $msg
        )
    };
    ($ctx:expr, WARN, $event:expr, $stage:expr, $msg:expr $(, $($field:tt)+)?) => {
        tracing::warn!(
            event = $event,
            run_id = %$ctx.run_id,
            machine_id = %$ctx.machine_id,
            stage = %$stage,
            $($($field)+,)?
            "{}", $msg
        )
    };
    ($ctx:expr, ERROR, $event:expr, $stage:expr, $msg:expr $(, $($field:tt)+)?) => {
        tracing::error!(
            event = $event,
            run_id = %$ctx.run_id,
            machine_id = %$ctx.machine_id,
            stage = %$stage,
            $($($field)+,)?
            "{}", $msg
        )
    };
}
