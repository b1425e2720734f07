//! Exit codes for the `rcmd` CLI.
//!
//! Exit code ranges:
//! - 0-6: operational outcomes (the command ran; read the outcome from the code)
//! - 10-19: user/environment errors (fixable by the operator)
//! - 20-29: internal and transport errors

use rcmd_common::Error;

/// Stable exit codes for automation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    // ========================================================================
    // Operational outcomes (0-6)
    // ========================================================================
    /// Success, or the remote command reported `[OK]`
    Clean = 0,

    /// The remote command reported `[FAIL]`
    RemoteFail = 3,

    /// Wait abandoned by the operator
    Interrupted = 6,

    // ========================================================================
    // User / environment errors (10-19)
    // ========================================================================
    /// Invalid arguments or command line
    ArgsError = 10,

    /// Configuration missing or invalid
    ConfigError = 11,

    /// Store refused the request (rules, auth token)
    StoreRejected = 12,

    /// Target machine is not online
    MachineOffline = 13,

    // ========================================================================
    // Internal / transport errors (20-29)
    // ========================================================================
    /// Internal error (bug - please report)
    InternalError = 20,

    /// I/O error, including an unreachable store
    IoError = 21,

    /// No result within the polling bound
    TimeoutError = 22,
}

impl ExitCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Codes below 10 are outcomes, not errors.
    pub fn is_operational(self) -> bool {
        (self as i32) < 10
    }

    pub fn is_error(self) -> bool {
        (self as i32) >= 10
    }

    /// Name for JSON output.
    pub fn code_name(&self) -> &'static str {
        match self {
            ExitCode::Clean => "OK",
            ExitCode::RemoteFail => "ERR_REMOTE_FAIL",
            ExitCode::Interrupted => "ERR_INTERRUPTED",
            ExitCode::ArgsError => "ERR_ARGS",
            ExitCode::ConfigError => "ERR_CONFIG",
            ExitCode::StoreRejected => "ERR_STORE_REJECTED",
            ExitCode::MachineOffline => "ERR_OFFLINE",
            ExitCode::InternalError => "ERR_INTERNAL",
            ExitCode::IoError => "ERR_IO",
            ExitCode::TimeoutError => "ERR_TIMEOUT",
        }
    }
}

impl From<&Error> for ExitCode {
    fn from(err: &Error) -> Self {
        match err {
            Error::Config(_) => ExitCode::ConfigError,
            Error::StoreUnavailable(_) => ExitCode::IoError,
            Error::StoreRejected { .. } => ExitCode::StoreRejected,
            Error::MalformedCommand(_) => ExitCode::ArgsError,
            Error::LaunchFailure { .. } | Error::DownloadFailure(_) => ExitCode::RemoteFail,
            Error::Timeout { .. } => ExitCode::TimeoutError,
            Error::Io(_) => ExitCode::IoError,
            Error::Json(_) => ExitCode::InternalError,
        }
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.code_name(), self.as_i32())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_outcome_codes() {
        assert_eq!(ExitCode::Clean.as_i32(), 0);
        assert_eq!(ExitCode::RemoteFail.as_i32(), 3);
        assert_eq!(ExitCode::TimeoutError.as_i32(), 22);
    }

    #[test]
    fn test_ranges() {
        assert!(ExitCode::Interrupted.is_operational());
        assert!(ExitCode::ConfigError.is_error());
        assert!(!ExitCode::RemoteFail.is_error());
    }

    #[test]
    fn test_from_error() {
        let timeout = Error::Timeout {
            machine: "m1".into(),
            attempts: 20,
        };
        assert_eq!(ExitCode::from(&timeout), ExitCode::TimeoutError);
        assert_eq!(
            ExitCode::from(&Error::MalformedCommand("x".into())),
            ExitCode::ArgsError
        );
        assert_eq!(
            ExitCode::from(&Error::StoreUnavailable("down".into())),
            ExitCode::IoError
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(ExitCode::TimeoutError.to_string(), "ERR_TIMEOUT (22)");
    }
}
