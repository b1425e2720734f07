//! Child process execution with captured, size-capped output.
//!
//! The runner blocks until the child exits. Stdout and stderr are drained
//! on their own scoped threads so a chatty child cannot fill one pipe while
//! we wait on the other. Bytes beyond the cap are read and discarded so the
//! child never stalls on a full pipe; `truncated` records that it happened.

use std::io::Read;
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, trace, warn};

/// Default cap per captured stream (1 MiB).
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 1024 * 1024;

/// Errors from starting or waiting on a child process.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// The process could not be started (missing executable, permissions).
    #[error("failed to launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error while waiting for child: {0}")]
    Io(#[from] std::io::Error),
}

impl From<RunnerError> for rcmd_common::Error {
    fn from(err: RunnerError) -> Self {
        match err {
            RunnerError::Launch { program, source } => rcmd_common::Error::LaunchFailure {
                program,
                reason: source.to_string(),
            },
            RunnerError::Io(e) => rcmd_common::Error::Io(e),
        }
    }
}

/// Captured result of a finished child.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    /// Exit code; on Unix a signal death is reported as `128 + signal`.
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    /// Whether either stream exceeded the cap.
    pub truncated: bool,
    pub duration: Duration,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Synchronous process runner.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    max_output_bytes: usize,
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_OUTPUT_BYTES)
    }
}

impl ProcessRunner {
    pub fn new(max_output_bytes: usize) -> Self {
        Self { max_output_bytes }
    }

    pub fn max_output_bytes(&self) -> usize {
        self.max_output_bytes
    }

    /// Run `file` with `args` in `working_dir` and wait for it.
    ///
    /// A nonzero exit is a normal `Ok` result; only failure to start is an
    /// error.
    pub fn run(
        &self,
        file: &str,
        args: &[String],
        working_dir: &Path,
    ) -> Result<ProcessOutput, RunnerError> {
        let mut command = Command::new(file);
        command.args(args);
        self.execute(file, command, working_dir)
    }

    /// Run a raw line through the platform shell.
    pub fn shell(&self, line: &str, working_dir: &Path) -> Result<ProcessOutput, RunnerError> {
        let (program, command) = shell_command(line);
        self.execute(program, command, working_dir)
    }

    fn execute(
        &self,
        program: &str,
        mut command: Command,
        working_dir: &Path,
    ) -> Result<ProcessOutput, RunnerError> {
        debug!(program, working_dir = %working_dir.display(), "spawning child");
        let start = Instant::now();

        let mut child = command
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| {
                warn!(program, error = %source, "failed to spawn");
                RunnerError::Launch {
                    program: program.to_string(),
                    source,
                }
            })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let cap = self.max_output_bytes;

        let ((out, out_truncated), (err, err_truncated)) = thread::scope(|s| {
            let out_handle = s.spawn(move || drain(stdout, cap));
            let err_handle = s.spawn(move || drain(stderr, cap));
            (
                out_handle.join().unwrap_or_default(),
                err_handle.join().unwrap_or_default(),
            )
        });

        let status = child.wait()?;
        let exit_code = exit_code(status);
        let duration = start.elapsed();
        trace!(program, exit_code, duration_ms = duration.as_millis() as u64, "child exited");

        Ok(ProcessOutput {
            exit_code,
            stdout: String::from_utf8_lossy(&out).into_owned(),
            stderr: String::from_utf8_lossy(&err).into_owned(),
            truncated: out_truncated || err_truncated,
            duration,
        })
    }
}

/// How a shell line is shown back to the operator.
pub fn shell_display(line: &str) -> String {
    if cfg!(windows) {
        format!("cmd /c {}", line)
    } else {
        format!("sh -c {}", line)
    }
}

#[cfg(windows)]
fn shell_command(line: &str) -> (&'static str, Command) {
    use std::os::windows::process::CommandExt;
    const CREATE_NO_WINDOW: u32 = 0x0800_0000;

    let mut command = Command::new("cmd.exe");
    // cmd.exe does its own parsing; pass the line through untouched.
    command.raw_arg("/c").raw_arg(line).creation_flags(CREATE_NO_WINDOW);
    ("cmd.exe", command)
}

#[cfg(not(windows))]
fn shell_command(line: &str) -> (&'static str, Command) {
    let mut command = Command::new("sh");
    command.arg("-c").arg(line);
    ("sh", command)
}

fn drain<R: Read>(stream: Option<R>, cap: usize) -> (Vec<u8>, bool) {
    let Some(mut stream) = stream else {
        return (Vec::new(), false);
    };
    let mut buf = Vec::with_capacity(cap.min(64 * 1024));
    let mut chunk = [0u8; 8192];
    let mut truncated = false;

    loop {
        match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                let space = cap.saturating_sub(buf.len());
                if n > space {
                    truncated = true;
                }
                buf.extend_from_slice(&chunk[..n.min(space)]);
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(_) => break,
        }
    }
    (buf, truncated)
}

#[cfg(unix)]
fn exit_code(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .or_else(|| status.signal().map(|sig| 128 + sig))
        .unwrap_or(-1)
}

#[cfg(not(unix))]
fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}
