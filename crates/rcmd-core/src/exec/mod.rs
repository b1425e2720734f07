//! Command grammar, dispatch and the OS-facing executors behind it.

pub mod command;
pub mod dispatch;
pub mod download;
pub mod launcher;
pub mod parse;
pub mod runner;

pub use command::Command;
pub use dispatch::{Dispatcher, ExecutionResult, ExecutionStatus};
pub use download::{file_name_from_url, DownloadError, Downloader};
pub use launcher::{HeadlessLauncher, LaunchRequest, Launcher, RecordingLauncher, SystemLauncher};
pub use parse::{expand_env, split_args};
pub use runner::{ProcessOutput, ProcessRunner, RunnerError};
