//! Routes parsed commands to their effects and renders result text.

use super::command::Command;
use super::download::{file_name_from_url, Downloader};
use super::launcher::Launcher;
use super::parse::{expand_env, quote_arg};
use super::runner::{shell_display, ProcessOutput, ProcessRunner};
use crate::chat::ChatView;
use rcmd_common::{MachineId, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Terminal status of one dispatched command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExecutionStatus {
    Ok,
    Fail,
}

impl ExecutionStatus {
    fn tag(self) -> &'static str {
        match self {
            ExecutionStatus::Ok => "[OK]",
            ExecutionStatus::Fail => "[FAIL]",
        }
    }

    /// Status of a rendered result text, if it carries a tag.
    pub fn of_text(text: &str) -> Option<ExecutionStatus> {
        let text = text.trim_start();
        if text.starts_with(ExecutionStatus::Ok.tag()) {
            Some(ExecutionStatus::Ok)
        } else if text.starts_with(ExecutionStatus::Fail.tag()) {
            Some(ExecutionStatus::Fail)
        } else {
            None
        }
    }
}

/// Outcome of one command, rendered into the machine's `result` slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    pub status: ExecutionStatus,
    pub elapsed: Duration,
    pub body: String,
}

impl ExecutionResult {
    pub fn ok(elapsed: Duration, body: impl Into<String>) -> Self {
        Self {
            status: ExecutionStatus::Ok,
            elapsed,
            body: body.into(),
        }
    }

    pub fn fail(elapsed: Duration, message: impl Into<String>) -> Self {
        Self {
            status: ExecutionStatus::Fail,
            elapsed,
            body: message.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == ExecutionStatus::Ok
    }
}

impl std::fmt::Display for ExecutionResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} Took: {:.1}s\n{}",
            self.status.tag(),
            self.elapsed.as_secs_f64(),
            self.body
        )
    }
}

/// Executes commands on behalf of one machine.
pub struct Dispatcher<L> {
    machine_id: MachineId,
    launcher: L,
    chat: Arc<dyn ChatView>,
    runner: ProcessRunner,
    downloader: Downloader,
}

impl<L: Launcher> Dispatcher<L> {
    pub fn new(machine_id: MachineId, launcher: L, chat: Arc<dyn ChatView>) -> Self {
        Self {
            machine_id,
            launcher,
            chat,
            runner: ProcessRunner::default(),
            downloader: Downloader::default(),
        }
    }

    pub fn with_runner(mut self, runner: ProcessRunner) -> Self {
        self.runner = runner;
        self
    }

    pub fn with_downloader(mut self, downloader: Downloader) -> Self {
        self.downloader = downloader;
        self
    }

    pub fn launcher(&self) -> &L {
        &self.launcher
    }

    /// Parse and run one raw line. Never fails: errors become a `FAIL`
    /// result carrying the error message.
    pub fn execute(&self, raw: &str, working_dir: &Path) -> ExecutionResult {
        let started = Instant::now();
        let outcome = Command::parse(raw).and_then(|command| {
            debug!(verb = command.verb(), "dispatching");
            self.dispatch(&command, working_dir)
        });
        match outcome {
            Ok(body) => ExecutionResult::ok(started.elapsed(), body),
            Err(err) => ExecutionResult::fail(started.elapsed(), err.to_string()),
        }
    }

    /// Perform the effect of `command` and describe it.
    pub fn dispatch(&self, command: &Command, working_dir: &Path) -> Result<String> {
        let wd = working_dir.display();
        match command {
            Command::FileManager => {
                self.launcher.file_manager(working_dir)?;
                Ok(format!("Проводник открыт.\nWD: {}", wd))
            }
            Command::TextEditor => {
                self.launcher.text_editor(working_dir)?;
                Ok(format!("Блокнот открыт.\nWD: {}", wd))
            }
            Command::OpenUrl { url } => {
                self.launcher.open_url(url)?;
                Ok(format!("Открыт URL: {}\nWD: {}", url, wd))
            }
            Command::OpenChat { room } => {
                let room = room.as_deref().unwrap_or(self.machine_id.as_str());
                self.chat.open_room(room)?;
                Ok(format!("Открыт чат room='{}' на агенте.\nWD: {}", room, wd))
            }
            Command::Download { url, dest } => {
                let dest = match dest {
                    Some(raw) => resolve_path(working_dir, &expand_env(raw)),
                    None => working_dir.join(file_name_from_url(url)),
                };
                let bytes = self.downloader.download(url, &dest)?;
                Ok(format!(
                    "Файл скачан: {}\nРазмер: {} байт\nWD: {}",
                    dest.display(),
                    bytes,
                    wd
                ))
            }
            Command::Install { program, args } => {
                let program = expand_env(program);
                let output = self.runner.run(&program, args, working_dir)?;
                let shown_args: Vec<String> = args.iter().map(|a| quote_arg(a)).collect();
                let display = format!("Запуск: \"{}\" {}", program, shown_args.join(" "));
                Ok(process_body(display.trim_end(), &output, working_dir, &self.runner))
            }
            Command::Run { line } | Command::Shell { line } => {
                let output = self.runner.shell(line, working_dir)?;
                Ok(process_body(&shell_display(line), &output, working_dir, &self.runner))
            }
        }
    }
}

fn resolve_path(working_dir: &Path, raw: &str) -> PathBuf {
    let path = PathBuf::from(raw);
    if path.is_absolute() {
        path
    } else {
        working_dir.join(path)
    }
}

fn process_body(
    display: &str,
    output: &ProcessOutput,
    working_dir: &Path,
    runner: &ProcessRunner,
) -> String {
    let mut body = format!(
        "{}\nExitCode={}\nWD: {}\n---OUT---\n{}\n---ERR---\n{}",
        display,
        output.exit_code,
        working_dir.display(),
        output.stdout,
        output.stderr
    );
    if output.truncated {
        body.push_str(&format!(
            "\n[output truncated at {} bytes per stream]",
            runner.max_output_bytes()
        ));
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::{ChatRooms, RoomOpen};
    use crate::exec::launcher::{LaunchRequest, RecordingLauncher};
    use crate::store::MemoryStore;

    fn dispatcher() -> (Dispatcher<RecordingLauncher>, Arc<ChatRooms<MemoryStore>>) {
        let id = MachineId::new("m1").unwrap();
        let chat = Arc::new(ChatRooms::new(MemoryStore::new(), id.clone()));
        (
            Dispatcher::new(id, RecordingLauncher::new(), chat.clone()),
            chat,
        )
    }

    #[test]
    fn test_render_ok_and_fail() {
        let ok = ExecutionResult::ok(Duration::from_millis(1240), "done");
        assert_eq!(ok.to_string(), "[OK] Took: 1.2s\ndone");

        let fail = ExecutionResult::fail(Duration::ZERO, "boom");
        assert_eq!(fail.to_string(), "[FAIL] Took: 0.0s\nboom");
    }

    #[test]
    fn test_status_of_text() {
        assert_eq!(ExecutionStatus::of_text("[OK] Took: 0.1s\nx"), Some(ExecutionStatus::Ok));
        assert_eq!(ExecutionStatus::of_text("[FAIL] Took: 0.1s"), Some(ExecutionStatus::Fail));
        assert_eq!(ExecutionStatus::of_text("Ошибка: store down"), None);
    }

    #[test]
    fn test_explorer_uses_launcher() {
        let (d, _) = dispatcher();
        let wd = std::env::temp_dir();
        let result = d.execute("Explorer", &wd);

        assert!(result.is_ok());
        assert!(result.body.starts_with("Проводник открыт."));
        assert!(result.body.contains(&format!("WD: {}", wd.display())));
        assert_eq!(d.launcher().requests(), vec![LaunchRequest::FileManager(wd)]);
    }

    #[test]
    fn test_open_url() {
        let (d, _) = dispatcher();
        let result = d.execute("open_url https://example.com/x", &std::env::temp_dir());
        assert!(result.body.starts_with("Открыт URL: https://example.com/x"));
    }

    #[test]
    fn test_launch_failure_is_fail_result() {
        let id = MachineId::new("m1").unwrap();
        let chat = Arc::new(ChatRooms::new(MemoryStore::new(), id.clone()));
        let d = Dispatcher::new(id, RecordingLauncher::failing(), chat);

        let result = d.execute("notepad", &std::env::temp_dir());
        assert_eq!(result.status, ExecutionStatus::Fail);
        assert!(result.body.contains("failed to launch"));
    }

    #[test]
    fn test_malformed_is_fail_result() {
        let (d, _) = dispatcher();
        let result = d.execute("download", &std::env::temp_dir());
        assert_eq!(result.status, ExecutionStatus::Fail);
        assert!(result.body.contains("download <url> [dest]"));
    }

    #[test]
    fn test_open_chat_defaults_to_machine_room_and_is_idempotent() {
        let (d, chat) = dispatcher();
        let wd = std::env::temp_dir();

        let first = d.execute("open_chat", &wd);
        assert!(first.body.starts_with("Открыт чат room='m1' на агенте."));
        d.execute("open_chat roomA", &wd);
        d.execute("open_chat roomA", &wd);

        assert_eq!(chat.open_rooms(), vec!["m1".to_string(), "roomA".to_string()]);
        assert_eq!(chat.open_room("roomA").unwrap(), RoomOpen::Activated);
        chat.close_all();
    }

    #[cfg(unix)]
    #[test]
    fn test_shell_fallback_captures_output() {
        let (d, _) = dispatcher();
        let wd = std::env::temp_dir();
        let result = d.execute("echo hi", &wd);

        assert!(result.is_ok());
        assert!(result.body.starts_with("sh -c echo hi\nExitCode=0\n"));
        assert!(result.body.contains("---OUT---\nhi\n"));
    }

    #[cfg(unix)]
    #[test]
    fn test_run_nonzero_exit_is_still_ok() {
        let (d, _) = dispatcher();
        let result = d.execute("run exit 7", &std::env::temp_dir());
        assert!(result.is_ok());
        assert!(result.body.contains("ExitCode=7"));
    }

    #[cfg(unix)]
    #[test]
    fn test_install_missing_program_fails() {
        let (d, _) = dispatcher();
        let result = d.execute("install /no/such/setup.sh --quiet", &std::env::temp_dir());
        assert_eq!(result.status, ExecutionStatus::Fail);
        assert!(result.body.contains("/no/such/setup.sh"));
    }

    #[cfg(unix)]
    #[test]
    fn test_install_runs_with_args() {
        let (d, _) = dispatcher();
        let result = d.execute(r#"install /bin/echo "a b" c"#, &std::env::temp_dir());
        assert!(result.is_ok());
        assert!(result.body.starts_with("Запуск: \"/bin/echo\" \"a b\" c\nExitCode=0"));
        assert!(result.body.contains("---OUT---\na b c\n"));
    }

    #[test]
    fn test_resolve_path() {
        let wd = Path::new("/work");
        assert_eq!(resolve_path(wd, "a/b.bin"), PathBuf::from("/work/a/b.bin"));
        #[cfg(unix)]
        assert_eq!(resolve_path(wd, "/abs/b.bin"), PathBuf::from("/abs/b.bin"));
    }
}
