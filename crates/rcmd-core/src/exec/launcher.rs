//! Fire-and-forget desktop actions: file manager, text editor, URL handler.

use super::runner::RunnerError;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Desktop actions the dispatcher can trigger on the agent's machine.
pub trait Launcher: Send + Sync {
    /// Open the platform file browser.
    fn file_manager(&self, working_dir: &Path) -> Result<(), RunnerError>;

    /// Open the platform text editor.
    fn text_editor(&self, working_dir: &Path) -> Result<(), RunnerError>;

    /// Open `url` in the default handler.
    fn open_url(&self, url: &str) -> Result<(), RunnerError>;
}

/// Launches real programs, detached from our stdio.
#[derive(Debug, Clone, Default)]
pub struct SystemLauncher;

impl SystemLauncher {
    fn spawn_detached(program: &str, args: &[&str]) -> Result<(), RunnerError> {
        debug!(program, ?args, "launching detached");
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| RunnerError::Launch {
                program: program.to_string(),
                source,
            })?;
        // Reap in the background so the exited launcher does not linger.
        std::thread::spawn(move || {
            let _ = child.wait();
        });
        Ok(())
    }

    /// Scratch file opened by the editor action on non-Windows hosts.
    #[cfg_attr(windows, allow(dead_code))]
    fn scratch_note(working_dir: &Path) -> Result<PathBuf, RunnerError> {
        let note = working_dir.join("note.txt");
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&note)?;
        Ok(note)
    }

    /// Program and arguments that hand `url` to the Windows protocol
    /// handler. cmd.exe is avoided: it would split the URL at `&`.
    #[cfg_attr(not(windows), allow(dead_code))]
    fn windows_url_handler(url: &str) -> (&'static str, [&str; 2]) {
        ("rundll32.exe", ["url.dll,FileProtocolHandler", url])
    }
}

#[cfg(windows)]
impl Launcher for SystemLauncher {
    fn file_manager(&self, _working_dir: &Path) -> Result<(), RunnerError> {
        Self::spawn_detached("explorer.exe", &[])
    }

    fn text_editor(&self, _working_dir: &Path) -> Result<(), RunnerError> {
        Self::spawn_detached("notepad.exe", &[])
    }

    fn open_url(&self, url: &str) -> Result<(), RunnerError> {
        let (program, args) = Self::windows_url_handler(url);
        Self::spawn_detached(program, &args)
    }
}

#[cfg(target_os = "macos")]
impl Launcher for SystemLauncher {
    fn file_manager(&self, working_dir: &Path) -> Result<(), RunnerError> {
        Self::spawn_detached("open", &[&working_dir.to_string_lossy()])
    }

    fn text_editor(&self, working_dir: &Path) -> Result<(), RunnerError> {
        let note = Self::scratch_note(working_dir)?;
        Self::spawn_detached("open", &["-e", &note.to_string_lossy()])
    }

    fn open_url(&self, url: &str) -> Result<(), RunnerError> {
        Self::spawn_detached("open", &[url])
    }
}

#[cfg(not(any(windows, target_os = "macos")))]
impl Launcher for SystemLauncher {
    fn file_manager(&self, working_dir: &Path) -> Result<(), RunnerError> {
        Self::spawn_detached("xdg-open", &[&working_dir.to_string_lossy()])
    }

    fn text_editor(&self, working_dir: &Path) -> Result<(), RunnerError> {
        let note = Self::scratch_note(working_dir)?;
        Self::spawn_detached("xdg-open", &[&note.to_string_lossy()])
    }

    fn open_url(&self, url: &str) -> Result<(), RunnerError> {
        Self::spawn_detached("xdg-open", &[url])
    }
}

/// Launcher for agents without a desktop session: every action fails, so
/// the operator gets a `FAIL` result instead of a claim that something opened.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeadlessLauncher;

impl HeadlessLauncher {
    fn refuse(program: &str) -> Result<(), RunnerError> {
        Err(RunnerError::Launch {
            program: program.to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no desktop session"),
        })
    }
}

impl Launcher for HeadlessLauncher {
    fn file_manager(&self, _working_dir: &Path) -> Result<(), RunnerError> {
        Self::refuse("file manager")
    }

    fn text_editor(&self, _working_dir: &Path) -> Result<(), RunnerError> {
        Self::refuse("text editor")
    }

    fn open_url(&self, _url: &str) -> Result<(), RunnerError> {
        Self::refuse("url handler")
    }
}

/// A desktop action as seen by [`RecordingLauncher`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchRequest {
    FileManager(PathBuf),
    TextEditor(PathBuf),
    OpenUrl(String),
}

/// Test double that records requests instead of starting programs.
#[derive(Debug, Clone, Default)]
pub struct RecordingLauncher {
    requests: Arc<Mutex<Vec<LaunchRequest>>>,
    fail: bool,
}

impl RecordingLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// A launcher whose every action fails to start.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn requests(&self) -> Vec<LaunchRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    fn record(&self, request: LaunchRequest, program: &str) -> Result<(), RunnerError> {
        if self.fail {
            return HeadlessLauncher::refuse(program);
        }
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }
        Ok(())
    }
}

impl Launcher for RecordingLauncher {
    fn file_manager(&self, working_dir: &Path) -> Result<(), RunnerError> {
        self.record(LaunchRequest::FileManager(working_dir.to_path_buf()), "file manager")
    }

    fn text_editor(&self, working_dir: &Path) -> Result<(), RunnerError> {
        self.record(LaunchRequest::TextEditor(working_dir.to_path_buf()), "text editor")
    }

    fn open_url(&self, url: &str) -> Result<(), RunnerError> {
        self.record(LaunchRequest::OpenUrl(url.to_string()), "url handler")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_launcher_records_in_order() {
        let launcher = RecordingLauncher::new();
        let other = launcher.clone();
        launcher.file_manager(Path::new("/tmp")).unwrap();
        other.open_url("https://example.com").unwrap();

        assert_eq!(
            launcher.requests(),
            vec![
                LaunchRequest::FileManager(PathBuf::from("/tmp")),
                LaunchRequest::OpenUrl("https://example.com".into()),
            ]
        );
    }

    #[test]
    fn test_failing_launcher() {
        let launcher = RecordingLauncher::failing();
        let err = launcher.text_editor(Path::new("/tmp")).unwrap_err();
        assert!(matches!(err, RunnerError::Launch { .. }));
        assert!(launcher.requests().is_empty());
    }

    #[test]
    fn test_headless_launcher_refuses_every_action() {
        let launcher = HeadlessLauncher;
        let wd = Path::new("/tmp");
        for err in [
            launcher.file_manager(wd).unwrap_err(),
            launcher.text_editor(wd).unwrap_err(),
            launcher.open_url("https://example.com").unwrap_err(),
        ] {
            match err {
                RunnerError::Launch { source, .. } => {
                    assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
                    assert_eq!(source.to_string(), "no desktop session");
                }
                other => panic!("unexpected {:?}", other),
            }
        }
    }

    #[test]
    fn test_windows_url_handler_keeps_query_in_one_argument() {
        let url = "https://x/?a=1&b=2";
        let (program, args) = SystemLauncher::windows_url_handler(url);
        assert_eq!(program, "rundll32.exe");
        assert_eq!(args, ["url.dll,FileProtocolHandler", url]);
        assert!(!program.starts_with("cmd"));
    }

    #[test]
    fn test_scratch_note_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let note = SystemLauncher::scratch_note(dir.path()).unwrap();
        assert!(note.exists());
        assert_eq!(note.file_name().unwrap(), "note.txt");
    }
}
