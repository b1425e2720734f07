//! The closed set of commands an agent understands.

use super::parse::split_args;
use rcmd_common::{Error, Result};
use serde::Serialize;

/// A parsed command line.
///
/// Anything that does not start with a known verb is [`Command::Shell`] and
/// runs through the platform shell as written. That fallback has no
/// allow-list: whoever can write a machine's `cmd` slot can run arbitrary
/// shell text on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "verb", rename_all = "snake_case")]
pub enum Command {
    /// `explorer`
    #[serde(rename = "explorer")]
    FileManager,
    /// `notepad`
    #[serde(rename = "notepad")]
    TextEditor,
    /// `open_url <url>`
    OpenUrl { url: String },
    /// `open_chat [room]`; no room means the agent's own machine id.
    OpenChat { room: Option<String> },
    /// `download <url> [dest]`
    Download { url: String, dest: Option<String> },
    /// `install <path> [args...]`
    Install { program: String, args: Vec<String> },
    /// `run <shell line>`
    Run { line: String },
    /// Unrecognized verb: the whole line goes to the shell.
    Shell { line: String },
}

impl Command {
    /// Parse a raw command line.
    ///
    /// Only the verb is matched case-insensitively; the rest of the line is
    /// kept as written.
    pub fn parse(raw: &str) -> Result<Command> {
        let line = raw.trim();
        if line.is_empty() {
            return Err(Error::MalformedCommand("empty command".to_string()));
        }

        let (verb, rest) = match line.find(char::is_whitespace) {
            Some(idx) => (&line[..idx], line[idx..].trim()),
            None => (line, ""),
        };

        let command = match verb.to_ascii_lowercase().as_str() {
            "explorer" => Command::FileManager,
            "notepad" => Command::TextEditor,
            "open_url" => {
                if rest.is_empty() {
                    return Err(usage("open_url <url>"));
                }
                Command::OpenUrl {
                    url: rest.to_string(),
                }
            }
            "open_chat" => Command::OpenChat {
                room: (!rest.is_empty()).then(|| rest.to_string()),
            },
            "download" => {
                let mut parts = split_args(rest).into_iter();
                let url = parts.next().ok_or_else(|| usage("download <url> [dest]"))?;
                Command::Download {
                    url,
                    dest: parts.next(),
                }
            }
            "install" => {
                let mut parts = split_args(rest).into_iter();
                let program = parts.next().ok_or_else(|| usage("install <path> [args]"))?;
                Command::Install {
                    program,
                    args: parts.collect(),
                }
            }
            "run" => {
                if rest.is_empty() {
                    return Err(usage("run <command line>"));
                }
                Command::Run {
                    line: rest.to_string(),
                }
            }
            _ => Command::Shell {
                line: line.to_string(),
            },
        };
        Ok(command)
    }

    /// Canonical verb name.
    pub fn verb(&self) -> &'static str {
        match self {
            Command::FileManager => "explorer",
            Command::TextEditor => "notepad",
            Command::OpenUrl { .. } => "open_url",
            Command::OpenChat { .. } => "open_chat",
            Command::Download { .. } => "download",
            Command::Install { .. } => "install",
            Command::Run { .. } => "run",
            Command::Shell { .. } => "shell",
        }
    }
}

fn usage(form: &str) -> Error {
    Error::MalformedCommand(format!("Формат: {}", form))
}
