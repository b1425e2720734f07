//! Log level and sink format for the `rcmd` binary.
//!
//! `-q` and `-v` beat `RCMD_LOG`; a machine output format forces JSONL so
//! stderr stays parseable next to JSON on stdout. A set `RUST_LOG` is read
//! later as a full filter directive by [`super::init_logging`].

use tracing_subscriber::filter::LevelFilter;

/// Shape of the stderr log stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Human,
    Jsonl,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub format: LogFormat,
    pub level: LevelFilter,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Human,
            level: LevelFilter::INFO,
        }
    }
}

impl LogConfig {
    /// Combine the global CLI flags with `RCMD_LOG` and `RCMD_LOG_FORMAT`.
    pub fn from_env(verbose: u8, quiet: bool, machine_output: bool) -> Self {
        Self::resolve(|name| std::env::var(name).ok(), verbose, quiet, machine_output)
    }

    fn resolve(
        var: impl Fn(&str) -> Option<String>,
        verbose: u8,
        quiet: bool,
        machine_output: bool,
    ) -> Self {
        let level = match (quiet, verbose) {
            (true, _) => LevelFilter::ERROR,
            (false, 1) => LevelFilter::DEBUG,
            (false, 2..) => LevelFilter::TRACE,
            (false, 0) => var("RCMD_LOG")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(LevelFilter::INFO),
        };

        let format = if machine_output {
            LogFormat::Jsonl
        } else {
            match var("RCMD_LOG_FORMAT").map(|v| v.trim().to_ascii_lowercase()) {
                Some(v) if v == "json" || v == "jsonl" => LogFormat::Jsonl,
                _ => LogFormat::Human,
            }
        };

        Self { format, level }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env<'a>(pairs: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        move |name| {
            pairs
                .iter()
                .find(|(k, _)| *k == name)
                .map(|(_, v)| v.to_string())
        }
    }

    #[test]
    fn test_flags_beat_rcmd_log() {
        let vars = [("RCMD_LOG", "trace")];
        assert_eq!(LogConfig::resolve(env(&vars), 0, true, false).level, LevelFilter::ERROR);
        assert_eq!(LogConfig::resolve(env(&vars), 1, false, false).level, LevelFilter::DEBUG);
        assert_eq!(LogConfig::resolve(env(&vars), 0, false, false).level, LevelFilter::TRACE);
    }

    #[test]
    fn test_unparseable_rcmd_log_falls_back_to_info() {
        let vars = [("RCMD_LOG", "loud")];
        assert_eq!(LogConfig::resolve(env(&vars), 0, false, false), LogConfig::default());
    }

    #[test]
    fn test_machine_output_forces_jsonl() {
        let vars = [("RCMD_LOG_FORMAT", "human")];
        assert_eq!(LogConfig::resolve(env(&vars), 0, false, true).format, LogFormat::Jsonl);

        let vars = [("RCMD_LOG_FORMAT", "JSON")];
        assert_eq!(LogConfig::resolve(env(&vars), 0, false, false).format, LogFormat::Jsonl);
    }
}
