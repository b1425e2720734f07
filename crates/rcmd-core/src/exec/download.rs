//! HTTP download straight to disk.
//!
//! The body is streamed into a temporary file next to the destination and
//! renamed over it only once the whole body arrived, so a failed transfer
//! never leaves a partial file behind.

use std::io;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// File name used when a URL has no usable last path segment.
pub const DEFAULT_FILE_NAME: &str = "download.bin";

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("{url} answered HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("cannot fetch {url}: {reason}")]
    Transport { url: String, reason: String },

    #[error("I/O error writing {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
}

impl From<DownloadError> for rcmd_common::Error {
    fn from(err: DownloadError) -> Self {
        rcmd_common::Error::DownloadFailure(err.to_string())
    }
}

/// Streams URLs to local files.
#[derive(Clone)]
pub struct Downloader {
    agent: ureq::Agent,
}

impl std::fmt::Debug for Downloader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Downloader").finish_non_exhaustive()
    }
}

impl Default for Downloader {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

impl Downloader {
    /// `connect_timeout` bounds connection setup only; large bodies may take
    /// as long as they need.
    pub fn new(connect_timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(connect_timeout)
            .build();
        Self { agent }
    }

    /// Download `url` to `dest`, returning the number of bytes written.
    pub fn download(&self, url: &str, dest: &Path) -> Result<u64, DownloadError> {
        let io_err = |source: io::Error| DownloadError::Io {
            path: dest.display().to_string(),
            source,
        };

        let dir = match dest.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => std::env::current_dir().map_err(io_err)?,
        };
        std::fs::create_dir_all(&dir).map_err(io_err)?;

        debug!(url, dest = %dest.display(), "starting download");
        let response = match self.agent.get(url).call() {
            Ok(resp) => resp,
            Err(ureq::Error::Status(status, _)) => {
                return Err(DownloadError::Status {
                    url: url.to_string(),
                    status,
                })
            }
            Err(ureq::Error::Transport(t)) => {
                return Err(DownloadError::Transport {
                    url: url.to_string(),
                    reason: t.to_string(),
                })
            }
        };

        let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(io_err)?;
        let bytes = io::copy(&mut response.into_reader(), &mut tmp).map_err(io_err)?;
        tmp.as_file().sync_all().map_err(io_err)?;
        tmp.persist(dest).map_err(|e| io_err(e.error))?;

        info!(url, dest = %dest.display(), bytes, "download complete");
        Ok(bytes)
    }
}

/// Derive a local file name from the last path segment of `url`.
pub fn file_name_from_url(url: &str) -> String {
    let without_query = url.split(['?', '#']).next().unwrap_or_default();
    let Some((_, after_scheme)) = without_query.split_once("://") else {
        return DEFAULT_FILE_NAME.to_string();
    };
    let path = after_scheme.find('/').map_or("", |idx| &after_scheme[idx..]);
    let name = path.rsplit('/').next().unwrap_or_default();

    if name.is_empty() || name == "." || name == ".." {
        return DEFAULT_FILE_NAME.to_string();
    }
    name.chars()
        .map(|c| match c {
            '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            other => other,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_name_from_url() {
        assert_eq!(file_name_from_url("https://example.com/file.bin"), "file.bin");
        assert_eq!(file_name_from_url("https://example.com/a/b/setup.exe?x=1#top"), "setup.exe");
        assert_eq!(file_name_from_url("https://example.com/"), DEFAULT_FILE_NAME);
        assert_eq!(file_name_from_url("https://example.com"), DEFAULT_FILE_NAME);
        assert_eq!(file_name_from_url("not a url"), DEFAULT_FILE_NAME);
        assert_eq!(file_name_from_url("http://h/a%20b.txt"), "a%20b.txt");
    }

    #[test]
    fn test_file_name_is_sanitized() {
        assert_eq!(file_name_from_url("http://h/x:y*z.txt"), "x_y_z.txt");
    }

    #[test]
    fn test_unreachable_host_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("sub/out.bin");
        let err = Downloader::new(Duration::from_millis(500))
            .download("http://127.0.0.1:9/file.bin", &dest)
            .unwrap_err();

        assert!(matches!(err, DownloadError::Transport { .. }));
        assert!(!dest.exists());
        // Parent directories are created before the request goes out.
        assert!(dir.path().join("sub").is_dir());

        let common: rcmd_common::Error = err.into();
        assert_eq!(common.code(), 41);
    }
}
