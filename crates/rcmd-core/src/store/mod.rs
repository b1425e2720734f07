//! Shared store client.
//!
//! The store is a hierarchical JSON tree addressed by `/`-separated paths.
//! It offers only upsert, snapshot read and append; there are no
//! transactions and no compare-and-swap, so every protocol built on it must
//! keep each slot single-writer.

pub mod http;
pub mod memory;
pub mod paths;
pub mod watch;

pub use http::HttpStore;
pub use memory::MemoryStore;
pub use watch::{ChangeEvent, ChangeKind, Watcher};

use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Errors returned by store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unreachable: {0}")]
    Unavailable(String),

    #[error("store rejected {path}: HTTP {status}")]
    Rejected { path: String, status: u16 },

    #[error("unexpected store payload at {path}: {reason}")]
    Decode { path: String, reason: String },
}

impl From<StoreError> for rcmd_common::Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(reason) => rcmd_common::Error::StoreUnavailable(reason),
            StoreError::Rejected { path, status } => {
                rcmd_common::Error::StoreRejected { path, status }
            }
            StoreError::Decode { path, reason } => {
                rcmd_common::Error::StoreUnavailable(format!("{}: {}", path, reason))
            }
        }
    }
}

/// Read/write/append access to the shared store.
pub trait Store: Send + Sync {
    /// Upsert a value at `path` (last write wins). Writing `null` removes it.
    fn write(&self, path: &str, value: &Value) -> Result<(), StoreError>;

    /// Single snapshot read; `None` when nothing is stored at `path`.
    fn read_once(&self, path: &str) -> Result<Option<Value>, StoreError>;

    /// Append `value` under `path` with a store-generated, time-ordered key.
    fn push(&self, path: &str, value: &Value) -> Result<String, StoreError>;

    /// Write a string leaf.
    fn write_str(&self, path: &str, value: &str) -> Result<(), StoreError> {
        self.write(path, &Value::String(value.to_string()))
    }

    /// Read a string leaf; absent and `null` read as empty.
    fn read_str(&self, path: &str) -> Result<String, StoreError> {
        Ok(match self.read_once(path)? {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s,
            Some(other) => other.to_string(),
        })
    }
}

impl<S: Store + ?Sized> Store for Arc<S> {
    fn write(&self, path: &str, value: &Value) -> Result<(), StoreError> {
        (**self).write(path, value)
    }

    fn read_once(&self, path: &str) -> Result<Option<Value>, StoreError> {
        (**self).read_once(path)
    }

    fn push(&self, path: &str, value: &Value) -> Result<String, StoreError> {
        (**self).push(path, value)
    }
}

impl<S: Store + ?Sized> Store for &S {
    fn write(&self, path: &str, value: &Value) -> Result<(), StoreError> {
        (**self).write(path, value)
    }

    fn read_once(&self, path: &str) -> Result<Option<Value>, StoreError> {
        (**self).read_once(path)
    }

    fn push(&self, path: &str, value: &Value) -> Result<String, StoreError> {
        (**self).push(path, value)
    }
}

static PUSH_SEQ: AtomicU64 = AtomicU64::new(0);

/// Generate an append key that sorts after every key generated before it in
/// this process: millisecond timestamp followed by a process-wide sequence.
pub fn push_id() -> String {
    let millis = chrono::Utc::now().timestamp_millis().max(0) as u64;
    let seq = PUSH_SEQ.fetch_add(1, Ordering::SeqCst);
    format!("-{:012x}{:08x}", millis, seq & 0xffff_ffff)
}

/// Split a store path into non-empty segments.
pub(crate) fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_ids_are_ordered() {
        let ids: Vec<String> = (0..50).map(|_| push_id()).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
        assert!(ids.iter().all(|id| id.len() == 21));
    }

    #[test]
    fn test_segments_skip_empty() {
        let parts: Vec<&str> = segments("/machines//m1/cmd/").collect();
        assert_eq!(parts, vec!["machines", "m1", "cmd"]);
    }

    #[test]
    fn test_read_str_normalizes() {
        let store = MemoryStore::new();
        assert_eq!(store.read_str("machines/m1/cmd").unwrap(), "");

        store.write("n", &serde_json::json!(42)).unwrap();
        assert_eq!(store.read_str("n").unwrap(), "42");

        store.write_str("s", "hi").unwrap();
        assert_eq!(store.read_str("s").unwrap(), "hi");
    }

    #[test]
    fn test_store_error_maps_to_common_error() {
        let err: rcmd_common::Error = StoreError::Rejected {
            path: "machines".into(),
            status: 401,
        }
        .into();
        assert_eq!(err.code(), 21);

        let err: rcmd_common::Error = StoreError::Unavailable("refused".into()).into();
        assert_eq!(err.code(), 20);
    }
}
