//! In-process store with the same path semantics as the HTTP store.
//!
//! Clones share one tree, so an agent and a controller in the same test can
//! talk through it exactly as they would through the remote store.

use super::{push_id, segments, Store, StoreError};
use serde_json::{Map, Value};
use std::sync::{Arc, Mutex, MutexGuard};

/// Shared in-memory JSON tree.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    root: Arc<Mutex<Value>>,
    writes: Arc<Mutex<Vec<(String, Value)>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every write in order, as `(path, value)`. Useful to assert on
    /// protocol ordering.
    pub fn write_log(&self) -> Vec<(String, Value)> {
        lock(&self.writes).clone()
    }

    /// Snapshot of the whole tree.
    pub fn snapshot(&self) -> Value {
        lock(&self.root).clone()
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    // A panicking test thread must not wedge every other user of the store.
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn set_at(root: &mut Value, parts: &[&str], value: Value) {
    let Some((last, parents)) = parts.split_last() else {
        *root = value;
        return;
    };

    let mut node = root;
    for part in parents {
        if !node.is_object() {
            *node = Value::Object(Map::new());
        }
        // Missing keys come back as `null` and become objects on the next step.
        node = &mut node[*part];
    }
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    node[*last] = value;
}

fn remove_at(root: &mut Value, parts: &[&str]) {
    let Some((first, rest)) = parts.split_first() else {
        *root = Value::Null;
        return;
    };
    let Value::Object(map) = root else {
        return;
    };
    if rest.is_empty() {
        map.remove(*first);
        return;
    }
    if let Some(child) = map.get_mut(*first) {
        remove_at(child, rest);
        // Empty parents disappear, as they do in the remote store.
        if matches!(child, Value::Object(m) if m.is_empty()) || child.is_null() {
            map.remove(*first);
        }
    }
}

fn get_at<'a>(root: &'a Value, parts: &[&str]) -> Option<&'a Value> {
    let mut node = root;
    for part in parts {
        node = node.as_object()?.get(*part)?;
    }
    Some(node)
}

impl Store for MemoryStore {
    fn write(&self, path: &str, value: &Value) -> Result<(), StoreError> {
        let parts: Vec<&str> = segments(path).collect();
        let mut root = lock(&self.root);
        if value.is_null() {
            remove_at(&mut root, &parts);
        } else {
            set_at(&mut root, &parts, value.clone());
        }
        lock(&self.writes).push((parts.join("/"), value.clone()));
        Ok(())
    }

    fn read_once(&self, path: &str) -> Result<Option<Value>, StoreError> {
        let parts: Vec<&str> = segments(path).collect();
        let root = lock(&self.root);
        Ok(get_at(&root, &parts).filter(|v| !v.is_null()).cloned())
    }

    fn push(&self, path: &str, value: &Value) -> Result<String, StoreError> {
        let key = push_id();
        let child = format!("{}/{}", path.trim_end_matches('/'), key);
        self.write(&child, value)?;
        Ok(key)
    }
}
