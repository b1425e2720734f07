//! Change notification by polling.
//!
//! A [`Watcher`] remembers the children of one path and, on each poll,
//! reports which keys appeared, changed or disappeared since the previous
//! poll. Keys are reported in sorted order, so append keys from
//! [`super::push_id`] come out in insertion order.

use super::{Store, StoreError};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Kind of change seen under a watched path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Inserted,
    Updated,
    Removed,
}

/// One child-level change.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    /// Full store path of the changed child.
    pub path: String,
    /// New value; `Null` for removals.
    pub value: Value,
    pub kind: ChangeKind,
}

impl ChangeEvent {
    /// Last path segment, i.e. the child key.
    pub fn key(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}

/// Polling watcher over the children of one path.
#[derive(Debug)]
pub struct Watcher {
    path: String,
    seen: BTreeMap<String, Value>,
}

impl Watcher {
    pub fn new(path: impl Into<String>) -> Self {
        Watcher {
            path: path.into(),
            seen: BTreeMap::new(),
        }
    }

    /// Start from the current contents so that only later changes are
    /// reported.
    pub fn primed<S: Store + ?Sized>(path: impl Into<String>, store: &S) -> Result<Self, StoreError> {
        let mut watcher = Watcher::new(path);
        watcher.poll(store)?;
        Ok(watcher)
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    fn child_path(&self, key: &str) -> String {
        format!("{}/{}", self.path.trim_end_matches('/'), key)
    }

    /// Read the path once and diff against the previous snapshot.
    pub fn poll<S: Store + ?Sized>(&mut self, store: &S) -> Result<Vec<ChangeEvent>, StoreError> {
        let current: BTreeMap<String, Value> = match store.read_once(&self.path)? {
            Some(Value::Object(map)) => into_sorted(map),
            // A scalar at the watched path has no children.
            _ => BTreeMap::new(),
        };

        let mut events = Vec::new();
        for (key, value) in &current {
            match self.seen.get(key) {
                None => events.push(ChangeEvent {
                    path: self.child_path(key),
                    value: value.clone(),
                    kind: ChangeKind::Inserted,
                }),
                Some(old) if old != value => events.push(ChangeEvent {
                    path: self.child_path(key),
                    value: value.clone(),
                    kind: ChangeKind::Updated,
                }),
                Some(_) => {}
            }
        }
        for key in self.seen.keys() {
            if !current.contains_key(key) {
                events.push(ChangeEvent {
                    path: self.child_path(key),
                    value: Value::Null,
                    kind: ChangeKind::Removed,
                });
            }
        }

        self.seen = current;
        Ok(events)
    }
}

fn into_sorted(map: Map<String, Value>) -> BTreeMap<String, Value> {
    map.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    #[test]
    fn test_reports_insert_update_remove() {
        let store = MemoryStore::new();
        let mut watcher = Watcher::new("machines");
        assert!(watcher.poll(&store).unwrap().is_empty());

        store.write_str("machines/m1/lastSeen", "t1").unwrap();
        let events = watcher.poll(&store).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].path, "machines/m1");
        assert_eq!(events[0].key(), "m1");
        assert_eq!(events[0].kind, ChangeKind::Inserted);

        assert!(watcher.poll(&store).unwrap().is_empty());

        store.write_str("machines/m1/lastSeen", "t2").unwrap();
        let events = watcher.poll(&store).unwrap();
        assert_eq!(events[0].kind, ChangeKind::Updated);
        assert_eq!(events[0].value, json!({"lastSeen": "t2"}));

        store.write("machines/m1", &Value::Null).unwrap();
        let events = watcher.poll(&store).unwrap();
        assert_eq!(events[0].kind, ChangeKind::Removed);
        assert_eq!(events[0].value, Value::Null);
    }

    #[test]
    fn test_primed_skips_existing() {
        let store = MemoryStore::new();
        store.push("chat/r/messages", &json!({"text": "old"})).unwrap();

        let mut watcher = Watcher::primed("chat/r/messages", &store).unwrap();
        assert!(watcher.poll(&store).unwrap().is_empty());

        store.push("chat/r/messages", &json!({"text": "a"})).unwrap();
        store.push("chat/r/messages", &json!({"text": "b"})).unwrap();
        let texts: Vec<Value> = watcher
            .poll(&store)
            .unwrap()
            .into_iter()
            .map(|e| e.value["text"].clone())
            .collect();
        assert_eq!(texts, vec![json!("a"), json!("b")]);
    }
}
