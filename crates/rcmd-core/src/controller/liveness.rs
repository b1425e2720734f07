//! Machine liveness from heartbeat timestamps.
//!
//! A machine is online iff `now - lastSeen < timeout`. The online set is
//! derived on every refresh and never stored.

use crate::log_event;
use crate::logging::{event_names, LogContext, Stage};
use crate::store::{paths, Store};
use chrono::{DateTime, NaiveDateTime, Utc};
use rcmd_common::Result;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

/// Snapshot of one machine's slots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MachineRecord {
    pub id: String,
    /// Parsed heartbeat; `None` when missing or unparseable.
    pub last_seen: Option<DateTime<Utc>>,
    pub cmd: String,
    pub result: String,
}

impl MachineRecord {
    pub fn from_value(id: &str, value: &Value) -> Self {
        let field = |name: &str| match value.get(name) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        };
        MachineRecord {
            id: id.to_string(),
            last_seen: parse_timestamp(&field(paths::LAST_SEEN)),
            cmd: field(paths::CMD),
            result: field(paths::RESULT),
        }
    }

    /// Every machine under `machines`, sorted by id.
    pub fn all_from_tree(tree: Option<&Value>) -> Vec<MachineRecord> {
        let mut records: Vec<MachineRecord> = match tree {
            Some(Value::Object(map)) => map
                .iter()
                .map(|(id, value)| MachineRecord::from_value(id, value))
                .collect(),
            _ => Vec::new(),
        };
        records.sort_by(|a, b| a.id.cmp(&b.id));
        records
    }

    pub fn is_online(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        let Some(last_seen) = self.last_seen else {
            return false;
        };
        let age = now.signed_duration_since(last_seen);
        match chrono::Duration::from_std(timeout) {
            Ok(limit) => age < limit,
            Err(_) => true,
        }
    }

    /// Seconds since the last heartbeat, if known.
    pub fn age_secs(&self, now: DateTime<Utc>) -> Option<i64> {
        self.last_seen
            .map(|ts| now.signed_duration_since(ts).num_seconds())
    }
}

/// Parse an ISO-8601 heartbeat. Values without an offset are UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Ids of online machines, ascending.
pub fn online_machines(
    records: &[MachineRecord],
    now: DateTime<Utc>,
    timeout: Duration,
) -> Vec<String> {
    let mut online: Vec<String> = records
        .iter()
        .filter(|r| r.is_online(now, timeout))
        .map(|r| r.id.clone())
        .collect();
    online.sort();
    online
}

/// Which machine the operator has selected.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    selected: Option<String>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    /// Select `id` if it is in `online`.
    pub fn select(&mut self, id: &str, online: &[String]) -> bool {
        if online.iter().any(|m| m == id) {
            self.selected = Some(id.to_string());
            true
        } else {
            false
        }
    }

    /// Keep the current selection if still online, else the first entry,
    /// else nothing.
    pub fn refresh(&mut self, online: &[String]) -> Option<&str> {
        let keep = self
            .selected
            .as_ref()
            .is_some_and(|current| online.contains(current));
        if !keep {
            self.selected = online.first().cloned();
        }
        self.selected.as_deref()
    }
}

/// Periodically recomputed online list plus selection.
pub struct LivenessMonitor<S> {
    store: S,
    timeout: Duration,
    selection: Selection,
    records: Vec<MachineRecord>,
    online: Vec<String>,
    ctx: LogContext,
}

impl<S: Store> LivenessMonitor<S> {
    pub fn new(store: S, timeout: Duration, run_id: impl Into<String>) -> Self {
        LivenessMonitor {
            store,
            timeout,
            selection: Selection::new(),
            records: Vec::new(),
            online: Vec::new(),
            ctx: LogContext::new(run_id, "-"),
        }
    }

    /// Re-read `machines` and recompute the online set as of `now`.
    pub fn refresh(&mut self, now: DateTime<Utc>) -> Result<&[String]> {
        let tree = self.store.read_once(paths::MACHINES)?;
        self.records = MachineRecord::all_from_tree(tree.as_ref());
        self.online = online_machines(&self.records, now, self.timeout);
        self.selection.refresh(&self.online);

        log_event!(self.ctx, DEBUG, event_names::MACHINES_REFRESHED, Stage::Liveness,
            "machine list refreshed",
            total = self.records.len(),
            online = self.online.len(),
            selected = ?self.selection.selected());
        Ok(&self.online)
    }

    pub fn records(&self) -> &[MachineRecord] {
        &self.records
    }

    pub fn online(&self) -> &[String] {
        &self.online
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn selection_mut(&mut self) -> &mut Selection {
        &mut self.selection
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}
