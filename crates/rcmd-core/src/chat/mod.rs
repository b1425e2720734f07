//! Auxiliary chat stream layered on the same store.
//!
//! Messages are appended under `chat/<room>/messages` and followed with a
//! polling [`Watcher`]. The command protocol does not depend on any of this.

use crate::agent::StopToken;
use crate::log_event;
use crate::logging::{event_names, LogContext, Stage};
use crate::store::{paths, ChangeKind, Store, Watcher};
use chrono::{DateTime, Utc};
use rcmd_common::{Error, MachineId, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::warn;

/// Poll cadence of room followers.
pub const FOLLOW_INTERVAL: Duration = Duration::from_secs(1);

/// One chat line as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub sender: String,
    pub text: String,
    /// Demonstration translation; empty when none applies.
    #[serde(default)]
    pub translated: String,
    pub ts: DateTime<Utc>,
}

impl ChatMessage {
    /// A message stamped now, with its stub translation filled in.
    pub fn new(sender: impl Into<String>, text: &str) -> Self {
        let text = text.trim();
        ChatMessage {
            sender: sender.into(),
            text: text.to_string(),
            translated: translate_stub(text),
            ts: Utc::now(),
        }
    }

    /// `[HH:MM] sender` header line.
    pub fn header(&self) -> String {
        format!("[{}] {}", self.ts.format("%H:%M"), self.sender)
    }

    /// Text, followed by the translation in parentheses when present.
    pub fn body(&self) -> String {
        if self.translated.trim().is_empty() {
            self.text.clone()
        } else {
            format!("{}\n({})", self.text, self.translated)
        }
    }
}

impl std::fmt::Display for ChatMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}\n{}", self.header(), self.body())
    }
}

/// Toy EN/RU translator: `hello`/`hi` ↔ `привет`, everything else untranslated.
pub fn translate_stub(text: &str) -> String {
    let t = text.trim().to_lowercase();
    match t.as_str() {
        "hello" | "hi" => "привет".to_string(),
        "привет" => "hello".to_string(),
        _ => String::new(),
    }
}

/// Room names become store keys, so they follow the same key rules.
pub fn validate_room(room: &str) -> Result<&str> {
    let room = room.trim();
    if room.is_empty() || room.contains(['/', '.', '#', '$', '[', ']']) {
        return Err(Error::MalformedCommand(format!("invalid chat room: {:?}", room)));
    }
    Ok(room)
}

/// Append a message to a room.
pub fn send<S: Store + ?Sized>(store: &S, room: &str, message: &ChatMessage) -> Result<String> {
    let room = validate_room(room)?;
    let value = serde_json::to_value(message)?;
    Ok(store.push(&paths::chat_messages(room), &value)?)
}

/// Every message currently in a room, oldest first.
pub fn history<S: Store + ?Sized>(store: &S, room: &str) -> Result<Vec<ChatMessage>> {
    let room = validate_room(room)?;
    let Some(serde_json::Value::Object(map)) = store.read_once(&paths::chat_messages(room))? else {
        return Ok(Vec::new());
    };
    // Append keys sort in insertion order.
    let sorted: BTreeMap<String, serde_json::Value> = map.into_iter().collect();
    Ok(sorted
        .into_values()
        .filter_map(|v| serde_json::from_value(v).ok())
        .collect())
}

/// Whether opening a room created a new view or reused an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomOpen {
    Opened,
    Activated,
}

/// The agent's chat surface, as seen by the dispatcher.
pub trait ChatView: Send + Sync {
    /// Open `room`, or activate it if it is already open.
    fn open_room(&self, room: &str) -> Result<RoomOpen>;
}

struct Follower {
    stop: StopToken,
    handle: Option<JoinHandle<()>>,
    transcript: Arc<Mutex<Vec<ChatMessage>>>,
}

/// Chat rooms opened on this agent, each followed on its own thread.
pub struct ChatRooms<S> {
    store: S,
    me: MachineId,
    interval: Duration,
    rooms: Mutex<BTreeMap<String, Follower>>,
}

impl<S: Store + Clone + 'static> ChatRooms<S> {
    pub fn new(store: S, me: MachineId) -> Self {
        Self::with_interval(store, me, FOLLOW_INTERVAL)
    }

    pub fn with_interval(store: S, me: MachineId, interval: Duration) -> Self {
        ChatRooms {
            store,
            me,
            interval,
            rooms: Mutex::new(BTreeMap::new()),
        }
    }

    /// Names of open rooms, sorted.
    pub fn open_rooms(&self) -> Vec<String> {
        self.lock_rooms().keys().cloned().collect()
    }

    /// Messages received in `room` since it was opened.
    pub fn transcript(&self, room: &str) -> Vec<ChatMessage> {
        self.lock_rooms()
            .get(room.trim())
            .and_then(|f| f.transcript.lock().ok().map(|t| t.clone()))
            .unwrap_or_default()
    }

    /// Post a message from this agent.
    pub fn say(&self, room: &str, text: &str) -> Result<String> {
        send(&self.store, room, &ChatMessage::new(self.me.as_str(), text))
    }

    /// Stop every follower and wait for them.
    pub fn close_all(&self) {
        let followers: Vec<Follower> = {
            let mut rooms = self.lock_rooms();
            std::mem::take(&mut *rooms).into_values().collect()
        };
        for mut follower in followers {
            follower.stop.stop();
            if let Some(handle) = follower.handle.take() {
                let _ = handle.join();
            }
        }
    }

    fn lock_rooms(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Follower>> {
        self.rooms.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn start_follower(&self, room: &str) -> Result<Follower> {
        let path = paths::chat_messages(room);
        // Existing history is not replayed to a newly opened view.
        let mut watcher = Watcher::primed(path, &self.store)?;

        let stop = StopToken::new();
        let transcript = Arc::new(Mutex::new(Vec::new()));
        let ctx = LogContext::new(crate::logging::generate_run_id(), self.me.as_str());
        let store = self.store.clone();
        let interval = self.interval;
        let room_name = room.to_string();
        let thread_stop = stop.clone();
        let thread_transcript = Arc::clone(&transcript);

        let handle = std::thread::Builder::new()
            .name(format!("chat-{}", room))
            .spawn(move || loop {
                match watcher.poll(&store) {
                    Ok(events) => {
                        for event in events {
                            if event.kind == ChangeKind::Removed {
                                continue;
                            }
                            let Ok(message) = serde_json::from_value::<ChatMessage>(event.value) else {
                                continue;
                            };
                            log_event!(ctx, INFO, event_names::CHAT_MESSAGE, Stage::Chat,
                                message.body(), room = %room_name, sender = %message.sender);
                            if let Ok(mut t) = thread_transcript.lock() {
                                t.push(message);
                            }
                        }
                    }
                    Err(e) => warn!(room = %room_name, error = %e, "chat poll failed"),
                }
                if thread_stop.sleep(interval) {
                    break;
                }
            })?;

        Ok(Follower {
            stop,
            handle: Some(handle),
            transcript,
        })
    }
}

impl<S: Store + Clone + 'static> ChatView for ChatRooms<S> {
    fn open_room(&self, room: &str) -> Result<RoomOpen> {
        let room = validate_room(room)?;
        let mut rooms = self.lock_rooms();
        if rooms.contains_key(room) {
            return Ok(RoomOpen::Activated);
        }
        let follower = self.start_follower(room)?;
        rooms.insert(room.to_string(), follower);

        let ctx = LogContext::new(crate::logging::generate_run_id(), self.me.as_str());
        log_event!(ctx, INFO, event_names::CHAT_ROOM_OPENED, Stage::Chat,
            "chat room opened", room = %room);
        Ok(RoomOpen::Opened)
    }
}

impl<S> Drop for ChatRooms<S> {
    fn drop(&mut self) {
        let rooms = self.rooms.get_mut().map(std::mem::take).unwrap_or_default();
        for (_, mut follower) in rooms {
            follower.stop.stop();
            if let Some(handle) = follower.handle.take() {
                let _ = handle.join();
            }
        }
    }
}
