//! `HttpStore` against an in-process fake of the REST dialect.

mod support;

use rcmd_common::MachineId;
use rcmd_core::agent::{Agent, AgentConfig, StopToken};
use rcmd_core::chat::{self, ChatMessage, ChatRooms};
use rcmd_core::controller::{SubmitOutcome, Submitter};
use rcmd_core::exec::{Dispatcher, RecordingLauncher};
use rcmd_core::store::{paths, HttpStore, Store, StoreError, Watcher};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use support::FakeStore;

fn client(fake: &FakeStore) -> HttpStore {
    HttpStore::new(fake.url(), Duration::from_secs(5))
}

#[test]
fn put_then_get_round_trips_through_rest() {
    let fake = FakeStore::start();
    let store = client(&fake);

    store.write("machines/m1/cmd", &json!("notepad")).unwrap();
    assert_eq!(store.read_str("machines/m1/cmd").unwrap(), "notepad");
    assert_eq!(
        store.read_once("machines").unwrap(),
        Some(json!({ "m1": { "cmd": "notepad" } }))
    );

    let seen = fake.seen();
    assert_eq!(seen[0].method, "PUT");
    assert_eq!(seen[0].path, "machines/m1/cmd");
    assert_eq!(seen[1].method, "GET");
}

#[test]
fn missing_path_reads_as_none() {
    let fake = FakeStore::start();
    let store = client(&fake);

    assert_eq!(store.read_once("machines/ghost").unwrap(), None);
    assert_eq!(store.read_str("machines/ghost/result").unwrap(), "");
}

#[test]
fn null_write_deletes() {
    let fake = FakeStore::start();
    let store = client(&fake);

    store.write_str("a/b", "x").unwrap();
    store.write("a/b", &serde_json::Value::Null).unwrap();

    assert_eq!(store.read_once("a/b").unwrap(), None);
    assert!(fake.seen().iter().any(|s| s.method == "DELETE" && s.path == "a/b"));
}

#[test]
fn push_returns_server_key() {
    let fake = FakeStore::start();
    let store = client(&fake);

    let first = store.push("chat/ops/messages", &json!({ "n": 1 })).unwrap();
    let second = store.push("chat/ops/messages", &json!({ "n": 2 })).unwrap();
    assert!(first < second);

    let tree = fake.state.read_once("chat/ops/messages").unwrap().unwrap();
    assert_eq!(tree[&first], json!({ "n": 1 }));
    assert_eq!(tree[&second], json!({ "n": 2 }));
}

#[test]
fn auth_token_is_sent_as_query_parameter() {
    let fake = FakeStore::start();
    let store = client(&fake).with_auth(Some("s3cret"));

    store.read_once("machines").unwrap();
    assert_eq!(fake.seen()[0].query.as_deref(), Some("auth=s3cret"));
    assert!(!format!("{:?}", store).contains("s3cret"));
}

#[test]
fn segments_are_percent_encoded() {
    let fake = FakeStore::start();
    let store = client(&fake);

    store.write_str("chat/room one/topic", "hi").unwrap();
    assert_eq!(fake.seen()[0].path, "chat/room one/topic");
    assert_eq!(store.read_str("chat/room one/topic").unwrap(), "hi");
}

#[test]
fn rejected_request_carries_status() {
    let fake = FakeStore::start();
    let store = client(&fake);
    fake.reject_with(401);

    match store.write_str("machines/m1/cmd", "x") {
        Err(StoreError::Rejected { path, status }) => {
            assert_eq!(path, "machines/m1/cmd");
            assert_eq!(status, 401);
        }
        other => panic!("expected rejection, got {:?}", other),
    }

    let err: rcmd_common::Error = store.read_once("machines").unwrap_err().into();
    assert_eq!(err.code(), 21);
}

#[test]
fn watcher_sees_pushed_messages_over_http() {
    let fake = FakeStore::start();
    let store = client(&fake);
    chat::send(&store, "ops", &ChatMessage::new("admin", "old")).unwrap();

    let mut watcher = Watcher::primed(paths::chat_messages("ops"), &store).unwrap();
    assert!(watcher.poll(&store).unwrap().is_empty());

    chat::send(&store, "ops", &ChatMessage::new("admin", "new")).unwrap();
    let events = watcher.poll(&store).unwrap();
    assert_eq!(events.len(), 1);
    let message: ChatMessage = serde_json::from_value(events[0].value.clone()).unwrap();
    assert_eq!(message.text, "new");
}

#[test]
fn agent_and_operator_over_http() {
    let fake = FakeStore::start();
    let id = MachineId::new("m1").unwrap();
    let dir = tempfile::tempdir().unwrap();

    let agent_store = Arc::new(client(&fake));
    let chat = Arc::new(ChatRooms::new(Arc::clone(&agent_store), id.clone()));
    let dispatcher = Dispatcher::new(id.clone(), RecordingLauncher::new(), chat);
    let config = AgentConfig {
        poll_interval: Duration::from_millis(20),
        backoff: Duration::from_millis(20),
        working_dir: dir.path().to_path_buf(),
        max_cycles: None,
    };
    let mut agent = Agent::new(agent_store, id.clone(), dispatcher, config, "run-agent");

    let stop = StopToken::new();
    let agent_stop = stop.clone();
    let worker = std::thread::spawn(move || agent.run(&agent_stop));

    let operator_store = client(&fake);
    let submitter = Submitter::new(&operator_store, "run-op");
    let outcome = submitter
        .submit(&id, "notepad")
        .unwrap()
        .await_result(200, Duration::from_millis(20), &StopToken::new())
        .unwrap();

    stop.stop();
    worker.join().unwrap();

    let SubmitOutcome::Completed(text) = outcome else {
        panic!("expected completion, got {:?}", outcome);
    };
    assert!(text.starts_with("[OK] Took: "), "{}", text);
    assert!(text.contains("Блокнот открыт."), "{}", text);
    assert_eq!(fake.state.read_str(&paths::cmd(&id)).unwrap(), "");
}

#[test]
fn unreachable_store_is_unavailable() {
    let store = HttpStore::new("http://127.0.0.1:9/", Duration::from_millis(300));
    assert!(matches!(
        store.read_once("machines"),
        Err(StoreError::Unavailable(_))
    ));
}
