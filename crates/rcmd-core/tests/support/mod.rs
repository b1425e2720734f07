//! Shared fixtures for integration tests: an in-process fake of the store's
//! REST dialect and a static file server, both on tiny_http.

#![allow(dead_code)]

use rcmd_core::store::{MemoryStore, Store};
use serde_json::Value;
use std::collections::HashMap;
use std::io::Read;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use tiny_http::{Header, Method, Request, Response, Server};

fn json_header() -> Header {
    Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..])
        .expect("static header")
}

fn bind() -> (Arc<Server>, String) {
    let server = Arc::new(Server::http("127.0.0.1:0").expect("bind test server"));
    let addr = server
        .server_addr()
        .to_ip()
        .expect("tcp listener has an ip address");
    (server, format!("http://{}", addr))
}

/// One recorded request against [`FakeStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Seen {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
}

/// Firebase-style REST store backed by a [`MemoryStore`].
pub struct FakeStore {
    pub state: MemoryStore,
    url: String,
    server: Arc<Server>,
    reject: Arc<AtomicU16>,
    seen: Arc<Mutex<Vec<Seen>>>,
    handle: Option<JoinHandle<()>>,
}

impl FakeStore {
    pub fn start() -> Self {
        let (server, url) = bind();
        let state = MemoryStore::new();
        let reject = Arc::new(AtomicU16::new(0));
        let seen = Arc::new(Mutex::new(Vec::new()));

        let handle = {
            let server = Arc::clone(&server);
            let state = state.clone();
            let reject = Arc::clone(&reject);
            let seen = Arc::clone(&seen);
            std::thread::spawn(move || {
                for request in server.incoming_requests() {
                    handle_store_request(request, &state, &reject, &seen);
                }
            })
        };

        FakeStore {
            state,
            url: format!("{}/", url),
            server,
            reject,
            seen,
            handle: Some(handle),
        }
    }

    /// Root URL with a trailing slash, as it would appear in `rcmd.toml`.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Answer every following request with `status` (0 restores normal service).
    pub fn reject_with(&self, status: u16) {
        self.reject.store(status, Ordering::SeqCst);
    }

    pub fn seen(&self) -> Vec<Seen> {
        self.seen.lock().unwrap().clone()
    }
}

impl Drop for FakeStore {
    fn drop(&mut self) {
        self.server.unblock();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn decode_segment(segment: &str) -> String {
    let bytes = segment.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
            if let Some(b) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                out.push(b);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn store_path(url: &str) -> (String, Option<String>) {
    let (path, query) = match url.split_once('?') {
        Some((p, q)) => (p, Some(q.to_string())),
        None => (url, None),
    };
    let path = path.trim_start_matches('/');
    let path = path.strip_suffix(".json").unwrap_or(path);
    let decoded: Vec<String> = path
        .split('/')
        .filter(|s| !s.is_empty())
        .map(decode_segment)
        .collect();
    (decoded.join("/"), query)
}

fn handle_store_request(
    mut request: Request,
    state: &MemoryStore,
    reject: &AtomicU16,
    seen: &Mutex<Vec<Seen>>,
) {
    let (path, query) = store_path(request.url());
    let method = request.method().clone();
    seen.lock().unwrap().push(Seen {
        method: method.to_string(),
        path: path.clone(),
        query,
    });

    let status = reject.load(Ordering::SeqCst);
    if status != 0 {
        let body = r#"{"error":"Permission denied"}"#;
        let _ = request.respond(
            Response::from_string(body)
                .with_status_code(status)
                .with_header(json_header()),
        );
        return;
    }

    let mut body = String::new();
    let _ = request.as_reader().read_to_string(&mut body);

    let reply: Result<Value, (u16, String)> = match method {
        Method::Get => Ok(state.read_once(&path).unwrap().unwrap_or(Value::Null)),
        Method::Put => match serde_json::from_str::<Value>(&body) {
            Ok(value) => {
                state.write(&path, &value).unwrap();
                Ok(value)
            }
            Err(e) => Err((400, e.to_string())),
        },
        Method::Delete => {
            state.write(&path, &Value::Null).unwrap();
            Ok(Value::Null)
        }
        Method::Post => match serde_json::from_str::<Value>(&body) {
            Ok(value) => {
                let name = state.push(&path, &value).unwrap();
                Ok(serde_json::json!({ "name": name }))
            }
            Err(e) => Err((400, e.to_string())),
        },
        _ => Err((405, "method not allowed".to_string())),
    };

    let response = match reply {
        Ok(value) => Response::from_string(value.to_string()).with_header(json_header()),
        Err((status, message)) => Response::from_string(serde_json::json!({ "error": message }).to_string())
            .with_status_code(status)
            .with_header(json_header()),
    };
    let _ = request.respond(response);
}

/// Serves fixed bodies by URL path; anything else is a 404.
pub struct FileServer {
    url: String,
    server: Arc<Server>,
    handle: Option<JoinHandle<()>>,
}

impl FileServer {
    pub fn start(files: &[(&str, &[u8])]) -> Self {
        let (server, url) = bind();
        let files: HashMap<String, Vec<u8>> = files
            .iter()
            .map(|(path, body)| (path.to_string(), body.to_vec()))
            .collect();

        let handle = {
            let server = Arc::clone(&server);
            std::thread::spawn(move || {
                for request in server.incoming_requests() {
                    let path = request.url().split('?').next().unwrap_or("").to_string();
                    let response = match files.get(&path) {
                        Some(body) => Response::from_data(body.clone()),
                        None => Response::from_data(b"not found".to_vec()).with_status_code(404),
                    };
                    let _ = request.respond(response);
                }
            })
        };

        FileServer {
            url,
            server,
            handle: Some(handle),
        }
    }

    /// Absolute URL for `path` (which starts with `/`).
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.url, path)
    }
}

impl Drop for FileServer {
    fn drop(&mut self) {
        self.server.unblock();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
