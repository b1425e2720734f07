//! REST client for the hosted store.
//!
//! Dialect (Firebase Realtime Database compatible):
//! - `PUT  {base}/{path}.json` with a JSON body upserts
//! - `GET  {base}/{path}.json` returns the value or `null`
//! - `POST {base}/{path}.json` appends and answers `{"name": "<key>"}`
//!
//! An optional token is sent as the `auth` query parameter.

use super::{segments, Store, StoreError};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, trace};

/// HTTP-backed [`Store`].
#[derive(Clone)]
pub struct HttpStore {
    agent: ureq::Agent,
    base: String,
    auth: Option<String>,
}

impl std::fmt::Debug for HttpStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpStore")
            .field("base", &self.base)
            .field("auth", &self.auth.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl HttpStore {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(timeout)
            .timeout(timeout)
            .build();
        HttpStore {
            agent,
            base: base_url.trim().trim_end_matches('/').to_string(),
            auth: None,
        }
    }

    /// Attach an access token.
    pub fn with_auth(mut self, token: Option<&str>) -> Self {
        self.auth = token.map(str::to_string);
        self
    }

    /// Build from the `[store]` table of `rcmd.toml`.
    pub fn from_settings(settings: &rcmd_config::StoreSettings) -> Self {
        HttpStore::new(&settings.url, settings.request_timeout()).with_auth(settings.auth())
    }

    pub fn base_url(&self) -> &str {
        &self.base
    }

    /// REST endpoint for a store path.
    pub fn endpoint(&self, path: &str) -> String {
        let encoded: Vec<String> = segments(path).map(encode_segment).collect();
        format!("{}/{}.json", self.base, encoded.join("/"))
    }

    fn request(&self, method: &str, path: &str) -> ureq::Request {
        let req = self.agent.request(method, &self.endpoint(path));
        match &self.auth {
            Some(token) => req.query("auth", token),
            None => req,
        }
    }

    fn send(
        &self,
        method: &str,
        path: &str,
        body: Option<&Value>,
    ) -> Result<String, StoreError> {
        trace!(method, path, "store request");
        let req = self.request(method, path);
        let outcome = match body {
            Some(value) => req
                .set("Content-Type", "application/json")
                .send_string(&value.to_string()),
            None => req.call(),
        };

        let response = match outcome {
            Ok(resp) => resp,
            Err(ureq::Error::Status(status, _)) => {
                debug!(method, path, status, "store rejected request");
                return Err(StoreError::Rejected {
                    path: path.to_string(),
                    status,
                });
            }
            Err(ureq::Error::Transport(t)) => {
                return Err(StoreError::Unavailable(t.to_string()));
            }
        };

        response.into_string().map_err(|e| StoreError::Unavailable(e.to_string()))
    }
}

/// Percent-encode one path segment (RFC 3986 unreserved characters pass).
fn encode_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for byte in segment.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            other => out.push_str(&format!("%{:02X}", other)),
        }
    }
    out
}

fn decode(path: &str, body: &str) -> Result<Value, StoreError> {
    if body.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(body).map_err(|e| StoreError::Decode {
        path: path.to_string(),
        reason: e.to_string(),
    })
}

impl Store for HttpStore {
    fn write(&self, path: &str, value: &Value) -> Result<(), StoreError> {
        if value.is_null() {
            self.send("DELETE", path, None)?;
        } else {
            self.send("PUT", path, Some(value))?;
        }
        Ok(())
    }

    fn read_once(&self, path: &str) -> Result<Option<Value>, StoreError> {
        let body = self.send("GET", path, None)?;
        match decode(path, &body)? {
            Value::Null => Ok(None),
            value => Ok(Some(value)),
        }
    }

    fn push(&self, path: &str, value: &Value) -> Result<String, StoreError> {
        let body = self.send("POST", path, Some(value))?;
        let reply = decode(path, &body)?;
        reply
            .get("name")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| StoreError::Decode {
                path: path.to_string(),
                reason: format!("append reply without a name: {}", body.trim()),
            })
    }
}
