//! Typed settings for `rcmd.toml`.
//!
//! Every table and key is optional; missing values fall back to the
//! protocol defaults (2s agent poll, 5s back-off, 20s liveness window,
//! 10s refresh, 1s × 20 result polls).

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default store root used when nothing is configured.
pub const DEFAULT_STORE_URL: &str = "http://127.0.0.1:9000/";

/// Root configuration document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub store: StoreSettings,
    pub agent: AgentSettings,
    pub controller: ControllerSettings,
    pub runner: RunnerSettings,
}

/// Connection to the shared key/value store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreSettings {
    /// Root URL of the store (e.g. `https://<db>.firebaseio.com/`).
    pub url: String,
    /// Per-request timeout (seconds).
    pub request_timeout_secs: u64,
    /// Optional access token, sent as the `auth` query parameter.
    pub auth_token: String,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_STORE_URL.to_string(),
            request_timeout_secs: 15,
            auth_token: String::new(),
        }
    }
}

impl StoreSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// The auth token, if one is configured.
    pub fn auth(&self) -> Option<&str> {
        let token = self.auth_token.trim();
        (!token.is_empty()).then_some(token)
    }
}

/// Machine-side loop settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AgentSettings {
    /// Machine id override; empty means "derive from the host name".
    pub machine_id: String,
    /// Sleep between cycles (seconds).
    pub poll_interval_secs: u64,
    /// Sleep after a loop-level failure (seconds).
    pub backoff_secs: u64,
    /// Working directory for launched commands; empty means the OS temp dir.
    pub working_dir: String,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            machine_id: String::new(),
            poll_interval_secs: 2,
            backoff_secs: 5,
            working_dir: String::new(),
        }
    }
}

impl AgentSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_secs(self.backoff_secs)
    }

    /// Resolved working directory.
    pub fn working_dir(&self) -> PathBuf {
        if self.working_dir.trim().is_empty() {
            std::env::temp_dir()
        } else {
            PathBuf::from(self.working_dir.trim())
        }
    }
}

/// Operator-side liveness and submission settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ControllerSettings {
    /// Maximum heartbeat age for a machine to count as online (seconds).
    pub online_timeout_secs: u64,
    /// Cadence of the online-list refresh (seconds).
    pub refresh_interval_secs: u64,
    /// Delay between result polls (seconds).
    pub poll_interval_secs: u64,
    /// Number of result polls before reporting a timeout.
    pub poll_attempts: u32,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            online_timeout_secs: 20,
            refresh_interval_secs: 10,
            poll_interval_secs: 1,
            poll_attempts: 20,
        }
    }
}

impl ControllerSettings {
    pub fn online_timeout(&self) -> Duration {
        Duration::from_secs(self.online_timeout_secs)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

/// Process runner limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunnerSettings {
    /// Cap per captured stream (bytes).
    pub max_output_bytes: usize,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            max_output_bytes: 1024 * 1024,
        }
    }
}

impl Settings {
    /// Parse settings from TOML text.
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Render settings back to TOML.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_protocol_constants() {
        let s = Settings::default();
        assert_eq!(s.agent.poll_interval(), Duration::from_secs(2));
        assert_eq!(s.agent.backoff(), Duration::from_secs(5));
        assert_eq!(s.controller.online_timeout(), Duration::from_secs(20));
        assert_eq!(s.controller.refresh_interval(), Duration::from_secs(10));
        assert_eq!(s.controller.poll_interval(), Duration::from_secs(1));
        assert_eq!(s.controller.poll_attempts, 20);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let s = Settings::from_toml(
            r#"
            [store]
            url = "https://db.example.com/"

            [controller]
            poll_attempts = 5
            "#,
        )
        .unwrap();

        assert_eq!(s.store.url, "https://db.example.com/");
        assert_eq!(s.store.request_timeout_secs, 15);
        assert_eq!(s.controller.poll_attempts, 5);
        assert_eq!(s.controller.online_timeout_secs, 20);
        assert_eq!(s.agent, AgentSettings::default());
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let err = Settings::from_toml("[agent]\npoll_intervl_secs = 3\n").unwrap_err();
        assert!(err.to_string().contains("poll_intervl_secs"));
    }

    #[test]
    fn test_working_dir_defaults_to_temp() {
        let agent = AgentSettings::default();
        assert_eq!(agent.working_dir(), std::env::temp_dir());

        let agent = AgentSettings {
            working_dir: " /srv/rcmd ".into(),
            ..AgentSettings::default()
        };
        assert_eq!(agent.working_dir(), PathBuf::from("/srv/rcmd"));
    }

    #[test]
    fn test_auth_token_blank_is_none() {
        let mut store = StoreSettings::default();
        assert_eq!(store.auth(), None);
        store.auth_token = "secret".into();
        assert_eq!(store.auth(), Some("secret"));
    }

    #[test]
    fn test_toml_roundtrip_preserves_settings() {
        let mut s = Settings::default();
        s.agent.machine_id = "m1".into();
        let text = s.to_toml().unwrap();
        assert_eq!(Settings::from_toml(&text).unwrap(), s);
    }
}
