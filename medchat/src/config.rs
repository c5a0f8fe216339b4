use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

/// Settings for talking to the chat backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the chat API, without a trailing slash.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Pause before re-listing chats after a reply, so the server can retitle the chat.
    #[serde(default = "default_title_refresh_delay_ms")]
    pub title_refresh_delay_ms: u64,
}

fn default_base_url() -> String {
    "http://127.0.0.1:5000".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_connect_timeout_secs() -> u64 {
    10
}
fn default_title_refresh_delay_ms() -> u64 {
    500
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            title_refresh_delay_ms: default_title_refresh_delay_ms(),
        }
    }
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::default().with_base_url(base_url)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_title_refresh_delay(mut self, delay: Duration) -> Self {
        self.title_refresh_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Defaults overlaid with `MEDCHAT_API_URL`, `MEDCHAT_TIMEOUT_SECS` and
    /// `MEDCHAT_TITLE_REFRESH_MS`.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("MEDCHAT_API_URL") {
            config = config.with_base_url(url);
        }
        if let Some(secs) = env_u64("MEDCHAT_TIMEOUT_SECS") {
            config.timeout_secs = secs;
        }
        if let Some(ms) = env_u64("MEDCHAT_TITLE_REFRESH_MS") {
            config.title_refresh_delay_ms = ms;
        }

        config
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn title_refresh_delay(&self) -> Duration {
        Duration::from_millis(self.title_refresh_delay_ms)
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

fn env_u64(key: &str) -> Option<u64> {
    let raw = std::env::var(key).ok()?;
    match raw.parse::<u64>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring {}={:?}: not a whole number", key, raw);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.base_url, "http://127.0.0.1:5000");
        assert_eq!(config.title_refresh_delay(), Duration::from_millis(500));
    }

    #[test]
    fn test_endpoint_joins_without_double_slash() {
        let config = ClientConfig::new("http://localhost:5000/");
        assert_eq!(config.endpoint("/get_chats"), "http://localhost:5000/get_chats");
        assert_eq!(config.endpoint("chat"), "http://localhost:5000/chat");
    }

    #[test]
    fn test_partial_config_uses_field_defaults() {
        let config: ClientConfig =
            serde_json::from_str(r#"{"base_url": "http://api.local"}"#).unwrap();
        assert_eq!(config.base_url, "http://api.local");
        assert_eq!(config.timeout_secs, 30);
        assert_eq!(config.connect_timeout_secs, 10);
    }
}
