use crate::index::VersionPolicy;
use crate::publish::CommandTemplates;
use crate::worker::http::HttpConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub sync: SyncSettings,
    #[serde(default)]
    pub http: HttpSettings,
    #[serde(default)]
    pub commands: CommandTemplates,
}

/// Worker pool and failure policy
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SyncSettings {
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default)]
    pub version_policy: VersionPolicy,
    /// Treat upload and reindex failures as fatal for the exit status
    #[serde(default)]
    pub fail_on_publish_error: bool,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            version_policy: VersionPolicy::default(),
            fail_on_publish_error: false,
        }
    }
}

fn default_workers() -> usize {
    3
}

/// HTTP timeouts and retry behaviour
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct HttpSettings {
    /// Connect, per-read and index fetch timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Upper bound for a whole chart download
    #[serde(default = "default_download_timeout_secs")]
    pub download_timeout_secs: u64,
    #[serde(default = "default_retries")]
    pub retries: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            download_timeout_secs: default_download_timeout_secs(),
            retries: default_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            user_agent: default_user_agent(),
        }
    }
}

impl HttpSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn http_config(&self) -> HttpConfig {
        HttpConfig {
            connect_timeout: self.timeout(),
            read_timeout: self.timeout(),
            request_timeout: Duration::from_secs(self.download_timeout_secs),
            max_retries: self.retries,
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
            user_agent: self.user_agent.clone(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_download_timeout_secs() -> u64 {
    600
}

fn default_retries() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    500
}

fn default_user_agent() -> String {
    format!("chartsync/{}", env!("CARGO_PKG_VERSION"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let settings: Settings = toml::from_str(
            r#"
[http]
retries = 5
            "#,
        )
        .unwrap();

        assert_eq!(settings.http.retries, 5);
        assert_eq!(settings.http.timeout_secs, 10);
        assert_eq!(settings.sync.workers, 3);
        assert_eq!(settings.commands, CommandTemplates::default());
    }

    #[test]
    fn test_http_config_conversion() {
        let config = HttpSettings {
            timeout_secs: 4,
            retry_backoff_ms: 250,
            ..HttpSettings::default()
        }
        .http_config();

        assert_eq!(config.connect_timeout, Duration::from_secs(4));
        assert_eq!(config.read_timeout, Duration::from_secs(4));
        assert_eq!(config.request_timeout, Duration::from_secs(600));
        assert_eq!(config.retry_backoff, Duration::from_millis(250));
        assert_eq!(config.max_retries, 3);
    }
}
