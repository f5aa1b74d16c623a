//! Client configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::retry::RetryConfig;

/// Client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// API origin, e.g. `https://api.workloft.com`
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Client marker sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// IANA time-zone identifier stamped on every request
    #[serde(default = "default_time_zone")]
    pub time_zone: String,

    /// Application credentials attached to auth exchanges, when issued
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_secret: Option<String>,

    /// Default per-request timeout
    #[serde(default = "default_timeout")]
    pub timeout: Duration,

    /// Connection timeout
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: Duration,

    /// Bounded wait for a token-refresh exchange
    #[serde(default = "default_auth_timeout")]
    pub auth_timeout: Duration,

    /// Default retry/backoff for ordinary requests
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            user_agent: default_user_agent(),
            time_zone: default_time_zone(),
            api_key: None,
            api_secret: None,
            timeout: default_timeout(),
            connect_timeout: default_connect_timeout(),
            auth_timeout: default_auth_timeout(),
            retry: RetryConfig::default(),
        }
    }
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Point the client at a different API origin (test servers, staging).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_credentials(
        mut self,
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
    ) -> Self {
        self.api_key = Some(api_key.into());
        self.api_secret = Some(api_secret.into());
        self
    }

    pub fn with_time_zone(mut self, time_zone: impl Into<String>) -> Self {
        self.time_zone = time_zone.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_auth_timeout(mut self, timeout: Duration) -> Self {
        self.auth_timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

/// Per-request overrides for timeout and retry behavior.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub timeout: Option<Duration>,
    pub retry: Option<RetryConfig>,
}

impl RequestOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = Some(retry);
        self
    }
}

// Default value functions for serde
fn default_base_url() -> String {
    "https://api.workloft.com".to_string()
}

fn default_user_agent() -> String {
    format!("WorkloftSDK/{}", env!("CARGO_PKG_VERSION"))
}

fn default_time_zone() -> String {
    "UTC".to_string()
}

fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_auth_timeout() -> Duration {
    Duration::from_secs(30)
}
