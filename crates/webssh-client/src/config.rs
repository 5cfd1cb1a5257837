//! Client configuration.
//!
//! Every endpoint lives under `{base_url}{prefix}`. The prefix is the
//! server's sub-path (usually its registered name) and is resolved by the
//! caller once, then handed in here.

use reqwest::Url;
use std::time::Duration;
use webssh_core::{TransferId, field};

/// Where the server lives and how long calls may take.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    base_url: Url,
    ws_base_url: Url,
    prefix: String,
    timeout: Option<Duration>,
}

impl ClientConfig {
    /// Build a configuration for an `http` or `https` origin.
    pub fn new(base_url: &str) -> Result<Self, ConfigError> {
        let base_url = Url::parse(base_url).map_err(|e| ConfigError::InvalidUrl {
            url: base_url.to_string(),
            reason: e.to_string(),
        })?;

        let ws_scheme = match base_url.scheme() {
            "http" => "ws",
            "https" => "wss",
            other => return Err(ConfigError::UnsupportedScheme(other.to_string())),
        };
        let mut ws_base_url = base_url.clone();
        ws_base_url
            .set_scheme(ws_scheme)
            .map_err(|()| ConfigError::UnsupportedScheme(ws_scheme.to_string()))?;

        Ok(Self {
            base_url,
            ws_base_url,
            prefix: String::new(),
            timeout: None,
        })
    }

    /// Set the sub-path all endpoints are rooted under.
    ///
    /// Normalised to a single leading `/` and no trailing `/`; an empty
    /// prefix roots endpoints at the origin.
    pub fn with_prefix(mut self, prefix: &str) -> Self {
        let trimmed = prefix.trim().trim_matches('/');
        self.prefix = if trimmed.is_empty() {
            String::new()
        } else {
            format!("/{trimmed}")
        };
        self
    }

    /// Default deadline applied to every individual operation.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// HTTP URL of an endpoint such as [`webssh_core::endpoint::LIST`].
    pub fn endpoint_url(&self, endpoint: &str) -> Url {
        Self::join(&self.base_url, &self.prefix, endpoint)
    }

    /// WebSocket URL of the progress channel for `id`.
    pub fn progress_ws_url(&self, id: &TransferId) -> Url {
        let mut url = Self::join(
            &self.ws_base_url,
            &self.prefix,
            webssh_core::endpoint::PROGRESS,
        );
        url.query_pairs_mut().append_pair(field::ID, id.as_str());
        url
    }

    fn join(base: &Url, prefix: &str, endpoint: &str) -> Url {
        let mut url = base.clone();
        let path = format!("{}{}{}", base.path().trim_end_matches('/'), prefix, endpoint);
        url.set_path(&path);
        url.set_query(None);
        url
    }
}

/// Error building a [`ClientConfig`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid server URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("unsupported URL scheme {0:?}, expected http or https")]
    UnsupportedScheme(String),
    #[error("failed to build HTTP client: {0}")]
    Client(String),
}
