//! Client configuration and the transport client built from it.
//!
//! [`HttpClientConfig`] is plain data (user agent, redirect policy, cookie
//! policy, timeouts) and can be loaded from a JSON file. [`HttpClient`] wraps
//! the `reqwest::Client` built from a config and is what requests are issued
//! through. Building the client once and sharing it keeps cookies in a single
//! jar across requests.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use reqwest::cookie::Jar;
use reqwest::redirect::Policy;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::constants::{
    CONNECT_TIMEOUT_SECS, DEFAULT_MAX_REDIRECTS, MAX_REDIRECTS_LIMIT, READ_TIMEOUT_SECS,
};
use super::error::TransportError;
use crate::user_agent;

/// Transport settings shared by every request issued through one [`HttpClient`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpClientConfig {
    /// User-Agent header sent with every request.
    pub user_agent: String,
    /// Follow redirects automatically.
    pub auto_redirect: bool,
    /// Redirect hop limit when `auto_redirect` is enabled.
    pub max_redirects: usize,
    /// Store and send cookies.
    pub use_cookies: bool,
    /// Connect timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Total request timeout in seconds.
    pub read_timeout_secs: u64,
    /// Accept and transparently decode gzip bodies.
    pub gzip: bool,
    /// Shared cookie store; a fresh jar is created when cookies are enabled
    /// and none was supplied.
    #[serde(skip)]
    pub cookie_jar: Option<Arc<Jar>>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            user_agent: user_agent::default_user_agent(),
            auto_redirect: true,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            use_cookies: false,
            connect_timeout_secs: CONNECT_TIMEOUT_SECS,
            read_timeout_secs: READ_TIMEOUT_SECS,
            gzip: true,
            cookie_jar: None,
        }
    }
}

impl HttpClientConfig {
    /// Enables cookie handling backed by the given shared jar.
    #[must_use]
    pub fn with_cookie_jar(mut self, jar: Arc<Jar>) -> Self {
        self.use_cookies = true;
        self.cookie_jar = Some(jar);
        self
    }

    /// Loads a JSON config file; missing fields keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Config`] when the file cannot be read, is not
    /// valid JSON, or fails [`validate`](Self::validate).
    pub fn load(path: &Path) -> Result<Self, TransportError> {
        let raw = fs::read_to_string(path).map_err(|e| {
            TransportError::config(format!("cannot read {}: {e}", path.display()))
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|e| {
            TransportError::config(format!("cannot parse {}: {e}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validates values against transport constraints.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Config`] for zero timeouts, an empty user
    /// agent, or a redirect limit above the accepted maximum.
    pub fn validate(&self) -> Result<(), TransportError> {
        if self.connect_timeout_secs == 0 {
            return Err(TransportError::config(
                "connect_timeout_secs must be greater than 0",
            ));
        }
        if self.read_timeout_secs == 0 {
            return Err(TransportError::config(
                "read_timeout_secs must be greater than 0",
            ));
        }
        if self.max_redirects > MAX_REDIRECTS_LIMIT {
            return Err(TransportError::config(format!(
                "max_redirects {} exceeds limit {MAX_REDIRECTS_LIMIT}",
                self.max_redirects
            )));
        }
        if self.user_agent.trim().is_empty() {
            return Err(TransportError::config("user_agent must not be empty"));
        }
        Ok(())
    }

    fn redirect_policy(&self) -> Policy {
        if self.auto_redirect {
            Policy::limited(self.max_redirects)
        } else {
            Policy::none()
        }
    }
}

/// HTTP transport client built from an [`HttpClientConfig`].
///
/// Cheap to clone; clones share the connection state and cookie jar.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    cookie_jar: Option<Arc<Jar>>,
}

impl HttpClient {
    /// Builds a client with the default configuration.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Config`] if the transport cannot be built.
    pub fn new() -> Result<Self, TransportError> {
        Self::from_config(&HttpClientConfig::default())
    }

    /// Builds a client applying user agent, redirect, cookie and timeout
    /// settings from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Config`] if the config is invalid or the
    /// transport cannot be built.
    #[instrument(level = "debug", skip(config), fields(
        auto_redirect = config.auto_redirect,
        use_cookies = config.use_cookies,
    ))]
    pub fn from_config(config: &HttpClientConfig) -> Result<Self, TransportError> {
        config.validate()?;

        let cookie_jar = config.use_cookies.then(|| {
            config
                .cookie_jar
                .clone()
                .unwrap_or_else(|| Arc::new(Jar::default()))
        });

        let mut builder = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.read_timeout_secs))
            .gzip(config.gzip)
            .user_agent(config.user_agent.as_str())
            .redirect(config.redirect_policy());
        if let Some(jar) = &cookie_jar {
            builder = builder.cookie_provider(Arc::clone(jar));
        }

        let client = builder
            .build()
            .map_err(|e| TransportError::config(format!("failed to build HTTP client: {e}")))?;
        debug!("HTTP client built");

        Ok(Self { client, cookie_jar })
    }

    /// The cookie jar in use, when cookie handling is enabled.
    #[must_use]
    pub fn cookie_jar(&self) -> Option<&Arc<Jar>> {
        self.cookie_jar.as_ref()
    }

    /// Returns a reference to the underlying reqwest client.
    #[must_use]
    pub fn inner(&self) -> &Client {
        &self.client
    }
}
