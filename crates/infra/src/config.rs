//! Client configuration
//!
//! Defaults target the production upstream; every knob can be overridden
//! through the environment, which is how tests and proxy setups point the
//! client elsewhere.

use std::time::Duration;

use synergia_domain::constants::{
    DEFAULT_API_BASE_URL, DEFAULT_PORTAL_BASE_URL, DEFAULT_USER_AGENT, OAUTH_CLIENT_ID,
    OAUTH_REDIRECT_URI,
};

/// Default per-request timeout (seconds)
///
/// Override via `SYNERGIA_HTTP_TIMEOUT_SECS`
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Configuration for one client session
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the Synergia REST API
    pub api_base_url: String,

    /// Base URL of the account portal (login + token endpoints)
    pub portal_base_url: String,

    /// User agent presented to both hosts
    pub user_agent: String,

    /// Per-request timeout
    pub timeout: Duration,

    /// OAuth client id used for the code and refresh grants
    pub client_id: String,

    /// Redirect URI registered for the OAuth client
    pub redirect_uri: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: env_or("SYNERGIA_API_URL", DEFAULT_API_BASE_URL),
            portal_base_url: env_or("SYNERGIA_PORTAL_URL", DEFAULT_PORTAL_BASE_URL),
            user_agent: env_or("SYNERGIA_USER_AGENT", DEFAULT_USER_AGENT),
            timeout: Duration::from_secs(
                std::env::var("SYNERGIA_HTTP_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_TIMEOUT_SECS),
            ),
            client_id: OAUTH_CLIENT_ID.to_string(),
            redirect_uri: OAUTH_REDIRECT_URI.to_string(),
        }
    }
}

impl ClientConfig {
    /// Config pointing both hosts at one base URL (tests, proxies)
    #[must_use]
    pub fn for_base_url(base: impl Into<String>) -> Self {
        let base = base.into();
        Self { api_base_url: base.clone(), portal_base_url: base, ..Self::default() }
    }

    /// Log the effective configuration at startup
    pub fn log_config(&self) {
        tracing::info!(
            api_base_url = %self.api_base_url,
            portal_base_url = %self.portal_base_url,
            timeout_secs = self.timeout.as_secs(),
            "client configuration loaded"
        );
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
