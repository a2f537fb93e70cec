//! HTTP transport
//!
//! Performs GET/POST against the resource API with the bearer token from
//! the ledger, classifies upstream failures into the typed error
//! taxonomy, and handles exactly one token-refresh retry when the
//! response body carries the application-level expiry code.
//!
//! The expiry-code check runs **before** status dispatch — the upstream
//! reports `TokenIsExpired` with assorted HTTP statuses. A second
//! consecutive expiry signal on the retried request propagates as
//! [`TransportError::TokenExpired`]; there is no unbounded retry loop.

use std::sync::Arc;

use reqwest::{Client, Method};
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use synergia_common::time::{Clock, SystemClock};
use synergia_domain::constants::TOKEN_EXPIRED_CODE;
use synergia_domain::errors::{Result, TransportError};

use crate::auth::TokenLedger;
use crate::config::ClientConfig;

/// Bearer-authenticated HTTP client for the resource API
#[derive(Clone)]
pub struct Transport<C: Clock = SystemClock> {
    http: Client,
    base_url: String,
    ledger: Arc<TokenLedger<C>>,
}

impl<C: Clock> Transport<C> {
    /// Build a transport over the given ledger
    ///
    /// # Errors
    /// `TransportError::Config` if the HTTP client cannot be constructed
    pub fn new(config: &ClientConfig, ledger: Arc<TokenLedger<C>>) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| TransportError::Config(format!("cannot build http client: {e}")))?;

        Ok(Self { http, base_url: config.api_base_url.clone(), ledger })
    }

    /// Join path segments under the base URL
    ///
    /// `["Grades", "42,43,"]` becomes `{base}/Grades/42,43,`.
    #[must_use]
    pub fn assemble_path(&self, segments: &[&str]) -> String {
        let mut uri = self.base_url.clone();
        for segment in segments {
            uri.push('/');
            uri.push_str(segment);
        }
        uri
    }

    /// HTTP GET returning the parsed response document
    pub async fn get(&self, segments: &[&str], params: &[(&str, &str)]) -> Result<Value> {
        self.send(Method::GET, segments, params).await
    }

    /// HTTP POST returning the parsed response document.
    ///
    /// The upstream accepts POST parameters in the query string only (no
    /// request body). Because the token-refresh retry re-issues the exact
    /// same request, callers must tolerate at-most-one duplicate
    /// side-effecting call on a refresh race.
    pub async fn post(&self, segments: &[&str], params: &[(&str, &str)]) -> Result<Value> {
        self.send(Method::POST, segments, params).await
    }

    async fn send(&self, method: Method, segments: &[&str], params: &[(&str, &str)]) -> Result<Value> {
        let url = self.assemble_path(segments);
        let correlation_id = Uuid::new_v4();

        // Initial attempt plus at most one retry after a token refresh
        for attempt in 0..2u8 {
            let token = self.ledger.access_token();
            debug!(%correlation_id, attempt = attempt + 1, %method, %url, "sending request");

            let response = self
                .http
                .request(method.clone(), &url)
                .bearer_auth(&token)
                .query(params)
                .send()
                .await
                .map_err(|e| TransportError::Network(format!("{method} {url}: {e}")))?;

            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .map_err(|e| TransportError::Network(format!("{method} {url}: {e}")))?;

            let document: Value = match serde_json::from_str(&body) {
                Ok(document) => document,
                Err(_) if status >= 400 => return Err(map_status(status, &url, &body)),
                Err(e) => {
                    return Err(TransportError::Parse(format!("{method} {url}: {e}")));
                }
            };

            // Application-level expiry beats status dispatch
            if document.get("Code").and_then(Value::as_str) == Some(TOKEN_EXPIRED_CODE) {
                if attempt == 0 {
                    debug!(%correlation_id, "upstream reports expired token, refreshing once");
                    self.ledger.refresh_if_stale(&token).await?;
                    continue;
                }
                warn!(%correlation_id, %url, "token still expired after refresh");
                return Err(TransportError::TokenExpired);
            }

            if status >= 400 {
                return Err(map_status(status, &url, &body));
            }

            debug!(%correlation_id, status, "request succeeded");
            return Ok(document);
        }

        Err(TransportError::TokenExpired)
    }
}

/// Exact status-code dispatch table
fn map_status(status: u16, url: &str, body: &str) -> TransportError {
    let message = if body.is_empty() {
        format!("{url} returned {status}")
    } else {
        format!("{url} returned {status}: {body}")
    };

    match status {
        400 => TransportError::InvalidRequest(message),
        401 => TransportError::AccessDenied(message),
        403 => TransportError::Forbidden(message),
        404 => TransportError::EndpointNotFound(message),
        500 => TransportError::Server(message),
        503 => TransportError::Maintenance(message),
        code => TransportError::Unclassified { status: code, message },
    }
}
