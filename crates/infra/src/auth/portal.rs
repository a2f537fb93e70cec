//! Account portal client
//!
//! Drives the portal's browser-oriented login flow and the OAuth-style
//! token endpoints:
//!
//! 1. Fetch the login page, scrape the CSRF meta token
//! 2. POST JSON credentials with `X-CSRF-TOKEN`
//! 3. Follow the returned redirect (without auto-redirecting) and harvest
//!    the authorization code from the `Location` header
//! 4. `grant_type=authorization_code` exchange for root + refresh tokens
//! 5. List Synergia accounts and derive per-login resource tokens; the
//!    `fresh/{login}` endpoint re-derives a short-lived resource token
//!    from the root token
//!
//! The portal is session-cookie based, so both underlying HTTP clients
//! share one cookie jar; redirect harvesting uses a non-following client.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::cookie::Jar;
use reqwest::redirect::Policy;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, info};
use url::Url;

use synergia_domain::constants::TOKEN_PROBE_PATH;
use synergia_domain::errors::AuthError;
use synergia_domain::types::TokenState;

use super::AuthFlow;
use crate::config::ClientConfig;

/// Fallback lifetime when the token endpoint omits `expires_in`
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

#[allow(clippy::expect_used)]
static CSRF_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"name="csrf-token" content="([^"]+)""#).expect("static regex")
});

/// One Synergia account reachable from a portal identity
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SynergiaAccount {
    pub id: i64,
    pub login: String,
    pub access_token: String,
    #[serde(default)]
    pub student_name: String,
}

/// Token endpoint response (RFC 6749 shape)
#[derive(Debug, Deserialize)]
struct TokenGrant {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct AccountsDocument {
    accounts: Vec<SynergiaAccount>,
}

#[derive(Debug, Deserialize)]
struct LoginRedirect {
    redirect: String,
}

/// Client for the account portal's login and token endpoints
pub struct PortalClient {
    config: ClientConfig,
    /// Follows redirects; used for page fetches and form posts
    http: Client,
    /// Never follows redirects; used to harvest authorization codes
    http_no_redirect: Client,
}

impl PortalClient {
    /// Build a portal client from configuration
    ///
    /// # Errors
    /// `AuthError::Portal` if the HTTP clients cannot be constructed
    pub fn new(config: ClientConfig) -> Result<Self, AuthError> {
        let jar = Arc::new(Jar::default());

        let http = Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .cookie_provider(Arc::clone(&jar))
            .build()
            .map_err(|e| AuthError::Portal(format!("cannot build http client: {e}")))?;

        let http_no_redirect = Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .cookie_provider(jar)
            .redirect(Policy::none())
            .build()
            .map_err(|e| AuthError::Portal(format!("cannot build http client: {e}")))?;

        Ok(Self { config, http, http_no_redirect })
    }

    fn authorize_url(&self) -> String {
        format!(
            "{}/oauth2/authorize?client_id={}&redirect_uri={}&response_type=code",
            self.config.portal_base_url,
            self.config.client_id,
            urlencoding::encode(&self.config.redirect_uri),
        )
    }

    /// Run the credential login and return an authorization code
    pub async fn authorize_code(&self, email: &str, password: &str) -> Result<String, AuthError> {
        let page = self
            .http
            .get(self.authorize_url())
            .send()
            .await
            .map_err(|e| AuthError::Portal(format!("authorize page fetch failed: {e}")))?
            .text()
            .await
            .map_err(|e| AuthError::Portal(format!("authorize page read failed: {e}")))?;

        let csrf = CSRF_TOKEN
            .captures(&page)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| AuthError::Portal("login page carries no csrf-token meta".into()))?;

        debug!("posting portal credentials");
        let response = self
            .http
            .post(format!("{}/rodzina/login/action", self.config.portal_base_url))
            .header("X-CSRF-TOKEN", csrf)
            .json(&serde_json::json!({"email": email, "password": password}))
            .send()
            .await
            .map_err(|e| AuthError::Portal(format!("login post failed: {e}")))?;

        match response.status() {
            StatusCode::UNAUTHORIZED => {
                let body = response.text().await.unwrap_or_default();
                return Err(AuthError::InvalidCredentials(body));
            }
            StatusCode::FORBIDDEN => {
                let body = response.text().await.unwrap_or_default();
                if body.to_lowercase().contains("captcha") {
                    return Err(AuthError::CaptchaRequired);
                }
                return Err(AuthError::InvalidCredentials(body));
            }
            status if !status.is_success() => {
                let body = response.text().await.unwrap_or_default();
                return Err(AuthError::Portal(format!("login returned {status}: {body}")));
            }
            _ => {}
        }

        let redirect: LoginRedirect = response
            .json()
            .await
            .map_err(|e| AuthError::Portal(format!("login response is not json: {e}")))?;

        self.harvest_code(&redirect.redirect).await
    }

    /// Re-run the authorize round-trip on an already-authenticated cookie
    /// session; the portal answers with an immediate code redirect.
    pub async fn revalidate_code(&self) -> Result<String, AuthError> {
        self.harvest_code(&self.authorize_url()).await
    }

    /// GET `url` without following redirects and pull the `code` query
    /// parameter out of the `Location` target
    async fn harvest_code(&self, url: &str) -> Result<String, AuthError> {
        let response = self
            .http_no_redirect
            .get(url)
            .send()
            .await
            .map_err(|e| AuthError::Portal(format!("code redirect fetch failed: {e}")))?;

        let location = response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AuthError::Portal("expected a redirect carrying the code".into()))?;

        let target = Url::parse(location)
            .map_err(|e| AuthError::Portal(format!("unparseable redirect target: {e}")))?;
        target
            .query_pairs()
            .find(|(k, _)| k == "code")
            .map(|(_, v)| v.into_owned())
            .ok_or_else(|| AuthError::Portal(format!("redirect carries no code: {location}")))
    }

    /// `grant_type=authorization_code` exchange
    pub async fn exchange_code(&self, code: &str) -> Result<(String, String, i64), AuthError> {
        let grant = self
            .token_request(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("client_id", &self.config.client_id),
                ("redirect_uri", &self.config.redirect_uri),
            ])
            .await
            .map_err(|e| match e {
                AuthError::RefreshRejected(msg) => AuthError::Portal(msg),
                other => other,
            })?;

        let refresh = grant
            .refresh_token
            .ok_or_else(|| AuthError::Portal("token endpoint issued no refresh token".into()))?;
        Ok((grant.access_token, refresh, grant.expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS)))
    }

    /// `grant_type=refresh_token` renewal of the root token
    async fn refresh_root(&self, refresh_token: &str) -> Result<TokenGrant, AuthError> {
        self.token_request(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", &self.config.client_id),
        ])
        .await
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> Result<TokenGrant, AuthError> {
        let response = self
            .http
            .post(format!("{}/oauth2/access_token", self.config.portal_base_url))
            .form(form)
            .send()
            .await
            .map_err(|e| AuthError::Portal(format!("token endpoint unreachable: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::RefreshRejected(format!("{status}: {body}")));
        }

        response
            .json()
            .await
            .map_err(|e| AuthError::Portal(format!("token response is not json: {e}")))
    }

    /// List the Synergia accounts reachable with a root token
    pub async fn accounts(&self, root_token: &str) -> Result<Vec<SynergiaAccount>, AuthError> {
        let response = self
            .http
            .get(format!("{}/api/SynergiaAccounts", self.config.portal_base_url))
            .bearer_auth(root_token)
            .send()
            .await
            .map_err(|e| AuthError::Portal(format!("accounts listing unreachable: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Portal(format!("accounts listing returned {status}: {body}")));
        }

        let document: AccountsDocument = response
            .json()
            .await
            .map_err(|e| AuthError::Portal(format!("accounts listing is not json: {e}")))?;
        Ok(document.accounts)
    }

    /// Re-derive a short-lived resource token for one login from the
    /// root token
    pub async fn fresh_account(
        &self,
        root_token: &str,
        login: &str,
    ) -> Result<SynergiaAccount, AuthError> {
        let response = self
            .http
            .get(format!("{}/api/SynergiaAccounts/fresh/{login}", self.config.portal_base_url))
            .bearer_auth(root_token)
            .send()
            .await
            .map_err(|e| AuthError::Portal(format!("fresh-token endpoint unreachable: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Portal(format!(
                "fresh-token endpoint returned {status}: {body}"
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AuthError::Portal(format!("fresh-token response is not json: {e}")))
    }

    /// Full credential login: code, exchange, account listing.
    ///
    /// Returns one [`TokenState`] per reachable Synergia account, in the
    /// portal's listing order.
    pub async fn login(&self, email: &str, password: &str) -> Result<Vec<TokenState>, AuthError> {
        let code = self.authorize_code(email, password).await?;
        let (root, refresh, expires_in) = self.exchange_code(&code).await?;
        let accounts = self.accounts(&root).await?;
        let expires_at = Utc::now() + chrono::Duration::seconds(expires_in);

        info!(accounts = accounts.len(), "portal login succeeded");

        Ok(accounts
            .into_iter()
            .map(|account| TokenState {
                access_token: account.access_token,
                refresh_token: refresh.clone(),
                root_token: Some(root.clone()),
                login: account.login,
                expires_at,
            })
            .collect())
    }

    /// Convenience wrapper returning the first account only
    pub async fn login_first(&self, email: &str, password: &str) -> Result<TokenState, AuthError> {
        self.login(email, password)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| AuthError::Portal("portal identity has no Synergia accounts".into()))
    }
}

#[async_trait]
impl AuthFlow for PortalClient {
    async fn renew(&self, state: &TokenState) -> Result<TokenState, AuthError> {
        let grant = self.refresh_root(&state.refresh_token).await?;
        let account = self.fresh_account(&grant.access_token, &state.login).await?;

        let lifetime = grant.expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS);
        Ok(TokenState {
            access_token: account.access_token,
            refresh_token: grant.refresh_token.unwrap_or_else(|| state.refresh_token.clone()),
            root_token: Some(grant.access_token),
            login: state.login.clone(),
            expires_at: Utc::now() + chrono::Duration::seconds(lifetime),
        })
    }

    async fn probe(&self, access_token: &str) -> Result<bool, AuthError> {
        let response = self
            .http
            .get(format!("{}/{}", self.config.api_base_url, TOKEN_PROBE_PATH))
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| AuthError::Portal(format!("probe request failed: {e}")))?;

        Ok(response.status() != StatusCode::UNAUTHORIZED)
    }
}
