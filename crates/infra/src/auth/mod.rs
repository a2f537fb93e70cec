//! Authentication: portal flows and the token ledger
//!
//! The portal client speaks the account portal's login and token
//! endpoints; the token ledger owns the mutable token state for one
//! authenticated identity and guards refreshes. The ledger talks to the
//! portal through the [`AuthFlow`] trait so tests can inject stubs.

mod ledger;
mod portal;

use async_trait::async_trait;
use synergia_domain::errors::AuthError;
use synergia_domain::types::TokenState;

pub use ledger::{ExpiryCheck, TokenLedger};
pub use portal::{PortalClient, SynergiaAccount};

/// Upstream operations the token ledger depends on
#[async_trait]
pub trait AuthFlow: Send + Sync {
    /// Renew the given token state: exchange the refresh token for a new
    /// root token, then re-derive the resource token for the state's
    /// login.
    ///
    /// # Errors
    /// `AuthError::RefreshRejected` if the upstream rejects the refresh
    /// token — fatal, the caller must re-authenticate from scratch.
    async fn renew(&self, state: &TokenState) -> Result<TokenState, AuthError>;

    /// Cheap authenticated probe of the resource API.
    ///
    /// Returns `Ok(false)` when the upstream answers HTTP 401 (the token
    /// is expired), `Ok(true)` otherwise.
    async fn probe(&self, access_token: &str) -> Result<bool, AuthError>;
}
