//! Token ledger
//!
//! Owns the mutable token state for one authenticated identity. Reads
//! never block on I/O; refreshes are mutually exclusive and their result
//! is shared by every waiter that observed the same stale token, so
//! concurrent expiry signals trigger exactly one upstream renewal.

use std::sync::Arc;

use parking_lot::RwLock;
use synergia_common::time::{Clock, SystemClock};
use synergia_domain::errors::AuthError;
use synergia_domain::types::TokenState;
use tracing::{debug, info};

use super::AuthFlow;

/// Outcome of [`TokenLedger::is_expired`]
///
/// The two checks are optional and independent; callers combine them
/// (e.g. trust only the live probe).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiryCheck {
    /// Stored expiry compared against the clock; `None` if not requested
    pub by_clock: Option<bool>,
    /// Authenticated probe verdict (401 ⇒ expired); `None` if not requested
    pub by_probe: Option<bool>,
}

impl ExpiryCheck {
    /// True if any requested check reported the token expired
    #[must_use]
    pub fn any(&self) -> bool {
        self.by_clock.unwrap_or(false) || self.by_probe.unwrap_or(false)
    }
}

/// Token state holder with guarded refresh
pub struct TokenLedger<C: Clock = SystemClock> {
    state: RwLock<TokenState>,
    /// Serializes refreshes; waiters re-check state after acquiring
    refresh_guard: tokio::sync::Mutex<()>,
    flow: Arc<dyn AuthFlow>,
    clock: C,
}

impl TokenLedger<SystemClock> {
    /// Create a ledger over the given state and auth flow
    pub fn new(state: TokenState, flow: Arc<dyn AuthFlow>) -> Self {
        Self::with_clock(state, flow, SystemClock)
    }
}

impl<C: Clock> TokenLedger<C> {
    /// Create a ledger with a custom clock (for testing)
    pub fn with_clock(state: TokenState, flow: Arc<dyn AuthFlow>, clock: C) -> Self {
        Self { state: RwLock::new(state), refresh_guard: tokio::sync::Mutex::new(()), flow, clock }
    }

    /// Most recent access token. Never blocks on I/O.
    #[must_use]
    pub fn access_token(&self) -> String {
        self.state.read().access_token.clone()
    }

    /// Snapshot of the full token state
    #[must_use]
    pub fn state(&self) -> TokenState {
        self.state.read().clone()
    }

    /// The login this ledger's tokens are scoped to
    #[must_use]
    pub fn login(&self) -> String {
        self.state.read().login.clone()
    }

    /// Exchange the refresh token for new token material.
    ///
    /// Mutually exclusive; the expiry instant never moves backwards
    /// across refreshes of the same identity.
    ///
    /// # Errors
    /// `AuthError::RefreshRejected` is fatal: the caller must
    /// re-authenticate from scratch.
    pub async fn refresh(&self) -> Result<(), AuthError> {
        let _guard = self.refresh_guard.lock().await;
        self.renew_locked().await
    }

    /// Refresh only if `observed_token` is still the current one.
    ///
    /// This is the single-flight entry point used by the transport: a
    /// waiter that blocked behind another refresh finds the token already
    /// replaced and returns `Ok(false)` without a second upstream call.
    pub async fn refresh_if_stale(&self, observed_token: &str) -> Result<bool, AuthError> {
        let _guard = self.refresh_guard.lock().await;
        if self.state.read().access_token != observed_token {
            debug!("token already refreshed by a concurrent caller");
            return Ok(false);
        }
        self.renew_locked().await?;
        Ok(true)
    }

    async fn renew_locked(&self) -> Result<(), AuthError> {
        let snapshot = self.state();
        let mut renewed = self.flow.renew(&snapshot).await?;

        // Expiry is monotonically non-decreasing for one identity
        if renewed.expires_at < snapshot.expires_at {
            renewed.expires_at = snapshot.expires_at;
        }

        *self.state.write() = renewed;
        info!("access token refreshed");
        Ok(())
    }

    /// Expiry status via the requested checks.
    ///
    /// The clock check compares the stored expiry against now; the live
    /// check issues an authenticated probe and treats HTTP 401 as
    /// expired. Either can be skipped.
    pub async fn is_expired(
        &self,
        use_clock: bool,
        use_live_probe: bool,
    ) -> Result<ExpiryCheck, AuthError> {
        let by_clock = use_clock.then(|| {
            let state = self.state.read();
            state.is_expired_at(self.clock.utc_now())
        });

        let by_probe = if use_live_probe {
            let token = self.access_token();
            Some(!self.flow.probe(&token).await?)
        } else {
            None
        };

        Ok(ExpiryCheck { by_clock, by_probe })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::{TimeDelta, Utc};
    use synergia_common::time::MockClock;

    use super::*;

    /// Flow stub that counts renewals and hands out sequenced tokens
    struct CountingFlow {
        renewals: AtomicUsize,
        delay: Duration,
        probe_valid: bool,
        expiry_offset_secs: i64,
    }

    impl CountingFlow {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                renewals: AtomicUsize::new(0),
                delay: Duration::ZERO,
                probe_valid: true,
                expiry_offset_secs: 3600,
            })
        }

        fn slow() -> Arc<Self> {
            Arc::new(Self {
                renewals: AtomicUsize::new(0),
                delay: Duration::from_millis(50),
                probe_valid: true,
                expiry_offset_secs: 3600,
            })
        }

        fn count(&self) -> usize {
            self.renewals.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl AuthFlow for CountingFlow {
        async fn renew(&self, state: &TokenState) -> Result<TokenState, AuthError> {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let n = self.renewals.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(TokenState {
                access_token: format!("token-{n}"),
                refresh_token: state.refresh_token.clone(),
                root_token: state.root_token.clone(),
                login: state.login.clone(),
                expires_at: Utc::now() + TimeDelta::seconds(self.expiry_offset_secs),
            })
        }

        async fn probe(&self, _access_token: &str) -> Result<bool, AuthError> {
            Ok(self.probe_valid)
        }
    }

    fn initial_state() -> TokenState {
        TokenState {
            access_token: "token-0".into(),
            refresh_token: "refresh".into(),
            root_token: None,
            login: "1234567u".into(),
            expires_at: Utc::now() + TimeDelta::seconds(60),
        }
    }

    #[tokio::test]
    async fn refresh_replaces_token() {
        let flow = CountingFlow::new();
        let ledger = TokenLedger::new(initial_state(), Arc::clone(&flow) as _);

        assert_eq!(ledger.access_token(), "token-0");
        ledger.refresh().await.unwrap();
        assert_eq!(ledger.access_token(), "token-1");
        assert_eq!(flow.count(), 1);
    }

    #[tokio::test]
    async fn concurrent_stale_observers_share_one_refresh() {
        let flow = CountingFlow::slow();
        let ledger =
            Arc::new(TokenLedger::new(initial_state(), Arc::clone(&flow) as Arc<dyn AuthFlow>));

        // Both tasks observed the same stale token before either refreshed
        let a = {
            let ledger = Arc::clone(&ledger);
            tokio::spawn(async move { ledger.refresh_if_stale("token-0").await })
        };
        let b = {
            let ledger = Arc::clone(&ledger);
            tokio::spawn(async move { ledger.refresh_if_stale("token-0").await })
        };

        let (a, b) = (a.await.unwrap().unwrap(), b.await.unwrap().unwrap());

        // Exactly one performed the upstream renewal
        assert_eq!(flow.count(), 1);
        assert_eq!([a, b].iter().filter(|refreshed| **refreshed).count(), 1);
        assert_eq!(ledger.access_token(), "token-1");
    }

    #[tokio::test]
    async fn refresh_if_stale_skips_when_token_already_replaced() {
        let flow = CountingFlow::new();
        let ledger = TokenLedger::new(initial_state(), Arc::clone(&flow) as _);

        ledger.refresh().await.unwrap();
        assert_eq!(flow.count(), 1);

        // An observer holding the pre-refresh token does not trigger another
        let refreshed = ledger.refresh_if_stale("token-0").await.unwrap();
        assert!(!refreshed);
        assert_eq!(flow.count(), 1);
    }

    #[tokio::test]
    async fn expiry_never_moves_backwards() {
        let flow = Arc::new(CountingFlow {
            renewals: AtomicUsize::new(0),
            delay: Duration::ZERO,
            probe_valid: true,
            // Upstream hands back an already-old expiry
            expiry_offset_secs: -600,
        });
        let state = initial_state();
        let original_expiry = state.expires_at;
        let ledger = TokenLedger::new(state, flow as Arc<dyn AuthFlow>);

        ledger.refresh().await.unwrap();

        assert_eq!(ledger.state().expires_at, original_expiry);
    }

    #[tokio::test]
    async fn clock_check_respects_stored_expiry() {
        let clock = MockClock::new();
        let flow = CountingFlow::new();
        let mut state = initial_state();
        state.expires_at = clock.utc_now() + TimeDelta::seconds(120);
        let ledger = TokenLedger::with_clock(state, Arc::clone(&flow) as _, clock.clone());

        let check = ledger.is_expired(true, false).await.unwrap();
        assert_eq!(check.by_clock, Some(false));
        assert_eq!(check.by_probe, None);
        assert!(!check.any());

        clock.advance(Duration::from_secs(180));
        let check = ledger.is_expired(true, false).await.unwrap();
        assert_eq!(check.by_clock, Some(true));
        assert!(check.any());
    }

    #[tokio::test]
    async fn live_probe_is_independent_of_clock() {
        let flow = Arc::new(CountingFlow {
            renewals: AtomicUsize::new(0),
            delay: Duration::ZERO,
            probe_valid: false,
            expiry_offset_secs: 3600,
        });
        let mut state = initial_state();
        // Clock says the token is fine for another hour
        state.expires_at = Utc::now() + TimeDelta::seconds(3600);
        let ledger = TokenLedger::new(state, flow as Arc<dyn AuthFlow>);

        let check = ledger.is_expired(true, true).await.unwrap();
        assert_eq!(check.by_clock, Some(false));
        assert_eq!(check.by_probe, Some(true));
        assert!(check.any());
    }

    #[tokio::test]
    async fn neither_check_requested_yields_empty_verdicts() {
        let flow = CountingFlow::new();
        let ledger = TokenLedger::new(initial_state(), Arc::clone(&flow) as _);

        let check = ledger.is_expired(false, false).await.unwrap();
        assert_eq!(check, ExpiryCheck { by_clock: None, by_probe: None });
        assert!(!check.any());
    }
}
