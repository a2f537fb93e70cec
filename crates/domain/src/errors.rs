//! Error types used throughout the client
//!
//! Three layers of failure, kept as separate enums so callers can branch
//! on kind: authentication failures (fatal to the session), transport
//! failures (surfaced after the single permitted token-refresh retry),
//! and relation-resolution failures. A cache miss is never an error; it
//! is an absent result.

use thiserror::Error;

/// Authentication and token-lifecycle errors
///
/// All variants are fatal to the current session and are never retried
/// automatically. Callers must re-authenticate from scratch.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Portal rejected the supplied email/password
    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    /// Portal is demanding a CAPTCHA before it will talk to us again
    #[error("portal requires a CAPTCHA challenge to continue")]
    CaptchaRequired,

    /// Upstream rejected the refresh token; a new login is required
    #[error("token refresh rejected: {0}")]
    RefreshRejected(String),

    /// Login/exchange plumbing failed (unexpected redirect, missing
    /// field, unreachable portal)
    #[error("portal error: {0}")]
    Portal(String),
}

/// Cache store backend errors
///
/// A cache **miss** is represented as `Ok(None)`, never as an error.
/// This enum only covers storage-level failures (e.g. SQLite I/O).
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache storage error: {0}")]
    Storage(String),
}

/// HTTP transport errors
///
/// One variant per upstream status class, plus the bounded-retry and
/// plumbing variants. Status mapping is exact:
///
/// | HTTP status | Variant |
/// |---|---|
/// | 400 | `InvalidRequest` |
/// | 401 | `AccessDenied` |
/// | 403 | `Forbidden` |
/// | 404 | `EndpointNotFound` |
/// | 500 | `Server` |
/// | 503 | `Maintenance` |
/// | other ≥400 | `Unclassified` |
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("endpoint not found: {0}")]
    EndpointNotFound(String),

    #[error("server error: {0}")]
    Server(String),

    #[error("service under maintenance: {0}")]
    Maintenance(String),

    #[error("unclassified HTTP error {status}: {message}")]
    Unclassified { status: u16, message: String },

    /// The upstream kept reporting an expired token after the single
    /// permitted refresh-and-retry
    #[error("token still expired after refresh")]
    TokenExpired,

    /// Token refresh failed while servicing a request
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("network error: {0}")]
    Network(String),

    #[error("malformed response: {0}")]
    Parse(String),

    #[error("configuration error: {0}")]
    Config(String),

    /// Cache store failure surfaced through a facade operation
    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// What a caller should do about a [`TransportError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorDisposition {
    /// Re-authenticate (prompt for credentials)
    Reauthenticate,
    /// Back off and try again later
    BackOff,
    /// Permanent failure; retrying will not help
    Permanent,
}

impl TransportError {
    /// Classify this error for caller-side handling
    pub fn disposition(&self) -> ErrorDisposition {
        match self {
            Self::AccessDenied(_) | Self::TokenExpired | Self::Auth(_) => {
                ErrorDisposition::Reauthenticate
            }
            Self::Server(_) | Self::Maintenance(_) | Self::Network(_) => ErrorDisposition::BackOff,
            Self::InvalidRequest(_)
            | Self::Forbidden(_)
            | Self::EndpointNotFound(_)
            | Self::Unclassified { .. }
            | Self::Parse(_)
            | Self::Config(_)
            | Self::Cache(_) => ErrorDisposition::Permanent,
        }
    }
}

/// Relation-resolution errors
#[derive(Debug, Error)]
pub enum ResolutionError {
    /// The attribute was never declared during entity construction
    #[error("unknown relation attribute: {0}")]
    UnknownAttribute(String),

    /// The fetch needed to materialize the relation failed
    #[error("upstream unavailable while resolving relation: {0}")]
    Upstream(#[from] TransportError),
}

/// Result type alias for client operations
pub type Result<T, E = TransportError> = std::result::Result<T, E>;
