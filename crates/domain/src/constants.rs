//! Domain constants
//!
//! Centralized location for upstream endpoints and wire-format literals.

/// Default base URL of the Synergia REST API
pub const DEFAULT_API_BASE_URL: &str = "https://api.librus.pl/2.0";

/// Default base URL of the account portal (login + token endpoints)
pub const DEFAULT_PORTAL_BASE_URL: &str = "https://portal.librus.pl";

/// OAuth client id the mobile application uses
pub const OAUTH_CLIENT_ID: &str = "wmSyUMo8llDAs4y9tJVYY92oyZ6h4lAt7KCuy0Gv";

/// Redirect URI registered for the mobile application client
pub const OAUTH_REDIRECT_URI: &str = "http://localhost/bar";

/// User agent the upstream expects; the API rejects unknown clients
pub const DEFAULT_USER_AGENT: &str = "LibrusMobileApp";

/// Application-level body code meaning the bearer token has expired.
/// Checked before HTTP status dispatch.
pub const TOKEN_EXPIRED_CODE: &str = "TokenIsExpired";

/// Top-level payload keys that never hold entity data; the extraction-key
/// heuristic skips these.
pub const RESERVED_PAYLOAD_KEYS: [&str; 2] = ["Resources", "Url"];

/// Authenticated probe path used by the live token-expiry check
pub const TOKEN_PROBE_PATH: &str = "Me";

/// Default maximum age for cached raw query responses (seconds)
pub const DEFAULT_QUERY_MAX_AGE_SECS: u64 = 3600;

/// Default maximum age for cached listing fetches (seconds)
pub const DEFAULT_LIST_MAX_AGE_SECS: u64 = 10;
