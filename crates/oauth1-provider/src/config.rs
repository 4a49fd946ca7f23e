//! Configuration for the OAuth provider engine.

/// Token and replay-protection limits, in seconds.
pub mod limits {
    /// Default request token lifetime (1 hour).
    pub const REQUEST_TOKEN_TTL: i64 = 3_600;

    /// Default access token lifetime (15 days).
    pub const ACCESS_TOKEN_TTL: i64 = 1_296_000;

    /// Acceptable clock skew for `oauth_timestamp` (10 hours).
    pub const TIMESTAMP_WINDOW: i64 = 36_000;

    /// Upper bound for caller-supplied `xoauth_token_ttl` values (10 years).
    /// Anything beyond it is ignored like a non-numeric value.
    pub const MAX_TOKEN_TTL: i64 = 315_360_000;
}

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Protection realm emitted in `WWW-Authenticate` challenges.
    pub realm: String,

    /// Request token lifetime in seconds.
    pub request_token_ttl: i64,

    /// Access token lifetime in seconds.
    pub access_token_ttl: i64,

    /// Acceptable timestamp skew in seconds.
    pub timestamp_window: i64,
}

impl Config {
    /// Create a configuration for a protection realm with default limits.
    #[must_use]
    pub fn new(realm: impl Into<String>) -> Self {
        Self {
            realm: realm.into(),
            request_token_ttl: limits::REQUEST_TOKEN_TTL,
            access_token_ttl: limits::ACCESS_TOKEN_TTL,
            timestamp_window: limits::TIMESTAMP_WINDOW,
        }
    }

    /// Create a test configuration with tight lifetimes.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            realm: "http://test.example/".to_string(),
            request_token_ttl: 60,
            access_token_ttl: 60,
            timestamp_window: limits::TIMESTAMP_WINDOW,
        }
    }

    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns error if a numeric variable does not parse.
    pub fn from_env() -> anyhow::Result<Self> {
        let mut config = Self::new(
            std::env::var("OAUTH_REALM").unwrap_or_else(|_| "http://localhost/".to_string()),
        );
        if let Ok(ttl) = std::env::var("OAUTH_REQUEST_TOKEN_TTL") {
            config.request_token_ttl = ttl.parse()?;
        }
        if let Ok(ttl) = std::env::var("OAUTH_ACCESS_TOKEN_TTL") {
            config.access_token_ttl = ttl.parse()?;
        }
        if let Ok(window) = std::env::var("OAUTH_TIMESTAMP_WINDOW") {
            config.timestamp_window = window.parse()?;
        }
        Ok(config)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new("http://localhost/")
    }
}
