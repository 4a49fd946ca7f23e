//! Storage capability traits and the domain model.
//!
//! The engine never talks to a concrete database; it consumes these
//! capability traits. A concrete store may implement one, several, or all of
//! them — trait satisfaction is checked at compile time, and the provider is
//! wired with whichever handles it needs at construction.

pub mod memory;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered third-party application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Consumer {
    /// Unique consumer key.
    pub consumer_key: String,
    /// Shared secret.
    pub consumer_secret: String,
    /// Display name.
    pub name: Option<String>,
    /// Publishing organization.
    pub publisher: Option<String>,
    /// Application type.
    pub app_type: Option<String>,
    /// Application category.
    pub category: Option<String>,
    /// Application website.
    pub website_url: Option<String>,
    /// Contact email.
    pub email: Option<String>,
    /// Free-form description.
    pub description: Option<String>,
    /// Default callback URL when a request token carries none.
    pub callback_url: Option<String>,
    /// Disabled consumers fail lookup.
    pub enabled: bool,
}

/// Credentials subset returned from consumer lookups.
#[derive(Debug, Clone)]
pub struct ConsumerCredentials {
    /// Consumer key.
    pub consumer_key: String,
    /// Shared secret.
    pub consumer_secret: String,
}

/// Optional consumer lookup criteria beyond the key and enabled flag.
#[derive(Debug, Clone, Default)]
pub struct ConsumerFilter {
    /// Match on display name.
    pub name: Option<String>,
    /// Match on publisher.
    pub publisher: Option<String>,
    /// Match on registered callback URL.
    pub callback_url: Option<String>,
}

/// A short-lived credential carrying a user through authorization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestToken {
    /// Token value.
    pub token: String,
    /// Token secret.
    pub token_secret: String,
    /// Owning consumer.
    pub consumer_key: String,
    /// Authorizing user, set once authorized.
    pub username: Option<String>,
    /// Whether the user approved this token.
    pub authorized: bool,
    /// One-time verifier code, set once authorized (1.0a).
    pub verifier: Option<String>,
    /// Callback to redirect to after authorization (`oob` for out-of-band).
    pub callback_url: String,
    /// Host of the callback, recorded for user feedback.
    pub referer_url: Option<String>,
    /// Expiry instant.
    pub expires_at: DateTime<Utc>,
}

/// A user- and consumer-bound credential for ongoing API calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessToken {
    /// Token value.
    pub token: String,
    /// Token secret.
    pub token_secret: String,
    /// Owning consumer.
    pub consumer_key: String,
    /// Bound user.
    pub username: String,
    /// Callback carried over from the request token.
    pub callback_url: String,
    /// Referer carried over from the request token.
    pub referer_url: String,
    /// Expiry instant.
    pub expires_at: DateTime<Utc>,
}

/// Options for creating a request token.
#[derive(Debug, Clone, Default)]
pub struct RequestTokenOptions {
    /// Caller-supplied TTL in seconds; the store caps/defaults it.
    pub token_ttl: Option<i64>,
    /// Callback URL to associate; defaults to `oob`.
    pub callback_url: Option<String>,
    /// Two-legged flow: create the token pre-authorized.
    pub pre_authorized: bool,
}

/// Options for creating an access token.
#[derive(Debug, Clone, Default)]
pub struct AccessTokenOptions {
    /// Caller-supplied TTL in seconds; the store caps/defaults it.
    pub token_ttl: Option<i64>,
    /// Callback URL carried over; defaults to `oob`.
    pub callback_url: Option<String>,
    /// Referer carried over; defaults to `client_auth`.
    pub referer_url: Option<String>,
}

/// Result of authorizing a request token.
#[derive(Debug, Clone)]
pub struct AuthorizedRequestToken {
    /// The authorizing user.
    pub username: String,
    /// Referer host recorded on the token.
    pub referer_url: Option<String>,
    /// Verifier code to hand back to the consumer.
    pub verifier: String,
}

/// A resolved user identity from a credential or social-login check.
#[derive(Debug, Clone)]
pub struct UserIdentity {
    /// Canonical username.
    pub username: String,
}

/// Pending-authorization state held between `authorize_verify` and
/// `authorize_finish`, keyed by request token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAuthorization {
    /// The request token awaiting user approval.
    pub token: String,
    /// Owning consumer.
    pub consumer_key: String,
    /// Callback URL that will receive the redirect.
    pub callback_url: String,
}

/// Consumer lookup.
#[async_trait]
pub trait ConsumerStore: Send + Sync {
    /// Consumer metadata (no secret) for an enabled consumer, or `None`.
    async fn consumer(
        &self,
        consumer_key: &str,
        filter: &ConsumerFilter,
    ) -> anyhow::Result<Option<Consumer>>;

    /// Key/secret pair for an enabled consumer, or `None`.
    async fn consumer_credentials(
        &self,
        consumer_key: &str,
        filter: &ConsumerFilter,
    ) -> anyhow::Result<Option<ConsumerCredentials>>;
}

/// Request-token persistence.
#[async_trait]
pub trait RequestTokenStore: Send + Sync {
    /// Load a live (unexpired) request token, optionally scoped to a
    /// consumer.
    async fn get(
        &self,
        token: &str,
        consumer_key: Option<&str>,
    ) -> anyhow::Result<Option<RequestToken>>;

    /// Create a new unauthorized (or, for two-legged flows, pre-authorized)
    /// request token.
    async fn create(
        &self,
        consumer_key: &str,
        options: RequestTokenOptions,
    ) -> anyhow::Result<RequestToken>;

    /// Delete a request token. Returns whether one existed.
    async fn delete(&self, token: &str) -> anyhow::Result<bool>;

    /// Mark a request token authorized by a user, assigning a fresh verifier.
    /// Returns `None` when the token does not exist.
    async fn authorize(
        &self,
        token: &str,
        username: &str,
        referer_url: Option<&str>,
    ) -> anyhow::Result<Option<AuthorizedRequestToken>>;
}

/// Access-token persistence.
#[async_trait]
pub trait AccessTokenStore: Send + Sync {
    /// Load a live (unexpired) access token, optionally scoped to a consumer.
    async fn get(
        &self,
        token: &str,
        consumer_key: Option<&str>,
    ) -> anyhow::Result<Option<AccessToken>>;

    /// Create an access token bound to a user.
    async fn create(
        &self,
        consumer_key: &str,
        username: &str,
        options: AccessTokenOptions,
    ) -> anyhow::Result<AccessToken>;

    /// Delete an access token, optionally scoped to a user. Returns whether
    /// one existed.
    async fn delete(&self, token: &str, username: Option<&str>) -> anyhow::Result<bool>;

    /// Reset the TTL of an access token; a TTL of zero or less deletes it
    /// immediately.
    async fn set_ttl(&self, token: &str, ttl_seconds: i64) -> anyhow::Result<()>;
}

/// Replay protection.
#[async_trait]
pub trait NonceStore: Send + Sync {
    /// Whether the timestamp lies within the acceptable recency window.
    async fn validate_timestamp(&self, timestamp: i64) -> anyhow::Result<bool>;

    /// Atomic check-and-insert of a nonce tuple. Returns `false` when the
    /// `(consumer_key, token, timestamp, nonce)` tuple was already recorded
    /// (replay). A successful insert prunes records older than the recency
    /// window for the same consumer/token pair.
    async fn validate_nonce(
        &self,
        consumer_key: &str,
        token: &str,
        timestamp: i64,
        nonce: &str,
    ) -> anyhow::Result<bool>;
}

/// Direct username/password validation for xAuth `client_auth` mode.
#[async_trait]
pub trait PasswordAuthenticator: Send + Sync {
    /// Resolve credentials to a user, or `None` when they do not match.
    async fn validate(
        &self,
        username: &str,
        password: &str,
    ) -> anyhow::Result<Option<UserIdentity>>;
}

/// Pluggable social-login resolution for non-`client_auth` xAuth modes.
#[async_trait]
pub trait SocialLoginProvider: Send + Sync {
    /// Resolve a third-party identity, or `None` on failure.
    async fn login(
        &self,
        mode: &str,
        identifier: &str,
        secret_or_token: &str,
    ) -> anyhow::Result<Option<UserIdentity>>;
}

/// Optional profile enrichment for xAuth responses.
#[async_trait]
pub trait UserProfileProvider: Send + Sync {
    /// Extra user fields merged into the xAuth response.
    async fn profile(
        &self,
        username: &str,
    ) -> anyhow::Result<HashMap<String, serde_json::Value>>;
}

/// Keyed pending-authorization state, scoped to a request token. Replaces
/// the browser-session bag the authorization UI would otherwise own.
#[async_trait]
pub trait AuthorizationSession: Send + Sync {
    /// Load the pending state for a token.
    async fn load(&self, token: &str) -> anyhow::Result<Option<PendingAuthorization>>;

    /// Store (or refresh) the pending state for a token.
    async fn store(&self, state: PendingAuthorization) -> anyhow::Result<()>;

    /// Drop the pending state for a token.
    async fn clear(&self, token: &str) -> anyhow::Result<()>;
}
