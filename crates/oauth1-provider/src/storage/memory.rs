//! In-memory reference store.
//!
//! Implements every storage capability behind a single `RwLock`, which makes
//! the nonce check-and-insert and the request/access token exchange atomic
//! with respect to concurrent verifications. Suitable for tests, demos, and
//! single-process deployments.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;

use super::{
    AccessToken, AccessTokenOptions, AccessTokenStore, AuthorizationSession,
    AuthorizedRequestToken, Consumer, ConsumerCredentials, ConsumerFilter, ConsumerStore,
    NonceStore, PasswordAuthenticator, PendingAuthorization, RequestToken, RequestTokenOptions,
    RequestTokenStore, UserIdentity,
};
use crate::config::limits;
use crate::request::OOB;

/// Expiry instant for a TTL. Wire-supplied TTLs can be any `i64`, so the
/// arithmetic is pinned to the datetime range instead of overflowing.
fn expiry(ttl_seconds: i64) -> DateTime<Utc> {
    let now = Utc::now();
    Duration::try_seconds(ttl_seconds)
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(if ttl_seconds < 0 {
            DateTime::<Utc>::MIN_UTC
        } else {
            DateTime::<Utc>::MAX_UTC
        })
}

#[derive(Default)]
struct Inner {
    consumers: HashMap<String, Consumer>,
    request_tokens: HashMap<String, RequestToken>,
    access_tokens: HashMap<String, AccessToken>,
    nonces: HashSet<(String, String, i64, String)>,
    sessions: HashMap<String, PendingAuthorization>,
    users: HashMap<String, String>,
}

/// In-memory store implementing all storage capabilities.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
    request_token_ttl: i64,
    access_token_ttl: i64,
    timestamp_window: i64,
}

impl MemoryStore {
    /// Create a store with the default TTLs and replay window.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner::default())),
            request_token_ttl: limits::REQUEST_TOKEN_TTL,
            access_token_ttl: limits::ACCESS_TOKEN_TTL,
            timestamp_window: limits::TIMESTAMP_WINDOW,
        }
    }

    /// Override the TTLs and replay window (tests use tight values).
    #[must_use]
    pub fn with_limits(
        mut self,
        request_token_ttl: i64,
        access_token_ttl: i64,
        timestamp_window: i64,
    ) -> Self {
        self.request_token_ttl = request_token_ttl;
        self.access_token_ttl = access_token_ttl;
        self.timestamp_window = timestamp_window;
        self
    }

    /// Generate a random token value using two UUIDs (256 bits).
    fn generate_token() -> String {
        format!("{}{}", uuid::Uuid::new_v4().simple(), uuid::Uuid::new_v4().simple())
    }

    /// Generate a token secret / verifier value.
    fn generate_secret() -> String {
        uuid::Uuid::new_v4().simple().to_string()
    }

    /// Register a consumer.
    pub async fn add_consumer(&self, consumer: Consumer) {
        self.inner.write().await.consumers.insert(consumer.consumer_key.clone(), consumer);
    }

    /// Register a username/password pair for xAuth `client_auth` mode.
    pub async fn add_user(&self, username: impl Into<String>, password: impl Into<String>) {
        self.inner.write().await.users.insert(username.into(), password.into());
    }

    fn matches_filter(consumer: &Consumer, filter: &ConsumerFilter) -> bool {
        if let Some(name) = &filter.name {
            if consumer.name.as_deref() != Some(name.as_str()) {
                return false;
            }
        }
        if let Some(publisher) = &filter.publisher {
            if consumer.publisher.as_deref() != Some(publisher.as_str()) {
                return false;
            }
        }
        if let Some(callback_url) = &filter.callback_url {
            if consumer.callback_url.as_deref() != Some(callback_url.as_str()) {
                return false;
            }
        }
        true
    }

    async fn lookup_consumer(&self, consumer_key: &str, filter: &ConsumerFilter) -> Option<Consumer> {
        let inner = self.inner.read().await;
        inner
            .consumers
            .get(consumer_key)
            .filter(|c| c.enabled && Self::matches_filter(c, filter))
            .cloned()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore").finish()
    }
}

#[async_trait]
impl ConsumerStore for MemoryStore {
    async fn consumer(
        &self,
        consumer_key: &str,
        filter: &ConsumerFilter,
    ) -> anyhow::Result<Option<Consumer>> {
        Ok(self.lookup_consumer(consumer_key, filter).await.map(|mut c| {
            // metadata lookups never expose the secret
            c.consumer_secret = String::new();
            c
        }))
    }

    async fn consumer_credentials(
        &self,
        consumer_key: &str,
        filter: &ConsumerFilter,
    ) -> anyhow::Result<Option<ConsumerCredentials>> {
        Ok(self.lookup_consumer(consumer_key, filter).await.map(|c| ConsumerCredentials {
            consumer_key: c.consumer_key,
            consumer_secret: c.consumer_secret,
        }))
    }
}

#[async_trait]
impl RequestTokenStore for MemoryStore {
    async fn get(
        &self,
        token: &str,
        consumer_key: Option<&str>,
    ) -> anyhow::Result<Option<RequestToken>> {
        let inner = self.inner.read().await;
        Ok(inner
            .request_tokens
            .get(token)
            .filter(|t| t.expires_at >= Utc::now())
            .filter(|t| consumer_key.is_none_or(|ck| t.consumer_key == ck))
            .cloned())
    }

    async fn create(
        &self,
        consumer_key: &str,
        options: RequestTokenOptions,
    ) -> anyhow::Result<RequestToken> {
        let ttl = options.token_ttl.unwrap_or(self.request_token_ttl);
        let token = RequestToken {
            token: Self::generate_token(),
            token_secret: Self::generate_secret(),
            consumer_key: consumer_key.to_string(),
            username: None,
            authorized: options.pre_authorized,
            verifier: options.pre_authorized.then(Self::generate_secret),
            callback_url: options.callback_url.unwrap_or_else(|| OOB.to_string()),
            referer_url: None,
            expires_at: expiry(ttl),
        };

        self.inner.write().await.request_tokens.insert(token.token.clone(), token.clone());
        Ok(token)
    }

    async fn delete(&self, token: &str) -> anyhow::Result<bool> {
        Ok(self.inner.write().await.request_tokens.remove(token).is_some())
    }

    async fn authorize(
        &self,
        token: &str,
        username: &str,
        referer_url: Option<&str>,
    ) -> anyhow::Result<Option<AuthorizedRequestToken>> {
        let mut inner = self.inner.write().await;
        let Some(stored) = inner.request_tokens.get_mut(token) else {
            return Ok(None);
        };

        let verifier = Self::generate_secret();
        stored.authorized = true;
        stored.username = Some(username.to_string());
        stored.verifier = Some(verifier.clone());
        stored.referer_url = referer_url.map(ToString::to_string);

        Ok(Some(AuthorizedRequestToken {
            username: username.to_string(),
            referer_url: referer_url.map(ToString::to_string),
            verifier,
        }))
    }
}

#[async_trait]
impl AccessTokenStore for MemoryStore {
    async fn get(
        &self,
        token: &str,
        consumer_key: Option<&str>,
    ) -> anyhow::Result<Option<AccessToken>> {
        let inner = self.inner.read().await;
        Ok(inner
            .access_tokens
            .get(token)
            .filter(|t| t.expires_at >= Utc::now())
            .filter(|t| consumer_key.is_none_or(|ck| t.consumer_key == ck))
            .cloned())
    }

    async fn create(
        &self,
        consumer_key: &str,
        username: &str,
        options: AccessTokenOptions,
    ) -> anyhow::Result<AccessToken> {
        let ttl = options.token_ttl.unwrap_or(self.access_token_ttl);
        let token = AccessToken {
            token: Self::generate_token(),
            token_secret: Self::generate_secret(),
            consumer_key: consumer_key.to_string(),
            username: username.to_string(),
            callback_url: options.callback_url.unwrap_or_else(|| OOB.to_string()),
            referer_url: options.referer_url.unwrap_or_else(|| "client_auth".to_string()),
            expires_at: expiry(ttl),
        };

        self.inner.write().await.access_tokens.insert(token.token.clone(), token.clone());
        Ok(token)
    }

    async fn delete(&self, token: &str, username: Option<&str>) -> anyhow::Result<bool> {
        let mut inner = self.inner.write().await;
        let matches = inner
            .access_tokens
            .get(token)
            .is_some_and(|t| username.is_none_or(|u| t.username == u));
        if matches {
            inner.access_tokens.remove(token);
        }
        Ok(matches)
    }

    async fn set_ttl(&self, token: &str, ttl_seconds: i64) -> anyhow::Result<()> {
        let mut inner = self.inner.write().await;
        if ttl_seconds <= 0 {
            // Immediate delete when the token is past its ttl
            inner.access_tokens.remove(token);
            tracing::debug!(token, "Access token deleted via TTL reset");
        } else if let Some(stored) = inner.access_tokens.get_mut(token) {
            stored.expires_at = expiry(ttl_seconds);
        }
        Ok(())
    }
}

#[async_trait]
impl NonceStore for MemoryStore {
    async fn validate_timestamp(&self, timestamp: i64) -> anyhow::Result<bool> {
        let now = Utc::now().timestamp();
        // checked: extreme wire-supplied timestamps must refuse, not overflow
        Ok(now
            .checked_sub(timestamp)
            .is_some_and(|skew| skew.abs() < self.timestamp_window))
    }

    async fn validate_nonce(
        &self,
        consumer_key: &str,
        token: &str,
        timestamp: i64,
        nonce: &str,
    ) -> anyhow::Result<bool> {
        let mut inner = self.inner.write().await;
        let tuple =
            (consumer_key.to_string(), token.to_string(), timestamp, nonce.to_string());
        if !inner.nonces.insert(tuple) {
            return Ok(false);
        }

        // Amortized cleanup: drop records for this pair that have fallen out
        // of the replay window.
        let horizon = timestamp - self.timestamp_window;
        inner
            .nonces
            .retain(|(ck, t, ts, _)| !(ck == consumer_key && t == token && *ts < horizon));

        Ok(true)
    }
}

#[async_trait]
impl PasswordAuthenticator for MemoryStore {
    async fn validate(
        &self,
        username: &str,
        password: &str,
    ) -> anyhow::Result<Option<UserIdentity>> {
        let inner = self.inner.read().await;
        Ok(inner
            .users
            .get(username)
            .filter(|stored| stored.as_str() == password)
            .map(|_| UserIdentity { username: username.to_string() }))
    }
}

#[async_trait]
impl AuthorizationSession for MemoryStore {
    async fn load(&self, token: &str) -> anyhow::Result<Option<PendingAuthorization>> {
        Ok(self.inner.read().await.sessions.get(token).cloned())
    }

    async fn store(&self, state: PendingAuthorization) -> anyhow::Result<()> {
        self.inner.write().await.sessions.insert(state.token.clone(), state);
        Ok(())
    }

    async fn clear(&self, token: &str) -> anyhow::Result<()> {
        self.inner.write().await.sessions.remove(token);
        Ok(())
    }
}
