//! Token lifecycle: request-token issuance, user authorization, the
//! access-token exchange, and the two-legged xAuth exchange.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use url::Url;

use crate::config::{limits, Config};
use crate::error::{OAuthError, OAuthResult};
use crate::request::{
    RawRequest, SignedRequest, OAUTH_CALLBACK, OAUTH_VERIFIER, OOB, XOAUTH_TOKEN_TTL,
    X_AUTH_MODE, X_AUTH_PASSWORD, X_AUTH_USERNAME,
};
use crate::storage::memory::MemoryStore;
use crate::storage::{
    AccessTokenOptions, AccessTokenStore, AuthorizationSession, Consumer, ConsumerFilter,
    ConsumerStore, NonceStore, PasswordAuthenticator, PendingAuthorization, RequestToken,
    RequestTokenOptions, RequestTokenStore, SocialLoginProvider, UserIdentity,
    UserProfileProvider,
};
use crate::verify::{TokenType, VerifiedIdentity, Verifier};

/// Response to a request-token call.
#[derive(Debug, Clone, Serialize)]
pub struct RequestTokenResponse {
    /// The new request token.
    #[serde(rename = "oauth_token")]
    pub token: String,
    /// Its secret.
    #[serde(rename = "oauth_token_secret")]
    pub token_secret: String,
    /// Always true (1.0a compatibility marker).
    #[serde(rename = "oauth_callback_confirmed")]
    pub callback_confirmed: bool,
    /// Seconds until the token expires.
    #[serde(rename = "xoauth_token_ttl")]
    pub token_ttl: i64,
}

/// Response to an access-token exchange.
#[derive(Debug, Clone, Serialize)]
pub struct AccessTokenResponse {
    /// The new access token.
    #[serde(rename = "oauth_token")]
    pub token: String,
    /// Its secret.
    #[serde(rename = "oauth_token_secret")]
    pub token_secret: String,
    /// Always true (1.0a compatibility marker).
    #[serde(rename = "oauth_callback_confirmed")]
    pub callback_confirmed: bool,
    /// Seconds until the token expires.
    #[serde(rename = "xoauth_token_ttl")]
    pub token_ttl: i64,
}

/// Response to an xAuth exchange.
#[derive(Debug, Clone, Serialize)]
pub struct XAuthResponse {
    /// The new access token.
    #[serde(rename = "oauth_token")]
    pub token: String,
    /// Its secret.
    #[serde(rename = "oauth_token_secret")]
    pub token_secret: String,
    /// Seconds until the token expires.
    #[serde(rename = "xoauth_token_ttl")]
    pub token_ttl: i64,
    /// Expiry instant.
    pub expires_at: DateTime<Utc>,
    /// The resolved user plus optional profile enrichment.
    #[serde(flatten)]
    pub user: HashMap<String, serde_json::Value>,
}

/// What the authorization UI needs to render a consent page.
#[derive(Debug, Clone)]
pub struct AuthorizationPrompt {
    /// The request token awaiting approval.
    pub token: RequestToken,
    /// Metadata of the consumer asking for access (secret blanked).
    pub consumer: Consumer,
    /// Callback URL that will receive the redirect.
    pub callback_url: String,
}

/// Result of finishing an authorization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizeOutcome {
    /// Verifier code, present on approval.
    pub verifier: Option<String>,
    /// Where to send the user next; `None` for out-of-band callbacks (the
    /// verifier must be displayed instead).
    pub redirect_url: Option<String>,
}

/// The OAuth provider engine: verification plus the token lifecycle.
#[derive(Clone)]
pub struct Provider {
    config: Config,
    verifier: Verifier,
    consumers: Arc<dyn ConsumerStore>,
    request_tokens: Arc<dyn RequestTokenStore>,
    access_tokens: Arc<dyn AccessTokenStore>,
    session: Arc<dyn AuthorizationSession>,
    password_auth: Option<Arc<dyn PasswordAuthenticator>>,
    social_login: Option<Arc<dyn SocialLoginProvider>>,
    profiles: Option<Arc<dyn UserProfileProvider>>,
}

impl Provider {
    /// Wire a provider to its storage capabilities.
    pub fn new(
        config: Config,
        consumers: Arc<dyn ConsumerStore>,
        request_tokens: Arc<dyn RequestTokenStore>,
        access_tokens: Arc<dyn AccessTokenStore>,
        nonces: Arc<dyn NonceStore>,
        session: Arc<dyn AuthorizationSession>,
    ) -> Self {
        let verifier = Verifier::new(
            consumers.clone(),
            request_tokens.clone(),
            access_tokens.clone(),
            nonces,
        );
        Self {
            config,
            verifier,
            consumers,
            request_tokens,
            access_tokens,
            session,
            password_auth: None,
            social_login: None,
            profiles: None,
        }
    }

    /// Convenience constructor over the in-memory store (binary and tests).
    #[must_use]
    pub fn from_memory(config: Config, store: MemoryStore) -> Self {
        let store = Arc::new(store);
        Self::new(
            config,
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
        )
        .with_password_authenticator(store)
    }

    /// Enable xAuth `client_auth` mode.
    #[must_use]
    pub fn with_password_authenticator(mut self, auth: Arc<dyn PasswordAuthenticator>) -> Self {
        self.password_auth = Some(auth);
        self
    }

    /// Enable non-`client_auth` xAuth modes.
    #[must_use]
    pub fn with_social_login(mut self, login: Arc<dyn SocialLoginProvider>) -> Self {
        self.social_login = Some(login);
        self
    }

    /// Enrich xAuth responses with user profile fields.
    #[must_use]
    pub fn with_profile_provider(mut self, profiles: Arc<dyn UserProfileProvider>) -> Self {
        self.profiles = Some(profiles);
        self
    }

    /// The configured protection realm.
    #[must_use]
    pub fn realm(&self) -> &str {
        &self.config.realm
    }

    /// Verify a raw request presenting the given token type.
    ///
    /// # Errors
    ///
    /// Any protocol fault from parsing or the verification pipeline.
    pub async fn verify(
        &self,
        raw: &RawRequest,
        token_type: TokenType,
    ) -> OAuthResult<VerifiedIdentity> {
        let request = SignedRequest::parse(raw)?;
        self.verifier.verify(&request, token_type, false).await
    }

    /// Verify only when the request is signed; `Ok(None)` otherwise.
    pub async fn verify_if_signed(
        &self,
        raw: &RawRequest,
        token_type: TokenType,
    ) -> OAuthResult<Option<VerifiedIdentity>> {
        let request = SignedRequest::parse(raw)?;
        self.verifier.verify_if_signed(&request, token_type).await
    }

    /// Issue a new request token.
    ///
    /// An absent or empty `oauth_callback` signals a two-legged flow: the
    /// token is created pre-authorized and needs no user interaction.
    ///
    /// # Errors
    ///
    /// Any verification fault, or [`OAuthError::ServiceUnavailable`] when the
    /// store fails.
    pub async fn request_token(&self, raw: &RawRequest) -> OAuthResult<RequestTokenResponse> {
        let request = SignedRequest::parse(raw)?;
        let identity = self.verifier.verify(&request, TokenType::None, false).await?;

        let callback_url = request.param_decoded(OAUTH_CALLBACK);
        let options = RequestTokenOptions {
            token_ttl: requested_ttl(&request),
            pre_authorized: callback_url.is_none(),
            callback_url,
        };

        let token = self
            .request_tokens
            .create(&identity.consumer_key, options)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Request token creation failed");
                OAuthError::ServiceUnavailable
            })?;
        tracing::info!(
            consumer_key = %identity.consumer_key,
            pre_authorized = token.authorized,
            "Issued request token"
        );

        Ok(RequestTokenResponse {
            token_ttl: ttl_of(token.expires_at),
            token: token.token,
            token_secret: token.token_secret,
            callback_confirmed: true,
        })
    }

    /// Load a request token for the authorization UI.
    ///
    /// # Errors
    ///
    /// [`OAuthError::TokenRejected`] when the token is unknown or expired.
    pub async fn get_request_token(&self, token: &str) -> OAuthResult<RequestToken> {
        self.request_tokens
            .get(token, None)
            .await
            .ok()
            .flatten()
            .ok_or_else(|| OAuthError::token_rejected(token))
    }

    /// Begin user authorization of a request token: record the pending state
    /// and return what the consent page needs. A caller-supplied callback
    /// takes precedence over the one stored on the token.
    ///
    /// # Errors
    ///
    /// [`OAuthError::TokenRejected`] for unknown tokens,
    /// [`OAuthError::ConsumerKeyRejected`] when the owning consumer
    /// disappeared, [`OAuthError::ServiceUnavailable`] on store failure.
    pub async fn authorize_verify(
        &self,
        token: &str,
        callback_url: Option<&str>,
    ) -> OAuthResult<AuthorizationPrompt> {
        let stored = self.get_request_token(token).await?;

        let consumer = self
            .consumers
            .consumer(&stored.consumer_key, &ConsumerFilter::default())
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Consumer lookup failed");
                OAuthError::ServiceUnavailable
            })?
            .ok_or_else(|| OAuthError::ConsumerKeyRejected {
                value: stored.consumer_key.clone(),
            })?;

        let callback_url =
            callback_url.map_or_else(|| stored.callback_url.clone(), ToString::to_string);
        self.session
            .store(PendingAuthorization {
                token: stored.token.clone(),
                consumer_key: stored.consumer_key.clone(),
                callback_url: callback_url.clone(),
            })
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Pending authorization store failed");
                OAuthError::ServiceUnavailable
            })?;

        Ok(AuthorizationPrompt { token: stored, consumer, callback_url })
    }

    /// Finish user authorization: mark the token authorized (or delete it on
    /// denial) and compute the redirect target.
    ///
    /// # Errors
    ///
    /// [`OAuthError::NotAuthorized`] when no pending state matches the token,
    /// [`OAuthError::TokenRejected`] when the token vanished,
    /// [`OAuthError::BadUrl`] for a callback that is neither http(s) nor
    /// relative.
    pub async fn authorize_finish(
        &self,
        token: &str,
        authorized: bool,
        username: &str,
    ) -> OAuthResult<AuthorizeOutcome> {
        let pending = self
            .session
            .load(token)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Pending authorization load failed");
                OAuthError::ServiceUnavailable
            })?
            .filter(|state| state.token == token)
            .ok_or(OAuthError::NotAuthorized)?;
        self.session.clear(token).await.map_err(|e| {
            tracing::error!(error = %e, "Pending authorization clear failed");
            OAuthError::ServiceUnavailable
        })?;

        let verifier = if authorized {
            let referer = callback_host(&pending.callback_url);
            let granted = self
                .request_tokens
                .authorize(token, username, referer.as_deref())
                .await
                .map_err(|e| {
                    tracing::error!(error = %e, "Token authorization failed");
                    OAuthError::ServiceUnavailable
                })?
                .ok_or_else(|| OAuthError::token_rejected(token))?;
            tracing::info!(username, "Request token authorized");
            Some(granted.verifier)
        } else {
            self.request_tokens.delete(token).await.map_err(|e| {
                tracing::error!(error = %e, "Token deletion failed");
                OAuthError::ServiceUnavailable
            })?;
            tracing::info!("Request token authorization denied");
            None
        };

        let redirect_url =
            redirect_target(&pending.callback_url, token, verifier.as_deref())?;
        Ok(AuthorizeOutcome { verifier, redirect_url })
    }

    /// Exchange an authorized request token for an access token. The consumed
    /// request token is deleted.
    ///
    /// # Errors
    ///
    /// Any verification fault; [`OAuthError::NotAuthorized`] when the token
    /// was never authorized or the presented `oauth_verifier` does not match.
    pub async fn access_token(&self, raw: &RawRequest) -> OAuthResult<AccessTokenResponse> {
        let request = SignedRequest::parse(raw)?;
        let identity = self.verifier.verify(&request, TokenType::Request, false).await?;

        let stored = self
            .request_tokens
            .get(&identity.token, Some(&identity.consumer_key))
            .await
            .ok()
            .flatten()
            .ok_or_else(|| OAuthError::token_rejected(&identity.token))?;

        let username = match (&stored.username, stored.authorized) {
            (Some(username), true) => username.clone(),
            // two-legged tokens are pre-authorized and carry no user
            (None, true) => String::new(),
            _ => return Err(OAuthError::NotAuthorized),
        };
        if let Some(presented) = request.param_decoded(OAUTH_VERIFIER) {
            if stored.verifier.as_deref() != Some(presented.as_str()) {
                return Err(OAuthError::NotAuthorized);
            }
        }

        let options = AccessTokenOptions {
            token_ttl: requested_ttl(&request),
            callback_url: Some(stored.callback_url.clone()),
            referer_url: stored.referer_url.clone(),
        };
        let token = self
            .access_tokens
            .create(&identity.consumer_key, &username, options)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Access token creation failed");
                OAuthError::ServiceUnavailable
            })?;
        self.request_tokens.delete(&identity.token).await.map_err(|e| {
            tracing::error!(error = %e, "Request token deletion failed");
            OAuthError::ServiceUnavailable
        })?;
        tracing::info!(
            consumer_key = %identity.consumer_key,
            username = %username,
            "Exchanged request token for access token"
        );

        Ok(AccessTokenResponse {
            token_ttl: ttl_of(token.expires_at),
            token: token.token,
            token_secret: token.token_secret,
            callback_confirmed: true,
        })
    }

    /// Two-legged xAuth exchange: resolve the user from the posted
    /// credentials, verify the signature (nonce bypassed: there is no prior
    /// token to race against), and issue an access token directly.
    ///
    /// # Errors
    ///
    /// [`OAuthError::ParameterAbsent`] for missing credentials,
    /// [`OAuthError::InvalidCredentials`] when resolution fails, plus any
    /// signature fault from verification.
    pub async fn xauth(&self, raw: &RawRequest) -> OAuthResult<XAuthResponse> {
        let request = SignedRequest::parse(raw)?;

        let mode =
            request.param_decoded(X_AUTH_MODE).unwrap_or_else(|| "client_auth".to_string());
        let username = request
            .param_decoded(X_AUTH_USERNAME)
            .ok_or_else(|| OAuthError::parameter_absent(X_AUTH_USERNAME))?;
        let password = request
            .param_decoded(X_AUTH_PASSWORD)
            .ok_or_else(|| OAuthError::parameter_absent(X_AUTH_PASSWORD))?;

        let user = self.resolve_user(&mode, &username, &password).await?;
        let identity = self.verifier.verify(&request, TokenType::None, true).await?;

        let options = AccessTokenOptions { token_ttl: requested_ttl(&request), ..Default::default() };
        let token = self
            .access_tokens
            .create(&identity.consumer_key, &user.username, options)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Access token creation failed");
                OAuthError::ServiceUnavailable
            })?;
        tracing::info!(
            consumer_key = %identity.consumer_key,
            username = %user.username,
            mode = %mode,
            "Issued access token via xAuth"
        );

        let mut fields = HashMap::new();
        fields.insert("username".to_string(), serde_json::Value::String(user.username.clone()));
        if let Some(profiles) = &self.profiles {
            match profiles.profile(&user.username).await {
                Ok(profile) => fields.extend(profile),
                Err(e) => tracing::warn!(error = %e, "Profile enrichment failed"),
            }
        }

        Ok(XAuthResponse {
            token_ttl: ttl_of(token.expires_at),
            expires_at: token.expires_at,
            token: token.token,
            token_secret: token.token_secret,
            user: fields,
        })
    }

    async fn resolve_user(
        &self,
        mode: &str,
        username: &str,
        password: &str,
    ) -> OAuthResult<UserIdentity> {
        let resolved = if mode == "client_auth" {
            let auth = self.password_auth.as_ref().ok_or_else(|| {
                tracing::error!("No password authenticator configured for client_auth");
                OAuthError::ServiceUnavailable
            })?;
            auth.validate(username, password).await
        } else {
            let login = self.social_login.as_ref().ok_or_else(|| {
                tracing::error!(mode, "No social login provider configured");
                OAuthError::ServiceUnavailable
            })?;
            login.login(mode, username, password).await
        };

        resolved
            .map_err(|e| {
                tracing::error!(error = %e, "Credential resolution failed");
                OAuthError::ServiceUnavailable
            })?
            .ok_or_else(|| OAuthError::InvalidCredentials { username: username.to_string() })
    }
}

/// The `xoauth_token_ttl` parameter, when present, numeric, and sane.
/// Out-of-range values fall back to the store default instead of flowing
/// unchecked into expiry arithmetic.
fn requested_ttl(request: &SignedRequest) -> Option<i64> {
    request
        .param_decoded(XOAUTH_TOKEN_TTL)
        .and_then(|v| v.parse().ok())
        .filter(|ttl| (1..=limits::MAX_TOKEN_TTL).contains(ttl))
}

/// Remaining lifetime in whole seconds.
fn ttl_of(expires_at: DateTime<Utc>) -> i64 {
    (expires_at - Utc::now()).num_seconds()
}

/// Host component of an absolute callback URL, recorded as the referer.
fn callback_host(callback_url: &str) -> Option<String> {
    Url::parse(callback_url).ok().and_then(|u| u.host_str().map(ToString::to_string))
}

/// Compute the post-authorization redirect. The `oob` sentinel yields no
/// redirect. Absolute callbacks must be http(s); relative paths are allowed;
/// anything else (`javascript:`, `data:`, ...) is refused before a redirect
/// exists to inject into.
fn redirect_target(
    callback_url: &str,
    token: &str,
    verifier: Option<&str>,
) -> OAuthResult<Option<String>> {
    if callback_url.is_empty() || callback_url == OOB {
        return Ok(None);
    }

    match Url::parse(callback_url) {
        Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
        Ok(_) => return Err(OAuthError::BadUrl { url: callback_url.to_string() }),
        // not absolute: allow plain relative paths only
        Err(_) if callback_url.starts_with('/') && !callback_url.starts_with("//") => {}
        Err(_) => return Err(OAuthError::BadUrl { url: callback_url.to_string() }),
    }

    let separator = if callback_url.contains('?') { '&' } else { '?' };
    let mut redirect =
        format!("{callback_url}{separator}oauth_token={}", crate::codec::encode(token));
    if let Some(verifier) = verifier {
        redirect.push_str(&format!("&oauth_verifier={}", crate::codec::encode(verifier)));
    }
    Ok(Some(redirect))
}
