//! Signed-request verification pipeline.
//!
//! [`Verifier::verify`] runs the full protocol check against a parsed
//! request: required parameters, consumer and token lookup, timestamp and
//! nonce replay protection, version, signature, and the optional body
//! signature and token-TTL extensions. Checks run in a fixed order so a
//! request failing several of them always reports the same fault.

use std::sync::Arc;

use crate::config::limits;
use crate::error::{OAuthError, OAuthResult};
use crate::request::{
    SignedRequest, OAUTH_CONSUMER_KEY, OAUTH_NONCE, OAUTH_SIGNATURE, OAUTH_SIGNATURE_METHOD,
    OAUTH_TIMESTAMP, OAUTH_TOKEN, OAUTH_VERSION, XOAUTH_BODY_SIGNATURE,
    XOAUTH_BODY_SIGNATURE_METHOD, XOAUTH_TOKEN_TTL,
};
use crate::signature;
use crate::storage::{
    AccessTokenStore, ConsumerFilter, ConsumerStore, NonceStore, RequestTokenStore,
};

/// Which token credential a request must present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenType {
    /// No token: request-token issuance and xAuth exchange. An
    /// `oauth_token` parameter, if present, still participates in the
    /// signature with an empty secret.
    None,
    /// A request token: the access-token exchange.
    Request,
    /// An access token: protected-resource calls.
    Access,
}

/// The identity a verified request acts as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    /// User bound to the token, when the token type carries one.
    pub username: Option<String>,
    /// Callback URL recorded on the token.
    pub callback_url: Option<String>,
    /// Referer recorded on the token.
    pub referer_url: Option<String>,
    /// The consumer the request was signed by.
    pub consumer_key: String,
    /// The token presented, empty for token-less requests.
    pub token: String,
}

/// Runs protocol verification against the storage capabilities.
#[derive(Clone)]
pub struct Verifier {
    consumers: Arc<dyn ConsumerStore>,
    request_tokens: Arc<dyn RequestTokenStore>,
    access_tokens: Arc<dyn AccessTokenStore>,
    nonces: Arc<dyn NonceStore>,
}

impl Verifier {
    /// Wire a verifier to its stores.
    pub fn new(
        consumers: Arc<dyn ConsumerStore>,
        request_tokens: Arc<dyn RequestTokenStore>,
        access_tokens: Arc<dyn AccessTokenStore>,
        nonces: Arc<dyn NonceStore>,
    ) -> Self {
        Self { consumers, request_tokens, access_tokens, nonces }
    }

    /// Verify a parsed request presenting the given token type.
    ///
    /// `bypass_nonce` skips timestamp and nonce checks; the xAuth exchange
    /// uses it because some mobile consumers sign xAuth requests with wildly
    /// skewed clocks.
    ///
    /// # Errors
    ///
    /// Any protocol fault, in pipeline order: missing parameters, consumer
    /// and token rejection, timestamp/nonce refusal, version or signature
    /// method rejection, and signature mismatch.
    pub async fn verify(
        &self,
        request: &SignedRequest,
        token_type: TokenType,
        bypass_nonce: bool,
    ) -> OAuthResult<VerifiedIdentity> {
        let consumer_key = request
            .param_decoded(OAUTH_CONSUMER_KEY)
            .ok_or_else(|| OAuthError::parameter_absent(OAUTH_CONSUMER_KEY))?;

        // Token-less requests may still sign over an oauth_token parameter.
        let token = match token_type {
            TokenType::None => request.param_decoded(OAUTH_TOKEN).unwrap_or_default(),
            TokenType::Request | TokenType::Access => request
                .param_decoded(OAUTH_TOKEN)
                .ok_or_else(|| OAuthError::parameter_absent(OAUTH_TOKEN))?,
        };

        let credentials = self
            .consumers
            .consumer_credentials(&consumer_key, &ConsumerFilter::default())
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Consumer lookup failed");
                OAuthError::ServiceUnavailable
            })?
            .ok_or_else(|| OAuthError::ConsumerKeyRejected { value: consumer_key.clone() })?;

        // Any token lookup failure, storage errors included, reads as a
        // rejected token to the consumer.
        let mut identity = VerifiedIdentity {
            username: None,
            callback_url: None,
            referer_url: None,
            consumer_key: consumer_key.clone(),
            token: token.clone(),
        };
        let token_secret = match token_type {
            TokenType::None => String::new(),
            TokenType::Request => {
                let stored = self
                    .request_tokens
                    .get(&token, Some(&consumer_key))
                    .await
                    .ok()
                    .flatten()
                    .ok_or_else(|| OAuthError::token_rejected(&token))?;
                identity.username = stored.username;
                identity.callback_url = Some(stored.callback_url);
                identity.referer_url = stored.referer_url;
                stored.token_secret
            }
            TokenType::Access => {
                let stored = self
                    .access_tokens
                    .get(&token, Some(&consumer_key))
                    .await
                    .ok()
                    .flatten()
                    .ok_or_else(|| OAuthError::token_rejected(&token))?;
                identity.username = Some(stored.username);
                identity.callback_url = Some(stored.callback_url);
                identity.referer_url = Some(stored.referer_url);
                stored.token_secret
            }
        };

        if !bypass_nonce {
            self.check_timestamp_and_nonce(request, &consumer_key, &token).await?;
        }

        // an empty signature value counts as absent, like param_decoded
        let presented = request
            .param(OAUTH_SIGNATURE)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| OAuthError::parameter_absent(OAUTH_SIGNATURE))?
            .to_string();
        let method_name = request
            .param_decoded(OAUTH_SIGNATURE_METHOD)
            .ok_or_else(|| OAuthError::parameter_absent(OAUTH_SIGNATURE_METHOD))?;

        let version = request
            .param_decoded(OAUTH_VERSION)
            .ok_or_else(|| OAuthError::parameter_absent(OAUTH_VERSION))?;
        if version != "1.0" && version != "1.0a" {
            return Err(OAuthError::VersionRejected { value: version });
        }

        let base = request.signature_base();
        let method = signature::for_method(&method_name)?;
        if !method.verify(&base, &credentials.consumer_secret, &token_secret, &presented) {
            return Err(OAuthError::SignatureInvalid { value: presented, base });
        }

        self.check_body_signature(request, &method_name, &credentials.consumer_secret, &token_secret)?;

        // TTL reset extension: a verified access-token request may shorten or
        // extend its own token's lifetime (zero or less deletes it). Values
        // beyond the sane range are ignored like non-numeric ones.
        if token_type == TokenType::Access {
            if let Some(ttl) = request.param_decoded(XOAUTH_TOKEN_TTL) {
                if let Ok(ttl) = ttl.parse::<i64>() {
                    if ttl <= limits::MAX_TOKEN_TTL {
                        self.access_tokens.set_ttl(&token, ttl).await.map_err(|e| {
                            tracing::error!(error = %e, "Token TTL reset failed");
                            OAuthError::ServiceUnavailable
                        })?;
                    }
                }
            }
        }

        Ok(identity)
    }

    /// Verify only when the request presents a consumer key; anonymous
    /// requests pass through as `None`. Lets an endpoint serve both public
    /// and authenticated traffic. A consumer key without a signature is a
    /// protocol fault, never anonymous traffic.
    pub async fn verify_if_signed(
        &self,
        request: &SignedRequest,
        token_type: TokenType,
    ) -> OAuthResult<Option<VerifiedIdentity>> {
        if !request.params().contains(OAUTH_CONSUMER_KEY) {
            return Ok(None);
        }
        self.verify(request, token_type, false).await.map(Some)
    }

    async fn check_timestamp_and_nonce(
        &self,
        request: &SignedRequest,
        consumer_key: &str,
        token: &str,
    ) -> OAuthResult<()> {
        let timestamp = request
            .param_decoded(OAUTH_TIMESTAMP)
            .ok_or_else(|| OAuthError::parameter_absent(OAUTH_TIMESTAMP))?;
        let parsed: i64 = timestamp
            .parse()
            .map_err(|_| OAuthError::TimestampRefused { value: timestamp.clone() })?;

        let fresh = self.nonces.validate_timestamp(parsed).await.map_err(|e| {
            tracing::error!(error = %e, "Timestamp validation failed");
            OAuthError::ServiceUnavailable
        })?;
        if !fresh {
            return Err(OAuthError::TimestampRefused { value: timestamp });
        }

        let nonce = request
            .param_decoded(OAUTH_NONCE)
            .ok_or_else(|| OAuthError::parameter_absent(OAUTH_NONCE))?;
        let unused = self
            .nonces
            .validate_nonce(consumer_key, token, parsed, &nonce)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Nonce validation failed");
                OAuthError::ServiceUnavailable
            })?;
        if !unused {
            return Err(OAuthError::NonceUsed { value: nonce });
        }
        Ok(())
    }

    /// Check the non-standard `xoauth_body_signature` extension when present.
    /// The body signature method defaults to the request's signature method.
    fn check_body_signature(
        &self,
        request: &SignedRequest,
        method_name: &str,
        consumer_secret: &str,
        token_secret: &str,
    ) -> OAuthResult<()> {
        let Some(presented) = request
            .param(XOAUTH_BODY_SIGNATURE)
            .filter(|v| !v.is_empty())
            .map(ToString::to_string)
        else {
            return Ok(());
        };
        let body_method_name = request
            .param_decoded(XOAUTH_BODY_SIGNATURE_METHOD)
            .unwrap_or_else(|| method_name.to_string());
        let body = request.body().unwrap_or("");

        let method = signature::for_method(&body_method_name)?;
        if !method.verify(body, consumer_secret, token_secret, &presented) {
            return Err(OAuthError::SignatureInvalid {
                value: presented,
                base: body.to_string(),
            });
        }
        Ok(())
    }
}
