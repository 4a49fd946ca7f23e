//! End-to-end token lifecycle tests against the in-memory store.

use oauth1_provider::codec;
use oauth1_provider::error::OAuthError;
use oauth1_provider::request::{RawRequest, SignedRequest};
use oauth1_provider::signature::{HmacSha1, SignatureMethod};
use oauth1_provider::storage::memory::MemoryStore;
use oauth1_provider::storage::{AccessTokenOptions, AccessTokenStore, Consumer};
use oauth1_provider::{Config, Provider, TokenType};

const CONSUMER_KEY: &str = "ck1";
const CONSUMER_SECRET: &str = "cs1";

async fn seeded_store() -> MemoryStore {
    let store = MemoryStore::new();
    store
        .add_consumer(Consumer {
            consumer_key: CONSUMER_KEY.to_string(),
            consumer_secret: CONSUMER_SECRET.to_string(),
            name: Some("Lifecycle tests".to_string()),
            publisher: None,
            app_type: None,
            category: None,
            website_url: None,
            email: None,
            description: None,
            callback_url: None,
            enabled: true,
        })
        .await;
    store.add_user("alice", "wonderland").await;
    store
}

async fn provider() -> (Provider, MemoryStore) {
    let store = seeded_store().await;
    (Provider::from_memory(Config::new("http://api.example.com/"), store.clone()), store)
}

/// Build a signed request: the oauth protocol parameters plus `extra`, all in
/// the query string, signed with HMAC-SHA1.
fn signed(method: &str, url: &str, token_secret: &str, nonce: &str, extra: &[(&str, &str)]) -> RawRequest {
    let mut query = vec![
        format!("oauth_consumer_key={CONSUMER_KEY}"),
        format!("oauth_nonce={nonce}"),
        "oauth_signature_method=HMAC-SHA1".to_string(),
        format!("oauth_timestamp={}", chrono::Utc::now().timestamp()),
        "oauth_version=1.0".to_string(),
    ];
    for (name, value) in extra {
        query.push(format!("{name}={}", codec::encode(value)));
    }
    let full = format!("{url}?{}", query.join("&"));
    let unsigned = SignedRequest::parse(&RawRequest::new(method, &full)).unwrap();
    let sig = HmacSha1.sign(&unsigned.signature_base(), CONSUMER_SECRET, token_secret);
    RawRequest::new(method, format!("{full}&oauth_signature={sig}"))
}

const REQUEST_TOKEN_URL: &str = "http://api.example.com/oauth/request_token";
const ACCESS_TOKEN_URL: &str = "http://api.example.com/oauth/access_token";
const XAUTH_URL: &str = "http://api.example.com/oauth/auth";
const RESOURCE_URL: &str = "http://api.example.com/photos";

#[tokio::test]
async fn test_three_legged_flow() {
    let (provider, _store) = provider().await;

    // 1. consumer obtains an unauthorized request token
    let raw = signed(
        "GET",
        REQUEST_TOKEN_URL,
        "",
        "abc123",
        &[("oauth_callback", "http://client.example/cb")],
    );
    let issued = provider.request_token(&raw).await.unwrap();
    assert!(issued.callback_confirmed);
    assert!(!issued.token.is_empty());
    assert!(issued.token_ttl > 0);

    let stored = provider.get_request_token(&issued.token).await.unwrap();
    assert!(!stored.authorized);
    assert_eq!(stored.callback_url, "http://client.example/cb");

    // 2. user approves
    let prompt = provider.authorize_verify(&issued.token, None).await.unwrap();
    assert_eq!(prompt.callback_url, "http://client.example/cb");
    assert!(prompt.consumer.consumer_secret.is_empty());

    let outcome = provider.authorize_finish(&issued.token, true, "alice").await.unwrap();
    let verifier = outcome.verifier.unwrap();
    let redirect = outcome.redirect_url.unwrap();
    assert!(redirect.starts_with("http://client.example/cb?oauth_token="));
    assert!(redirect.contains(&format!("oauth_verifier={verifier}")));

    // 3. consumer exchanges for an access token
    let raw = signed(
        "GET",
        ACCESS_TOKEN_URL,
        &issued.token_secret,
        "def456",
        &[("oauth_token", &issued.token), ("oauth_verifier", &verifier)],
    );
    let access = provider.access_token(&raw).await.unwrap();
    assert!(!access.token_secret.is_empty());
    assert_ne!(access.token_secret, issued.token_secret);

    // the consumed request token is gone
    let err = provider.get_request_token(&issued.token).await.unwrap_err();
    assert!(matches!(err, OAuthError::TokenRejected { .. }));

    // 4. the access token verifies a protected-resource call as alice
    let raw = signed(
        "GET",
        RESOURCE_URL,
        &access.token_secret,
        "ghi789",
        &[("oauth_token", &access.token)],
    );
    let identity = provider.verify(&raw, TokenType::Access).await.unwrap();
    assert_eq!(identity.username.as_deref(), Some("alice"));
    assert_eq!(identity.consumer_key, CONSUMER_KEY);
}

#[tokio::test]
async fn test_exchange_requires_authorization() {
    let (provider, _store) = provider().await;

    let raw = signed(
        "GET",
        REQUEST_TOKEN_URL,
        "",
        "n1",
        &[("oauth_callback", "http://client.example/cb")],
    );
    let issued = provider.request_token(&raw).await.unwrap();

    let raw = signed(
        "GET",
        ACCESS_TOKEN_URL,
        &issued.token_secret,
        "n2",
        &[("oauth_token", &issued.token)],
    );
    let err = provider.access_token(&raw).await.unwrap_err();
    assert_eq!(err, OAuthError::NotAuthorized);
}

#[tokio::test]
async fn test_exchange_rejects_wrong_verifier() {
    let (provider, _store) = provider().await;

    let raw = signed(
        "GET",
        REQUEST_TOKEN_URL,
        "",
        "n1",
        &[("oauth_callback", "oob")],
    );
    let issued = provider.request_token(&raw).await.unwrap();
    provider.authorize_verify(&issued.token, None).await.unwrap();
    provider.authorize_finish(&issued.token, true, "alice").await.unwrap();

    let raw = signed(
        "GET",
        ACCESS_TOKEN_URL,
        &issued.token_secret,
        "n2",
        &[("oauth_token", &issued.token), ("oauth_verifier", "not-the-verifier")],
    );
    let err = provider.access_token(&raw).await.unwrap_err();
    assert_eq!(err, OAuthError::NotAuthorized);
}

#[tokio::test]
async fn test_denial_deletes_token() {
    let (provider, _store) = provider().await;

    let raw = signed(
        "GET",
        REQUEST_TOKEN_URL,
        "",
        "n1",
        &[("oauth_callback", "http://client.example/cb")],
    );
    let issued = provider.request_token(&raw).await.unwrap();
    provider.authorize_verify(&issued.token, None).await.unwrap();

    let outcome = provider.authorize_finish(&issued.token, false, "alice").await.unwrap();
    assert!(outcome.verifier.is_none());
    // the redirect still happens, without a verifier
    let redirect = outcome.redirect_url.unwrap();
    assert!(redirect.contains("oauth_token="));
    assert!(!redirect.contains("oauth_verifier="));

    let err = provider.get_request_token(&issued.token).await.unwrap_err();
    assert!(matches!(err, OAuthError::TokenRejected { .. }));
}

#[tokio::test]
async fn test_finish_without_pending_state() {
    let (provider, _store) = provider().await;
    let err = provider.authorize_finish("stale-token", true, "alice").await.unwrap_err();
    assert_eq!(err, OAuthError::NotAuthorized);
}

#[tokio::test]
async fn test_oob_callback_never_redirected() {
    let (provider, _store) = provider().await;

    let raw = signed("GET", REQUEST_TOKEN_URL, "", "n1", &[("oauth_callback", "oob")]);
    let issued = provider.request_token(&raw).await.unwrap();
    provider.authorize_verify(&issued.token, None).await.unwrap();

    let outcome = provider.authorize_finish(&issued.token, true, "alice").await.unwrap();
    assert!(outcome.verifier.is_some());
    assert!(outcome.redirect_url.is_none());
}

#[tokio::test]
async fn test_javascript_callback_refused() {
    let (provider, _store) = provider().await;

    let raw = signed("GET", REQUEST_TOKEN_URL, "", "n1", &[("oauth_callback", "oob")]);
    let issued = provider.request_token(&raw).await.unwrap();
    provider.authorize_verify(&issued.token, Some("javascript:alert(1)")).await.unwrap();

    let err = provider.authorize_finish(&issued.token, true, "alice").await.unwrap_err();
    assert!(matches!(err, OAuthError::BadUrl { .. }));
}

#[tokio::test]
async fn test_two_legged_flow() {
    let (provider, _store) = provider().await;

    // no oauth_callback at all: pre-authorized, no user interaction
    let raw = signed("GET", REQUEST_TOKEN_URL, "", "n1", &[]);
    let issued = provider.request_token(&raw).await.unwrap();
    let stored = provider.get_request_token(&issued.token).await.unwrap();
    assert!(stored.authorized);

    let raw = signed(
        "GET",
        ACCESS_TOKEN_URL,
        &issued.token_secret,
        "n2",
        &[("oauth_token", &issued.token)],
    );
    let access = provider.access_token(&raw).await.unwrap();
    assert!(!access.token.is_empty());
}

#[tokio::test]
async fn test_outlandish_requested_ttl_falls_back_to_default() {
    let (provider, _store) = provider().await;

    let raw = signed(
        "GET",
        REQUEST_TOKEN_URL,
        "",
        "n1",
        &[("xoauth_token_ttl", "9223372036854775807")],
    );
    let issued = provider.request_token(&raw).await.unwrap();
    assert!(issued.token_ttl > 0);
    assert!(issued.token_ttl <= 3_600);

    // the token is usable despite the nonsense TTL request
    provider.get_request_token(&issued.token).await.unwrap();
}

#[tokio::test]
async fn test_expired_access_token_rejected() {
    let (provider, store) = provider().await;

    let expired = AccessTokenStore::create(
        &store,
        CONSUMER_KEY,
        "alice",
        AccessTokenOptions { token_ttl: Some(-1), ..Default::default() },
    )
    .await
    .unwrap();

    let raw = signed(
        "GET",
        RESOURCE_URL,
        &expired.token_secret,
        "n1",
        &[("oauth_token", &expired.token)],
    );
    let err = provider.verify(&raw, TokenType::Access).await.unwrap_err();
    assert!(matches!(err, OAuthError::TokenRejected { .. }));
}

#[tokio::test]
async fn test_xauth_exchange() {
    let (provider, _store) = provider().await;

    let raw = signed(
        "POST",
        XAUTH_URL,
        "",
        "nx1",
        &[
            ("x_auth_mode", "client_auth"),
            ("x_auth_username", "alice"),
            ("x_auth_password", "wonderland"),
        ],
    );
    let response = provider.xauth(&raw).await.unwrap();
    assert!(!response.token.is_empty());
    assert!(response.token_ttl > 0);
    assert_eq!(
        response.user.get("username"),
        Some(&serde_json::Value::String("alice".to_string()))
    );

    // the issued token verifies as alice
    let raw = signed(
        "GET",
        RESOURCE_URL,
        &response.token_secret,
        "nx2",
        &[("oauth_token", &response.token)],
    );
    let identity = provider.verify(&raw, TokenType::Access).await.unwrap();
    assert_eq!(identity.username.as_deref(), Some("alice"));
}

#[tokio::test]
async fn test_xauth_wrong_password() {
    let (provider, _store) = provider().await;

    let raw = signed(
        "POST",
        XAUTH_URL,
        "",
        "nx1",
        &[
            ("x_auth_mode", "client_auth"),
            ("x_auth_username", "alice"),
            ("x_auth_password", "queen-of-hearts"),
        ],
    );
    let err = provider.xauth(&raw).await.unwrap_err();
    assert_eq!(err, OAuthError::InvalidCredentials { username: "alice".to_string() });
}

#[tokio::test]
async fn test_xauth_bad_signature_not_masked() {
    let (provider, _store) = provider().await;

    // correct credentials, deliberately corrupted signature
    let good = signed(
        "POST",
        XAUTH_URL,
        "",
        "nx1",
        &[
            ("x_auth_mode", "client_auth"),
            ("x_auth_username", "alice"),
            ("x_auth_password", "wonderland"),
        ],
    );
    let corrupted = RawRequest::new("POST", format!("{}x", good.url));
    let err = provider.xauth(&corrupted).await.unwrap_err();
    assert!(matches!(err, OAuthError::SignatureInvalid { .. }));
}

#[tokio::test]
async fn test_xauth_missing_credentials() {
    let (provider, _store) = provider().await;

    let raw = signed("POST", XAUTH_URL, "", "nx1", &[("x_auth_username", "alice")]);
    let err = provider.xauth(&raw).await.unwrap_err();
    assert_eq!(err, OAuthError::parameter_absent("x_auth_password"));
}

#[tokio::test]
async fn test_verify_if_signed() {
    let (provider, _store) = provider().await;

    let unsigned = RawRequest::new("GET", RESOURCE_URL);
    assert!(provider.verify_if_signed(&unsigned, TokenType::None).await.unwrap().is_none());

    let raw = signed("GET", RESOURCE_URL, "", "ns1", &[]);
    assert!(provider.verify_if_signed(&raw, TokenType::None).await.unwrap().is_some());

    // a consumer key without a signature is a fault, not anonymous traffic
    let url = format!("{RESOURCE_URL}?oauth_consumer_key={CONSUMER_KEY}");
    let keyed = RawRequest::new("GET", url);
    let err = provider.verify_if_signed(&keyed, TokenType::None).await.unwrap_err();
    assert!(matches!(err, OAuthError::ParameterAbsent { .. }));
}
