//! Endpoint tests over the axum router using `tower::ServiceExt::oneshot`.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use oauth1_provider::http::router;
use oauth1_provider::request::{RawRequest, SignedRequest};
use oauth1_provider::signature::{HmacSha1, SignatureMethod};
use oauth1_provider::storage::memory::MemoryStore;
use oauth1_provider::storage::Consumer;
use oauth1_provider::{Config, Provider};

const CONSUMER_KEY: &str = "ck1";
const CONSUMER_SECRET: &str = "cs1";
const HOST: &str = "api.example.com";

async fn build_provider() -> Provider {
    let store = MemoryStore::new();
    store
        .add_consumer(Consumer {
            consumer_key: CONSUMER_KEY.to_string(),
            consumer_secret: CONSUMER_SECRET.to_string(),
            name: Some("HTTP tests".to_string()),
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
    Provider::from_memory(Config::new(format!("http://{HOST}/")), store)
}

/// Sign a path + parameters the way a consumer would, returning the
/// path-and-query to send.
fn signed_path(method: &str, path: &str, token_secret: &str, nonce: &str, extra: &[(&str, &str)]) -> String {
    let mut query = vec![
        format!("oauth_consumer_key={CONSUMER_KEY}"),
        format!("oauth_nonce={nonce}"),
        "oauth_signature_method=HMAC-SHA1".to_string(),
        format!("oauth_timestamp={}", chrono::Utc::now().timestamp()),
        "oauth_version=1.0".to_string(),
    ];
    for (name, value) in extra {
        query.push(format!("{name}={}", oauth1_provider::codec::encode(value)));
    }
    let full = format!("http://{HOST}{path}?{}", query.join("&"));
    let unsigned = SignedRequest::parse(&RawRequest::new(method, &full)).unwrap();
    let sig = HmacSha1.sign(&unsigned.signature_base(), CONSUMER_SECRET, token_secret);
    format!("{path}?{}&oauth_signature={sig}", query.join("&"))
}

/// Sign parameters destined for a form-encoded POST body.
fn signed_form(path: &str, token_secret: &str, nonce: &str, extra: &[(&str, &str)]) -> String {
    let mut pairs = vec![
        ("oauth_consumer_key", CONSUMER_KEY.to_string()),
        ("oauth_nonce", nonce.to_string()),
        ("oauth_signature_method", "HMAC-SHA1".to_string()),
        ("oauth_timestamp", chrono::Utc::now().timestamp().to_string()),
        ("oauth_version", "1.0".to_string()),
    ];
    for (name, value) in extra {
        pairs.push((name, (*value).to_string()));
    }
    let body = serde_urlencoded::to_string(&pairs).unwrap();

    let unsigned = SignedRequest::parse(
        &RawRequest::new("POST", format!("http://{HOST}{path}"))
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(body.clone()),
    )
    .unwrap();
    let sig = HmacSha1.sign(&unsigned.signature_base(), CONSUMER_SECRET, token_secret);
    format!("{body}&oauth_signature={sig}")
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health_check() {
    let app = router(build_provider().await);
    let response =
        app.oneshot(Request::get("/health").body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_request_token_endpoint() {
    let app = router(build_provider().await);

    let uri = signed_path(
        "GET",
        "/oauth/request_token",
        "",
        "http-n1",
        &[("oauth_callback", "http://client.example/cb")],
    );
    let response = app
        .oneshot(Request::get(&uri).header("Host", HOST).body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert!(body["oauth_token"].as_str().is_some_and(|t| !t.is_empty()));
    assert!(body["oauth_token_secret"].as_str().is_some_and(|t| !t.is_empty()));
    assert_eq!(body["oauth_callback_confirmed"], true);
    assert!(body["xoauth_token_ttl"].as_i64().unwrap() > 0);
}

#[tokio::test]
async fn test_unsigned_request_challenged() {
    let app = router(build_provider().await);

    let response = app
        .oneshot(
            Request::get("/oauth/request_token")
                .header("Host", HOST)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let challenge =
        response.headers().get("www-authenticate").unwrap().to_str().unwrap().to_string();
    assert!(challenge.starts_with(&format!("OAuth realm=\"http://{HOST}/\"")));
    assert!(challenge.contains("oauth_problem=\"parameter_absent\""));

    let body = json_body(response).await;
    assert_eq!(body["code"], 90);
    assert_eq!(body["oauth_problem"], "parameter_absent");
}

#[tokio::test]
async fn test_bad_signature_gets_401() {
    let app = router(build_provider().await);

    let uri = signed_path("GET", "/oauth/request_token", "wrong-secret", "http-n2", &[]);
    let response = app
        .oneshot(Request::get(&uri).header("Host", HOST).body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await;
    assert_eq!(body["oauth_problem"], "signature_invalid");
}

#[tokio::test]
async fn test_full_flow_over_http() {
    let provider = build_provider().await;
    let app = router(provider.clone());

    // 1. request token
    let uri = signed_path(
        "POST",
        "/oauth/request_token",
        "",
        "flow-n1",
        &[("oauth_callback", "http://client.example/cb")],
    );
    let response = app
        .clone()
        .oneshot(Request::post(&uri).header("Host", HOST).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let issued = json_body(response).await;
    let token = issued["oauth_token"].as_str().unwrap().to_string();
    let token_secret = issued["oauth_token_secret"].as_str().unwrap().to_string();

    // 2. authorize out of band (the UI calls the provider directly)
    provider.authorize_verify(&token, None).await.unwrap();
    let outcome = provider.authorize_finish(&token, true, "alice").await.unwrap();
    let verifier = outcome.verifier.unwrap();

    // 3. exchange over HTTP
    let uri = signed_path(
        "POST",
        "/oauth/access_token",
        &token_secret,
        "flow-n2",
        &[("oauth_token", &token), ("oauth_verifier", &verifier)],
    );
    let response = app
        .oneshot(Request::post(&uri).header("Host", HOST).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let access = json_body(response).await;
    assert!(access["oauth_token"].as_str().is_some_and(|t| !t.is_empty()));
    assert_ne!(access["oauth_token"], issued["oauth_token"]);
}

#[tokio::test]
async fn test_xauth_endpoint() {
    let app = router(build_provider().await);

    let body = signed_form(
        "/oauth/auth",
        "",
        "xauth-n1",
        &[
            ("x_auth_mode", "client_auth"),
            ("x_auth_username", "alice"),
            ("x_auth_password", "wonderland"),
        ],
    );
    let response = app
        .oneshot(
            Request::post("/oauth/auth")
                .header("Host", HOST)
                .header("Content-Type", "application/x-www-form-urlencoded")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert!(body["oauth_token"].as_str().is_some_and(|t| !t.is_empty()));
    assert_eq!(body["username"], "alice");
    assert!(body["expires_at"].as_str().is_some());
}

#[tokio::test]
async fn test_xauth_rejects_bad_credentials() {
    let app = router(build_provider().await);

    let body = signed_form(
        "/oauth/auth",
        "",
        "xauth-n2",
        &[
            ("x_auth_mode", "client_auth"),
            ("x_auth_username", "alice"),
            ("x_auth_password", "nope"),
        ],
    );
    let response = app
        .oneshot(
            Request::post("/oauth/auth")
                .header("Host", HOST)
                .header("Content-Type", "application/x-www-form-urlencoded")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await;
    assert_eq!(body["code"], 103);
    assert_eq!(body["oauth_problem"], "invalid_credentials");
}
