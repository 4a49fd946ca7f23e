//! HTTP endpoint glue.
//!
//! Thin axum layer over the provider engine: token endpoints plus the xAuth
//! exchange. Success bodies are JSON with the OAuth parameter names; faults
//! are JSON with the stable code, message, and `oauth_problem`, the HTTP
//! status from the problem catalog, and a `WWW-Authenticate` challenge.
//! Browser login/authorize pages are out of scope; the authorization UI calls
//! the provider directly.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::error::OAuthError;
use crate::provider::Provider;
use crate::request::RawRequest;

/// Request bodies above this are refused outright.
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Build the OAuth endpoint router.
pub fn router(provider: Provider) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/oauth/request_token", get(handle_request_token).post(handle_request_token))
        .route("/oauth/access_token", get(handle_access_token).post(handle_access_token))
        .route("/oauth/auth", post(handle_xauth))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(provider))
}

/// Bind and serve the router until the process is stopped.
///
/// # Errors
///
/// Returns error when the listener cannot bind or the server fails.
pub async fn serve(provider: Provider, port: u16) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "OAuth provider listening");
    axum::serve(listener, router(provider)).await?;
    Ok(())
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "oauth1-provider",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// `GET|POST /oauth/request_token`
async fn handle_request_token(State(state): State<Arc<Provider>>, req: Request) -> Response {
    let realm = state.realm().to_string();
    let raw = match raw_request(req).await {
        Ok(raw) => raw,
        Err(fault) => return fault_response(&fault, &realm),
    };
    match state.request_token(&raw).await {
        Ok(response) => Json(response).into_response(),
        Err(fault) => fault_response(&fault, &realm),
    }
}

/// `GET|POST /oauth/access_token`
async fn handle_access_token(State(state): State<Arc<Provider>>, req: Request) -> Response {
    let realm = state.realm().to_string();
    let raw = match raw_request(req).await {
        Ok(raw) => raw,
        Err(fault) => return fault_response(&fault, &realm),
    };
    match state.access_token(&raw).await {
        Ok(response) => Json(response).into_response(),
        Err(fault) => fault_response(&fault, &realm),
    }
}

/// `POST /oauth/auth` — the xAuth exchange.
async fn handle_xauth(State(state): State<Arc<Provider>>, req: Request) -> Response {
    let realm = state.realm().to_string();
    let raw = match raw_request(req).await {
        Ok(raw) => raw,
        Err(fault) => return fault_response(&fault, &realm),
    };
    match state.xauth(&raw).await {
        Ok(response) => Json(response).into_response(),
        Err(fault) => fault_response(&fault, &realm),
    }
}

/// Convert an inbound axum request into the transport-agnostic descriptor,
/// reading the body exactly once.
async fn raw_request(req: Request) -> Result<RawRequest, OAuthError> {
    let (parts, body) = req.into_parts();

    let host = parts
        .headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");
    // Deployments terminate TLS upstream; trust the forwarded scheme.
    let scheme = parts
        .headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("http");
    let url = format!("{scheme}://{host}{}", parts.uri);

    let headers = parts
        .headers
        .iter()
        .filter_map(|(name, value)| {
            value.to_str().ok().map(|v| (name.to_string(), v.to_string()))
        })
        .collect();

    let bytes = axum::body::to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|_| OAuthError::ServiceUnavailable)?;
    let body = if bytes.is_empty() {
        None
    } else {
        Some(String::from_utf8_lossy(&bytes).into_owned())
    };

    let mut raw = RawRequest::new(parts.method.as_str(), url);
    raw.headers = headers;
    raw.body = body;
    Ok(raw)
}

/// Render a protocol fault: problem-catalog status, challenge header, and a
/// JSON body with the stable code.
fn fault_response(fault: &OAuthError, realm: &str) -> Response {
    let status =
        StatusCode::from_u16(fault.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    tracing::debug!(code = fault.code(), problem = fault.problem(), "Request refused");

    (
        status,
        [(header::WWW_AUTHENTICATE, fault.challenge(realm))],
        Json(serde_json::json!({
            "code": fault.code(),
            "message": fault.to_string(),
            "oauth_problem": fault.problem(),
        })),
    )
        .into_response()
}
