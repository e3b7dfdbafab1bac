//! HTTP surface (C6's external face): the session bootstrap endpoints
//! plus the two demo routes carried over from the original's `web`
//! package (§11). A WebSocket upgrade endpoint is an external
//! collaborator and is intentionally not implemented here.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, Method};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use umbra_core::primitives::sum;

use crate::captcha::CaptchaRenderer;
use crate::error::HandshakeError;
use crate::handshake::{self, AppState, SessionInitRequest, SessionInitResponse};

/// Length, in bytes, of the truncated BLAKE3-512 digest used as the
/// rate limiter's tracker key (§3/§4.3).
const IDENTITY_HASH_LEN: usize = 16;

pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any)
        .allow_origin(Any);

    Router::new()
        .route("/hello-world", get(hello_world).post(hello_world))
        .route("/session/init", post(session_init))
        .route("/demo/captcha", get(demo_captcha))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn hello_world() -> impl IntoResponse {
    Json(serde_json::json!({ "msg": "Hello, World!" }))
}

/// Identity used for rate limiting: the first `X-Forwarded-For` hop if
/// a reverse proxy set one, otherwise a constant bucket. Trusting this
/// header assumes a proxy in front that overwrites client-supplied
/// values; that assumption belongs to the deployment, not this code.
///
/// The raw address never becomes the tracker key itself — per §3/§4.3,
/// `identity_hash = base64(BLAKE3-512(client_ip)[:16])`, a one-way
/// hash so the rate limiter's in-memory map never holds a reversible
/// client address.
fn client_identity(headers: &HeaderMap) -> String {
    let client_ip = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or("unidentified");
    identity_hash(client_ip)
}

fn identity_hash(client_ip: &str) -> String {
    let digest = sum(client_ip.as_bytes());
    URL_SAFE_NO_PAD.encode(&digest[..IDENTITY_HASH_LEN])
}

async fn session_init(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<SessionInitRequest>,
) -> Result<Json<SessionInitResponse>, HandshakeError> {
    let identity = client_identity(&headers);
    let resp = handshake::init(&state, &identity, req).await?;
    Ok(Json(resp))
}

/// Renders a CAPTCHA for a throwaway solution and discards it immediately.
/// Exists purely so the renderer can be exercised by hand; the solution
/// never leaves this function, so nothing downstream can check against it.
async fn demo_captcha(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    use rand::Rng;
    let solution: u32 = rand::thread_rng().gen_range(100_000..1_000_000);
    let png = state.captcha.render(solution);
    (
        [
            ("Content-Type", "image/png"),
            ("Cache-Control", "no-store"),
        ],
        png,
    )
}
