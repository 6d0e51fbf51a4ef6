//! Inbound routes and handlers
//!
//! Every catalog route is an authenticated POST; the auth middleware
//! verifies the bearer token before any body processing. Query routes never
//! answer HTTP errors: failures come back as `{"error": …}` with status
//! 200 so the mobile client parses one response shape. Real status codes
//! are reserved for inbound auth (401) and the avatar upload route.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Context;
use axum::Router;
use axum::extract::{DefaultBodyLimit, Extension, Json, Multipart, Request, State};
use axum::http::{StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use bytes::Bytes;
use igdb_gateway::UpstreamGateway;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::avatar::{self, AvatarStore, UploadError};
use crate::cache::ResponseCache;
use crate::error::AuthError;
use crate::identity::{CallerIdentity, IdentityVerifier};
use crate::metrics::{ServiceMetrics, record_cache, record_route};
use crate::queries;

/// Multipart body ceiling: the 2 MiB avatar plus form framing overhead.
const UPLOAD_BODY_LIMIT: usize = 4 * 1024 * 1024;

/// Shared application state accessible from all handlers
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<UpstreamGateway>,
    pub cache: Arc<ResponseCache>,
    pub verifier: Arc<dyn IdentityVerifier>,
    pub avatars: Arc<dyn AvatarStore>,
    pub metrics: ServiceMetrics,
    pub prometheus: PrometheusHandle,
}

/// Build the axum router with all routes and shared state.
///
/// `/health` and `/metrics` stay outside the auth middleware; everything
/// else requires a verified bearer token. The concurrency limit layer
/// bounds in-flight requests across all routes.
pub fn build_router(state: AppState, max_connections: usize) -> Router {
    let api = Router::new()
        .route("/getTrendingGames", post(get_trending_games))
        .route("/getTopGames", post(get_top_games))
        .route("/getTopNewGames", post(get_top_new_games))
        .route("/getGamesByName", post(get_games_by_name))
        .route("/getGameById", post(get_game_by_id))
        .route(
            "/user/uploadAvatarByUID",
            post(upload_avatar_by_uid).layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT)),
        )
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .merge(api)
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
        .with_state(state)
}

/// Verify the inbound bearer token and attach the caller identity.
///
/// Token verification happens before the body is touched; an invalid caller
/// never reaches a handler or the upstream gateway.
async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    state.metrics.requests_total.fetch_add(1, Ordering::Relaxed);

    let header_value = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let Some(id_token) = header_value
        .strip_prefix("Bearer ")
        .filter(|t| !t.is_empty())
    else {
        state.metrics.errors_total.fetch_add(1, Ordering::Relaxed);
        return Err(AuthError::MissingToken);
    };

    let caller = match state.verifier.verify(id_token).await {
        Ok(caller) => caller,
        Err(e) => {
            state.metrics.errors_total.fetch_add(1, Ordering::Relaxed);
            return Err(e);
        }
    };

    request.extensions_mut().insert(caller);
    Ok(next.run(request).await)
}

/// Success payload pass-through for query routes.
fn json_body(route: &'static str, body: Bytes) -> Response {
    record_route(route, "ok");
    ([(header::CONTENT_TYPE, "application/json")], body).into_response()
}

/// Query-route failure convention: HTTP 200 with the failure as data.
fn json_error(state: &AppState, route: &'static str, error: impl std::fmt::Display) -> Response {
    state.metrics.errors_total.fetch_add(1, Ordering::Relaxed);
    record_route(route, "error");
    warn!(route, error = %error, "query route failed");
    Json(json!({ "error": error.to_string() })).into_response()
}

/// Serve a cacheable route: a hit bypasses the gateway entirely; a miss
/// runs `fetch` and stores the body for the TTL window.
async fn cached<F>(state: &AppState, route: &'static str, fetch: F) -> Response
where
    F: Future<Output = anyhow::Result<Bytes>>,
{
    if let Some(body) = state.cache.get(route).await {
        record_cache(route, true);
        return json_body(route, body);
    }
    record_cache(route, false);
    debug!(route, "cache miss, querying upstream");

    match fetch.await {
        Ok(body) => {
            state.cache.insert(route, body.clone()).await;
            json_body(route, body)
        }
        Err(e) => json_error(state, route, e),
    }
}

#[derive(Deserialize)]
struct PopularityPrimitive {
    game_id: u64,
}

/// Trending is two-phase: popularity ids first, then the game rows.
async fn fetch_trending(state: &AppState) -> anyhow::Result<Bytes> {
    let body = state
        .gateway
        .send("popularity_primitives", &queries::trending_popularity())
        .await?;
    let primitives: Vec<PopularityPrimitive> =
        serde_json::from_slice(&body).context("unexpected popularity payload")?;

    let ids: Vec<u64> = primitives.iter().map(|p| p.game_id).collect();
    if ids.is_empty() {
        return Ok(Bytes::from_static(b"[]"));
    }

    Ok(state
        .gateway
        .send("games", &queries::games_by_ids(&ids))
        .await?)
}

async fn get_trending_games(State(state): State<AppState>) -> Response {
    cached(&state, "getTrendingGames", fetch_trending(&state)).await
}

async fn get_top_games(State(state): State<AppState>) -> Response {
    let fetch = async {
        Ok::<_, anyhow::Error>(state.gateway.send("games", &queries::top_rated()).await?)
    };
    cached(&state, "getTopGames", fetch).await
}

async fn get_top_new_games(State(state): State<AppState>) -> Response {
    let threshold = queries::new_release_threshold(now_unix());
    let fetch = async {
        Ok::<_, anyhow::Error>(
            state
                .gateway
                .send("games", &queries::top_new(threshold))
                .await?,
        )
    };
    cached(&state, "getTopNewGames", fetch).await
}

#[derive(Deserialize)]
struct SearchRequest {
    #[serde(rename = "searchTerm")]
    search_term: Option<String>,
    #[serde(rename = "searchOffset", default)]
    search_offset: u32,
}

/// Search is parameterized by user input with unbounded cardinality, so it
/// is never cached.
async fn get_games_by_name(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> Response {
    const ROUTE: &str = "getGamesByName";

    let Some(term) = request.search_term else {
        return json_error(&state, ROUTE, "Missing searchTerm");
    };

    let query = queries::search_by_name(&term, request.search_offset);
    match state.gateway.send("games", &query).await {
        Ok(body) => json_body(ROUTE, body),
        Err(e) => json_error(&state, ROUTE, e),
    }
}

#[derive(Deserialize)]
struct GameByIdRequest {
    #[serde(rename = "gameID")]
    game_id: Option<u64>,
}

async fn get_game_by_id(
    State(state): State<AppState>,
    Json(request): Json<GameByIdRequest>,
) -> Response {
    const ROUTE: &str = "getGameById";

    let Some(game_id) = request.game_id else {
        return json_error(&state, ROUTE, "Missing gameID");
    };

    match fetch_game_detail(&state, game_id).await {
        Ok(body) => json_body(ROUTE, body),
        Err(e) => json_error(&state, ROUTE, e),
    }
}

/// The detail payload is the one place the service reshapes an upstream
/// body: the client only displays developer companies.
async fn fetch_game_detail(state: &AppState, game_id: u64) -> anyhow::Result<Bytes> {
    let body = state
        .gateway
        .send("games", &queries::game_by_id(game_id))
        .await?;
    let mut games: Vec<serde_json::Value> =
        serde_json::from_slice(&body).context("unexpected games payload")?;

    if games.is_empty() {
        anyhow::bail!("Game not found");
    }
    let mut game = games.swap_remove(0);

    if let Some(companies) = game
        .get_mut("involved_companies")
        .and_then(|v| v.as_array_mut())
    {
        companies.retain(|c| c.get("developer").and_then(|d| d.as_bool()).unwrap_or(false));
    }

    Ok(Bytes::from(serde_json::to_vec(&game)?))
}

async fn upload_avatar_by_uid(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    multipart: Multipart,
) -> Response {
    const ROUTE: &str = "uploadAvatarByUID";

    if caller.anonymous {
        state.metrics.errors_total.fetch_add(1, Ordering::Relaxed);
        record_route(ROUTE, "unauthorized");
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({
                "error": "Custom avatar is only accessible for email verified accounts."
            })),
        )
            .into_response();
    }

    match store_avatar(&state, &caller.uid, multipart).await {
        Ok(url) => {
            record_route(ROUTE, "ok");
            Json(json!({ "url": url })).into_response()
        }
        Err(e) => {
            state.metrics.errors_total.fetch_add(1, Ordering::Relaxed);
            record_route(ROUTE, "error");
            warn!(route = ROUTE, error = %e, "avatar upload failed");
            let status = match e {
                UploadError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
                _ => StatusCode::BAD_REQUEST,
            };
            (status, Json(json!({ "error": e.to_string() }))).into_response()
        }
    }
}

/// Pull the file part out of the form, validate it, and hand it to the
/// avatar store.
async fn store_avatar(
    state: &AppState,
    uid: &str,
    mut multipart: Multipart,
) -> Result<String, UploadError> {
    let mut data: Option<Bytes> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| UploadError::MissingFile)?
    {
        if field.file_name().is_some() {
            data = Some(field.bytes().await.map_err(|_| UploadError::MissingFile)?);
        }
    }

    let bytes = data.ok_or(UploadError::MissingFile)?;
    let content_type = avatar::validate(&bytes)?;
    state.avatars.store(uid, bytes, content_type).await
}

/// Health endpoint: process status plus uptime and request counters.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "uptime_seconds": state.metrics.started_at.elapsed().as_secs(),
        "requests_served": state.metrics.requests_total.load(Ordering::Relaxed),
        "errors_total": state.metrics.errors_total.load(Ordering::Relaxed),
    }))
}

/// Prometheus metrics endpoint, in text exposition format.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(
            header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.prometheus.render(),
    )
}

fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
