//! Backend HTTP API.
//!
//! Routes:
//!
//! | Route | Auth | Purpose |
//! |-------|------|---------|
//! | `GET /health` | no | liveness + Redis connectivity |
//! | `GET /metrics` | no | uptime and counters |
//! | `GET /config/{communityId}` | yes | configuration document (default if unset) |
//! | `POST /config` | yes | replace document, broadcast `config:update` |
//! | `POST /event` | yes | fold into stats, broadcast `stats:update` |
//! | `GET /stats/{communityId}` | yes | counters document (zeros if unset) |
//! | `POST /transcripts` | yes | store an HTML transcript |
//! | `GET /transcripts/{key}` | no | stored HTML verbatim, 404 page if absent |
//! | `GET /ws` | no | WebSocket upgrade for dashboard push |
//!
//! Authenticated routes compare the `x-api-key` header against the shared
//! secret; a mismatch is a bare 401. Browser WebSocket handshakes cannot set
//! custom headers, so `/ws` stays open; it only ever pushes identifiers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::{Path, Request, State},
    http::{header::CONTENT_TYPE, HeaderMap, Method, StatusCode},
    middleware::{self, Next},
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use deadpool_redis::redis::cmd;
use deadpool_redis::Pool;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use crate::document::AutomodConfig;
use crate::event::{IngestEvent, ModEventKind};
use crate::hub::{BroadcastHub, Notice};
use crate::store::{ConfigStore, StatsStore, StoreError, TranscriptStore};
use crate::API_KEY_HEADER;

/// Fallback body for missing transcripts.
const TRANSCRIPT_NOT_FOUND: &str =
    "<!doctype html><html><body><p>Transcript not found.</p></body></html>";

/// Application metrics
pub struct Metrics {
    events_ingested: AtomicU64,
    config_writes: AtomicU64,
    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            events_ingested: AtomicU64::new(0),
            config_writes: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    fn increment_events(&self) {
        self.events_ingested.fetch_add(1, Ordering::Relaxed);
    }

    fn increment_config_writes(&self) {
        self.config_writes.fetch_add(1, Ordering::Relaxed);
    }

    fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared handler state. Stores are trait objects so tests run on in-memory
/// implementations.
#[derive(Clone)]
pub struct AppState {
    pub config_store: Arc<dyn ConfigStore>,
    pub stats_store: Arc<dyn StatsStore>,
    pub transcripts: Arc<dyn TranscriptStore>,
    pub hub: BroadcastHub,
    pub api_key: String,
    pub metrics: Arc<Metrics>,
    /// Present in production; health reports "not configured" without it.
    pub redis: Option<Pool>,
}

/// API-level failures mapped onto status codes.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(reason) => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "success": false, "error": reason })),
            )
                .into_response(),
            // No body on auth failures.
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED.into_response(),
            ApiError::Store(e) => {
                error!(error = %e, "Storage failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "success": false, "error": "storage failure" })),
                )
                    .into_response()
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct Ack {
    success: bool,
}

impl Ack {
    fn ok() -> Json<Ack> {
        Json(Ack { success: true })
    }
}

/// Build the full application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(get_metrics))
        .route("/config/:community_id", get(get_config))
        .route("/config", post(put_config))
        .route("/event", post(ingest_event))
        .route("/stats/:community_id", get(get_stats))
        .route("/transcripts", post(put_transcript))
        .route("/transcripts/:key", get(get_transcript))
        .route("/ws", get(ws_upgrade))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            require_api_key,
        ))
        .with_state(state)
}

/// Paths that skip the shared-secret check.
fn is_public(method: &Method, path: &str) -> bool {
    matches!(path, "/health" | "/metrics" | "/ws")
        || (*method == Method::GET && path.starts_with("/transcripts/"))
}

async fn require_api_key(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if is_public(req.method(), req.uri().path()) {
        return Ok(next.run(req).await);
    }

    let provided = req
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok());

    match provided {
        Some(key) if key == state.api_key => Ok(next.run(req).await),
        Some(_) => {
            warn!("Invalid API key attempt");
            Err(ApiError::Unauthorized)
        }
        None => {
            warn!("Missing {} header", API_KEY_HEADER);
            Err(ApiError::Unauthorized)
        }
    }
}

async fn health_check(State(state): State<AppState>) -> Result<Json<Value>, StatusCode> {
    let Some(pool) = &state.redis else {
        return Ok(Json(json!({ "status": "ok", "redis": "not configured" })));
    };

    let mut conn = pool.get().await.map_err(|e| {
        error!("Failed to get Redis connection: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    let _: String = cmd("PING").query_async(&mut conn).await.map_err(|e| {
        error!("Redis PING failed: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    Ok(Json(json!({ "status": "ok", "redis": "connected" })))
}

/// Server metrics as JSON.
async fn get_metrics(State(state): State<AppState>) -> Json<Value> {
    let uptime = state.metrics.uptime_seconds();
    let subscribers = state.hub.subscriber_count().await;

    let uptime_str = if uptime < 60 {
        format!("{}s", uptime)
    } else if uptime < 3600 {
        format!("{}m {}s", uptime / 60, uptime % 60)
    } else {
        format!("{}h {}m {}s", uptime / 3600, (uptime % 3600) / 60, uptime % 60)
    };

    Json(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_seconds": uptime,
        "uptime": uptime_str,
        "events_ingested": state.metrics.events_ingested.load(Ordering::Relaxed),
        "config_writes": state.metrics.config_writes.load(Ordering::Relaxed),
        "subscribers": subscribers,
        "status": "running"
    }))
}

/// `GET /config/{communityId}`: never 404s; unconfigured communities get
/// the default (fully disabled) document.
async fn get_config(
    State(state): State<AppState>,
    Path(community_id): Path<String>,
) -> Result<Json<AutomodConfig>, ApiError> {
    let config = state.config_store.read(&community_id).await?;
    Ok(Json(config))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigWrite {
    #[serde(alias = "guildId")]
    community_id: Option<String>,
    config: Option<AutomodConfig>,
}

/// `POST /config`: wholesale replace, last write wins, then broadcast.
async fn put_config(
    State(state): State<AppState>,
    Json(body): Json<ConfigWrite>,
) -> Result<Json<Ack>, ApiError> {
    let community_id = body
        .community_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::BadRequest("communityId is required".to_string()))?;
    let config = body
        .config
        .ok_or_else(|| ApiError::BadRequest("config is required".to_string()))?;

    state.config_store.write(&community_id, &config).await?;
    state.metrics.increment_config_writes();

    let delivered = state.hub.publish(&Notice::config_update(&community_id)).await;
    info!(
        community = %community_id,
        subscribers_notified = delivered,
        "Configuration replaced"
    );

    Ok(Ack::ok())
}

/// `POST /event`: fold one event into the community's counters.
///
/// The read-fold-write is not atomic; concurrent folds on one community can
/// lose an increment. Accepted: these stats are advisory.
async fn ingest_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<IngestEvent>,
) -> Result<Json<Ack>, ApiError> {
    let event = body
        .classify()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let correlation_id = headers
        .get("X-Correlation-ID")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let mut stats = state.stats_store.read(&event.community_id).await?;
    stats.fold(&event);
    state.stats_store.write(&event.community_id, &stats).await?;
    state.metrics.increment_events();

    state
        .hub
        .publish(&Notice::stats_update(&event.community_id))
        .await;
    if let ModEventKind::Ticket(action) = &event.kind {
        state
            .hub
            .publish(&Notice::ticket_event(&event.community_id, *action))
            .await;
    }

    info!(
        community = %event.community_id,
        kind = ?event.kind,
        correlation_id = %correlation_id,
        "Event folded"
    );

    Ok(Ack::ok())
}

/// `GET /stats/{communityId}`: zero-valued document when nothing was ever
/// reported.
async fn get_stats(
    State(state): State<AppState>,
    Path(community_id): Path<String>,
) -> Result<Json<crate::stats::StatsDocument>, ApiError> {
    let stats = state.stats_store.read(&community_id).await?;
    Ok(Json(stats))
}

#[derive(Debug, Deserialize)]
struct TranscriptWrite {
    key: Option<String>,
    html: Option<String>,
}

async fn put_transcript(
    State(state): State<AppState>,
    Json(body): Json<TranscriptWrite>,
) -> Result<Json<Ack>, ApiError> {
    let key = body
        .key
        .filter(|k| !k.is_empty())
        .ok_or_else(|| ApiError::BadRequest("key is required".to_string()))?;
    let html = body
        .html
        .ok_or_else(|| ApiError::BadRequest("html is required".to_string()))?;

    state.transcripts.put(&key, &html).await?;
    Ok(Ack::ok())
}

/// The one non-JSON route: stored HTML verbatim.
async fn get_transcript(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Response, ApiError> {
    match state.transcripts.get(&key).await? {
        Some(html) => Ok(([(CONTENT_TYPE, "text/html")], html).into_response()),
        None => Ok((StatusCode::NOT_FOUND, Html(TRANSCRIPT_NOT_FOUND)).into_response()),
    }
}

/// `GET /ws`: dashboard push channel. Receive-only from the client's side;
/// anything the client sends is drained and ignored.
async fn ws_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_socket(state, socket))
}

async fn handle_socket(state: AppState, socket: WebSocket) {
    let (id, mut notices) = state.hub.subscribe().await;
    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            notice = notices.recv() => {
                match notice {
                    Some(payload) => {
                        if sender.send(Message::Text(payload)).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(other)) => {
                        debug!(subscriber = %id, message = ?other, "Ignoring client message");
                    }
                }
            }
        }
    }

    state.hub.unsubscribe(id).await;
}
