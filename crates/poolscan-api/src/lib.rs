//! poolscan-api — read-only HTTP surface over the mirror.
//!
//! Four routes, all GET:
//! - `/prices` — share-price history, ascending by block
//! - `/referrals` — payout totals per referrer (`?referrer=0x…` filters)
//! - `/games` — most recent games, fixed page size (`?kind=dice` filters)
//! - `/metrics` — plain-text counter/gauge listing
//!
//! Reads go straight to the storage backend. A storage failure maps to
//! HTTP 500 with the error message; the scanner is unaffected.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::info;

use poolscan_core::{GameKind, ScanError, ScannerMetrics};
use poolscan_storage::{GameRow, MirrorReader, PricePoint, ReferralTotal};

/// Shared state for all handlers.
#[derive(Clone)]
pub struct ApiState {
    pub reader: Arc<dyn MirrorReader>,
    pub metrics: Arc<ScannerMetrics>,
}

/// Build the application router with permissive CORS.
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/prices", get(prices))
        .route("/referrals", get(referrals))
        .route("/games", get(games))
        .route("/metrics", get(metrics))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

/// Bind and serve the API until the process exits.
pub async fn serve(state: ApiState, port: u16) -> Result<(), ScanError> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| ScanError::Storage(format!("failed to bind {addr}: {e}")))?;
    info!(%addr, "API listening");
    axum::serve(listener, router(state))
        .await
        .map_err(|e| ScanError::Storage(format!("API server failed: {e}")))
}

// ─── Handlers ────────────────────────────────────────────────────────────────

/// Uniform list envelope.
#[derive(Debug, Serialize)]
struct DataEnvelope<T> {
    data: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct ReferralsQuery {
    referrer: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GamesQuery {
    kind: Option<GameKind>,
}

async fn prices(State(state): State<ApiState>) -> Result<Json<DataEnvelope<PricePoint>>, ApiError> {
    let data = state.reader.price_history().await?;
    Ok(Json(DataEnvelope { data }))
}

async fn referrals(
    State(state): State<ApiState>,
    Query(query): Query<ReferralsQuery>,
) -> Result<Json<DataEnvelope<ReferralTotal>>, ApiError> {
    let data = state.reader.referral_totals(query.referrer.as_deref()).await?;
    Ok(Json(DataEnvelope { data }))
}

async fn games(
    State(state): State<ApiState>,
    Query(query): Query<GamesQuery>,
) -> Result<Json<DataEnvelope<GameRow>>, ApiError> {
    let data = state.reader.recent_games(query.kind).await?;
    Ok(Json(DataEnvelope { data }))
}

async fn metrics(State(state): State<ApiState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        state.metrics.render_text(),
    )
}

// ─── Error mapping ───────────────────────────────────────────────────────────

/// A failed read, reported to the client as HTTP 500.
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct ApiError(#[from] ScanError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({ "error": self.0.to_string() }));
        (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
