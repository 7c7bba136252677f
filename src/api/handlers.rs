//! API Handlers - thin delegation to `Pool`/`Store`/`auth`, no business
//! logic of its own.

use crate::api::auth::{self, Credentials};
use crate::api::ApiResponse;
use crate::pool::PoolHandle;
use crate::store::StoreAdapter;
use crate::utils::error::ProxyError;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;
use std::sync::Arc;

/// Shared handler state, cloned cheaply into every request.
#[derive(Clone)]
pub struct AppState {
    pub pool: Arc<dyn PoolHandle>,
    pub store: Arc<dyn StoreAdapter>,
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = match &self {
            ProxyError::NoAliveProxies => StatusCode::SERVICE_UNAVAILABLE,
            ProxyError::UserConflict => StatusCode::CONFLICT,
            ProxyError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            ProxyError::Config(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(ApiResponse::<()>::error(self.to_string()))).into_response()
    }
}

/// `GET /health`
pub async fn health_check() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// `GET /proxies` — alive entries only, `{url, alive, last_test}`.
pub async fn list_proxies(
    State(state): State<AppState>,
) -> Json<ApiResponse<Vec<crate::proxy::ProxySnapshot>>> {
    let snapshots = state.pool.alive_proxies().iter().map(|e| e.snapshot()).collect();
    Json(ApiResponse::success(snapshots))
}

/// `GET /proxies/stats` — full stats for every entry, alive or not.
pub async fn proxy_stats(
    State(state): State<AppState>,
) -> Json<ApiResponse<Vec<crate::proxy::ProxyStats>>> {
    Json(ApiResponse::success(state.pool.snapshots()))
}

/// `GET /allocate` — `{"allocated": "<url>"}` or 503 on exhaustion.
pub async fn allocate(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ProxyError> {
    let handle = state.pool.allocate()?;
    Ok(Json(json!({ "allocated": handle.url() })))
}

/// `POST /auth/register` — 201 on success, 409 on username conflict.
pub async fn register(
    State(state): State<AppState>,
    Json(credentials): Json<Credentials>,
) -> Result<StatusCode, ProxyError> {
    auth::register(state.store.as_ref(), &credentials).await?;
    Ok(StatusCode::CREATED)
}

/// `POST /auth/login` — `{token}` on success, 401 on bad credentials.
pub async fn login(
    State(state): State<AppState>,
    Json(credentials): Json<Credentials>,
) -> Result<Json<auth::TokenResponse>, ProxyError> {
    let token = auth::login(state.store.as_ref(), &credentials).await?;
    Ok(Json(token))
}
