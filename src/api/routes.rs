//! Route wiring: maps URLs to handlers and applies the auth/CORS layers.

use crate::api::auth::verify_token;
use crate::api::handlers::{self, AppState};
use crate::api::ApiConfig;
use axum::extract::State;
use axum::http::{header, Method, Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};

/// Build the full router: public auth/health routes plus the pool
/// routes, the latter optionally gated by a bearer-token layer.
pub fn create_router(config: &ApiConfig, state: AppState) -> Router {
    let mut pool_routes = Router::new()
        .route("/proxies", get(handlers::list_proxies))
        .route("/proxies/stats", get(handlers::proxy_stats))
        .route("/allocate", get(handlers::allocate));

    if config.enable_auth {
        pool_routes = pool_routes.layer(middleware::from_fn_with_state(
            state.clone(),
            require_bearer_token,
        ));
    }

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/auth/register", post(handlers::register))
        .route("/auth/login", post(handlers::login))
        .merge(pool_routes)
        .layer(cors_layer(config))
        .with_state(state)
}

fn cors_layer(config: &ApiConfig) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    if config.cors_origins.iter().any(|o| o == "*") {
        layer.allow_origin(Any)
    } else {
        let origins: Vec<_> = config
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        layer.allow_origin(origins)
    }
}

/// Validates the `Authorization: Bearer <token>` header before letting
/// the request through to the pool handlers.
async fn require_bearer_token(
    State(_state): State<AppState>,
    request: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "));

    match token.and_then(|t| verify_token(t).ok()) {
        Some(_) => Ok(next.run(request).await),
        None => Err(StatusCode::UNAUTHORIZED),
    }
}
