//! REST API module using Axum
//!
//! Exposes the synchronizer's state to operators and to the monitored
//! modules themselves:
//! - `/health` liveness at the root
//! - `/api/v1` status, sync acknowledgments, admin actions and alerts,
//!   all wrapped in the `{data, meta}` envelope

pub mod envelope;
pub mod handlers;
mod routes;

pub use handlers::ApiState;

use axum::http::{header, Method, Uri};
use axum::response::Response;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use envelope::ApiErrorResponse;

/// Comma-separated list of origins allowed to call the API cross-origin.
pub const CORS_ORIGINS_ENV: &str = "CANS_CORS_ORIGINS";

async fn not_found(uri: Uri) -> Response {
    ApiErrorResponse::not_found(format!("No route for {}", uri.path()))
}

/// Build a CORS layer that is restrictive by default (same-origin only).
fn build_cors_layer() -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    match std::env::var(CORS_ORIGINS_ENV) {
        Ok(origins) => {
            let allowed: Vec<_> = origins
                .split(',')
                .filter_map(|o| o.trim().parse().ok())
                .collect();
            tracing::info!(origins = %origins, "CORS: allowing configured origins");
            base.allow_origin(allowed)
        }
        Err(_) => base,
    }
}

/// Create the complete application router.
pub fn create_app(state: ApiState) -> Router {
    Router::new()
        .nest("/api/v1", routes::api_routes(state.clone()))
        .merge(routes::liveness_routes(state))
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .layer(build_cors_layer())
}
