//! API route definitions
//!
//! - /health - process liveness (root level, no envelope)
//! - /api/v1/status, /api/v1/modules/:name - fleet and module status
//! - /api/v1/sync, /api/v1/sync/ack, /api/v1/sync/force - synchronization
//! - /api/v1/modules/:name/isolate, /api/v1/modules/:name/recover - admin
//! - /api/v1/alerts, /api/v1/metrics - derived alerts and counters

use axum::{
    routing::{get, post},
    Router,
};

use super::handlers::{self, ApiState};

/// Create all `/api/v1` routes
pub fn api_routes(state: ApiState) -> Router {
    Router::new()
        .route("/status", get(handlers::get_status))
        .route("/modules/:name", get(handlers::get_module))
        .route("/modules/:name/isolate", post(handlers::isolate_module))
        .route("/modules/:name/recover", post(handlers::recover_module))
        .route("/sync", get(handlers::get_sync))
        .route("/sync/ack", post(handlers::acknowledge_sync))
        .route("/sync/force", post(handlers::force_sync))
        .route("/alerts", get(handlers::get_alerts))
        .route("/metrics", get(handlers::get_metrics))
        .with_state(state)
}

/// Liveness endpoint at root level
pub fn liveness_routes(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(handlers::liveness))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::handlers::test_support::create_test_state;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use tower::ServiceExt;

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_api_routes_status() {
        let state = create_test_state();
        state.store.initialize_module("cortex", true);
        let app = api_routes(state);

        let response = app
            .oneshot(Request::builder().uri("/status").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let v = json_body(response).await;
        assert_eq!(v["data"]["modules"][0]["name"], "cortex");
        assert_eq!(v["data"]["modules"][0]["state"], "unknown");
        assert_eq!(v["data"]["modules"][0]["sync_status"], "out_of_sync");
    }

    #[tokio::test]
    async fn test_unknown_module_is_404() {
        let app = api_routes(create_test_state());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/modules/ghost")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_sync_ack_reports_alignment() {
        let state = create_test_state();
        state.store.initialize_module("cortex", true);
        for _ in 0..10 {
            state.store.record_sync_pulse(1, 1, false, 0);
        }
        let app = api_routes(state.clone());

        let response = app
            .clone()
            .oneshot(post_json(
                "/sync/ack",
                r#"{"module_name":"cortex","cycle_number":8,"timestamp":"2026-01-01T00:00:00Z"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let v = json_body(response).await;
        assert_eq!(v["data"]["aligned"], true);
        assert_eq!(v["data"]["master_cycle"], 10);
        assert_eq!(v["data"]["drift"], 2);

        let response = app
            .oneshot(post_json(
                "/sync/ack",
                r#"{"module_name":"cortex","cycle_number":1}"#,
            ))
            .await
            .unwrap();
        let v = json_body(response).await;
        assert_eq!(v["data"]["aligned"], false);
        assert_eq!(v["data"]["drift"], 9);
        assert_eq!(state.store.module("cortex").unwrap().cycle_number, 1);
    }

    #[tokio::test]
    async fn test_sync_ack_unknown_module_and_bad_body() {
        let app = api_routes(create_test_state());

        let response = app
            .clone()
            .oneshot(post_json(
                "/sync/ack",
                r#"{"module_name":"ghost","cycle_number":1}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app
            .oneshot(post_json("/sync/ack", r#"{"cycle_number":"soon"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let v = json_body(response).await;
        assert_eq!(v["error"]["code"], "BAD_REQUEST");
    }

    #[tokio::test]
    async fn test_force_sync_with_and_without_body() {
        let state = create_test_state();
        state.store.initialize_module("a", false);
        state.store.record_sync_pulse(0, 1, false, 0);
        let app = api_routes(state.clone());

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/sync/force")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let v = json_body(response).await;
        assert_eq!(v["data"]["target_cycle"], 1);

        let response = app
            .oneshot(post_json("/sync/force", r#"{"target_cycle":42}"#))
            .await
            .unwrap();
        let v = json_body(response).await;
        assert_eq!(v["data"]["target_cycle"], 42);
        assert_eq!(state.store.module("a").unwrap().cycle_number, 42);
        assert_eq!(state.store.current_drift_level(), 0);
    }

    #[tokio::test]
    async fn test_isolate_then_recover() {
        let state = create_test_state();
        state.store.initialize_module("limbic", false);
        let app = api_routes(state.clone());

        let response = app
            .clone()
            .oneshot(post_json(
                "/modules/limbic/isolate",
                r#"{"reason":"operator request"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let status = state.store.module("limbic").unwrap();
        assert_eq!(status.last_error.as_deref(), Some("operator request"));

        let response = app
            .clone()
            .oneshot(post_json("/modules/limbic/recover", ""))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let v = json_body(response).await;
        assert_eq!(v["data"]["state"], "recovering");

        // Recovering is not a recoverable state.
        let response = app
            .oneshot(post_json("/modules/limbic/recover", ""))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_alerts_and_metrics() {
        let state = create_test_state();
        state.store.initialize_module("flaky", true);
        for _ in 0..3 {
            state.store.record_failure("flaky", "HTTP 500");
        }
        let app = api_routes(state);

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/alerts").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let v = json_body(response).await;
        assert_eq!(v["data"]["count"], 1);
        assert_eq!(v["data"]["alerts"][0]["kind"], "module_isolated");
        assert_eq!(v["data"]["alerts"][0]["severity"], "critical");

        let response = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let v = json_body(response).await;
        assert_eq!(v["data"]["failures_detected"], 3);
        assert_eq!(v["data"]["module_count"], 1);
    }

    #[tokio::test]
    async fn test_liveness_route() {
        let app = liveness_routes(create_test_state());

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let v = json_body(response).await;
        assert_eq!(v["current_cycle"], 0);
        assert_eq!(v["last_heartbeat"], "");
    }
}
