//! HTTP server: event ingestion and analytics endpoints
//!
//! ```text
//! POST /api/track ──→ resolve identity ──→ ingest() ──→ EventStore
//! GET  /analytics/* ──→ AnalyticsQuery ──→ JSON
//! ```
//!
//! SQLite work runs on the blocking pool; handlers share no in-memory state
//! beyond connection pools.

pub mod api;
mod helpers;
mod state;

pub use state::AppState;

use anyhow::Context;
use axum::routing::{get, post};
use axum::Router;
use std::future::Future;
use std::net::SocketAddr;
use tokio::net::TcpListener;

/// Build the application router
pub fn router(state: AppState) -> Router {
    Router::new()
        // Ingestion
        .route("/api/track", post(api::track_event))
        .route("/api/health", get(api::health))
        // Aggregation views
        .route("/analytics/summary", get(api::summary))
        .route("/analytics/tools", get(api::tools))
        .route("/analytics/retention", get(api::retention))
        .route("/analytics/errors", get(api::errors))
        .with_state(state)
}

/// Bind and serve until `shutdown` resolves
pub async fn start_server(
    bind_addr: SocketAddr,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let app = router(state);

    let listener = TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;

    tracing::info!("skilltrace listening on {}", bind_addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
    .context("Server error")?;

    tracing::info!("Server shut down gracefully");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashing::{hash_identifier, ANONYMOUS_IDENTITY};
    use crate::ingest::IngestOptions;
    use crate::store::{temp_store, EventStore};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn app(store: &EventStore) -> Router {
        router(AppState::new(store.clone(), IngestOptions::default()))
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn post_track(body: Value, session: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/api/track")
            .header("content-type", "application/json");
        if let Some(session) = session {
            builder = builder.header("x-session-id", session);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    // ─────────────────────────────────────────────────────────────────────
    // POST /api/track
    // ─────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_track_success_stores_hashed_session() {
        let (_dir, store) = temp_store();

        let (status, body) = send(
            app(&store),
            post_track(
                json!({"tool_name": "search", "status": "success", "duration_ms": 40}),
                Some("sess-1"),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert!(body["message"].is_string());

        let id = body["id"].as_i64().unwrap();
        let stored = store.get(id).unwrap().unwrap();
        assert_eq!(stored.user_id_hash, hash_identifier("sess-1"));
        assert_eq!(stored.tool_category, "default");
    }

    #[tokio::test]
    async fn test_track_uses_authorization_when_no_session() {
        let (_dir, store) = temp_store();
        let request = Request::builder()
            .method("POST")
            .uri("/api/track")
            .header("content-type", "application/json")
            .header("authorization", "Bearer token-9")
            .body(Body::from(
                json!({"tool_name": "search", "status": "success"}).to_string(),
            ))
            .unwrap();

        let (status, body) = send(app(&store), request).await;
        assert_eq!(status, StatusCode::OK);

        let stored = store.get(body["id"].as_i64().unwrap()).unwrap().unwrap();
        assert_eq!(stored.user_id_hash, hash_identifier("Bearer token-9"));
    }

    #[tokio::test]
    async fn test_track_without_identity_is_anonymous() {
        let (_dir, store) = temp_store();
        let (_, body) = send(
            app(&store),
            post_track(json!({"tool_name": "search", "status": "timeout"}), None),
        )
        .await;

        let stored = store.get(body["id"].as_i64().unwrap()).unwrap().unwrap();
        assert_eq!(stored.user_id_hash, hash_identifier(ANONYMOUS_IDENTITY));
    }

    #[tokio::test]
    async fn test_track_missing_tool_name_is_400() {
        let (_dir, store) = temp_store();
        let (status, body) = send(
            app(&store),
            post_track(json!({"status": "success"}), Some("s")),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().unwrap().contains("tool_name"));
        assert_eq!(store.count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_track_invalid_status_is_400() {
        let (_dir, store) = temp_store();
        let (status, body) = send(
            app(&store),
            post_track(json!({"tool_name": "search", "status": "done"}), Some("s")),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("done"));
    }

    #[tokio::test]
    async fn test_track_malformed_json_is_400_with_error_body() {
        let (_dir, store) = temp_store();
        let request = Request::builder()
            .method("POST")
            .uri("/api/track")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();

        let (status, body) = send(app(&store), request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_track_persistence_failure_is_500() {
        let (_dir, store) = temp_store();
        rusqlite::Connection::open(store.path())
            .unwrap()
            .execute_batch("DROP TABLE usage_events;")
            .unwrap();

        let (status, body) = send(
            app(&store),
            post_track(json!({"tool_name": "search", "status": "success"}), Some("s")),
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["success"], false);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_duplicate_posts_are_both_stored() {
        let (_dir, store) = temp_store();
        let event = json!({"tool_name": "search", "status": "success", "duration_ms": 5});

        for _ in 0..2 {
            let (status, _) = send(app(&store), post_track(event.clone(), Some("s"))).await;
            assert_eq!(status, StatusCode::OK);
        }
        assert_eq!(store.count().unwrap(), 2);
    }

    // ─────────────────────────────────────────────────────────────────────
    // Analytics
    // ─────────────────────────────────────────────────────────────────────

    async fn seed(store: &EventStore) {
        let events = [
            (json!({"tool_name": "search", "status": "success", "duration_ms": 100}), "a"),
            (json!({"tool_name": "search", "status": "success", "duration_ms": 300}), "b"),
            (
                json!({"tool_name": "fetch", "status": "error", "duration_ms": 50,
                       "error_type": "Timeout", "error_message": "upstream slow"}),
                "a",
            ),
        ];
        for (event, session) in events {
            let (status, _) = send(app(store), post_track(event, Some(session))).await;
            assert_eq!(status, StatusCode::OK);
        }
    }

    #[tokio::test]
    async fn test_summary_endpoint() {
        let (_dir, store) = temp_store();
        seed(&store).await;

        let (status, body) = send(app(&store), get("/analytics/summary")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["period_days"], 30);
        assert_eq!(body["total_invocations"], 3);
        assert_eq!(body["unique_users"], 2);
        assert_eq!(body["avg_duration_ms"], 150);
        assert_eq!(body["success_rate"], "66.67");
        assert_eq!(body["error_rate"], "33.33");
    }

    #[tokio::test]
    async fn test_summary_empty_store_reports_zero_rates() {
        let (_dir, store) = temp_store();
        let (status, body) = send(app(&store), get("/analytics/summary?days=7")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total_invocations"], 0);
        assert_eq!(body["success_rate"], "0.00");
        assert_eq!(body["error_rate"], "0.00");
    }

    #[tokio::test]
    async fn test_days_parameter_is_clamped() {
        let (_dir, store) = temp_store();

        let (_, body) = send(app(&store), get("/analytics/summary?days=0")).await;
        assert_eq!(body["period_days"], 1);

        let (_, body) = send(app(&store), get("/analytics/retention?days=9999")).await;
        assert_eq!(body["period_days"], 365);
    }

    #[tokio::test]
    async fn test_non_numeric_days_is_400() {
        let (_dir, store) = temp_store();
        let (status, body) = send(app(&store), get("/analytics/tools?days=lots")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_tools_endpoint_orders_by_invocations() {
        let (_dir, store) = temp_store();
        seed(&store).await;

        let (status, body) = send(app(&store), get("/analytics/tools?days=7")).await;
        assert_eq!(status, StatusCode::OK);

        let tools = body.as_array().unwrap();
        assert_eq!(tools.len(), 2);
        assert_eq!(tools[0]["tool_name"], "search");
        assert_eq!(tools[0]["invocations"], 2);
        assert_eq!(tools[1]["tool_name"], "fetch");
        assert_eq!(tools[1]["error_rate"], "100.00");
    }

    #[tokio::test]
    async fn test_retention_endpoint() {
        let (_dir, store) = temp_store();
        seed(&store).await;

        let (status, body) = send(app(&store), get("/analytics/retention")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["weekly_active_users"], 2);

        let daily = body["daily_active_users"].as_array().unwrap();
        assert_eq!(daily.len(), 1);
        assert_eq!(daily[0]["users"], 2);
    }

    #[tokio::test]
    async fn test_errors_endpoint() {
        let (_dir, store) = temp_store();
        seed(&store).await;

        let (status, body) = send(app(&store), get("/analytics/errors")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 1);
        assert_eq!(body["errors"][0]["tool_name"], "fetch");
        assert_eq!(body["errors"][0]["error_message"], "upstream slow");

        let (_, body) = send(app(&store), get("/analytics/errors?limit=0")).await;
        assert_eq!(body["count"], 0);
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let (_dir, store) = temp_store();
        seed(&store).await;

        let (status, body) = send(app(&store), get("/api/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["events_stored"], 3);
    }

    #[tokio::test]
    async fn test_start_server_stops_on_shutdown() {
        let (_dir, store) = temp_store();
        let state = AppState::new(store, IngestOptions::default());
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();

        let result = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            start_server(addr, state, async {}),
        )
        .await;
        assert!(matches!(result, Ok(Ok(()))));
    }
}
