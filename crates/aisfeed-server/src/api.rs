use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::get,
    Json, Router,
};
use futures_util::{future, stream, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::error;

use aisfeed::query::{self, DEFAULT_HISTORY_LIMIT, DEFAULT_LATEST_LIMIT, DEFAULT_VESSELS_LIMIT};
use aisfeed::{ConnectionState, PositionRow, QueryError, VesselSummary};

use crate::shutdown::shutdown_requested;
use crate::AppState;

/// Buffered messages returned by `GET /api/ais/latest`
const LATEST_MESSAGES: usize = 50;

/// Buffered messages replayed to a new event-stream subscriber
const SSE_BACKFILL: usize = 10;

const SSE_KEEPALIVE: Duration = Duration::from_secs(15);

/// Build the axum router
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/ais/latest", get(latest_messages))
        .route("/api/ais/events", get(events))
        .route("/api/ais/vessels", get(vessels))
        // static segment must not be shadowed by :mmsi
        .route("/api/ais/positions/latest", get(latest_positions))
        .route("/api/ais/positions/:mmsi", get(vessel_history))
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Query validation failures become 400; storage failures are logged and
/// surface as a bare 500.
pub struct ApiError(QueryError);

impl From<QueryError> for ApiError {
    fn from(e: QueryError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.0.is_client_error() {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({"error": self.0.to_string()})),
            )
                .into_response();
        }
        error!(error = %self.0, "position query failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({"error": "internal error"})),
        )
            .into_response()
    }
}

/// `?limit=N`, kept as text so non-integers are rejected rather than
/// failing extraction with a different error shape.
#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<String>,
}

impl LimitQuery {
    fn resolve(&self, default: i64) -> Result<i64, QueryError> {
        query::parse_limit(self.limit.as_deref(), default)
    }
}

/// GET /api/ais/latest
async fn latest_messages(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let messages = state.broadcaster.latest(LATEST_MESSAGES);
    Json(serde_json::json!({
        "count": messages.len(),
        "messages": messages,
    }))
}

/// GET /api/ais/events
///
/// A comment line on connect, up to `SSE_BACKFILL` buffered messages, then
/// live messages. The subscriber is removed when the client goes away.
async fn events(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let subscription = state.broadcaster.subscribe(SSE_BACKFILL);
    let opened = stream::once(future::ready(Ok(Event::default().comment("connected"))));
    let live = subscription
        .map(|msg| Ok(Event::default().data(msg.to_json())))
        .take_until(shutdown_requested(state.shutdown.clone()));

    Sse::new(opened.chain(live)).keep_alive(
        KeepAlive::new()
            .interval(SSE_KEEPALIVE)
            .text("keep-alive"),
    )
}

/// GET /api/ais/vessels
async fn vessels(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LimitQuery>,
) -> Result<Json<Vec<VesselSummary>>, ApiError> {
    let limit = params.resolve(DEFAULT_VESSELS_LIMIT)?;
    Ok(Json(state.queries.known_vessels(limit).await?))
}

/// GET /api/ais/positions/latest
async fn latest_positions(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LimitQuery>,
) -> Result<Json<Vec<PositionRow>>, ApiError> {
    let limit = params.resolve(DEFAULT_LATEST_LIMIT)?;
    Ok(Json(state.queries.latest_per_vessel(limit).await?))
}

/// GET /api/ais/positions/:mmsi
async fn vessel_history(
    State(state): State<Arc<AppState>>,
    Path(mmsi): Path<String>,
    Query(params): Query<LimitQuery>,
) -> Result<Json<Vec<PositionRow>>, ApiError> {
    let limit = params.resolve(DEFAULT_HISTORY_LIMIT)?;
    Ok(Json(state.queries.history_for_vessel(&mmsi, limit).await?))
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub upstream: ConnectionState,
    pub feed_enabled: bool,
    pub buffered: usize,
    pub subscribers: usize,
}

fn health_response(state: &AppState, status: &'static str) -> HealthResponse {
    HealthResponse {
        status,
        upstream: *state.connection.borrow(),
        feed_enabled: state.feed_enabled,
        buffered: state.broadcaster.buffer_len(),
        subscribers: state.broadcaster.subscriber_count(),
    }
}

/// Health endpoint - always returns 200 if server is running
async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(health_response(&state, "ok"))
}

/// Ready endpoint - returns 200 only while subscribed upstream
async fn ready(State(state): State<Arc<AppState>>) -> (StatusCode, Json<HealthResponse>) {
    if *state.connection.borrow() == ConnectionState::Subscribed {
        (StatusCode::OK, Json(health_response(&state, "ready")))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(health_response(&state, "not_ready")),
        )
    }
}

async fn metrics() -> Response {
    match aisfeed::metrics::encode() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aisfeed::{Broadcaster, FeedMessage, MemoryPositionStore, PositionQueryService, PositionStore, VesselPosition};
    use axum::body::Body;
    use axum::http::Request;
    use chrono::Utc;
    use tokio::sync::watch;
    use tower::ServiceExt;

    struct Harness {
        state: Arc<AppState>,
        store: Arc<MemoryPositionStore>,
        connection: watch::Sender<ConnectionState>,
        _shutdown: watch::Sender<bool>,
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryPositionStore::new());
        let (connection_tx, connection_rx) = watch::channel(ConnectionState::Disconnected);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let state = Arc::new(AppState {
            broadcaster: Arc::new(Broadcaster::new(200)),
            queries: PositionQueryService::new(store.clone()),
            connection: connection_rx,
            feed_enabled: true,
            shutdown: shutdown_rx,
        });
        Harness {
            state,
            store,
            connection: connection_tx,
            _shutdown: shutdown_tx,
        }
    }

    async fn get(state: &Arc<AppState>, uri: &str) -> Response {
        router(state.clone())
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn position(mmsi: i64, sog: f64) -> VesselPosition {
        VesselPosition {
            mmsi,
            ship_name: Some("TEST".into()),
            sog: Some(sog),
            cog: None,
            heading: None,
            nav_status: None,
            lat: 10.0,
            lon: 20.0,
            time_utc: Utc::now(),
            raw: serde_json::Value::Null,
        }
    }

    #[tokio::test]
    async fn test_latest_returns_last_fifty() {
        let h = harness();
        for i in 0..60 {
            h.state
                .broadcaster
                .publish(FeedMessage::from_value(serde_json::json!({ "seq": i })));
        }

        let response = get(&h.state, "/api/ais/latest").await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["count"], 50);
        assert_eq!(body["messages"][0]["seq"], 10);
        assert_eq!(body["messages"][49]["seq"], 59);
    }

    #[tokio::test]
    async fn test_history_by_mmsi() {
        let h = harness();
        h.store.insert(&position(123456789, 5.2)).await.unwrap();

        let response = get(&h.state, "/api/ais/positions/123456789?limit=1").await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body.as_array().unwrap().len(), 1);
        assert_eq!(body[0]["mmsi"], 123456789);
        assert_eq!(body[0]["sog"], 5.2);
        assert_eq!(body[0]["lat"], 10.0);
        assert!(body[0].get("raw").is_none());
    }

    #[tokio::test]
    async fn test_history_rejects_bad_mmsi() {
        let h = harness();
        let response = get(&h.state, "/api/ais/positions/12a").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert!(body["error"].as_str().unwrap().contains("mmsi"));
    }

    #[tokio::test]
    async fn test_limit_out_of_range_rejected() {
        let h = harness();
        for uri in [
            "/api/ais/positions/latest?limit=100000",
            "/api/ais/vessels?limit=0",
            "/api/ais/vessels?limit=abc",
            "/api/ais/positions/123456789?limit=5001",
        ] {
            let response = get(&h.state, uri).await;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", uri);
        }
    }

    #[tokio::test]
    async fn test_latest_positions_not_shadowed_by_mmsi_route() {
        let h = harness();
        h.store.insert(&position(200000000, 1.0)).await.unwrap();
        h.store.insert(&position(200000000, 2.0)).await.unwrap();
        h.store.insert(&position(300000000, 3.0)).await.unwrap();

        let response = get(&h.state, "/api/ais/positions/latest?limit=10").await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_vessels_shape() {
        let h = harness();
        h.store.insert(&position(244660000, 1.0)).await.unwrap();

        let body = json_body(get(&h.state, "/api/ais/vessels").await).await;
        assert_eq!(body[0]["mmsi"], 244660000);
        assert_eq!(body[0]["ship_name"], "TEST");
        assert!(body[0]["time_utc"].is_string());
    }

    #[tokio::test]
    async fn test_events_backfill_then_live() {
        let h = harness();
        for i in 0..12 {
            h.state
                .broadcaster
                .publish(FeedMessage::from_value(serde_json::json!({ "seq": i })));
        }

        let response = get(&h.state, "/api/ais/events").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/event-stream"
        );
        assert_eq!(h.state.broadcaster.subscriber_count(), 1);

        h.state
            .broadcaster
            .publish(FeedMessage::from_value(serde_json::json!({ "seq": 12 })));

        let mut body = response.into_body().into_data_stream();
        let mut text = String::new();
        tokio::time::timeout(Duration::from_secs(5), async {
            while !text.contains(r#"{"seq":12}"#) {
                let chunk = body.next().await.unwrap().unwrap();
                text.push_str(&String::from_utf8_lossy(&chunk));
            }
        })
        .await
        .unwrap();

        assert!(text.starts_with(": connected\n\n"));
        assert!(!text.contains(r#"{"seq":1}"#));
        let events: Vec<&str> = text
            .lines()
            .filter_map(|l| l.strip_prefix("data: "))
            .collect();
        let expected: Vec<String> = (2..=12).map(|i| format!(r#"{{"seq":{}}}"#, i)).collect();
        assert_eq!(events, expected);

        drop(body);
        assert_eq!(h.state.broadcaster.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_ready_follows_connection_state() {
        let h = harness();
        assert_eq!(
            get(&h.state, "/ready").await.status(),
            StatusCode::SERVICE_UNAVAILABLE
        );

        h.connection.send(ConnectionState::Subscribed).unwrap();
        let response = get(&h.state, "/ready").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["upstream"], "subscribed");
    }

    #[tokio::test]
    async fn test_health_always_ok() {
        let h = harness();
        let response = get(&h.state, "/health").await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["upstream"], "disconnected");
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let h = harness();
        h.state.broadcaster.publish(FeedMessage::from_text("x"));
        let response = get(&h.state, "/metrics").await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}
