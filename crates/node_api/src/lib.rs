//! # Node API
//!
//! Management-console HTTP surface of a radar node.
//!
//! - `GET /api/ping` - unauthenticated discovery
//! - `GET /api/status` - identity, queue, sync and capture state
//! - `GET /api/detections` - recorded measurements, newest first
//!
//! Every route except `/api/ping` requires `Authorization: Bearer <token>`.

use std::sync::Arc;

use axum::extract::{Query, Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use contracts::{Measurement, NodeSettings, QueueStats, SyncStatus};
use local_queue::{QueueError, SharedQueue};
use serde::{Deserialize, Serialize};
use serde_json::json;
use timing_engine::{CaptureMetrics, CaptureSnapshot};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, error, info};

pub const DEFAULT_DETECTIONS_LIMIT: usize = 50;
pub const MAX_DETECTIONS_LIMIT: usize = 500;

/// Shared handles the API reads from
#[derive(Clone)]
pub struct ApiState {
    settings: Arc<NodeSettings>,
    queue: SharedQueue,
    sync_status: watch::Receiver<SyncStatus>,
    capture: Arc<CaptureMetrics>,
}

impl ApiState {
    pub fn new(
        settings: Arc<NodeSettings>,
        queue: SharedQueue,
        sync_status: watch::Receiver<SyncStatus>,
        capture: Arc<CaptureMetrics>,
    ) -> Self {
        Self {
            settings,
            queue,
            sync_status,
            capture,
        }
    }

    fn authorized(&self, request: &Request) -> bool {
        request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .is_some_and(|token| token.trim() == self.settings.node.api_token)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PingResponse {
    pub service: String,
    pub radar_id: String,
    pub radar_name: Option<String>,
    pub version: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub radar_id: String,
    pub radar_name: Option<String>,
    pub location: Option<String>,
    pub speed_limit_kmh: f64,
    pub distance_m: f64,
    pub queue: QueueStats,
    pub last_detection: Option<Measurement>,
    pub sync: SyncStatus,
    pub capture: CaptureSnapshot,
    pub server_time: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct DetectionsParams {
    limit: Option<usize>,
    offset: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DetectionsResponse {
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
    pub detections: Vec<Measurement>,
}

pub fn router(state: ApiState) -> Router {
    let protected = Router::new()
        .route("/api/status", get(status))
        .route("/api/detections", get(detections))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_bearer));

    Router::new()
        .route("/api/ping", get(ping))
        .merge(protected)
        .with_state(state)
}

/// Serve until the shutdown flag is raised
pub async fn serve(
    listener: TcpListener,
    state: ApiState,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "Management API listening");
    }
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            while !*shutdown.borrow() {
                if shutdown.changed().await.is_err() {
                    break;
                }
            }
        })
        .await
}

async fn require_bearer(State(state): State<ApiState>, request: Request, next: Next) -> Response {
    if !state.authorized(&request) {
        debug!(path = %request.uri().path(), "Rejected unauthenticated request");
        return error_response(StatusCode::UNAUTHORIZED, "missing or invalid bearer token");
    }
    next.run(request).await
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

fn queue_failure(e: QueueError) -> Response {
    error!(error = %e, "Queue read failed");
    error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

async fn ping(State(state): State<ApiState>) -> Json<PingResponse> {
    Json(PingResponse {
        service: "radar".to_string(),
        radar_id: state.settings.node.radar_id.clone(),
        radar_name: state.settings.node.name.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn status(State(state): State<ApiState>) -> Response {
    let queue = match state.queue.stats().await {
        Ok(stats) => stats,
        Err(e) => return queue_failure(e),
    };
    let last_detection = match state.queue.last().await {
        Ok(last) => last,
        Err(e) => return queue_failure(e),
    };

    let node = &state.settings.node;
    let sensors = &state.settings.sensors;
    let sync = state.sync_status.borrow().clone();

    Json(StatusResponse {
        radar_id: node.radar_id.clone(),
        radar_name: node.name.clone(),
        location: node.location.clone(),
        speed_limit_kmh: sensors.speed_limit_kmh,
        distance_m: sensors.distance_m,
        queue,
        last_detection,
        sync,
        capture: state.capture.snapshot(),
        server_time: Utc::now(),
    })
    .into_response()
}

async fn detections(
    State(state): State<ApiState>,
    Query(params): Query<DetectionsParams>,
) -> Response {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_DETECTIONS_LIMIT)
        .min(MAX_DETECTIONS_LIMIT);
    let offset = params.offset.unwrap_or(0);

    let total = match state.queue.stats().await {
        Ok(stats) => stats.total,
        Err(e) => return queue_failure(e),
    };
    match state.queue.history(limit, offset).await {
        Ok(detections) => Json(DetectionsResponse {
            total,
            limit,
            offset,
            detections,
        })
        .into_response(),
        Err(e) => queue_failure(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request as HttpRequest;
    use contracts::{
        ApiSettings, CaptureSettings, Direction, NodeIdentity, SensorSettings, SettingsVersion,
        StorageSettings, SyncSettings,
    };
    use tempfile::TempDir;
    use tower::ServiceExt;

    const TOKEN: &str = "node-secret";

    fn settings(dir: &TempDir) -> NodeSettings {
        NodeSettings {
            version: SettingsVersion::V1,
            node: NodeIdentity {
                radar_id: "gate-north".into(),
                name: Some("North Gate".into()),
                location: Some("Campus entrance".into()),
                api_token: TOKEN.into(),
            },
            sensors: SensorSettings::default(),
            capture: CaptureSettings::default(),
            storage: StorageSettings {
                queue_path: dir.path().join("queue.journal"),
                compact_on_start: false,
            },
            sync: SyncSettings::default(),
            api: ApiSettings::default(),
        }
    }

    async fn state(dir: &TempDir, count: usize) -> (ApiState, watch::Sender<SyncStatus>) {
        let settings = settings(dir);
        let queue = SharedQueue::open(&settings.storage.queue_path).await.unwrap();
        for i in 0..count {
            let m = Measurement::new("gate-north", Utc::now(), 20.0 + i as f64, Direction::AToB, false);
            queue.append(m).await.unwrap();
        }
        let (tx, rx) = watch::channel(SyncStatus::default());
        let state = ApiState::new(Arc::new(settings), queue, rx, Arc::new(CaptureMetrics::new()));
        (state, tx)
    }

    fn get(uri: &str, token: Option<&str>) -> HttpRequest<Body> {
        let mut builder = HttpRequest::builder().uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_ping_without_auth() {
        let dir = tempfile::tempdir().unwrap();
        let (state, _tx) = state(&dir, 0).await;

        let response = router(state).oneshot(get("/api/ping", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json(response).await;
        assert_eq!(body["service"], "radar");
        assert_eq!(body["radar_id"], "gate-north");
        assert_eq!(body["radar_name"], "North Gate");
    }

    #[tokio::test]
    async fn test_protected_routes_require_bearer() {
        let dir = tempfile::tempdir().unwrap();
        let (state, _tx) = state(&dir, 1).await;
        let app = router(state);

        for uri in ["/api/status", "/api/detections"] {
            let response = app.clone().oneshot(get(uri, None)).await.unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
            let body = json(response).await;
            assert!(body["error"].is_string());

            let response = app.clone().oneshot(get(uri, Some("wrong"))).await.unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        }
    }

    #[tokio::test]
    async fn test_status_reports_queue_and_sync() {
        let dir = tempfile::tempdir().unwrap();
        let (state, tx) = state(&dir, 3).await;
        tx.send_modify(|s| {
            s.enabled = true;
            s.consecutive_failures = 2;
        });

        let response = router(state)
            .oneshot(get("/api/status", Some(TOKEN)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json(response).await;
        assert_eq!(body["radar_id"], "gate-north");
        assert_eq!(body["location"], "Campus entrance");
        assert_eq!(body["queue"]["total"], 3);
        assert_eq!(body["queue"]["pending"], 3);
        assert_eq!(body["sync"]["consecutive_failures"], 2);
        assert_eq!(body["last_detection"]["speed_kmh"], 22.0);
        assert!(body["server_time"].is_string());
        assert_eq!(body["capture"]["edges_received"], 0);
    }

    #[tokio::test]
    async fn test_detections_newest_first_with_paging() {
        let dir = tempfile::tempdir().unwrap();
        let (state, _tx) = state(&dir, 5).await;
        let app = router(state);

        let response = app
            .clone()
            .oneshot(get("/api/detections?limit=2&offset=1", Some(TOKEN)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body: DetectionsResponse =
            serde_json::from_value(json(response).await).unwrap();
        assert_eq!(body.total, 5);
        let speeds: Vec<f64> = body.detections.iter().map(|m| m.speed_kmh).collect();
        assert_eq!(speeds, vec![23.0, 22.0]);

        let response = app
            .oneshot(get("/api/detections?limit=10000", Some(TOKEN)))
            .await
            .unwrap();
        let body = json(response).await;
        assert_eq!(body["limit"], MAX_DETECTIONS_LIMIT);
        assert_eq!(body["detections"].as_array().unwrap().len(), 5);
    }
}
