//! HTTP surface of the central aggregator

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use chrono::{Duration, Utc};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};

use crate::error::StoreError;
use crate::record::{
    RecordFilter, StoredRecord, DEFAULT_LIST_LIMIT, DEFAULT_SUMMARY_HOURS, MAX_LIST_LIMIT,
    MAX_SUMMARY_HOURS,
};
use crate::service::IngestionService;
use crate::store::RecordStore;

type SharedService<S> = Arc<IngestionService<S>>;

pub fn router<S>(service: SharedService<S>) -> Router
where
    S: RecordStore + Sync + 'static,
{
    Router::new()
        .route("/api/v1/ping", get(ping))
        .route(
            "/api/v1/measurements",
            get(list_measurements::<S>).post(ingest_measurement::<S>),
        )
        .route("/api/v1/stats", get(summarize::<S>))
        .with_state(service)
}

/// Serve until the shutdown flag is raised
pub async fn serve<S>(
    listener: TcpListener,
    service: SharedService<S>,
    shutdown: watch::Receiver<bool>,
) -> std::io::Result<()>
where
    S: RecordStore + Sync + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "Central ingestion listening");
    }
    axum::serve(listener, router(service))
        .with_graceful_shutdown(wait_for_shutdown(shutdown))
        .await
}

async fn wait_for_shutdown(mut shutdown: watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

pub(crate) fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
}

async fn ping() -> Json<serde_json::Value> {
    Json(json!({
        "service": "central",
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn ingest_measurement<S>(
    State(service): State<SharedService<S>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response
where
    S: RecordStore + Sync + 'static,
{
    let response = service.ingest(bearer_token(&headers), &body).await;
    let status =
        StatusCode::from_u16(response.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(response.reply())).into_response()
}

#[derive(Debug, Deserialize)]
struct ListParams {
    radar_id: Option<String>,
    limit: Option<usize>,
    offset: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListResponse {
    /// Records in the store (all radars)
    pub total: usize,
    pub records: Vec<StoredRecord>,
}

async fn list_measurements<S>(
    State(service): State<SharedService<S>>,
    headers: HeaderMap,
    Query(params): Query<ListParams>,
) -> Response
where
    S: RecordStore + Sync + 'static,
{
    if !service.authorize(bearer_token(&headers)) {
        return unauthorized();
    }

    let filter = RecordFilter {
        radar_id: params.radar_id,
        limit: params.limit.unwrap_or(DEFAULT_LIST_LIMIT).min(MAX_LIST_LIMIT),
        offset: params.offset.unwrap_or(0),
    };

    match fetch_page(service.store(), &filter).await {
        Ok((total, records)) => Json(ListResponse { total, records }).into_response(),
        Err(e) => {
            error!(error = %e, "Failed to list measurements");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
struct SummaryParams {
    /// Window size, counted back from now
    hours: Option<u32>,
}

async fn summarize<S>(
    State(service): State<SharedService<S>>,
    headers: HeaderMap,
    Query(params): Query<SummaryParams>,
) -> Response
where
    S: RecordStore + Sync + 'static,
{
    if !service.authorize(bearer_token(&headers)) {
        return unauthorized();
    }

    let hours = params
        .hours
        .unwrap_or(DEFAULT_SUMMARY_HOURS)
        .clamp(1, MAX_SUMMARY_HOURS);
    let since = Utc::now() - Duration::hours(i64::from(hours));

    match service.store().summary(since).await {
        Ok(summary) => Json(summary).into_response(),
        Err(e) => {
            error!(error = %e, "Failed to summarize measurements");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "error": "missing or invalid bearer token" })),
    )
        .into_response()
}

async fn fetch_page<S: RecordStore>(
    store: &S,
    filter: &RecordFilter,
) -> Result<(usize, Vec<StoredRecord>), StoreError> {
    Ok((store.count().await?, store.list(filter).await?))
}
