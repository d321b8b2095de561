//! HTTP handlers of the admin API.

use axum::{
    extract::{Path, Query, State},
    http::header,
    response::IntoResponse,
    Json,
};
use chrono::{Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::db::{
    count_requests, count_requests_by_status, count_users, daily_request_counts, list_recent_requests,
    list_requests as fetch_requests, list_services as fetch_services, update_request_status, update_service as save_service,
    ConsultationRequest, DailyCount, RequestStatus, RequestWithService, Service, ServiceUpdate,
};
use crate::localization::t_lang;

use super::error::{ApiError, Result};
use super::export::{export_file_name, requests_to_csv};
use super::AppState;

/// Requests shown on the dashboard
const DASHBOARD_RECENT: i64 = 5;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct StatusCount {
    pub status: RequestStatus,
    pub label: String,
    pub count: i64,
}

#[derive(Debug, Serialize)]
pub struct DashboardResponse {
    pub new_requests: Vec<RequestWithService>,
    pub status_counts: Vec<StatusCount>,
    pub total_users: i64,
    pub total_requests: i64,
}

#[derive(Debug, Deserialize)]
pub struct RequestListQuery {
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RequestListResponse {
    pub requests: Vec<RequestWithService>,
    pub total: usize,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct ServiceListResponse {
    pub services: Vec<Service>,
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub since: NaiveDate,
    pub daily: Vec<DailyCount>,
    pub status_counts: Vec<StatusCount>,
}

async fn status_counts(state: &AppState) -> Result<Vec<StatusCount>> {
    let counts = count_requests_by_status(&state.pool).await?;
    Ok(counts
        .into_iter()
        .map(|(status, count)| StatusCount {
            status,
            label: t_lang(&format!("status-{status}"), None),
            count,
        })
        .collect())
}

/// Parse an optional status filter; blank means no filter
fn parse_status_filter(raw: Option<&str>) -> Result<Option<RequestStatus>> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => Ok(Some(raw.parse()?)),
        None => Ok(None),
    }
}

/// GET /api/health - Health check endpoint.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.uptime_seconds(),
    })
}

/// GET /api/dashboard - Newest open requests and headline counts.
pub async fn dashboard(State(state): State<AppState>) -> Result<Json<DashboardResponse>> {
    Ok(Json(DashboardResponse {
        new_requests: list_recent_requests(&state.pool, RequestStatus::New, DASHBOARD_RECENT).await?,
        status_counts: status_counts(&state).await?,
        total_users: count_users(&state.pool).await?,
        total_requests: count_requests(&state.pool).await?,
    }))
}

/// GET /api/requests - List requests, optionally filtered by status.
pub async fn list_requests(
    State(state): State<AppState>,
    Query(query): Query<RequestListQuery>,
) -> Result<Json<RequestListResponse>> {
    let status = parse_status_filter(query.status.as_deref())?;
    let requests = fetch_requests(&state.pool, status).await?;
    let total = requests.len();
    Ok(Json(RequestListResponse { requests, total }))
}

/// POST /api/requests/:id/status - Change the status of a request.
pub async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<ConsultationRequest>> {
    let status: RequestStatus = req.status.parse()?;

    update_request_status(&state.pool, id, status)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("request {id}")))
}

/// GET /api/requests/export - All requests as a CSV attachment.
pub async fn export_requests(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let requests = fetch_requests(&state.pool, None).await?;
    let csv = requests_to_csv(&requests)?;
    let disposition = format!("attachment; filename=\"{}\"", export_file_name(Utc::now()));

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        csv,
    ))
}

/// GET /api/services - List services.
pub async fn list_services(State(state): State<AppState>) -> Result<Json<ServiceListResponse>> {
    let services = fetch_services(&state.pool).await?;
    let total = services.len();
    Ok(Json(ServiceListResponse { services, total }))
}

/// POST /api/services/:id - Partially update a service.
pub async fn update_service(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(update): Json<ServiceUpdate>,
) -> Result<Json<Service>> {
    if update.name.as_deref().is_some_and(|name| name.trim().is_empty()) {
        return Err(ApiError::BadRequest("service name must not be empty".to_string()));
    }

    save_service(&state.pool, id, &update)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("service {id}")))
}

/// First day of the month containing `today`
pub fn month_start(today: NaiveDate) -> NaiveDate {
    today.with_day(1).unwrap_or(today)
}

/// GET /api/stats - Daily request counts for the current month and counts by status.
pub async fn stats(State(state): State<AppState>) -> Result<Json<StatsResponse>> {
    let since = month_start(Utc::now().date_naive());

    Ok(Json(StatsResponse {
        since,
        daily: daily_request_counts(&state.pool, since).await?,
        status_counts: status_counts(&state).await?,
    }))
}
