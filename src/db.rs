//! # Database Module
//!
//! PostgreSQL persistence for users, clinic services, consultation requests
//! and chat logs. Every operation is a free function over a [`PgPool`].

use std::fmt;
use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgPool;
use sqlx::FromRow;
use thiserror::Error;
use tracing::{debug, info};

/// Lifecycle of a consultation request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    New,
    Contacted,
    Appointed,
    Cancelled,
    Completed,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown request status: {0}")]
pub struct UnknownStatus(pub String);

impl RequestStatus {
    pub const ALL: [RequestStatus; 5] = [
        RequestStatus::New,
        RequestStatus::Contacted,
        RequestStatus::Appointed,
        RequestStatus::Cancelled,
        RequestStatus::Completed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::New => "new",
            RequestStatus::Contacted => "contacted",
            RequestStatus::Appointed => "appointed",
            RequestStatus::Cancelled => "cancelled",
            RequestStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        RequestStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s.trim().to_lowercase())
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

impl TryFrom<String> for RequestStatus {
    type Error = UnknownStatus;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

/// A Telegram user who has talked to the bot
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct User {
    pub id: i64,
    pub telegram_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub registered_at: DateTime<Utc>,
}

/// Telegram profile fields captured when a user is first seen
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserProfile {
    pub telegram_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// A clinic service (procedure) offered for consultation
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct Service {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub indications: Option<String>,
    pub methods: Option<String>,
    pub duration: Option<String>,
    pub recovery: Option<String>,
    pub price_range: Option<String>,
    pub source_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields for inserting a service
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewService {
    pub name: String,
    pub description: Option<String>,
    pub indications: Option<String>,
    pub methods: Option<String>,
    pub duration: Option<String>,
    pub recovery: Option<String>,
    pub price_range: Option<String>,
    pub source_url: Option<String>,
}

/// Partial service update; `None` keeps the stored value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub indications: Option<String>,
    pub methods: Option<String>,
    pub duration: Option<String>,
    pub recovery: Option<String>,
    pub price_range: Option<String>,
    pub source_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct ConsultationRequest {
    pub id: i64,
    pub user_id: i64,
    pub service_id: i64,
    pub name: String,
    pub phone: String,
    pub preferred_date: Option<NaiveDate>,
    pub comment: Option<String>,
    #[sqlx(try_from = "String")]
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Consultation request joined with the name of its service
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct RequestWithService {
    pub id: i64,
    pub user_id: i64,
    pub service_id: i64,
    pub service_name: Option<String>,
    pub name: String,
    pub phone: String,
    pub preferred_date: Option<NaiveDate>,
    pub comment: Option<String>,
    #[sqlx(try_from = "String")]
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewConsultationRequest {
    pub user_id: i64,
    pub service_id: i64,
    pub name: String,
    pub phone: String,
    pub preferred_date: Option<NaiveDate>,
    pub comment: String,
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct ChatLog {
    pub id: i64,
    pub user_id: i64,
    pub message: String,
    pub response: Option<String>,
    pub intent: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Number of requests created on one day
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct DailyCount {
    pub day: NaiveDate,
    pub count: i64,
}

const REQUEST_WITH_SERVICE_SELECT: &str = "SELECT r.id, r.user_id, r.service_id, s.name AS service_name, \
     r.name, r.phone, r.preferred_date, r.comment, r.status, r.created_at, r.updated_at \
     FROM consultation_requests r LEFT JOIN services s ON s.id = r.service_id";

/// Initialize the database schema
pub async fn init_database_schema(pool: &PgPool) -> Result<()> {
    info!("Initializing database schema");

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS users (
            id BIGSERIAL PRIMARY KEY,
            telegram_id BIGINT NOT NULL UNIQUE,
            username VARCHAR(255),
            first_name VARCHAR(255),
            last_name VARCHAR(255),
            phone VARCHAR(20),
            registered_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create users table")?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS services (
            id BIGSERIAL PRIMARY KEY,
            name VARCHAR(255) NOT NULL,
            description TEXT,
            indications TEXT,
            methods TEXT,
            duration VARCHAR(255),
            recovery TEXT,
            price_range VARCHAR(255),
            source_url VARCHAR(500),
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create services table")?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS consultation_requests (
            id BIGSERIAL PRIMARY KEY,
            user_id BIGINT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            service_id BIGINT NOT NULL REFERENCES services(id),
            name VARCHAR(255) NOT NULL,
            phone VARCHAR(20) NOT NULL,
            preferred_date DATE,
            comment TEXT,
            status VARCHAR(20) NOT NULL DEFAULT 'new',
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create consultation_requests table")?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS chat_logs (
            id BIGSERIAL PRIMARY KEY,
            user_id BIGINT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            message TEXT NOT NULL,
            response TEXT,
            intent VARCHAR(100),
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create chat_logs table")?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_requests_status ON consultation_requests(status)")
        .execute(pool)
        .await
        .context("Failed to create requests status index")?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_requests_user ON consultation_requests(user_id)")
        .execute(pool)
        .await
        .context("Failed to create requests user index")?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chat_logs_user ON chat_logs(user_id, created_at DESC)")
        .execute(pool)
        .await
        .context("Failed to create chat logs index")?;

    info!("Database schema initialized successfully");
    Ok(())
}

// Users

pub async fn get_user_by_telegram_id(pool: &PgPool, telegram_id: i64) -> Result<Option<User>> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE telegram_id = $1")
        .bind(telegram_id)
        .fetch_optional(pool)
        .await
        .context("Failed to fetch user by telegram id")?;

    Ok(user)
}

pub async fn create_user(pool: &PgPool, profile: &UserProfile, phone: Option<&str>) -> Result<User> {
    info!(telegram_id = profile.telegram_id, "Creating user");

    let user = sqlx::query_as::<_, User>(
        "INSERT INTO users (telegram_id, username, first_name, last_name, phone)
         VALUES ($1, $2, $3, $4, $5)
         RETURNING *",
    )
    .bind(profile.telegram_id)
    .bind(&profile.username)
    .bind(&profile.first_name)
    .bind(&profile.last_name)
    .bind(phone)
    .fetch_one(pool)
    .await
    .context("Failed to create user")?;

    Ok(user)
}

/// Fetch the user for a Telegram id, creating it on first contact
pub async fn get_or_create_user(pool: &PgPool, profile: &UserProfile) -> Result<User> {
    if let Some(user) = get_user_by_telegram_id(pool, profile.telegram_id).await? {
        return Ok(user);
    }

    // Two concurrent first messages may race here; the unique key keeps one row.
    sqlx::query(
        "INSERT INTO users (telegram_id, username, first_name, last_name)
         VALUES ($1, $2, $3, $4)
         ON CONFLICT (telegram_id) DO NOTHING",
    )
    .bind(profile.telegram_id)
    .bind(&profile.username)
    .bind(&profile.first_name)
    .bind(&profile.last_name)
    .execute(pool)
    .await
    .context("Failed to insert user")?;

    info!(telegram_id = profile.telegram_id, "Registered new user");

    get_user_by_telegram_id(pool, profile.telegram_id)
        .await?
        .context("User missing right after insert")
}

pub async fn update_user_phone(pool: &PgPool, user_id: i64, phone: &str) -> Result<bool> {
    let result = sqlx::query("UPDATE users SET phone = $1 WHERE id = $2")
        .bind(phone)
        .bind(user_id)
        .execute(pool)
        .await
        .context("Failed to update user phone")?;

    Ok(result.rows_affected() > 0)
}

pub async fn count_users(pool: &PgPool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(pool)
        .await
        .context("Failed to count users")?;

    Ok(count)
}

// Services

/// All services ordered by name
pub async fn list_services(pool: &PgPool) -> Result<Vec<Service>> {
    let services = sqlx::query_as::<_, Service>("SELECT * FROM services ORDER BY name, id")
        .fetch_all(pool)
        .await
        .context("Failed to list services")?;

    Ok(services)
}

pub async fn get_service(pool: &PgPool, id: i64) -> Result<Option<Service>> {
    let service = sqlx::query_as::<_, Service>("SELECT * FROM services WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to fetch service")?;

    Ok(service)
}

/// First service whose name contains `name`, ignoring case
///
/// Case folding of Cyrillic names needs a database created with a UTF-8
/// `LC_CTYPE`; under the `C` locale only ASCII letters fold.
pub async fn find_service_by_name(pool: &PgPool, name: &str) -> Result<Option<Service>> {
    let pattern = format!("%{}%", name.trim());
    let service = sqlx::query_as::<_, Service>(
        "SELECT * FROM services WHERE name ILIKE $1 ORDER BY name, id LIMIT 1",
    )
    .bind(pattern)
    .fetch_optional(pool)
    .await
    .context("Failed to search services by name")?;

    Ok(service)
}

pub async fn create_service(pool: &PgPool, service: &NewService) -> Result<Service> {
    info!(name = %service.name, "Creating service");

    let created = sqlx::query_as::<_, Service>(
        "INSERT INTO services
            (name, description, indications, methods, duration, recovery, price_range, source_url)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
         RETURNING *",
    )
    .bind(&service.name)
    .bind(&service.description)
    .bind(&service.indications)
    .bind(&service.methods)
    .bind(&service.duration)
    .bind(&service.recovery)
    .bind(&service.price_range)
    .bind(&service.source_url)
    .fetch_one(pool)
    .await
    .context("Failed to create service")?;

    Ok(created)
}

/// Apply a partial update; returns `None` when the service does not exist
pub async fn update_service(pool: &PgPool, id: i64, update: &ServiceUpdate) -> Result<Option<Service>> {
    let updated = sqlx::query_as::<_, Service>(
        "UPDATE services SET
            name = COALESCE($2, name),
            description = COALESCE($3, description),
            indications = COALESCE($4, indications),
            methods = COALESCE($5, methods),
            duration = COALESCE($6, duration),
            recovery = COALESCE($7, recovery),
            price_range = COALESCE($8, price_range),
            source_url = COALESCE($9, source_url),
            updated_at = NOW()
         WHERE id = $1
         RETURNING *",
    )
    .bind(id)
    .bind(&update.name)
    .bind(&update.description)
    .bind(&update.indications)
    .bind(&update.methods)
    .bind(&update.duration)
    .bind(&update.recovery)
    .bind(&update.price_range)
    .bind(&update.source_url)
    .fetch_optional(pool)
    .await
    .context("Failed to update service")?;

    Ok(updated)
}

pub async fn count_services(pool: &PgPool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM services")
        .fetch_one(pool)
        .await
        .context("Failed to count services")?;

    Ok(count)
}

// Consultation requests

pub async fn create_consultation_request(
    pool: &PgPool,
    request: &NewConsultationRequest,
) -> Result<ConsultationRequest> {
    let created = sqlx::query_as::<_, ConsultationRequest>(
        "INSERT INTO consultation_requests
            (user_id, service_id, name, phone, preferred_date, comment, status)
         VALUES ($1, $2, $3, $4, $5, $6, $7)
         RETURNING *",
    )
    .bind(request.user_id)
    .bind(request.service_id)
    .bind(&request.name)
    .bind(&request.phone)
    .bind(request.preferred_date)
    .bind(&request.comment)
    .bind(RequestStatus::New.as_str())
    .fetch_one(pool)
    .await
    .context("Failed to create consultation request")?;

    info!(request_id = created.id, user_id = created.user_id, "Consultation request created");
    Ok(created)
}

/// Requests newest first, optionally filtered by status
pub async fn list_requests(pool: &PgPool, status: Option<RequestStatus>) -> Result<Vec<RequestWithService>> {
    let requests = match status {
        Some(status) => {
            let sql = format!("{REQUEST_WITH_SERVICE_SELECT} WHERE r.status = $1 ORDER BY r.created_at DESC, r.id DESC");
            sqlx::query_as::<_, RequestWithService>(&sql)
                .bind(status.as_str())
                .fetch_all(pool)
                .await
        }
        None => {
            let sql = format!("{REQUEST_WITH_SERVICE_SELECT} ORDER BY r.created_at DESC, r.id DESC");
            sqlx::query_as::<_, RequestWithService>(&sql).fetch_all(pool).await
        }
    }
    .context("Failed to list consultation requests")?;

    debug!(count = requests.len(), "Listed consultation requests");
    Ok(requests)
}

/// Newest `limit` requests with the given status
pub async fn list_recent_requests(pool: &PgPool, status: RequestStatus, limit: i64) -> Result<Vec<RequestWithService>> {
    let sql = format!("{REQUEST_WITH_SERVICE_SELECT} WHERE r.status = $1 ORDER BY r.created_at DESC, r.id DESC LIMIT $2");
    let requests = sqlx::query_as::<_, RequestWithService>(&sql)
        .bind(status.as_str())
        .bind(limit)
        .fetch_all(pool)
        .await
        .context("Failed to list recent consultation requests")?;

    Ok(requests)
}

pub async fn get_request(pool: &PgPool, id: i64) -> Result<Option<RequestWithService>> {
    let sql = format!("{REQUEST_WITH_SERVICE_SELECT} WHERE r.id = $1");
    let request = sqlx::query_as::<_, RequestWithService>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to fetch consultation request")?;

    Ok(request)
}

pub async fn list_requests_by_user(pool: &PgPool, user_id: i64) -> Result<Vec<ConsultationRequest>> {
    let requests = sqlx::query_as::<_, ConsultationRequest>(
        "SELECT * FROM consultation_requests WHERE user_id = $1 ORDER BY created_at DESC, id DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
    .context("Failed to list requests for user")?;

    Ok(requests)
}

/// Set a request's status; `None` when the request does not exist
pub async fn update_request_status(
    pool: &PgPool,
    id: i64,
    status: RequestStatus,
) -> Result<Option<ConsultationRequest>> {
    let updated = sqlx::query_as::<_, ConsultationRequest>(
        "UPDATE consultation_requests SET status = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .bind(status.as_str())
    .fetch_optional(pool)
    .await
    .context("Failed to update request status")?;

    if updated.is_some() {
        info!(request_id = id, status = %status, "Request status updated");
    }
    Ok(updated)
}

pub async fn count_requests(pool: &PgPool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM consultation_requests")
        .fetch_one(pool)
        .await
        .context("Failed to count requests")?;

    Ok(count)
}

/// Request counts for every status, zero-filled, in [`RequestStatus::ALL`] order
pub async fn count_requests_by_status(pool: &PgPool) -> Result<Vec<(RequestStatus, i64)>> {
    let rows: Vec<(String, i64)> =
        sqlx::query_as("SELECT status, COUNT(*) FROM consultation_requests GROUP BY status")
            .fetch_all(pool)
            .await
            .context("Failed to count requests by status")?;

    Ok(RequestStatus::ALL
        .into_iter()
        .map(|status| {
            let count = rows
                .iter()
                .filter(|(name, _)| name == status.as_str())
                .map(|(_, count)| *count)
                .sum();
            (status, count)
        })
        .collect())
}

/// Requests created per day, starting at `since`
pub async fn daily_request_counts(pool: &PgPool, since: NaiveDate) -> Result<Vec<DailyCount>> {
    let rows = sqlx::query_as::<_, DailyCount>(
        "SELECT (created_at AT TIME ZONE 'UTC')::date AS day, COUNT(*) AS count
         FROM consultation_requests
         WHERE (created_at AT TIME ZONE 'UTC')::date >= $1
         GROUP BY day
         ORDER BY day",
    )
    .bind(since)
    .fetch_all(pool)
    .await
    .context("Failed to compute daily request counts")?;

    Ok(rows)
}

// Chat logs

pub async fn create_chat_log(
    pool: &PgPool,
    user_id: i64,
    message: &str,
    response: Option<&str>,
    intent: &str,
) -> Result<i64> {
    let id: i64 = sqlx::query_scalar(
        "INSERT INTO chat_logs (user_id, message, response, intent) VALUES ($1, $2, $3, $4) RETURNING id",
    )
    .bind(user_id)
    .bind(message)
    .bind(response)
    .bind(intent)
    .fetch_one(pool)
    .await
    .context("Failed to write chat log")?;

    debug!(user_id, intent, log_id = id, "Chat log written");
    Ok(id)
}

/// Most recent chat logs of a user, newest first
pub async fn recent_chat_logs(pool: &PgPool, user_id: i64, limit: i64) -> Result<Vec<ChatLog>> {
    let logs = sqlx::query_as::<_, ChatLog>(
        "SELECT * FROM chat_logs WHERE user_id = $1 ORDER BY created_at DESC, id DESC LIMIT $2",
    )
    .bind(user_id)
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("Failed to fetch chat logs")?;

    Ok(logs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_status_round_trip() {
        for status in RequestStatus::ALL {
            assert_eq!(status.as_str().parse::<RequestStatus>().unwrap(), status);
        }
    }

    #[test]
    fn test_request_status_parse_is_lenient_on_case() {
        assert_eq!(" Contacted ".parse::<RequestStatus>().unwrap(), RequestStatus::Contacted);
        assert_eq!(
            "archived".parse::<RequestStatus>().unwrap_err(),
            UnknownStatus("archived".to_string())
        );
    }

    #[test]
    fn test_request_status_serde() {
        let json = serde_json::to_string(&RequestStatus::Appointed).unwrap();
        assert_eq!(json, "\"appointed\"");
        let parsed: RequestStatus = serde_json::from_str("\"cancelled\"").unwrap();
        assert_eq!(parsed, RequestStatus::Cancelled);
    }
}
