//! Admin API against a real database.

use anyhow::{Context, Result};
use axum_test::TestServer;
use chrono::NaiveDate;
use serde_json::{json, Value};
use sqlx::PgPool;
use std::env;
use std::sync::LazyLock;
use tokio::sync::Mutex;

use clinic_assistant::admin::{create_router, export_requests_csv_to_path, AppState};
use clinic_assistant::db::*;

static DB_LOCK: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

/// Helper macro to skip tests when database is not available
macro_rules! skip_if_no_db {
    ($test_fn:expr) => {{
        let _guard = DB_LOCK.lock().await;
        match setup_test_db().await {
            Ok(pool) => $test_fn(pool).await,
            Err(_) => {
                eprintln!("Skipping test: Database not available");
                Ok(())
            }
        }
    }};
}

/// Connects to `DATABASE_URL` and recreates the schema.
///
/// The database needs a UTF-8 `LC_CTYPE` (e.g. `C.UTF-8` or `ru_RU.UTF-8`):
/// service lookup relies on `ILIKE` folding Cyrillic case, which the `C`
/// locale does not do.
async fn setup_test_db() -> Result<PgPool> {
    let database_url = match env::var("DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            eprintln!("Skipping admin API tests: DATABASE_URL not set");
            return Err(anyhow::anyhow!("Test database not configured"));
        }
    };

    let pool = PgPool::connect(&database_url)
        .await
        .context("Failed to connect to test database")?;

    for table in ["chat_logs", "consultation_requests", "services", "users"] {
        sqlx::query(&format!("DROP TABLE IF EXISTS {table} CASCADE"))
            .execute(&pool)
            .await?;
    }

    init_database_schema(&pool).await?;

    Ok(pool)
}

/// One user with two requests for the same service; returns their ids oldest first
async fn seed(pool: &PgPool) -> Result<(Service, i64, i64)> {
    let user = get_or_create_user(
        pool,
        &UserProfile {
            telegram_id: 100,
            username: Some("client".to_string()),
            first_name: Some("Анна".to_string()),
            last_name: None,
        },
    )
    .await?;
    let service = create_service(
        pool,
        &NewService {
            name: "Блефаропластика".to_string(),
            price_range: Some("от 50 000 рублей".to_string()),
            ..Default::default()
        },
    )
    .await?;

    let mut ids = Vec::new();
    for (name, comment) in [("Анна", "после обеда"), ("Мария, старшая", "")] {
        let request = create_consultation_request(
            pool,
            &NewConsultationRequest {
                user_id: user.id,
                service_id: service.id,
                name: name.to_string(),
                phone: "+79991234567".to_string(),
                preferred_date: NaiveDate::from_ymd_opt(2030, 1, 15),
                comment: comment.to_string(),
            },
        )
        .await?;
        ids.push(request.id);
    }

    Ok((service, ids[0], ids[1]))
}

fn server(pool: PgPool) -> TestServer {
    TestServer::new(create_router(AppState::new(pool))).expect("test server starts")
}

#[tokio::test]
async fn test_dashboard() -> Result<()> {
    skip_if_no_db!(test_dashboard_impl)
}

async fn test_dashboard_impl(pool: PgPool) -> Result<()> {
    let (_, first, second) = seed(&pool).await?;
    update_request_status(&pool, first, RequestStatus::Contacted).await?;

    let response = server(pool).get("/api/dashboard").await;
    response.assert_status_ok();

    let body: Value = response.json();
    assert_eq!(body["total_users"], 1);
    assert_eq!(body["total_requests"], 2);
    assert_eq!(body["new_requests"].as_array().map(Vec::len), Some(1));
    assert_eq!(body["new_requests"][0]["id"], second);
    assert_eq!(body["new_requests"][0]["service_name"], "Блефаропластика");

    let counts = body["status_counts"].as_array().cloned().unwrap_or_default();
    assert_eq!(counts.len(), RequestStatus::ALL.len());
    assert!(counts.contains(&json!({ "status": "contacted", "label": "Связались", "count": 1 })));

    Ok(())
}

#[tokio::test]
async fn test_request_listing_and_status_update() -> Result<()> {
    skip_if_no_db!(test_request_listing_and_status_update_impl)
}

async fn test_request_listing_and_status_update_impl(pool: PgPool) -> Result<()> {
    let (_, first, second) = seed(&pool).await?;
    let server = server(pool);

    let body: Value = server.get("/api/requests").await.json();
    assert_eq!(body["total"], 2);
    assert_eq!(body["requests"][0]["id"], second);

    let response = server
        .post(&format!("/api/requests/{first}/status"))
        .json(&json!({ "status": "appointed" }))
        .await;
    response.assert_status_ok();
    let updated: Value = response.json();
    assert_eq!(updated["status"], "appointed");

    let body: Value = server
        .get("/api/requests")
        .add_query_param("status", "appointed")
        .await
        .json();
    assert_eq!(body["total"], 1);
    assert_eq!(body["requests"][0]["id"], first);

    // Blank filter lists everything
    let body: Value = server.get("/api/requests").add_query_param("status", "").await.json();
    assert_eq!(body["total"], 2);

    server
        .post("/api/requests/424242/status")
        .json(&json!({ "status": "completed" }))
        .await
        .assert_status_not_found();

    Ok(())
}

#[tokio::test]
async fn test_csv_export() -> Result<()> {
    skip_if_no_db!(test_csv_export_impl)
}

async fn test_csv_export_impl(pool: PgPool) -> Result<()> {
    seed(&pool).await?;

    let response = server(pool.clone()).get("/api/requests/export").await;
    response.assert_status_ok();

    let content_type = response.header("content-type");
    assert_eq!(content_type.to_str()?, "text/csv; charset=utf-8");
    let disposition = response.header("content-disposition");
    assert!(disposition.to_str()?.starts_with("attachment; filename=\"requests_"));

    let csv = response.text();
    let mut lines = csv.lines();
    assert_eq!(
        lines.next(),
        Some("ID,Имя,Телефон,Услуга,Статус,Предпочтительная дата,Комментарий,Дата создания")
    );
    // Newest first; the comma in the name forces quoting
    let row = lines.next().unwrap_or_default();
    assert!(row.contains("\"Мария, старшая\",+79991234567,Блефаропластика,new,15.01.2030,,"));
    assert_eq!(csv.lines().count(), 3);

    let dir = tempfile::tempdir()?;
    let path = dir.path().join("export.csv");
    assert_eq!(export_requests_csv_to_path(&pool, &path).await?, 2);
    assert_eq!(std::fs::read_to_string(&path)?, csv);

    Ok(())
}

#[tokio::test]
async fn test_service_update() -> Result<()> {
    skip_if_no_db!(test_service_update_impl)
}

async fn test_service_update_impl(pool: PgPool) -> Result<()> {
    let (service, _, _) = seed(&pool).await?;
    let server = server(pool);

    let response = server
        .post(&format!("/api/services/{}", service.id))
        .json(&json!({ "price_range": "от 65 000 рублей", "duration": "1-2 часа" }))
        .await;
    response.assert_status_ok();

    let updated: Value = response.json();
    assert_eq!(updated["name"], "Блефаропластика");
    assert_eq!(updated["price_range"], "от 65 000 рублей");
    assert_eq!(updated["duration"], "1-2 часа");

    let body: Value = server.get("/api/services").await.json();
    assert_eq!(body["total"], 1);
    assert_eq!(body["services"][0]["price_range"], "от 65 000 рублей");

    server
        .post("/api/services/424242")
        .json(&json!({ "price_range": "бесплатно" }))
        .await
        .assert_status_not_found();

    Ok(())
}

#[tokio::test]
async fn test_stats() -> Result<()> {
    skip_if_no_db!(test_stats_impl)
}

async fn test_stats_impl(pool: PgPool) -> Result<()> {
    seed(&pool).await?;

    let response = server(pool).get("/api/stats").await;
    response.assert_status_ok();

    let body: Value = response.json();
    let daily = body["daily"].as_array().cloned().unwrap_or_default();
    assert_eq!(daily.len(), 1);
    assert_eq!(daily[0]["count"], 2);
    assert!(body["since"].as_str().unwrap_or_default().ends_with("-01"));

    Ok(())
}
