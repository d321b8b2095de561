//! CSV export of consultation requests.

use std::path::Path;

use anyhow::{Context, Result};
use sqlx::postgres::PgPool;
use tracing::info;

use crate::db::{list_requests, RequestWithService};

pub const CSV_HEADERS: [&str; 8] = [
    "ID",
    "Имя",
    "Телефон",
    "Услуга",
    "Статус",
    "Предпочтительная дата",
    "Комментарий",
    "Дата создания",
];

const UNKNOWN_SERVICE: &str = "Unknown";

/// Render requests as CSV, one row per request in the given order
pub fn requests_to_csv(requests: &[RequestWithService]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(CSV_HEADERS)?;

    for request in requests {
        writer.write_record([
            request.id.to_string(),
            request.name.clone(),
            request.phone.clone(),
            request.service_name.clone().unwrap_or_else(|| UNKNOWN_SERVICE.to_string()),
            request.status.to_string(),
            request
                .preferred_date
                .map(|date| date.format("%d.%m.%Y").to_string())
                .unwrap_or_default(),
            request.comment.clone().unwrap_or_default(),
            request.created_at.format("%d.%m.%Y %H:%M").to_string(),
        ])?;
    }

    let bytes = writer.into_inner().context("Failed to flush CSV writer")?;
    String::from_utf8(bytes).context("CSV output is not valid UTF-8")
}

/// Attachment file name for an export taken at `now`
pub fn export_file_name(now: chrono::DateTime<chrono::Utc>) -> String {
    format!("requests_{}.csv", now.format("%Y%m%d_%H%M%S"))
}

/// Write every request to a CSV file; returns the number of rows written
pub async fn export_requests_csv_to_path(pool: &PgPool, path: &Path) -> Result<usize> {
    let requests = list_requests(pool, None).await?;
    let csv = requests_to_csv(&requests)?;
    tokio::fs::write(path, csv)
        .await
        .with_context(|| format!("Failed to write CSV export to {}", path.display()))?;

    info!(path = %path.display(), rows = requests.len(), "Exported consultation requests");
    Ok(requests.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::RequestStatus;
    use chrono::{NaiveDate, TimeZone, Utc};

    fn request(id: i64, comment: Option<&str>) -> RequestWithService {
        let created = Utc.with_ymd_and_hms(2024, 3, 5, 14, 7, 0).unwrap();
        RequestWithService {
            id,
            user_id: 1,
            service_id: 1,
            service_name: Some("Блефаропластика".into()),
            name: "Анна".into(),
            phone: "+79991234567".into(),
            preferred_date: NaiveDate::from_ymd_opt(2024, 4, 1),
            comment: comment.map(str::to_string),
            status: RequestStatus::Contacted,
            created_at: created,
            updated_at: created,
        }
    }

    #[test]
    fn test_csv_layout() {
        let csv = requests_to_csv(&[request(7, Some("после 18:00"))]).unwrap();
        let mut lines = csv.lines();

        assert_eq!(
            lines.next(),
            Some("ID,Имя,Телефон,Услуга,Статус,Предпочтительная дата,Комментарий,Дата создания")
        );
        assert_eq!(
            lines.next(),
            Some("7,Анна,+79991234567,Блефаропластика,contacted,01.04.2024,после 18:00,05.03.2024 14:07")
        );
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn test_csv_quotes_commas_and_fills_blanks() {
        let mut row = request(8, Some("утром, до 10"));
        row.service_name = None;
        row.preferred_date = None;

        let csv = requests_to_csv(&[row]).unwrap();
        assert!(csv.contains("8,Анна,+79991234567,Unknown,contacted,,\"утром, до 10\",05.03.2024 14:07"));
    }

    #[test]
    fn test_export_file_name() {
        let now = Utc.with_ymd_and_hms(2024, 12, 31, 23, 59, 1).unwrap();
        assert_eq!(export_file_name(now), "requests_20241231_235901.csv");
    }
}
