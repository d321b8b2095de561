use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use tracing::info;

use clinic_assistant::admin::{serve, AppState};
use clinic_assistant::config::Settings;
use clinic_assistant::db::init_database_schema;
use clinic_assistant::logging::init_tracing;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::from_env().context("Failed to load configuration")?;
    init_tracing(&settings.log_level, settings.log_format);

    info!(clinic = %settings.clinic.name, "Starting admin API");

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&settings.database_url)
        .await
        .context("Failed to connect to database")?;

    init_database_schema(&pool).await?;

    serve(&settings.admin_bind, AppState::new(pool))
        .await
        .with_context(|| format!("Admin API failed on {}", settings.admin_bind))?;

    Ok(())
}
