//! # Admin API
//!
//! JSON views over consultation requests and services for clinic staff,
//! served by the `clinic_admin` binary.

pub mod error;
pub mod export;
pub mod handlers;
pub mod router;

use std::sync::Arc;
use std::time::Instant;

use sqlx::postgres::PgPool;

pub use error::ApiError;
pub use export::{export_requests_csv_to_path, requests_to_csv};
pub use router::{create_router, serve};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    started_at: Arc<Instant>,
}

impl AppState {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            started_at: Arc::new(Instant::now()),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
