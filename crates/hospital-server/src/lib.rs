//! Hospital records API server.
//!
//! - [`cache`]: response cache over a local or Redis store
//! - [`handlers`]: HTTP handlers for patients, visits, prescriptions and reports
//! - [`middleware`]: authentication, request ids, metrics and error envelopes
//! - [`server`]: router assembly and lifecycle

pub mod bootstrap;
pub mod cache;
pub mod config;
pub mod extract;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod observability;
pub mod server;

pub use crate::config::AppConfig;
pub use observability::{init_tracing, shutdown_tracing};
pub use server::{AppState, HospitalServer, ServerBuilder, build_app};

use anyhow::Context;
use crate::config::{StorageBackend, StorageConfig};
use hospital_storage::DynStorage;

/// Opens the storage backend named in the configuration.
pub async fn create_storage(config: &StorageConfig) -> anyhow::Result<DynStorage> {
    match config.backend {
        StorageBackend::Memory => {
            tracing::info!("Using in-memory storage");
            Ok(hospital_db_memory::create_storage())
        }
        StorageBackend::Postgres => {
            tracing::info!("Connecting to PostgreSQL");
            let storage = hospital_db_postgres::create_storage(&config.postgres)
                .await
                .context("failed to open PostgreSQL storage")?;
            Ok(storage)
        }
    }
}
