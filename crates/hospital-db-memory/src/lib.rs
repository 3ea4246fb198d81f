//! In-memory storage backend for the hospital API.
//!
//! This crate provides an in-memory implementation of the `HospitalStorage`
//! trait from `hospital-storage`. All tables sit behind a single
//! `tokio::sync::RwLock`, so cascading deletes are atomic.
//!
//! # Example
//!
//! ```ignore
//! use hospital_db_memory::InMemoryStorage;
//! use hospital_storage::{HospitalStorage, NewPatient};
//!
//! let storage = InMemoryStorage::new();
//! let patient = storage
//!     .create_patient(NewPatient {
//!         name: "Alice Johnson".into(),
//!         age: 30,
//!         contact_info: "alice@example.com".into(),
//!     })
//!     .await?;
//! ```

pub mod storage;

pub use hospital_storage::{DynStorage, HospitalStorage, StorageError};
pub use storage::{InMemoryStorage, StorageStats};

/// Creates a new shareable in-memory storage instance.
pub fn create_storage() -> DynStorage {
    std::sync::Arc::new(InMemoryStorage::new())
}
