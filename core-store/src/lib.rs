//! # Harvest Store
//!
//! SQLite persistence for raw feed items and image detections.
//!
//! ## Overview
//!
//! - [`db`]: pool creation with embedded migrations
//! - [`repositories`]: idempotent inserts keyed on the natural unique keys
//! - [`loader`]: bulk load of the on-disk item log
//!
//! Both tables use `INSERT ... ON CONFLICT DO NOTHING`, so a re-run of any
//! stage is a no-op for rows it already wrote.

pub mod db;
pub mod error;
pub mod loader;
pub mod models;
pub mod repositories;

pub use db::{create_pool, create_test_pool, DatabaseConfig};
pub use error::{Result, StoreError};
pub use loader::{LoadSummary, RawMessageLoader};
pub use models::{DetectionRecord, RawMessage};
pub use repositories::{
    DetectionRepository, RawMessageRepository, SqliteDetectionRepository,
    SqliteRawMessageRepository,
};
