//! Repository traits and their SQLite implementations.
//!
//! Every write is an idempotent insert: a row whose unique key already exists
//! is left untouched and reported as not inserted.

pub mod detection;
pub mod raw_message;

pub use detection::{DetectionRepository, SqliteDetectionRepository};
pub use raw_message::{RawMessageRepository, SqliteRawMessageRepository};
