//! # Core Ingest Module
//!
//! Incremental channel ingestion engine.
//!
//! ## Overview
//!
//! This crate turns a list of channels into an append-only on-disk record:
//!
//! - [`dedup`] - ids already persisted for a channel
//! - [`retry`] - rate-limit aware retry with exponential backoff
//! - [`scan`] - per-channel scan loop with date filtering and early exit
//! - [`media`] - best-effort image retrieval with collision-safe naming
//! - [`coordinator`] - multi-channel runs and the run manifest
//!
//! All remote access goes through a [`FeedSession`](bridge_traits::FeedSession)
//! handle created once per run by the host and passed in explicitly.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_ingest::{ChannelScanner, DataLayout, RunCoordinator, ScanOptions};
//!
//! let scanner = ChannelScanner::new(session, DataLayout::new("data/raw"), &config.scan);
//! let outcome = RunCoordinator::new(scanner)
//!     .run(&channels, &ScanOptions::default().incremental(true))
//!     .await?;
//! ```

pub mod coordinator;
pub mod cursor;
pub mod dedup;
pub mod error;
pub mod item_log;
pub mod layout;
pub mod manifest;
pub mod media;
pub mod retry;
pub mod scan;
pub mod sidecar;

pub use coordinator::{RunCoordinator, RunOutcome};
pub use dedup::DedupIndex;
pub use error::{IngestError, Result, ScanError};
pub use item_log::SkipReason;
pub use layout::{sanitize_filename, DataLayout};
pub use manifest::{ChannelResult, ChannelStatus, RunManifest};
pub use media::MediaFetcher;
pub use retry::{RetryExecutor, RetryExhausted, RetryPolicy};
pub use scan::{ChannelScanner, ScanOptions, ScanReport};
pub use sidecar::{AssetIndex, AssetRecord};
