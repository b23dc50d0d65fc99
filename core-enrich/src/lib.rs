//! # Detection Enrichment
//!
//! Turns downloaded images into stored object-detection records.
//!
//! ## Modules
//!
//! - [`validation`]: cheap checks that an asset is a real image
//! - [`detector`]: [`HttpDetector`], an [`ObjectDetector`](bridge_traits::ObjectDetector)
//!   backed by a remote inference endpoint
//! - [`enrichment_job`]: the batch job that maps assets to items through the
//!   asset sidecar and writes detection records idempotently

pub mod detector;
pub mod enrichment_job;
pub mod error;
pub mod validation;

pub use detector::HttpDetector;
pub use enrichment_job::{EnrichmentJob, EnrichmentSummary, SkipReason, DEFAULT_MIN_IMAGE_BYTES};
pub use error::{EnrichError, Result};
pub use validation::{validate_image, InvalidImage};
