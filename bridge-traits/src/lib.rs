//! # Host Bridge Traits
//!
//! Collaborator contracts the ingestion and enrichment engines depend on.
//!
//! ## Overview
//!
//! This crate defines the boundary between the core crates and everything that
//! lives outside them: the remote channel provider, the HTTP transport used to
//! reach it, the object-detection model and the wall clock. Each trait
//! represents a capability the core requires but does not implement itself.
//!
//! ## Traits
//!
//! ### Networking
//! - [`HttpClient`](http::HttpClient) - Single-attempt async HTTP
//! - [`FeedSession`](feed::FeedSession) - Authenticated channel provider session
//!
//! ### Enrichment
//! - [`ObjectDetector`](detection::ObjectDetector) - Image to bounding boxes
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//!
//! ## Error Handling
//!
//! All bridge traits use the [`BridgeError`](error::BridgeError) type. The
//! variants encode how a caller should react:
//!
//! | Variant | Reaction |
//! |---------|----------|
//! | `RateLimited` | Wait the requested time, then repeat the call |
//! | `OperationFailed`, `Io` | Bounded retry with backoff |
//! | `NotFound`, `Rejected`, `InvalidResponse` | Give up on this call |
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` bounds so handles can be shared as
//! `Arc<dyn Trait>` across async tasks.

pub mod detection;
pub mod error;
pub mod feed;
pub mod http;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use detection::{Detection, ObjectDetector};
pub use feed::{ChannelInfo, FeedMessage, FeedPage, FeedSession, MediaDescriptor};
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
pub use time::{Clock, FixedClock, LogLevel, SystemClock};
