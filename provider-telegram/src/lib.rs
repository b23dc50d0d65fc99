//! # Telegram Gateway Provider
//!
//! Implements the `FeedSession` trait against an MTProto gateway's JSON API.
//!
//! ## Overview
//!
//! This module provides:
//! - Channel resolution (`GET /v1/channels/{channel}`)
//! - Newest-first paginated listing keyed by `offset_id`
//! - Media download per message
//! - Mapping of flood-wait responses to the rate-limit signal
//!
//! Credentials (`api_id`, `api_hash`, session name) travel as request headers.

pub mod connector;
pub mod error;
pub mod types;

pub use connector::TelegramGatewayConnector;
pub use error::{Result, TelegramError};
