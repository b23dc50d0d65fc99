//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure shared by the harvest crates:
//! - Logging and tracing infrastructure
//! - Configuration management (builder, environment loading, validation)
//! - Channel list parsing
//!
//! ## Overview
//!
//! Nothing in this crate talks to the network or the database. It establishes
//! the logging conventions and the fail-fast configuration checks every entry
//! point runs before doing any work.

pub mod channels;
pub mod config;
pub mod error;
pub mod logging;

pub use error::{Error, Result};
