//! # Harvest Configuration Module
//!
//! Provides configuration management for the channel harvest pipeline.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a
//! [`HarvestConfig`] holding the on-disk layout, provider credentials and the
//! tuning knobs of the scan loop and the enrichment job. Validation is
//! fail-fast: a structurally invalid configuration never starts a run.
//!
//! Credentials are optional at build time because only the `scrape` stage
//! needs them. Stages that do call [`HarvestConfig::require_telegram`], which
//! returns [`Error::CapabilityMissing`] when they are absent.
//!
//! ## Environment
//!
//! | Variable | Meaning | Default |
//! |----------|---------|---------|
//! | `HARVEST_DATA_DIR` | Root of the data tree | `data` |
//! | `HARVEST_DATABASE_PATH` | SQLite database file | `<data>/harvest.db` |
//! | `HARVEST_LOG_DIR` | Directory for the log file | `logs` |
//! | `TELEGRAM_API_ID` | Provider application id | required for scraping |
//! | `TELEGRAM_API_HASH` | Provider application hash | required for scraping |
//! | `TELEGRAM_SESSION` | Session name | `scraper.session` |
//! | `TELEGRAM_GATEWAY_URL` | Base URL of the provider gateway | required for scraping |
//! | `HARVEST_DETECTOR_URL` | Object detection endpoint | required for enrichment |
//! | `HARVEST_MIN_IMAGE_BYTES` | Smallest image considered valid | `500` |
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::HarvestConfig;
//!
//! let config = HarvestConfig::builder()
//!     .data_dir("/srv/harvest/data")
//!     .gateway_url("http://127.0.0.1:8081")
//!     .build()?;
//!
//! let credentials = config.require_telegram()?;
//! ```

use crate::error::{Error, Result};
use crate::logging::redact_if_sensitive;
use std::path::PathBuf;
use std::time::Duration;

pub const ENV_DATA_DIR: &str = "HARVEST_DATA_DIR";
pub const ENV_DATABASE_PATH: &str = "HARVEST_DATABASE_PATH";
pub const ENV_LOG_DIR: &str = "HARVEST_LOG_DIR";
pub const ENV_API_ID: &str = "TELEGRAM_API_ID";
pub const ENV_API_HASH: &str = "TELEGRAM_API_HASH";
pub const ENV_SESSION: &str = "TELEGRAM_SESSION";
pub const ENV_GATEWAY_URL: &str = "TELEGRAM_GATEWAY_URL";
pub const ENV_DETECTOR_URL: &str = "HARVEST_DETECTOR_URL";
pub const ENV_MIN_IMAGE_BYTES: &str = "HARVEST_MIN_IMAGE_BYTES";

const DEFAULT_SESSION: &str = "scraper.session";

/// Provider credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct TelegramCredentials {
    pub api_id: i64,
    pub api_hash: String,
    pub session: String,
}

impl std::fmt::Debug for TelegramCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramCredentials")
            .field("api_id", &self.api_id)
            .field("api_hash", &redact_if_sensitive("api_hash", &self.api_hash))
            .field("session", &self.session)
            .finish()
    }
}

/// Scan loop tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanSettings {
    /// Messages requested per page
    pub page_size: u32,
    /// Pause after every `courtesy_every` persisted items (0 disables)
    pub courtesy_every: usize,
    pub courtesy_pause: Duration,
    /// Attempts for transient failures (rate-limit waits are not counted)
    pub max_attempts: u32,
    /// First backoff delay, doubled after every failed attempt
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Added on top of every provider-requested wait
    pub rate_limit_margin: Duration,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            page_size: 100,
            courtesy_every: 50,
            courtesy_pause: Duration::from_millis(300),
            max_attempts: 4,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
            rate_limit_margin: Duration::from_secs(1),
        }
    }
}

impl ScanSettings {
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_courtesy(mut self, every: usize, pause: Duration) -> Self {
        self.courtesy_every = every;
        self.courtesy_pause = pause;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_backoff(mut self, base_delay: Duration, max_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self.max_delay = max_delay;
        self
    }

    pub fn with_rate_limit_margin(mut self, margin: Duration) -> Self {
        self.rate_limit_margin = margin;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 || self.page_size > 100 {
            return Err(Error::Config(
                "Page size must be between 1 and 100".to_string(),
            ));
        }

        if self.max_attempts == 0 {
            return Err(Error::Config(
                "Retry attempts must be greater than 0".to_string(),
            ));
        }

        if self.base_delay > self.max_delay {
            return Err(Error::Config(
                "Base retry delay cannot exceed the maximum delay".to_string(),
            ));
        }

        Ok(())
    }
}

/// Detection collaborator settings.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorSettings {
    pub endpoint: Option<String>,
    /// Inference image size passed to the model
    pub image_size: u32,
    /// Minimum confidence passed to the model
    pub confidence: f32,
    /// Files smaller than this are treated as truncated downloads
    pub min_image_bytes: u64,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            endpoint: None,
            image_size: 640,
            confidence: 0.35,
            min_image_bytes: 500,
        }
    }
}

impl DetectorSettings {
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_min_image_bytes(mut self, bytes: u64) -> Self {
        self.min_image_bytes = bytes;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(Error::Config(
                "Detector confidence must be within [0, 1]".to_string(),
            ));
        }

        if self.image_size == 0 {
            return Err(Error::Config(
                "Detector image size must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Top-level configuration.
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    /// Root of the data tree; raw records live under `<data_dir>/raw`
    pub data_dir: PathBuf,

    /// SQLite database used by the loader and the enrichment job
    pub database_path: PathBuf,

    /// Directory holding `harvest.log`
    pub log_dir: PathBuf,

    pub telegram: Option<TelegramCredentials>,

    /// Base URL of the provider gateway
    pub gateway_url: Option<String>,

    pub scan: ScanSettings,

    pub detector: DetectorSettings,
}

impl HarvestConfig {
    /// Creates a new builder for constructing a `HarvestConfig`.
    pub fn builder() -> HarvestConfigBuilder {
        HarvestConfigBuilder::default()
    }

    /// Builds a configuration from process environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let mut builder = Self::builder();

        if let Some(dir) = get(ENV_DATA_DIR) {
            builder = builder.data_dir(dir);
        }
        if let Some(path) = get(ENV_DATABASE_PATH) {
            builder = builder.database_path(path);
        }
        if let Some(dir) = get(ENV_LOG_DIR) {
            builder = builder.log_dir(dir);
        }
        if let Some(url) = get(ENV_GATEWAY_URL) {
            builder = builder.gateway_url(url);
        }

        match (get(ENV_API_ID), get(ENV_API_HASH)) {
            (Some(api_id), Some(api_hash)) => {
                let api_id = api_id.trim().parse::<i64>().map_err(|_| {
                    Error::Config(format!("{} must be an integer", ENV_API_ID))
                })?;
                let session = get(ENV_SESSION).unwrap_or_else(|| DEFAULT_SESSION.to_string());
                builder = builder.telegram(TelegramCredentials {
                    api_id,
                    api_hash,
                    session,
                });
            }
            (None, None) => {}
            _ => {
                return Err(Error::Config(format!(
                    "{} and {} must be set together",
                    ENV_API_ID, ENV_API_HASH
                )))
            }
        }

        let mut detector = DetectorSettings::default();
        if let Some(url) = get(ENV_DETECTOR_URL) {
            detector = detector.with_endpoint(url);
        }
        if let Some(bytes) = get(ENV_MIN_IMAGE_BYTES) {
            let bytes = bytes.trim().parse::<u64>().map_err(|_| {
                Error::Config(format!("{} must be a byte count", ENV_MIN_IMAGE_BYTES))
            })?;
            detector = detector.with_min_image_bytes(bytes);
        }

        builder.detector(detector).build()
    }

    /// Validates the configuration and returns an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.data_dir.as_os_str().is_empty() {
            return Err(Error::Config("Data directory cannot be empty".to_string()));
        }

        if self.database_path.as_os_str().is_empty() {
            return Err(Error::Config("Database path cannot be empty".to_string()));
        }

        if let Some(credentials) = &self.telegram {
            if credentials.api_id <= 0 || credentials.api_hash.trim().is_empty() {
                return Err(Error::Config(format!(
                    "{} and {} must be non-empty",
                    ENV_API_ID, ENV_API_HASH
                )));
            }
        }

        if let Some(url) = &self.gateway_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(Error::Config(format!(
                    "Gateway URL must be http(s): {}",
                    url
                )));
            }
        }

        self.scan.validate()?;
        self.detector.validate()?;

        Ok(())
    }

    /// Root of raw records (`<data_dir>/raw`)
    pub fn raw_dir(&self) -> PathBuf {
        self.data_dir.join("raw")
    }

    pub fn log_file(&self) -> PathBuf {
        self.log_dir.join("harvest.log")
    }

    /// Credentials required by the scrape stage.
    pub fn require_telegram(&self) -> Result<&TelegramCredentials> {
        self.telegram
            .as_ref()
            .ok_or_else(|| Error::CapabilityMissing {
                capability: "TelegramCredentials".to_string(),
                message: format!(
                    "Set {} and {} in the environment or a .env file",
                    ENV_API_ID, ENV_API_HASH
                ),
            })
    }

    pub fn require_gateway_url(&self) -> Result<&str> {
        self.gateway_url
            .as_deref()
            .ok_or_else(|| Error::CapabilityMissing {
                capability: "FeedSession".to_string(),
                message: format!("Set {} to the provider gateway base URL", ENV_GATEWAY_URL),
            })
    }

    pub fn require_detector_endpoint(&self) -> Result<&str> {
        self.detector
            .endpoint
            .as_deref()
            .ok_or_else(|| Error::CapabilityMissing {
                capability: "ObjectDetector".to_string(),
                message: format!("Set {} to the detection endpoint", ENV_DETECTOR_URL),
            })
    }
}

/// Builder for [`HarvestConfig`].
#[derive(Debug, Default)]
pub struct HarvestConfigBuilder {
    data_dir: Option<PathBuf>,
    database_path: Option<PathBuf>,
    log_dir: Option<PathBuf>,
    telegram: Option<TelegramCredentials>,
    gateway_url: Option<String>,
    scan: Option<ScanSettings>,
    detector: Option<DetectorSettings>,
}

impl HarvestConfigBuilder {
    /// Sets the data root. Default: `data`
    pub fn data_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.data_dir = Some(path.into());
        self
    }

    /// Sets the database path. Default: `<data_dir>/harvest.db`
    pub fn database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.database_path = Some(path.into());
        self
    }

    /// Sets the log directory. Default: `logs`
    pub fn log_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.log_dir = Some(path.into());
        self
    }

    pub fn telegram(mut self, credentials: TelegramCredentials) -> Self {
        self.telegram = Some(credentials);
        self
    }

    pub fn gateway_url(mut self, url: impl Into<String>) -> Self {
        self.gateway_url = Some(url.into().trim_end_matches('/').to_string());
        self
    }

    pub fn scan(mut self, settings: ScanSettings) -> Self {
        self.scan = Some(settings);
        self
    }

    pub fn detector(mut self, settings: DetectorSettings) -> Self {
        self.detector = Some(settings);
        self
    }

    /// Builds and validates the final configuration.
    pub fn build(self) -> Result<HarvestConfig> {
        let data_dir = self.data_dir.unwrap_or_else(|| PathBuf::from("data"));
        let database_path = self
            .database_path
            .unwrap_or_else(|| data_dir.join("harvest.db"));

        let config = HarvestConfig {
            data_dir,
            database_path,
            log_dir: self.log_dir.unwrap_or_else(|| PathBuf::from("logs")),
            telegram: self.telegram,
            gateway_url: self.gateway_url,
            scan: self.scan.unwrap_or_default(),
            detector: self.detector.unwrap_or_default(),
        };

        config.validate()?;

        Ok(config)
    }
}
