//! Configuration types for chapter-dl

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// How harvested assets are packaged
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    /// One file per asset under `<parent>/<unit>/`
    #[default]
    IndividualFiles,
    /// One `.zip` per unit
    ZipArchive,
    /// One `.cbz` per unit (zip with comic metadata)
    ComicArchive,
    /// One `.pdf` per unit, rendered through the auxiliary context
    PdfDocument,
}

impl OutputMode {
    /// Whether assets are batched into a single artifact per unit
    pub fn is_batched(&self) -> bool {
        !matches!(self, OutputMode::IndividualFiles)
    }

    /// File extension of the per-unit artifact (None for individual files)
    pub fn artifact_extension(&self) -> Option<&'static str> {
        match self {
            OutputMode::IndividualFiles => None,
            OutputMode::ZipArchive => Some("zip"),
            OutputMode::ComicArchive => Some("cbz"),
            OutputMode::PdfDocument => Some("pdf"),
        }
    }
}

/// Process-wide settings
///
/// Loaded once at startup and refreshed whenever the backing file changes
/// (see [`SettingsWatcher`](crate::settings_watcher::SettingsWatcher)).
/// Every field has a default, so an empty JSON object is a valid settings file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Output packaging mode (default: individual files)
    #[serde(default)]
    pub output_mode: OutputMode,

    /// Maximum number of jobs processed at once (default: 3)
    #[serde(default = "default_concurrency_limit")]
    pub concurrency_limit: usize,

    /// Maximum concurrent asset transfers within one job (default: 5)
    #[serde(default = "default_per_asset_concurrency_limit")]
    pub per_asset_concurrency_limit: usize,

    /// Additional attempts after the first failed transfer (default: 3)
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Fixed delay between transfer attempts (default: 1000 ms)
    #[serde(
        rename = "retry_delay_ms",
        default = "default_retry_delay",
        with = "duration_ms_serde"
    )]
    pub retry_delay: Duration,

    /// Consecutive unchanged ticks before content is considered settled (default: 8)
    #[serde(default = "default_stability_ticks_required")]
    pub stability_ticks_required: u32,

    /// Readiness polling interval (default: 250 ms)
    #[serde(
        rename = "tick_interval_ms",
        default = "default_tick_interval",
        with = "duration_ms_serde"
    )]
    pub tick_interval: Duration,

    /// Deadline for a rendering context to produce content (default: 30 s)
    #[serde(
        rename = "overall_timeout_secs",
        default = "default_overall_timeout",
        with = "duration_serde"
    )]
    pub overall_timeout: Duration,

    /// Per-request timeout for the bundled HTTP fetcher (default: 60 s)
    #[serde(
        rename = "request_timeout_secs",
        default = "default_request_timeout",
        with = "duration_serde"
    )]
    pub request_timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            output_mode: OutputMode::default(),
            concurrency_limit: default_concurrency_limit(),
            per_asset_concurrency_limit: default_per_asset_concurrency_limit(),
            retry_attempts: default_retry_attempts(),
            retry_delay: default_retry_delay(),
            stability_ticks_required: default_stability_ticks_required(),
            tick_interval: default_tick_interval(),
            overall_timeout: default_overall_timeout(),
            request_timeout: default_request_timeout(),
        }
    }
}

impl Settings {
    /// Check that every value is usable by the scheduler
    pub fn validate(&self) -> Result<()> {
        if self.concurrency_limit == 0 {
            return Err(Error::config("concurrency_limit", "must be at least 1"));
        }
        if self.per_asset_concurrency_limit == 0 {
            return Err(Error::config(
                "per_asset_concurrency_limit",
                "must be at least 1",
            ));
        }
        if self.stability_ticks_required == 0 {
            return Err(Error::config(
                "stability_ticks_required",
                "must be at least 1",
            ));
        }
        if self.tick_interval.is_zero() {
            return Err(Error::config("tick_interval_ms", "must be greater than 0"));
        }
        if self.overall_timeout.is_zero() {
            return Err(Error::config(
                "overall_timeout_secs",
                "must be greater than 0",
            ));
        }
        Ok(())
    }

    /// Retry policy derived from these settings
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.retry_attempts,
            delay: self.retry_delay,
        }
    }

    /// Load settings from a JSON file
    ///
    /// A missing file yields the defaults. Missing keys fall back to their defaults.
    /// The result is validated before it is returned.
    pub fn load(path: &Path) -> Result<Self> {
        Self::from_read(path, std::fs::read_to_string(path))
    }

    /// [`Settings::load`] without blocking the async runtime
    pub async fn load_async(path: &Path) -> Result<Self> {
        Self::from_read(path, tokio::fs::read_to_string(path).await)
    }

    fn from_read(path: &Path, read: std::io::Result<String>) -> Result<Self> {
        let settings = match read {
            Ok(raw) => serde_json::from_str::<Settings>(&raw)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "settings file missing, using defaults");
                Settings::default()
            }
            Err(e) => return Err(Error::Io(e)),
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Write settings to a JSON file, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        self.validate()?;
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let raw = serde_json::to_string_pretty(self)?;
        std::fs::write(path, raw)?;
        Ok(())
    }
}

/// Fixed-delay retry policy for asset transfers
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Additional attempts after the first failure
    pub attempts: u32,
    /// Delay before each retry
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Settings::default().retry_policy()
    }
}

fn default_concurrency_limit() -> usize {
    3
}

fn default_per_asset_concurrency_limit() -> usize {
    5
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_delay() -> Duration {
    Duration::from_millis(1000)
}

fn default_stability_ticks_required() -> u32 {
    8
}

fn default_tick_interval() -> Duration {
    Duration::from_millis(250)
}

fn default_overall_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(60)
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Duration serialization helper (milliseconds)
mod duration_ms_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
