//! Core types for chapter-dl

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use url::Url;

use crate::readiness::ReadyTrigger;
use crate::utils::{
    FALLBACK_COLLECTION_NAME, FALLBACK_UNIT_NAME, resolve_extension, sanitize_component,
};

/// Unique identifier for an enqueued job
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub u64);

impl JobId {
    /// Get the inner u64 value
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl From<u64> for JobId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One unit of work: a single chapter to render, harvest and package
///
/// Immutable once created. Enqueueing the same `Job` twice produces two
/// independent jobs with distinct [`JobId`]s.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    /// Where the chapter is rendered from
    pub source_location: Url,
    /// Chapter name
    pub unit_name: String,
    /// Series (manga) name
    pub parent_collection_name: String,
}

impl Job {
    /// Create a new job
    pub fn new(
        source_location: Url,
        unit_name: impl Into<String>,
        parent_collection_name: impl Into<String>,
    ) -> Self {
        Self {
            source_location,
            unit_name: unit_name.into(),
            parent_collection_name: parent_collection_name.into(),
        }
    }

    /// Filesystem-safe names used for every output of this job
    pub fn output_names(&self) -> OutputNames {
        OutputNames::new(&self.parent_collection_name, &self.unit_name)
    }
}

/// Sanitized collection/unit names used to build output paths
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutputNames {
    /// Sanitized series name
    pub collection: String,
    /// Sanitized chapter name
    pub unit: String,
}

impl OutputNames {
    /// Sanitize raw names, falling back to placeholders when nothing usable remains
    pub fn new(parent_collection_name: &str, unit_name: &str) -> Self {
        Self {
            collection: sanitize_component(parent_collection_name, FALLBACK_COLLECTION_NAME),
            unit: sanitize_component(unit_name, FALLBACK_UNIT_NAME),
        }
    }

    /// `<collection> - <unit>.<extension>`
    pub fn artifact_file_name(&self, extension: &str) -> String {
        format!("{} - {}.{}", self.collection, self.unit, extension)
    }

    /// `<collection>/<unit>`
    pub fn unit_dir(&self) -> PathBuf {
        PathBuf::from(&self.collection).join(&self.unit)
    }
}

/// Where an asset's bytes come from
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetData {
    /// Bytes must be fetched from this location
    Location(Url),
    /// Bytes were captured inside the rendering context
    Bytes(Vec<u8>),
}

impl AssetData {
    /// Human-readable description for logs and errors
    pub fn describe(&self) -> String {
        match self {
            AssetData::Location(url) => url.to_string(),
            AssetData::Bytes(bytes) => format!("<{} inline bytes>", bytes.len()),
        }
    }
}

/// One harvested page image
///
/// `index` is the 0-based load order on the page and decides the page number
/// in every output, regardless of fetch completion order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    /// 0-based position on the page
    pub index: usize,
    /// Location or captured bytes
    pub data: AssetData,
    /// MIME type reported by the page, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_hint: Option<String>,
}

impl Asset {
    /// Asset whose bytes live at a URL
    pub fn located(index: usize, url: Url) -> Self {
        Self {
            index,
            data: AssetData::Location(url),
            mime_hint: None,
        }
    }

    /// Asset whose bytes were captured in the rendering context
    pub fn inline(index: usize, bytes: Vec<u8>, mime: impl Into<String>) -> Self {
        Self {
            index,
            data: AssetData::Bytes(bytes),
            mime_hint: Some(mime.into()),
        }
    }

    /// Set the MIME hint
    pub fn with_mime_hint(mut self, mime: impl Into<String>) -> Self {
        self.mime_hint = Some(mime.into());
        self
    }
}

/// Asset bytes after transfer
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchedAsset {
    /// Original asset index
    pub index: usize,
    /// Asset content
    pub bytes: Vec<u8>,
    /// Content type reported by the transfer
    pub content_type: Option<String>,
    /// MIME type the rendering context reported for the asset
    pub mime_hint: Option<String>,
}

impl FetchedAsset {
    /// File extension: the transfer's content type if usable, else the hint, else `png`
    pub fn extension(&self) -> String {
        resolve_extension([self.content_type.as_deref(), self.mime_hint.as_deref()])
    }
}

/// What a completed job produced
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobOutput {
    /// Assets persisted successfully
    pub assets_saved: usize,
    /// Assets dropped after retries were exhausted (individual-file mode only)
    pub assets_failed: usize,
    /// Archive/document location; `None` in individual-file mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<PathBuf>,
}

/// Terminal state of a job
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobOutcome {
    /// Job produced output
    Completed(JobOutput),
    /// Rendering never produced content before the deadline
    Abandoned {
        /// Why the job was abandoned
        reason: String,
    },
    /// Job failed (context error, harvest error, archive abort)
    Failed {
        /// Error message
        error: String,
        /// Machine-readable error code
        code: String,
    },
}

impl JobOutcome {
    /// Whether the job produced output
    pub fn is_completed(&self) -> bool {
        matches!(self, JobOutcome::Completed(_))
    }
}

/// Handle returned for each enqueued job, resolving to its outcome
#[derive(Debug)]
pub struct JobHandle {
    id: JobId,
    rx: tokio::sync::oneshot::Receiver<JobOutcome>,
}

impl JobHandle {
    pub(crate) fn new(id: JobId, rx: tokio::sync::oneshot::Receiver<JobOutcome>) -> Self {
        Self { id, rx }
    }

    /// Identifier assigned at enqueue time
    pub fn id(&self) -> JobId {
        self.id
    }

    /// Wait for the job to finish
    pub async fn outcome(self) -> JobOutcome {
        match self.rx.await {
            Ok(outcome) => outcome,
            Err(_) => JobOutcome::Failed {
                error: "worker dropped before reporting an outcome".to_string(),
                code: "worker_dropped".to_string(),
            },
        }
    }
}

/// Snapshot of scheduler occupancy
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    /// Jobs waiting for a worker slot
    pub queued: usize,
    /// Jobs currently being processed
    pub active: usize,
    /// Current worker limit
    pub concurrency_limit: usize,
}

/// Event emitted during job processing
///
/// Subscribe with [`ChapterDownloader::subscribe`](crate::ChapterDownloader::subscribe).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Job added to the queue
    JobQueued {
        /// Job ID
        id: JobId,
        /// Chapter name
        unit: String,
    },

    /// Job admitted into a worker slot
    JobStarted {
        /// Job ID
        id: JobId,
    },

    /// Rendering context settled
    JobReady {
        /// Job ID
        id: JobId,
        /// Items loaded when readiness was declared
        loaded: usize,
        /// Which condition declared readiness
        trigger: ReadyTrigger,
    },

    /// Rendering produced nothing before the deadline
    JobAbandoned {
        /// Job ID
        id: JobId,
        /// Reason for abandonment
        reason: String,
    },

    /// Job failed
    JobFailed {
        /// Job ID
        id: JobId,
        /// Error message
        error: String,
    },

    /// Job finished with output
    JobComplete {
        /// Job ID
        id: JobId,
        /// What the job produced
        output: JobOutput,
    },

    /// One asset persisted
    AssetSaved {
        /// Owning job, if any
        #[serde(skip_serializing_if = "Option::is_none")]
        job: Option<JobId>,
        /// Destination path
        path: PathBuf,
    },

    /// One asset dropped after all attempts
    AssetFailed {
        /// Owning job, if any
        #[serde(skip_serializing_if = "Option::is_none")]
        job: Option<JobId>,
        /// Intended destination path
        path: PathBuf,
        /// Last error
        error: String,
    },

    /// Archive or document persisted
    ArtifactSaved {
        /// Owning job, if any
        #[serde(skip_serializing_if = "Option::is_none")]
        job: Option<JobId>,
        /// Destination path
        path: PathBuf,
    },

    /// Settings were replaced at runtime
    SettingsChanged,

    /// Queue empty and no worker active
    QueueDrained,
}
