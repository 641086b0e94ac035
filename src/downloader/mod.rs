//! Core downloader implementation split into focused submodules.
//!
//! The `ChapterDownloader` struct and its methods are organized by domain:
//! - [`queue`] - Job queue: enqueueing, statistics, reported harvests
//! - [`queue_processor`] - Dispatch into worker slots and per-job processing
//! - [`config_ops`] - Runtime settings updates
//! - [`lifecycle`] - Idle waiting and shutdown coordination
//! - [`commands`] - Serialized command surface

mod commands;
mod config_ops;
mod lifecycle;
mod queue;
mod queue_processor;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

pub use commands::{Command, CommandResponse};

use crate::archive::ArchiveAssembler;
use crate::auxiliary::AuxiliaryContextManager;
use crate::config::Settings;
use crate::context::{AuxiliaryContextFactory, ContextFactory, RenderingContext};
use crate::error::{Error, Result};
use crate::pipeline::DownloadPipeline;
use crate::transfer::{AssetFetcher, BlobSink, FsSink, HttpFetcher};
use crate::types::{Asset, Event, Job, JobId, JobOutcome};
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

/// External collaborators the downloader drives
#[derive(Clone)]
pub struct Collaborators {
    /// Opens a rendering context per dispatched job
    pub contexts: Arc<dyn ContextFactory>,
    /// Transfers asset bytes
    pub fetcher: Arc<dyn AssetFetcher>,
    /// Persists files, archives and documents
    pub sink: Arc<dyn BlobSink>,
    /// Creates the document renderer on first use
    pub auxiliary: Arc<dyn AuxiliaryContextFactory>,
}

impl Collaborators {
    /// Bundled HTTP fetcher and filesystem sink rooted at `output_root`
    pub fn with_http(
        contexts: Arc<dyn ContextFactory>,
        auxiliary: Arc<dyn AuxiliaryContextFactory>,
        output_root: impl Into<PathBuf>,
        settings: &Settings,
    ) -> Result<Self> {
        Ok(Self {
            contexts,
            fetcher: Arc::new(HttpFetcher::new(settings.request_timeout)?),
            sink: Arc::new(FsSink::new(output_root)),
            auxiliary,
        })
    }
}

/// How a queued job obtains its assets
pub(crate) enum ContextSource {
    /// Open a new rendering context and close it afterwards
    Fresh,
    /// Reuse a caller-owned context; never closed by the scheduler
    Active(Arc<dyn RenderingContext>),
    /// Wait for a `harvestComplete` command carrying the assets
    Reported(tokio::sync::oneshot::Receiver<Vec<Asset>>),
}

/// Internal struct representing a job waiting for a worker slot
pub(crate) struct QueuedJob {
    pub(crate) id: JobId,
    pub(crate) job: Job,
    pub(crate) source: ContextSource,
    pub(crate) result_tx: tokio::sync::oneshot::Sender<JobOutcome>,
}

/// Queue and worker-slot state, guarded by one mutex
///
/// Critical sections never await, so a blocking mutex is used.
#[derive(Default)]
pub(crate) struct SchedulerState {
    /// Jobs waiting for dispatch; the front is dispatched next
    pub(crate) queue: VecDeque<QueuedJob>,
    /// Jobs currently holding a worker slot
    pub(crate) active_workers: usize,
    /// Reported jobs still waiting for their harvest
    pub(crate) pending_reports: HashMap<JobId, tokio::sync::oneshot::Sender<Vec<Asset>>>,
}

/// Services used by workers
#[derive(Clone)]
pub(crate) struct Services {
    pub(crate) contexts: Arc<dyn ContextFactory>,
    pub(crate) pipeline: DownloadPipeline,
    pub(crate) assembler: ArchiveAssembler,
}

/// Main downloader instance (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct ChapterDownloader {
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: tokio::sync::broadcast::Sender<Event>,
    /// Current settings; replaced wholesale on update
    pub(crate) settings: Arc<RwLock<Arc<Settings>>>,
    /// Queue and worker-slot state
    pub(crate) scheduler: Arc<Mutex<SchedulerState>>,
    /// Signalled whenever the queue drains and the last worker finishes
    pub(crate) idle: Arc<tokio::sync::Notify>,
    /// Next job ID
    pub(crate) next_id: Arc<AtomicU64>,
    /// Flag to indicate whether new jobs are accepted (set to false during shutdown)
    pub(crate) accepting_new: Arc<AtomicBool>,
    /// Worker services
    pub(crate) services: Services,
}

impl ChapterDownloader {
    /// Create a new ChapterDownloader instance
    ///
    /// Settings are validated first. Nothing runs until jobs are enqueued.
    pub fn new(settings: Settings, collaborators: Collaborators) -> Result<Self> {
        settings.validate()?;

        // Large enough that a UI subscriber lagging behind a big batch still catches up
        let (event_tx, _rx) = tokio::sync::broadcast::channel(1000);

        let auxiliary = AuxiliaryContextManager::new(collaborators.auxiliary);
        let pipeline = DownloadPipeline::new(
            collaborators.fetcher.clone(),
            collaborators.sink.clone(),
            event_tx.clone(),
        );
        let assembler = ArchiveAssembler::new(
            collaborators.fetcher,
            collaborators.sink,
            auxiliary,
            event_tx.clone(),
        );

        tracing::info!(
            output_mode = ?settings.output_mode,
            concurrency_limit = settings.concurrency_limit,
            per_asset_concurrency_limit = settings.per_asset_concurrency_limit,
            "Chapter downloader initialized"
        );

        Ok(Self {
            event_tx,
            settings: Arc::new(RwLock::new(Arc::new(settings))),
            scheduler: Arc::new(Mutex::new(SchedulerState::default())),
            idle: Arc::new(tokio::sync::Notify::new()),
            next_id: Arc::new(AtomicU64::new(1)),
            accepting_new: Arc::new(AtomicBool::new(true)),
            services: Services {
                contexts: collaborators.contexts,
                pipeline,
                assembler,
            },
        })
    }

    /// Subscribe to job events
    ///
    /// Multiple subscribers are supported. Each subscriber receives all events independently.
    /// A subscriber that falls more than 1000 events behind receives `RecvError::Lagged`.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// With no active subscribers the event is dropped.
    pub(crate) fn emit_event(&self, event: Event) {
        self.event_tx.send(event).ok();
    }

    /// Lock the scheduler state
    ///
    /// No critical section can leave the state half-updated, so a poisoned
    /// lock is recovered rather than propagated.
    pub(crate) fn lock_scheduler(&self) -> MutexGuard<'_, SchedulerState> {
        self.scheduler.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn ensure_accepting(&self) -> Result<()> {
        if self.accepting_new.load(std::sync::atomic::Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::ShuttingDown)
        }
    }
}
