//! Shared test helpers for creating ChapterDownloader instances in tests.

use crate::archive::DocumentRequest;
use crate::config::Settings;
use crate::context::{AuxiliaryContext, AuxiliaryContextFactory, ContextFactory, RenderingContext};
use crate::downloader::{ChapterDownloader, Collaborators};
use crate::error::{Error, Result};
use crate::transfer::{AssetFetcher, BlobSink, FetchedBytes};
use crate::types::{Asset, Job};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use url::Url;

/// Tracks how many contexts are open at once
#[derive(Default)]
pub(crate) struct ConcurrencyTracker {
    current: AtomicUsize,
    max: AtomicUsize,
}

impl ConcurrencyTracker {
    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    pub(crate) fn max(&self) -> usize {
        self.max.load(Ordering::SeqCst)
    }

    pub(crate) fn current(&self) -> usize {
        self.current.load(Ordering::SeqCst)
    }
}

/// Context that shows nothing until `loads_after` has passed, then every asset at once
pub(crate) struct ScriptedContext {
    assets: Vec<Asset>,
    total: Option<usize>,
    loads_after: Duration,
    opened_at: Instant,
    closed: AtomicBool,
    panics: bool,
    tracker: Option<Arc<ConcurrencyTracker>>,
}

impl ScriptedContext {
    pub(crate) fn new(assets: Vec<Asset>, loads_after: Duration) -> Self {
        Self {
            total: Some(assets.len()),
            assets,
            loads_after,
            opened_at: Instant::now(),
            closed: AtomicBool::new(false),
            panics: false,
            tracker: None,
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RenderingContext for ScriptedContext {
    async fn expected_total(&self) -> Result<Option<usize>> {
        Ok(self.total)
    }

    async fn loaded_assets(&self) -> Result<Vec<Asset>> {
        if self.panics {
            panic!("page script crashed");
        }
        if self.opened_at.elapsed() >= self.loads_after {
            Ok(self.assets.clone())
        } else {
            Ok(Vec::new())
        }
    }

    async fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::SeqCst)
            && let Some(tracker) = &self.tracker
        {
            tracker.leave();
        }
        Ok(())
    }
}

/// Inline page bytes for `unit`, listed out of order
pub(crate) fn unit_assets(unit: &str, count: usize) -> Vec<Asset> {
    (0..count)
        .rev()
        .map(|i| Asset::inline(i, format!("{unit}-{i}").into_bytes(), "image/png"))
        .collect()
}

/// Opens [`ScriptedContext`]s and records what it opened
///
/// Units named `empty*` never load anything, units named `broken*` fail to open
/// and units named `panicky*` panic the worker on the first page read.
pub(crate) struct ScriptedFactory {
    pub(crate) pages_per_unit: usize,
    pub(crate) loads_after: Duration,
    pub(crate) tracker: Arc<ConcurrencyTracker>,
    opened: Mutex<Vec<(String, Arc<ScriptedContext>)>>,
}

impl ScriptedFactory {
    pub(crate) fn new(pages_per_unit: usize, loads_after: Duration) -> Self {
        Self {
            pages_per_unit,
            loads_after,
            tracker: Arc::new(ConcurrencyTracker::default()),
            opened: Mutex::new(Vec::new()),
        }
    }

    /// Unit names in the order their contexts were opened
    pub(crate) fn open_order(&self) -> Vec<String> {
        self.opened
            .lock()
            .unwrap()
            .iter()
            .map(|(unit, _)| unit.clone())
            .collect()
    }

    pub(crate) fn contexts(&self) -> Vec<Arc<ScriptedContext>> {
        self.opened
            .lock()
            .unwrap()
            .iter()
            .map(|(_, ctx)| ctx.clone())
            .collect()
    }
}

#[async_trait]
impl ContextFactory for ScriptedFactory {
    async fn open(&self, job: &Job) -> Result<Arc<dyn RenderingContext>> {
        if job.unit_name.starts_with("broken") {
            return Err(Error::Context(format!(
                "could not load {}",
                job.source_location
            )));
        }
        let assets = if job.unit_name.starts_with("empty") {
            Vec::new()
        } else {
            unit_assets(&job.unit_name, self.pages_per_unit)
        };
        let mut context = ScriptedContext::new(assets, self.loads_after);
        context.tracker = Some(self.tracker.clone());
        context.panics = job.unit_name.starts_with("panicky");
        self.tracker.enter();

        let context = Arc::new(context);
        self.opened
            .lock()
            .unwrap()
            .push((job.unit_name.clone(), context.clone()));
        Ok(context)
    }
}

/// Serves `body-of-<path>` for every URL
#[derive(Default)]
pub(crate) struct MemoryFetcher {
    pub(crate) requests: AtomicUsize,
}

#[async_trait]
impl AssetFetcher for MemoryFetcher {
    async fn fetch(&self, url: &Url) -> Result<FetchedBytes> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        Ok(FetchedBytes {
            bytes: format!("body-of-{}", url.path()).into_bytes(),
            content_type: Some("image/jpeg".to_string()),
        })
    }
}

/// Keeps persisted blobs in memory, keyed by name
#[derive(Default)]
pub(crate) struct MemorySink {
    blobs: Mutex<BTreeMap<PathBuf, Vec<u8>>>,
}

impl MemorySink {
    pub(crate) fn names(&self) -> Vec<PathBuf> {
        self.blobs.lock().unwrap().keys().cloned().collect()
    }

    pub(crate) fn get(&self, name: &Path) -> Option<Vec<u8>> {
        self.blobs.lock().unwrap().get(name).cloned()
    }
}

#[async_trait]
impl BlobSink for MemorySink {
    async fn persist(&self, name: &Path, bytes: &[u8]) -> Result<PathBuf> {
        crate::utils::ensure_relative(name)?;
        self.blobs
            .lock()
            .unwrap()
            .insert(name.to_path_buf(), bytes.to_vec());
        Ok(name.to_path_buf())
    }
}

/// Renders every document as `PDF:<title>:<pages>`
pub(crate) struct StubRenderer;

#[async_trait]
impl AuxiliaryContext for StubRenderer {
    async fn render_document(&self, request: &DocumentRequest) -> Result<Vec<u8>> {
        Ok(format!("PDF:{}:{}", request.title, request.pages.len()).into_bytes())
    }
}

pub(crate) struct StubRendererFactory;

#[async_trait]
impl AuxiliaryContextFactory for StubRendererFactory {
    async fn create(&self) -> Result<Arc<dyn AuxiliaryContext>> {
        Ok(Arc::new(StubRenderer))
    }
}

/// Settings with short timings suited to a paused clock
pub(crate) fn test_settings() -> Settings {
    Settings {
        concurrency_limit: 2,
        tick_interval: Duration::from_millis(100),
        stability_ticks_required: 2,
        overall_timeout: Duration::from_secs(5),
        retry_delay: Duration::from_millis(10),
        ..Default::default()
    }
}

/// Handles to the fakes behind a test downloader
pub(crate) struct TestHarness {
    pub(crate) downloader: ChapterDownloader,
    pub(crate) contexts: Arc<ScriptedFactory>,
    pub(crate) fetcher: Arc<MemoryFetcher>,
    pub(crate) sink: Arc<MemorySink>,
}

/// Helper to create a test ChapterDownloader whose contexts load after 500ms
pub(crate) fn create_test_downloader(settings: Settings) -> TestHarness {
    create_test_downloader_with(settings, ScriptedFactory::new(3, Duration::from_millis(500)))
}

pub(crate) fn create_test_downloader_with(
    settings: Settings,
    contexts: ScriptedFactory,
) -> TestHarness {
    let contexts = Arc::new(contexts);
    let fetcher = Arc::new(MemoryFetcher::default());
    let sink = Arc::new(MemorySink::default());

    let downloader = ChapterDownloader::new(
        settings,
        Collaborators {
            contexts: contexts.clone(),
            fetcher: fetcher.clone(),
            sink: sink.clone(),
            auxiliary: Arc::new(StubRendererFactory),
        },
    )
    .unwrap();

    TestHarness {
        downloader,
        contexts,
        fetcher,
        sink,
    }
}

/// Job for `unit` in the series "Series"
pub(crate) fn job(unit: &str) -> Job {
    let source = Url::parse(&format!("https://reader.example/series/{unit}")).unwrap();
    Job::new(source, unit, "Series")
}
