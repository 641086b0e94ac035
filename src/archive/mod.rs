//! Archive assembly for batched output modes
//!
//! Fetches every asset of a unit, orders the results by asset index and
//! packages them as a zip, a cbz, or a document rendered through the
//! auxiliary context. A single failed fetch aborts the whole unit and nothing
//! is persisted.

mod document;
mod zip;

pub use document::{
    DocumentPage, DocumentRequest, PageSize, Placement, fit_to_page, image_dimensions,
    layout_document,
};
pub use self::zip::{COMIC_INFO_ENTRY, ComicMetadata, PageFile, ZipCodec};

use crate::auxiliary::AuxiliaryContextManager;
use crate::config::{OutputMode, RetryPolicy};
use crate::error::{Error, Result};
use crate::retry::download_with_retry;
use crate::transfer::{AssetFetcher, BlobSink, resolve_asset_data};
use crate::types::{Asset, Event, FetchedAsset, JobId, OutputNames};
use crate::utils::page_file_name;
use futures::{StreamExt, TryStreamExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast;

/// A persisted archive or document
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Artifact {
    /// Location reported by the sink
    pub path: PathBuf,
    /// Pages written
    pub pages: usize,
}

/// Builds per-unit archives and documents
#[derive(Clone)]
pub struct ArchiveAssembler {
    fetcher: Arc<dyn AssetFetcher>,
    sink: Arc<dyn BlobSink>,
    auxiliary: AuxiliaryContextManager,
    event_tx: broadcast::Sender<Event>,
}

impl ArchiveAssembler {
    /// Create an assembler
    pub fn new(
        fetcher: Arc<dyn AssetFetcher>,
        sink: Arc<dyn BlobSink>,
        auxiliary: AuxiliaryContextManager,
        event_tx: broadcast::Sender<Event>,
    ) -> Self {
        Self {
            fetcher,
            sink,
            auxiliary,
            event_tx,
        }
    }

    /// Fetch every asset, at most `concurrency` at a time, each retried per `policy`
    ///
    /// The result is sorted by asset index no matter which fetch finished
    /// first. The first failure cancels the remaining fetches.
    pub async fn fetch_all(
        &self,
        assets: Vec<Asset>,
        concurrency: usize,
        policy: RetryPolicy,
    ) -> Result<Vec<FetchedAsset>> {
        let fetcher = &*self.fetcher;
        let policy = &policy;

        let mut fetched: Vec<FetchedAsset> = futures::stream::iter(assets)
            .map(|asset| async move {
                let fetched = download_with_retry(policy, || {
                    resolve_asset_data(fetcher, &asset.data, asset.mime_hint.as_deref())
                })
                .await?;
                Ok::<_, Error>(FetchedAsset {
                    index: asset.index,
                    bytes: fetched.bytes,
                    content_type: fetched.content_type,
                    mime_hint: asset.mime_hint,
                })
            })
            .buffer_unordered(concurrency.max(1))
            .try_collect()
            .await?;

        fetched.sort_by_key(|a| a.index);
        Ok(fetched)
    }

    /// Fetch, package and persist one unit in a batched `mode`
    ///
    /// `series` and `title` are the unsanitized names used for metadata.
    #[allow(clippy::too_many_arguments)]
    pub async fn assemble(
        &self,
        job: Option<JobId>,
        mode: OutputMode,
        series: &str,
        title: &str,
        assets: Vec<Asset>,
        concurrency: usize,
        policy: RetryPolicy,
    ) -> Result<Artifact> {
        if !mode.is_batched() {
            return Err(not_batched());
        }
        let names = OutputNames::new(series, title);
        let fetched = self.fetch_all(assets, concurrency, policy).await?;

        let (bytes, pages, extension) = match mode {
            OutputMode::IndividualFiles => return Err(not_batched()),
            OutputMode::ZipArchive => {
                let pages = page_files(fetched);
                (ZipCodec::folder_archive(&names.unit, &pages)?, pages.len(), "zip")
            }
            OutputMode::ComicArchive => {
                let pages = page_files(fetched);
                let metadata = ComicMetadata {
                    series: series.to_string(),
                    title: title.to_string(),
                    page_count: pages.len(),
                };
                (ZipCodec::comic_archive(&pages, &metadata)?, pages.len(), "cbz")
            }
            OutputMode::PdfDocument => {
                let request = layout_document(title, fetched, PageSize::A4);
                let pages = request.pages.len();
                (self.render_document(&request).await?, pages, "pdf")
            }
        };

        let file_name = names.artifact_file_name(extension);
        let path = self.persist_artifact(job, Path::new(&file_name), &bytes).await?;
        tracing::info!(
            job_id = job.map(|j| j.0),
            path = %path.display(),
            pages,
            size = bytes.len(),
            "artifact saved"
        );
        Ok(Artifact { path, pages })
    }

    /// Render a laid-out document through the auxiliary context
    ///
    /// A failed render drops the context so the next request creates a fresh one.
    pub async fn render_document(&self, request: &DocumentRequest) -> Result<Vec<u8>> {
        let context = self.auxiliary.ensure_context().await?;
        match context.render_document(request).await {
            Ok(bytes) => Ok(bytes),
            Err(e) => {
                tracing::warn!(title = %request.title, error = %e, "document render failed");
                self.auxiliary.invalidate().await;
                Err(e)
            }
        }
    }

    /// Persist an already encoded artifact under `name`
    pub async fn persist_artifact(
        &self,
        job: Option<JobId>,
        name: &Path,
        bytes: &[u8],
    ) -> Result<PathBuf> {
        let path = self.sink.persist(name, bytes).await?;
        self.event_tx
            .send(Event::ArtifactSaved {
                job,
                path: path.clone(),
            })
            .ok();
        Ok(path)
    }
}

fn not_batched() -> Error {
    Error::config(
        "output_mode",
        "individual files are not assembled into an archive",
    )
}

/// Name fetched assets `NNN.ext` in index order
fn page_files(fetched: Vec<FetchedAsset>) -> Vec<PageFile> {
    fetched
        .into_iter()
        .map(|asset| PageFile {
            name: page_file_name(asset.index, &asset.extension()),
            bytes: asset.bytes,
        })
        .collect()
}
