//! Download-with-retry pipeline for individual asset files
//!
//! Each asset becomes a [`DownloadTask`]: fetch, persist, and retry failed
//! attempts with a fixed delay until the task's attempts run out. A failed
//! asset is logged and counted; it never fails the job it belongs to.

use crate::config::RetryPolicy;
use crate::error::Result;
use crate::retry::download_with_retry;
use crate::transfer::{AssetFetcher, BlobSink, resolve_asset_data};
use crate::types::{Asset, AssetData, Event, JobId, OutputNames};
use crate::utils::{page_file_name, resolve_extension};
use futures::StreamExt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// One asset transfer
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DownloadTask {
    /// Where the bytes come from
    pub source: AssetData,
    /// MIME type reported for inline bytes
    pub mime_hint: Option<String>,
    /// Sink-relative destination name
    pub destination: PathBuf,
    /// Retries left after the first attempt
    pub remaining_attempts: u32,
}

impl DownloadTask {
    /// Task writing `asset` to `<collection>/<unit>/NNN.<ext>`
    ///
    /// The extension comes from the asset's MIME hint, `png` when absent.
    pub fn for_asset(asset: Asset, names: &OutputNames, attempts: u32) -> Self {
        let extension = resolve_extension([asset.mime_hint.as_deref()]);
        let destination = names
            .unit_dir()
            .join(page_file_name(asset.index, &extension));
        Self {
            source: asset.data,
            mime_hint: asset.mime_hint,
            destination,
            remaining_attempts: attempts,
        }
    }
}

/// Per-job totals of the individual-file route
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PipelineReport {
    /// Assets persisted
    pub saved: usize,
    /// Assets dropped after their attempts ran out
    pub failed: usize,
}

/// Runs [`DownloadTask`]s against a fetcher and a sink
#[derive(Clone)]
pub struct DownloadPipeline {
    fetcher: Arc<dyn AssetFetcher>,
    sink: Arc<dyn BlobSink>,
    event_tx: broadcast::Sender<Event>,
}

impl DownloadPipeline {
    /// Create a pipeline that reports progress on `event_tx`
    pub fn new(
        fetcher: Arc<dyn AssetFetcher>,
        sink: Arc<dyn BlobSink>,
        event_tx: broadcast::Sender<Event>,
    ) -> Self {
        Self {
            fetcher,
            sink,
            event_tx,
        }
    }

    /// Fetch and persist one task, retrying failed attempts
    ///
    /// Returns the location reported by the sink.
    pub async fn run(&self, task: &DownloadTask, retry_delay: Duration) -> Result<PathBuf> {
        let policy = RetryPolicy {
            attempts: task.remaining_attempts,
            delay: retry_delay,
        };
        let fetcher = &*self.fetcher;
        let sink = &*self.sink;

        download_with_retry(&policy, || async move {
            let fetched =
                resolve_asset_data(fetcher, &task.source, task.mime_hint.as_deref()).await?;
            sink.persist(&task.destination, &fetched.bytes).await
        })
        .await
    }

    /// Run `task` and report the outcome as an event
    pub async fn run_reported(
        &self,
        job: Option<JobId>,
        task: &DownloadTask,
        retry_delay: Duration,
    ) -> Result<PathBuf> {
        let result = self.run(task, retry_delay).await;
        match &result {
            Ok(path) => {
                tracing::debug!(job_id = job.map(|j| j.0), path = %path.display(), "asset saved");
                self.emit(Event::AssetSaved {
                    job,
                    path: path.clone(),
                });
            }
            Err(e) => {
                tracing::warn!(
                    job_id = job.map(|j| j.0),
                    destination = %task.destination.display(),
                    source = %task.source.describe(),
                    error = %e,
                    "asset dropped after retries"
                );
                self.emit(Event::AssetFailed {
                    job,
                    path: task.destination.clone(),
                    error: e.to_string(),
                });
            }
        }
        result
    }

    /// Download every asset of a unit as individual files
    ///
    /// At most `concurrency` transfers run at once. Failed assets are counted
    /// in the report and do not stop the others.
    pub async fn download_unit(
        &self,
        job: Option<JobId>,
        names: &OutputNames,
        assets: Vec<Asset>,
        concurrency: usize,
        policy: RetryPolicy,
    ) -> PipelineReport {
        let tasks: Vec<DownloadTask> = assets
            .into_iter()
            .map(|asset| DownloadTask::for_asset(asset, names, policy.attempts))
            .collect();

        let mut results = futures::stream::iter(tasks)
            .map(|task| async move { self.run_reported(job, &task, policy.delay).await })
            .buffer_unordered(concurrency.max(1));

        let mut report = PipelineReport::default();
        while let Some(result) = results.next().await {
            match result {
                Ok(_) => report.saved += 1,
                Err(_) => report.failed += 1,
            }
        }

        tracing::info!(
            job_id = job.map(|j| j.0),
            unit = %names.unit,
            saved = report.saved,
            failed = report.failed,
            "unit download finished"
        );
        report
    }

    fn emit(&self, event: Event) {
        // No subscribers is fine
        self.event_tx.send(event).ok();
    }
}
