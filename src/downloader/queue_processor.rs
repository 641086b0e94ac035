//! Queue processor: admits queued jobs into worker slots and runs them.

use crate::config::{OutputMode, Settings};
use crate::context::RenderingContext;
use crate::error::{Error, Result};
use crate::readiness::{Readiness, ReadinessDetector};
use crate::types::{Asset, Event, Job, JobId, JobOutcome, JobOutput};
use std::sync::Arc;

use super::{ChapterDownloader, ContextSource, QueuedJob};

/// One occupied worker slot
///
/// Dropping the slot releases it and re-runs dispatch, whether the worker
/// finished, failed or panicked.
struct WorkerSlot {
    downloader: ChapterDownloader,
}

impl Drop for WorkerSlot {
    fn drop(&mut self) {
        let drained = {
            let mut state = self.downloader.lock_scheduler();
            state.active_workers = state.active_workers.saturating_sub(1);
            state.active_workers == 0 && state.queue.is_empty()
        };
        if drained {
            tracing::debug!("queue drained");
            self.downloader.emit_event(Event::QueueDrained);
            self.downloader.idle.notify_waiters();
        }
        self.downloader.process_queue();
    }
}

/// Owns a rendering context opened for one job
///
/// [`ContextGuard::close`] closes it in line. If the worker unwinds first,
/// dropping the guard closes it on a spawned task.
struct ContextGuard {
    context: Option<Arc<dyn RenderingContext>>,
    job_id: JobId,
}

impl ContextGuard {
    fn new(context: Arc<dyn RenderingContext>, job_id: JobId) -> Self {
        Self {
            context: Some(context),
            job_id,
        }
    }

    async fn close(mut self) {
        if let Some(context) = self.context.take() {
            close_context(context, self.job_id).await;
        }
    }
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        let Some(context) = self.context.take() else {
            return;
        };
        let job_id = self.job_id;
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                tracing::debug!(job_id = job_id.0, "closing context of an interrupted job");
                runtime.spawn(close_context(context, job_id));
            }
            Err(_) => {
                tracing::warn!(job_id = job_id.0, "no async runtime, rendering context left open");
            }
        }
    }
}

async fn close_context(context: Arc<dyn RenderingContext>, job_id: JobId) {
    if let Err(e) = context.close().await {
        tracing::warn!(job_id = job_id.0, error = %e, "failed to close rendering context");
    }
}

impl ChapterDownloader {
    /// Admit queued jobs while worker slots are free
    ///
    /// Check-and-increment happens under the scheduler lock, so concurrent
    /// completions can never admit more than `concurrency_limit` workers.
    pub(crate) fn process_queue(&self) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("no async runtime available, dispatch skipped");
            return;
        };

        loop {
            let limit = self.settings().concurrency_limit;
            let next = {
                let mut state = self.lock_scheduler();
                if state.active_workers >= limit {
                    None
                } else {
                    let next = state.queue.pop_front();
                    if next.is_some() {
                        state.active_workers += 1;
                    }
                    next
                }
            };
            let Some(entry) = next else {
                break;
            };

            let slot = WorkerSlot {
                downloader: self.clone(),
            };
            let downloader = self.clone();
            runtime.spawn(async move {
                let _slot = slot;
                downloader.run_job(entry).await;
            });
        }
    }

    /// Process one job end to end and report its outcome
    async fn run_job(&self, entry: QueuedJob) {
        let QueuedJob {
            id,
            job,
            source,
            result_tx,
        } = entry;
        let settings = self.settings();

        tracing::info!(job_id = id.0, unit = %job.unit_name, source = %job.source_location, "job started");
        self.emit_event(Event::JobStarted { id });

        let outcome = match self.execute(id, &job, source, &settings).await {
            Ok(output) => {
                tracing::info!(
                    job_id = id.0,
                    saved = output.assets_saved,
                    failed = output.assets_failed,
                    "job complete"
                );
                self.emit_event(Event::JobComplete {
                    id,
                    output: output.clone(),
                });
                JobOutcome::Completed(output)
            }
            Err(Error::Abandoned(reason)) => {
                tracing::warn!(job_id = id.0, unit = %job.unit_name, reason = %reason, "job abandoned");
                self.emit_event(Event::JobAbandoned {
                    id,
                    reason: reason.clone(),
                });
                JobOutcome::Abandoned { reason }
            }
            Err(e) => {
                tracing::error!(job_id = id.0, unit = %job.unit_name, error = %e, "job failed");
                self.emit_event(Event::JobFailed {
                    id,
                    error: e.to_string(),
                });
                JobOutcome::Failed {
                    error: e.to_string(),
                    code: e.code().to_string(),
                }
            }
        };

        // The caller may have dropped its handle
        result_tx.send(outcome).ok();
    }

    async fn execute(
        &self,
        id: JobId,
        job: &Job,
        source: ContextSource,
        settings: &Settings,
    ) -> Result<JobOutput> {
        match source {
            ContextSource::Fresh => {
                let context = self.services.contexts.open(job).await?;
                let guard = ContextGuard::new(context.clone(), id);
                let result = match self.harvest(id, context.as_ref(), settings).await {
                    Ok(assets) => self.route(id, job, assets, settings).await,
                    Err(e) => Err(e),
                };
                guard.close().await;
                result
            }
            ContextSource::Active(context) => {
                let assets = self.harvest(id, context.as_ref(), settings).await?;
                self.route(id, job, assets, settings).await
            }
            ContextSource::Reported(report) => {
                let assets = self.await_report(id, report, settings).await?;
                self.route(id, job, assets, settings).await
            }
        }
    }

    /// Wait for readiness, then collect the assets in index order
    async fn harvest(
        &self,
        id: JobId,
        context: &dyn RenderingContext,
        settings: &Settings,
    ) -> Result<Vec<Asset>> {
        match ReadinessDetector::from_settings(settings).wait(context).await {
            Readiness::Abandoned { ticks } => Err(Error::Abandoned(format!(
                "nothing loaded within {}s ({ticks} polls)",
                settings.overall_timeout.as_secs()
            ))),
            Readiness::Ready {
                loaded,
                tick,
                trigger,
            } => {
                tracing::debug!(job_id = id.0, loaded, tick, ?trigger, "rendering context ready");
                self.emit_event(Event::JobReady {
                    id,
                    loaded,
                    trigger,
                });
                let assets = context.loaded_assets().await?;
                sorted_non_empty(assets)
            }
        }
    }

    async fn await_report(
        &self,
        id: JobId,
        report: tokio::sync::oneshot::Receiver<Vec<Asset>>,
        settings: &Settings,
    ) -> Result<Vec<Asset>> {
        match tokio::time::timeout(settings.overall_timeout, report).await {
            Ok(Ok(assets)) => sorted_non_empty(assets),
            Ok(Err(_)) => Err(Error::Abandoned("harvest reporter went away".to_string())),
            Err(_) => {
                self.lock_scheduler().pending_reports.remove(&id);
                Err(Error::Abandoned(format!(
                    "no harvest reported within {}s",
                    settings.overall_timeout.as_secs()
                )))
            }
        }
    }

    /// Hand harvested assets to the pipeline or the assembler
    async fn route(
        &self,
        id: JobId,
        job: &Job,
        assets: Vec<Asset>,
        settings: &Settings,
    ) -> Result<JobOutput> {
        let total = assets.len();
        let policy = settings.retry_policy();
        let concurrency = settings.per_asset_concurrency_limit;

        match settings.output_mode {
            OutputMode::IndividualFiles => {
                let report = self
                    .services
                    .pipeline
                    .download_unit(Some(id), &job.output_names(), assets, concurrency, policy)
                    .await;
                Ok(JobOutput {
                    assets_saved: report.saved,
                    assets_failed: report.failed,
                    artifact: None,
                })
            }
            mode => {
                let artifact = self
                    .services
                    .assembler
                    .assemble(
                        Some(id),
                        mode,
                        &job.parent_collection_name,
                        &job.unit_name,
                        assets,
                        concurrency,
                        policy,
                    )
                    .await?;
                Ok(JobOutput {
                    assets_saved: artifact.pages,
                    assets_failed: total.saturating_sub(artifact.pages),
                    artifact: Some(artifact.path),
                })
            }
        }
    }
}

fn sorted_non_empty(mut assets: Vec<Asset>) -> Result<Vec<Asset>> {
    if assets.is_empty() {
        return Err(Error::Abandoned("harvest produced no assets".to_string()));
    }
    assets.sort_by_key(|a| a.index);
    Ok(assets)
}
