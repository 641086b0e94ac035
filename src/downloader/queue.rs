//! Job queue management: enqueueing, statistics and reported harvests.

use crate::context::RenderingContext;
use crate::error::{Error, Result};
use crate::types::{Asset, Event, Job, JobHandle, JobId, QueueStats};
use std::sync::Arc;
use std::sync::atomic::Ordering;

use super::{ChapterDownloader, ContextSource, QueuedJob};

impl ChapterDownloader {
    /// Enqueue a batch of jobs
    ///
    /// The batch is placed ahead of everything already waiting, keeping its
    /// own order: the newest request is served first, and within a request
    /// jobs run in the order given. Jobs already running are not affected.
    ///
    /// Returns one handle per job, in batch order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ShuttingDown`] after [`shutdown`](Self::shutdown).
    pub fn enqueue(&self, jobs: Vec<Job>) -> Result<Vec<JobHandle>> {
        self.ensure_accepting()?;

        let mut handles = Vec::with_capacity(jobs.len());
        let mut entries = Vec::with_capacity(jobs.len());
        for job in jobs {
            let (entry, handle) = self.new_entry(job, ContextSource::Fresh);
            entries.push(entry);
            handles.push(handle);
        }
        self.push_batch(entries);
        Ok(handles)
    }

    /// Enqueue a job whose page is already loaded in a caller-owned context
    ///
    /// The context is polled and harvested like a fresh one but never closed.
    pub fn enqueue_in_context(
        &self,
        job: Job,
        context: Arc<dyn RenderingContext>,
    ) -> Result<JobHandle> {
        self.ensure_accepting()?;
        let (entry, handle) = self.new_entry(job, ContextSource::Active(context));
        self.push_batch(vec![entry]);
        Ok(handle)
    }

    /// Enqueue a job whose assets are delivered later by [`harvest_complete`](Self::harvest_complete)
    ///
    /// Once dispatched, the job waits up to `overall_timeout` for the report
    /// and is abandoned if none arrives.
    pub fn enqueue_reported(&self, job: Job) -> Result<JobHandle> {
        self.ensure_accepting()?;
        let (report_tx, report_rx) = tokio::sync::oneshot::channel();
        let (entry, handle) = self.new_entry(job, ContextSource::Reported(report_rx));
        self.lock_scheduler()
            .pending_reports
            .insert(entry.id, report_tx);
        self.push_batch(vec![entry]);
        Ok(handle)
    }

    /// Deliver the harvested assets of a reported job
    ///
    /// An empty list abandons the job.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no reported job with this ID is waiting.
    pub fn harvest_complete(&self, id: JobId, assets: Vec<Asset>) -> Result<()> {
        let sender = self.lock_scheduler().pending_reports.remove(&id);
        let Some(sender) = sender else {
            return Err(Error::NotFound(format!("no pending harvest for job {id}")));
        };
        tracing::debug!(job_id = id.0, assets = assets.len(), "harvest reported");
        sender
            .send(assets)
            .map_err(|_| Error::NotFound(format!("job {id} is no longer waiting for a harvest")))
    }

    /// Snapshot of queue occupancy
    pub fn stats(&self) -> QueueStats {
        let concurrency_limit = self.settings().concurrency_limit;
        let state = self.lock_scheduler();
        QueueStats {
            queued: state.queue.len(),
            active: state.active_workers,
            concurrency_limit,
        }
    }

    /// IDs of queued (not yet dispatched) jobs, next to run first
    pub fn queued_ids(&self) -> Vec<JobId> {
        self.lock_scheduler().queue.iter().map(|q| q.id).collect()
    }

    fn new_entry(&self, job: Job, source: ContextSource) -> (QueuedJob, JobHandle) {
        let id = JobId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (result_tx, result_rx) = tokio::sync::oneshot::channel();
        (
            QueuedJob {
                id,
                job,
                source,
                result_tx,
            },
            JobHandle::new(id, result_rx),
        )
    }

    /// Prepend a batch, preserving its internal order, then dispatch
    fn push_batch(&self, entries: Vec<QueuedJob>) {
        let queued: Vec<(JobId, String)> = entries
            .iter()
            .map(|e| (e.id, e.job.unit_name.clone()))
            .collect();

        {
            let mut state = self.lock_scheduler();
            for entry in entries.into_iter().rev() {
                state.queue.push_front(entry);
            }
        }

        for (id, unit) in queued {
            tracing::info!(job_id = id.0, unit = %unit, "job queued");
            self.emit_event(Event::JobQueued { id, unit });
        }

        self.process_queue();
    }
}
