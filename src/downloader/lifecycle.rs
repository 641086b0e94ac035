//! Idle waiting and shutdown coordination.

use crate::error::Result;

use super::ChapterDownloader;

impl ChapterDownloader {
    /// Whether the queue is empty and no worker is running
    pub fn is_idle(&self) -> bool {
        let state = self.lock_scheduler();
        state.queue.is_empty() && state.active_workers == 0
    }

    /// Whether new jobs are accepted
    pub fn is_accepting(&self) -> bool {
        self.accepting_new.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// Wait until the queue is empty and every worker has finished
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            // Register before checking so a completion in between is not missed
            notified.as_mut().enable();

            if self.is_idle() {
                return;
            }
            notified.await;
        }
    }

    /// Gracefully shut down the downloader
    ///
    /// Stops accepting new jobs, then waits for queued and running jobs to
    /// finish. In-flight jobs are never cancelled; each one ends by
    /// completing, failing, or reaching its readiness deadline.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Initiating graceful shutdown");

        self.accepting_new
            .store(false, std::sync::atomic::Ordering::SeqCst);
        tracing::info!("Stopped accepting new jobs");

        let stats = self.stats();
        tracing::info!(
            queued = stats.queued,
            active = stats.active,
            "Waiting for remaining jobs"
        );
        self.wait_idle().await;

        tracing::info!("Graceful shutdown complete");
        Ok(())
    }
}
