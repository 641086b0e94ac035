//! Traits for the external environments a job runs in
//!
//! A [`RenderingContext`] hosts one job's page while its images load. The
//! scheduler only observes it (counts, totals, harvested assets) and closes it
//! when the job ends. An [`AuxiliaryContext`] is the secondary environment that
//! turns a laid-out page list into document bytes; at most one is alive per
//! [`AuxiliaryContextManager`](crate::auxiliary::AuxiliaryContextManager).

use crate::archive::DocumentRequest;
use crate::types::{Asset, Job};
use async_trait::async_trait;
use std::sync::Arc;

/// Isolated environment hosting one job's content while it loads
///
/// Implementations wrap whatever actually renders the page (a browser tab,
/// a headless session, a scripted fixture in tests).
///
/// # Examples
///
/// ```no_run
/// use async_trait::async_trait;
/// use chapter_dl::{Asset, RenderingContext, Result};
///
/// struct Snapshot(Vec<Asset>);
///
/// #[async_trait]
/// impl RenderingContext for Snapshot {
///     async fn expected_total(&self) -> Result<Option<usize>> {
///         Ok(Some(self.0.len()))
///     }
///
///     async fn loaded_assets(&self) -> Result<Vec<Asset>> {
///         Ok(self.0.clone())
///     }
///
///     async fn close(&self) -> Result<()> {
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait RenderingContext: Send + Sync {
    /// Total number of items the page announces, if it announces one
    ///
    /// # Errors
    ///
    /// A read error is treated as "unknown" by the readiness detector.
    async fn expected_total(&self) -> crate::Result<Option<usize>>;

    /// Number of items loaded so far
    ///
    /// The default counts [`loaded_assets`](Self::loaded_assets). Override it
    /// when counting is cheaper than harvesting.
    ///
    /// # Errors
    ///
    /// A read error makes the readiness detector skip the tick.
    async fn loaded_count(&self) -> crate::Result<usize> {
        Ok(self.loaded_assets().await?.len())
    }

    /// Harvest every loaded asset
    ///
    /// Order does not matter; the caller sorts by [`Asset::index`].
    async fn loaded_assets(&self) -> crate::Result<Vec<Asset>>;

    /// Tear the context down
    async fn close(&self) -> crate::Result<()>;
}

/// Creates a fresh [`RenderingContext`] for a dispatched job
#[async_trait]
pub trait ContextFactory: Send + Sync {
    /// Open a context rendering `job.source_location`
    ///
    /// # Errors
    ///
    /// Any error fails the job terminally; it is not re-queued.
    async fn open(&self, job: &Job) -> crate::Result<Arc<dyn RenderingContext>>;
}

/// Secondary environment that renders documents
#[async_trait]
pub trait AuxiliaryContext: Send + Sync {
    /// Produce document bytes from a laid-out page list
    async fn render_document(&self, request: &DocumentRequest) -> crate::Result<Vec<u8>>;
}

/// Creates the [`AuxiliaryContext`]
#[async_trait]
pub trait AuxiliaryContextFactory: Send + Sync {
    /// Create a new auxiliary context
    ///
    /// Called at most once per successful creation; a failure is reported to
    /// every concurrent waiter and the next request tries again.
    async fn create(&self) -> crate::Result<Arc<dyn AuxiliaryContext>>;
}
