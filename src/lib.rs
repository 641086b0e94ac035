//! # chapter-dl
//!
//! Orchestration core for bulk manga chapter downloads.
//!
//! ## Design Philosophy
//!
//! chapter-dl is designed to be:
//! - **Environment-agnostic** - Rendering contexts, transfers and storage are traits
//! - **Bounded** - A fixed number of chapters render at once, no matter how many are queued
//! - **Library-first** - No CLI or UI, purely a Rust crate for embedding
//! - **Event-driven** - Consumers subscribe to events, no polling required
//!
//! A chapter ([`Job`]) is opened in a [`RenderingContext`], polled until its
//! images have settled, harvested, and then either saved page by page or
//! packaged into a zip, cbz or pdf artifact.
//!
//! ## Quick Start
//!
//! ```no_run
//! use chapter_dl::{ChapterDownloader, Collaborators, Job, Settings};
//! # use std::sync::Arc;
//! # use chapter_dl::{ContextFactory, AuxiliaryContextFactory};
//!
//! # async fn example(
//! #     contexts: Arc<dyn ContextFactory>,
//! #     renderer: Arc<dyn AuxiliaryContextFactory>,
//! # ) -> Result<(), Box<dyn std::error::Error>> {
//! let settings = Settings::load("settings.json".as_ref())?;
//! let collaborators = Collaborators::with_http(contexts, renderer, "downloads", &settings)?;
//! let downloader = ChapterDownloader::new(settings, collaborators)?;
//!
//! // Subscribe to events
//! let mut events = downloader.subscribe();
//! tokio::spawn(async move {
//!     while let Ok(event) = events.recv().await {
//!         println!("Event: {:?}", event);
//!     }
//! });
//!
//! let url = "https://reader.example/one-piece/1".parse()?;
//! let handles = downloader.enqueue(vec![Job::new(url, "Chapter 1", "One Piece")])?;
//! for handle in handles {
//!     println!("{:?}", handle.outcome().await);
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Archive and document assembly
pub mod archive;
/// Single-flight auxiliary context management
pub mod auxiliary;
/// Configuration types
pub mod config;
/// Rendering and auxiliary context traits
pub mod context;
/// Core downloader implementation (decomposed into focused submodules)
pub mod downloader;
/// Error types
pub mod error;
/// Per-asset download pipeline
pub mod pipeline;
/// Readiness detection
pub mod readiness;
/// Retry logic with a fixed delay
pub mod retry;
/// Settings file watching
pub mod settings_watcher;
/// Asset transfer and blob persistence
pub mod transfer;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use archive::{ArchiveAssembler, Artifact, DocumentRequest};
pub use auxiliary::AuxiliaryContextManager;
pub use config::{OutputMode, RetryPolicy, Settings};
pub use context::{AuxiliaryContext, AuxiliaryContextFactory, ContextFactory, RenderingContext};
pub use downloader::{ChapterDownloader, Collaborators, Command, CommandResponse};
pub use error::{Error, Result};
pub use readiness::{Readiness, ReadinessDetector, ReadyTrigger};
pub use transfer::{AssetFetcher, BlobSink, FetchedBytes, FsSink, HttpFetcher};
pub use types::{
    Asset, AssetData, Event, Job, JobHandle, JobId, JobOutcome, JobOutput, QueueStats,
};

/// Helper function to run the downloader with graceful signal handling.
///
/// Waits for a termination signal and then calls the downloader's `shutdown()` method,
/// which lets queued and running jobs finish.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use chapter_dl::{ChapterDownloader, run_with_shutdown};
///
/// # async fn example(downloader: ChapterDownloader) -> chapter_dl::Result<()> {
/// // Run with automatic signal handling
/// run_with_shutdown(downloader).await?;
/// # Ok(())
/// # }
/// ```
pub async fn run_with_shutdown(downloader: ChapterDownloader) -> Result<()> {
    wait_for_signal().await;
    downloader.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
