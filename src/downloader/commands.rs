//! Serialized command surface.
//!
//! Front ends (an extension bridge, a socket, a CLI) send JSON commands tagged
//! by `action`; [`ChapterDownloader::handle_command`] applies them.

use crate::config::OutputMode;
use crate::error::Result;
use crate::pipeline::DownloadTask;
use crate::types::{Asset, AssetData, Job, JobId};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use url::Url;

use super::ChapterDownloader;

/// A request from a front end
///
/// ```
/// use chapter_dl::Command;
///
/// let cmd: Command = serde_json::from_str(
///     r#"{"action":"harvestComplete","job_id":3,"assets":[]}"#,
/// ).unwrap();
/// assert!(matches!(cmd, Command::HarvestComplete { .. }));
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Command {
    /// Prepend jobs to the queue and dispatch
    EnqueueJobs {
        /// Jobs in the order they should run
        jobs: Vec<Job>,
    },
    /// Download one file outside any job
    QueueSingleAsset {
        /// Where to fetch from
        source: Url,
        /// Sink-relative destination
        destination: PathBuf,
    },
    /// Assets harvested for a job enqueued with `enqueue_reported`
    HarvestComplete {
        /// The waiting job
        job_id: JobId,
        /// Harvested assets; empty abandons the job
        assets: Vec<Asset>,
    },
    /// Lay out and render a document outside any job
    RequestDocumentRender {
        /// Pages, in any order
        assets: Vec<Asset>,
        /// Chapter name
        unit_name: String,
        /// Series name
        parent_collection_name: String,
    },
    /// Persist an already rendered document
    RenderComplete {
        /// Document bytes
        blob: Vec<u8>,
        /// Sink-relative file name
        filename: PathBuf,
    },
}

/// Result of a handled [`Command`]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum CommandResponse {
    /// Jobs were queued
    Enqueued {
        /// Assigned IDs, in batch order
        job_ids: Vec<JobId>,
    },
    /// A blob was persisted
    Saved {
        /// Where it was written
        path: PathBuf,
    },
    /// The command was accepted; its effect is reported through events
    Accepted,
}

impl ChapterDownloader {
    /// Apply one command
    ///
    /// Outcomes of enqueued jobs are reported through [`subscribe`](Self::subscribe);
    /// use [`enqueue`](Self::enqueue) directly to get per-job handles.
    pub async fn handle_command(&self, command: Command) -> Result<CommandResponse> {
        match command {
            Command::EnqueueJobs { jobs } => {
                let handles = self.enqueue(jobs)?;
                Ok(CommandResponse::Enqueued {
                    job_ids: handles.iter().map(|h| h.id()).collect(),
                })
            }
            Command::QueueSingleAsset {
                source,
                destination,
            } => {
                let path = self
                    .queue_single_asset(AssetData::Location(source), destination)
                    .await?;
                Ok(CommandResponse::Saved { path })
            }
            Command::HarvestComplete { job_id, assets } => {
                self.harvest_complete(job_id, assets)?;
                Ok(CommandResponse::Accepted)
            }
            Command::RequestDocumentRender {
                assets,
                unit_name,
                parent_collection_name,
            } => {
                let path = self
                    .render_document(assets, &unit_name, &parent_collection_name)
                    .await?;
                Ok(CommandResponse::Saved { path })
            }
            Command::RenderComplete { blob, filename } => {
                let path = self
                    .services
                    .assembler
                    .persist_artifact(None, &filename, &blob)
                    .await?;
                Ok(CommandResponse::Saved { path })
            }
        }
    }

    /// Fetch and persist one asset outside any job, retrying per the current settings
    pub async fn queue_single_asset(
        &self,
        source: AssetData,
        destination: PathBuf,
    ) -> Result<PathBuf> {
        self.ensure_accepting()?;
        let settings = self.settings();
        let task = DownloadTask {
            source,
            mime_hint: None,
            destination,
            remaining_attempts: settings.retry_attempts,
        };
        tracing::info!(destination = %task.destination.display(), "single asset queued");
        self.services
            .pipeline
            .run_reported(None, &task, settings.retry_delay)
            .await
    }

    /// Render assets into a document through the auxiliary context and persist it
    pub async fn render_document(
        &self,
        assets: Vec<Asset>,
        unit_name: &str,
        parent_collection_name: &str,
    ) -> Result<PathBuf> {
        self.ensure_accepting()?;
        let settings = self.settings();
        let artifact = self
            .services
            .assembler
            .assemble(
                None,
                OutputMode::PdfDocument,
                parent_collection_name,
                unit_name,
                assets,
                settings.per_asset_concurrency_limit,
                settings.retry_policy(),
            )
            .await?;
        Ok(artifact.path)
    }
}
