//! Settings file watching
//!
//! Reloads [`Settings`] whenever the backing JSON file is created or modified
//! and applies them with [`ChapterDownloader::update_settings`]. The parent
//! directory is watched rather than the file itself, so editors that save by
//! replacing the file are picked up too.
//!
//! # Example
//!
//! ```no_run
//! use chapter_dl::ChapterDownloader;
//! use chapter_dl::settings_watcher::SettingsWatcher;
//!
//! # fn example(downloader: ChapterDownloader) -> chapter_dl::Result<()> {
//! let mut watcher = SettingsWatcher::new(downloader, "settings.json")?;
//! watcher.start()?;
//! tokio::spawn(watcher.run());
//! # Ok(())
//! # }
//! ```

use crate::config::Settings;
use crate::downloader::ChapterDownloader;
use crate::error::{Error, Result};
use notify::{
    Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher,
};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Watches one settings file and applies every valid change
pub struct SettingsWatcher {
    watcher: RecommendedWatcher,
    rx: mpsc::UnboundedReceiver<notify::Result<Event>>,
    downloader: ChapterDownloader,
    path: PathBuf,
}

impl SettingsWatcher {
    /// Create a watcher for the settings file at `path`
    ///
    /// # Errors
    ///
    /// Returns [`Error::Watch`] if the filesystem watcher cannot be initialized.
    pub fn new(downloader: ChapterDownloader, path: impl Into<PathBuf>) -> Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();

        let watcher = RecommendedWatcher::new(
            move |res| {
                if let Err(e) = tx.send(res) {
                    error!("Failed to send filesystem event: {}", e);
                }
            },
            NotifyConfig::default(),
        )
        .map_err(|e| Error::Watch(e.to_string()))?;

        Ok(Self {
            watcher,
            rx,
            downloader,
            path: path.into(),
        })
    }

    /// Register the settings file's directory with the filesystem watcher
    ///
    /// # Errors
    ///
    /// Returns [`Error::Watch`] if the directory cannot be created or watched.
    pub fn start(&mut self) -> Result<()> {
        let dir = self.watch_dir();
        if !dir.exists() {
            std::fs::create_dir_all(&dir)
                .map_err(|e| Error::Watch(format!("Failed to create settings directory: {}", e)))?;
        }

        self.watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .map_err(|e| Error::Watch(format!("Failed to watch settings directory: {}", e)))?;

        info!(path = %self.path.display(), "Watching settings file");
        Ok(())
    }

    /// Run the event loop until the watcher is dropped
    pub async fn run(mut self) {
        info!("Settings watcher started");

        while let Some(result) = self.rx.recv().await {
            match result {
                Ok(event) => {
                    if let Err(e) = self.handle_event(event).await {
                        error!(error = %e, "Failed to apply settings change");
                    }
                }
                Err(e) => {
                    error!("Filesystem watcher error: {}", e);
                }
            }
        }

        info!("Settings watcher stopped");
    }

    fn watch_dir(&self) -> PathBuf {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    fn is_settings_file(&self, path: &Path) -> bool {
        path.file_name().is_some() && path.file_name() == self.path.file_name()
    }

    /// Reload and apply settings if `event` touched the settings file
    async fn handle_event(&self, event: Event) -> Result<()> {
        match event.kind {
            EventKind::Create(_) | EventKind::Modify(_) => {
                if event.paths.iter().any(|p| self.is_settings_file(p)) {
                    self.reload().await?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    async fn reload(&self) -> Result<()> {
        // Writers often truncate then write; give them a moment to finish
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

        let settings = match Settings::load_async(&self.path).await {
            Ok(settings) => settings,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Ignoring invalid settings file");
                return Err(e);
            }
        };

        if *self.downloader.settings() == settings {
            debug!("Settings file changed without new values");
            return Ok(());
        }
        self.downloader.update_settings(settings)
    }
}
