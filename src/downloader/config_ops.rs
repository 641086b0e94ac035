//! Runtime settings updates.

use crate::config::Settings;
use crate::error::Result;
use crate::types::Event;
use std::sync::{Arc, PoisonError};

use super::ChapterDownloader;

impl ChapterDownloader {
    /// Current settings
    ///
    /// Returns a snapshot; jobs already running keep the snapshot they
    /// started with.
    pub fn settings(&self) -> Arc<Settings> {
        self.settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the settings at runtime
    ///
    /// The new values apply to jobs dispatched from now on. Raising
    /// `concurrency_limit` admits queued jobs immediately; lowering it lets
    /// running jobs finish and admits nothing until the active count drops
    /// below the new limit.
    ///
    /// # Errors
    ///
    /// Returns a configuration error, leaving the current settings in place,
    /// if the new settings do not validate.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use chapter_dl::{ChapterDownloader, Settings};
    /// # fn example(downloader: &ChapterDownloader) -> chapter_dl::Result<()> {
    /// let mut settings = (*downloader.settings()).clone();
    /// settings.concurrency_limit = 6;
    /// downloader.update_settings(settings)?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn update_settings(&self, settings: Settings) -> Result<()> {
        settings.validate()?;

        let previous = {
            let mut current = self
                .settings
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *current, Arc::new(settings.clone()))
        };

        tracing::info!(
            output_mode = ?settings.output_mode,
            concurrency_limit = settings.concurrency_limit,
            previous_concurrency_limit = previous.concurrency_limit,
            "Settings changed"
        );
        self.emit_event(Event::SettingsChanged);

        if settings.concurrency_limit > previous.concurrency_limit {
            self.process_queue();
        }
        Ok(())
    }
}
