use super::test_helpers::*;
use super::*;
use crate::config::OutputMode;
use crate::types::{JobHandle, JobOutput, QueueStats};
use std::path::{Path, PathBuf};
use std::time::Duration;

mod lifecycle;

/// Drain every event received so far
fn drain(rx: &mut tokio::sync::broadcast::Receiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn ids(handles: &[JobHandle]) -> Vec<JobId> {
    handles.iter().map(JobHandle::id).collect()
}
