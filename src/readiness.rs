//! Readiness detection for rendering contexts
//!
//! Pages load their images lazily and rarely announce when they are done. The
//! detector polls a [`RenderingContext`] on a fixed interval and declares it
//! ready when one of these holds:
//!
//! - the page announced a total and at least that many items are loaded
//! - the loaded count stopped growing for `stability_ticks_required` ticks
//! - the overall deadline expired with at least one item loaded (degraded)
//!
//! A deadline with nothing loaded abandons the job instead.

use crate::config::Settings;
use crate::context::RenderingContext;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::MissedTickBehavior;

/// Which condition declared a context ready
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadyTrigger {
    /// Loaded count reached the announced total
    ExpectedTotal,
    /// Loaded count held steady long enough
    Stable,
    /// Deadline expired with partial content
    Deadline,
}

/// Verdict of a readiness wait
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Readiness {
    /// Content can be harvested
    Ready {
        /// Items loaded when the verdict was reached
        loaded: usize,
        /// 0-based index of the deciding tick; for [`ReadyTrigger::Deadline`]
        /// the number of ticks observed before the deadline
        tick: u32,
        /// Deciding condition
        trigger: ReadyTrigger,
    },
    /// Nothing loaded before the deadline
    Abandoned {
        /// Ticks observed before the deadline
        ticks: u32,
    },
}

/// Per-wait state of the polling state machine
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StabilityState {
    last_count: usize,
    stable_ticks: u32,
    known_total: Option<usize>,
    ticks: u32,
    settled: bool,
    required: u32,
}

impl StabilityState {
    /// Fresh state requiring `required` unchanged ticks for stability
    pub fn new(required: u32) -> Self {
        Self {
            last_count: 0,
            stable_ticks: 0,
            known_total: None,
            ticks: 0,
            settled: false,
            required: required.max(1),
        }
    }

    /// Whether a verdict was already produced
    pub fn is_settled(&self) -> bool {
        self.settled
    }

    /// Announced total, once seen
    pub fn known_total(&self) -> Option<usize> {
        self.known_total
    }

    /// Highest loaded count observed
    pub fn last_count(&self) -> usize {
        self.last_count
    }

    /// Feed one tick's observation
    ///
    /// `expected` is the announced total if it could be read this tick. A
    /// total of zero is treated as unknown. Once a total is known it is kept.
    pub fn observe(&mut self, expected: Option<usize>, loaded: usize) -> Option<Readiness> {
        if self.settled {
            return None;
        }
        let tick = self.ticks;
        self.ticks += 1;

        if self.known_total.is_none() {
            self.known_total = expected.filter(|total| *total > 0);
        }
        if let Some(total) = self.known_total
            && loaded >= total
        {
            return Some(self.settle(loaded, tick, ReadyTrigger::ExpectedTotal));
        }

        if loaded > self.last_count {
            self.last_count = loaded;
            self.stable_ticks = 0;
        } else if loaded > 0 {
            self.stable_ticks += 1;
            if self.stable_ticks >= self.required {
                return Some(self.settle(self.last_count, tick, ReadyTrigger::Stable));
            }
        }
        None
    }

    /// Count a tick whose reading failed, leaving the observation state alone
    pub fn skip(&mut self) {
        if !self.settled {
            self.ticks += 1;
        }
    }

    /// The overall deadline expired
    pub fn on_deadline(&mut self) -> Option<Readiness> {
        if self.settled {
            return None;
        }
        self.settled = true;
        if self.last_count > 0 {
            Some(Readiness::Ready {
                loaded: self.last_count,
                tick: self.ticks,
                trigger: ReadyTrigger::Deadline,
            })
        } else {
            Some(Readiness::Abandoned { ticks: self.ticks })
        }
    }

    fn settle(&mut self, loaded: usize, tick: u32, trigger: ReadyTrigger) -> Readiness {
        self.settled = true;
        Readiness::Ready {
            loaded,
            tick,
            trigger,
        }
    }
}

/// Polls a [`RenderingContext`] until it settles or the deadline expires
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReadinessDetector {
    /// Interval between polls; the first poll is immediate
    pub tick_interval: Duration,
    /// Deadline for the whole wait
    pub overall_timeout: Duration,
    /// Consecutive unchanged ticks required for stability
    pub stability_ticks_required: u32,
}

impl ReadinessDetector {
    /// Detector parameters from settings
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            tick_interval: settings.tick_interval,
            overall_timeout: settings.overall_timeout,
            stability_ticks_required: settings.stability_ticks_required,
        }
    }

    /// Wait for `ctx` to become ready
    ///
    /// The deadline is raced against each poll, so a context read that never
    /// returns cannot hold the wait past `overall_timeout`. When the deadline
    /// and a tick fall due together the deadline wins.
    pub async fn wait(&self, ctx: &dyn RenderingContext) -> Readiness {
        let mut state = StabilityState::new(self.stability_ticks_required);

        let deadline = tokio::time::sleep(self.overall_timeout);
        tokio::pin!(deadline);

        let mut interval = tokio::time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let need_total = state.known_total().is_none();
            let reading = async {
                interval.tick().await;
                let expected = if need_total {
                    match ctx.expected_total().await {
                        Ok(total) => total,
                        Err(e) => {
                            tracing::debug!(error = %e, "expected total unreadable, treating as unknown");
                            None
                        }
                    }
                } else {
                    None
                };
                (expected, ctx.loaded_count().await)
            };

            let verdict = tokio::select! {
                biased;
                _ = &mut deadline => state.on_deadline(),
                (expected, loaded) = reading => match loaded {
                    Ok(loaded) => {
                        tracing::trace!(loaded, ?expected, "readiness tick");
                        state.observe(expected, loaded)
                    }
                    Err(e) => {
                        tracing::debug!(error = %e, "loaded count unreadable, skipping tick");
                        state.skip();
                        None
                    }
                },
            };

            if let Some(verdict) = verdict {
                return verdict;
            }
        }
    }
}
