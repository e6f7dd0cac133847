//! # sampler
//!
//! Periodic snapshots of a hardware counter group.
//!
//! A [`PeriodicSampler`] owns one [`CounterGroup`], enables it once and then
//! reads it at a fixed interval from a tokio task, handing every snapshot to
//! a channel. The task runs until its cancellation token fires, the receiving
//! side of the channel is dropped, or a read fails.

use std::time::Duration;

use log::{debug, warn};
use perf_group::{
    Backend, ControlError, CounterGroup, CounterSpec, GroupOptions, ReadError, ResultSet,
};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Errors that end a sampler
#[derive(Error, Debug)]
pub enum SamplerError {
    #[error("none of the requested counters could be opened")]
    NoCounters,

    #[error(transparent)]
    Control(#[from] ControlError),

    #[error(transparent)]
    Read(#[from] ReadError),
}

/// Reads a counter group at a fixed interval
pub struct PeriodicSampler<B: Backend> {
    group: CounterGroup<B>,
    interval: Duration,
}

impl<B> PeriodicSampler<B>
where
    B: Backend + Send + 'static,
    B::Handle: Send + 'static,
{
    /// Builds a group from `specs`, the first counter that opens becoming the
    /// leader.
    ///
    /// Counters the kernel rejects are logged and left out. Fails only if no
    /// counter could be opened at all.
    pub fn new(
        backend: B,
        options: GroupOptions,
        specs: impl IntoIterator<Item = CounterSpec>,
        interval: Duration,
    ) -> Result<Self, SamplerError> {
        let mut group = CounterGroup::new(backend, options);
        for spec in specs {
            if let Err(e) = group.add_counter(spec) {
                warn!("skipping counter: {}", e);
            }
        }

        if group.is_empty() {
            return Err(SamplerError::NoCounters);
        }
        Ok(Self::from_group(group, interval))
    }

    /// Samples an already built group
    pub fn from_group(group: CounterGroup<B>, interval: Duration) -> Self {
        Self { group, interval }
    }

    pub fn group(&self) -> &CounterGroup<B> {
        &self.group
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Spawns the sampling loop on the current tokio runtime.
    ///
    /// The group moves into the task and is released when the task ends.
    ///
    /// Enabling, reading and disabling the group are short blocking
    /// syscalls issued directly from the task, not through
    /// `spawn_blocking`. Each tick holds a worker thread for the duration of
    /// one `read(2)` per group (or per counter with
    /// [`ReadLayout::PerCounter`](perf_group::ReadLayout::PerCounter)).
    pub fn spawn(
        self,
        sink: mpsc::Sender<ResultSet>,
        token: CancellationToken,
    ) -> JoinHandle<Result<(), SamplerError>> {
        tokio::spawn(self.run(sink, token))
    }

    /// Runs the sampling loop until cancelled or the sink is closed
    pub async fn run(
        mut self,
        sink: mpsc::Sender<ResultSet>,
        token: CancellationToken,
    ) -> Result<(), SamplerError> {
        if token.is_cancelled() {
            return Ok(());
        }

        // Enabling resets the counts, so it happens once for the whole run
        self.group.enable()?;
        debug!(
            "sampling {} counters every {:?}",
            self.group.len(),
            self.interval
        );

        loop {
            let snapshot = self.group.read_events()?;

            tokio::select! {
                _ = token.cancelled() => break,
                sent = sink.send(snapshot) => {
                    if sent.is_err() {
                        debug!("snapshot receiver dropped, stopping sampler");
                        break;
                    }
                }
            }

            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        self.group.disable()?;
        debug!("sampler stopped");
        Ok(())
    }
}
