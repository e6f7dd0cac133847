use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use log::debug;

use crate::attr::{CounterSpec, Domain, EventAttr, GroupOptions};
use crate::backend::{Backend, IoctlScope};
use crate::error::{ControlError, ControlOp, OpenError, ReadError};
use crate::read_format::{self, CounterReading, ReadLayout};
use crate::result_set::ResultSet;

/// One opened counter of a group
#[derive(Debug)]
pub struct CounterHandle<H> {
    is_leader: bool,
    kernel_id: u64,
    name: String,
    config: u64,
    domain: Domain,
    handle: H,
}

impl<H> CounterHandle<H> {
    pub fn is_leader(&self) -> bool {
        self.is_leader
    }

    /// Id assigned by the kernel at open time. Opaque, not sequential.
    pub fn kernel_id(&self) -> u64 {
        self.kernel_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> u64 {
        self.config
    }

    pub fn domain(&self) -> Domain {
        self.domain
    }

    pub fn handle(&self) -> &H {
        &self.handle
    }
}

/// A set of counters opened as one group and started and stopped together.
///
/// The first counter added becomes the group leader and every later counter
/// is attached to it. Enable, disable and reset are issued to the leader only,
/// scoped to the whole group, so all members start and stop at the same
/// instant and ratios between them stay meaningful.
///
/// A group is not synchronized; callers sharing one across threads must
/// serialize access themselves.
///
/// ```no_run
/// use perf_group::{CounterGroup, CounterSpec, GroupOptions, HardwareEvent, PerfBackend};
///
/// let mut group = CounterGroup::new(PerfBackend, GroupOptions::default());
/// group.add_counter(CounterSpec::hardware(HardwareEvent::CpuCycles, "cycles"))?;
/// group.add_counter(CounterSpec::hardware(HardwareEvent::Instructions, "ins"))?;
///
/// group.enable()?;
/// // ... workload ...
/// group.disable()?;
///
/// let results = group.read_events()?;
/// println!("{}", results);
/// # Ok::<(), perf_group::Error>(())
/// ```
pub struct CounterGroup<B: Backend> {
    backend: B,
    options: GroupOptions,
    handles: Vec<CounterHandle<B::Handle>>,
    enabled_at: Option<Instant>,
    disabled_at: Option<Instant>,
}

impl<B: Backend> CounterGroup<B> {
    pub fn new(backend: B, options: GroupOptions) -> Self {
        Self {
            backend,
            options,
            handles: Vec::new(),
            enabled_at: None,
            disabled_at: None,
        }
    }

    /// Opens a counter and adds it to the group.
    ///
    /// The first counter becomes the leader and is opened disabled; later
    /// counters are attached to the leader and follow its state. On failure
    /// the group is left unchanged.
    pub fn add_counter(
        &mut self,
        spec: CounterSpec,
    ) -> Result<&CounterHandle<B::Handle>, OpenError> {
        let is_leader = self.handles.is_empty();
        let attr = EventAttr::new(&spec, &self.options, is_leader);
        let leader = self.handles.first().map(|h| &h.handle);

        let handle = self
            .backend
            .open(&attr, leader)
            .map_err(|source| OpenError::Open {
                name: spec.name.clone(),
                domain: spec.domain,
                config: spec.config,
                source,
            })?;

        let kernel_id = self
            .backend
            .id(&handle)
            .map_err(|source| OpenError::Id {
                name: spec.name.clone(),
                source,
            })?;

        debug!(
            "opened counter {:?} ({}, config {:#x}) id={} leader={}",
            spec.name, spec.domain, spec.config, kernel_id, is_leader
        );

        self.handles.push(CounterHandle {
            is_leader,
            kernel_id,
            name: spec.name,
            config: spec.config,
            domain: spec.domain,
            handle,
        });

        Ok(&self.handles[self.handles.len() - 1])
    }

    /// Zeroes every counter and starts the whole group counting.
    pub fn enable(&mut self) -> Result<(), ControlError> {
        self.control(ControlOp::Reset)?;
        self.control(ControlOp::Enable)?;
        self.enabled_at = Some(Instant::now());
        self.disabled_at = None;
        Ok(())
    }

    /// Stops the whole group, closing the measurement window.
    pub fn disable(&mut self) -> Result<(), ControlError> {
        self.control(ControlOp::Disable)?;
        self.disabled_at = Some(Instant::now());
        Ok(())
    }

    /// Zeroes every counter without changing whether the group is counting.
    pub fn reset(&mut self) -> Result<(), ControlError> {
        self.control(ControlOp::Reset)
    }

    fn control(&self, op: ControlOp) -> Result<(), ControlError> {
        let leader = self.leader().ok_or(ControlError::NoLeader)?;
        self.backend
            .control(&leader.handle, op, IoctlScope::Group)
            .map_err(|source| ControlError::Ioctl { op, source })?;
        debug!("{} counter group of {}", op, self.handles.len());
        Ok(())
    }

    /// Reads the group and returns scaled values keyed by counter name.
    ///
    /// Reading an enabled group is allowed and returns a live snapshot; the
    /// counters keep running.
    pub fn read_events(&self) -> Result<ResultSet, ReadError> {
        let readings = match self.options.layout {
            ReadLayout::Group => self.read_group()?,
            ReadLayout::PerCounter => self.read_each()?,
        };

        let mut counters = BTreeMap::new();
        for reading in readings {
            let handle = self
                .handles
                .iter()
                .find(|h| h.kernel_id == reading.id)
                .ok_or(ReadError::UnknownId(reading.id))?;
            counters.insert(handle.name.clone(), reading.scaled());
        }

        Ok(ResultSet::new(counters, self.wall_clock()))
    }

    fn read_group(&self) -> Result<Vec<CounterReading>, ReadError> {
        let leader = match self.leader() {
            Some(leader) => leader,
            None => return Ok(Vec::new()),
        };

        let mut buf = vec![0u8; ReadLayout::Group.buffer_size(self.handles.len())];
        let n = self.backend.read(&leader.handle, &mut buf)?;
        let reading = read_format::decode_group(&buf[..n], self.handles.len())?;
        Ok(reading.counters().collect())
    }

    fn read_each(&self) -> Result<Vec<CounterReading>, ReadError> {
        let mut buf = vec![0u8; ReadLayout::PerCounter.buffer_size(1)];
        self.handles
            .iter()
            .map(|h| {
                let n = self.backend.read(&h.handle, &mut buf)?;
                read_format::decode_single(&buf[..n])
            })
            .collect()
    }

    /// Length of the current measurement window.
    ///
    /// Measured up to now while the group is still enabled, zero if it was
    /// never enabled.
    pub fn wall_clock(&self) -> Duration {
        match (self.enabled_at, self.disabled_at) {
            (Some(start), Some(end)) => end.saturating_duration_since(start),
            (Some(start), None) => start.elapsed(),
            (None, _) => Duration::ZERO,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled_at.is_some() && self.disabled_at.is_none()
    }

    pub fn leader(&self) -> Option<&CounterHandle<B::Handle>> {
        self.handles.first()
    }

    /// Counters in registration order, leader first
    pub fn handles(&self) -> &[CounterHandle<B::Handle>] {
        &self.handles
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn options(&self) -> &GroupOptions {
        &self.options
    }
}

impl<B: Backend> Drop for CounterGroup<B> {
    fn drop(&mut self) {
        // Children first, the leader must outlive every member of its group
        while let Some(handle) = self.handles.pop() {
            drop(handle);
        }
    }
}
