//! Counter requests and the attributes they are opened with.
//!
//! Numeric values in this module follow the kernel ABI in
//! `include/uapi/linux/perf_event.h`, so specs can be built and inspected on
//! any platform. The Linux backend checks them against the generated bindings.

use std::fmt;

use crate::read_format::ReadLayout;

/// Event category, the `type` field of `perf_event_attr`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Domain {
    /// Generalized hardware events (`PERF_TYPE_HARDWARE`)
    Hardware,
    /// Kernel software events (`PERF_TYPE_SOFTWARE`)
    Software,
    /// Cache events encoded as `id | op << 8 | result << 16` (`PERF_TYPE_HW_CACHE`)
    HwCache,
    /// Vendor-specific event codes passed through untouched (`PERF_TYPE_RAW`)
    Raw,
}

impl Domain {
    /// Value for the `type` field of `perf_event_attr`
    pub fn perf_type(self) -> u32 {
        match self {
            Domain::Hardware => 0,
            Domain::Software => 1,
            Domain::HwCache => 3,
            Domain::Raw => 4,
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Domain::Hardware => "hardware",
            Domain::Software => "software",
            Domain::HwCache => "hw-cache",
            Domain::Raw => "raw",
        };
        f.write_str(name)
    }
}

/// Generalized hardware events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u64)]
pub enum HardwareEvent {
    CpuCycles = 0,
    Instructions = 1,
    CacheReferences = 2,
    CacheMisses = 3,
    BranchInstructions = 4,
    BranchMisses = 5,
    BusCycles = 6,
    StalledCyclesFrontend = 7,
    StalledCyclesBackend = 8,
    RefCpuCycles = 9,
}

/// Software events maintained by the kernel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u64)]
pub enum SoftwareEvent {
    CpuClock = 0,
    TaskClock = 1,
    PageFaults = 2,
    ContextSwitches = 3,
    CpuMigrations = 4,
}

/// Cache selected by a `HwCache` event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u64)]
pub enum CacheLevel {
    L1d = 0,
    L1i = 1,
    /// Last level cache
    Ll = 2,
    Dtlb = 3,
    Itlb = 4,
    /// Branch prediction unit
    Bpu = 5,
    Node = 6,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u64)]
pub enum CacheOp {
    Read = 0,
    Write = 1,
    Prefetch = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u64)]
pub enum CacheResult {
    Access = 0,
    Miss = 1,
}

/// A request to track one event.
///
/// The name is the key the event's value is reported under. Names are not
/// checked for uniqueness; if two counters share a name the later one wins
/// when results are collected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterSpec {
    pub config: u64,
    pub domain: Domain,
    pub name: String,
}

impl CounterSpec {
    pub fn new(config: u64, domain: Domain, name: impl Into<String>) -> Self {
        Self {
            config,
            domain,
            name: name.into(),
        }
    }

    pub fn hardware(event: HardwareEvent, name: impl Into<String>) -> Self {
        Self::new(event as u64, Domain::Hardware, name)
    }

    pub fn software(event: SoftwareEvent, name: impl Into<String>) -> Self {
        Self::new(event as u64, Domain::Software, name)
    }

    /// Builds a cache event, e.g. L1d read misses:
    ///
    /// ```
    /// use perf_group::{CacheLevel, CacheOp, CacheResult, CounterSpec};
    ///
    /// let spec = CounterSpec::hw_cache(CacheLevel::L1d, CacheOp::Read, CacheResult::Miss, "l1d-misses");
    /// assert_eq!(spec.config, 0x10000);
    /// ```
    pub fn hw_cache(
        cache: CacheLevel,
        op: CacheOp,
        result: CacheResult,
        name: impl Into<String>,
    ) -> Self {
        let config = cache as u64 | (op as u64) << 8 | (result as u64) << 16;
        Self::new(config, Domain::HwCache, name)
    }

    /// Raw vendor event code (umask + event select), taken from the vendor's
    /// event catalog.
    pub fn raw(config: u64, name: impl Into<String>) -> Self {
        Self::new(config, Domain::Raw, name)
    }
}

/// Options shared by every counter in a group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupOptions {
    /// Do not count events that happen in kernel mode.
    ///
    /// Counting kernel mode usually needs `perf_event_paranoid <= 1` or
    /// `CAP_PERFMON`.
    pub exclude_kernel: bool,
    /// Do not count events that happen in the hypervisor
    pub exclude_hypervisor: bool,
    /// Binary layout the group is read with. Fixed for the group's lifetime.
    pub layout: ReadLayout,
}

impl Default for GroupOptions {
    fn default() -> Self {
        Self {
            exclude_kernel: false,
            exclude_hypervisor: true,
            layout: ReadLayout::Group,
        }
    }
}

/// The subset of `perf_event_attr` this crate sets when opening a counter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventAttr {
    pub type_: u32,
    pub config: u64,
    /// Leaders start disabled, children follow the leader's state
    pub disabled: bool,
    pub exclude_kernel: bool,
    pub exclude_hv: bool,
    pub read_format: u64,
}

impl EventAttr {
    pub fn new(spec: &CounterSpec, options: &GroupOptions, leader: bool) -> Self {
        Self {
            type_: spec.domain.perf_type(),
            config: spec.config,
            disabled: leader,
            exclude_kernel: options.exclude_kernel,
            exclude_hv: options.exclude_hypervisor,
            read_format: options.layout.read_format(),
        }
    }
}
