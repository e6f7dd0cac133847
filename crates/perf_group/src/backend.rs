use std::io;

use crate::attr::EventAttr;
use crate::error::ControlOp;

/// Whether a control operation applies to one descriptor or to the group
/// led by it (`PERF_IOC_FLAG_GROUP`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoctlScope {
    Single,
    Group,
}

/// Kernel interface a counter group is built on.
///
/// [`PerfBackend`](crate::PerfBackend) talks to `perf_event_open(2)`;
/// [`MemoryBackend`](crate::MemoryBackend) simulates it in memory.
/// Dropping a handle releases the kernel resource behind it.
pub trait Backend {
    type Handle;

    /// Opens a counter for the calling process on any CPU, as a child of
    /// `leader` if one is given.
    fn open(&self, attr: &EventAttr, leader: Option<&Self::Handle>) -> io::Result<Self::Handle>;

    /// Kernel-assigned id of an open counter (`PERF_EVENT_IOC_ID`)
    fn id(&self, handle: &Self::Handle) -> io::Result<u64>;

    fn control(&self, handle: &Self::Handle, op: ControlOp, scope: IoctlScope) -> io::Result<()>;

    /// Reads the counter snapshot into `buf`, returning the number of bytes read
    fn read(&self, handle: &Self::Handle, buf: &mut [u8]) -> io::Result<usize>;
}
