//! # perf_group
//!
//! Hardware performance counters (cycles, instructions, cache and TLB events,
//! branch mispredictions) for the calling process, opened as one group so
//! they start and stop together.
//!
//! A [`CounterGroup`] owns the counters, issues enable/disable/reset to the
//! group leader, and decodes the kernel's binary read format back into named
//! values, scaling each value for multiplexing when the kernel had to
//! time-slice more counters than the CPU has hardware slots.
//!
//! The kernel interface sits behind the [`Backend`] trait: [`PerfBackend`]
//! uses `perf_event_open(2)` on Linux, [`MemoryBackend`] simulates it for
//! tests.

mod attr;
mod backend;
pub mod error;
mod group;
mod memory_backend;
#[cfg(target_os = "linux")]
mod perf_backend;
pub mod read_format;
mod result_set;

pub use attr::*;
pub use backend::*;
pub use error::{ControlError, ControlOp, Error, OpenError, ReadError};
pub use group::*;
pub use memory_backend::*;
#[cfg(target_os = "linux")]
pub use perf_backend::*;
pub use read_format::ReadLayout;
pub use result_set::*;
