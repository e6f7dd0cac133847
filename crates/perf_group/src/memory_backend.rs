use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::attr::EventAttr;
use crate::backend::{Backend, IoctlScope};
use crate::error::ControlOp;
use crate::read_format::{self, CounterReading, PERF_FORMAT_GROUP};

/// Calls observed by a [`MemoryBackend`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoryCall {
    Open {
        id: u64,
        attr: EventAttr,
        /// Id of the leader the counter was attached to
        leader: Option<u64>,
    },
    Control {
        id: u64,
        op: ControlOp,
        scope: IoctlScope,
    },
    Read {
        id: u64,
    },
    Release {
        id: u64,
    },
}

#[derive(Debug)]
struct SimCounter {
    id: u64,
    leader: u64,
    read_format: u64,
    value: u64,
    enabled: bool,
}

#[derive(Debug)]
struct State {
    next_id: u64,
    calls: Vec<MemoryCall>,
    counters: Vec<SimCounter>,
    rejected: HashMap<u64, i32>,
    failing: Vec<ControlOp>,
    canned: HashMap<u64, Vec<u8>>,
    increment: u64,
    time_enabled: u64,
    time_running: u64,
}

impl Default for State {
    fn default() -> Self {
        Self {
            next_id: 0x5a1,
            calls: Vec::new(),
            counters: Vec::new(),
            rejected: HashMap::new(),
            failing: Vec::new(),
            canned: HashMap::new(),
            increment: 100,
            time_enabled: 1000,
            time_running: 1000,
        }
    }
}

impl State {
    fn group_of(&self, id: u64) -> u64 {
        self.counters
            .iter()
            .find(|c| c.id == id)
            .map_or(id, |c| c.leader)
    }

    fn targets(&self, id: u64, scope: IoctlScope) -> Vec<usize> {
        let group = self.group_of(id);
        self.counters
            .iter()
            .enumerate()
            .filter(|(_, c)| match scope {
                IoctlScope::Single => c.id == id,
                IoctlScope::Group => c.leader == group,
            })
            .map(|(i, _)| i)
            .collect()
    }

    fn snapshot(&mut self, id: u64) -> io::Result<Vec<u8>> {
        let group = self.group_of(id);
        let increment = self.increment;
        for counter in self.counters.iter_mut().filter(|c| c.leader == group) {
            if counter.enabled {
                counter.value += increment;
            }
        }

        let counter = self
            .counters
            .iter()
            .find(|c| c.id == id)
            .ok_or_else(|| io::Error::from_raw_os_error(9))?; // EBADF

        if counter.read_format & PERF_FORMAT_GROUP != 0 {
            let values: Vec<(u64, u64)> = self
                .counters
                .iter()
                .filter(|c| c.leader == group)
                .map(|c| (c.value, c.id))
                .collect();
            Ok(read_format::encode_group(self.time_enabled, self.time_running, &values))
        } else {
            Ok(read_format::encode_single(&CounterReading {
                id,
                value: counter.value,
                time_enabled: self.time_enabled,
                time_running: self.time_running,
            }))
        }
    }
}

/// In-memory simulation of the perf counter interface
///
/// This is useful for testing code built on counter groups without access to
/// hardware counters. Counters of an enabled group advance by a fixed
/// increment on every read. Clones share state, so a clone kept by a test can
/// inspect a backend that was moved into a group.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    state: Arc<Mutex<State>>,
}

/// Handle to a simulated counter; dropping it releases the counter
#[derive(Debug)]
pub struct MemoryHandle {
    id: u64,
    state: Arc<Mutex<State>>,
}

impl MemoryHandle {
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for MemoryHandle {
    fn drop(&mut self) {
        let mut state = lock(&self.state);
        state.counters.retain(|c| c.id != self.id);
        state.calls.push(MemoryCall::Release { id: self.id });
    }
}

fn lock(state: &Mutex<State>) -> MutexGuard<'_, State> {
    // A panicking test thread must not hide the calls recorded so far
    state.lock().unwrap_or_else(|e| e.into_inner())
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens of counters with this config fail with `errno`
    pub fn reject_config(&self, config: u64, errno: i32) {
        lock(&self.state).rejected.insert(config, errno);
    }

    /// The next `op` fails with `EIO`
    pub fn fail_next(&self, op: ControlOp) {
        lock(&self.state).failing.push(op);
    }

    /// Every read of counter `id` returns `bytes` instead of a simulated snapshot
    pub fn set_read(&self, id: u64, bytes: Vec<u8>) {
        lock(&self.state).canned.insert(id, bytes);
    }

    /// Enabled/running times reported by simulated snapshots
    pub fn set_times(&self, time_enabled: u64, time_running: u64) {
        let mut state = lock(&self.state);
        state.time_enabled = time_enabled;
        state.time_running = time_running;
    }

    /// Amount every enabled counter advances per read
    pub fn set_increment(&self, increment: u64) {
        lock(&self.state).increment = increment;
    }

    pub fn calls(&self) -> Vec<MemoryCall> {
        lock(&self.state).calls.clone()
    }

    /// Number of counters currently open
    pub fn open_count(&self) -> usize {
        lock(&self.state).counters.len()
    }
}

impl Backend for MemoryBackend {
    type Handle = MemoryHandle;

    fn open(&self, attr: &EventAttr, leader: Option<&MemoryHandle>) -> io::Result<MemoryHandle> {
        let mut state = lock(&self.state);
        if let Some(&errno) = state.rejected.get(&attr.config) {
            return Err(io::Error::from_raw_os_error(errno));
        }

        let id = state.next_id;
        state.next_id += 0x1f;

        let leader = leader.map(|l| l.id);
        state.counters.push(SimCounter {
            id,
            leader: leader.unwrap_or(id),
            read_format: attr.read_format,
            value: 0,
            enabled: !attr.disabled,
        });
        state.calls.push(MemoryCall::Open {
            id,
            attr: *attr,
            leader,
        });

        Ok(MemoryHandle {
            id,
            state: self.state.clone(),
        })
    }

    fn id(&self, handle: &MemoryHandle) -> io::Result<u64> {
        Ok(handle.id)
    }

    fn control(&self, handle: &MemoryHandle, op: ControlOp, scope: IoctlScope) -> io::Result<()> {
        let mut state = lock(&self.state);
        state.calls.push(MemoryCall::Control {
            id: handle.id,
            op,
            scope,
        });

        if let Some(pos) = state.failing.iter().position(|&f| f == op) {
            state.failing.remove(pos);
            return Err(io::Error::from_raw_os_error(5)); // EIO
        }

        for i in state.targets(handle.id, scope) {
            let counter = &mut state.counters[i];
            match op {
                ControlOp::Reset => counter.value = 0,
                ControlOp::Enable => counter.enabled = true,
                ControlOp::Disable => counter.enabled = false,
            }
        }
        Ok(())
    }

    fn read(&self, handle: &MemoryHandle, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = lock(&self.state);
        state.calls.push(MemoryCall::Read { id: handle.id });

        let canned = state.canned.get(&handle.id).cloned();
        let bytes = match canned {
            Some(bytes) => bytes,
            None => state.snapshot(handle.id)?,
        };

        let n = bytes.len().min(buf.len());
        buf[..n].copy_from_slice(&bytes[..n]);
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attr::{CounterSpec, GroupOptions, HardwareEvent};
    use crate::read_format::{decode_group, ReadLayout};

    fn attr(leader: bool) -> EventAttr {
        let spec = CounterSpec::hardware(HardwareEvent::CpuCycles, "cycles");
        EventAttr::new(&spec, &GroupOptions::default(), leader)
    }

    #[test]
    fn test_group_enable_advances_all_members() {
        let backend = MemoryBackend::new();
        let leader = backend.open(&attr(true), None).unwrap();
        let child = backend.open(&attr(false), Some(&leader)).unwrap();
        assert_ne!(leader.id(), child.id());

        backend
            .control(&leader, ControlOp::Enable, IoctlScope::Group)
            .unwrap();

        let mut buf = vec![0u8; ReadLayout::Group.buffer_size(2)];
        let n = backend.read(&leader, &mut buf).unwrap();
        let reading = decode_group(&buf[..n], 2).unwrap();
        assert_eq!(reading.values, vec![(leader.id(), 100), (child.id(), 100)]);
    }

    #[test]
    fn test_release_on_drop() {
        let backend = MemoryBackend::new();
        let handle = backend.open(&attr(true), None).unwrap();
        let id = handle.id();
        assert_eq!(backend.open_count(), 1);

        drop(handle);
        assert_eq!(backend.open_count(), 0);
        assert_eq!(backend.calls().last(), Some(&MemoryCall::Release { id }));
    }

    #[test]
    fn test_rejected_config() {
        let backend = MemoryBackend::new();
        backend.reject_config(HardwareEvent::CpuCycles as u64, 13);

        let err = backend.open(&attr(true), None).unwrap_err();
        assert_eq!(err.raw_os_error(), Some(13));
        assert_eq!(backend.open_count(), 0);
    }
}
