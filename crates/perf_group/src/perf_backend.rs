#![cfg(target_os = "linux")]

use std::fs::File;
use std::io::{self, Read};
use std::os::unix::io::{AsRawFd, FromRawFd};

use perf_event_open_sys as sys;

use crate::attr::EventAttr;
use crate::backend::{Backend, IoctlScope};
use crate::error::ControlOp;

/// Backend using the `perf_event_open` syscall
///
/// This implementation is only available on Linux platforms.
#[derive(Debug, Default, Clone, Copy)]
pub struct PerfBackend;

impl Backend for PerfBackend {
    // Track ownership of the file descriptor; it is closed when the File drops
    type Handle = File;

    fn open(&self, event: &EventAttr, leader: Option<&File>) -> io::Result<File> {
        let mut attr = sys::bindings::perf_event_attr::default();
        attr.size = std::mem::size_of::<sys::bindings::perf_event_attr>() as u32;
        attr.type_ = event.type_;
        attr.config = event.config;
        attr.read_format = event.read_format;
        attr.set_disabled(u64::from(event.disabled));
        attr.set_exclude_kernel(u64::from(event.exclude_kernel));
        attr.set_exclude_hv(u64::from(event.exclude_hv));

        let group_fd = leader.map_or(-1, |file| file.as_raw_fd());

        let fd = unsafe {
            sys::perf_event_open(
                &mut attr,
                0,  // pid (this process)
                -1, // cpu (any)
                group_fd,
                sys::bindings::PERF_FLAG_FD_CLOEXEC as u64,
            )
        };

        if fd < 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(unsafe { File::from_raw_fd(fd) })
    }

    fn id(&self, handle: &File) -> io::Result<u64> {
        let mut id = 0u64;
        let ret = unsafe { sys::ioctls::ID(handle.as_raw_fd(), &mut id) };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(id)
    }

    fn control(&self, handle: &File, op: ControlOp, scope: IoctlScope) -> io::Result<()> {
        let fd = handle.as_raw_fd();
        let arg = match scope {
            IoctlScope::Single => 0,
            IoctlScope::Group => sys::bindings::PERF_IOC_FLAG_GROUP,
        };

        let ret = unsafe {
            match op {
                ControlOp::Reset => sys::ioctls::RESET(fd, arg),
                ControlOp::Enable => sys::ioctls::ENABLE(fd, arg),
                ControlOp::Disable => sys::ioctls::DISABLE(fd, arg),
            }
        };

        if ret < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    fn read(&self, handle: &File, buf: &mut [u8]) -> io::Result<usize> {
        let mut file = handle;
        file.read(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attr::{CounterSpec, Domain, GroupOptions, HardwareEvent};
    use crate::read_format::{
        ReadLayout, PERF_FORMAT_GROUP, PERF_FORMAT_ID, PERF_FORMAT_TOTAL_TIME_ENABLED,
        PERF_FORMAT_TOTAL_TIME_RUNNING,
    };

    #[test]
    fn test_abi_constants_match_bindings() {
        use sys::bindings as b;

        assert_eq!(Domain::Hardware.perf_type(), b::PERF_TYPE_HARDWARE);
        assert_eq!(Domain::Software.perf_type(), b::PERF_TYPE_SOFTWARE);
        assert_eq!(Domain::HwCache.perf_type(), b::PERF_TYPE_HW_CACHE);
        assert_eq!(Domain::Raw.perf_type(), b::PERF_TYPE_RAW);

        assert_eq!(HardwareEvent::CpuCycles as u64, u64::from(b::PERF_COUNT_HW_CPU_CYCLES));
        assert_eq!(HardwareEvent::Instructions as u64, u64::from(b::PERF_COUNT_HW_INSTRUCTIONS));
        assert_eq!(HardwareEvent::CacheMisses as u64, u64::from(b::PERF_COUNT_HW_CACHE_MISSES));
        assert_eq!(HardwareEvent::BranchMisses as u64, u64::from(b::PERF_COUNT_HW_BRANCH_MISSES));

        assert_eq!(PERF_FORMAT_TOTAL_TIME_ENABLED, u64::from(b::PERF_FORMAT_TOTAL_TIME_ENABLED));
        assert_eq!(PERF_FORMAT_TOTAL_TIME_RUNNING, u64::from(b::PERF_FORMAT_TOTAL_TIME_RUNNING));
        assert_eq!(PERF_FORMAT_ID, u64::from(b::PERF_FORMAT_ID));
        assert_eq!(PERF_FORMAT_GROUP, u64::from(b::PERF_FORMAT_GROUP));
    }

    #[test]
    fn test_open_and_query_id() {
        let backend = PerfBackend;
        let spec = CounterSpec::hardware(HardwareEvent::Instructions, "ins");
        let options = GroupOptions {
            exclude_kernel: true,
            layout: ReadLayout::PerCounter,
            ..GroupOptions::default()
        };

        let file = match backend.open(&EventAttr::new(&spec, &options, true), None) {
            Ok(f) => f,
            Err(e) => {
                // perf events may be forbidden (perf_event_paranoid, containers),
                // skip the test instead of failing
                println!("Skipping test due to error: {}", e);
                return;
            }
        };

        assert!(file.as_raw_fd() > 0);
        backend.id(&file).expect("failed to query id");
        backend
            .control(&file, ControlOp::Reset, IoctlScope::Single)
            .expect("failed to reset");
    }
}
