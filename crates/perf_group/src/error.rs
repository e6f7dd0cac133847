use std::fmt;
use std::io;

use thiserror::Error;

use crate::attr::Domain;

/// Group control operations, all issued to the leader
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlOp {
    Reset,
    Enable,
    Disable,
}

impl fmt::Display for ControlOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ControlOp::Reset => "reset",
            ControlOp::Enable => "enable",
            ControlOp::Disable => "disable",
        };
        f.write_str(name)
    }
}

/// A counter could not be added to a group.
///
/// Only the failed counter is affected; the group keeps every counter it
/// already had and the caller may carry on with a reduced set.
#[derive(Error, Debug)]
pub enum OpenError {
    #[error("failed to open counter {name:?} ({domain}, config {config:#x}): {source}")]
    Open {
        name: String,
        domain: Domain,
        config: u64,
        source: io::Error,
    },

    #[error("failed to query kernel id of counter {name:?}: {source}")]
    Id { name: String, source: io::Error },
}

/// An enable, disable or reset of the whole group failed. The current
/// measurement window must be discarded.
#[derive(Error, Debug)]
pub enum ControlError {
    #[error("failed to {op} counter group: {source}")]
    Ioctl { op: ControlOp, source: io::Error },

    #[error("counter group has no leader")]
    NoLeader,
}

/// A read returned something that does not match how the group was built.
#[derive(Error, Debug)]
pub enum ReadError {
    #[error("failed to read counter group: {0}")]
    Io(#[from] io::Error),

    #[error("short read: expected {expected} bytes, got {actual}")]
    ShortRead { expected: usize, actual: usize },

    #[error("kernel reported {actual} counters, group has {expected}")]
    CountMismatch { expected: usize, actual: usize },

    #[error("kernel reported unknown counter id {0}")]
    UnknownId(u64),
}

/// Any error raised by this crate
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Open(#[from] OpenError),

    #[error(transparent)]
    Control(#[from] ControlError),

    #[error(transparent)]
    Read(#[from] ReadError),
}
