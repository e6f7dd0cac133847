//! Decoding of the buffers returned by `read(2)` on a perf event descriptor.
//!
//! The layout depends on the `read_format` bits the counter was opened with.
//! Two layouts are supported:
//!
//! ```text
//! Group (PERF_FORMAT_GROUP | ID | TOTAL_TIME_ENABLED | TOTAL_TIME_RUNNING),
//! read once from the leader:
//!
//!     u64 nr
//!     u64 time_enabled
//!     u64 time_running
//!     { u64 value; u64 id; } cntr[nr]
//!
//! PerCounter (ID | TOTAL_TIME_ENABLED | TOTAL_TIME_RUNNING),
//! read once from every descriptor:
//!
//!     u64 value
//!     u64 time_enabled
//!     u64 time_running
//!     u64 id
//! ```
//!
//! All fields are in host byte order. The decoders here are pure so they can
//! be exercised with hand-built buffers.

use std::mem::size_of;

use plain::Plain;

use crate::error::ReadError;

pub const PERF_FORMAT_TOTAL_TIME_ENABLED: u64 = 1 << 0;
pub const PERF_FORMAT_TOTAL_TIME_RUNNING: u64 = 1 << 1;
pub const PERF_FORMAT_ID: u64 = 1 << 2;
pub const PERF_FORMAT_GROUP: u64 = 1 << 3;

/// Binary layout a group is opened and read with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadLayout {
    /// One read on the leader returns every member, sharing one pair of
    /// enabled/running times
    #[default]
    Group,
    /// One read per descriptor, each with its own enabled/running times
    PerCounter,
}

impl ReadLayout {
    /// `read_format` bits to open every counter of the group with
    pub fn read_format(self) -> u64 {
        let base = PERF_FORMAT_ID | PERF_FORMAT_TOTAL_TIME_ENABLED | PERF_FORMAT_TOTAL_TIME_RUNNING;
        match self {
            ReadLayout::Group => base | PERF_FORMAT_GROUP,
            ReadLayout::PerCounter => base,
        }
    }

    /// Size of a single read for a group of `n_counters`
    pub fn buffer_size(self, n_counters: usize) -> usize {
        match self {
            ReadLayout::Group => size_of::<GroupHeader>() + n_counters * size_of::<GroupEntry>(),
            ReadLayout::PerCounter => size_of::<SingleRecord>(),
        }
    }
}

#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
struct GroupHeader {
    nr: u64,
    time_enabled: u64,
    time_running: u64,
}
unsafe impl Plain for GroupHeader {}

#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
struct GroupEntry {
    value: u64,
    id: u64,
}
unsafe impl Plain for GroupEntry {}

#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
struct SingleRecord {
    value: u64,
    time_enabled: u64,
    time_running: u64,
    id: u64,
}
unsafe impl Plain for SingleRecord {}

/// Raw value of one counter together with the times needed to scale it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterReading {
    pub id: u64,
    pub value: u64,
    pub time_enabled: u64,
    pub time_running: u64,
}

impl CounterReading {
    /// Value extrapolated to the whole window, `None` if the counter never ran
    pub fn scaled(&self) -> Option<u64> {
        scale(self.value, self.time_enabled, self.time_running)
    }
}

/// A decoded group read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupReading {
    pub time_enabled: u64,
    pub time_running: u64,
    /// `(id, value)` pairs in the order the kernel reported them
    pub values: Vec<(u64, u64)>,
}

impl GroupReading {
    /// Per-counter readings, each carrying the group's shared times
    pub fn counters(&self) -> impl Iterator<Item = CounterReading> + '_ {
        self.values.iter().map(|&(id, value)| CounterReading {
            id,
            value,
            time_enabled: self.time_enabled,
            time_running: self.time_running,
        })
    }
}

/// Corrects a raw count for multiplexing.
///
/// When the kernel time-slices more counters than it has hardware slots for,
/// `time_running < time_enabled` and the count only covers part of the
/// window. The result is `round(value * time_enabled / time_running)`.
/// A counter that never ran has no data and yields `None`, not zero.
pub fn scale(value: u64, time_enabled: u64, time_running: u64) -> Option<u64> {
    if time_running == 0 {
        return None;
    }
    if time_enabled == time_running {
        return Some(value);
    }

    let running = u128::from(time_running);
    let scaled = (u128::from(value) * u128::from(time_enabled) + running / 2) / running;
    Some(u64::try_from(scaled).unwrap_or(u64::MAX))
}

/// Decodes a group read and checks it reports exactly `expected_count`
/// counters.
pub fn decode_group(bytes: &[u8], expected_count: usize) -> Result<GroupReading, ReadError> {
    let mut header = GroupHeader::default();
    plain::copy_from_bytes(&mut header, bytes).map_err(|_| ReadError::ShortRead {
        expected: size_of::<GroupHeader>(),
        actual: bytes.len(),
    })?;

    let nr = usize::try_from(header.nr).unwrap_or(usize::MAX);
    if nr != expected_count {
        return Err(ReadError::CountMismatch {
            expected: expected_count,
            actual: nr,
        });
    }

    let needed = ReadLayout::Group.buffer_size(nr);
    if bytes.len() < needed {
        return Err(ReadError::ShortRead {
            expected: needed,
            actual: bytes.len(),
        });
    }

    let mut entries = vec![GroupEntry::default(); nr];
    plain::copy_from_bytes(entries.as_mut_slice(), &bytes[size_of::<GroupHeader>()..]).map_err(
        |_| ReadError::ShortRead {
            expected: needed,
            actual: bytes.len(),
        },
    )?;

    Ok(GroupReading {
        time_enabled: header.time_enabled,
        time_running: header.time_running,
        values: entries.iter().map(|e| (e.id, e.value)).collect(),
    })
}

/// Decodes the read of a single descriptor opened without `PERF_FORMAT_GROUP`
pub fn decode_single(bytes: &[u8]) -> Result<CounterReading, ReadError> {
    let mut record = SingleRecord::default();
    plain::copy_from_bytes(&mut record, bytes).map_err(|_| ReadError::ShortRead {
        expected: size_of::<SingleRecord>(),
        actual: bytes.len(),
    })?;

    Ok(CounterReading {
        id: record.id,
        value: record.value,
        time_enabled: record.time_enabled,
        time_running: record.time_running,
    })
}

/// Builds a group read buffer from `(value, id)` pairs, as the kernel would.
#[doc(hidden)]
pub fn encode_group(time_enabled: u64, time_running: u64, values: &[(u64, u64)]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(ReadLayout::Group.buffer_size(values.len()));
    buf.extend_from_slice(&(values.len() as u64).to_ne_bytes());
    buf.extend_from_slice(&time_enabled.to_ne_bytes());
    buf.extend_from_slice(&time_running.to_ne_bytes());
    for (value, id) in values {
        buf.extend_from_slice(&value.to_ne_bytes());
        buf.extend_from_slice(&id.to_ne_bytes());
    }
    buf
}

/// Builds a single-counter read buffer, as the kernel would.
#[doc(hidden)]
pub fn encode_single(reading: &CounterReading) -> Vec<u8> {
    let mut buf = Vec::with_capacity(size_of::<SingleRecord>());
    buf.extend_from_slice(&reading.value.to_ne_bytes());
    buf.extend_from_slice(&reading.time_enabled.to_ne_bytes());
    buf.extend_from_slice(&reading.time_running.to_ne_bytes());
    buf.extend_from_slice(&reading.id.to_ne_bytes());
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(10, 1000, 500, Some(20))]
    #[case(10, 1000, 1000, Some(10))]
    #[case(10, 1000, 0, None)]
    #[case(0, 1000, 0, None)]
    #[case(0, 1000, 250, Some(0))]
    #[case(7, 3, 2, Some(11))] // 10.5 rounds up
    #[case(1, 3, 2, Some(2))] // 1.5 rounds up
    #[case(1, 4, 3, Some(1))] // 1.33 rounds down
    #[case(u64::MAX, 2, 1, Some(u64::MAX))]
    fn test_scale(
        #[case] value: u64,
        #[case] enabled: u64,
        #[case] running: u64,
        #[case] expected: Option<u64>,
    ) {
        assert_eq!(scale(value, enabled, running), expected);
    }

    #[test]
    fn test_decode_group() {
        let buf = encode_group(1000, 500, &[(10, 42), (3, 7)]);
        assert_eq!(buf.len(), ReadLayout::Group.buffer_size(2));

        let reading = decode_group(&buf, 2).unwrap();
        assert_eq!(reading.time_enabled, 1000);
        assert_eq!(reading.time_running, 500);
        assert_eq!(reading.values, vec![(42, 10), (7, 3)]);

        let scaled: Vec<_> = reading.counters().map(|c| (c.id, c.scaled())).collect();
        assert_eq!(scaled, vec![(42, Some(20)), (7, Some(6))]);
    }

    #[test]
    fn test_decode_group_not_running() {
        let buf = encode_group(1000, 0, &[(10, 1)]);
        let reading = decode_group(&buf, 1).unwrap();
        assert!(reading.counters().all(|c| c.scaled().is_none()));
    }

    #[test]
    fn test_decode_group_count_mismatch() {
        let buf = encode_group(1, 1, &[(10, 1), (20, 2), (30, 3)]);
        match decode_group(&buf, 2) {
            Err(ReadError::CountMismatch { expected, actual }) => {
                assert_eq!(expected, 2);
                assert_eq!(actual, 3);
            }
            other => panic!("Expected CountMismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_group_short_read() {
        let mut buf = encode_group(1, 1, &[(10, 1), (20, 2)]);
        buf.truncate(buf.len() - 4);

        match decode_group(&buf, 2) {
            Err(ReadError::ShortRead { expected, actual }) => {
                assert_eq!(expected, 56);
                assert_eq!(actual, 52);
            }
            other => panic!("Expected ShortRead, got {:?}", other),
        }

        // Not even a header
        assert!(matches!(
            decode_group(&[0u8; 12], 0),
            Err(ReadError::ShortRead { expected: 24, actual: 12 })
        ));
    }

    #[test]
    fn test_decode_group_empty() {
        let buf = encode_group(5, 5, &[]);
        let reading = decode_group(&buf, 0).unwrap();
        assert!(reading.values.is_empty());
    }

    #[test]
    fn test_decode_single() {
        let expected = CounterReading {
            id: 99,
            value: 10,
            time_enabled: 1000,
            time_running: 500,
        };
        let buf = encode_single(&expected);
        assert_eq!(buf.len(), ReadLayout::PerCounter.buffer_size(3));

        let reading = decode_single(&buf).unwrap();
        assert_eq!(reading, expected);
        assert_eq!(reading.scaled(), Some(20));

        assert!(matches!(
            decode_single(&buf[..31]),
            Err(ReadError::ShortRead { expected: 32, actual: 31 })
        ));
    }

    #[test]
    fn test_read_format_bits() {
        assert_eq!(ReadLayout::Group.read_format(), 0b1111);
        assert_eq!(ReadLayout::PerCounter.read_format(), 0b0111);
    }
}
