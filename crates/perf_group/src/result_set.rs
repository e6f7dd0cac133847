use std::collections::btree_map;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Name the wall clock duration is reported under
pub const WALL_CLOCK_KEY: &str = "wall_clock_ms";

/// Values of one read of a counter group, keyed by counter name.
///
/// A value of `None` means the counter did not run at all during the window
/// (it lost every multiplexing slot), which is different from counting zero
/// events. The wall clock duration of the window is always present.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultSet {
    counters: BTreeMap<String, Option<u64>>,
    wall_clock: Duration,
}

impl ResultSet {
    pub fn new(counters: BTreeMap<String, Option<u64>>, wall_clock: Duration) -> Self {
        Self {
            counters,
            wall_clock,
        }
    }

    /// Value of a counter: `None` if no such counter, `Some(None)` if it has no data
    pub fn get(&self, name: &str) -> Option<Option<u64>> {
        self.counters.get(name).copied()
    }

    pub fn counters(&self) -> &BTreeMap<String, Option<u64>> {
        &self.counters
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, Option<u64>> {
        self.counters.iter()
    }

    pub fn wall_clock(&self) -> Duration {
        self.wall_clock
    }

    pub fn wall_clock_ms(&self) -> f64 {
        self.wall_clock.as_secs_f64() * 1000.0
    }

    /// Number of entries including the wall clock
    pub fn len(&self) -> usize {
        self.counters.len() + 1
    }

    /// A result set always holds the wall clock, so it is never empty
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Entry names, counters in sorted order followed by [`WALL_CLOCK_KEY`]
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.counters
            .keys()
            .map(String::as_str)
            .chain(std::iter::once(WALL_CLOCK_KEY))
    }
}

impl fmt::Display for ResultSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in &self.counters {
            match value {
                Some(v) => write!(f, "{}={} ", name, v)?,
                None => write!(f, "{}=n/a ", name)?,
            }
        }
        write!(f, "{}={:.3}", WALL_CLOCK_KEY, self.wall_clock_ms())
    }
}
