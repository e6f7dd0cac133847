//! Vendor-independent counter names accepted on the command line.
//!
//! Model-specific events are passed as raw codes written `r<hex>`, as perf(1)
//! accepts them, e.g. `rf760`.

use anyhow::{anyhow, Result};
use perf_group::{CacheLevel, CacheOp, CacheResult, CounterSpec, HardwareEvent, SoftwareEvent};

fn catalog() -> Vec<CounterSpec> {
    use CacheLevel::*;
    use CacheOp::*;
    use CacheResult::*;

    vec![
        CounterSpec::hardware(HardwareEvent::CpuCycles, "cycles"),
        CounterSpec::hardware(HardwareEvent::Instructions, "instructions"),
        CounterSpec::hardware(HardwareEvent::BranchInstructions, "branches"),
        CounterSpec::hardware(HardwareEvent::BranchMisses, "branch-misses"),
        CounterSpec::hardware(HardwareEvent::CacheMisses, "llc-cache-misses"),
        CounterSpec::hardware(HardwareEvent::CacheReferences, "llc-cache-accesses"),
        CounterSpec::hw_cache(L1d, Read, Miss, "l1d-cache-misses"),
        CounterSpec::hw_cache(L1d, Read, Access, "l1d-cache-accesses"),
        CounterSpec::hw_cache(L1d, Prefetch, Access, "l1d-cache-prefetch"),
        CounterSpec::hw_cache(Dtlb, Read, Miss, "dtlb-misses"),
        CounterSpec::software(SoftwareEvent::TaskClock, "task-clock"),
        CounterSpec::software(SoftwareEvent::PageFaults, "page-faults"),
    ]
}

/// Names of every known counter
pub fn names() -> Vec<String> {
    catalog().into_iter().map(|s| s.name).collect()
}

/// Resolves a counter name, or a raw event code written `r<hex>`
pub fn lookup(name: &str) -> Option<CounterSpec> {
    if let Some(spec) = catalog().into_iter().find(|s| s.name == name) {
        return Some(spec);
    }

    let code = name.strip_prefix('r')?;
    let code = code.strip_prefix("0x").unwrap_or(code);
    u64::from_str_radix(code, 16)
        .ok()
        .map(|config| CounterSpec::raw(config, name))
}

/// Resolves every name, failing on the first unknown one
pub fn lookup_all<S: AsRef<str>>(names: &[S]) -> Result<Vec<CounterSpec>> {
    names
        .iter()
        .map(|name| {
            let name = name.as_ref().trim();
            lookup(name).ok_or_else(|| {
                anyhow!(
                    "unknown counter {:?}, expected one of {} or a raw code like rf760",
                    name,
                    self::names().join(", ")
                )
            })
        })
        .collect()
}
