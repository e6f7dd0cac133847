use std::time::Duration;

use anyhow::{bail, Result};
use clap::{Parser, ValueEnum};
use log::info;
use time::macros::format_description;
use time::OffsetDateTime;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use perf_group::{GroupOptions, PerfBackend, ReadLayout, ResultSet};
use sampler::PeriodicSampler;

mod events;
mod task_completion_handler;

use task_completion_handler::task_completion_handler;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Layout {
    /// One read of the group leader returns every counter
    Group,
    /// Every counter is read on its own
    PerCounter,
}

impl From<Layout> for ReadLayout {
    fn from(layout: Layout) -> Self {
        match layout {
            Layout::Group => ReadLayout::Group,
            Layout::PerCounter => ReadLayout::PerCounter,
        }
    }
}

/// Periodically samples hardware performance counters of this process
#[derive(Debug, Parser)]
struct Command {
    /// Verbose debug output
    #[arg(short, long)]
    verbose: bool,

    /// Comma separated counters to sample; the first one that opens leads the group
    #[arg(short, long, value_delimiter = ',', default_value = "cycles,instructions")]
    events: Vec<String>,

    /// Sampling interval in milliseconds
    #[arg(short, long, default_value = "1000")]
    interval_ms: u64,

    /// Sampling duration in seconds (0 = until Ctrl-C)
    #[arg(short, long, default_value = "0")]
    duration: u64,

    /// Do not count events in kernel mode
    #[arg(long)]
    exclude_kernel: bool,

    /// Count events in the hypervisor too
    #[arg(long)]
    include_hypervisor: bool,

    /// Binary layout counters are read with
    #[arg(long, value_enum, default_value_t = Layout::Group)]
    layout: Layout,

    /// Print the known counter names and exit
    #[arg(long)]
    list: bool,
}

impl Command {
    fn group_options(&self) -> GroupOptions {
        GroupOptions {
            exclude_kernel: self.exclude_kernel,
            exclude_hypervisor: !self.include_hypervisor,
            layout: self.layout.into(),
        }
    }
}

fn format_time() -> String {
    // The local offset is unavailable once other threads run, fall back to UTC
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    let format = format_description!("[hour]:[minute]:[second].[subsecond digits:3]");
    now.format(&format)
        .unwrap_or_else(|_| "00:00:00.000".to_string())
}

fn log_snapshot(snapshot: &ResultSet) {
    info!("{} {}", format_time(), snapshot);
}

#[tokio::main]
async fn main() -> Result<()> {
    let opts = Command::parse();

    let default_level = if opts.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    if opts.list {
        for name in events::names() {
            println!("{}", name);
        }
        return Ok(());
    }

    let specs = events::lookup_all(&opts.events)?;
    let interval = Duration::from_millis(opts.interval_ms.max(1));
    let sampler = PeriodicSampler::new(PerfBackend, opts.group_options(), specs, interval)?;

    let names: Vec<_> = sampler.group().handles().iter().map(|h| h.name()).collect();
    info!(
        "Sampling {} every {:?} ({:?} layout)",
        names.join(","),
        interval,
        opts.layout
    );

    let (snapshot_tx, mut snapshot_rx) = mpsc::channel(16);
    let token = CancellationToken::new();

    let sampler_handle = sampler.spawn(snapshot_tx, token.clone());
    let completion = tokio::spawn({
        let token = token.clone();
        async move { task_completion_handler(sampler_handle, token, "sampler").await }
    });

    // Stop on Ctrl-C or once the requested duration has passed
    let shutdown_token = token.clone();
    let duration = opts.duration;
    tokio::spawn(async move {
        let deadline = async {
            if duration == 0 {
                std::future::pending::<()>().await
            } else {
                tokio::time::sleep(Duration::from_secs(duration)).await
            }
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("Received Ctrl-C, shutting down"),
            _ = deadline => info!("Sampled for {}s, shutting down", duration),
            _ = shutdown_token.cancelled() => {}
        }
        shutdown_token.cancel();
    });

    while let Some(snapshot) = snapshot_rx.recv().await {
        log_snapshot(&snapshot);
    }

    if !completion.await? {
        bail!("sampler stopped with an error");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_snapshot_is_one_info_line() {
        testing_logger::setup();

        let counters = BTreeMap::from([
            ("cycles".to_string(), Some(1000)),
            ("instructions".to_string(), None),
        ]);
        let snapshot = ResultSet::new(counters, Duration::from_micros(1500));
        log_snapshot(&snapshot);

        testing_logger::validate(|captured_logs| {
            assert_eq!(captured_logs.len(), 1);
            assert_eq!(captured_logs[0].level, log::Level::Info);
            assert!(captured_logs[0]
                .body
                .ends_with(" cycles=1000 instructions=n/a wall_clock_ms=1.500"));
        });
    }

    #[test]
    fn test_group_options_from_flags() {
        let opts = Command::parse_from([
            "collector",
            "--exclude-kernel",
            "--include-hypervisor",
            "--layout",
            "per-counter",
        ]);
        let options = opts.group_options();
        assert!(options.exclude_kernel);
        assert!(!options.exclude_hypervisor);
        assert_eq!(options.layout, ReadLayout::PerCounter);
    }
}
