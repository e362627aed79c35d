use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use propdex_core::config::UpdaterConfig;
use propdex_core::models::LoggerId;
use tracing::{info, warn};

use crate::cli::DaemonArgs;

use super::Runtime;

#[derive(Debug, serde::Serialize, Default)]
pub(super) struct DaemonReport {
    mode: String,
    interval_ms: u64,
    cycles: u32,
    missed_cycles: u32,
    pending_before: usize,
    pending_after: usize,
    indexed_documents: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    logger: Option<LoggerId>,
}

pub(super) fn run_daemon(runtime: &Runtime, args: &DaemonArgs) -> Result<DaemonReport> {
    let config = daemon_config(runtime.config.updater, args);
    let logger = config.logger;
    let mut report = DaemonReport {
        mode: "daemon".to_string(),
        interval_ms: u64::try_from(config.interval.as_millis()).unwrap_or(u64::MAX),
        pending_before: runtime.store.pending_change_count(logger)?,
        logger: Some(logger),
        ..DaemonReport::default()
    };

    let updater = runtime.updater(config);
    updater.start().context("failed to start updater")?;
    let started = Instant::now();

    // A batch that overruns delays the next one, so allow slack past the interval.
    let patience = config.interval.saturating_mul(2) + Duration::from_secs(1);
    let mut cycle = 0u32;
    loop {
        if args.cycles > 0 && cycle >= args.cycles {
            break;
        }
        cycle += 1;

        if updater.wait_for_next_batch(patience)? {
            report.cycles = cycle;
        } else {
            report.missed_cycles = report.missed_cycles.saturating_add(1);
            warn!(cycle, "no update batch completed within the expected window");
        }
    }

    updater.stop().context("failed to stop updater")?;
    report.pending_after = runtime.store.pending_change_count(logger)?;
    report.indexed_documents = runtime.index.document_count()?;
    info!(
        cycles = report.cycles,
        elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        "updater daemon finished"
    );
    Ok(report)
}

pub(super) fn daemon_config(base: UpdaterConfig, args: &DaemonArgs) -> UpdaterConfig {
    let mut config = base;
    if let Some(interval_ms) = args.interval_ms {
        config.interval = Duration::from_millis(interval_ms);
    }
    if let Some(max_changes) = args.max_changes {
        config.max_changes_per_update = max_changes;
    }
    config
}
