//! Incremental index updater.
//!
//! A single background thread drains the change log on a fixed-rate
//! schedule and applies the net changes to the index. Each batch runs in a
//! store transaction: change-log entries are removed only once the index
//! commit succeeded, so a crash in between replays the batch, which is
//! harmless because updates always delete-then-re-add.

use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::config::UpdaterConfig;
use crate::dao::{ChangeLogDao, IndexDao, TransactionManager};
use crate::error::{PropdexError, Result};
use crate::index::PropertySetIndex;
use crate::models::{BatchReport, SkipReason, UpdaterState};

mod batch;

use batch::{AppliedChanges, apply_changes};

pub struct IncrementalUpdater {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

struct Shared {
    index: Arc<dyn PropertySetIndex>,
    index_dao: Arc<dyn IndexDao>,
    change_log: Arc<dyn ChangeLogDao>,
    transactions: Arc<dyn TransactionManager>,
    config: UpdaterConfig,
    /// Serializes batches; never held while waiting on the schedule.
    batch_gate: Mutex<()>,
    schedule: Mutex<Schedule>,
    wake_worker: Condvar,
    batch_completed: Condvar,
}

#[derive(Debug)]
struct Schedule {
    state: UpdaterState,
    stop_requested: bool,
    completed_batches: u64,
}

impl std::fmt::Debug for IncrementalUpdater {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IncrementalUpdater")
            .field("config", &self.shared.config)
            .finish_non_exhaustive()
    }
}

impl IncrementalUpdater {
    pub fn new(
        index: Arc<dyn PropertySetIndex>,
        index_dao: Arc<dyn IndexDao>,
        change_log: Arc<dyn ChangeLogDao>,
        transactions: Arc<dyn TransactionManager>,
        config: UpdaterConfig,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                index,
                index_dao,
                change_log,
                transactions,
                config,
                batch_gate: Mutex::new(()),
                schedule: Mutex::new(Schedule {
                    state: UpdaterState::Stopped,
                    stop_requested: false,
                    completed_batches: 0,
                }),
                wake_worker: Condvar::new(),
                batch_completed: Condvar::new(),
            }),
            worker: Mutex::new(None),
        }
    }

    /// Wires every store-side collaborator to one store value.
    pub fn with_store<S>(index: Arc<dyn PropertySetIndex>, store: Arc<S>, config: UpdaterConfig) -> Self
    where
        S: IndexDao + ChangeLogDao + TransactionManager + 'static,
    {
        let index_dao: Arc<dyn IndexDao> = store.clone();
        let change_log: Arc<dyn ChangeLogDao> = store.clone();
        Self::new(index, index_dao, change_log, store, config)
    }

    #[must_use]
    pub fn config(&self) -> &UpdaterConfig {
        &self.shared.config
    }

    pub fn state(&self) -> Result<UpdaterState> {
        Ok(self.shared.lock_schedule()?.state)
    }

    /// Spawns the scheduler thread. Starting a running updater is a no-op.
    pub fn start(&self) -> Result<()> {
        let mut worker = self
            .worker
            .lock()
            .map_err(|_| PropdexError::mutex_poisoned("updater worker"))?;
        if worker.is_some() {
            return Ok(());
        }

        {
            let mut schedule = self.shared.lock_schedule()?;
            schedule.stop_requested = false;
            schedule.state = UpdaterState::Running;
        }

        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name("propdex-updater".to_string())
            .spawn(move || run_worker(&shared));
        match spawned {
            Ok(handle) => {
                *worker = Some(handle);
                info!(
                    interval_ms = u64::try_from(self.shared.config.interval.as_millis()).unwrap_or(u64::MAX),
                    max_changes = self.shared.config.max_changes_per_update,
                    logger = %self.shared.config.logger,
                    "incremental updater started"
                );
                Ok(())
            }
            Err(err) => {
                self.shared.lock_schedule()?.state = UpdaterState::Stopped;
                Err(err.into())
            }
        }
    }

    /// Cancels future runs and waits for an in-flight batch to finish.
    pub fn stop(&self) -> Result<()> {
        let handle = self
            .worker
            .lock()
            .map_err(|_| PropdexError::mutex_poisoned("updater worker"))?
            .take();
        let Some(handle) = handle else {
            return Ok(());
        };

        {
            let mut schedule = self.shared.lock_schedule()?;
            schedule.stop_requested = true;
        }
        self.shared.wake_worker.notify_all();

        let joined = handle.join();
        {
            let mut schedule = self.shared.lock_schedule()?;
            schedule.state = UpdaterState::Stopped;
            schedule.stop_requested = false;
        }
        joined.map_err(|_| PropdexError::Internal("updater worker panicked".to_string()))?;
        info!("incremental updater stopped");
        Ok(())
    }

    /// Blocks until the next scheduled batch completes, successfully or
    /// not. Returns `false` when `timeout` elapses first.
    pub fn wait_for_next_batch(&self, timeout: Duration) -> Result<bool> {
        let deadline = Instant::now() + timeout;
        let mut schedule = self.shared.lock_schedule()?;
        let seen = schedule.completed_batches;
        while schedule.completed_batches == seen {
            let now = Instant::now();
            if now >= deadline {
                return Ok(false);
            }
            let (guard, _) = self
                .shared
                .batch_completed
                .wait_timeout(schedule, deadline - now)
                .map_err(|_| PropdexError::mutex_poisoned("updater schedule"))?;
            schedule = guard;
        }
        Ok(true)
    }

    /// Runs one batch on the caller's thread. Waits for a batch already in
    /// flight on the scheduler thread.
    pub fn execute_update_batch(&self) -> Result<BatchReport> {
        self.shared.execute_update_batch()
    }
}

impl Drop for IncrementalUpdater {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            warn!(error = %err, "failed to stop incremental updater");
        }
    }
}

impl Shared {
    fn lock_schedule(&self) -> Result<MutexGuard<'_, Schedule>> {
        self.schedule
            .lock()
            .map_err(|_| PropdexError::mutex_poisoned("updater schedule"))
    }

    fn execute_update_batch(&self) -> Result<BatchReport> {
        let _batch = self
            .batch_gate
            .lock()
            .map_err(|_| PropdexError::mutex_poisoned("updater batch"))?;

        if self.index.is_cluster_shared_read_only() {
            debug!("index is cluster-shared read-only; skipping update batch");
            return Ok(BatchReport::skipped(SkipReason::ClusterReadOnly, 0));
        }

        let mut report = BatchReport::default();
        self.transactions.in_transaction(&mut || {
            report = self.drain_change_log()?;
            Ok(())
        })?;
        Ok(report)
    }

    fn drain_change_log(&self) -> Result<BatchReport> {
        let logger = self.config.logger;
        let entries = self
            .change_log
            .change_log_entries(logger, self.config.max_changes_per_update)?;
        if entries.is_empty() {
            return Ok(BatchReport::default());
        }

        let Some(applied) =
            apply_changes(self.index.as_ref(), self.index_dao.as_ref(), &entries)?
        else {
            error!(
                pending = entries.len(),
                logger_type = logger.logger_type,
                logger_id = logger.logger_id,
                "index lock unavailable; changes stay queued for the next run"
            );
            return Ok(BatchReport::skipped(
                SkipReason::IndexLockUnavailable,
                entries.len(),
            ));
        };

        let removed = self.change_log.remove_change_log_entries(&entries)?;
        let AppliedChanges {
            deleted,
            updated,
            fetched_from_store,
        } = applied;
        info!(
            fetched = entries.len(),
            deleted,
            updated,
            fetched_from_store,
            logger_type = logger.logger_type,
            logger_id = logger.logger_id,
            "update batch applied"
        );
        Ok(BatchReport {
            fetched: entries.len(),
            deleted,
            updated,
            fetched_from_store,
            removed_from_change_log: removed,
            skipped: None,
        })
    }

    fn notify_batch_completed(&self) -> Result<()> {
        let mut schedule = self.lock_schedule()?;
        schedule.completed_batches = schedule.completed_batches.wrapping_add(1);
        drop(schedule);
        self.batch_completed.notify_all();
        Ok(())
    }

    /// Sleeps until `next_run`, returning `false` once a stop is requested.
    fn wait_until(&self, next_run: Instant) -> Result<bool> {
        let mut schedule = self.lock_schedule()?;
        loop {
            if schedule.stop_requested {
                return Ok(false);
            }
            let now = Instant::now();
            if now >= next_run {
                return Ok(true);
            }
            let (guard, _) = self
                .wake_worker
                .wait_timeout(schedule, next_run - now)
                .map_err(|_| PropdexError::mutex_poisoned("updater schedule"))?;
            schedule = guard;
        }
    }
}

fn run_worker(shared: &Shared) {
    let interval = shared.config.interval;
    let mut next_run = Instant::now() + interval;
    loop {
        match shared.wait_until(next_run) {
            Ok(true) => {}
            Ok(false) => break,
            Err(err) => {
                error!(error = %err, "updater scheduler failed; worker exiting");
                break;
            }
        }

        match shared.execute_update_batch() {
            Ok(report) if report.is_noop() => {}
            Ok(report) => debug!(?report, "scheduled update batch finished"),
            Err(err) => error!(
                error = %err,
                code = err.code(),
                "update batch failed; change log kept for the next run"
            ),
        }
        if let Err(err) = shared.notify_batch_completed() {
            error!(error = %err, "updater scheduler failed; worker exiting");
            break;
        }

        // Fixed rate: an overrunning batch starts the next one immediately.
        next_run += interval;
        let now = Instant::now();
        if next_run < now {
            next_run = now;
        }
    }
}
