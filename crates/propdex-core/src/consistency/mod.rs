//! Offline comparison of the index against the authoritative store.
//!
//! The check assumes exclusive access: nothing else may write the index
//! between `execute` and `repair_errors`. Only the index's own write lock is
//! taken, and only while repairing.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, error, info, warn};

use crate::config::CheckConfig;
use crate::dao::{IndexDao, PropertySetRecord};
use crate::error::{PropdexError, Result};
use crate::index::{IndexWriteGuard, PropertySetIndex, RandomAccessor};
use crate::models::{AbortReason, CheckStatus, ConsistencyReport, RepairReport};

mod inconsistency;

pub use inconsistency::Inconsistency;

const ERROR_SAMPLE_LIMIT: usize = 50;

/// Cooperative interruption signal shared between the check and whoever
/// wants to cancel it.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(PropdexError::Interrupted(
                "consistency check cancelled".to_string(),
            ))
        } else {
            Ok(())
        }
    }
}

pub struct ConsistencyCheck<'a> {
    index: &'a dyn PropertySetIndex,
    index_dao: &'a dyn IndexDao,
    config: CheckConfig,
    status: CheckStatus,
    errors: Vec<Inconsistency>,
    property_sets_checked: usize,
    index_uris_checked: usize,
}

impl std::fmt::Debug for ConsistencyCheck<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsistencyCheck")
            .field("status", &self.status)
            .field("errors", &self.errors.len())
            .finish_non_exhaustive()
    }
}

impl<'a> ConsistencyCheck<'a> {
    #[must_use]
    pub fn new(
        index: &'a dyn PropertySetIndex,
        index_dao: &'a dyn IndexDao,
        config: CheckConfig,
    ) -> Self {
        Self {
            index,
            index_dao,
            config,
            status: CheckStatus::NotRun,
            errors: Vec::new(),
            property_sets_checked: 0,
            index_uris_checked: 0,
        }
    }

    /// Runs a check and hands it back only when it completed.
    pub fn run(
        index: &'a dyn PropertySetIndex,
        index_dao: &'a dyn IndexDao,
        config: CheckConfig,
        cancel: &CancellationFlag,
    ) -> Result<Self> {
        let mut check = Self::new(index, index_dao, config);
        check.execute(cancel)?;
        Ok(check)
    }

    /// Runs the check. On failure the inconsistencies collected so far stay
    /// inspectable, but the check is marked aborted and cannot be repaired.
    pub fn execute(&mut self, cancel: &CancellationFlag) -> Result<()> {
        self.errors.clear();
        self.property_sets_checked = 0;
        self.index_uris_checked = 0;
        self.status = CheckStatus::NotRun;

        if let Err(err) = self.index.validate_storage_facility() {
            error!(
                error = %err,
                "index storage failed its self test; a full re-index is required"
            );
            self.status = CheckStatus::Aborted(abort_reason(&err));
            return Err(err);
        }

        match self.scan(cancel) {
            Ok(()) => {
                self.status = CheckStatus::Completed;
                info!(
                    property_sets = self.property_sets_checked,
                    index_uris = self.index_uris_checked,
                    errors = self.errors.len(),
                    "consistency check completed"
                );
                Ok(())
            }
            Err(err) => {
                self.status = CheckStatus::Aborted(abort_reason(&err));
                error!(
                    error = %err,
                    property_sets = self.property_sets_checked,
                    errors = self.errors.len(),
                    "consistency check aborted"
                );
                Err(err)
            }
        }
    }

    #[must_use]
    pub const fn status(&self) -> CheckStatus {
        self.status
    }

    #[must_use]
    pub const fn is_completed(&self) -> bool {
        self.status.is_completed()
    }

    #[must_use]
    pub fn errors(&self) -> &[Inconsistency] {
        &self.errors
    }

    #[must_use]
    pub fn report(&self) -> ConsistencyReport {
        let mut counts_by_kind = BTreeMap::new();
        for inconsistency in &self.errors {
            *counts_by_kind.entry(inconsistency.kind()).or_insert(0) += 1;
        }
        ConsistencyReport {
            status: self.status,
            property_sets_checked: self.property_sets_checked,
            index_uris_checked: self.index_uris_checked,
            error_count: self.errors.len(),
            counts_by_kind,
            errors_sample: self
                .errors
                .iter()
                .take(ERROR_SAMPLE_LIMIT)
                .map(Inconsistency::description)
                .collect(),
        }
    }

    /// Repairs every repairable inconsistency under the index lock and
    /// commits. With `abort_on_failure` the first failure is returned after
    /// committing the repairs made so far.
    pub fn repair_errors(&self, abort_on_failure: bool) -> Result<RepairReport> {
        if !self.status.is_completed() {
            return Err(PropdexError::CheckIncomplete);
        }
        let Some(_guard) = IndexWriteGuard::try_acquire(self.index) else {
            return Err(PropdexError::IndexLockUnavailable(
                "consistency repair".to_string(),
            ));
        };

        let mut report = RepairReport::default();
        for inconsistency in &self.errors {
            if !inconsistency.can_repair() {
                warn!(
                    uri = %inconsistency.uri(),
                    kind = %inconsistency.kind(),
                    "inconsistency cannot be repaired; skipping"
                );
                report.skipped += 1;
                continue;
            }

            report.attempted += 1;
            match inconsistency.repair(self.index) {
                Ok(()) => {
                    debug!(uri = %inconsistency.uri(), kind = %inconsistency.kind(), "repaired");
                    report.repaired += 1;
                }
                Err(err) => {
                    error!(
                        uri = %inconsistency.uri(),
                        kind = %inconsistency.kind(),
                        error = %err,
                        "repair failed"
                    );
                    report.failed += 1;
                    report.failures.push(format!("{inconsistency}: {err}"));
                    if abort_on_failure {
                        self.commit_repairs()?;
                        return Err(PropdexError::RepairFailed {
                            uri: inconsistency.uri(),
                            reason: err.to_string(),
                        });
                    }
                }
            }
        }

        self.commit_repairs()?;
        info!(
            repaired = report.repaired,
            skipped = report.skipped,
            failed = report.failed,
            "consistency repair finished"
        );
        Ok(report)
    }

    /// Staged repairs must not outlive a failed commit, or the next lock
    /// holder would publish them.
    fn commit_repairs(&self) -> Result<()> {
        self.index.commit().inspect_err(|err| {
            error!(error = %err, "repair commit failed; discarding staged repairs");
            self.index.rollback();
        })
    }

    fn scan(&mut self, cancel: &CancellationFlag) -> Result<()> {
        let index = self.index;
        let index_dao = self.index_dao;
        let accessor = index.random_accessor()?;
        let mut valid_uris = HashSet::new();

        for record in index_dao.ordered_property_set_iteration()? {
            cancel.check()?;
            let record = record?;
            let uri = record.0.uri.as_path();
            self.check_property_set(accessor.as_ref(), &uri, record)?;
            valid_uris.insert(uri);

            self.property_sets_checked += 1;
            if self.property_sets_checked % self.config.progress_interval.max(1) == 0 {
                info!(
                    property_sets = self.property_sets_checked,
                    errors = self.errors.len(),
                    "consistency check progress"
                );
            }
        }

        let mut last_dangling: Option<String> = None;
        for uri in index.ordered_uri_iterator()? {
            cancel.check()?;
            self.index_uris_checked += 1;
            if valid_uris.contains(&uri) || last_dangling.as_deref() == Some(uri.as_str()) {
                continue;
            }
            self.add_error(Inconsistency::Dangling { uri: uri.clone() })?;
            last_dangling = Some(uri);
        }
        Ok(())
    }

    fn check_property_set(
        &mut self,
        accessor: &dyn RandomAccessor,
        uri: &str,
        record: PropertySetRecord,
    ) -> Result<()> {
        match accessor.count_instances(uri)? {
            0 => self.add_error(Inconsistency::Missing { record }),
            1 => {
                let indexed = accessor
                    .property_set_by_uri(uri)
                    .and_then(|set| Ok((set, accessor.internal_data(uri)?)));
                match indexed {
                    Ok((Some(set), Some(internals))) => {
                        match inconsistency::compare(&set, &internals, &record) {
                            Some(found) => self.add_error(found),
                            None => Ok(()),
                        }
                    }
                    Ok(_) => self.add_error(Inconsistency::Missing { record }),
                    Err(PropdexError::Unmappable { uri, reason }) => {
                        self.add_error(Inconsistency::Unmappable { uri, reason })
                    }
                    Err(err) => Err(err),
                }
            }
            count => self.add_error(Inconsistency::Multiples { count, record }),
        }
    }

    fn add_error(&mut self, inconsistency: Inconsistency) -> Result<()> {
        if self.errors.len() >= self.config.error_limit {
            return Err(PropdexError::TooManyErrors {
                limit: self.config.error_limit,
            });
        }
        debug!(
            uri = %inconsistency.uri(),
            kind = %inconsistency.kind(),
            "inconsistency found"
        );
        self.errors.push(inconsistency);
        Ok(())
    }
}

fn abort_reason(err: &PropdexError) -> AbortReason {
    match err {
        PropdexError::StorageCorrupted(_) => AbortReason::StorageCorrupted,
        PropdexError::TooManyErrors { .. } => AbortReason::TooManyErrors,
        PropdexError::Interrupted(_) => AbortReason::Interrupted,
        _ => AbortReason::Failed,
    }
}
