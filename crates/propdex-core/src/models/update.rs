use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    ClusterReadOnly,
    IndexLockUnavailable,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    pub fetched: usize,
    pub deleted: usize,
    pub updated: usize,
    pub fetched_from_store: usize,
    pub removed_from_change_log: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped: Option<SkipReason>,
}

impl BatchReport {
    #[must_use]
    pub fn skipped(reason: SkipReason, fetched: usize) -> Self {
        Self {
            fetched,
            skipped: Some(reason),
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn is_noop(&self) -> bool {
        self.fetched == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdaterState {
    Stopped,
    Running,
}
