use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Partitions change streams so independent indexes drain independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LoggerId {
    pub logger_type: i32,
    pub logger_id: i32,
}

impl LoggerId {
    #[must_use]
    pub const fn new(logger_type: i32, logger_id: i32) -> Self {
        Self {
            logger_type,
            logger_id,
        }
    }
}

impl fmt::Display for LoggerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.logger_type, self.logger_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOperation {
    Updated,
    Deleted,
}

impl ChangeOperation {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Updated => "updated",
            Self::Deleted => "deleted",
        }
    }
}

impl fmt::Display for ChangeOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChangeOperation {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "updated" => Ok(Self::Updated),
            "deleted" => Ok(Self::Deleted),
            other => Err(format!("unknown change operation: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeLogEntry {
    pub id: i64,
    pub logger: LoggerId,
    pub operation: ChangeOperation,
    pub uri: String,
    pub resource_id: i64,
    pub is_collection: bool,
    pub timestamp: DateTime<Utc>,
}

impl ChangeLogEntry {
    #[must_use]
    pub fn is_delete(&self) -> bool {
        self.operation == ChangeOperation::Deleted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_operation_roundtrips_through_str() {
        for op in [ChangeOperation::Updated, ChangeOperation::Deleted] {
            assert_eq!(op.as_str().parse::<ChangeOperation>(), Ok(op));
        }
        assert!("moved".parse::<ChangeOperation>().is_err());
    }
}
