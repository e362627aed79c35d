use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row, params};

use crate::error::{PropdexError, Result};
use crate::models::{ChangeLogEntry, ChangeOperation, LoggerId};

use super::{SqliteResourceStore, usize_to_i64_saturating};

pub(super) fn append(
    conn: &Connection,
    logger: LoggerId,
    operation: ChangeOperation,
    uri: &str,
    resource_id: i64,
    is_collection: bool,
    created_at: &str,
) -> Result<i64> {
    conn.execute(
        r"
        INSERT INTO change_log(logger_type, logger_id, operation, uri, resource_id, is_collection, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        ",
        params![
            logger.logger_type,
            logger.logger_id,
            operation.as_str(),
            uri,
            resource_id,
            i64::from(is_collection),
            created_at
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

impl SqliteResourceStore {
    pub(super) fn fetch_change_log(
        &self,
        logger: LoggerId,
        limit: usize,
    ) -> Result<Vec<ChangeLogEntry>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let raw = self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                r"
                SELECT id, logger_type, logger_id, operation, uri, resource_id, is_collection, created_at
                FROM change_log
                WHERE logger_type = ?1 AND logger_id = ?2
                ORDER BY id ASC
                LIMIT ?3
                ",
            )?;
            let rows = stmt.query_map(
                params![
                    logger.logger_type,
                    logger.logger_id,
                    usize_to_i64_saturating(limit)
                ],
                RawChangeLogRow::from_row,
            )?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            Ok(out)
        })?;
        raw.into_iter().map(RawChangeLogRow::into_entry).collect()
    }

    /// Runs on the caller's connection state so it joins an enclosing
    /// `in_transaction` unit of work.
    pub(super) fn delete_change_log(&self, entries: &[ChangeLogEntry]) -> Result<usize> {
        if entries.is_empty() {
            return Ok(0);
        }
        self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached("DELETE FROM change_log WHERE id = ?1")?;
            let mut removed = 0usize;
            for entry in entries {
                removed += stmt.execute(params![entry.id])?;
            }
            Ok(removed)
        })
    }

    pub fn pending_change_count(&self, logger: LoggerId) -> Result<usize> {
        self.with_conn(|conn| {
            let count = conn.query_row(
                "SELECT COUNT(*) FROM change_log WHERE logger_type = ?1 AND logger_id = ?2",
                params![logger.logger_type, logger.logger_id],
                |row| row.get::<_, i64>(0),
            )?;
            Ok(usize::try_from(count).unwrap_or(0))
        })
    }
}

struct RawChangeLogRow {
    id: i64,
    logger_type: i32,
    logger_id: i32,
    operation: String,
    uri: String,
    resource_id: i64,
    is_collection: bool,
    created_at: String,
}

impl RawChangeLogRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            logger_type: row.get(1)?,
            logger_id: row.get(2)?,
            operation: row.get(3)?,
            uri: row.get(4)?,
            resource_id: row.get(5)?,
            is_collection: row.get::<_, i64>(6)? != 0,
            created_at: row.get(7)?,
        })
    }

    fn into_entry(self) -> Result<ChangeLogEntry> {
        let operation = self
            .operation
            .parse::<ChangeOperation>()
            .map_err(PropdexError::Validation)?;
        let timestamp = DateTime::parse_from_rfc3339(&self.created_at)
            .map_err(|err| {
                PropdexError::Validation(format!(
                    "invalid change log timestamp {}: {err}",
                    self.created_at
                ))
            })?
            .with_timezone(&Utc);
        Ok(ChangeLogEntry {
            id: self.id,
            logger: LoggerId::new(self.logger_type, self.logger_id),
            operation,
            uri: self.uri,
            resource_id: self.resource_id,
            is_collection: self.is_collection,
            timestamp,
        })
    }
}
