use std::path::Path;
#[cfg(unix)]
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::{debug, warn};

use crate::dao::{ChangeLogDao, IndexDao, PropertySetIter, PropertySetRecord, TransactionManager};
use crate::error::{PropdexError, Result};
use crate::models::{Acl, ChangeLogEntry, ChangeOperation, LoggerId, Property, PropertySet};
use crate::uri::ResourceUri;

mod change_log;
mod iteration;
mod migration;

pub use iteration::{DEFAULT_PAGE_SIZE, PagedPropertySets};

const RESOURCE_COLUMNS: &str =
    "resource_id, uri, resource_type, acl_inherited_from, acl_json, properties_json";

/// Authoritative resource store backed by SQLite.
///
/// Every mutation appends change-log entries for each registered logger in
/// the same transaction, so the log never misses a committed write.
#[derive(Clone)]
pub struct SqliteResourceStore {
    conn: Arc<Mutex<Connection>>,
    tx_gate: Arc<Mutex<()>>,
    page_size: usize,
}

impl std::fmt::Debug for SqliteResourceStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteResourceStore")
            .field("page_size", &self.page_size)
            .finish_non_exhaustive()
    }
}

impl SqliteResourceStore {
    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| PropdexError::mutex_poisoned("sqlite"))?;
        f(&conn)
    }

    fn with_tx<T>(&self, f: impl FnOnce(&rusqlite::Transaction<'_>) -> Result<T>) -> Result<T> {
        let _gate = self
            .tx_gate
            .lock()
            .map_err(|_| PropdexError::mutex_poisoned("sqlite transaction gate"))?;
        let mut conn = self
            .conn
            .lock()
            .map_err(|_| PropdexError::mutex_poisoned("sqlite"))?;
        let tx = conn.transaction()?;
        let value = f(&tx)?;
        tx.commit()?;
        drop(conn);
        Ok(value)
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        let store = Self::from_connection(conn);
        store.migrate()?;
        #[cfg(unix)]
        harden_sqlite_permissions(path)?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let store = Self::from_connection(Connection::open_in_memory()?);
        store.migrate()?;
        Ok(store)
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
            tx_gate: Arc::new(Mutex::new(())),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Rows fetched per round trip by the ordered iterations.
    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn register_change_logger(&self, logger: LoggerId) -> Result<bool> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                r"
                INSERT INTO change_loggers(logger_type, logger_id, registered_at)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(logger_type, logger_id) DO NOTHING
                ",
                params![
                    logger.logger_type,
                    logger.logger_id,
                    Utc::now().to_rfc3339()
                ],
            )?;
            Ok(inserted > 0)
        })
    }

    pub fn change_loggers(&self) -> Result<Vec<LoggerId>> {
        self.with_conn(load_change_loggers)
    }

    /// Inserts or replaces the resource at `set.uri` and logs an UPDATED
    /// change for every registered logger.
    pub fn put_property_set(&self, set: &PropertySet, acl: &Acl, is_collection: bool) -> Result<()> {
        let uri = set.uri.to_string();
        let parent_uri = set.uri.parent().map(|parent| parent.to_string());
        let acl_json = serde_json::to_string(acl)?;
        let properties_json = serde_json::to_string(&set.properties)?;
        let now = Utc::now().to_rfc3339();

        self.with_tx(|tx| {
            let owner = tx
                .query_row(
                    "SELECT uri FROM resources WHERE resource_id = ?1",
                    params![set.id],
                    |row| row.get::<_, String>(0),
                )
                .optional()?;
            if let Some(owner) = owner
                && owner != uri
            {
                return Err(PropdexError::Validation(format!(
                    "resource id {} already belongs to {owner}",
                    set.id
                )));
            }

            tx.execute(
                r"
                INSERT INTO resources(
                    resource_id, uri, parent_uri, resource_type, is_collection,
                    acl_inherited_from, acl_json, properties_json, updated_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                ON CONFLICT(uri) DO UPDATE SET
                  resource_id = excluded.resource_id,
                  parent_uri = excluded.parent_uri,
                  resource_type = excluded.resource_type,
                  is_collection = excluded.is_collection,
                  acl_inherited_from = excluded.acl_inherited_from,
                  acl_json = excluded.acl_json,
                  properties_json = excluded.properties_json,
                  updated_at = excluded.updated_at
                ",
                params![
                    set.id,
                    uri,
                    parent_uri,
                    set.resource_type,
                    i64::from(is_collection),
                    set.acl_inherited_from,
                    acl_json,
                    properties_json,
                    now
                ],
            )?;

            let loggers = load_change_loggers(tx)?;
            for logger in &loggers {
                change_log::append(
                    tx,
                    *logger,
                    ChangeOperation::Updated,
                    &uri,
                    set.id,
                    is_collection,
                    &now,
                )?;
            }
            debug!(uri = %uri, loggers = loggers.len(), "resource stored");
            Ok(())
        })
    }

    /// Removes the resource and its whole subtree. One DELETED entry is
    /// logged per logger; consumers expand collection deletes themselves.
    pub fn delete_resource(&self, uri: &ResourceUri) -> Result<usize> {
        let path = uri.to_string();
        let now = Utc::now().to_rfc3339();

        self.with_tx(|tx| {
            let target = tx
                .query_row(
                    "SELECT resource_id, is_collection FROM resources WHERE uri = ?1",
                    params![path],
                    |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)? != 0)),
                )
                .optional()?;
            let Some((resource_id, is_collection)) = target else {
                return Err(PropdexError::NotFound(path.clone()));
            };

            let removed = tx.execute(
                r"DELETE FROM resources WHERE uri = ?1 OR uri LIKE ?2 ESCAPE '\'",
                params![path, subtree_pattern(uri)],
            )?;

            let loggers = load_change_loggers(tx)?;
            for logger in &loggers {
                change_log::append(
                    tx,
                    *logger,
                    ChangeOperation::Deleted,
                    &path,
                    resource_id,
                    is_collection,
                    &now,
                )?;
            }
            debug!(uri = %path, removed, "resource subtree deleted");
            Ok(removed)
        })
    }

    pub fn property_set(&self, uri: &ResourceUri) -> Result<Option<PropertySetRecord>> {
        let raw = self.with_conn(|conn| {
            let row = conn
                .query_row(
                    &format!("SELECT {RESOURCE_COLUMNS} FROM resources WHERE uri = ?1"),
                    params![uri.to_string()],
                    ResourceRow::from_row,
                )
                .optional()?;
            Ok(row)
        })?;
        raw.map(ResourceRow::into_record).transpose()
    }

    pub fn resource_count(&self) -> Result<usize> {
        self.with_conn(|conn| {
            let count = conn.query_row("SELECT COUNT(*) FROM resources", [], |row| {
                row.get::<_, i64>(0)
            })?;
            Ok(usize::try_from(count).unwrap_or(0))
        })
    }

    pub fn ordered_property_sets(&self) -> PagedPropertySets<'_> {
        PagedPropertySets::all(self, self.page_size)
    }

    pub fn ordered_property_sets_for_uris(&self, uris: &[String]) -> PagedPropertySets<'_> {
        PagedPropertySets::for_uris(self, uris, self.page_size)
    }
}

impl IndexDao for SqliteResourceStore {
    fn ordered_property_set_iteration(&self) -> Result<PropertySetIter<'_>> {
        Ok(Box::new(self.ordered_property_sets()))
    }

    fn ordered_property_set_iteration_for_uris(
        &self,
        uris: &[String],
    ) -> Result<PropertySetIter<'_>> {
        Ok(Box::new(self.ordered_property_sets_for_uris(uris)))
    }
}

impl ChangeLogDao for SqliteResourceStore {
    fn change_log_entries(&self, logger: LoggerId, max: usize) -> Result<Vec<ChangeLogEntry>> {
        self.fetch_change_log(logger, max)
    }

    fn remove_change_log_entries(&self, entries: &[ChangeLogEntry]) -> Result<usize> {
        self.delete_change_log(entries)
    }
}

impl TransactionManager for SqliteResourceStore {
    fn in_transaction(&self, work: &mut dyn FnMut() -> Result<()>) -> Result<()> {
        let _gate = self
            .tx_gate
            .lock()
            .map_err(|_| PropdexError::mutex_poisoned("sqlite transaction gate"))?;
        self.with_conn(|conn| {
            conn.execute_batch("BEGIN IMMEDIATE")?;
            Ok(())
        })?;

        match work() {
            Ok(()) => {
                let committed = self.with_conn(|conn| {
                    conn.execute_batch("COMMIT")?;
                    Ok(())
                });
                if let Err(err) = committed {
                    self.rollback_quietly();
                    return Err(err);
                }
                Ok(())
            }
            Err(err) => {
                self.rollback_quietly();
                Err(err)
            }
        }
    }
}

impl SqliteResourceStore {
    fn rollback_quietly(&self) {
        let rolled_back = self.with_conn(|conn| {
            if !conn.is_autocommit() {
                conn.execute_batch("ROLLBACK")?;
            }
            Ok(())
        });
        if let Err(err) = rolled_back {
            warn!(error = %err, "transaction rollback failed");
        }
    }

    pub(crate) fn fetch_resource_rows(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<PropertySetRecord>> {
        let rows = self.with_conn(|conn| {
            let mut stmt = conn.prepare(sql)?;
            let rows = stmt.query_map(params, ResourceRow::from_row)?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            Ok(out)
        })?;
        rows.into_iter().map(ResourceRow::into_record).collect()
    }
}

struct ResourceRow {
    resource_id: i64,
    uri: String,
    resource_type: String,
    acl_inherited_from: Option<i64>,
    acl_json: String,
    properties_json: String,
}

impl ResourceRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            resource_id: row.get(0)?,
            uri: row.get(1)?,
            resource_type: row.get(2)?,
            acl_inherited_from: row.get(3)?,
            acl_json: row.get(4)?,
            properties_json: row.get(5)?,
        })
    }

    fn into_record(self) -> Result<PropertySetRecord> {
        let uri = ResourceUri::parse(&self.uri)?;
        let acl = serde_json::from_str::<Acl>(&self.acl_json)?;
        let properties = serde_json::from_str::<Vec<Property>>(&self.properties_json)?;
        let set = PropertySet {
            uri,
            id: self.resource_id,
            resource_type: self.resource_type,
            acl_inherited_from: self.acl_inherited_from,
            properties,
        };
        Ok((set, acl))
    }
}

fn load_change_loggers(conn: &Connection) -> Result<Vec<LoggerId>> {
    let mut stmt = conn.prepare(
        "SELECT logger_type, logger_id FROM change_loggers ORDER BY logger_type, logger_id",
    )?;
    let rows = stmt.query_map([], |row| Ok(LoggerId::new(row.get(0)?, row.get(1)?)))?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

fn subtree_pattern(uri: &ResourceUri) -> String {
    if uri.is_root() {
        return "/%".to_string();
    }
    let mut escaped = String::new();
    for ch in uri.to_string().chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push_str("/%");
    escaped
}

pub(crate) fn usize_to_i64_saturating(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[cfg(unix)]
fn harden_sqlite_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    for suffix in ["", "-wal", "-shm"] {
        let mut os = path.as_os_str().to_os_string();
        os.push(suffix);
        let candidate = PathBuf::from(os);
        if candidate.exists() {
            std::fs::set_permissions(candidate, std::fs::Permissions::from_mode(0o600))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests;
