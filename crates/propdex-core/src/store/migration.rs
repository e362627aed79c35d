use crate::error::Result;

use super::SqliteResourceStore;

const MIGRATION_SCHEMA_SQL: &str = r"
    PRAGMA journal_mode = WAL;
    PRAGMA foreign_keys = ON;
    CREATE TABLE IF NOT EXISTS resources (
        resource_id INTEGER PRIMARY KEY,
        uri TEXT NOT NULL UNIQUE,
        parent_uri TEXT,
        resource_type TEXT NOT NULL,
        is_collection INTEGER NOT NULL,
        acl_inherited_from INTEGER,
        acl_json TEXT NOT NULL,
        properties_json TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_resources_parent_uri
    ON resources(parent_uri);

    CREATE TABLE IF NOT EXISTS change_loggers (
        logger_type INTEGER NOT NULL,
        logger_id INTEGER NOT NULL,
        registered_at TEXT NOT NULL,
        PRIMARY KEY (logger_type, logger_id)
    );

    CREATE TABLE IF NOT EXISTS change_log (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        logger_type INTEGER NOT NULL,
        logger_id INTEGER NOT NULL,
        operation TEXT NOT NULL CHECK(operation IN ('updated', 'deleted')),
        uri TEXT NOT NULL,
        resource_id INTEGER NOT NULL,
        is_collection INTEGER NOT NULL,
        created_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_change_log_logger
    ON change_log(logger_type, logger_id, id);
";

impl SqliteResourceStore {
    pub(super) fn migrate(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute_batch(MIGRATION_SCHEMA_SQL)?;
            Ok(())
        })
    }
}
