use rusqlite::{ffi, Connection};
use tracing::debug;

use crate::error::StoreError;

/// SQL DDL for the subscriber table.
/// `AUTOINCREMENT` keeps ids monotonic and never reused.
pub const CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS subscribers (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    email TEXT NOT NULL UNIQUE,
    confirmed_at INTEGER,
    opt_out INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_subscribers_active ON subscribers(opt_out, id);
"#;

pub const PRAGMAS: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA busy_timeout = 5000;
PRAGMA synchronous = NORMAL;
"#;

/// Ensure the subscriber table exists. Safe to run any number of times; an
/// "already exists" failure (another process created the table between our
/// check and our create) is treated as success.
pub fn initialize(conn: &Connection) -> Result<(), StoreError> {
    apply(conn, CREATE_TABLES)
}

fn apply(conn: &Connection, ddl: &str) -> Result<(), StoreError> {
    match conn.execute_batch(ddl) {
        Ok(()) => Ok(()),
        Err(e) if is_already_exists(&e) => {
            debug!(error = %e, "subscriber table already present");
            Ok(())
        }
        Err(e) => Err(StoreError::Schema(e.to_string())),
    }
}

fn is_already_exists(e: &rusqlite::Error) -> bool {
    match e {
        rusqlite::Error::SqliteFailure(err, Some(msg)) => {
            err.extended_code == ffi::SQLITE_ERROR && msg.contains("already exists")
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initialize_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();
        initialize(&conn).unwrap();

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='subscribers'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn tolerates_table_created_without_if_not_exists() {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();
        apply(&conn, "CREATE TABLE subscribers (id INTEGER PRIMARY KEY)").unwrap();

        let err = conn
            .execute_batch("CREATE TABLE subscribers (id INTEGER PRIMARY KEY)")
            .unwrap_err();
        assert!(is_already_exists(&err));
    }

    #[test]
    fn apply_reports_other_ddl_errors() {
        let conn = Connection::open_in_memory().unwrap();
        let err = apply(&conn, "CREATE INDEX idx_missing ON no_such_table(id)").unwrap_err();
        assert!(err.is_fatal(), "got {err:?}");
    }

    #[test]
    fn other_schema_errors_are_fatal() {
        let conn = Connection::open_in_memory().unwrap();
        // IF NOT EXISTS skips the table because a view holds its name, then
        // CREATE INDEX fails since views cannot be indexed.
        conn.execute_batch("CREATE VIEW subscribers AS SELECT 1 AS id")
            .unwrap();
        let err = initialize(&conn).unwrap_err();
        assert!(err.is_fatal(), "got {err:?}");
    }

    #[test]
    fn expected_columns() {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();
        let columns: Vec<String> = conn
            .prepare("SELECT name FROM pragma_table_info('subscribers') ORDER BY cid")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(columns, ["id", "email", "confirmed_at", "opt_out"]);
    }
}
