use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use rusqlite::Connection;
use tracing::info;

use crate::error::StoreError;
use crate::schema;

/// Thread-safe SQLite connection wrapper, shared by every transport.
/// Each store operation is a single statement run under the mutex.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    path: PathBuf,
    deadline: Option<Instant>,
}

impl Database {
    /// Open or create a database at the given path and bootstrap the schema.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Io(format!("create dir: {e}")))?;
        }

        let conn = Connection::open(path).map_err(|e| StoreError::Io(e.to_string()))?;
        Self::bootstrap(&conn)?;

        info!(path = %path.display(), "database opened");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: path.to_owned(),
            deadline: None,
        })
    }

    /// Open an in-memory database (for testing).
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(|e| StoreError::Io(e.to_string()))?;
        Self::bootstrap(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: PathBuf::from(":memory:"),
            deadline: None,
        })
    }

    fn bootstrap(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(schema::PRAGMAS)
            .map_err(|e| StoreError::Schema(format!("pragmas: {e}")))?;
        schema::initialize(conn)
    }

    /// A handle on the same connection whose calls give up with
    /// [`StoreError::DeadlineExceeded`] instead of waiting for the lock past
    /// `deadline`.
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
            ..self.clone()
        }
    }

    /// Execute a closure with the database connection.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError>,
    {
        let conn = match self.deadline {
            None => self.conn.lock(),
            Some(deadline) => {
                if Instant::now() >= deadline {
                    return Err(StoreError::DeadlineExceeded);
                }
                self.conn
                    .try_lock_until(deadline)
                    .ok_or(StoreError::DeadlineExceeded)?
            }
        };
        f(&conn)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
