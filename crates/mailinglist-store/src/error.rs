use rusqlite::ffi;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Table bootstrap failed. Unrecoverable at startup.
    #[error("schema error: {0}")]
    Schema(String),

    #[error("email already subscribed: {0}")]
    DuplicateEmail(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("corrupt row in {table}.{column}: {detail}")]
    CorruptRow {
        table: &'static str,
        column: &'static str,
        detail: String,
    },

    #[error("IO error: {0}")]
    Io(String),

    /// The connection stayed busy until the caller's deadline; nothing ran.
    #[error("connection busy past the call deadline")]
    DeadlineExceeded,
}

impl StoreError {
    /// Errors caused by the caller's input rather than by storage.
    pub fn is_client_error(&self) -> bool {
        matches!(self, StoreError::DuplicateEmail(_))
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, StoreError::Schema(_))
    }

    /// Classify a failed insert: a UNIQUE violation on `email` becomes
    /// `DuplicateEmail`, everything else stays a generic storage failure.
    pub(crate) fn from_insert(e: rusqlite::Error, email: &str) -> Self {
        if is_unique_violation(&e) {
            StoreError::DuplicateEmail(email.to_owned())
        } else {
            StoreError::Database(e.to_string())
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

pub(crate) fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE
                || err.extended_code == ffi::SQLITE_CONSTRAINT_PRIMARYKEY
    )
}
