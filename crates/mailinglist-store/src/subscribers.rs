use mailinglist_core::{EmailAddress, PageRequest, SubscriberEntry};
use tracing::{debug, instrument};

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers::{self, ENTRY_COLUMNS};

/// Data access for the subscriber table. Every public operation is one SQL
/// statement, so callers may share a repo across threads without locking.
#[derive(Clone)]
pub struct SubscriberRepo {
    db: Database,
}

impl SubscriberRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// A repo whose calls fail with `DeadlineExceeded`, without touching the
    /// table, once `deadline` has passed.
    pub fn with_deadline(&self, deadline: std::time::Instant) -> Self {
        Self {
            db: self.db.with_deadline(deadline),
        }
    }

    /// Insert a new, unconfirmed, subscribed entry.
    #[instrument(skip(self), fields(email = %email))]
    pub fn create(&self, email: &EmailAddress) -> Result<SubscriberEntry, StoreError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO subscribers (email, confirmed_at, opt_out) VALUES (?1, NULL, 0)",
                [email.as_str()],
            )
            .map_err(|e| StoreError::from_insert(e, email.as_str()))?;

            Ok(SubscriberEntry {
                id: conn.last_insert_rowid(),
                ..SubscriberEntry::new(email.clone())
            })
        })
    }

    /// Look up one entry. A missing address is `Ok(None)`.
    #[instrument(skip(self), fields(email = %email))]
    pub fn get(&self, email: &EmailAddress) -> Result<Option<SubscriberEntry>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {ENTRY_COLUMNS} FROM subscribers WHERE email = ?1"
            ))?;
            let mut rows = stmt.query([email.as_str()])?;
            let entry = match rows.next()? {
                Some(row) => Some(row_helpers::row_to_entry(row)?),
                None => None,
            };
            Ok(entry)
        })
    }

    /// Insert the entry if its email is new, otherwise overwrite
    /// `confirmed_at` and `opt_out` on the existing row. `id` on the input is
    /// ignored. Returns the row as stored.
    #[instrument(skip(self), fields(email = %entry.email, opt_out = entry.opt_out))]
    pub fn upsert(&self, entry: &SubscriberEntry) -> Result<SubscriberEntry, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(&format!(
                "INSERT INTO subscribers (email, confirmed_at, opt_out) VALUES (?1, ?2, ?3)
                 ON CONFLICT(email) DO UPDATE SET
                     confirmed_at = excluded.confirmed_at,
                     opt_out = excluded.opt_out
                 RETURNING {ENTRY_COLUMNS}"
            ))?;
            let mut rows = stmt.query(rusqlite::params![
                entry.email.as_str(),
                entry.confirmed_at,
                entry.opt_out,
            ])?;
            let stored = match rows.next()? {
                Some(row) => row_helpers::row_to_entry(row)?,
                None => {
                    return Err(StoreError::Database(format!(
                        "upsert of {} returned no row",
                        entry.email
                    )))
                }
            };
            Ok(stored)
        })
    }

    /// Mark an entry as opted out. Unknown addresses are a silent no-op.
    #[instrument(skip(self), fields(email = %email))]
    pub fn soft_delete(&self, email: &EmailAddress) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE subscribers SET opt_out = 1 WHERE email = ?1",
                [email.as_str()],
            )?;
            debug!(changed, "soft delete applied");
            Ok(())
        })
    }

    /// One page of subscribed (not opted-out) entries, oldest id first.
    #[instrument(skip(self), fields(page = page.page(), page_size = page.page_size()))]
    pub fn list_page(&self, page: &PageRequest) -> Result<Vec<SubscriberEntry>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {ENTRY_COLUMNS} FROM subscribers
                 WHERE opt_out = 0
                 ORDER BY id ASC
                 LIMIT ?1 OFFSET ?2"
            ))?;
            let mut rows = stmt.query([page.limit(), page.offset()])?;

            let mut entries = Vec::with_capacity(page.limit().try_into().unwrap_or(0));
            while let Some(row) = rows.next()? {
                entries.push(row_helpers::row_to_entry(row)?);
            }
            Ok(entries)
        })
    }

    /// Number of entries that would appear across all pages.
    #[instrument(skip(self))]
    pub fn count_active(&self) -> Result<u64, StoreError> {
        self.db.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM subscribers WHERE opt_out = 0",
                [],
                |row| row.get(0),
            )?;
            Ok(count.max(0).unsigned_abs())
        })
    }
}
