use mailinglist_core::{EmailAddress, SubscriberEntry};

use crate::error::StoreError;

const TABLE: &str = "subscribers";

/// Column list matching [`row_to_entry`]'s indices.
pub const ENTRY_COLUMNS: &str = "id, email, confirmed_at, opt_out";

/// Get a required column value from a row, returning CorruptRow on failure.
pub fn get<T: rusqlite::types::FromSql>(
    row: &rusqlite::Row<'_>,
    idx: usize,
    table: &'static str,
    column: &'static str,
) -> Result<T, StoreError> {
    row.get(idx).map_err(|e| StoreError::CorruptRow {
        table,
        column,
        detail: e.to_string(),
    })
}

/// Get an optional column value.
pub fn get_opt<T: rusqlite::types::FromSql>(
    row: &rusqlite::Row<'_>,
    idx: usize,
    table: &'static str,
    column: &'static str,
) -> Result<Option<T>, StoreError> {
    row.get(idx).map_err(|e| StoreError::CorruptRow {
        table,
        column,
        detail: e.to_string(),
    })
}

/// Decode a row selected with [`ENTRY_COLUMNS`].
pub fn row_to_entry(row: &rusqlite::Row<'_>) -> Result<SubscriberEntry, StoreError> {
    let raw_email: String = get(row, 1, TABLE, "email")?;
    let email = EmailAddress::parse(&raw_email).map_err(|e| StoreError::CorruptRow {
        table: TABLE,
        column: "email",
        detail: e.to_string(),
    })?;

    Ok(SubscriberEntry {
        id: get(row, 0, TABLE, "id")?,
        email,
        confirmed_at: get_opt(row, 2, TABLE, "confirmed_at")?,
        opt_out: get(row, 3, TABLE, "opt_out")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn decode(sql: &str) -> Result<SubscriberEntry, StoreError> {
        let conn = Connection::open_in_memory().unwrap();
        let mut stmt = conn.prepare(sql).unwrap();
        let mut rows = stmt.query([]).unwrap();
        let row = rows.next().unwrap().unwrap();
        row_to_entry(row)
    }

    #[test]
    fn decodes_well_formed_row() {
        let entry = decode("SELECT 4, 'x@y.io', NULL, 1").unwrap();
        assert_eq!(entry.id, 4);
        assert_eq!(entry.email.as_str(), "x@y.io");
        assert_eq!(entry.confirmed_at, None);
        assert!(entry.opt_out);
    }

    #[test]
    fn zero_timestamp_is_preserved() {
        let entry = decode("SELECT 1, 'x@y.io', 0, 0").unwrap();
        assert_eq!(entry.confirmed_at, Some(0));
    }

    #[test]
    fn bad_email_is_corrupt_row() {
        let result = decode("SELECT 1, 'not an address', NULL, 0");
        assert!(matches!(
            result,
            Err(StoreError::CorruptRow { table: "subscribers", column: "email", .. })
        ));
    }

    #[test]
    fn wrong_type_is_corrupt_row() {
        let result = decode("SELECT 'abc', 'x@y.io', NULL, 0");
        assert!(matches!(
            result,
            Err(StoreError::CorruptRow { column: "id", .. })
        ));
    }
}
