//! Database schema for url records

use rusqlite::Connection;

/// SQL schema for the url record table
pub const URL_RECORDS_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS url_records (
    url TEXT PRIMARY KEY,
    status TEXT NOT NULL,
    first_seen_depth INTEGER NOT NULL,
    parent_url TEXT,
    discovered_at TEXT NOT NULL,
    last_attempt_at TEXT,
    content_key TEXT,
    attempts INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_url_records_status ON url_records(status);
"#;

/// Creates the url record table if it does not exist
pub fn initialize_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(URL_RECORDS_SQL)
}

/// Drops the url record table and creates it empty
pub fn recreate_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("DROP TABLE IF EXISTS url_records;")?;
    initialize_schema(conn)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_exists(conn: &Connection) -> bool {
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='url_records'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        count == 1
    }

    #[test]
    fn test_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();
        assert!(initialize_schema(&conn).is_ok());
        assert!(table_exists(&conn));
    }

    #[test]
    fn test_recreate_clears_rows() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();
        conn.execute(
            "INSERT INTO url_records (url, status, first_seen_depth, discovered_at)
             VALUES ('https://a.com/', 'PENDING', 0, '2024-01-01T00:00:00Z')",
            [],
        )
        .unwrap();

        recreate_schema(&conn).unwrap();

        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM url_records", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rows, 0);
    }

    #[test]
    fn test_recreate_without_table() {
        let conn = Connection::open_in_memory().unwrap();
        recreate_schema(&conn).unwrap();
        assert!(table_exists(&conn));
    }
}
