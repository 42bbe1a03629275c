use crate::core::error;
use crate::core::lock::LockPolicy;
use rusqlite::Connection;
use std::fs;
use std::path::Path;

pub fn db_connect(db_path: &Path, policy: &LockPolicy) -> Result<Connection, error::WardenError> {
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(error::WardenError::IoError)?;
    }
    let conn = Connection::open(db_path)?;
    conn.busy_timeout(policy.busy_timeout)
        .map_err(error::WardenError::RusqliteError)?;
    conn.query_row("PRAGMA journal_mode=WAL;", [], |_| Ok(()))
        .map_err(error::WardenError::RusqliteError)?;
    conn.execute("PRAGMA foreign_keys=ON;", [])
        .map_err(error::WardenError::RusqliteError)?;
    Ok(conn)
}

pub fn table_exists(conn: &Connection, table: &str) -> Result<bool, error::WardenError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [table],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub fn column_exists(
    conn: &Connection,
    table: &str,
    column: &str,
) -> Result<bool, error::WardenError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM pragma_table_info(?1) WHERE name = ?2",
        [table, column],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}
