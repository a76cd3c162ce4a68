use rusqlite::{params, Connection, OptionalExtension};

pub fn get(conn: &Connection, key: &str) -> rusqlite::Result<Option<String>> {
    conn.query_row(
        "SELECT value FROM settings WHERE key = ?1",
        params![key],
        |row| row.get(0),
    )
    .optional()
}

pub fn set(conn: &Connection, key: &str, value: &str) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO settings (key, value) VALUES (?1, ?2) \
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![key, value],
    )?;
    Ok(())
}

/// Store `value` only if `key` has no value yet. Returns whether it was stored.
pub fn set_default(conn: &Connection, key: &str, value: &str) -> rusqlite::Result<bool> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO settings (key, value) VALUES (?1, ?2)",
        params![key, value],
    )?;
    Ok(inserted > 0)
}

pub fn delete(conn: &Connection, key: &str) -> rusqlite::Result<bool> {
    let deleted = conn.execute("DELETE FROM settings WHERE key = ?1", params![key])?;
    Ok(deleted > 0)
}
