//! Database schema and migrations

use rusqlite::Connection;

use crate::Result;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 2;

/// Initialize the database schema
///
/// # Errors
///
/// Returns error if migration fails
pub fn init(conn: &Connection) -> Result<()> {
    let version: i32 = conn
        .query_row("PRAGMA user_version", [], |row| row.get(0))
        .unwrap_or(0);

    if version < 1 {
        migrate_v1(conn)?;
    }
    if version < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

fn migrate_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r"
        -- Catalog items
        CREATE TABLE IF NOT EXISTS items (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            quantity REAL NOT NULL DEFAULT 0,
            unit TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_items_name ON items(name);

        -- Append-only inventory action log
        CREATE TABLE IF NOT EXISTS inventory_actions (
            id TEXT PRIMARY KEY,
            session_id TEXT NOT NULL,
            action TEXT NOT NULL CHECK(action IN ('add', 'remove', 'set', 'undo')),
            item_id TEXT NOT NULL REFERENCES items(id),
            item_name TEXT NOT NULL,
            previous_quantity REAL NOT NULL,
            new_quantity REAL NOT NULL,
            quantity_delta REAL NOT NULL,
            unit TEXT NOT NULL,
            undone INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_actions_session ON inventory_actions(session_id);
        CREATE INDEX IF NOT EXISTS idx_actions_created ON inventory_actions(created_at);

        PRAGMA user_version = 1;
        ",
    )?;

    Ok(())
}

fn migrate_v2(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r"
        -- Item name embeddings for fuzzy spoken-item resolution
        CREATE VIRTUAL TABLE IF NOT EXISTS items_vec USING vec0(
            item_id TEXT PRIMARY KEY,
            embedding FLOAT[1536]
        );

        PRAGMA user_version = 2;
        ",
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_idempotent() {
        crate::db::register_sqlite_vec();
        let conn = Connection::open_in_memory().unwrap();
        init(&conn).unwrap();
        init(&conn).unwrap();

        let version: i32 = conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }
}
