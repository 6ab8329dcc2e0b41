//! Append-only inventory action log
//!
//! Every applied mutation lands here; the newest non-undone entry per
//! session is the target of a single-step undo.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::DbPool;
use crate::{Error, Result};

/// Column list for all action SELECT queries
const ACTION_COLUMNS: &str = "id, session_id, action, item_id, item_name, previous_quantity, new_quantity, quantity_delta, unit, undone, created_at";

/// One logged inventory mutation
#[derive(Debug, Clone, serde::Serialize)]
pub struct ActionRecord {
    pub id: String,
    pub session_id: String,
    /// "add", "remove", "set", or "undo"
    pub action: String,
    pub item_id: String,
    pub item_name: String,
    pub previous_quantity: f64,
    pub new_quantity: f64,
    /// Applied delta in the item's storage unit (negative for removals)
    pub quantity_delta: f64,
    pub unit: String,
    pub undone: bool,
    pub created_at: DateTime<Utc>,
}

/// Map a database row to an [`ActionRecord`]
fn row_to_action(row: &rusqlite::Row<'_>) -> rusqlite::Result<ActionRecord> {
    Ok(ActionRecord {
        id: row.get(0)?,
        session_id: row.get(1)?,
        action: row.get(2)?,
        item_id: row.get(3)?,
        item_name: row.get(4)?,
        previous_quantity: row.get(5)?,
        new_quantity: row.get(6)?,
        quantity_delta: row.get(7)?,
        unit: row.get(8)?,
        undone: row.get::<_, i32>(9)? != 0,
        created_at: super::items::parse_datetime(&row.get::<_, String>(10)?),
    })
}

/// Input for a new action log entry
#[derive(Debug, Clone)]
pub struct NewAction<'a> {
    pub session_id: &'a str,
    pub action: &'a str,
    pub item_id: &'a str,
    pub item_name: &'a str,
    pub previous_quantity: f64,
    pub new_quantity: f64,
    pub unit: &'a str,
}

/// Inventory action log repository
#[derive(Clone)]
pub struct ActionLogRepo {
    pool: DbPool,
}

impl ActionLogRepo {
    /// Create a new action log repository
    #[must_use]
    pub const fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Append an action to the log
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn append(&self, new: &NewAction<'_>) -> Result<ActionRecord> {
        let conn = self.pool.get().map_err(|e| Error::Database(e.to_string()))?;

        let id = format!("act_{}", Uuid::new_v4());
        let delta = new.new_quantity - new.previous_quantity;

        conn.execute(
            &format!(
                "INSERT INTO inventory_actions ({ACTION_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 0, datetime('now'))"
            ),
            rusqlite::params![
                id,
                new.session_id,
                new.action,
                new.item_id,
                new.item_name,
                new.previous_quantity,
                new.new_quantity,
                delta,
                new.unit,
            ],
        )?;

        tracing::info!(
            action_id = %id,
            session_id = %new.session_id,
            action = %new.action,
            item = %new.item_name,
            previous = new.previous_quantity,
            new = new.new_quantity,
            "inventory action logged"
        );

        self.get(&id)?
            .ok_or_else(|| Error::Database("action vanished after insert".to_string()))
    }

    /// Get an action by ID
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn get(&self, id: &str) -> Result<Option<ActionRecord>> {
        let conn = self.pool.get().map_err(|e| Error::Database(e.to_string()))?;

        let result = conn.query_row(
            &format!("SELECT {ACTION_COLUMNS} FROM inventory_actions WHERE id = ?1"),
            rusqlite::params![id],
            row_to_action,
        );

        match result {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Newest action in a session that can still be undone
    ///
    /// Undo entries themselves and already-undone entries are skipped, so
    /// undo is single-step and does not oscillate.
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn last_undoable(&self, session_id: &str) -> Result<Option<ActionRecord>> {
        let conn = self.pool.get().map_err(|e| Error::Database(e.to_string()))?;

        let result = conn.query_row(
            &format!(
                "SELECT {ACTION_COLUMNS} FROM inventory_actions
                 WHERE session_id = ?1 AND undone = 0 AND action != 'undo'
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT 1"
            ),
            rusqlite::params![session_id],
            row_to_action,
        );

        match result {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Mark an action as undone
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn mark_undone(&self, id: &str) -> Result<()> {
        let conn = self.pool.get().map_err(|e| Error::Database(e.to_string()))?;

        conn.execute(
            "UPDATE inventory_actions SET undone = 1 WHERE id = ?1",
            rusqlite::params![id],
        )?;

        Ok(())
    }

    /// List the most recent actions, newest first
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn list_recent(&self, limit: usize) -> Result<Vec<ActionRecord>> {
        let conn = self.pool.get().map_err(|e| Error::Database(e.to_string()))?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {ACTION_COLUMNS} FROM inventory_actions
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?1"
        ))?;

        #[allow(clippy::cast_possible_wrap)]
        let rows = stmt.query_map(rusqlite::params![limit as i64], row_to_action)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{init_memory, ItemRepo};

    fn seed_item(pool: &DbPool) -> crate::db::Item {
        ItemRepo::new(pool.clone())
            .upsert("coffee beans", 10.0, "lb", None)
            .unwrap()
    }

    #[test]
    fn test_append_and_get() {
        let pool = init_memory().unwrap();
        let item = seed_item(&pool);
        let repo = ActionLogRepo::new(pool);

        let record = repo
            .append(&NewAction {
                session_id: "sess-1",
                action: "add",
                item_id: &item.id,
                item_name: &item.name,
                previous_quantity: 10.0,
                new_quantity: 15.0,
                unit: "lb",
            })
            .unwrap();

        assert!(record.id.starts_with("act_"));
        assert!((record.quantity_delta - 5.0).abs() < f64::EPSILON);
        assert!(!record.undone);
    }

    #[test]
    fn test_last_undoable_skips_undone_and_undo_entries() {
        let pool = init_memory().unwrap();
        let item = seed_item(&pool);
        let repo = ActionLogRepo::new(pool);

        let first = repo
            .append(&NewAction {
                session_id: "sess-1",
                action: "add",
                item_id: &item.id,
                item_name: &item.name,
                previous_quantity: 10.0,
                new_quantity: 15.0,
                unit: "lb",
            })
            .unwrap();
        let second = repo
            .append(&NewAction {
                session_id: "sess-1",
                action: "remove",
                item_id: &item.id,
                item_name: &item.name,
                previous_quantity: 15.0,
                new_quantity: 12.0,
                unit: "lb",
            })
            .unwrap();

        assert_eq!(repo.last_undoable("sess-1").unwrap().unwrap().id, second.id);

        repo.mark_undone(&second.id).unwrap();
        repo.append(&NewAction {
            session_id: "sess-1",
            action: "undo",
            item_id: &item.id,
            item_name: &item.name,
            previous_quantity: 12.0,
            new_quantity: 15.0,
            unit: "lb",
        })
        .unwrap();

        // The undo entry and the undone removal are both skipped
        assert_eq!(repo.last_undoable("sess-1").unwrap().unwrap().id, first.id);
    }

    #[test]
    fn test_last_undoable_empty_log() {
        let pool = init_memory().unwrap();
        let repo = ActionLogRepo::new(pool);

        assert!(repo.last_undoable("sess-1").unwrap().is_none());
    }

    #[test]
    fn test_last_undoable_scoped_to_session() {
        let pool = init_memory().unwrap();
        let item = seed_item(&pool);
        let repo = ActionLogRepo::new(pool);

        repo.append(&NewAction {
            session_id: "sess-1",
            action: "add",
            item_id: &item.id,
            item_name: &item.name,
            previous_quantity: 10.0,
            new_quantity: 11.0,
            unit: "lb",
        })
        .unwrap();

        assert!(repo.last_undoable("sess-2").unwrap().is_none());
    }

    #[test]
    fn test_list_recent_newest_first() {
        let pool = init_memory().unwrap();
        let item = seed_item(&pool);
        let repo = ActionLogRepo::new(pool);

        for qty in [11.0, 12.0, 13.0] {
            repo.append(&NewAction {
                session_id: "sess-1",
                action: "add",
                item_id: &item.id,
                item_name: &item.name,
                previous_quantity: qty - 1.0,
                new_quantity: qty,
                unit: "lb",
            })
            .unwrap();
        }

        let recent = repo.list_recent(2).unwrap();
        assert_eq!(recent.len(), 2);
        assert!((recent[0].new_quantity - 13.0).abs() < f64::EPSILON);
    }
}
