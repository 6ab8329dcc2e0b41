//! Catalog item repository

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::DbPool;
use crate::{Error, Result};

/// Column list for all item SELECT queries
const ITEM_COLUMNS: &str = "id, name, quantity, unit, created_at, updated_at";

/// A catalog item
#[derive(Debug, Clone, serde::Serialize)]
pub struct Item {
    pub id: String,
    pub name: String,
    pub quantity: f64,
    /// Canonical storage unit (e.g. "lb", "gal", "each")
    pub unit: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A catalog item paired with its similarity to a query embedding
#[derive(Debug, Clone)]
pub struct ItemMatch {
    pub item: Item,
    /// Normalized similarity in (0, 1], computed as `1 / (1 + distance)`
    pub similarity: f64,
}

/// Map a database row to an [`Item`]
fn row_to_item(row: &rusqlite::Row<'_>) -> rusqlite::Result<Item> {
    Ok(Item {
        id: row.get(0)?,
        name: row.get(1)?,
        quantity: row.get(2)?,
        unit: row.get(3)?,
        created_at: parse_datetime(&row.get::<_, String>(4)?),
        updated_at: parse_datetime(&row.get::<_, String>(5)?),
    })
}

pub(crate) fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                .map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|_| Utc::now())
}

/// Catalog item repository
#[derive(Clone)]
pub struct ItemRepo {
    pool: DbPool,
}

impl ItemRepo {
    /// Create a new item repository
    #[must_use]
    pub const fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Insert or update an item by name
    ///
    /// If an embedding is provided it replaces any existing vector for the
    /// item in the `items_vec` virtual table.
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn upsert(
        &self,
        name: &str,
        quantity: f64,
        unit: &str,
        embedding: Option<&[f32]>,
    ) -> Result<Item> {
        let conn = self.pool.get().map_err(|e| Error::Database(e.to_string()))?;

        let existing: Option<String> = conn
            .query_row(
                "SELECT id FROM items WHERE name = ?1",
                rusqlite::params![name],
                |row| row.get(0),
            )
            .ok();

        let id = if let Some(id) = existing {
            conn.execute(
                "UPDATE items SET quantity = ?1, unit = ?2, updated_at = datetime('now') WHERE id = ?3",
                rusqlite::params![quantity, unit, id],
            )?;
            id
        } else {
            let id = format!("item_{}", Uuid::new_v4());
            conn.execute(
                &format!(
                    "INSERT INTO items ({ITEM_COLUMNS}) VALUES (?1, ?2, ?3, ?4, datetime('now'), datetime('now'))"
                ),
                rusqlite::params![id, name, quantity, unit],
            )?;
            id
        };

        if let Some(embedding) = embedding {
            let embedding_bytes = super::embedder::Embedder::to_bytes(embedding);
            conn.execute(
                "DELETE FROM items_vec WHERE item_id = ?1",
                rusqlite::params![id],
            )?;
            conn.execute(
                "INSERT INTO items_vec (item_id, embedding) VALUES (?1, ?2)",
                rusqlite::params![id, embedding_bytes],
            )?;
        }

        tracing::debug!(item_id = %id, name, quantity, unit, "item upserted");

        self.get(&id)?
            .ok_or_else(|| Error::Database("item vanished after upsert".to_string()))
    }

    /// Get an item by ID
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn get(&self, id: &str) -> Result<Option<Item>> {
        let conn = self.pool.get().map_err(|e| Error::Database(e.to_string()))?;

        let result = conn.query_row(
            &format!("SELECT {ITEM_COLUMNS} FROM items WHERE id = ?1"),
            rusqlite::params![id],
            row_to_item,
        );

        match result {
            Ok(item) => Ok(Some(item)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Get an item by exact name
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn get_by_name(&self, name: &str) -> Result<Option<Item>> {
        let conn = self.pool.get().map_err(|e| Error::Database(e.to_string()))?;

        let result = conn.query_row(
            &format!("SELECT {ITEM_COLUMNS} FROM items WHERE name = ?1"),
            rusqlite::params![name],
            row_to_item,
        );

        match result {
            Ok(item) => Ok(Some(item)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// List all items ordered by name
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn list(&self) -> Result<Vec<Item>> {
        let conn = self.pool.get().map_err(|e| Error::Database(e.to_string()))?;

        let mut stmt =
            conn.prepare(&format!("SELECT {ITEM_COLUMNS} FROM items ORDER BY name"))?;
        let rows = stmt.query_map([], row_to_item)?;

        let mut items = Vec::new();
        for row in rows {
            items.push(row?);
        }

        Ok(items)
    }

    /// Overwrite an item's quantity
    ///
    /// # Errors
    ///
    /// Returns error if the item does not exist or the update fails
    pub fn set_quantity(&self, id: &str, quantity: f64) -> Result<()> {
        let conn = self.pool.get().map_err(|e| Error::Database(e.to_string()))?;

        let updated = conn.execute(
            "UPDATE items SET quantity = ?1, updated_at = datetime('now') WHERE id = ?2",
            rusqlite::params![quantity, id],
        )?;

        if updated == 0 {
            return Err(Error::NotFound(format!("item {id}")));
        }

        Ok(())
    }

    /// Search items by embedding similarity
    ///
    /// Returns matches ordered by similarity descending. The `vec0` distance
    /// column is normalized to `1 / (1 + distance)` so every caller sees one
    /// similarity definition.
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn search_similar(&self, query_embedding: &[f32], limit: usize) -> Result<Vec<ItemMatch>> {
        let conn = self.pool.get().map_err(|e| Error::Database(e.to_string()))?;
        let embedding_bytes = super::embedder::Embedder::to_bytes(query_embedding);

        let mut stmt = conn.prepare(&format!(
            r"SELECT {ITEM_COLUMNS}, v.distance
              FROM items
              JOIN (
                  SELECT item_id, distance
                  FROM items_vec
                  WHERE embedding MATCH ?1
                  ORDER BY distance
                  LIMIT ?2
              ) v ON items.id = v.item_id
              ORDER BY v.distance"
        ))?;

        #[allow(clippy::cast_possible_wrap)]
        let rows = stmt.query_map(
            rusqlite::params![embedding_bytes, limit as i64],
            |row| {
                let item = row_to_item(row)?;
                let distance: f64 = row.get(6)?;
                Ok((item, distance))
            },
        )?;

        let mut matches = Vec::new();
        for row in rows {
            let (item, distance) = row?;
            matches.push(ItemMatch {
                item,
                similarity: 1.0 / (1.0 + distance),
            });
        }

        Ok(matches)
    }
}
