//! Shared test utilities

use std::sync::Arc;

use pantry_gateway::db::{self, ActionLogRepo, ItemRepo};
use pantry_gateway::pipeline::PipelineDeps;
use pantry_gateway::{DbPool, RuleExtractor};

/// Set up an in-memory test database
#[must_use]
pub fn setup_test_db() -> DbPool {
    db::init_memory().expect("failed to init test db")
}

/// Seed a catalog item
pub fn seed_item(db: &DbPool, name: &str, quantity: f64, unit: &str) -> pantry_gateway::db::Item {
    ItemRepo::new(db.clone())
        .upsert(name, quantity, unit, None)
        .expect("failed to seed item")
}

/// Pipeline dependencies backed by the rule extractor and exact-name
/// resolution, no network required
#[must_use]
pub fn test_deps(db: &DbPool) -> PipelineDeps {
    PipelineDeps {
        extractor: Arc::new(RuleExtractor::new()),
        resolver: None,
        items: ItemRepo::new(db.clone()),
        actions: ActionLogRepo::new(db.clone()),
    }
}
