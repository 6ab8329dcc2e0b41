//! Catalog and action-log routes
//!
//! A deliberately small surface: list and seed items, inspect recent
//! actions. The full inventory CRUD application lives elsewhere; the
//! gateway only needs enough to keep its catalog resolvable.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use super::ApiState;
use crate::db::{ActionRecord, Item};
use crate::units;

/// Body for `POST /api/items`
#[derive(Debug, Deserialize)]
pub struct UpsertItem {
    pub name: String,
    #[serde(default)]
    pub quantity: f64,
    pub unit: String,
}

/// Query for `GET /api/actions`
#[derive(Debug, Deserialize)]
pub struct ActionsQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

const fn default_limit() -> usize {
    20
}

/// Build the items router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/", get(list_items).post(upsert_item))
        .with_state(state)
}

/// Build the actions router
pub fn actions_router(state: Arc<ApiState>) -> Router {
    Router::new().route("/", get(list_actions)).with_state(state)
}

/// List the catalog
async fn list_items(
    State(state): State<Arc<ApiState>>,
) -> Result<Json<Vec<Item>>, (StatusCode, String)> {
    state
        .items
        .list()
        .map(Json)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}

/// Insert or update one catalog item, embedding its name when possible
async fn upsert_item(
    State(state): State<Arc<ApiState>>,
    Json(body): Json<UpsertItem>,
) -> Result<Json<Item>, (StatusCode, String)> {
    let name = body.name.trim().to_lowercase();
    if name.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "item name is required".to_string()));
    }

    let unit = units::lookup(&body.unit)
        .map(|u| u.canonical.to_string())
        .ok_or_else(|| {
            (
                StatusCode::BAD_REQUEST,
                format!("unknown unit: {}", body.unit),
            )
        })?;

    let embedding = if let Some(embedder) = &state.embedder {
        match embedder.embed(&name).await {
            Ok(embedding) => Some(embedding),
            Err(e) => {
                tracing::warn!(error = %e, item = %name, "embedding failed, item stored without vector");
                None
            }
        }
    } else {
        None
    };

    state
        .items
        .upsert(&name, body.quantity, &unit, embedding.as_deref())
        .map(Json)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}

/// List recent inventory actions, newest first
async fn list_actions(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<ActionsQuery>,
) -> Result<Json<Vec<ActionRecord>>, (StatusCode, String)> {
    state
        .actions
        .list_recent(query.limit.min(200))
        .map(Json)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_body_deserializes() {
        let body: UpsertItem =
            serde_json::from_str(r#"{"name": "coffee beans", "quantity": 12, "unit": "lbs"}"#)
                .unwrap();
        assert_eq!(body.name, "coffee beans");
        assert!((body.quantity - 12.0).abs() < f64::EPSILON);
    }

    #[test]
    fn quantity_defaults_to_zero() {
        let body: UpsertItem =
            serde_json::from_str(r#"{"name": "napkins", "unit": "box"}"#).unwrap();
        assert!((body.quantity - 0.0).abs() < f64::EPSILON);
    }
}
