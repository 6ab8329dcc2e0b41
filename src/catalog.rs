//! Spoken-item resolution against the catalog
//!
//! "the 2% milk" has to become one catalog row before anything mutates.
//! Resolution embeds the spoken phrase, retrieves the top-K nearest item
//! names, and applies a two-threshold rule: a loose retrieval floor keeps
//! near-misses available as suggestions, a stricter acceptance bar decides
//! whether the top result wins outright. Similarity is normalized once, in
//! [`crate::db::ItemRepo::search_similar`].

use std::sync::Arc;

use crate::db::{Embedder, Item, ItemMatch, ItemRepo};
use crate::{Error, Result};

/// Candidates retrieved per resolution
const TOP_K: usize = 5;

/// Candidates below this similarity are not considered at all
const RETRIEVAL_FLOOR: f64 = 0.5;

/// The top candidate must clear this bar to be auto-selected
const ACCEPTANCE_THRESHOLD: f64 = 0.7;

/// Resolves spoken item phrases to catalog items
#[derive(Clone)]
pub struct ItemResolver {
    embedder: Arc<Embedder>,
    items: ItemRepo,
}

impl ItemResolver {
    /// Create a new resolver
    #[must_use]
    pub const fn new(embedder: Arc<Embedder>, items: ItemRepo) -> Self {
        Self { embedder, items }
    }

    /// Resolve a spoken item phrase to a catalog item
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when nothing clears the retrieval floor,
    /// [`Error::AmbiguousMatch`] with candidate names when the top result
    /// misses the acceptance bar, or a database/embedding error.
    pub async fn resolve(&self, spoken: &str) -> Result<Item> {
        let spoken = spoken.trim();
        if spoken.is_empty() {
            return Err(Error::NotFound("empty item phrase".to_string()));
        }

        // Exact name match skips the similarity query entirely
        if let Some(item) = self.items.get_by_name(&spoken.to_lowercase())? {
            return Ok(item);
        }

        let embedding = self.embedder.embed(spoken).await?;
        let matches = self.items.search_similar(&embedding, TOP_K)?;

        select_match(spoken, matches)
    }
}

/// Apply the two-threshold acceptance rule to retrieved candidates
///
/// Near-misses above the floor but below the acceptance bar surface in the
/// ambiguity error rather than being silently auto-selected.
pub(crate) fn select_match(spoken: &str, matches: Vec<ItemMatch>) -> Result<Item> {
    let candidates: Vec<ItemMatch> = matches
        .into_iter()
        .filter(|m| m.similarity >= RETRIEVAL_FLOOR)
        .collect();

    let Some(top) = candidates.first() else {
        return Err(Error::NotFound(format!("no catalog item matches \"{spoken}\"")));
    };

    if top.similarity >= ACCEPTANCE_THRESHOLD {
        tracing::debug!(
            spoken,
            item = %top.item.name,
            similarity = top.similarity,
            "item resolved"
        );
        return Ok(top.item.clone());
    }

    Err(Error::AmbiguousMatch {
        spoken: spoken.to_string(),
        suggestions: candidates.iter().map(|m| m.item.name.clone()).collect(),
    })
}
