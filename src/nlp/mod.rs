//! Natural-language command extraction
//!
//! An utterance goes to a [`CommandExtractor`] implementation and comes back
//! as zero or more [`CandidateCommand`]s. Two implementations exist: the
//! LLM-backed [`llm::LlmExtractor`] and the rule-based
//! [`rules::RuleExtractor`] fallback. Both honor the same contract: a
//! well-formed (possibly empty) list, never an error across the boundary.

pub mod accumulator;
pub mod context;
pub mod llm;
pub mod rules;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{Config, ExtractorMode};

pub use accumulator::{CommandAccumulator, PartialCommand, CONTEXT_WINDOW};
pub use llm::LlmExtractor;
pub use rules::RuleExtractor;

/// Inventory action kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CommandAction {
    Add,
    Remove,
    Set,
    Undo,
    #[default]
    Unknown,
}

impl CommandAction {
    /// Lowercase wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Remove => "remove",
            Self::Set => "set",
            Self::Undo => "undo",
            Self::Unknown => "unknown",
        }
    }

    /// Parse a loosely-spelled action name
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "add" => Self::Add,
            "remove" => Self::Remove,
            "set" => Self::Set,
            "undo" => Self::Undo,
            _ => Self::Unknown,
        }
    }
}

/// One parsed, possibly-incomplete inventory instruction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateCommand {
    pub action: CommandAction,
    /// Spoken item phrase, as heard
    pub item: Option<String>,
    pub quantity: Option<f64>,
    /// Spoken unit, as heard ("pounds", "gal")
    pub unit: Option<String>,
    /// Extractor confidence in [0, 1]
    pub confidence: f32,
    pub is_complete: bool,
}

impl CandidateCommand {
    /// Build a candidate, normalizing blank fields and computing completeness
    #[must_use]
    pub fn new(
        action: CommandAction,
        item: Option<String>,
        quantity: Option<f64>,
        unit: Option<String>,
        confidence: f32,
    ) -> Self {
        let item = item.filter(|s| !s.trim().is_empty());
        let unit = unit.filter(|s| !s.trim().is_empty());
        let is_complete = is_command_complete(action, item.as_deref(), quantity, unit.as_deref());
        Self {
            action,
            item,
            quantity,
            unit,
            confidence: confidence.clamp(0.0, 1.0),
            is_complete,
        }
    }
}

/// Whether a command has every field its action requires
///
/// `set` needs item, quantity, and unit; `add`/`remove` need item and
/// quantity; `undo` is always complete. A zero quantity counts as missing,
/// so "set flour to zero" keeps accumulating rather than completing.
#[must_use]
pub fn is_command_complete(
    action: CommandAction,
    item: Option<&str>,
    quantity: Option<f64>,
    unit: Option<&str>,
) -> bool {
    let has_item = item.is_some_and(|i| !i.trim().is_empty());
    let has_quantity = quantity.is_some_and(|q| q != 0.0);
    let has_unit = unit.is_some_and(|u| !u.trim().is_empty());

    match action {
        CommandAction::Set => has_item && has_quantity && has_unit,
        CommandAction::Add | CommandAction::Remove => has_item && has_quantity,
        CommandAction::Undo => true,
        CommandAction::Unknown => false,
    }
}

/// One remembered conversation turn
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub text: String,
}

impl ConversationTurn {
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// Turns an utterance into candidate inventory commands
///
/// Implementations must never propagate transport or parse failures;
/// upstream always receives a well-formed (possibly empty) list.
#[async_trait]
pub trait CommandExtractor: Send + Sync {
    /// Extract candidate commands from an aggregated utterance
    async fn extract(
        &self,
        utterance: &str,
        conversation_history: &[ConversationTurn],
        recent_commands: &[CandidateCommand],
    ) -> Vec<CandidateCommand>;
}

/// Select an extractor implementation from configuration
///
/// `auto` uses the LLM extractor when an API key is present and falls back
/// to the rules extractor otherwise.
#[must_use]
pub fn select_extractor(config: &Config) -> Arc<dyn CommandExtractor> {
    let llm_available = config.api_keys.openai.is_some();

    match (config.extractor, llm_available) {
        (ExtractorMode::Llm | ExtractorMode::Auto, true) => {
            let key = config
                .api_keys
                .openai
                .clone()
                .unwrap_or_default();
            tracing::info!(model = %config.llm.model, "using LLM command extractor");
            Arc::new(LlmExtractor::new(key, config.llm.clone()))
        }
        (ExtractorMode::Llm, false) => {
            tracing::warn!("llm extractor requested but no API key configured, using rules");
            Arc::new(RuleExtractor::new())
        }
        (ExtractorMode::Rules, _) | (ExtractorMode::Auto, false) => {
            tracing::info!("using rule-based command extractor");
            Arc::new(RuleExtractor::new())
        }
    }
}
