//! Pantry Gateway - Voice-driven inventory gateway for restaurant kitchens
//!
//! This library provides the core functionality for the pantry gateway:
//! - Transcript aggregation over relayed speech-recognizer callbacks
//! - Command extraction (LLM-backed with a rule-based fallback)
//! - Incremental command accumulation and context-aware gap filling
//! - A risk-based confirmation policy and fuzzy catalog item resolution
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                  Kitchen clients                     │
//! │     speech recognizer  │  confirm / reject / undo   │
//! └────────────────────┬────────────────────────────────┘
//!                      │ WebSocket per session
//! ┌────────────────────▼────────────────────────────────┐
//! │                 Pantry Gateway                       │
//! │  Aggregator → Extractor → Accumulator → Policy      │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │        SQLite (catalog + vectors + action log)       │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod nlp;
pub mod pipeline;
pub mod policy;
pub mod session;
pub mod units;
pub mod voice;

pub use api::ApiServer;
pub use catalog::ItemResolver;
pub use config::Config;
pub use db::{DbConn, DbPool};
pub use error::{Error, Result};
pub use nlp::{
    is_command_complete, CandidateCommand, CommandAccumulator, CommandAction, CommandExtractor,
    ConversationTurn, LlmExtractor, RuleExtractor,
};
pub use pipeline::{SessionEvent, SessionHandle, SessionInput};
pub use policy::{ConfirmationDecision, ConfirmationType, FeedbackMode, RiskLevel};
pub use session::{SessionContext, SessionPhase};
pub use voice::TranscriptAggregator;
