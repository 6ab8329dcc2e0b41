//! Rule-based command extraction fallback
//!
//! A regex ladder over normalized speech: filler words stripped, spelled-out
//! numbers rewritten as digits, then action verbs matched in order. Used
//! when no LLM backend is configured; implements the same contract as
//! [`super::LlmExtractor`].

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;

use super::{CandidateCommand, CommandAction, CommandExtractor, ConversationTurn};
use crate::units;

/// Filler phrases stripped before matching, longest first
const FILLERS: &[&str] = &[
    "can you please",
    "could you please",
    "can you",
    "could you",
    "you know",
    "please",
    "okay",
    "um",
    "uh",
    "so",
];

/// Spelled-out numbers up to the tens
const WORD_NUMBERS: &[(&str, u32)] = &[
    ("zero", 0), ("one", 1), ("two", 2), ("three", 3), ("four", 4),
    ("five", 5), ("six", 6), ("seven", 7), ("eight", 8), ("nine", 9),
    ("ten", 10), ("eleven", 11), ("twelve", 12), ("thirteen", 13),
    ("fourteen", 14), ("fifteen", 15), ("sixteen", 16), ("seventeen", 17),
    ("eighteen", 18), ("nineteen", 19), ("twenty", 20), ("thirty", 30),
    ("forty", 40), ("fifty", 50), ("sixty", 60), ("seventy", 70),
    ("eighty", 80), ("ninety", 90), ("hundred", 100),
];

static UNDO_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:undo|scratch that|never ?mind)\b").expect("valid regex")
});

static SET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:set|we have|we've got|there (?:are|is)|inventory (?:is|shows))\s+(?P<rest>.+)$",
    )
    .expect("valid regex")
});

/// "set <item> to <quantity> <unit>" inversion
static SET_TO_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:the\s+)?(?P<item>.+?)\s+to\s+(?P<qty>\d+(?:\.\d+)?)\s*(?P<unit>[a-z]+)?$")
        .expect("valid regex")
});

static ADD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:add|put|received|bought|got|restocked?)\s+(?P<rest>.+)$")
        .expect("valid regex")
});

static REMOVE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:remove|take out|took|used|sold|wasted|tossed?)\s+(?P<rest>.+)$")
        .expect("valid regex")
});

/// "<quantity> [unit] [of] <item>" tail shared by every verb
static QUANTITY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<qty>\d+(?:\.\d+)?)\s*(?P<tail>.*)$").expect("valid regex")
});

/// Bare action verbs, for "add" trailing off into silence
static BARE_VERB_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<verb>add|put|remove|take|set)\b\s*$").expect("valid regex")
});

/// Extracts commands with regex rules, no network required
#[derive(Debug, Default)]
pub struct RuleExtractor;

impl RuleExtractor {
    /// Create a new rule extractor
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Lowercase, strip punctuation and fillers, digitize spelled numbers
    fn normalize(utterance: &str) -> String {
        let mut text = utterance.to_lowercase();
        text.retain(|c| c.is_alphanumeric() || c.is_whitespace() || c == '.' || c == '\'');
        text = text.trim_end_matches('.').to_string();

        for filler in FILLERS {
            // Whole-phrase removal, keeping word boundaries intact
            let pattern = format!(" {filler} ");
            let padded = format!(" {text} ");
            text = padded.replace(&pattern, " ").trim().to_string();
        }

        let tokens: Vec<String> = text
            .split_whitespace()
            .map(|token| {
                WORD_NUMBERS
                    .iter()
                    .find(|(word, _)| *word == token)
                    .map_or_else(|| token.to_string(), |(_, n)| n.to_string())
            })
            .collect();

        // Merge "20 5" from "twenty five" into 25
        let mut merged: Vec<String> = Vec::with_capacity(tokens.len());
        for token in tokens {
            if let (Some(last), Ok(units_digit)) = (merged.last(), token.parse::<u32>()) {
                if let Ok(tens) = last.parse::<u32>() {
                    if tens >= 20 && tens % 10 == 0 && units_digit < 10 {
                        let last_index = merged.len() - 1;
                        merged[last_index] = (tens + units_digit).to_string();
                        continue;
                    }
                }
            }
            merged.push(token);
        }

        merged.join(" ")
    }

    /// Split a "<quantity> [unit] [of] <item>" tail
    fn parse_quantity_tail(rest: &str) -> Option<(f64, Option<String>, Option<String>)> {
        let caps = QUANTITY_RE.captures(rest)?;
        let quantity: f64 = caps.name("qty")?.as_str().parse().ok()?;

        let tail = caps.name("tail").map_or("", |m| m.as_str()).trim();
        if tail.is_empty() {
            return Some((quantity, None, None));
        }

        let mut words = tail.split_whitespace().peekable();
        let mut unit = None;
        if let Some(first) = words.peek().copied() {
            if units::is_unit(first) {
                unit = Some(first.to_string());
                words.next();
            }
        }

        if words.peek() == Some(&"of") {
            words.next();
        }

        let item: String = words.collect::<Vec<_>>().join(" ");
        let item = (!item.is_empty()).then_some(item);

        Some((quantity, unit, item))
    }

    fn extract_one(normalized: &str) -> Option<CandidateCommand> {
        if UNDO_RE.is_match(normalized) {
            return Some(CandidateCommand::new(
                CommandAction::Undo,
                None,
                None,
                None,
                0.95,
            ));
        }

        if let Some(caps) = SET_RE.captures(normalized) {
            let rest = caps.name("rest")?.as_str();

            // "set the flour to 20 lbs"
            if let Some(to_caps) = SET_TO_RE.captures(rest) {
                let quantity: f64 = to_caps.name("qty")?.as_str().parse().ok()?;
                let unit = to_caps.name("unit").map(|m| m.as_str().to_string());
                let item = to_caps.name("item").map(|m| m.as_str().to_string());
                return Some(Self::candidate(CommandAction::Set, quantity, unit, item));
            }

            if let Some((quantity, unit, item)) = Self::parse_quantity_tail(rest) {
                return Some(Self::candidate(CommandAction::Set, quantity, unit, item));
            }
        }

        if let Some(caps) = ADD_RE.captures(normalized) {
            if let Some((quantity, unit, item)) =
                Self::parse_quantity_tail(caps.name("rest")?.as_str())
            {
                return Some(Self::candidate(CommandAction::Add, quantity, unit, item));
            }
        }

        if let Some(caps) = REMOVE_RE.captures(normalized) {
            if let Some((quantity, unit, item)) =
                Self::parse_quantity_tail(caps.name("rest")?.as_str())
            {
                return Some(Self::candidate(CommandAction::Remove, quantity, unit, item));
            }
        }

        if let Some(caps) = BARE_VERB_RE.captures(normalized) {
            let action = match caps.name("verb")?.as_str() {
                "add" | "put" => CommandAction::Add,
                "remove" | "take" => CommandAction::Remove,
                _ => CommandAction::Set,
            };
            return Some(CandidateCommand::new(action, None, None, None, 0.45));
        }

        None
    }

    fn candidate(
        action: CommandAction,
        quantity: f64,
        unit: Option<String>,
        item: Option<String>,
    ) -> CandidateCommand {
        let cmd = CandidateCommand::new(action, item, Some(quantity), unit, 0.85);
        if cmd.is_complete {
            cmd
        } else {
            CandidateCommand { confidence: 0.6, ..cmd }
        }
    }
}

#[async_trait]
impl CommandExtractor for RuleExtractor {
    async fn extract(
        &self,
        utterance: &str,
        _conversation_history: &[ConversationTurn],
        _recent_commands: &[CandidateCommand],
    ) -> Vec<CandidateCommand> {
        let normalized = Self::normalize(utterance);
        if normalized.is_empty() {
            return Vec::new();
        }

        let commands: Vec<CandidateCommand> =
            Self::extract_one(&normalized).into_iter().collect();

        tracing::debug!(
            utterance = %utterance,
            normalized = %normalized,
            count = commands.len(),
            "rule extraction"
        );

        commands
    }
}
