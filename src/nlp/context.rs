//! Context-aware gap filling for incomplete candidates
//!
//! "Add five more" only makes sense against what was just said. Before a
//! candidate reaches the accumulator, a present quantity with a missing item
//! or unit is back-filled from the most recent resolved command sharing the
//! action, then from a command-shaped phrase in the conversation history.

use std::sync::LazyLock;

use regex::Regex;

use super::{is_command_complete, CandidateCommand, CommandAction, ConversationTurn};

/// "(add|remove|set) <number> <unit> of <item>" in a remembered turn
static TURN_COMMAND_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?P<action>add|remove|set)\s+(?P<qty>\d+(?:\.\d+)?)\s+(?P<unit>[a-z]+)\s+of\s+(?P<item>[a-z][a-z ]*)",
    )
    .expect("valid regex")
});

/// Minimum confidence after back-filling completes a command
const BACKFILL_CONFIDENCE: f32 = 0.9;

/// Back-fill a quantity-bearing incomplete candidate from session context
///
/// `recent_commands` and `conversation` are ordered newest first. Returns
/// true if the candidate was completed by back-filling.
pub fn enhance(
    candidate: &mut CandidateCommand,
    recent_commands: &[CandidateCommand],
    conversation: &[ConversationTurn],
) -> bool {
    if candidate.is_complete
        || candidate.quantity.is_none()
        || (candidate.item.is_some() && candidate.unit.is_some())
    {
        return false;
    }

    backfill_from_commands(candidate, recent_commands);

    if !recompute(candidate) {
        backfill_from_conversation(candidate, conversation);
        recompute(candidate);
    }

    if candidate.is_complete {
        candidate.confidence = candidate.confidence.max(BACKFILL_CONFIDENCE);
        tracing::debug!(
            action = candidate.action.as_str(),
            item = ?candidate.item,
            "candidate completed from context"
        );
        true
    } else {
        false
    }
}

/// Fill from the most recent resolved command sharing the action (or any
/// action when none is specified yet)
fn backfill_from_commands(candidate: &mut CandidateCommand, recent_commands: &[CandidateCommand]) {
    let source = recent_commands.iter().find(|cmd| {
        candidate.action == CommandAction::Unknown || cmd.action == candidate.action
    });

    let Some(source) = source else { return };

    if candidate.action == CommandAction::Unknown {
        candidate.action = source.action;
    }
    if candidate.item.is_none() {
        candidate.item.clone_from(&source.item);
    }
    if candidate.unit.is_none() {
        candidate.unit.clone_from(&source.unit);
    }
}

/// Fill from a command-shaped phrase in recent conversation turns
fn backfill_from_conversation(candidate: &mut CandidateCommand, conversation: &[ConversationTurn]) {
    for turn in conversation {
        let Some(caps) = TURN_COMMAND_RE.captures(&turn.text) else {
            continue;
        };

        if candidate.action == CommandAction::Unknown {
            if let Some(action) = caps.name("action") {
                candidate.action = CommandAction::parse(action.as_str());
            }
        }
        if candidate.item.is_none() {
            candidate.item = caps.name("item").map(|m| m.as_str().trim().to_string());
        }
        if candidate.unit.is_none() {
            candidate.unit = caps.name("unit").map(|m| m.as_str().to_string());
        }
        return;
    }
}

/// Refresh the completeness flag; true if now complete
fn recompute(candidate: &mut CandidateCommand) -> bool {
    candidate.is_complete = is_command_complete(
        candidate.action,
        candidate.item.as_deref(),
        candidate.quantity,
        candidate.unit.as_deref(),
    );
    candidate.is_complete
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quantity_only(action: CommandAction, quantity: f64) -> CandidateCommand {
        CandidateCommand::new(action, None, Some(quantity), None, 0.6)
    }

    fn resolved(action: CommandAction, item: &str, quantity: f64, unit: &str) -> CandidateCommand {
        CandidateCommand::new(
            action,
            Some(item.to_string()),
            Some(quantity),
            Some(unit.to_string()),
            0.95,
        )
    }

    #[test]
    fn backfills_item_and_unit_from_matching_action() {
        let mut candidate = quantity_only(CommandAction::Add, 3.0);
        let recent = vec![resolved(CommandAction::Add, "coffee", 5.0, "pounds")];

        let completed = enhance(&mut candidate, &recent, &[]);

        assert!(completed);
        assert_eq!(candidate.item.as_deref(), Some("coffee"));
        assert_eq!(candidate.unit.as_deref(), Some("pounds"));
        assert_eq!(candidate.quantity, Some(3.0));
        assert!(candidate.confidence >= 0.9);
    }

    #[test]
    fn action_mismatch_skips_command_backfill() {
        let mut candidate = quantity_only(CommandAction::Remove, 3.0);
        let recent = vec![resolved(CommandAction::Add, "coffee", 5.0, "pounds")];

        let completed = enhance(&mut candidate, &recent, &[]);

        assert!(!completed);
        assert!(candidate.item.is_none());
    }

    #[test]
    fn unknown_action_borrows_from_newest_command() {
        let mut candidate = quantity_only(CommandAction::Unknown, 2.0);
        let recent = vec![
            resolved(CommandAction::Remove, "flour", 1.0, "lbs"),
            resolved(CommandAction::Add, "coffee", 5.0, "pounds"),
        ];

        let completed = enhance(&mut candidate, &recent, &[]);

        assert!(completed);
        assert_eq!(candidate.action, CommandAction::Remove);
        assert_eq!(candidate.item.as_deref(), Some("flour"));
    }

    #[test]
    fn falls_back_to_conversation_pattern() {
        let mut candidate = quantity_only(CommandAction::Unknown, 4.0);
        let conversation = vec![
            ConversationTurn::new("what a rush tonight"),
            ConversationTurn::new("add 5 pounds of coffee"),
        ];

        let completed = enhance(&mut candidate, &[], &conversation);

        assert!(completed);
        assert_eq!(candidate.action, CommandAction::Add);
        assert_eq!(candidate.item.as_deref(), Some("coffee"));
        assert_eq!(candidate.unit.as_deref(), Some("pounds"));
        assert_eq!(candidate.quantity, Some(4.0));
    }

    #[test]
    fn complete_candidates_are_untouched() {
        let mut candidate = resolved(CommandAction::Add, "milk", 2.0, "gal");
        let recent = vec![resolved(CommandAction::Add, "coffee", 5.0, "pounds")];
        let before = candidate.clone();

        let changed = enhance(&mut candidate, &recent, &[]);

        assert!(!changed);
        assert_eq!(candidate.item, before.item);
    }

    #[test]
    fn no_quantity_means_no_backfill() {
        let mut candidate =
            CandidateCommand::new(CommandAction::Add, None, None, None, 0.45);
        let recent = vec![resolved(CommandAction::Add, "coffee", 5.0, "pounds")];

        let changed = enhance(&mut candidate, &recent, &[]);

        assert!(!changed);
        assert!(candidate.item.is_none());
    }
}
