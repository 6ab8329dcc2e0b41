//! Per-session rolling context
//!
//! One [`SessionContext`] per connected voice session, owned exclusively by
//! that session's pipeline task. It holds the short history the pipeline
//! needs to disambiguate speech: recent conversation turns, the last
//! resolved commands, the one pending confirmation, and the trailing
//! confirmation record.

use std::collections::VecDeque;
use std::time::Instant;

use crate::db::Item;
use crate::nlp::{CandidateCommand, ConversationTurn};
use crate::policy::{ConfirmationDecision, ConfirmationStats, CorrectionRecord};

/// Conversation turns kept per session
pub const MAX_CONVERSATION_TURNS: usize = 8;

/// Resolved commands kept per session
pub const MAX_RECENT_COMMANDS: usize = 2;

/// Corrections kept per session
const MAX_CORRECTIONS: usize = 8;

/// Where the session is in its confirmation state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    /// Listening; commands flow straight through the policy engine
    #[default]
    Normal,
    /// A confirmation is pending; new commands queue behind it
    AwaitingConfirmation,
}

/// A command held back for user approval
#[derive(Debug, Clone)]
pub struct PendingConfirmation {
    pub command: CandidateCommand,
    /// Catalog item the spoken phrase resolved to
    pub item: Item,
    pub decision: ConfirmationDecision,
    /// Auto-accept instant for visual confirmations
    pub deadline: Option<Instant>,
}

/// A resolved command waiting behind a pending confirmation
#[derive(Debug, Clone)]
pub struct QueuedCommand {
    pub command: CandidateCommand,
    pub item: Item,
}

/// Rolling state for one voice session
#[derive(Debug, Default)]
pub struct SessionContext {
    pub phase: SessionPhase,
    pub pending: Option<PendingConfirmation>,
    /// Commands completed while a confirmation was pending
    pub queued_commands: VecDeque<QueuedCommand>,
    /// Set while an utterance is being processed; always cleared afterwards
    pub is_processing: bool,
    /// A flush requested mid-processing; bounded to one, newest wins
    pub queued_flush: Option<String>,
    conversation: VecDeque<ConversationTurn>,
    recent_commands: VecDeque<CandidateCommand>,
    pub stats: ConfirmationStats,
    corrections: Vec<CorrectionRecord>,
}

impl SessionContext {
    /// Create an empty session context
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember a conversation turn, evicting the oldest past the cap
    pub fn push_turn(&mut self, text: impl Into<String>) {
        self.conversation.push_front(ConversationTurn::new(text));
        self.conversation.truncate(MAX_CONVERSATION_TURNS);
    }

    /// Conversation turns, newest first
    #[must_use]
    pub fn conversation(&self) -> Vec<ConversationTurn> {
        self.conversation.iter().cloned().collect()
    }

    /// Remember a resolved command, evicting the oldest past the cap
    pub fn push_command(&mut self, command: CandidateCommand) {
        self.recent_commands.push_front(command);
        self.recent_commands.truncate(MAX_RECENT_COMMANDS);
    }

    /// Resolved commands, newest first
    #[must_use]
    pub fn recent_commands(&self) -> Vec<CandidateCommand> {
        self.recent_commands.iter().cloned().collect()
    }

    /// Remember a user correction
    pub fn push_correction(&mut self, correction: CorrectionRecord) {
        self.corrections.push(correction);
        if self.corrections.len() > MAX_CORRECTIONS {
            self.corrections.remove(0);
        }
    }

    /// Recorded corrections, oldest first
    #[must_use]
    pub fn corrections(&self) -> &[CorrectionRecord] {
        &self.corrections
    }

    /// Park a command behind the pending confirmation
    pub fn enqueue_command(&mut self, queued: QueuedCommand) {
        self.queued_commands.push_back(queued);
    }

    /// Begin awaiting a confirmation
    pub fn set_pending(&mut self, pending: PendingConfirmation) {
        self.pending = Some(pending);
        self.phase = SessionPhase::AwaitingConfirmation;
    }

    /// Resolve the pending confirmation, returning to normal flow
    pub fn take_pending(&mut self) -> Option<PendingConfirmation> {
        self.phase = SessionPhase::Normal;
        self.pending.take()
    }

    /// Auto-accept deadline of the pending visual confirmation, if any
    #[must_use]
    pub fn pending_deadline(&self) -> Option<Instant> {
        self.pending.as_ref().and_then(|p| p.deadline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nlp::CommandAction;

    fn command(item: &str) -> CandidateCommand {
        CandidateCommand::new(
            CommandAction::Add,
            Some(item.to_string()),
            Some(1.0),
            None,
            0.9,
        )
    }

    #[test]
    fn conversation_is_bounded_and_newest_first() {
        let mut ctx = SessionContext::new();
        for i in 0..12 {
            ctx.push_turn(format!("turn {i}"));
        }

        let turns = ctx.conversation();
        assert_eq!(turns.len(), MAX_CONVERSATION_TURNS);
        assert_eq!(turns[0].text, "turn 11");
        assert_eq!(turns.last().unwrap().text, "turn 4");
    }

    #[test]
    fn recent_commands_are_bounded() {
        let mut ctx = SessionContext::new();
        ctx.push_command(command("flour"));
        ctx.push_command(command("milk"));
        ctx.push_command(command("coffee"));

        let recent = ctx.recent_commands();
        assert_eq!(recent.len(), MAX_RECENT_COMMANDS);
        assert_eq!(recent[0].item.as_deref(), Some("coffee"));
        assert_eq!(recent[1].item.as_deref(), Some("milk"));
    }

    #[test]
    fn pending_transitions_phase() {
        let mut ctx = SessionContext::new();
        assert_eq!(ctx.phase, SessionPhase::Normal);

        ctx.set_pending(PendingConfirmation {
            command: command("coffee"),
            item: test_item(),
            decision: crate::policy::decide(
                &command("coffee"),
                0.7,
                &ConfirmationStats::default(),
                &[],
            ),
            deadline: None,
        });
        assert_eq!(ctx.phase, SessionPhase::AwaitingConfirmation);

        let taken = ctx.take_pending();
        assert!(taken.is_some());
        assert_eq!(ctx.phase, SessionPhase::Normal);
        assert!(ctx.take_pending().is_none());
    }

    fn test_item() -> Item {
        Item {
            id: "item_test".to_string(),
            name: "coffee".to_string(),
            quantity: 10.0,
            unit: "lb".to_string(),
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        }
    }
}
