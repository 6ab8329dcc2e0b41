//! Incremental command accumulation
//!
//! A speaker rarely delivers a whole command in one utterance; "add five
//! pounds" now, "of coffee" two seconds later. The accumulator holds at most
//! one partial command per session and merges incomplete candidates into it
//! field-wise until the command completes or the context window lapses.

use std::time::{Duration, Instant};

use super::{is_command_complete, CandidateCommand, CommandAction};

/// How long a partial command stays mergeable
pub const CONTEXT_WINDOW: Duration = Duration::from_millis(5000);

/// Confidence assigned when a merge completes a command
const MERGED_CONFIDENCE: f32 = 0.95;

/// In-progress merge state for one session
#[derive(Debug, Clone)]
pub struct PartialCommand {
    pub action: CommandAction,
    pub item: Option<String>,
    pub quantity: Option<f64>,
    pub unit: Option<String>,
    pub last_updated: Instant,
}

impl PartialCommand {
    fn from_candidate(candidate: &CandidateCommand, now: Instant) -> Self {
        Self {
            action: candidate.action,
            item: candidate.item.clone(),
            quantity: candidate.quantity,
            unit: candidate.unit.clone(),
            last_updated: now,
        }
    }

    /// Whether every required field is present
    #[must_use]
    pub fn is_complete(&self) -> bool {
        is_command_complete(
            self.action,
            self.item.as_deref(),
            self.quantity,
            self.unit.as_deref(),
        )
    }

    /// Fixed confidence ladder for in-progress commands
    ///
    /// Grows monotonically as required fields accumulate:
    /// 0.3 -> 0.45 (action) -> 0.6 (+item) -> 0.8 (+quantity) -> 0.95 (undo
    /// or merged-complete).
    #[must_use]
    pub fn confidence(&self) -> f32 {
        if self.action == CommandAction::Undo {
            return 0.95;
        }
        let has_action = self.action != CommandAction::Unknown;
        match (has_action, self.item.is_some(), self.quantity.is_some()) {
            (true, true, true) => 0.8,
            (true, true, false) => 0.6,
            (true, false, _) => 0.45,
            (false, ..) => 0.3,
        }
    }

    /// Current state as an emittable candidate
    #[must_use]
    pub fn snapshot(&self) -> CandidateCommand {
        CandidateCommand::new(
            self.action,
            self.item.clone(),
            self.quantity,
            self.unit.clone(),
            self.confidence(),
        )
    }
}

/// Merges incomplete candidates across utterances
#[derive(Debug, Default)]
pub struct CommandAccumulator {
    partial: Option<PartialCommand>,
}

impl CommandAccumulator {
    /// Create an empty accumulator
    #[must_use]
    pub const fn new() -> Self {
        Self { partial: None }
    }

    /// Feed one candidate through the accumulator
    ///
    /// A complete candidate is returned immediately and leaves any partial
    /// untouched and does not reset the window. An incomplete candidate
    /// merges into a live partial (new present fields win) or starts a fresh
    /// one; if the merge completes the command it is returned at merged
    /// confidence and the partial is cleared.
    pub fn merge(&mut self, candidate: &CandidateCommand) -> Option<CandidateCommand> {
        self.merge_at(candidate, Instant::now())
    }

    /// [`Self::merge`] with an explicit clock, for tests
    pub fn merge_at(
        &mut self,
        candidate: &CandidateCommand,
        now: Instant,
    ) -> Option<CandidateCommand> {
        if candidate.is_complete {
            return Some(candidate.clone());
        }

        let live = self
            .partial
            .as_ref()
            .is_some_and(|p| now.duration_since(p.last_updated) < CONTEXT_WINDOW);

        if live {
            let partial = self.partial.as_mut()?;
            if candidate.action != CommandAction::Unknown {
                partial.action = candidate.action;
            }
            if candidate.item.is_some() {
                partial.item.clone_from(&candidate.item);
            }
            if candidate.quantity.is_some() {
                partial.quantity = candidate.quantity;
            }
            if candidate.unit.is_some() {
                partial.unit.clone_from(&candidate.unit);
            }
            partial.last_updated = now;

            if partial.is_complete() {
                let mut merged = partial.snapshot();
                merged.confidence = MERGED_CONFIDENCE;
                self.partial = None;
                tracing::debug!(
                    action = merged.action.as_str(),
                    item = ?merged.item,
                    "partial command completed by merge"
                );
                return Some(merged);
            }
            return None;
        }

        // No partial, or the old one expired: start fresh
        self.partial = Some(PartialCommand::from_candidate(candidate, now));
        None
    }

    /// Current incomplete snapshot, if a partial exists
    ///
    /// Emitted at the end of each batch so clients can show a
    /// "still listening" state without waiting for the window to close.
    #[must_use]
    pub fn snapshot(&self) -> Option<CandidateCommand> {
        self.partial.as_ref().map(PartialCommand::snapshot)
    }

    /// Drop any partial state
    pub fn clear(&mut self) {
        self.partial = None;
    }

    /// Access the live partial, if any
    #[must_use]
    pub const fn partial(&self) -> Option<&PartialCommand> {
        self.partial.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn incomplete(
        action: CommandAction,
        item: Option<&str>,
        quantity: Option<f64>,
        unit: Option<&str>,
    ) -> CandidateCommand {
        CandidateCommand::new(
            action,
            item.map(String::from),
            quantity,
            unit.map(String::from),
            0.6,
        )
    }

    #[test]
    fn complete_candidate_bypasses_partial() {
        let mut acc = CommandAccumulator::new();
        let now = Instant::now();

        acc.merge_at(
            &incomplete(CommandAction::Set, Some("flour"), None, None),
            now,
        );
        assert!(acc.partial().is_some());

        let complete = CandidateCommand::new(
            CommandAction::Add,
            Some("milk".to_string()),
            Some(2.0),
            Some("gal".to_string()),
            0.9,
        );
        let emitted = acc.merge_at(&complete, now).unwrap();
        assert_eq!(emitted.item.as_deref(), Some("milk"));

        // The stale partial is untouched, window not reset
        let partial = acc.partial().unwrap();
        assert_eq!(partial.item.as_deref(), Some("flour"));
        assert_eq!(partial.last_updated, now);
    }

    #[test]
    fn merge_completes_within_window() {
        let mut acc = CommandAccumulator::new();
        let now = Instant::now();

        let first = acc.merge_at(
            &incomplete(CommandAction::Add, None, Some(5.0), Some("pounds")),
            now,
        );
        assert!(first.is_none());

        let second = acc
            .merge_at(
                &incomplete(CommandAction::Unknown, Some("coffee"), None, None),
                now + Duration::from_millis(2000),
            )
            .unwrap();

        assert_eq!(second.action, CommandAction::Add);
        assert_eq!(second.item.as_deref(), Some("coffee"));
        assert_eq!(second.quantity, Some(5.0));
        assert!(second.is_complete);
        assert!((second.confidence - 0.95).abs() < f32::EPSILON);
        assert!(acc.partial().is_none());
    }

    #[test]
    fn expired_partial_is_replaced() {
        let mut acc = CommandAccumulator::new();
        let now = Instant::now();

        acc.merge_at(
            &incomplete(CommandAction::Add, None, Some(5.0), None),
            now,
        );
        let emitted = acc.merge_at(
            &incomplete(CommandAction::Unknown, Some("coffee"), None, None),
            now + CONTEXT_WINDOW + Duration::from_millis(1),
        );

        // No merge across an expired window: a fresh partial starts instead
        assert!(emitted.is_none());
        let partial = acc.partial().unwrap();
        assert_eq!(partial.action, CommandAction::Unknown);
        assert_eq!(partial.item.as_deref(), Some("coffee"));
        assert!(partial.quantity.is_none());
    }

    #[test]
    fn new_present_fields_win_absent_keep_old() {
        let mut acc = CommandAccumulator::new();
        let now = Instant::now();

        acc.merge_at(
            &incomplete(CommandAction::Set, Some("flour"), Some(10.0), None),
            now,
        );
        acc.merge_at(
            &incomplete(CommandAction::Unknown, None, Some(20.0), None),
            now + Duration::from_millis(100),
        );

        let partial = acc.partial().unwrap();
        assert_eq!(partial.action, CommandAction::Set);
        assert_eq!(partial.item.as_deref(), Some("flour"));
        assert_eq!(partial.quantity, Some(20.0));
    }

    #[test]
    fn disjoint_merge_is_order_independent() {
        let a = incomplete(CommandAction::Add, Some("rice"), None, None);
        let b = incomplete(CommandAction::Unknown, None, Some(3.0), Some("bags"));
        let now = Instant::now();
        let later = now + Duration::from_millis(50);

        let mut forward = CommandAccumulator::new();
        forward.merge_at(&a, now);
        let merged_forward = forward.merge_at(&b, later).unwrap();

        let mut reverse = CommandAccumulator::new();
        reverse.merge_at(&b, now);
        let merged_reverse = reverse.merge_at(&a, later).unwrap();

        assert_eq!(merged_forward.item, merged_reverse.item);
        assert_eq!(merged_forward.quantity, merged_reverse.quantity);
        assert_eq!(merged_forward.unit, merged_reverse.unit);
        assert_eq!(merged_forward.action, merged_reverse.action);
    }

    #[test]
    fn confidence_ladder_is_monotonic() {
        let now = Instant::now();
        let states = [
            incomplete(CommandAction::Unknown, None, None, Some("lbs")),
            incomplete(CommandAction::Set, None, None, None),
            incomplete(CommandAction::Set, Some("flour"), None, None),
            incomplete(CommandAction::Set, Some("flour"), Some(5.0), None),
        ];

        let expected = [0.3, 0.45, 0.6, 0.8];
        let mut previous = 0.0f32;
        for (state, want) in states.iter().zip(expected) {
            let mut acc = CommandAccumulator::new();
            acc.merge_at(state, now);
            let confidence = acc.partial().unwrap().confidence();
            assert!((confidence - want).abs() < f32::EPSILON);
            assert!(confidence >= previous);
            previous = confidence;
        }
    }

    #[test]
    fn undo_partial_scores_highest() {
        // An undo candidate is always complete, so exercise the ladder directly
        let partial = PartialCommand {
            action: CommandAction::Undo,
            item: None,
            quantity: None,
            unit: None,
            last_updated: Instant::now(),
        };
        assert!((partial.confidence() - 0.95).abs() < f32::EPSILON);
    }

    #[test]
    fn snapshot_reflects_current_state() {
        let mut acc = CommandAccumulator::new();
        acc.merge_at(
            &incomplete(CommandAction::Add, Some("coffee"), None, None),
            Instant::now(),
        );

        let snapshot = acc.snapshot().unwrap();
        assert_eq!(snapshot.action, CommandAction::Add);
        assert!(!snapshot.is_complete);
        assert!((snapshot.confidence - 0.6).abs() < f32::EPSILON);
    }
}
