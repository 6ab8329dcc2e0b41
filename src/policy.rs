//! Risk-based confirmation policy
//!
//! Every completed command passes through [`decide`] before it may touch
//! inventory. The outcome says how much human confirmation is required:
//! apply silently, flash a dismissible banner, or block until the user
//! answers.

use serde::Serialize;

use crate::nlp::{CandidateCommand, CommandAction};

/// Deltas at or above this size (in the spoken unit) raise the action's risk
const LARGE_DELTA: f64 = 50.0;

/// Confidence at or above which an implicit apply is considered
const IMPLICIT_CONFIDENCE: f32 = 0.9;

/// Confidence below which a blocking voice confirmation is required
const VOICE_CONFIDENCE: f32 = 0.6;

/// Trailing accuracy below which implicit applies are disabled
const IMPLICIT_ACCURACY: f64 = 0.8;

/// Seconds before an unanswered visual confirmation auto-accepts
const VISUAL_TIMEOUT_SECS: u64 = 8;

/// How much confirmation a command requires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfirmationType {
    /// Apply immediately, notify only
    Implicit,
    /// Blocking spoken confirmation, no timeout
    Voice,
    /// Non-blocking banner; treated as accepted after the timeout
    Visual,
    /// Blocking confirmation, must be answered
    Explicit,
}

/// Channel the confirmation prompt should use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackMode {
    Voice,
    Visual,
    Both,
}

/// Assessed risk of applying a command
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// Policy output governing whether/how a command needs approval
#[derive(Debug, Clone, Serialize)]
pub struct ConfirmationDecision {
    pub confirmation_type: ConfirmationType,
    pub feedback_mode: FeedbackMode,
    /// Present only for visual confirmations
    pub timeout_seconds: Option<u64>,
    pub risk_level: RiskLevel,
    /// A previously corrected reading of this item, if one is on record
    pub suggested_correction: Option<String>,
}

impl ConfirmationDecision {
    /// Whether the command may be applied without waiting for the user
    #[must_use]
    pub const fn is_implicit(&self) -> bool {
        matches!(self.confirmation_type, ConfirmationType::Implicit)
    }
}

/// Running tally of how the session's confirmations have gone
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfirmationStats {
    pub correct: u32,
    pub total: u32,
}

impl ConfirmationStats {
    /// Record a confirmation that matched what the user meant
    pub const fn record_correct(&mut self) {
        self.correct += 1;
        self.total += 1;
    }

    /// Record a rejection or correction
    pub const fn record_incorrect(&mut self) {
        self.total += 1;
    }

    /// Trailing accuracy; a fresh session is trusted until proven otherwise
    #[must_use]
    pub fn accuracy(&self) -> f64 {
        if self.total == 0 {
            return 1.0;
        }
        f64::from(self.correct) / f64::from(self.total)
    }
}

/// One user correction, remembered for later suggestions
#[derive(Debug, Clone)]
pub struct CorrectionRecord {
    pub original: String,
    pub corrected: String,
    pub mistake_type: Option<String>,
}

/// Assess the risk of applying a command
///
/// Removals and overwrites destroy information, so they start at medium and
/// go high for large deltas; additions are cheap to reverse. An unknown
/// action is always high risk.
#[must_use]
pub fn assess_risk(command: &CandidateCommand) -> RiskLevel {
    let large = command.quantity.is_some_and(|q| q.abs() >= LARGE_DELTA);

    match command.action {
        CommandAction::Unknown => RiskLevel::High,
        CommandAction::Remove | CommandAction::Set => {
            if large {
                RiskLevel::High
            } else {
                RiskLevel::Medium
            }
        }
        CommandAction::Add => {
            if large {
                RiskLevel::Medium
            } else {
                RiskLevel::Low
            }
        }
        CommandAction::Undo => RiskLevel::Low,
    }
}

/// Decide how much confirmation a completed command requires
///
/// High confidence on a low-risk action with a clean trailing record applies
/// implicitly; medium bands get a dismissible visual banner; low confidence
/// or high risk blocks until the user answers.
#[must_use]
pub fn decide(
    command: &CandidateCommand,
    confidence: f32,
    stats: &ConfirmationStats,
    corrections: &[CorrectionRecord],
) -> ConfirmationDecision {
    let risk_level = assess_risk(command);
    let suggested_correction = suggest_correction(command, corrections);

    let confirmation_type = if risk_level == RiskLevel::High {
        ConfirmationType::Explicit
    } else if confidence < VOICE_CONFIDENCE {
        ConfirmationType::Voice
    } else if confidence >= IMPLICIT_CONFIDENCE
        && risk_level == RiskLevel::Low
        && stats.accuracy() >= IMPLICIT_ACCURACY
    {
        ConfirmationType::Implicit
    } else {
        ConfirmationType::Visual
    };

    let (feedback_mode, timeout_seconds) = match confirmation_type {
        ConfirmationType::Implicit | ConfirmationType::Voice => (FeedbackMode::Voice, None),
        ConfirmationType::Visual => (FeedbackMode::Visual, Some(VISUAL_TIMEOUT_SECS)),
        ConfirmationType::Explicit => (FeedbackMode::Both, None),
    };

    ConfirmationDecision {
        confirmation_type,
        feedback_mode,
        timeout_seconds,
        risk_level,
        suggested_correction,
    }
}

/// Surface a recorded correction for the command's spoken item, if any
fn suggest_correction(
    command: &CandidateCommand,
    corrections: &[CorrectionRecord],
) -> Option<String> {
    let item = command.item.as_deref()?;
    corrections
        .iter()
        .rev()
        .find(|c| c.original.eq_ignore_ascii_case(item))
        .map(|c| c.corrected.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(action: CommandAction, quantity: f64) -> CandidateCommand {
        CandidateCommand::new(
            action,
            Some("coffee".to_string()),
            Some(quantity),
            Some("pounds".to_string()),
            0.9,
        )
    }

    #[test]
    fn confident_add_with_clean_record_is_implicit() {
        let cmd = command(CommandAction::Add, 5.0);
        let stats = ConfirmationStats { correct: 4, total: 4 };

        let decision = decide(&cmd, 0.95, &stats, &[]);
        assert_eq!(decision.confirmation_type, ConfirmationType::Implicit);
        assert_eq!(decision.risk_level, RiskLevel::Low);
        assert!(decision.timeout_seconds.is_none());
    }

    #[test]
    fn fresh_session_is_trusted() {
        let cmd = command(CommandAction::Add, 5.0);
        let decision = decide(&cmd, 0.95, &ConfirmationStats::default(), &[]);
        assert_eq!(decision.confirmation_type, ConfirmationType::Implicit);
    }

    #[test]
    fn low_confidence_remove_blocks() {
        let cmd = command(CommandAction::Remove, 5.0);
        let decision = decide(&cmd, 0.5, &ConfirmationStats::default(), &[]);
        assert_eq!(decision.confirmation_type, ConfirmationType::Voice);
        assert!(decision.timeout_seconds.is_none());
    }

    #[test]
    fn unknown_action_is_explicit() {
        let cmd = command(CommandAction::Unknown, 5.0);
        let decision = decide(&cmd, 0.95, &ConfirmationStats::default(), &[]);
        assert_eq!(decision.confirmation_type, ConfirmationType::Explicit);
        assert_eq!(decision.risk_level, RiskLevel::High);
        assert_eq!(decision.feedback_mode, FeedbackMode::Both);
    }

    #[test]
    fn large_removal_is_high_risk() {
        let cmd = command(CommandAction::Remove, 80.0);
        assert_eq!(assess_risk(&cmd), RiskLevel::High);
        let decision = decide(&cmd, 0.95, &ConfirmationStats::default(), &[]);
        assert_eq!(decision.confirmation_type, ConfirmationType::Explicit);
    }

    #[test]
    fn medium_band_gets_visual_with_timeout() {
        let cmd = command(CommandAction::Set, 10.0);
        let decision = decide(&cmd, 0.85, &ConfirmationStats::default(), &[]);
        assert_eq!(decision.confirmation_type, ConfirmationType::Visual);
        assert_eq!(decision.timeout_seconds, Some(VISUAL_TIMEOUT_SECS));
        assert_eq!(decision.feedback_mode, FeedbackMode::Visual);
    }

    #[test]
    fn poor_trailing_accuracy_disables_implicit() {
        let cmd = command(CommandAction::Add, 5.0);
        let stats = ConfirmationStats { correct: 1, total: 3 };

        let decision = decide(&cmd, 0.95, &stats, &[]);
        assert_eq!(decision.confirmation_type, ConfirmationType::Visual);
    }

    #[test]
    fn accuracy_math() {
        let mut stats = ConfirmationStats::default();
        assert!((stats.accuracy() - 1.0).abs() < f64::EPSILON);

        stats.record_correct();
        stats.record_incorrect();
        assert!((stats.accuracy() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn recorded_correction_is_suggested() {
        let cmd = command(CommandAction::Add, 5.0);
        let corrections = vec![CorrectionRecord {
            original: "coffee".to_string(),
            corrected: "coffee beans".to_string(),
            mistake_type: Some("wrong_item".to_string()),
        }];

        let decision = decide(&cmd, 0.95, &ConfirmationStats::default(), &corrections);
        assert_eq!(decision.suggested_correction.as_deref(), Some("coffee beans"));
    }

    #[test]
    fn undo_is_low_risk() {
        let cmd = CandidateCommand::new(CommandAction::Undo, None, None, None, 0.95);
        assert_eq!(assess_risk(&cmd), RiskLevel::Low);
    }
}
