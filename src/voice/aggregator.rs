//! Transcript aggregation
//!
//! Speech recognizers deliver final transcripts in fragments ("We have",
//! "10 gallons", "of milk."). The aggregator buffers fragments into one
//! utterance and decides when that utterance is probably complete: terminal
//! punctuation, a command-shaped buffer, or silence.
//!
//! The buffer is owned by one session's pipeline task; flushing clears it
//! atomically via [`std::mem::take`].

use std::sync::LazyLock;
use std::time::{Duration, Instant};

use regex::Regex;

/// Idle interval after which a non-empty buffer flushes
pub const IDLE_FLUSH: Duration = Duration::from_secs(3);

/// A buffer that already reads as a full "verb quantity unit of item"
/// command, the usual shape of a set-command continuation arriving as
/// "<number> <unit>" fragments
static COMMAND_BOUNDARY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:set|add|remove|we have|there (?:are|is))\b.*\b\d+(?:\.\d+)?\s+[a-z]+\s+of\s+[a-z]+",
    )
    .expect("valid regex")
});

/// Buffers raw transcript fragments into utterances
#[derive(Debug, Default)]
pub struct TranscriptAggregator {
    buffer: String,
    last_activity: Option<Instant>,
}

impl TranscriptAggregator {
    /// Create an empty aggregator
    #[must_use]
    pub const fn new() -> Self {
        Self {
            buffer: String::new(),
            last_activity: None,
        }
    }

    /// Append a fragment and decide synchronously whether to flush
    ///
    /// Returns the aggregated utterance when the fragment carries terminal
    /// punctuation or the buffer now reads as a complete command; otherwise
    /// the fragment is buffered and the idle timer restarts.
    pub fn push(&mut self, fragment: &str) -> Option<String> {
        self.push_at(fragment, Instant::now())
    }

    /// [`Self::push`] with an explicit clock, for tests
    pub fn push_at(&mut self, fragment: &str, now: Instant) -> Option<String> {
        let fragment = fragment.trim();
        if fragment.is_empty() {
            return None;
        }

        if !self.buffer.is_empty() {
            self.buffer.push(' ');
        }
        self.buffer.push_str(fragment);
        self.last_activity = Some(now);

        if has_terminal_punctuation(fragment) || COMMAND_BOUNDARY_RE.is_match(&self.buffer) {
            return Some(self.take());
        }

        None
    }

    /// When the buffered utterance should flush on silence, if ever
    #[must_use]
    pub fn idle_deadline(&self) -> Option<Instant> {
        if self.buffer.is_empty() {
            return None;
        }
        self.last_activity.map(|at| at + IDLE_FLUSH)
    }

    /// Flush the buffer if the idle interval has elapsed
    pub fn flush_idle(&mut self, now: Instant) -> Option<String> {
        let deadline = self.idle_deadline()?;
        (now >= deadline).then(|| self.take())
    }

    /// Whether any fragments are buffered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Take the buffered utterance, clearing the aggregator
    pub fn take(&mut self) -> String {
        self.last_activity = None;
        std::mem::take(&mut self.buffer)
    }
}

/// True if the fragment ends a sentence
fn has_terminal_punctuation(fragment: &str) -> bool {
    fragment
        .chars()
        .last()
        .is_some_and(|c| matches!(c, '.' | '!' | '?'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fragments_are_space_joined() {
        let mut agg = TranscriptAggregator::new();
        let now = Instant::now();

        assert!(agg.push_at("We have", now).is_none());
        assert!(agg.push_at("10 gallons", now).is_none());
        let utterance = agg.push_at("of milk.", now).unwrap();

        assert_eq!(utterance, "We have 10 gallons of milk.");
        assert!(agg.is_empty());
    }

    #[test]
    fn terminal_punctuation_flushes() {
        let mut agg = TranscriptAggregator::new();
        assert!(agg.push("add five pounds of coffee.").is_some());
        assert!(agg.is_empty());
    }

    #[test]
    fn command_boundary_flushes_without_punctuation() {
        let mut agg = TranscriptAggregator::new();
        let now = Instant::now();

        assert!(agg.push_at("set the", now).is_none());
        let utterance = agg.push_at("flour 20 pounds of flour", now);
        assert_eq!(utterance.as_deref(), Some("set the flour 20 pounds of flour"));
    }

    #[test]
    fn incomplete_command_waits() {
        let mut agg = TranscriptAggregator::new();
        // "of <item>" is still missing, so no boundary yet
        assert!(agg.push("we have 10 gallons").is_none());
        assert!(!agg.is_empty());
    }

    #[test]
    fn idle_deadline_tracks_last_fragment() {
        let mut agg = TranscriptAggregator::new();
        let now = Instant::now();

        assert!(agg.idle_deadline().is_none());
        agg.push_at("we have", now);
        assert_eq!(agg.idle_deadline(), Some(now + IDLE_FLUSH));

        let later = now + Duration::from_secs(1);
        agg.push_at("10 gallons", later);
        assert_eq!(agg.idle_deadline(), Some(later + IDLE_FLUSH));
    }

    #[test]
    fn idle_flush_after_interval() {
        let mut agg = TranscriptAggregator::new();
        let now = Instant::now();

        agg.push_at("we have 10 gallons", now);
        assert!(agg.flush_idle(now + Duration::from_secs(1)).is_none());

        let flushed = agg.flush_idle(now + IDLE_FLUSH).unwrap();
        assert_eq!(flushed, "we have 10 gallons");
        assert!(agg.idle_deadline().is_none());
    }

    #[test]
    fn empty_fragments_are_ignored() {
        let mut agg = TranscriptAggregator::new();
        assert!(agg.push("   ").is_none());
        assert!(agg.is_empty());
        assert!(agg.idle_deadline().is_none());
    }

    #[test]
    fn take_clears_atomically() {
        let mut agg = TranscriptAggregator::new();
        agg.push("we have");
        let taken = agg.take();
        assert_eq!(taken, "we have");
        assert!(agg.is_empty());
        assert!(agg.idle_deadline().is_none());
    }
}
