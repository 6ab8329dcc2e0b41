//! Per-session command pipeline
//!
//! One pipeline task per connected voice session owns all of that session's
//! state: the transcript aggregator, the command accumulator, and the
//! rolling context. Inputs arrive on a channel and are processed strictly in
//! order; the only suspension points are the extractor call and the item
//! resolver's similarity query. Idle flushes and visual-confirmation
//! timeouts are `select!` timers on the same task, so closing the input
//! channel tears everything down and no timer can fire afterwards.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use crate::catalog::ItemResolver;
use crate::db::actions::NewAction;
use crate::db::{ActionLogRepo, ActionRecord, Item, ItemRepo};
use crate::nlp::{
    context, CandidateCommand, CommandAccumulator, CommandAction, CommandExtractor,
};
use crate::policy::{
    self, ConfirmationDecision, ConfirmationType, CorrectionRecord, FeedbackMode, RiskLevel,
};
use crate::session::{PendingConfirmation, QueuedCommand, SessionContext};
use crate::units;
use crate::voice::TranscriptAggregator;
use crate::{Error, Result};

/// Input to a session pipeline, in arrival order
#[derive(Debug, Clone)]
pub enum SessionInput {
    /// A speech-recognizer callback; only final frames feed the aggregator
    Transcript {
        text: String,
        is_final: bool,
        confidence: f32,
    },
    /// Accept the pending confirmation
    Confirm,
    /// Reject the pending confirmation
    Reject,
    /// Replace the pending command's item and apply it
    Correct {
        original: String,
        corrected: String,
        mistake_type: Option<String>,
    },
    /// Reverse the last applied action
    Undo,
}

/// Typed event from a session pipeline to its client
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Transcription {
        text: String,
        is_final: bool,
    },
    CommandProcessed {
        record: ActionRecord,
    },
    Feedback {
        message: String,
    },
    ClarificationNeeded {
        message: String,
        suggestions: Vec<String>,
    },
    NlpResponse(NlpResponse),
    Error {
        code: String,
        message: String,
    },
}

/// Full decision payload for the `nlp-response` event
#[derive(Debug, Clone, serde::Serialize)]
pub struct NlpResponse {
    pub action: CommandAction,
    pub item: Option<String>,
    pub quantity: Option<f64>,
    pub unit: Option<String>,
    pub confidence: f32,
    pub is_complete: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmation_type: Option<ConfirmationType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback_mode: Option<FeedbackMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_level: Option<RiskLevel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_correction: Option<String>,
}

impl NlpResponse {
    /// Payload for an in-progress command, no decision yet
    fn listening(command: &CandidateCommand) -> Self {
        Self {
            action: command.action,
            item: command.item.clone(),
            quantity: command.quantity,
            unit: command.unit.clone(),
            confidence: command.confidence,
            is_complete: command.is_complete,
            confirmation_type: None,
            feedback_mode: None,
            timeout_seconds: None,
            risk_level: None,
            suggested_correction: None,
        }
    }

    /// Payload for a decided command
    fn decided(command: &CandidateCommand, decision: &ConfirmationDecision) -> Self {
        Self {
            confirmation_type: Some(decision.confirmation_type),
            feedback_mode: Some(decision.feedback_mode),
            timeout_seconds: decision.timeout_seconds,
            risk_level: Some(decision.risk_level),
            suggested_correction: decision.suggested_correction.clone(),
            ..Self::listening(command)
        }
    }
}

/// Shared dependencies a pipeline needs
#[derive(Clone)]
pub struct PipelineDeps {
    pub extractor: Arc<dyn CommandExtractor>,
    /// Absent when no embedding backend is configured; resolution then
    /// falls back to exact name lookup
    pub resolver: Option<ItemResolver>,
    pub items: ItemRepo,
    pub actions: ActionLogRepo,
}

/// Handle to a running session pipeline
#[derive(Clone)]
pub struct SessionHandle {
    pub input: mpsc::Sender<SessionInput>,
}

/// Spawn a pipeline task for one session
///
/// The task runs until the returned handle's input channel closes. Dropping
/// the handle discards any partial command and pending confirmation and
/// stops every timer.
pub fn spawn(
    session_id: String,
    deps: PipelineDeps,
    events: mpsc::Sender<SessionEvent>,
) -> SessionHandle {
    let (input_tx, input_rx) = mpsc::channel(32);
    tokio::spawn(run(session_id, deps, events, input_rx));
    SessionHandle { input: input_tx }
}

/// Pipeline task body: inputs and timers, strictly sequential
async fn run(
    session_id: String,
    deps: PipelineDeps,
    events: mpsc::Sender<SessionEvent>,
    mut inputs: mpsc::Receiver<SessionInput>,
) {
    let mut pipeline = SessionPipeline::new(session_id.clone(), deps, events);

    loop {
        let idle_deadline = pipeline.aggregator.idle_deadline();
        let confirm_deadline = pipeline.ctx.pending_deadline();

        tokio::select! {
            input = inputs.recv() => {
                match input {
                    Some(input) => pipeline.handle_input(input).await,
                    None => break,
                }
            }
            () = sleep_until(idle_deadline), if idle_deadline.is_some() => {
                pipeline.handle_idle_flush().await;
            }
            () = sleep_until(confirm_deadline), if confirm_deadline.is_some() => {
                pipeline.handle_visual_timeout().await;
            }
        }
    }

    tracing::debug!(session_id = %session_id, "session pipeline stopped");
}

/// Sleep to an optional instant; pending forever when `None` (the guard on
/// the select arm keeps the `None` case from being polled)
async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline.into()).await,
        None => std::future::pending().await,
    }
}

/// All state for one session's pipeline
pub(crate) struct SessionPipeline {
    session_id: String,
    deps: PipelineDeps,
    aggregator: TranscriptAggregator,
    accumulator: CommandAccumulator,
    ctx: SessionContext,
    events: mpsc::Sender<SessionEvent>,
}

impl SessionPipeline {
    pub(crate) fn new(
        session_id: String,
        deps: PipelineDeps,
        events: mpsc::Sender<SessionEvent>,
    ) -> Self {
        Self {
            session_id,
            deps,
            aggregator: TranscriptAggregator::new(),
            accumulator: CommandAccumulator::new(),
            ctx: SessionContext::new(),
            events,
        }
    }

    pub(crate) async fn handle_input(&mut self, input: SessionInput) {
        let result = match input {
            SessionInput::Transcript {
                text,
                is_final,
                confidence,
            } => {
                self.handle_transcript(&text, is_final, confidence).await;
                Ok(())
            }
            SessionInput::Confirm => self.handle_confirm().await,
            SessionInput::Reject => self.handle_reject().await,
            SessionInput::Correct {
                original,
                corrected,
                mistake_type,
            } => self.handle_correct(original, corrected, mistake_type).await,
            SessionInput::Undo => self.perform_undo().await,
        };

        if let Err(e) = result {
            self.report(e).await;
        }
    }

    async fn handle_transcript(&mut self, text: &str, is_final: bool, confidence: f32) {
        self.emit(SessionEvent::Transcription {
            text: text.to_string(),
            is_final,
        })
        .await;

        if !is_final {
            return;
        }

        tracing::trace!(
            session_id = %self.session_id,
            text,
            confidence,
            "final transcript fragment"
        );

        if let Some(utterance) = self.aggregator.push(text) {
            self.process_utterance(utterance).await;
        }
    }

    pub(crate) async fn handle_idle_flush(&mut self) {
        if let Some(utterance) = self.aggregator.flush_idle(Instant::now()) {
            tracing::debug!(session_id = %self.session_id, "idle flush");
            self.process_utterance(utterance).await;
        }
    }

    /// Run an utterance through extraction, draining any flush queued while
    /// processing. The queue is bounded to one; a newer flush replaces an
    /// older queued-but-not-started one.
    async fn process_utterance(&mut self, utterance: String) {
        if self.ctx.is_processing {
            self.ctx.queued_flush = Some(utterance);
            return;
        }

        let mut next = Some(utterance);
        while let Some(utterance) = next {
            self.ctx.is_processing = true;
            let result = self.run_utterance(&utterance).await;
            self.ctx.is_processing = false;

            if let Err(e) = result {
                self.report(e).await;
            }

            next = self.ctx.queued_flush.take();
        }
    }

    /// One utterance through the whole pipeline
    async fn run_utterance(&mut self, utterance: &str) -> Result<()> {
        let history = self.ctx.conversation();
        let recent = self.ctx.recent_commands();

        let candidates = self
            .deps
            .extractor
            .extract(utterance, &history, &recent)
            .await;

        self.ctx.push_turn(utterance);

        for mut candidate in candidates {
            if !candidate.is_complete {
                context::enhance(&mut candidate, &recent, &history);
            }

            if let Some(complete) = self.accumulator.merge(&candidate) {
                if let Err(e) = self.handle_complete(complete).await {
                    self.report(e).await;
                }
            }
        }

        // Surface the in-progress state so the client can show "still
        // listening" without waiting for the window to close
        if let Some(snapshot) = self.accumulator.snapshot() {
            self.emit(SessionEvent::NlpResponse(NlpResponse::listening(&snapshot)))
                .await;
        }

        Ok(())
    }

    /// Route a completed command: undo immediately, everything else through
    /// resolution and the confirmation policy
    async fn handle_complete(&mut self, command: CandidateCommand) -> Result<()> {
        if command.action == CommandAction::Undo {
            return self.perform_undo().await;
        }

        let spoken = command
            .item
            .clone()
            .ok_or_else(|| Error::Validation("command has no item".to_string()))?;
        let item = self.resolve_item(&spoken).await?;

        self.pend_or_apply(command, item).await
    }

    /// Decide confirmation and either apply now, park as pending, or queue
    /// behind an existing pending confirmation
    async fn pend_or_apply(&mut self, command: CandidateCommand, item: Item) -> Result<()> {
        let decision = policy::decide(
            &command,
            command.confidence,
            &self.ctx.stats,
            self.ctx.corrections(),
        );

        self.emit(SessionEvent::NlpResponse(NlpResponse::decided(
            &command, &decision,
        )))
        .await;

        if decision.is_implicit() {
            let record = self.apply(&command, &item)?;
            let message = applied_feedback(&record);
            self.ctx.push_command(command);
            self.emit(SessionEvent::CommandProcessed { record }).await;
            self.emit(SessionEvent::Feedback { message }).await;
            return Ok(());
        }

        if self.ctx.pending.is_some() {
            // One confirmation at a time; the new command waits its turn
            self.ctx.enqueue_command(QueuedCommand {
                command,
                item,
            });
            self.emit(SessionEvent::Feedback {
                message: "One at a time — confirm the previous command first.".to_string(),
            })
            .await;
            return Ok(());
        }

        let message = prompt_feedback(&command, &item, decision.confirmation_type);
        let deadline = decision
            .timeout_seconds
            .map(|secs| Instant::now() + Duration::from_secs(secs));

        self.ctx.set_pending(PendingConfirmation {
            command,
            item,
            decision,
            deadline,
        });
        self.emit(SessionEvent::Feedback { message }).await;

        Ok(())
    }

    async fn handle_confirm(&mut self) -> Result<()> {
        let Some(pending) = self.ctx.take_pending() else {
            self.emit(SessionEvent::Feedback {
                message: "Nothing to confirm.".to_string(),
            })
            .await;
            return Ok(());
        };

        self.ctx.stats.record_correct();

        let record = self.apply(&pending.command, &pending.item)?;
        let message = applied_feedback(&record);
        self.ctx.push_command(pending.command);
        self.emit(SessionEvent::CommandProcessed { record }).await;
        self.emit(SessionEvent::Feedback { message }).await;

        self.promote_queued().await
    }

    async fn handle_reject(&mut self) -> Result<()> {
        if self.ctx.take_pending().is_none() {
            self.emit(SessionEvent::Feedback {
                message: "Nothing to reject.".to_string(),
            })
            .await;
            return Ok(());
        }

        self.ctx.stats.record_incorrect();
        self.emit(SessionEvent::Feedback {
            message: "Okay, cancelled.".to_string(),
        })
        .await;

        self.promote_queued().await
    }

    async fn handle_correct(
        &mut self,
        original: String,
        corrected: String,
        mistake_type: Option<String>,
    ) -> Result<()> {
        self.ctx.stats.record_incorrect();
        self.ctx.push_correction(CorrectionRecord {
            original,
            corrected: corrected.clone(),
            mistake_type,
        });

        let Some(pending) = self.ctx.take_pending() else {
            self.emit(SessionEvent::Feedback {
                message: "Nothing pending to correct.".to_string(),
            })
            .await;
            return Ok(());
        };

        let mut command = pending.command;
        command.item = Some(corrected.clone());

        let item = self.resolve_item(&corrected).await?;
        let record = self.apply(&command, &item)?;
        let message = applied_feedback(&record);
        self.ctx.push_command(command);
        self.emit(SessionEvent::CommandProcessed { record }).await;
        self.emit(SessionEvent::Feedback { message }).await;

        self.promote_queued().await
    }

    /// Visual confirmations auto-accept at their deadline
    pub(crate) async fn handle_visual_timeout(&mut self) {
        let due = self
            .ctx
            .pending_deadline()
            .is_some_and(|deadline| Instant::now() >= deadline);
        if !due {
            return;
        }

        let Some(pending) = self.ctx.take_pending() else {
            return;
        };

        tracing::debug!(session_id = %self.session_id, "visual confirmation timed out, accepting");
        self.ctx.stats.record_correct();

        match self.apply(&pending.command, &pending.item) {
            Ok(record) => {
                let message = applied_feedback(&record);
                self.ctx.push_command(pending.command);
                self.emit(SessionEvent::CommandProcessed { record }).await;
                self.emit(SessionEvent::Feedback { message }).await;
            }
            Err(e) => self.report(e).await,
        }

        if let Err(e) = self.promote_queued().await {
            self.report(e).await;
        }
    }

    /// Move queued commands into the confirmation flow until one of them
    /// pends (or the queue drains)
    async fn promote_queued(&mut self) -> Result<()> {
        while self.ctx.pending.is_none() {
            let Some(queued) = self.ctx.queued_commands.pop_front() else {
                break;
            };
            Box::pin(self.pend_or_apply(queued.command, queued.item)).await?;
        }
        Ok(())
    }

    /// Resolve a spoken item, via embeddings when available
    async fn resolve_item(&self, spoken: &str) -> Result<Item> {
        if let Some(resolver) = &self.deps.resolver {
            return resolver.resolve(spoken).await;
        }

        let name = spoken.trim().to_lowercase();
        self.deps
            .items
            .get_by_name(&name)?
            .ok_or_else(|| Error::NotFound(format!("no catalog item named \"{spoken}\"")))
    }

    /// Apply a mutation and log it
    ///
    /// Quantities convert from the spoken unit to the item's storage unit; a
    /// missing unit on add/remove means the storage unit. Removal past zero
    /// clamps rather than rejecting.
    fn apply(&self, command: &CandidateCommand, item: &Item) -> Result<ActionRecord> {
        let quantity = command
            .quantity
            .ok_or_else(|| Error::Validation("command has no quantity".to_string()))?;

        let delta = match command.unit.as_deref() {
            Some(spoken) => units::convert(quantity, spoken, &item.unit)?,
            None => quantity,
        };

        // Re-read: the resolved snapshot may be stale behind queued commands
        let current = self
            .deps
            .items
            .get(&item.id)?
            .ok_or_else(|| Error::NotFound(format!("item {}", item.id)))?;

        let new_quantity = match command.action {
            CommandAction::Add => current.quantity + delta,
            CommandAction::Remove => (current.quantity - delta).max(0.0),
            CommandAction::Set => delta,
            CommandAction::Undo | CommandAction::Unknown => {
                return Err(Error::Validation(format!(
                    "{} command cannot be applied directly",
                    command.action.as_str()
                )));
            }
        };

        self.deps.items.set_quantity(&item.id, new_quantity)?;

        self.deps.actions.append(&NewAction {
            session_id: &self.session_id,
            action: command.action.as_str(),
            item_id: &item.id,
            item_name: &item.name,
            previous_quantity: current.quantity,
            new_quantity,
            unit: &item.unit,
        })
    }

    /// Reverse the newest applied action, if any
    ///
    /// No-op against an empty log. Add/remove reverse their applied delta;
    /// set restores the previous quantity.
    async fn perform_undo(&mut self) -> Result<()> {
        let Some(last) = self.deps.actions.last_undoable(&self.session_id)? else {
            self.emit(SessionEvent::Feedback {
                message: "Nothing to undo.".to_string(),
            })
            .await;
            return Ok(());
        };

        let current = self
            .deps
            .items
            .get(&last.item_id)?
            .ok_or_else(|| Error::NotFound(format!("item {}", last.item_id)))?;

        let restored = if last.action == "set" {
            last.previous_quantity
        } else {
            (current.quantity - last.quantity_delta).max(0.0)
        };

        self.deps.items.set_quantity(&last.item_id, restored)?;
        self.deps.actions.mark_undone(&last.id)?;

        let record = self.deps.actions.append(&NewAction {
            session_id: &self.session_id,
            action: "undo",
            item_id: &last.item_id,
            item_name: &last.item_name,
            previous_quantity: current.quantity,
            new_quantity: restored,
            unit: &last.unit,
        })?;

        let message = format!(
            "Undid {} — {} back to {} {}.",
            last.action, last.item_name, restored, last.unit
        );
        self.emit(SessionEvent::CommandProcessed { record }).await;
        self.emit(SessionEvent::Feedback { message }).await;

        Ok(())
    }

    /// Convert an error into the right session event
    async fn report(&mut self, error: Error) {
        match error {
            Error::AmbiguousMatch { ref suggestions, .. } => {
                let suggestions = suggestions.clone();
                self.emit(SessionEvent::ClarificationNeeded {
                    message: error.to_string(),
                    suggestions,
                })
                .await;
            }
            other => {
                tracing::warn!(
                    session_id = %self.session_id,
                    error = %other,
                    "session error"
                );
                self.emit(SessionEvent::Error {
                    code: other.code().to_string(),
                    message: other.to_string(),
                })
                .await;
            }
        }
    }

    async fn emit(&self, event: SessionEvent) {
        // A closed channel means the client is gone; the task will stop as
        // soon as the input side closes too
        let _ = self.events.send(event).await;
    }

    #[cfg(test)]
    pub(crate) const fn context(&self) -> &SessionContext {
        &self.ctx
    }

    #[cfg(test)]
    pub(crate) const fn context_mut(&mut self) -> &mut SessionContext {
        &mut self.ctx
    }
}

/// "Added 5 lb of coffee beans (now 17 lb)"
fn applied_feedback(record: &ActionRecord) -> String {
    let verb = match record.action.as_str() {
        "add" => "Added",
        "remove" => "Removed",
        "set" => "Set",
        other => other,
    };

    if record.action == "set" {
        format!(
            "{verb} {} to {} {}.",
            record.item_name, record.new_quantity, record.unit
        )
    } else {
        format!(
            "{verb} {} {} of {} (now {} {}).",
            record.quantity_delta.abs(),
            record.unit,
            record.item_name,
            record.new_quantity,
            record.unit
        )
    }
}

/// Confirmation prompt wording per confirmation type
fn prompt_feedback(
    command: &CandidateCommand,
    item: &Item,
    confirmation_type: ConfirmationType,
) -> String {
    let description = format!(
        "{} {} {} of {}",
        command.action.as_str(),
        command.quantity.unwrap_or_default(),
        command.unit.as_deref().unwrap_or(item.unit.as_str()),
        item.name
    );

    match confirmation_type {
        ConfirmationType::Voice => format!("Did you mean: {description}? Say yes or no."),
        ConfirmationType::Visual => format!("{description} — dismiss to cancel."),
        _ => format!("Please confirm: {description}."),
    }
}
