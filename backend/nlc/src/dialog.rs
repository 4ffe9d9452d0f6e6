//! Question dialogs: one outstanding question per user.
//!
//! `ask` records a pending question and emits the prompt. The user's next
//! message is then consumed by `answer` instead of intent matching: a cancel
//! keyword cancels, a resolvable answer succeeds, anything else is rejected
//! and either re-prompts or aborts depending on `InvalidAnswerPolicy`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use banter_config::NlcConfig;
use banter_logging::{DialogEvent, DialogEventLogger};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub use banter_config::InvalidAnswerPolicy;

use crate::engine::{Engine, MessageContext, Turn};
use crate::error::{NlcError, Result};
use crate::slots::SlotValue;
use crate::utterance::CompiledUtterance;

/// Placeholder name used by question utterances, e.g. `It's a {Slot}`.
pub const ANSWER_SLOT: &str = "Slot";

/// Cancel keyword used when none is configured.
pub const DEFAULT_CANCEL_KEYWORD: &str = "cancel";

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct DialogOptions {
    /// Replies (compared case-insensitively) that cancel a pending question.
    pub cancel_keywords: Vec<String>,
    pub on_invalid_answer: InvalidAnswerPolicy,
    /// Pending questions older than this are dropped. `None` never expires.
    pub question_ttl: Option<Duration>,
}

impl Default for DialogOptions {
    fn default() -> Self {
        Self {
            cancel_keywords: vec![DEFAULT_CANCEL_KEYWORD.to_string()],
            on_invalid_answer: InvalidAnswerPolicy::Reprompt,
            question_ttl: None,
        }
    }
}

impl From<&NlcConfig> for DialogOptions {
    fn from(config: &NlcConfig) -> Self {
        let defaults = Self::default();
        Self {
            cancel_keywords: config
                .cancel_keywords
                .clone()
                .filter(|k| !k.is_empty())
                .unwrap_or(defaults.cancel_keywords),
            on_invalid_answer: config.on_invalid_answer.unwrap_or(defaults.on_invalid_answer),
            question_ttl: config.question_ttl_secs.map(Duration::from_secs),
        }
    }
}

impl DialogOptions {
    pub fn is_cancel(&self, text: &str) -> bool {
        let text = text.trim().to_lowercase();
        self.cancel_keywords.iter().any(|k| k.trim().to_lowercase() == text)
    }
}

// ---------------------------------------------------------------------------
// Question definition
// ---------------------------------------------------------------------------

/// Callbacks for one question. `data` is the context captured at `ask` time
/// and is available as `turn.context()`.
#[async_trait]
pub trait QuestionHandler<C: MessageContext>: Send + Sync {
    /// Emit the prompt.
    async fn ask(&self, turn: &Turn<'_, C>) -> anyhow::Result<()>;

    async fn on_answer(&self, turn: &Turn<'_, C>, answer: SlotValue) -> anyhow::Result<()>;

    async fn on_cancel(&self, _turn: &Turn<'_, C>) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_invalid(&self, _turn: &Turn<'_, C>) -> anyhow::Result<()> {
        Ok(())
    }
}

pub struct Question<C: MessageContext> {
    pub name: String,
    pub slot_type: String,
    /// Templates using the `{Slot}` placeholder; empty means the whole
    /// message is the answer.
    pub utterances: Vec<String>,
    pub handler: Arc<dyn QuestionHandler<C>>,
}

impl<C: MessageContext> Question<C> {
    pub fn new(
        name: impl Into<String>,
        slot_type: impl Into<String>,
        handler: impl QuestionHandler<C> + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            slot_type: slot_type.into(),
            utterances: Vec::new(),
            handler: Arc::new(handler),
        }
    }

    pub fn utterance(mut self, template: impl Into<String>) -> Self {
        self.utterances.push(template.into());
        self
    }

    pub fn utterances<I, S>(mut self, templates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.utterances.extend(templates.into_iter().map(Into::into));
        self
    }
}

pub(crate) struct RegisteredQuestion<C: MessageContext> {
    pub(crate) question: Question<C>,
    pub(crate) utterances: Vec<Arc<CompiledUtterance>>,
}

// ---------------------------------------------------------------------------
// Pending state
// ---------------------------------------------------------------------------

pub(crate) struct PendingQuestion<C> {
    pub(crate) question: String,
    pub(crate) data: C,
    pub(crate) asked_at: Instant,
}

/// Per-user pending questions behind one lock. Taking a question removes it,
/// so a question is consumed by exactly one message.
pub(crate) struct PendingBook<C> {
    entries: Mutex<HashMap<String, PendingQuestion<C>>>,
}

impl<C> PendingBook<C> {
    pub(crate) fn new() -> Self {
        Self { entries: Mutex::new(HashMap::new()) }
    }

    /// Insert, replacing any earlier question for the user.
    pub(crate) async fn put(&self, user_id: &str, pending: PendingQuestion<C>) -> Option<String> {
        self.entries
            .lock()
            .await
            .insert(user_id.to_string(), pending)
            .map(|old| old.question)
    }

    /// Re-insert unless a newer question was asked in the meantime.
    pub(crate) async fn restore(&self, user_id: &str, pending: PendingQuestion<C>) -> bool {
        let mut entries = self.entries.lock().await;
        if entries.contains_key(user_id) {
            return false;
        }
        entries.insert(user_id.to_string(), pending);
        true
    }

    /// Remove the user's entry only if it is still the one asked at `asked_at`.
    pub(crate) async fn discard(&self, user_id: &str, question: &str, asked_at: Instant) -> bool {
        let mut entries = self.entries.lock().await;
        let current = entries.get(user_id).is_some_and(|p| p.question == question && p.asked_at == asked_at);
        if current {
            entries.remove(user_id);
        }
        current
    }

    pub(crate) async fn take(&self, user_id: &str) -> Option<PendingQuestion<C>> {
        self.entries.lock().await.remove(user_id)
    }

    pub(crate) async fn question_of(&self, user_id: &str) -> Option<String> {
        self.entries.lock().await.get(user_id).map(|p| p.question.clone())
    }
}

// ---------------------------------------------------------------------------
// Answer outcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnswerOutcome {
    Answered { question: String },
    Cancelled { question: String },
    /// The reply didn't resolve. `still_pending` tells whether the user can
    /// retry.
    Rejected { question: String, still_pending: bool },
}

// ---------------------------------------------------------------------------
// Engine: dialog operations
// ---------------------------------------------------------------------------

impl<C: MessageContext> Engine<C> {
    /// Ask `user_id` the named question. Replaces any question already
    /// pending for that user. If the prompt callback fails the question is
    /// not left pending.
    pub async fn ask(&self, user_id: &str, data: C, question: &str) -> Result<()> {
        let registered = self
            .questions
            .get(question)
            .ok_or_else(|| NlcError::UnknownQuestion(question.to_string()))?;

        let prompt_data = data.clone();
        let asked_at = Instant::now();
        let pending = PendingQuestion { question: question.to_string(), data, asked_at };
        if let Some(previous) = self.pending.put(user_id, pending).await {
            debug!("[Dialog] {} replaces pending question {} for {}", question, previous, user_id);
        }
        info!("[Dialog] Asking {} {}", user_id, question);
        DialogEventLogger::log_event(user_id, DialogEvent::QuestionAsked { question: question.to_string() });

        let turn = Turn::new(self, user_id, &prompt_data);
        if let Err(e) = registered.question.handler.ask(&turn).await {
            if self.pending.discard(user_id, question, asked_at).await {
                warn!("[Dialog] Prompt for {} failed, dropping it for {}", question, user_id);
            }
            return Err(NlcError::handler(question, e));
        }
        Ok(())
    }

    /// Name of the question pending for `user_id`, if any.
    pub async fn pending_question(&self, user_id: &str) -> Option<String> {
        self.pending.question_of(user_id).await
    }

    /// Drop the user's pending question without running any callback.
    pub async fn cancel_pending(&self, user_id: &str) -> bool {
        self.pending.take(user_id).await.is_some()
    }

    /// Take the user's pending question if it hasn't expired.
    pub(crate) async fn take_live_pending(&self, user_id: &str) -> Option<PendingQuestion<C>> {
        let pending = self.pending.take(user_id).await?;
        if let Some(ttl) = self.options.question_ttl {
            if pending.asked_at.elapsed() >= ttl {
                warn!("[Dialog] Question {} for {} expired", pending.question, user_id);
                DialogEventLogger::log_event(
                    user_id,
                    DialogEvent::DialogExpired { question: pending.question.clone() },
                );
                return None;
            }
        }
        Some(pending)
    }

    /// Consume `text` as the answer to `pending`.
    pub(crate) async fn answer(
        &self,
        user_id: &str,
        text: &str,
        mut pending: PendingQuestion<C>,
    ) -> Result<AnswerOutcome> {
        let name = pending.question.clone();
        let registered = self
            .questions
            .get(&name)
            .ok_or_else(|| NlcError::UnknownQuestion(name.clone()))?;
        let handler = &registered.question.handler;

        if self.options.is_cancel(text) {
            info!("[Dialog] {} cancelled {}", user_id, name);
            DialogEventLogger::log_event(user_id, DialogEvent::DialogCancelled { question: name.clone() });
            let turn = Turn::new(self, user_id, &pending.data);
            handler.on_cancel(&turn).await.map_err(|e| NlcError::handler(&name, e))?;
            return Ok(AnswerOutcome::Cancelled { question: name });
        }

        if let Some(value) = self.resolve_answer(registered, text)? {
            info!("[Dialog] {} answered {} with {}", user_id, name, value);
            DialogEventLogger::log_event(
                user_id,
                DialogEvent::AnswerAccepted { question: name.clone(), text: text.to_string() },
            );
            let turn = Turn::new(self, user_id, &pending.data);
            handler.on_answer(&turn, value).await.map_err(|e| NlcError::handler(&name, e))?;
            return Ok(AnswerOutcome::Answered { question: name });
        }

        debug!("[Dialog] {:?} is not a valid answer to {}", text, name);
        DialogEventLogger::log_event(
            user_id,
            DialogEvent::AnswerRejected { question: name.clone(), text: text.to_string() },
        );
        let result = {
            let turn = Turn::new(self, user_id, &pending.data);
            handler.on_invalid(&turn).await
        };

        let still_pending = match self.options.on_invalid_answer {
            InvalidAnswerPolicy::Reprompt => {
                pending.asked_at = Instant::now();
                self.pending.restore(user_id, pending).await
            }
            InvalidAnswerPolicy::Abort => false,
        };
        result.map_err(|e| NlcError::handler(&name, e))?;
        Ok(AnswerOutcome::Rejected { question: name, still_pending })
    }

    /// The first utterance that matches and resolves supplies the answer.
    fn resolve_answer(&self, registered: &RegisteredQuestion<C>, text: &str) -> Result<Option<SlotValue>> {
        for utterance in &registered.utterances {
            let Some(captures) = utterance.captures(text) else { continue };
            let Some((_, raw)) = captures.first() else { continue };
            if let Some(value) = self.slot_types.resolve(&registered.question.slot_type, raw)? {
                return Ok(Some(value));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slots::SlotType;

    /// Records every callback as a line of text.
    #[derive(Clone, Default)]
    struct Log(Arc<Mutex<Vec<String>>>);

    impl Log {
        async fn lines(&self) -> Vec<String> {
            self.0.lock().await.clone()
        }
    }

    struct Recorder {
        log: Log,
        next: Option<&'static str>,
    }

    #[async_trait]
    impl QuestionHandler<String> for Recorder {
        async fn ask(&self, turn: &Turn<'_, String>) -> anyhow::Result<()> {
            self.log.0.lock().await.push(format!("ask:{}", turn.context()));
            Ok(())
        }

        async fn on_answer(&self, turn: &Turn<'_, String>, answer: SlotValue) -> anyhow::Result<()> {
            self.log.0.lock().await.push(format!("answer:{}:{answer}", turn.context()));
            if let Some(next) = self.next {
                turn.ask(next).await?;
            }
            Ok(())
        }

        async fn on_cancel(&self, turn: &Turn<'_, String>) -> anyhow::Result<()> {
            self.log.0.lock().await.push(format!("cancel:{}", turn.context()));
            Ok(())
        }

        async fn on_invalid(&self, turn: &Turn<'_, String>) -> anyhow::Result<()> {
            self.log.0.lock().await.push(format!("invalid:{}", turn.context()));
            Ok(())
        }
    }

    fn build(options: DialogOptions, log: &Log) -> Engine<String> {
        let mut engine = Engine::with_standard_slots(options);
        engine.add_slot_type(SlotType::mapped(
            "YES_NO",
            &[("yes", SlotValue::Bool(true)), ("no", SlotValue::Bool(false))],
        ));
        engine
            .register_question(Question::new("Q1", "YES_NO", Recorder { log: log.clone(), next: Some("ZIP") }))
            .unwrap();
        engine
            .register_question(Question::new("ZIP", "WORD", Recorder { log: log.clone(), next: None }))
            .unwrap();
        engine
            .register_question(
                Question::new("PURPOSE", "WORD", Recorder { log: log.clone(), next: None })
                    .utterances(["{Slot}", "I'm {Slot}ing", "It's a {Slot}"]),
            )
            .unwrap();
        engine
    }

    #[tokio::test]
    async fn ask_emits_prompt_and_records_pending() {
        let log = Log::default();
        let engine = build(DialogOptions::default(), &log);
        engine.ask("u1", "room-1".into(), "Q1").await.unwrap();
        assert_eq!(log.lines().await, vec!["ask:room-1"]);
        assert_eq!(engine.pending_question("u1").await.as_deref(), Some("Q1"));
        assert_eq!(engine.pending_question("u2").await, None);
    }

    #[tokio::test]
    async fn unknown_question_is_an_error() {
        let log = Log::default();
        let engine = build(DialogOptions::default(), &log);
        let err = engine.ask("u1", String::new(), "NOPE").await.unwrap_err();
        assert!(matches!(err, NlcError::UnknownQuestion(q) if q == "NOPE"));
        assert_eq!(engine.pending_question("u1").await, None);
    }

    #[tokio::test]
    async fn new_ask_replaces_pending() {
        let log = Log::default();
        let engine = build(DialogOptions::default(), &log);
        engine.ask("u1", "a".into(), "Q1").await.unwrap();
        engine.ask("u1", "b".into(), "ZIP").await.unwrap();
        assert_eq!(engine.pending_question("u1").await.as_deref(), Some("ZIP"));
    }

    #[tokio::test]
    async fn reprompt_keeps_question_until_valid() {
        let log = Log::default();
        let engine = build(DialogOptions::default(), &log);
        engine.ask("u1", "r".into(), "Q1").await.unwrap();

        for _ in 0..3 {
            let pending = engine.take_live_pending("u1").await.unwrap();
            let outcome = engine.answer("u1", "Yeah", pending).await.unwrap();
            assert_eq!(outcome, AnswerOutcome::Rejected { question: "Q1".into(), still_pending: true });
            assert_eq!(engine.pending_question("u1").await.as_deref(), Some("Q1"));
        }

        let pending = engine.take_live_pending("u1").await.unwrap();
        let outcome = engine.answer("u1", "yes", pending).await.unwrap();
        assert_eq!(outcome, AnswerOutcome::Answered { question: "Q1".into() });
        assert_eq!(
            log.lines().await,
            vec!["ask:r", "invalid:r", "invalid:r", "invalid:r", "answer:r:true", "ask:r"]
        );
        // The success handler chained into the next question.
        assert_eq!(engine.pending_question("u1").await.as_deref(), Some("ZIP"));
    }

    #[tokio::test]
    async fn abort_clears_question() {
        let log = Log::default();
        let options = DialogOptions { on_invalid_answer: InvalidAnswerPolicy::Abort, ..Default::default() };
        let engine = build(options, &log);
        engine.ask("u1", "r".into(), "ZIP").await.unwrap();

        let pending = engine.take_live_pending("u1").await.unwrap();
        let outcome = engine.answer("u1", "not a zip", pending).await.unwrap();
        assert_eq!(outcome, AnswerOutcome::Rejected { question: "ZIP".into(), still_pending: false });
        assert_eq!(engine.pending_question("u1").await, None);
        assert_eq!(log.lines().await, vec!["ask:r", "invalid:r"]);
    }

    #[tokio::test]
    async fn cancel_keyword_skips_validation() {
        let log = Log::default();
        let options = DialogOptions {
            cancel_keywords: vec!["cancel".into(), "never mind".into()],
            ..Default::default()
        };
        let engine = build(options, &log);
        engine.ask("u1", "r".into(), "ZIP").await.unwrap();

        let pending = engine.take_live_pending("u1").await.unwrap();
        let outcome = engine.answer("u1", "Never Mind", pending).await.unwrap();
        assert_eq!(outcome, AnswerOutcome::Cancelled { question: "ZIP".into() });
        assert_eq!(engine.pending_question("u1").await, None);
        assert_eq!(log.lines().await, vec!["ask:r", "cancel:r"]);
    }

    #[tokio::test]
    async fn question_utterances_extract_the_answer() {
        let log = Log::default();
        let engine = build(DialogOptions::default(), &log);
        for (reply, expected) in [("refi", "refi"), ("I'm buying", "buy"), ("it's a purchase", "purchase")] {
            engine.ask("u1", "r".into(), "PURPOSE").await.unwrap();
            let pending = engine.take_live_pending("u1").await.unwrap();
            let outcome = engine.answer("u1", reply, pending).await.unwrap();
            assert_eq!(outcome, AnswerOutcome::Answered { question: "PURPOSE".into() });
            assert_eq!(log.lines().await.last().unwrap(), &format!("answer:r:{expected}"));
        }
    }

    #[tokio::test]
    async fn expired_questions_are_dropped() {
        let log = Log::default();
        let options = DialogOptions { question_ttl: Some(Duration::ZERO), ..Default::default() };
        let engine = build(options, &log);
        engine.ask("u1", "r".into(), "ZIP").await.unwrap();
        assert!(engine.take_live_pending("u1").await.is_none());
        assert_eq!(engine.pending_question("u1").await, None);

        let options = DialogOptions { question_ttl: Some(Duration::from_secs(3600)), ..Default::default() };
        let engine = build(options, &log);
        engine.ask("u1", "r".into(), "ZIP").await.unwrap();
        assert!(engine.take_live_pending("u1").await.is_some());
    }

    #[tokio::test]
    async fn cancel_pending_runs_no_callback() {
        let log = Log::default();
        let engine = build(DialogOptions::default(), &log);
        engine.ask("u1", "r".into(), "ZIP").await.unwrap();
        assert!(engine.cancel_pending("u1").await);
        assert!(!engine.cancel_pending("u1").await);
        assert_eq!(log.lines().await, vec!["ask:r"]);
    }

    #[test]
    fn options_from_config() {
        let config = NlcConfig {
            cancel_keywords: Some(vec!["stop".into()]),
            on_invalid_answer: Some(InvalidAnswerPolicy::Abort),
            question_ttl_secs: Some(60),
        };
        let options = DialogOptions::from(&config);
        assert!(options.is_cancel(" STOP "));
        assert!(!options.is_cancel("cancel"));
        assert_eq!(options.on_invalid_answer, InvalidAnswerPolicy::Abort);
        assert_eq!(options.question_ttl, Some(Duration::from_secs(60)));

        let options = DialogOptions::from(&NlcConfig::default());
        assert_eq!(options, DialogOptions::default());
    }

    struct BrokenPrompt;

    #[async_trait]
    impl QuestionHandler<String> for BrokenPrompt {
        async fn ask(&self, _turn: &Turn<'_, String>) -> anyhow::Result<()> {
            anyhow::bail!("reply channel closed")
        }

        async fn on_answer(&self, _turn: &Turn<'_, String>, _answer: SlotValue) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn failed_prompt_leaves_nothing_pending() {
        let log = Log::default();
        let mut engine = build(DialogOptions::default(), &log);
        engine.register_question(Question::new("BROKEN", "WORD", BrokenPrompt)).unwrap();

        let err = engine.ask("u1", "r".into(), "BROKEN").await.unwrap_err();
        assert!(matches!(err, NlcError::Handler { .. }));
        assert_eq!(engine.pending_question("u1").await, None);

        // A question pending from before is replaced, not resurrected.
        engine.ask("u1", "r".into(), "ZIP").await.unwrap();
        assert!(engine.ask("u1", "r".into(), "BROKEN").await.is_err());
        assert_eq!(engine.pending_question("u1").await, None);
    }

    #[test]
    fn duplicate_question_is_rejected() {
        let log = Log::default();
        let mut engine = build(DialogOptions::default(), &log);
        let err = engine
            .register_question(Question::new("Q1", "WORD", Recorder { log, next: None }))
            .unwrap_err();
        assert!(matches!(err, NlcError::DuplicateQuestion(_)));
    }
}
