//! The engine: owns slot types, intents, questions and per-user dialog state.
//!
//! Registration happens once at startup through `&mut self`; message handling
//! goes through `&self` and may run concurrently.

use std::collections::HashMap;

use banter_logging::{DialogEvent, DialogEventLogger};
use tracing::info;

use crate::dialog::{DialogOptions, PendingBook, Question, RegisteredQuestion, ANSWER_SLOT};
use crate::dispatch::UserTurns;
use crate::error::{NlcError, Result};
use crate::intents::{Intent, IntentRegistry};
use crate::slots::{SlotType, SlotTypeRegistry, SlotValue};
use crate::standard::standard_slot_types;
use crate::text::clean_text;
use crate::utterance::UtteranceCache;

/// Context handed back to handlers, e.g. a reply channel. Use `()` when the
/// host has nothing to pass along.
pub trait MessageContext: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> MessageContext for T {}

// ---------------------------------------------------------------------------
// Turn
// ---------------------------------------------------------------------------

/// What a handler sees of the message being processed.
pub struct Turn<'a, C: MessageContext> {
    engine: &'a Engine<C>,
    user_id: &'a str,
    context: &'a C,
}

impl<'a, C: MessageContext> Turn<'a, C> {
    pub(crate) fn new(engine: &'a Engine<C>, user_id: &'a str, context: &'a C) -> Self {
        Self { engine, user_id, context }
    }

    pub fn user_id(&self) -> &str {
        self.user_id
    }

    pub fn context(&self) -> &C {
        self.context
    }

    pub fn engine(&self) -> &Engine<C> {
        self.engine
    }

    /// Ask this user `question`, carrying the current context along.
    pub async fn ask(&self, question: &str) -> Result<()> {
        self.engine.ask(self.user_id, self.context.clone(), question).await
    }
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// The named intent matched and its handler ran.
    Matched { intent: String },
    NoMatch,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct Engine<C: MessageContext> {
    pub(crate) slot_types: SlotTypeRegistry,
    pub(crate) intents: IntentRegistry<C>,
    pub(crate) questions: HashMap<String, RegisteredQuestion<C>>,
    pub(crate) pending: PendingBook<C>,
    pub(crate) turns: UserTurns,
    pub(crate) options: DialogOptions,
    utterances: UtteranceCache,
}

impl<C: MessageContext> Default for Engine<C> {
    fn default() -> Self {
        Self::new(DialogOptions::default())
    }
}

impl<C: MessageContext> Engine<C> {
    /// An empty engine with no slot types registered.
    pub fn new(options: DialogOptions) -> Self {
        Self {
            slot_types: SlotTypeRegistry::new(),
            intents: IntentRegistry::new(),
            questions: HashMap::new(),
            pending: PendingBook::new(),
            turns: UserTurns::new(),
            options,
            utterances: UtteranceCache::new(),
        }
    }

    /// An engine with the standard slot types pre-registered.
    pub fn with_standard_slots(options: DialogOptions) -> Self {
        let mut engine = Self::new(options);
        for slot_type in standard_slot_types() {
            engine.add_slot_type(slot_type);
        }
        engine
    }

    pub fn options(&self) -> &DialogOptions {
        &self.options
    }

    // -- registration -------------------------------------------------------

    /// Register a slot type; returns the definition it replaced, if any.
    pub fn add_slot_type(&mut self, slot_type: SlotType) -> Option<SlotType> {
        self.slot_types.register(slot_type)
    }

    pub fn register_intent(&mut self, intent: Intent<C>) -> Result<()> {
        let name = intent.name.clone();
        self.intents.register(intent, &mut self.utterances)?;
        info!("[Nlc] Registered intent {}", name);
        Ok(())
    }

    pub fn register_question(&mut self, question: Question<C>) -> Result<()> {
        if self.questions.contains_key(&question.name) {
            return Err(NlcError::DuplicateQuestion(question.name));
        }
        let templates: Vec<String> = if question.utterances.is_empty() {
            vec![format!("{{{ANSWER_SLOT}}}")]
        } else {
            question.utterances.clone()
        };
        let compiled = templates
            .iter()
            .map(|t| self.utterances.compile(t, &[ANSWER_SLOT]))
            .collect::<Result<Vec<_>>>()?;

        info!("[Dialog] Registered question {}", question.name);
        self.questions.insert(
            question.name.clone(),
            RegisteredQuestion { question, utterances: compiled },
        );
        Ok(())
    }

    /// Check that every slot type referenced by an intent or question is
    /// registered. Call once after wiring to fail fast on typos.
    pub fn check_slot_types(&self) -> Result<()> {
        let intent_types = self
            .intents
            .all()
            .iter()
            .flat_map(|i| i.slots.iter().map(|s| s.slot_type.as_str()));
        let question_types = self.questions.values().map(|q| q.question.slot_type.as_str());

        for name in intent_types.chain(question_types) {
            if !self.slot_types.contains(name) {
                return Err(NlcError::UnknownSlotType(name.to_string()));
            }
        }
        Ok(())
    }

    // -- lookups ------------------------------------------------------------

    pub fn slot_types(&self) -> &SlotTypeRegistry {
        &self.slot_types
    }

    pub fn intents(&self) -> &IntentRegistry<C> {
        &self.intents
    }

    pub fn question_names(&self) -> impl Iterator<Item = &str> {
        self.questions.keys().map(String::as_str)
    }

    pub fn resolve_slot(&self, slot_type: &str, text: &str) -> Result<Option<SlotValue>> {
        self.slot_types.resolve(slot_type, text)
    }

    // -- matching -----------------------------------------------------------

    /// Match `text` against the registered intents and run the winner's
    /// handler. No match is a normal outcome, not an error.
    pub async fn handle_command(&self, user_id: &str, text: &str, context: &C) -> Result<CommandOutcome> {
        let text = clean_text(text);
        let Some(found) = self.intents.find_match(&self.slot_types, &text)? else {
            DialogEventLogger::log_event(user_id, DialogEvent::NoMatch { text: text.clone() });
            return Ok(CommandOutcome::NoMatch);
        };

        let intent = found.intent;
        info!("[Nlc] {:?} -> intent {} via {:?}", text, intent.name, found.template);
        DialogEventLogger::log_event(
            user_id,
            DialogEvent::IntentMatched { intent: intent.name.clone(), text: text.clone() },
        );

        let turn = Turn::new(self, user_id, context);
        intent
            .handler
            .handle(&turn, &found.slots)
            .await
            .map_err(|e| NlcError::handler(&intent.name, e))?;

        Ok(CommandOutcome::Matched { intent: intent.name.clone() })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use super::*;
    use crate::intents::{FromSlots, IntentHandler, SlotValues, Typed, TypedIntentHandler};

    type Calls = Arc<Mutex<Vec<Vec<Option<SlotValue>>>>>;

    struct Record(Calls);

    #[async_trait]
    impl IntentHandler<()> for Record {
        async fn handle(&self, _turn: &Turn<'_, ()>, slots: &SlotValues) -> anyhow::Result<()> {
            self.0.lock().await.push(slots.values().map(|v| v.cloned()).collect());
            Ok(())
        }
    }

    struct Fails;

    #[async_trait]
    impl IntentHandler<()> for Fails {
        async fn handle(&self, _turn: &Turn<'_, ()>, _slots: &SlotValues) -> anyhow::Result<()> {
            anyhow::bail!("reply channel closed")
        }
    }

    fn engine() -> Engine<()> {
        Engine::with_standard_slots(DialogOptions::default())
    }

    #[tokio::test]
    async fn greet_scenario() {
        let calls = Calls::default();
        let mut engine = engine();
        engine
            .register_intent(
                Intent::new("GREET", Record(calls.clone()))
                    .slot("Name", "WORD")
                    .utterance("hello {Name}"),
            )
            .unwrap();

        let outcome = engine.handle_command("u1", "Hello Sam", &()).await.unwrap();
        assert_eq!(outcome, CommandOutcome::Matched { intent: "GREET".into() });
        assert_eq!(*calls.lock().await, vec![vec![Some(SlotValue::text("Sam"))]]);

        let outcome = engine.handle_command("u1", "Hello", &()).await.unwrap();
        assert_eq!(outcome, CommandOutcome::NoMatch);
        assert_eq!(calls.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn generated_text_round_trips_through_every_utterance() {
        let calls = Calls::default();
        let mut engine = engine();
        let utterances = ["say {Message} to {Room}", "tell {Room} that {Message}", "{Room}: {Message}"];
        engine
            .register_intent(
                Intent::new("SAY_TO", Record(calls.clone()))
                    .slot("Message", "STRING")
                    .slot("Room", "SLACK_ROOM")
                    .utterances(utterances),
            )
            .unwrap();

        for template in utterances {
            let text = template.replace("{Message}", "lunch is here").replace("{Room}", "#general");
            let outcome = engine.handle_command("u1", &text, &()).await.unwrap();
            assert_eq!(outcome, CommandOutcome::Matched { intent: "SAY_TO".into() }, "{text}");
        }
        let expected = vec![Some(SlotValue::text("lunch is here")), Some(SlotValue::text("#general"))];
        assert!(calls.lock().await.iter().all(|c| *c == expected));
        assert_eq!(calls.lock().await.len(), 3);
    }

    #[tokio::test]
    async fn irregular_spacing_and_smart_quotes() {
        let calls = Calls::default();
        let mut engine = engine();
        engine
            .register_intent(
                Intent::new("SAY_TO", Record(calls.clone()))
                    .slot("A", "WORD")
                    .slot("B", "WORD")
                    .utterances(["say {A} to {B}", "say \"{A}\" to {B}"]),
            )
            .unwrap();
        engine
            .register_intent(Intent::new("SLOGAN", Record(calls.clone())).utterance("what's our slogan"))
            .unwrap();

        let outcome = engine.handle_command("u1", "say   hi   to   bob", &()).await.unwrap();
        assert_eq!(outcome, CommandOutcome::Matched { intent: "SAY_TO".into() });
        assert_eq!(
            calls.lock().await.last().unwrap(),
            &vec![Some(SlotValue::text("hi")), Some(SlotValue::text("bob"))]
        );

        let outcome = engine.handle_command("u1", "what\u{2019}s our slogan", &()).await.unwrap();
        assert_eq!(outcome, CommandOutcome::Matched { intent: "SLOGAN".into() });

        let outcome = engine.handle_command("u1", "say \u{201C}yo\u{201D} to bob", &()).await.unwrap();
        assert_eq!(outcome, CommandOutcome::Matched { intent: "SAY_TO".into() });
        assert_eq!(calls.lock().await.last().unwrap()[0], Some(SlotValue::text("yo")));
    }

    #[tokio::test]
    async fn unmatched_text_is_not_an_error() {
        let mut engine = engine();
        engine
            .register_intent(Intent::new("PING", Record(Calls::default())).utterance("ping"))
            .unwrap();
        for text in ["", "pong", "ping ping", "please ping"] {
            assert_eq!(engine.handle_command("u1", text, &()).await.unwrap(), CommandOutcome::NoMatch);
        }
    }

    #[tokio::test]
    async fn zero_is_a_valid_number() {
        let calls = Calls::default();
        let mut engine = engine();
        engine
            .register_intent(
                Intent::new("SET", Record(calls.clone()))
                    .slot("Amount", "NUMBER")
                    .utterance("set it to {Amount}"),
            )
            .unwrap();
        let outcome = engine.handle_command("u1", "set it to 0", &()).await.unwrap();
        assert_eq!(outcome, CommandOutcome::Matched { intent: "SET".into() });
        assert_eq!(calls.lock().await[0], vec![Some(SlotValue::Number(0.0))]);
    }

    #[tokio::test]
    async fn handler_errors_are_wrapped() {
        let mut engine = engine();
        engine.register_intent(Intent::new("BOOM", Fails).utterance("boom")).unwrap();
        let err = engine.handle_command("u1", "boom", &()).await.unwrap_err();
        assert!(matches!(err, NlcError::Handler { ref name, .. } if name == "BOOM"));
        assert!(err.to_string().contains("reply channel closed"));
    }

    #[test]
    fn check_slot_types_finds_typos() {
        let mut engine = engine();
        engine
            .register_intent(
                Intent::new("ORDER", Record(Calls::default()))
                    .slot("Size", "PIZZA_SIZE")
                    .utterance("order a {Size} pizza"),
            )
            .unwrap();
        assert!(matches!(engine.check_slot_types(), Err(NlcError::UnknownSlotType(t)) if t == "PIZZA_SIZE"));

        engine.add_slot_type(SlotType::literal("PIZZA_SIZE", &["small", "large"]));
        assert!(engine.check_slot_types().is_ok());
    }

    #[test]
    fn slot_type_overwrite_is_last_write_wins() {
        let mut engine = engine();
        let replaced = engine.add_slot_type(SlotType::literal("WORD", &["only"]));
        assert!(replaced.is_some());
        assert_eq!(engine.resolve_slot("WORD", "other").unwrap(), None);
        assert_eq!(engine.resolve_slot("WORD", "only").unwrap(), Some(SlotValue::text("only")));
    }

    // -- typed handlers ----------------------------------------------------

    #[derive(Debug, PartialEq)]
    struct TodoArgs {
        user: Option<String>,
        item: String,
    }

    impl FromSlots for TodoArgs {
        fn from_slots(slots: &SlotValues) -> Result<Self> {
            Ok(Self { user: slots.get_as("User"), item: slots.require("Item")? })
        }
    }

    struct TodoHandler(Arc<Mutex<Vec<TodoArgs>>>);

    #[async_trait]
    impl TypedIntentHandler<(), TodoArgs> for TodoHandler {
        async fn handle(&self, _turn: &Turn<'_, ()>, args: TodoArgs) -> anyhow::Result<()> {
            self.0.lock().await.push(args);
            Ok(())
        }
    }

    #[tokio::test]
    async fn typed_handler_receives_struct() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut engine = engine();
        engine
            .register_intent(
                Intent::new("TODO_TELL", Typed::new(TodoHandler(seen.clone())))
                    .slot("User", "SLACK_NAME")
                    .slot("Item", "STRING")
                    .utterances(["tell {User} to {Item}", "remind me to {Item}"]),
            )
            .unwrap();

        engine.handle_command("u1", "tell @sam to buy milk", &()).await.unwrap();
        engine.handle_command("u1", "remind me to stretch", &()).await.unwrap();

        assert_eq!(
            *seen.lock().await,
            vec![
                TodoArgs { user: Some("@sam".into()), item: "buy milk".into() },
                TodoArgs { user: None, item: "stretch".into() },
            ]
        );
    }
}
