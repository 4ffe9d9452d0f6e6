//! The chat bot served by `banter chat`: small talk, per-user todo lists and
//! the loan prequalification dialog.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::anyhow;
use async_trait::async_trait;
use banter_nlc::{
    DialogOptions, Engine, FromSlots, Intent, IntentHandler, Question, QuestionHandler, SlotType,
    SlotValue, SlotValues, Turn, Typed, TypedIntentHandler,
};
use tokio::sync::{Mutex, mpsc};
use tracing::debug;

pub const FALLBACK_REPLY: &str = "Sorry, I don't know how to do that.";

const SLOGANS: &[&str] = &["Sure, why not?", "Humans ruin everything", "It's pretty okay"];

const CANCEL_REPLY: &str = "Okay. Good luck!";
const INVALID_REPLY: &str = "Sorry, I didn't get that. Try again, or say \"cancel\" to stop.";

const LOAN_MIN: f64 = 75_000.0;
const LOAN_MAX: f64 = 2_000_000.0;

// ---------------------------------------------------------------------------
// Reply channel
// ---------------------------------------------------------------------------

/// Where handlers send their replies. One per chat session, since a question
/// replies on the channel it was asked from.
#[derive(Clone)]
pub struct Replies(mpsc::UnboundedSender<String>);

impl Replies {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self(tx), rx)
    }

    pub fn send(&self, text: impl Into<String>) -> anyhow::Result<()> {
        self.0.send(text.into()).map_err(|_| anyhow!("reply channel closed"))
    }
}

// ---------------------------------------------------------------------------
// Bot state
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Clone, PartialEq)]
pub struct LoanApplication {
    pub is_purchase: Option<bool>,
    pub postal_code: Option<String>,
    pub state: Option<String>,
    pub purchase_amount: Option<f64>,
    pub property_value: Option<f64>,
    pub loan_amount: Option<f64>,
}

#[derive(Default)]
pub struct BotState {
    todos: Mutex<HashMap<String, Vec<String>>>,
    loans: Mutex<HashMap<String, LoanApplication>>,
    slogan: AtomicUsize,
}

impl BotState {
    pub async fn todo_list(&self, user: &str) -> Vec<String> {
        self.todos.lock().await.get(user).cloned().unwrap_or_default()
    }

    pub async fn loan(&self, user: &str) -> Option<LoanApplication> {
        self.loans.lock().await.get(user).cloned()
    }
}

/// `@sam` and `sam` name the same list.
fn list_owner(name: &str) -> String {
    name.trim().trim_start_matches('@').to_lowercase()
}

// ---------------------------------------------------------------------------
// Misc intents
// ---------------------------------------------------------------------------

struct Greet;

#[async_trait]
impl IntentHandler<Replies> for Greet {
    async fn handle(&self, turn: &Turn<'_, Replies>, slots: &SlotValues) -> anyhow::Result<()> {
        let name = slots.get_as::<String>("Name").unwrap_or_else(|| turn.user_id().to_string());
        turn.context().send(format!("Hello, {name}!"))
    }
}

struct SayTo;

#[async_trait]
impl IntentHandler<Replies> for SayTo {
    async fn handle(&self, turn: &Turn<'_, Replies>, slots: &SlotValues) -> anyhow::Result<()> {
        let message: String = slots.require("Message")?;
        let room: String = slots.require("Room")?;
        turn.context().send(format!("[{room}] {message}"))?;
        turn.context().send("Done.")
    }
}

struct Slogan(Arc<BotState>);

#[async_trait]
impl IntentHandler<Replies> for Slogan {
    async fn handle(&self, turn: &Turn<'_, Replies>, _slots: &SlotValues) -> anyhow::Result<()> {
        let i = self.0.slogan.fetch_add(1, Ordering::Relaxed);
        turn.context().send(SLOGANS[i % SLOGANS.len()])
    }
}

// ---------------------------------------------------------------------------
// Todo intents
// ---------------------------------------------------------------------------

struct TodoArgs {
    user: Option<String>,
    item: String,
}

impl FromSlots for TodoArgs {
    fn from_slots(slots: &SlotValues) -> banter_nlc::Result<Self> {
        Ok(Self { user: slots.get_as("User"), item: slots.require("Item")? })
    }
}

struct TodoTell(Arc<BotState>);

#[async_trait]
impl TypedIntentHandler<Replies, TodoArgs> for TodoTell {
    async fn handle(&self, turn: &Turn<'_, Replies>, args: TodoArgs) -> anyhow::Result<()> {
        let owner = list_owner(args.user.as_deref().unwrap_or(turn.user_id()));
        let mut todos = self.0.todos.lock().await;
        let list = todos.entry(owner.clone()).or_default();
        if list.iter().any(|i| i.eq_ignore_ascii_case(&args.item)) {
            return turn.context().send("That's already on the list.");
        }
        list.push(args.item);
        let count = list.len();
        drop(todos);

        if args.user.is_some() {
            turn.context().send(format!("Okay, {owner} has {count} thing(s) to do."))
        } else {
            turn.context().send(format!("Okay, you have {count} thing(s) to do."))
        }
    }
}

struct TodoList(Arc<BotState>);

#[async_trait]
impl IntentHandler<Replies> for TodoList {
    async fn handle(&self, turn: &Turn<'_, Replies>, slots: &SlotValues) -> anyhow::Result<()> {
        let owner = list_owner(&slots.get_as::<String>("User").unwrap_or_else(|| turn.user_id().to_string()));
        let list = self.0.todo_list(&owner).await;
        if list.is_empty() {
            return turn.context().send("Nothing to do!");
        }
        let numbered: Vec<String> = list.iter().enumerate().map(|(i, item)| format!("{}: {item}", i + 1)).collect();
        turn.context().send(numbered.join("\n"))
    }
}

struct TodoDone(Arc<BotState>);

#[async_trait]
impl IntentHandler<Replies> for TodoDone {
    async fn handle(&self, turn: &Turn<'_, Replies>, slots: &SlotValues) -> anyhow::Result<()> {
        // Fractions and numbers beyond i64 come back as None.
        let index: Option<i64> = slots.get_as("Index");
        let owner = list_owner(turn.user_id());
        let mut todos = self.0.todos.lock().await;
        let list = todos.entry(owner).or_default();

        let position = index
            .and_then(|i| i.checked_sub(1))
            .and_then(|p| usize::try_from(p).ok())
            .filter(|p| *p < list.len());
        let reply = match (position, index) {
            (Some(p), _) => format!("Finished \"{}\". Nice!", list.remove(p)),
            (None, Some(i)) => format!("There's no #{i} on your list."),
            (None, None) => "That's not a number on your list.".to_string(),
        };
        drop(todos);
        turn.context().send(reply)
    }
}

// ---------------------------------------------------------------------------
// Loan prequalification
// ---------------------------------------------------------------------------

struct StartPrequal(Arc<BotState>);

#[async_trait]
impl IntentHandler<Replies> for StartPrequal {
    async fn handle(&self, turn: &Turn<'_, Replies>, _slots: &SlotValues) -> anyhow::Result<()> {
        self.0.loans.lock().await.insert(turn.user_id().to_string(), LoanApplication::default());
        turn.ask(LoanStep::IsResidential.name()).await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoanStep {
    IsResidential,
    LivesThere,
    Zip,
    State,
    Purpose,
    PurchasePrice,
    PropertyValue,
    LoanAmount,
}

impl LoanStep {
    const ALL: [LoanStep; 8] = [
        Self::IsResidential,
        Self::LivesThere,
        Self::Zip,
        Self::State,
        Self::Purpose,
        Self::PurchasePrice,
        Self::PropertyValue,
        Self::LoanAmount,
    ];

    fn name(self) -> &'static str {
        match self {
            Self::IsResidential => "PREQUAL_IS_RESIDENTIAL",
            Self::LivesThere => "PREQUAL_IS_OWNER_OCCUPIED",
            Self::Zip => "PREQUAL_ZIP",
            Self::State => "PREQUAL_STATE",
            Self::Purpose => "PREQUAL_LOAN_PURPOSE",
            Self::PurchasePrice => "PREQUAL_PURCHASE_PRICE",
            Self::PropertyValue => "PREQUAL_PROPERTY_VALUE",
            Self::LoanAmount => "PREQUAL_LOAN_AMOUNT",
        }
    }

    fn slot_type(self) -> &'static str {
        match self {
            Self::IsResidential | Self::LivesThere => "BOOLEAN",
            Self::Zip => "WORD",
            Self::State => "US_STATE",
            Self::Purpose => "LOAN_PURPOSE",
            Self::PurchasePrice | Self::PropertyValue | Self::LoanAmount => "NUMBER",
        }
    }

    fn prompt(self) -> &'static str {
        match self {
            Self::IsResidential => "Great! Is the loan for a residential property?",
            Self::LivesThere => "Sounds good! Are you going to live in the property?",
            Self::Zip => "Okay, what's the property zip code?",
            Self::State => "And what's the property state?",
            Self::Purpose => "Now, is this a purchase or a refinance?",
            Self::PurchasePrice => "What's the purchase price for the property?",
            Self::PropertyValue => "How much is your property worth?",
            Self::LoanAmount => "And how much financing are you looking for?",
        }
    }

    fn utterances(self) -> &'static [&'static str] {
        match self {
            Self::Purpose => &["{Slot}", "I'm {Slot}ing", "im {Slot}ing", "It's a {Slot}", "its a {Slot}"],
            Self::PurchasePrice | Self::PropertyValue | Self::LoanAmount => &["{Slot}", "${Slot}"],
            _ => &[],
        }
    }
}

struct LoanQuestion {
    step: LoanStep,
    state: Arc<BotState>,
}

impl LoanQuestion {
    /// Record `answer` on the application and pick the next step.
    fn record(
        &self,
        app: &mut LoanApplication,
        replies: &Replies,
        answer: &SlotValue,
    ) -> anyhow::Result<Option<LoanStep>> {
        let next = match (self.step, answer) {
            (LoanStep::IsResidential, SlotValue::Bool(true)) => Some(LoanStep::LivesThere),
            (LoanStep::IsResidential, _) => {
                replies.send("Sorry, we only do loans for residential properties.")?;
                None
            }
            (LoanStep::LivesThere, SlotValue::Bool(false)) => Some(LoanStep::Zip),
            (LoanStep::LivesThere, _) => {
                replies.send("Sorry, we only do loans for non-owner-occupied properties.")?;
                None
            }
            (LoanStep::Zip, value) => {
                app.postal_code = Some(value.to_string());
                Some(LoanStep::State)
            }
            (LoanStep::State, value) => {
                app.state = Some(value.to_string());
                Some(LoanStep::Purpose)
            }
            (LoanStep::Purpose, value) => {
                let purchase = value.as_text() == Some("purchase");
                app.is_purchase = Some(purchase);
                Some(if purchase { LoanStep::PurchasePrice } else { LoanStep::PropertyValue })
            }
            (LoanStep::PurchasePrice, SlotValue::Number(n)) => {
                app.purchase_amount = Some(*n);
                Some(LoanStep::LoanAmount)
            }
            (LoanStep::PropertyValue, SlotValue::Number(n)) => {
                app.property_value = Some(*n);
                Some(LoanStep::LoanAmount)
            }
            (LoanStep::LoanAmount, SlotValue::Number(n)) => {
                let n = *n;
                if n < LOAN_MIN {
                    replies.send(format!("Sorry, that is below our ${LOAN_MIN} minimum."))?;
                } else if n > LOAN_MAX {
                    replies.send(format!("Sorry, that is above our ${LOAN_MAX} maximum."))?;
                } else {
                    app.loan_amount = Some(n);
                    replies.send("Thanks! Someone from our team will be in touch.")?;
                }
                None
            }
            (step, other) => return Err(anyhow!("unexpected answer {other:?} to {}", step.name())),
        };
        Ok(next)
    }
}

#[async_trait]
impl QuestionHandler<Replies> for LoanQuestion {
    async fn ask(&self, turn: &Turn<'_, Replies>) -> anyhow::Result<()> {
        turn.context().send(self.step.prompt())
    }

    async fn on_answer(&self, turn: &Turn<'_, Replies>, answer: SlotValue) -> anyhow::Result<()> {
        debug!("[Bot] {} answered {} with {}", turn.user_id(), self.step.name(), answer);
        let next = {
            let mut loans = self.state.loans.lock().await;
            let app = loans.entry(turn.user_id().to_string()).or_default();
            self.record(app, turn.context(), &answer)?
        };
        if let Some(next) = next {
            turn.ask(next.name()).await?;
        }
        Ok(())
    }

    async fn on_cancel(&self, turn: &Turn<'_, Replies>) -> anyhow::Result<()> {
        self.state.loans.lock().await.remove(turn.user_id());
        turn.context().send(CANCEL_REPLY)
    }

    async fn on_invalid(&self, turn: &Turn<'_, Replies>) -> anyhow::Result<()> {
        turn.context().send(INVALID_REPLY)
    }
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

fn loan_purpose(text: &str) -> Option<SlotValue> {
    match text.to_lowercase().as_str() {
        "purchase" | "buy" => Some(SlotValue::text("purchase")),
        "refinance" | "refi" => Some(SlotValue::text("refinance")),
        _ => None,
    }
}

/// Build the engine with every intent and question of the bot.
pub fn build_engine(options: DialogOptions, state: Arc<BotState>) -> banter_nlc::Result<Engine<Replies>> {
    let mut engine = Engine::with_standard_slots(options);

    engine.add_slot_type(SlotType::literal("A_LOAN", &["a loan", "financing", "money"]).with_base_matcher(r"[\w ]+")?);
    engine.add_slot_type(SlotType::custom("LOAN_PURPOSE", loan_purpose));
    engine.add_slot_type(SlotType::pattern("US_STATE", r"^[A-Za-z]{2}$")?);

    engine.register_intent(
        Intent::new("GREET", Greet)
            .slot("Name", "WORD")
            .utterances(["hello", "hi", "hello {Name}", "hi {Name}"]),
    )?;

    engine.register_intent(
        Intent::new("MISC_SAY_TO", SayTo)
            .slot("Message", "STRING")
            .slot("Room", "SLACK_ROOM")
            .utterances([
                "say \"{Message}\" to {Room}",
                "say \"{Message}\" in {Room}",
                "say {Message} to {Room}",
                "say {Message} in {Room}",
            ]),
    )?;

    engine.register_intent(Intent::new("MISC_SLOGAN", Slogan(state.clone())).utterances([
        "what is our slogan",
        "what's our slogan",
    ]))?;

    engine.register_intent(
        Intent::new("TODO_TELL", Typed::new(TodoTell(state.clone())))
            .slot("User", "SLACK_NAME")
            .slot("Item", "STRING")
            .utterances([
                "tell {User} to {Item}",
                "remind {User} to {Item}",
                "have {User} do {Item}",
                "get {User} to {Item}",
                "{User} has to {Item}",
                "put {Item} on {User}'s todo list",
                "put {Item} on {User}'s list",
                "tell me to {Item}",
                "remind me to {Item}",
                "get me to {Item}",
                "I have to {Item}",
                "put {Item} on my todo list",
                "put {Item} on my list",
            ]),
    )?;

    engine.register_intent(
        Intent::new("TODO_LIST", TodoList(state.clone()))
            .slot("User", "SLACK_NAME")
            .utterances(["what do I have to do", "what's on my list", "what does {User} have to do"]),
    )?;

    engine.register_intent(
        Intent::new("TODO_DONE", TodoDone(state.clone()))
            .slot("Index", "NUMBER")
            .utterances(["mark {Index} as done", "mark #{Index} as done", "finish {Index}", "finish #{Index}"]),
    )?;

    engine.register_intent(
        Intent::new("PREQUAL_START", StartPrequal(state.clone()))
            .slot("ALoan", "A_LOAN")
            .utterances([
                "can I get {ALoan}",
                "I want {ALoan}",
                "I need {ALoan}",
                "I'm looking for {ALoan}",
                "can you do my deal",
            ]),
    )?;

    for step in LoanStep::ALL {
        engine.register_question(
            Question::new(step.name(), step.slot_type(), LoanQuestion { step, state: state.clone() })
                .utterances(step.utterances().iter().copied()),
        )?;
    }

    engine.check_slot_types()?;
    Ok(engine)
}
