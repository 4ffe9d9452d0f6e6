//! Natural-language command matching for chat bots.
//!
//! Intents declare typed slots and utterance templates such as
//! `say {Message} to {Room}`; inbound text is matched against them and the
//! winning handler receives validated slot values. Questions add one-step
//! dialogs: the next message from a user answers the question they were asked.

pub mod dialog;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod intents;
pub mod slots;
pub mod standard;
pub mod text;
pub mod utterance;

pub use dialog::{
    AnswerOutcome, DialogOptions, InvalidAnswerPolicy, Question, QuestionHandler, ANSWER_SLOT,
};
pub use dispatch::Dispatch;
pub use engine::{CommandOutcome, Engine, MessageContext, Turn};
pub use error::{NlcError, Result};
pub use intents::{
    FromSlots, Intent, IntentHandler, IntentMatch, IntentRegistry, IntentSlot, SlotValues, Typed,
    TypedIntentHandler,
};
pub use slots::{FromSlotValue, SlotType, SlotTypeRegistry, SlotValidator, SlotValue};
pub use standard::standard_slot_types;
pub use text::clean_text;
pub use utterance::{compile, CompiledUtterance, UtteranceCache};
