use thiserror::Error;

/// Errors raised by the command matcher.
///
/// Every variant except `Handler` is a configuration mistake made while
/// wiring the engine up. A message that simply doesn't match anything is not
/// an error; see `CommandOutcome::NoMatch` and `Dispatch::Rejected`.
#[derive(Debug, Error)]
pub enum NlcError {
    #[error("unknown slot type: {0}")]
    UnknownSlotType(String),

    #[error("unknown question: {0}")]
    UnknownQuestion(String),

    #[error("utterance {template:?} references undeclared slot {{{placeholder}}}")]
    UnknownPlaceholder { template: String, placeholder: String },

    #[error("utterance {template:?} uses slot {{{slot}}} more than once")]
    DuplicatePlaceholder { template: String, slot: String },

    #[error("intent already registered: {0}")]
    DuplicateIntent(String),

    #[error("question already registered: {0}")]
    DuplicateQuestion(String),

    #[error("{0} has no utterances")]
    NoUtterances(String),

    #[error("invalid pattern for {context}: {source}")]
    InvalidPattern {
        context: String,
        #[source]
        source: regex::Error,
    },

    #[error("slot {slot} is missing or not a {expected}")]
    SlotConversion { slot: String, expected: &'static str },

    #[error("handler for {name} failed: {source}")]
    Handler {
        name: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl NlcError {
    pub(crate) fn handler(name: &str, source: anyhow::Error) -> Self {
        Self::Handler { name: name.to_string(), source: source.into() }
    }
}

pub type Result<T> = std::result::Result<T, NlcError>;
