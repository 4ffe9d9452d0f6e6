//! Dialog event stream.
//!
//! Every routing decision is emitted on the `dialog_events` target so it can
//! be filtered into its own sink.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::redact::redact_sensitive_data;

pub const EVENT_TARGET: &str = "dialog_events";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DialogEvent {
    IntentMatched { intent: String, text: String },
    NoMatch { text: String },
    QuestionAsked { question: String },
    AnswerAccepted { question: String, text: String },
    AnswerRejected { question: String, text: String },
    DialogCancelled { question: String },
    DialogExpired { question: String },
}

impl DialogEvent {
    /// Replace user-supplied text with its redacted form.
    fn redact(&mut self) {
        match self {
            Self::IntentMatched { text, .. }
            | Self::NoMatch { text }
            | Self::AnswerAccepted { text, .. }
            | Self::AnswerRejected { text, .. } => *text = redact_sensitive_data(text),
            Self::QuestionAsked { .. } | Self::DialogCancelled { .. } | Self::DialogExpired { .. } => {}
        }
    }
}

#[derive(Debug, Serialize)]
pub struct EventLogEntry {
    pub user_id: String,
    pub timestamp: DateTime<Utc>,
    pub event: DialogEvent,
}

impl EventLogEntry {
    pub fn new(user_id: &str, mut event: DialogEvent) -> Self {
        event.redact();
        Self { user_id: user_id.to_string(), timestamp: Utc::now(), event }
    }
}

pub struct DialogEventLogger;

impl DialogEventLogger {
    pub fn log_event(user_id: &str, event: DialogEvent) {
        let entry = EventLogEntry::new(user_id, event);
        match serde_json::to_string(&entry) {
            Ok(json) => info!(target: EVENT_TARGET, event = %json, "dialog event"),
            Err(_) => info!(target: EVENT_TARGET, event = ?entry, "dialog event"),
        }
    }
}
