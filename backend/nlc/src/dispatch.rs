//! Single entry point for inbound messages.
//!
//! A pending question always takes precedence over intent matching. Once the
//! answer path has run (answered, cancelled or rejected) the message is
//! consumed; intents only see it when nothing was pending.
//!
//! Messages from one user are handled one at a time, so a second message
//! can't slip past a question that is being answered. Different users still
//! run concurrently.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use crate::dialog::AnswerOutcome;
use crate::engine::{CommandOutcome, Engine, MessageContext};
use crate::error::Result;
use crate::text::clean_text;

/// How a message was handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    Intent { name: String },
    Answered { question: String },
    Cancelled { question: String },
    Rejected { question: String, still_pending: bool },
    NoMatch,
}

impl Dispatch {
    /// True if some handler consumed the message.
    pub fn is_handled(&self) -> bool {
        !matches!(self, Self::NoMatch)
    }
}

impl From<AnswerOutcome> for Dispatch {
    fn from(outcome: AnswerOutcome) -> Self {
        match outcome {
            AnswerOutcome::Answered { question } => Self::Answered { question },
            AnswerOutcome::Cancelled { question } => Self::Cancelled { question },
            AnswerOutcome::Rejected { question, still_pending } => Self::Rejected { question, still_pending },
        }
    }
}

impl From<CommandOutcome> for Dispatch {
    fn from(outcome: CommandOutcome) -> Self {
        match outcome {
            CommandOutcome::Matched { intent } => Self::Intent { name: intent },
            CommandOutcome::NoMatch => Self::NoMatch,
        }
    }
}

/// One async lock per user with a message in flight.
pub(crate) struct UserTurns {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl UserTurns {
    pub(crate) fn new() -> Self {
        Self { locks: Mutex::new(HashMap::new()) }
    }

    async fn acquire(&self, user_id: &str) -> OwnedMutexGuard<()> {
        let lock = self.locks.lock().await.entry(user_id.to_string()).or_default().clone();
        lock.lock_owned().await
    }

    /// Unlock, dropping the entry when nobody else is waiting on it.
    async fn release(&self, user_id: &str, guard: OwnedMutexGuard<()>) {
        drop(guard);
        let mut locks = self.locks.lock().await;
        if locks.get(user_id).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(user_id);
        }
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.locks.lock().await.len()
    }
}

impl<C: MessageContext> Engine<C> {
    /// Route one message from `user_id`.
    ///
    /// `context` is used for intent handlers; question callbacks get the
    /// data captured when the question was asked. Handlers must not call
    /// `receive` for their own user.
    pub async fn receive(&self, user_id: &str, text: &str, context: &C) -> Result<Dispatch> {
        let guard = self.turns.acquire(user_id).await;
        let result = self.route(user_id, &clean_text(text), context).await;
        self.turns.release(user_id, guard).await;
        result
    }

    async fn route(&self, user_id: &str, text: &str, context: &C) -> Result<Dispatch> {
        if let Some(pending) = self.take_live_pending(user_id).await {
            debug!("[Dialog] Routing {:?} from {} to {}", text, user_id, pending.question);
            return self.answer(user_id, text, pending).await.map(Dispatch::from);
        }
        self.handle_command(user_id, text, context).await.map(Dispatch::from)
    }
}
