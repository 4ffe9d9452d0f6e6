//! Intents and the ordered matcher list.
//!
//! Matchers are tried in registration order. The first one whose pattern
//! matches *and* whose captured slots all resolve wins; a matcher with a
//! slot that fails to resolve is skipped as a whole.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::engine::{MessageContext, Turn};
use crate::error::{NlcError, Result};
use crate::slots::{FromSlotValue, SlotTypeRegistry, SlotValue};
use crate::utterance::{CompiledUtterance, UtteranceCache};

// ---------------------------------------------------------------------------
// Slot schema
// ---------------------------------------------------------------------------

/// A named, typed slot declared by an intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentSlot {
    pub name: String,
    /// Slot type name; must be registered by the time a message is matched.
    #[serde(rename = "type")]
    pub slot_type: String,
}

impl IntentSlot {
    pub fn new(name: impl Into<String>, slot_type: impl Into<String>) -> Self {
        Self { name: name.into(), slot_type: slot_type.into() }
    }
}

// ---------------------------------------------------------------------------
// Resolved values
// ---------------------------------------------------------------------------

/// Slot values of a matched utterance, in the intent's declared slot order.
///
/// Declared slots that the matched template doesn't mention are present
/// with no value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SlotValues {
    entries: Vec<(String, Option<SlotValue>)>,
}

impl SlotValues {
    pub fn new(entries: Vec<(String, Option<SlotValue>)>) -> Self {
        Self { entries }
    }

    pub fn get(&self, name: &str) -> Option<&SlotValue> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .and_then(|(_, v)| v.as_ref())
    }

    pub fn get_as<T: FromSlotValue>(&self, name: &str) -> Option<T> {
        self.get(name).and_then(T::from_slot_value)
    }

    /// Like `get_as`, but a missing or mistyped value is an error.
    pub fn require<T: FromSlotValue>(&self, name: &str) -> Result<T> {
        self.get_as(name).ok_or_else(|| NlcError::SlotConversion {
            slot: name.to_string(),
            expected: T::EXPECTED,
        })
    }

    /// Values in declared order.
    pub fn values(&self) -> impl Iterator<Item = Option<&SlotValue>> {
        self.entries.iter().map(|(_, v)| v.as_ref())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Build a typed argument struct out of matched slot values.
pub trait FromSlots: Sized {
    fn from_slots(slots: &SlotValues) -> Result<Self>;
}

impl FromSlots for SlotValues {
    fn from_slots(slots: &SlotValues) -> Result<Self> {
        Ok(slots.clone())
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// Called once when an intent wins the match.
#[async_trait]
pub trait IntentHandler<C: MessageContext>: Send + Sync {
    async fn handle(&self, turn: &Turn<'_, C>, slots: &SlotValues) -> anyhow::Result<()>;
}

/// Intent handler that receives its slots as a typed struct.
#[async_trait]
pub trait TypedIntentHandler<C: MessageContext, T: Send + 'static>: Send + Sync {
    async fn handle(&self, turn: &Turn<'_, C>, args: T) -> anyhow::Result<()>;
}

/// Adapts a `TypedIntentHandler` into an `IntentHandler`.
pub struct Typed<T, H> {
    handler: H,
    _args: PhantomData<fn() -> T>,
}

impl<T, H> Typed<T, H> {
    pub fn new(handler: H) -> Self {
        Self { handler, _args: PhantomData }
    }
}

#[async_trait]
impl<C, T, H> IntentHandler<C> for Typed<T, H>
where
    C: MessageContext,
    T: FromSlots + Send + 'static,
    H: TypedIntentHandler<C, T>,
{
    async fn handle(&self, turn: &Turn<'_, C>, slots: &SlotValues) -> anyhow::Result<()> {
        let args = T::from_slots(slots)?;
        self.handler.handle(turn, args).await
    }
}

// ---------------------------------------------------------------------------
// Intent definition
// ---------------------------------------------------------------------------

/// A named command: utterance templates, a slot schema and a handler.
pub struct Intent<C: MessageContext> {
    pub name: String,
    pub slots: Vec<IntentSlot>,
    pub utterances: Vec<String>,
    pub handler: Arc<dyn IntentHandler<C>>,
}

impl<C: MessageContext> Intent<C> {
    pub fn new(name: impl Into<String>, handler: impl IntentHandler<C> + 'static) -> Self {
        Self {
            name: name.into(),
            slots: Vec::new(),
            utterances: Vec::new(),
            handler: Arc::new(handler),
        }
    }

    pub fn slot(mut self, name: impl Into<String>, slot_type: impl Into<String>) -> Self {
        self.slots.push(IntentSlot::new(name, slot_type));
        self
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

impl<C: MessageContext> std::fmt::Debug for Intent<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Intent")
            .field("name", &self.name)
            .field("slots", &self.slots)
            .field("utterances", &self.utterances)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Registry & matcher
// ---------------------------------------------------------------------------

struct Matcher<C: MessageContext> {
    intent: Arc<Intent<C>>,
    utterance: Arc<CompiledUtterance>,
}

/// A winning match: the intent and its resolved values.
pub struct IntentMatch<C: MessageContext> {
    pub intent: Arc<Intent<C>>,
    pub template: String,
    pub slots: SlotValues,
}

impl<C: MessageContext> std::fmt::Debug for IntentMatch<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntentMatch")
            .field("intent", &self.intent.name)
            .field("template", &self.template)
            .field("slots", &self.slots)
            .finish()
    }
}

pub struct IntentRegistry<C: MessageContext> {
    intents: Vec<Arc<Intent<C>>>,
    matchers: Vec<Matcher<C>>,
}

impl<C: MessageContext> Default for IntentRegistry<C> {
    fn default() -> Self {
        Self { intents: Vec::new(), matchers: Vec::new() }
    }
}

impl<C: MessageContext> IntentRegistry<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile every utterance of `intent` and append its matchers.
    pub fn register(&mut self, intent: Intent<C>, cache: &mut UtteranceCache) -> Result<()> {
        if self.intents.iter().any(|i| i.name == intent.name) {
            return Err(NlcError::DuplicateIntent(intent.name));
        }
        if intent.utterances.is_empty() {
            return Err(NlcError::NoUtterances(format!("intent {}", intent.name)));
        }

        let slot_names: Vec<&str> = intent.slots.iter().map(|s| s.name.as_str()).collect();
        let compiled = intent
            .utterances
            .iter()
            .map(|u| cache.compile(u, &slot_names))
            .collect::<Result<Vec<_>>>()?;

        let intent = Arc::new(intent);
        self.matchers.extend(compiled.into_iter().map(|utterance| Matcher {
            intent: intent.clone(),
            utterance,
        }));
        self.intents.push(intent);
        Ok(())
    }

    pub fn all(&self) -> &[Arc<Intent<C>>] {
        &self.intents
    }

    pub fn find_by_name(&self, name: &str) -> Option<&Arc<Intent<C>>> {
        self.intents.iter().find(|i| i.name == name)
    }

    pub fn matcher_count(&self) -> usize {
        self.matchers.len()
    }

    /// Find the first matcher that matches `text` and resolves every slot.
    pub fn find_match(&self, slot_types: &SlotTypeRegistry, text: &str) -> Result<Option<IntentMatch<C>>> {
        for matcher in &self.matchers {
            let Some(captures) = matcher.utterance.captures(text) else { continue };
            debug!(
                "[Nlc] {:?} matches pattern of {} ({:?})",
                text, matcher.intent.name, matcher.utterance.template
            );

            if let Some(slots) = resolve_captures(&matcher.intent, slot_types, &captures)? {
                return Ok(Some(IntentMatch {
                    intent: matcher.intent.clone(),
                    template: matcher.utterance.template.clone(),
                    slots,
                }));
            }
            debug!("[Nlc] Slot resolution failed for {}; trying next matcher", matcher.intent.name);
        }
        Ok(None)
    }
}

/// Resolve captured text for each slot, then reorder into declared order.
/// `Ok(None)` if any captured slot fails to resolve.
fn resolve_captures<C: MessageContext>(
    intent: &Intent<C>,
    slot_types: &SlotTypeRegistry,
    captures: &[(&str, String)],
) -> Result<Option<SlotValues>> {
    let mut resolved: HashMap<&str, SlotValue> = HashMap::with_capacity(captures.len());
    for (slot_name, text) in captures {
        let Some(slot) = intent.slots.iter().find(|s| s.name == *slot_name) else {
            continue;
        };
        match slot_types.resolve(&slot.slot_type, text)? {
            Some(value) => {
                resolved.insert(*slot_name, value);
            }
            None => return Ok(None),
        }
    }

    let entries = intent
        .slots
        .iter()
        .map(|s| (s.name.clone(), resolved.remove(s.name.as_str())))
        .collect();
    Ok(Some(SlotValues::new(entries)))
}
