//! Slot types: named validators that recognize and normalize captured text.
//!
//! A validator is one of a literal word list, a word → value map, a regular
//! expression or a custom function. Only `None` means "no match"; falsy
//! values such as `Bool(false)` or `Number(0.0)` are legitimate results.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{NlcError, Result};

// ---------------------------------------------------------------------------
// Values
// ---------------------------------------------------------------------------

/// A validated, normalized slot value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum SlotValue {
    Text(String),
    Number(f64),
    Bool(bool),
    Date(NaiveDate),
    Json(serde_json::Value),
}

impl SlotValue {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for SlotValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Number(n) => write!(f, "{n}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Self::Json(v) => write!(f, "{v}"),
        }
    }
}

/// Conversion from a resolved slot value into a concrete Rust type.
pub trait FromSlotValue: Sized {
    /// Human-readable name of the expected kind, used in conversion errors.
    const EXPECTED: &'static str;

    fn from_slot_value(value: &SlotValue) -> Option<Self>;
}

impl FromSlotValue for String {
    const EXPECTED: &'static str = "text";

    fn from_slot_value(value: &SlotValue) -> Option<Self> {
        value.as_text().map(str::to_string)
    }
}

impl FromSlotValue for f64 {
    const EXPECTED: &'static str = "number";

    fn from_slot_value(value: &SlotValue) -> Option<Self> {
        match value {
            SlotValue::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl FromSlotValue for i64 {
    const EXPECTED: &'static str = "integer";

    fn from_slot_value(value: &SlotValue) -> Option<Self> {
        match value {
            // `as` saturates; out-of-range values must not turn into i64::MAX.
            SlotValue::Number(n) if n.fract() == 0.0 && (i64::MIN as f64..i64::MAX as f64).contains(n) => {
                Some(*n as i64)
            }
            _ => None,
        }
    }
}

impl FromSlotValue for bool {
    const EXPECTED: &'static str = "boolean";

    fn from_slot_value(value: &SlotValue) -> Option<Self> {
        match value {
            SlotValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl FromSlotValue for NaiveDate {
    const EXPECTED: &'static str = "date";

    fn from_slot_value(value: &SlotValue) -> Option<Self> {
        match value {
            SlotValue::Date(d) => Some(*d),
            _ => None,
        }
    }
}

impl FromSlotValue for serde_json::Value {
    const EXPECTED: &'static str = "json value";

    fn from_slot_value(value: &SlotValue) -> Option<Self> {
        match value {
            SlotValue::Json(v) => Some(v.clone()),
            other => serde_json::to_value(other).ok().and_then(|v| v.get("value").cloned()),
        }
    }
}

impl FromSlotValue for SlotValue {
    const EXPECTED: &'static str = "value";

    fn from_slot_value(value: &SlotValue) -> Option<Self> {
        Some(value.clone())
    }
}

// ---------------------------------------------------------------------------
// Validators
// ---------------------------------------------------------------------------

pub type CustomValidator = Arc<dyn Fn(&str) -> Option<SlotValue> + Send + Sync>;

/// How a slot type decides whether text belongs to it.
#[derive(Clone)]
pub enum SlotValidator {
    /// Accepted words; matching returns the registered casing.
    Literal(Vec<String>),
    /// Accepted words, each mapped to a value.
    Mapped(Vec<(String, SlotValue)>),
    /// Search semantics: any match inside the text accepts the whole text.
    Pattern(Regex),
    Custom(CustomValidator),
}

impl fmt::Debug for SlotValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(words) => f.debug_tuple("Literal").field(words).finish(),
            Self::Mapped(pairs) => f.debug_tuple("Mapped").field(pairs).finish(),
            Self::Pattern(re) => f.debug_tuple("Pattern").field(&re.as_str()).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Exact match first, then a case-insensitive match.
fn find_word<'a, I>(candidates: I, text: &str) -> Option<usize>
where
    I: Iterator<Item = &'a str> + Clone,
{
    if let Some(i) = candidates.clone().position(|c| c == text) {
        return Some(i);
    }
    let lower = text.to_lowercase();
    candidates.into_iter().position(|c| c.to_lowercase() == lower)
}

// ---------------------------------------------------------------------------
// Slot type
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SlotType {
    pub name: String,
    pub validator: SlotValidator,
    /// Whole-text shape the captured text must have before validation.
    pub(crate) base_matcher: Option<Regex>,
}

impl SlotType {
    pub fn new(name: impl Into<String>, validator: SlotValidator) -> Self {
        Self { name: name.into(), validator, base_matcher: None }
    }

    pub fn literal<S: AsRef<str>>(name: impl Into<String>, words: &[S]) -> Self {
        let words = words.iter().map(|w| w.as_ref().to_string()).collect();
        Self::new(name, SlotValidator::Literal(words))
    }

    pub fn mapped<S: AsRef<str>>(name: impl Into<String>, pairs: &[(S, SlotValue)]) -> Self {
        let pairs = pairs
            .iter()
            .map(|(w, v)| (w.as_ref().to_string(), v.clone()))
            .collect();
        Self::new(name, SlotValidator::Mapped(pairs))
    }

    pub fn pattern(name: impl Into<String>, pattern: &str) -> Result<Self> {
        let name = name.into();
        let re = Regex::new(pattern).map_err(|source| NlcError::InvalidPattern {
            context: format!("slot type {name}"),
            source,
        })?;
        Ok(Self::new(name, SlotValidator::Pattern(re)))
    }

    pub fn custom<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&str) -> Option<SlotValue> + Send + Sync + 'static,
    {
        Self::new(name, SlotValidator::Custom(Arc::new(f)))
    }

    /// Require the captured text to match `fragment` in full before validating.
    pub fn with_base_matcher(mut self, fragment: &str) -> Result<Self> {
        let re = Regex::new(&format!("^(?:{fragment})$")).map_err(|source| {
            NlcError::InvalidPattern { context: format!("base matcher of {}", self.name), source }
        })?;
        self.base_matcher = Some(re);
        Ok(self)
    }

    pub fn base_matcher(&self) -> Option<&str> {
        self.base_matcher.as_ref().map(Regex::as_str)
    }

    /// Validate and normalize `text`. `None` means the text isn't of this type.
    pub fn resolve(&self, text: &str) -> Option<SlotValue> {
        if let Some(base) = &self.base_matcher {
            if !base.is_match(text) {
                return None;
            }
        }
        match &self.validator {
            SlotValidator::Literal(words) => {
                find_word(words.iter().map(String::as_str), text)
                    .map(|i| SlotValue::Text(words[i].clone()))
            }
            SlotValidator::Mapped(pairs) => {
                find_word(pairs.iter().map(|(w, _)| w.as_str()), text)
                    .map(|i| pairs[i].1.clone())
            }
            SlotValidator::Pattern(re) => {
                re.is_match(text).then(|| SlotValue::Text(text.to_string()))
            }
            SlotValidator::Custom(f) => f(text),
        }
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Clone)]
pub struct SlotTypeRegistry {
    types: HashMap<String, SlotType>,
}

impl SlotTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a slot type. Re-registering a name replaces the old definition,
    /// which is returned.
    pub fn register(&mut self, slot_type: SlotType) -> Option<SlotType> {
        let previous = self.types.insert(slot_type.name.clone(), slot_type);
        if let Some(prev) = &previous {
            warn!("[Nlc] Slot type {} was registered twice; keeping the latest", prev.name);
        }
        previous
    }

    pub fn get(&self, name: &str) -> Option<&SlotType> {
        self.types.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }

    /// Resolve `text` against the named type.
    ///
    /// An unregistered name is a wiring bug and fails loudly.
    pub fn resolve(&self, name: &str, text: &str) -> Result<Option<SlotValue>> {
        let slot_type = self
            .types
            .get(name)
            .ok_or_else(|| NlcError::UnknownSlotType(name.to_string()))?;
        let value = slot_type.resolve(text);
        debug!("[Nlc] {} {:?} -> {:?}", name, text, value);
        Ok(value)
    }
}
