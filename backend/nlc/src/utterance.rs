//! Utterance compiler: turns `say {Message} to {Room}` into an anchored,
//! case-insensitive regex plus the order in which slots are captured.

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::error::{NlcError, Result};

static PLACEHOLDER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap());

static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// A compiled utterance template.
#[derive(Debug, Clone)]
pub struct CompiledUtterance {
    pub template: String,
    pub pattern: Regex,
    /// Slot names in capture-group order (left to right in the template).
    pub slot_order: Vec<String>,
}

impl CompiledUtterance {
    /// Match `text` and return `(slot, captured text)` pairs in template
    /// order. Captured text is trimmed.
    pub fn captures<'a>(&'a self, text: &str) -> Option<Vec<(&'a str, String)>> {
        let caps = self.pattern.captures(text)?;
        let pairs = self
            .slot_order
            .iter()
            .enumerate()
            .map(|(i, slot)| {
                let raw = caps.get(i + 1).map(|m| m.as_str()).unwrap_or_default();
                (slot.as_str(), raw.trim().to_string())
            })
            .collect();
        Some(pairs)
    }
}

/// Escape a literal run of template text, letting any whitespace run match
/// any whitespace run in the input.
fn literal_to_pattern(literal: &str) -> String {
    WHITESPACE_RE
        .split(literal)
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(r"\s+")
}

/// Compile `template` against the declared slot names.
///
/// Placeholders must name a declared slot and may appear at most once.
pub fn compile(template: &str, slot_names: &[&str]) -> Result<CompiledUtterance> {
    let trimmed = template.trim();
    let mut body = String::new();
    let mut slot_order: Vec<String> = Vec::new();
    let mut last = 0;

    for caps in PLACEHOLDER_RE.captures_iter(trimmed) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else { continue };
        let name = name.as_str();

        if !slot_names.contains(&name) {
            return Err(NlcError::UnknownPlaceholder {
                template: template.to_string(),
                placeholder: name.to_string(),
            });
        }
        if slot_order.iter().any(|s| s == name) {
            return Err(NlcError::DuplicatePlaceholder {
                template: template.to_string(),
                slot: name.to_string(),
            });
        }

        body.push_str(&literal_to_pattern(&trimmed[last..whole.start()]));
        body.push_str("(.+)");
        slot_order.push(name.to_string());
        last = whole.end();
    }
    body.push_str(&literal_to_pattern(&trimmed[last..]));

    let pattern = Regex::new(&format!("(?is)^{body}$")).map_err(|source| {
        NlcError::InvalidPattern { context: format!("utterance {template:?}"), source }
    })?;
    debug!("[Nlc] Compiled {:?} -> {}", template, pattern.as_str());

    Ok(CompiledUtterance { template: template.to_string(), pattern, slot_order })
}

/// Compiled utterances keyed by template text, kept for the engine's lifetime.
#[derive(Debug, Default)]
pub struct UtteranceCache {
    compiled: HashMap<String, Arc<CompiledUtterance>>,
}

impl UtteranceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile `template`, reusing an earlier compilation of the same text.
    ///
    /// A cached entry is only reused if every slot it captures is declared
    /// by the caller, so placeholder checking stays per-schema.
    pub fn compile(&mut self, template: &str, slot_names: &[&str]) -> Result<Arc<CompiledUtterance>> {
        if let Some(hit) = self.compiled.get(template) {
            if let Some(missing) = hit.slot_order.iter().find(|s| !slot_names.contains(&s.as_str())) {
                return Err(NlcError::UnknownPlaceholder {
                    template: template.to_string(),
                    placeholder: missing.clone(),
                });
            }
            return Ok(hit.clone());
        }
        let compiled = Arc::new(compile(template, slot_names)?);
        self.compiled.insert(template.to_string(), compiled.clone());
        Ok(compiled)
    }

    pub fn len(&self) -> usize {
        self.compiled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.compiled.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_order_follows_the_template() {
        let c = compile("put {Item} on {User}'s list", &["User", "Item"]).unwrap();
        assert_eq!(c.slot_order, vec!["Item", "User"]);
        let caps = c.captures("put milk on @sam's list").unwrap();
        assert_eq!(caps, vec![("Item", "milk".to_string()), ("User", "@sam".to_string())]);
    }

    #[test]
    fn matching_is_case_insensitive_and_anchored() {
        let c = compile("hi", &[]).unwrap();
        assert!(c.captures("HI").is_some());
        assert!(c.captures("oh hi there").is_none());
    }

    #[test]
    fn whitespace_is_flexible() {
        let c = compile("say {A} to {B}", &["A", "B"]).unwrap();
        let caps = c.captures("say   hi   to   bob").unwrap();
        assert_eq!(caps, vec![("A", "hi".to_string()), ("B", "bob".to_string())]);
    }

    #[test]
    fn slot_requires_text() {
        let c = compile("hello {Name}", &["Name"]).unwrap();
        assert!(c.captures("hello").is_none());
        assert!(c.captures("hello ").is_none());
    }

    #[test]
    fn metacharacters_are_literal() {
        let c = compile("what's (our) [slogan]?", &[]).unwrap();
        assert!(c.captures("what's (our) [slogan]?").is_some());
        assert!(c.captures("whats our slogan").is_none());

        let money = compile("${Slot}", &["Slot"]).unwrap();
        assert_eq!(money.captures("$300").unwrap(), vec![("Slot", "300".to_string())]);
    }

    #[test]
    fn placeholder_glued_to_text() {
        let c = compile("I'm {Slot}ing", &["Slot"]).unwrap();
        assert_eq!(c.captures("i'm buying").unwrap(), vec![("Slot", "buy".to_string())]);
    }

    #[test]
    fn undeclared_placeholder_is_rejected() {
        let err = compile("hello {Nobody}", &["Name"]).unwrap_err();
        assert!(matches!(err, NlcError::UnknownPlaceholder { placeholder, .. } if placeholder == "Nobody"));
    }

    #[test]
    fn repeated_placeholder_is_rejected() {
        let err = compile("{A} and {A}", &["A"]).unwrap_err();
        assert!(matches!(err, NlcError::DuplicatePlaceholder { slot, .. } if slot == "A"));
    }

    #[test]
    fn cache_reuses_and_rechecks() {
        let mut cache = UtteranceCache::new();
        let a = cache.compile("hello {Name}", &["Name"]).unwrap();
        let b = cache.compile("hello {Name}", &["Name", "Other"]).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);
        assert!(cache.compile("hello {Name}", &["Other"]).is_err());
    }
}
