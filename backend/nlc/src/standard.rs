//! Standard slot types available to every engine.
//!
//! `STRING`, `WORD`, `NUMBER`, `DATE`, `SLACK_NAME`, `SLACK_ROOM` and
//! `BOOLEAN`. Hosts may override any of them by registering a type with the
//! same name afterwards.

use chrono::{Duration, Local, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::slots::{SlotType, SlotValidator, SlotValue};

pub const STRING: &str = "STRING";
pub const WORD: &str = "WORD";
pub const NUMBER: &str = "NUMBER";
pub const DATE: &str = "DATE";
pub const SLACK_NAME: &str = "SLACK_NAME";
pub const SLACK_ROOM: &str = "SLACK_ROOM";
pub const BOOLEAN: &str = "BOOLEAN";

static WORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(?:\w+)$").unwrap());

static NUMBER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[-+]?(?:\d+(?:\.\d*)?|\.\d+)$").unwrap());

// Names start with @.
static SLACK_NAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^@.+").unwrap());

// Rooms start with #, but names work too.
static SLACK_ROOM_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)[#@].+").unwrap());

const DATE_FORMATS: &[&str] = &[
    "%m/%d/%Y",
    "%m-%d-%Y",
    "%b %d %Y",
    "%b %d, %Y",
    "%B %d %Y",
    "%B %d, %Y",
    "%Y-%m-%d",
];

const TRUE_WORDS: &[&str] = &["true", "yes", "yeah", "yup", "correct", "uhhuh", "uh huh", "mmhm"];
const FALSE_WORDS: &[&str] = &["false", "no", "nope", "naw", "nah"];

pub fn string() -> SlotType {
    SlotType::custom(STRING, |text| (!text.is_empty()).then(|| SlotValue::text(text)))
}

pub fn word() -> SlotType {
    let mut slot = SlotType::custom(WORD, |text| Some(SlotValue::text(text)));
    slot.base_matcher = Some(WORD_RE.clone());
    slot
}

pub fn number() -> SlotType {
    SlotType::custom(NUMBER, parse_number)
}

pub fn date() -> SlotType {
    SlotType::custom(DATE, |text| parse_date(text, Local::now().date_naive()))
}

pub fn slack_name() -> SlotType {
    SlotType::new(SLACK_NAME, SlotValidator::Pattern(SLACK_NAME_RE.clone()))
}

pub fn slack_room() -> SlotType {
    SlotType::new(SLACK_ROOM, SlotValidator::Pattern(SLACK_ROOM_RE.clone()))
}

pub fn boolean() -> SlotType {
    let pairs: Vec<(&str, SlotValue)> = TRUE_WORDS
        .iter()
        .map(|w| (*w, SlotValue::Bool(true)))
        .chain(FALSE_WORDS.iter().map(|w| (*w, SlotValue::Bool(false))))
        .collect();
    SlotType::mapped(BOOLEAN, &pairs)
}

/// All standard slot types.
pub fn standard_slot_types() -> Vec<SlotType> {
    vec![string(), word(), number(), date(), slack_name(), slack_room(), boolean()]
}

/// Accepts `42`, `-3.5`, `1,250,000` and `$800,000`.
fn parse_number(text: &str) -> Option<SlotValue> {
    let cleaned: String = text
        .trim()
        .trim_start_matches('$')
        .chars()
        .filter(|c| *c != ',')
        .collect();
    if !NUMBER_RE.is_match(&cleaned) {
        return None;
    }
    cleaned.parse::<f64>().ok().map(SlotValue::Number)
}

fn parse_date(text: &str, today: NaiveDate) -> Option<SlotValue> {
    let text = text.trim();
    let relative = match text.to_lowercase().as_str() {
        "today" => Some(today),
        "tomorrow" => Some(today + Duration::days(1)),
        "yesterday" => Some(today - Duration::days(1)),
        _ => None,
    };
    relative
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
        })
        .map(SlotValue::Date)
}
