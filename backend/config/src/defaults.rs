//! Fills in values the user left unset.

use crate::schema::{BanterConfig, InvalidAnswerPolicy, LoggingConfig, NlcConfig};

pub const DEFAULT_CANCEL_KEYWORDS: &[&str] = &["cancel", "nevermind", "never mind"];

pub const DEFAULT_LOG_LEVEL: &str = "info";

pub fn apply_all_defaults(config: BanterConfig) -> BanterConfig {
    let config = apply_nlc_defaults(config);
    apply_logging_defaults(config)
}

fn apply_nlc_defaults(mut config: BanterConfig) -> BanterConfig {
    let nlc = config.nlc.get_or_insert_with(NlcConfig::default);
    if nlc.cancel_keywords.as_ref().is_none_or(|k| k.is_empty()) {
        nlc.cancel_keywords = Some(DEFAULT_CANCEL_KEYWORDS.iter().map(|k| k.to_string()).collect());
    }
    if nlc.on_invalid_answer.is_none() {
        nlc.on_invalid_answer = Some(InvalidAnswerPolicy::Reprompt);
    }
    config
}

fn apply_logging_defaults(mut config: BanterConfig) -> BanterConfig {
    let logging = config.logging.get_or_insert_with(LoggingConfig::default);
    if logging.level.is_none() {
        logging.level = Some(DEFAULT_LOG_LEVEL.to_string());
    }
    if logging.json.is_none() {
        logging.json = Some(false);
    }
    config
}
