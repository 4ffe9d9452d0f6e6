//! Banter configuration schema, read from YAML with camelCase keys.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BanterConfig {
    /// Matcher and dialog behaviour
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nlc: Option<NlcConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

// ---------------------------------------------------------------------------
// Matcher / dialogs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NlcConfig {
    /// Replies that cancel a pending question.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancel_keywords: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_invalid_answer: Option<InvalidAnswerPolicy>,

    /// Seconds before an unanswered question is dropped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_ttl_secs: Option<u64>,
}

/// What happens when a reply to a question doesn't resolve.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvalidAnswerPolicy {
    /// Keep the question pending so the user can try again.
    #[default]
    Reprompt,
    /// Drop the question.
    Abort,
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggingConfig {
    /// `tracing` filter directive, e.g. `info` or `banter_nlc=debug`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,

    /// Directory for rolling NDJSON logs; file logging is off when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,

    /// JSON console output
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_camel_case_yaml() {
        let yaml = r#"
nlc:
  cancelKeywords: ["cancel", "never mind"]
  onInvalidAnswer: abort
  questionTtlSecs: 600
logging:
  level: debug
"#;
        let config: BanterConfig = serde_yaml::from_str(yaml).unwrap();
        let nlc = config.nlc.unwrap();
        assert_eq!(nlc.cancel_keywords.unwrap(), vec!["cancel", "never mind"]);
        assert_eq!(nlc.on_invalid_answer, Some(InvalidAnswerPolicy::Abort));
        assert_eq!(nlc.question_ttl_secs, Some(600));
        assert_eq!(config.logging.unwrap().level.as_deref(), Some("debug"));
    }

    #[test]
    fn rejects_unknown_policy() {
        assert!(serde_yaml::from_str::<NlcConfig>("onInvalidAnswer: ignore").is_err());
    }
}
