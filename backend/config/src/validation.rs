//! Config validation: collects every problem in one pass.

use std::collections::HashSet;

use thiserror::Error;

use crate::schema::BanterConfig;

#[derive(Debug, Error)]
#[error("Config validation error at '{path}': {message}")]
pub struct ConfigValidationError {
    pub path: String,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct ValidationReport {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError { path: path.into(), message: message.into() });
    }

    fn warn(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError { path: path.into(), message: message.into() });
    }
}

pub fn validate(config: &BanterConfig) -> ValidationReport {
    let mut report = ValidationReport::default();
    validate_nlc(config, &mut report);
    validate_logging(config, &mut report);
    report
}

fn validate_nlc(config: &BanterConfig, report: &mut ValidationReport) {
    let Some(nlc) = &config.nlc else { return };

    if let Some(keywords) = &nlc.cancel_keywords {
        if keywords.is_empty() {
            report.warn("nlc.cancelKeywords", "No cancel keywords; the defaults will be used");
        }
        let mut seen = HashSet::new();
        for (i, keyword) in keywords.iter().enumerate() {
            let normalized = keyword.trim().to_lowercase();
            if normalized.is_empty() {
                report.error(format!("nlc.cancelKeywords[{i}]"), "Cancel keyword is blank");
            } else if !seen.insert(normalized) {
                report.warn(format!("nlc.cancelKeywords[{i}]"), format!("Duplicate cancel keyword {keyword:?}"));
            }
        }
    }

    if nlc.question_ttl_secs == Some(0) {
        report.error("nlc.questionTtlSecs", "Must be greater than 0; omit it to never expire questions");
    }
}

fn validate_logging(config: &BanterConfig, report: &mut ValidationReport) {
    let Some(logging) = &config.logging else { return };
    if logging.level.as_deref().is_some_and(|l| l.trim().is_empty()) {
        report.error("logging.level", "Log level is blank");
    }
    if logging.dir.as_deref().is_some_and(|d| d.trim().is_empty()) {
        report.error("logging.dir", "Log directory is blank; omit it to disable file logging");
    }
}
