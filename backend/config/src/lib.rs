//! `banter-config`: runtime configuration for the Banter bot.
//!
//! - Typed YAML schema (matcher/dialog options, logging)
//! - Default value application
//! - Validation with a report of errors and warnings

pub mod defaults;
pub mod io;
pub mod schema;
pub mod validation;

pub use defaults::apply_all_defaults;
pub use io::{config_dir, config_file_path, load_config};
pub use schema::{BanterConfig, InvalidAnswerPolicy, LoggingConfig, NlcConfig};
pub use validation::{validate, ConfigValidationError, ValidationReport};

use std::path::Path;

use anyhow::Result;

/// Overrides `logging.level` when set.
pub const LOG_LEVEL_ENV: &str = "BANTER_LOG_LEVEL";

/// Load a config file, apply defaults and the log level override, and
/// validate it. Invalid configs are returned together with their report so
/// the caller decides whether to refuse them.
pub async fn load_and_prepare(path: &Path) -> Result<(BanterConfig, ValidationReport)> {
    let config = load_config(path).await?;
    let level_override = std::env::var(LOG_LEVEL_ENV).ok().filter(|l| !l.trim().is_empty());
    Ok(prepare(config, level_override))
}

/// Validation sees the file as written; defaults fill in afterwards.
fn prepare(mut config: BanterConfig, level_override: Option<String>) -> (BanterConfig, ValidationReport) {
    if let Some(level) = level_override {
        config.logging.get_or_insert_with(LoggingConfig::default).level = Some(level);
    }

    let report = validate(&config);
    let config = apply_all_defaults(config);
    for warning in &report.warnings {
        tracing::warn!(path = %warning.path, message = %warning.message, "Config warning");
    }
    for error in &report.errors {
        tracing::error!(path = %error.path, message = %error.message, "Config error");
    }
    (config, report)
}
