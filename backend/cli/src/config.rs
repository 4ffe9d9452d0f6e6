use std::path::{Path, PathBuf};

use banter_config::{BanterConfig, config_dir, config_file_path};
use banter_config::defaults::DEFAULT_LOG_LEVEL;
use banter_nlc::DialogOptions;

/// Runtime settings for the `banter` binary, derived from the loaded config.
#[derive(Debug, Clone)]
pub struct Settings {
    pub log_level: String,
    pub log_dir: Option<PathBuf>,
    pub log_json: bool,
    pub dialog: DialogOptions,
}

impl Settings {
    pub fn from_config(config: &BanterConfig) -> Self {
        let logging = config.logging.clone().unwrap_or_default();
        Self {
            log_level: logging.level.unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
            log_dir: logging.dir.map(PathBuf::from),
            log_json: logging.json.unwrap_or(false),
            dialog: config.nlc.as_ref().map(DialogOptions::from).unwrap_or_default(),
        }
    }
}

/// `--config` if given, else `config.yaml` in the config directory.
pub fn resolve_config_path(arg: Option<&Path>) -> PathBuf {
    match arg {
        Some(path) => path.to_path_buf(),
        None => config_file_path(&config_dir()),
    }
}
