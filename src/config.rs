use std::fs;
use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::attendance::ledger::CLASS_NO;
use crate::attendance::status::{default_entries, StatusEntry, StatusVocabulary};

pub const DEFAULT_CONFIG_FILE: &str = "attendance.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("no statuses configured")]
    EmptyVocabulary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage_dir: PathBuf,
    pub counter_column: String,
    pub statuses: Vec<StatusEntry>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            storage_dir: PathBuf::from("students"),
            counter_column: CLASS_NO.to_string(),
            statuses: default_entries(),
        }
    }
}

impl Config {
    /// Loads `path`, or `attendance.toml` in the working directory when no
    /// path is given. A missing default file means default settings; a
    /// missing explicit file is an error.
    pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
        let (path, required) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
        };

        if !required && !path.exists() {
            debug!("no {} found, using defaults", path.display());
            return Ok(Config::default());
        }

        let text = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        Config::parse(&text).map_err(|err| match err {
            ConfigError::Parse { source, .. } => ConfigError::Parse { path, source },
            other => other,
        })
    }

    pub fn parse(text: &str) -> Result<Config, ConfigError> {
        let config: Config = toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: PathBuf::new(),
            source,
        })?;

        if config.statuses.is_empty() {
            return Err(ConfigError::EmptyVocabulary);
        }

        Ok(config)
    }

    pub fn vocabulary(&self) -> StatusVocabulary {
        StatusVocabulary::new(self.statuses.clone())
    }
}
