use failure::Fail;
use log::LevelFilter;
use serde::Deserialize;
use std::{collections::HashMap, fs, path::PathBuf};

use crate::utils::SingleInit;

static CONFIG: SingleInit<Config> = SingleInit::uninit();

pub fn load() -> crate::Result<&'static Config> {
    CONFIG.get_or_try_init(|| {
        let data = fs::read("config.toml").map_err(ReadConfigurationError)?;
        toml::from_slice(&data).map_err(|e| ConfigurationError(e).into())
    })
}

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    pub database: Database,
    pub storage: Storage,
    #[serde(default)]
    pub logging: Logging,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Database {
    /// Database connection URL.
    pub url: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Storage {
    /// Directory in which uploaded files are kept.
    pub path: PathBuf,
}

/// Logging configuration.
#[derive(Clone, Debug, Deserialize)]
pub struct Logging {
    /// Default logging level.
    #[serde(default = "default_level_filter")]
    pub level: LevelFilter,
    /// Custom filters.
    #[serde(default)]
    pub filters: HashMap<String, LevelFilter>,
}

#[derive(Debug, Fail)]
#[fail(display = "Cannot read configuration file")]
pub struct ReadConfigurationError(#[fail(cause)] std::io::Error);

#[derive(Debug, Fail)]
#[fail(display = "Invalid configuration: {}", _0)]
pub struct ConfigurationError(#[fail(cause)] toml::de::Error);

fn default_level_filter() -> LevelFilter {
    LevelFilter::Info
}

impl Default for Logging {
    fn default() -> Self {
        Logging {
            level: default_level_filter(),
            filters: HashMap::new(),
        }
    }
}
