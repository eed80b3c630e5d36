//! Runtime configuration from the environment (a `.env` file is honoured).

use std::path::PathBuf;

use anyhow::{bail, Result};

use crate::ingest::IngestSettings;

pub const DEFAULT_DATA_DIR: &str = "data";
pub const DEFAULT_BIND: &str = "127.0.0.1:8080";
pub const DEFAULT_BRAND: &str = "medbot";
pub const DEFAULT_DEVICE: &str = "medbot-01";

#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding the latest reading, the state and the event log.
    pub data_dir: PathBuf,
    pub bind: String,
    pub ingest: IngestSettings,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let api_key = match var("MEDBOT_API_KEY") {
            Some(key) => key,
            None => bail!("MEDBOT_API_KEY must be set to the device's shared secret"),
        };

        Ok(Config {
            data_dir: var("MEDBOT_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR)),
            bind: var("MEDBOT_BIND").unwrap_or_else(|| DEFAULT_BIND.to_string()),
            ingest: IngestSettings {
                api_key,
                brand: var("MEDBOT_BRAND").unwrap_or_else(|| DEFAULT_BRAND.to_string()),
                default_device: var("MEDBOT_DEFAULT_DEVICE")
                    .unwrap_or_else(|| DEFAULT_DEVICE.to_string()),
            },
        })
    }
}
