use crate::session::SessionConfig;
use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Application configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub session: SessionConfig,
}

impl Config {
    /// Load configuration from a file, with `SPEECH_SESSION__*` environment overrides
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("SPEECH_SESSION").separator("__"))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}
