use crate::params::{OutputFormat, ParameterValue, RecognitionMode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Configuration for a recognition session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Spoken language of recognition (e.g., "en-US")
    pub language: String,

    /// Deployment id of a customized speech model; empty for the base model
    pub deployment_id: String,

    /// Output format of recognition results
    pub output_format: OutputFormat,

    /// Recognition mode; dictation is kept for every action
    pub recognition_mode: RecognitionMode,

    /// Async worker threads of the background executor
    pub worker_threads: usize,

    /// Maximum number of work units (engine calls) running at once
    pub max_blocking_threads: usize,

    /// Extra engine parameters, passed through by name
    pub parameters: BTreeMap<String, ParameterValue>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            language: "en-US".to_string(),
            deployment_id: String::new(),
            output_format: OutputFormat::Simple,
            recognition_mode: RecognitionMode::Interactive,
            worker_threads: 1,
            max_blocking_threads: 8,
            parameters: BTreeMap::new(),
        }
    }
}
