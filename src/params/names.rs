use super::value::{ParameterKind, ParameterValue};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Prefix shared by every parameter name the session reserves
pub const RESERVED_PREFIX: &str = "SPEECH-";

/// Configuration names recognized by the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParameterName {
    RecognitionLanguage,
    DeploymentId,
    OutputFormat,
    RecognitionMode,
    InitialSilenceTimeoutMs,
    LogFilename,
}

impl ParameterName {
    pub const ALL: [ParameterName; 6] = [
        ParameterName::RecognitionLanguage,
        ParameterName::DeploymentId,
        ParameterName::OutputFormat,
        ParameterName::RecognitionMode,
        ParameterName::InitialSilenceTimeoutMs,
        ParameterName::LogFilename,
    ];

    /// String key used by the engine's parameter surface
    pub fn key(self) -> &'static str {
        match self {
            ParameterName::RecognitionLanguage => "SPEECH-RecoLanguage",
            ParameterName::DeploymentId => "SPEECH-ModelId",
            ParameterName::OutputFormat => "SPEECH-OutputFormat",
            ParameterName::RecognitionMode => "SPEECH-RecoMode",
            ParameterName::InitialSilenceTimeoutMs => "SPEECH-InitialSilenceTimeoutMs",
            ParameterName::LogFilename => "SPEECH-LogFilename",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|name| name.key() == key)
    }

    pub fn kind(self) -> ParameterKind {
        match self {
            ParameterName::InitialSilenceTimeoutMs => ParameterKind::Number,
            _ => ParameterKind::String,
        }
    }

    /// Value reported when the parameter was never set
    pub fn default_value(self) -> ParameterValue {
        match self {
            ParameterName::RecognitionLanguage => "en-US".into(),
            ParameterName::DeploymentId => "".into(),
            ParameterName::OutputFormat => OutputFormat::Simple.as_str().into(),
            ParameterName::RecognitionMode => RecognitionMode::Interactive.as_str().into(),
            ParameterName::InitialSilenceTimeoutMs => 5000i64.into(),
            ParameterName::LogFilename => "".into(),
        }
    }

    /// Check a value against the parameter's kind and allowed values
    pub(crate) fn validate(self, value: &ParameterValue) -> Result<(), String> {
        if value.kind() != self.kind() {
            return Err(format!("expected {}, got {}", self.kind(), value.kind()));
        }

        match (self, value) {
            (ParameterName::OutputFormat, ParameterValue::String(s)) => {
                s.parse::<OutputFormat>().map(|_| ())
            }
            (ParameterName::RecognitionMode, ParameterValue::String(s)) => {
                s.parse::<RecognitionMode>().map(|_| ())
            }
            (ParameterName::InitialSilenceTimeoutMs, ParameterValue::Number(n)) if *n < 0 => {
                Err("timeout must not be negative".to_string())
            }
            _ => Ok(()),
        }
    }
}

impl fmt::Display for ParameterName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Amount of detail kept in recognition results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Recognized text and reason only
    #[default]
    Simple,
    /// Additionally keeps the engine's raw result payload
    Detailed,
}

impl OutputFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            OutputFormat::Simple => "simple",
            OutputFormat::Detailed => "detailed",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "simple" => Ok(OutputFormat::Simple),
            "detailed" => Ok(OutputFormat::Detailed),
            other => Err(format!("unknown output format '{}'", other)),
        }
    }
}

/// Recognition mode requested from the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecognitionMode {
    /// Short single-utterance interaction
    #[default]
    Interactive,
    /// Long-running conversational listening
    Conversation,
    /// Free-form dictation, ends with an end-of-dictation result
    Dictation,
}

impl RecognitionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            RecognitionMode::Interactive => "INTERACTIVE",
            RecognitionMode::Conversation => "CONVERSATION",
            RecognitionMode::Dictation => "DICTATION",
        }
    }
}

impl FromStr for RecognitionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "INTERACTIVE" => Ok(RecognitionMode::Interactive),
            "CONVERSATION" => Ok(RecognitionMode::Conversation),
            "DICTATION" => Ok(RecognitionMode::Dictation),
            other => Err(format!("unknown recognition mode '{}'", other)),
        }
    }
}
