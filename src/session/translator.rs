use crate::engine::{RawReason, RawResult};
use crate::params::OutputFormat;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a recognition result was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultReason {
    Recognizing,
    Recognized,
    EndOfDictation,
}

/// Why recognition produced no result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorReason {
    NoMatch,
    Canceled,
}

impl fmt::Display for ErrorReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorReason::NoMatch => f.write_str("no match"),
            ErrorReason::Canceled => f.write_str("canceled"),
        }
    }
}

/// Recognized speech
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognitionResult {
    pub result_id: String,
    pub text: String,
    pub reason: ResultReason,
    pub session_id: String,
    pub offset: u64,
    pub duration: u64,

    /// Engine payload, only kept in detailed output mode
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detailed: Option<serde_json::Value>,
}

/// No-match or canceled outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorNotification {
    pub session_id: String,
    pub reason: ErrorReason,
    pub detail: Option<String>,
    pub offset: u64,
}

/// Classified engine result
#[derive(Debug, Clone, PartialEq)]
pub enum Translated {
    Intermediate(RecognitionResult),
    Final(RecognitionResult),
    Error(ErrorNotification),
    /// Nothing to deliver (e.g. an empty end-of-dictation marker)
    Ignored,
}

/// Converts raw engine results into typed values
#[derive(Debug, Clone, Copy)]
pub struct Translator {
    format: OutputFormat,
}

impl Translator {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn translate(&self, session_id: &str, raw: RawResult) -> Translated {
        match raw.reason {
            RawReason::Recognizing => {
                Translated::Intermediate(self.result(session_id, raw, ResultReason::Recognizing))
            }
            RawReason::Recognized => {
                Translated::Final(self.result(session_id, raw, ResultReason::Recognized))
            }
            RawReason::EndOfDictation if raw.text.trim().is_empty() => Translated::Ignored,
            RawReason::EndOfDictation => {
                Translated::Final(self.result(session_id, raw, ResultReason::EndOfDictation))
            }
            RawReason::NoMatch => Translated::Error(Self::error(session_id, raw, ErrorReason::NoMatch)),
            RawReason::Canceled => {
                Translated::Error(Self::error(session_id, raw, ErrorReason::Canceled))
            }
        }
    }

    fn result(&self, session_id: &str, raw: RawResult, reason: ResultReason) -> RecognitionResult {
        let detailed = match self.format {
            OutputFormat::Detailed => raw.payload.map(|payload| {
                serde_json::from_str(&payload).unwrap_or(serde_json::Value::String(payload))
            }),
            OutputFormat::Simple => None,
        };

        RecognitionResult {
            result_id: raw.result_id,
            text: raw.text,
            reason,
            session_id: session_id.to_string(),
            offset: raw.offset,
            duration: raw.duration,
            detailed,
        }
    }

    fn error(session_id: &str, raw: RawResult, reason: ErrorReason) -> ErrorNotification {
        ErrorNotification {
            session_id: session_id.to_string(),
            reason,
            detail: raw.error_details,
            offset: raw.offset,
        }
    }
}
