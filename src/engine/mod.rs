//! Recognition engine interface
//!
//! The session core does not recognize speech itself. It drives an external
//! engine through [`RecognitionEngine`] and receives its notifications through
//! an [`EngineListener`] it registers at construction.
//!
//! Engine calls may block; the session only ever issues them from its
//! background executor.

mod scripted;

use crate::params::ParameterValue;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

pub use scripted::{EngineCall, EngineScript, ScriptStep, ScriptedEngine};

/// Engine classification of a result notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RawReason {
    /// Intermediate hypothesis, more audio is pending
    Recognizing,
    /// Final recognition of an utterance
    Recognized,
    /// End of a dictation segment
    EndOfDictation,
    NoMatch,
    Canceled,
}

impl fmt::Display for RawReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RawReason::Recognizing => "recognizing",
            RawReason::Recognized => "recognized",
            RawReason::EndOfDictation => "end_of_dictation",
            RawReason::NoMatch => "no_match",
            RawReason::Canceled => "canceled",
        };
        f.write_str(name)
    }
}

/// Result payload as delivered by the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawResult {
    #[serde(default)]
    pub result_id: String,

    #[serde(default)]
    pub text: String,

    pub reason: RawReason,

    /// Offset of the utterance in the audio stream (engine ticks)
    #[serde(default)]
    pub offset: u64,

    /// Duration of the utterance (engine ticks)
    #[serde(default)]
    pub duration: u64,

    /// Raw service payload, usually JSON
    #[serde(default)]
    pub payload: Option<String>,

    /// Diagnostic detail for canceled results
    #[serde(default)]
    pub error_details: Option<String>,
}

impl RawResult {
    pub fn new(reason: RawReason, text: impl Into<String>) -> Self {
        Self {
            result_id: String::new(),
            text: text.into(),
            reason,
            offset: 0,
            duration: 0,
            payload: None,
            error_details: None,
        }
    }

    pub fn with_payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    pub fn with_error_details(mut self, details: impl Into<String>) -> Self {
        self.error_details = Some(details.into());
        self
    }

    pub fn with_offset(mut self, offset: u64, duration: u64) -> Self {
        self.offset = offset;
        self.duration = duration;
        self
    }
}

/// Notification callbacks an engine invokes, on a thread of its choosing
pub trait EngineListener: Send + Sync {
    fn session_started(&self, session_id: &str);

    fn session_stopped(&self, session_id: &str);

    fn speech_start_detected(&self, session_id: &str, offset: u64);

    fn speech_end_detected(&self, session_id: &str, offset: u64);

    /// Intermediate, final, no-match and canceled results, told apart by reason
    fn result(&self, session_id: &str, result: RawResult);

    /// Activity pushed by a dialog service
    fn activity_received(&self, session_id: &str, activity: &str, audio: Option<Vec<u8>>);
}

/// Already-configured recognition engine bound to one session.
///
/// Every call may block the calling thread and may fail with an
/// engine-defined error.
pub trait RecognitionEngine: Send + Sync {
    fn connect(&self) -> Result<()>;

    fn disconnect(&self) -> Result<()>;

    /// Recognize a single utterance and return its terminal result
    fn recognize_once(&self) -> Result<RawResult>;

    fn start_continuous_recognition(&self) -> Result<()>;

    fn stop_continuous_recognition(&self) -> Result<()>;

    fn start_keyword_recognition(&self, keyword: &str) -> Result<()>;

    fn stop_keyword_recognition(&self) -> Result<()>;

    /// Send a serialized activity and return the service acknowledgement
    fn send_activity(&self, activity: &str) -> Result<String>;

    fn set_parameter(&self, name: &str, value: &ParameterValue) -> Result<()>;

    fn register_listener(&self, listener: Arc<dyn EngineListener>) -> Result<()>;

    fn unregister_listener(&self) -> Result<()>;

    /// Release the underlying engine resources. Called exactly once.
    fn release(&self) -> Result<()>;
}
