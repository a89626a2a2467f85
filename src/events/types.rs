use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Kind of a session lifecycle notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionEventKind {
    Started,
    Stopped,
    SpeechStartDetected,
    SpeechEndDetected,
}

impl fmt::Display for SessionEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionEventKind::Started => "session started",
            SessionEventKind::Stopped => "session stopped",
            SessionEventKind::SpeechStartDetected => "speech start detected",
            SessionEventKind::SpeechEndDetected => "speech end detected",
        };
        f.write_str(name)
    }
}

/// Session lifecycle and speech boundary notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionEvent {
    pub kind: SessionEventKind,

    /// Session identifier assigned by the engine
    pub session_id: String,

    /// Audio stream offset (in engine ticks), for speech boundary events
    pub offset: Option<u64>,

    /// When the notification was delivered
    pub timestamp: DateTime<Utc>,
}

impl SessionEvent {
    pub fn new(kind: SessionEventKind, session_id: impl Into<String>, offset: Option<u64>) -> Self {
        Self {
            kind,
            session_id: session_id.into(),
            offset,
            timestamp: Utc::now(),
        }
    }
}

impl fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (session {})", self.kind, self.session_id)?;
        if let Some(offset) = self.offset {
            write!(f, " at offset {}", offset)?;
        }
        Ok(())
    }
}

/// Activity pushed by a dialog service
#[derive(Debug, Clone, Serialize)]
pub struct ActivityEvent {
    pub session_id: String,

    /// Activity payload; non-JSON payloads are kept as a JSON string
    pub activity: serde_json::Value,

    /// Synthesized audio attached to the activity, if any
    #[serde(skip)]
    pub audio: Option<Arc<[u8]>>,
}
