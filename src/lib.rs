pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod operation;
pub mod params;
pub mod session;

pub use config::Config;
pub use engine::{
    EngineListener, EngineScript, RawReason, RawResult, RecognitionEngine, ScriptStep,
    ScriptedEngine,
};
pub use error::{Result, SessionError};
pub use events::{ActivityEvent, EventChannel, SessionEvent, SessionEventKind, SubscriptionToken};
pub use operation::{Operation, OperationId};
pub use params::{OutputFormat, ParameterName, ParameterValue, RecognitionMode};
pub use session::{
    ErrorNotification, ErrorReason, RecognitionResult, ResultReason, SessionConfig, SessionState,
    SessionStats, SpeechSession,
};
