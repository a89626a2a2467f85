//! Recognition session management
//!
//! This module provides the `SpeechSession` controller that manages:
//! - The session lifecycle state machine
//! - Engine calls wrapped in asynchronous operations
//! - Translation of engine notifications into typed events
//! - Idempotent disposal that never fires events afterwards

mod config;
mod session;
mod state;
mod stats;
mod translator;

pub use config::SessionConfig;
pub use session::SpeechSession;
pub use state::{Action, ListenMode, SessionState, StateMachine, Transition};
pub use stats::SessionStats;
pub use translator::{
    ErrorNotification, ErrorReason, RecognitionResult, ResultReason, Translated, Translator,
};
