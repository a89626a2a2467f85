//! Error taxonomy for the session core.
//!
//! ```text
//! SessionError
//! ├── InvalidState         -- action not permitted in the current state
//! ├── Closed               -- session already disposed
//! ├── Cancelled            -- operation cancelled before it started
//! ├── InvalidArgument      -- bad caller input (e.g. empty keyword)
//! ├── UnsupportedParameter -- reserved parameter name that is not recognized
//! ├── InvalidParameter     -- recognized parameter, wrong type or value
//! ├── Engine               -- the recognition engine call failed
//! ├── NotRecognized        -- recognize-once ended with no-match/canceled
//! └── Runtime              -- the background executor could not be started
//! ```
//!
//! State, argument, parameter and closed errors are returned synchronously by
//! the action methods. Engine failures and `NotRecognized` only surface through
//! an [`Operation`](crate::operation::Operation) outcome.

use std::sync::Arc;

use thiserror::Error;

use crate::session::{Action, ErrorNotification, SessionState};

pub type Result<T> = std::result::Result<T, SessionError>;

/// The error type for every public session operation.
///
/// Cloneable so a single operation outcome can be handed to several waiters.
#[derive(Error, Debug, Clone)]
pub enum SessionError {
    #[error("invalid session state: cannot {action} while {state}")]
    InvalidState {
        action: Action,
        state: SessionState,
    },

    #[error("session closed")]
    Closed,

    #[error("operation cancelled")]
    Cancelled,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unsupported parameter: {0}")]
    UnsupportedParameter(String),

    #[error("invalid value for parameter {name}: {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("engine error: {0:#}")]
    Engine(Arc<anyhow::Error>),

    #[error("speech not recognized: {}", .0.reason)]
    NotRecognized(ErrorNotification),

    #[error("session executor unavailable: {0}")]
    Runtime(String),
}

impl SessionError {
    pub(crate) fn engine(err: anyhow::Error) -> Self {
        SessionError::Engine(Arc::new(err))
    }

    /// Whether this error came from the state machine rejecting an action.
    pub fn is_state_error(&self) -> bool {
        matches!(self, SessionError::InvalidState { .. })
    }
}
