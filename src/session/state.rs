use crate::error::{Result, SessionError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Connecting,
    Listening,
    /// Sub-state of `Listening` while an utterance is being recognized
    Recognizing,
    Stopping,
    /// Waiting for the keyword before promoting to `Listening`
    KeywordArmed,
    Disposed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Connecting => "connecting",
            SessionState::Listening => "listening",
            SessionState::Recognizing => "recognizing",
            SessionState::Stopping => "stopping",
            SessionState::KeywordArmed => "keyword armed",
            SessionState::Disposed => "disposed",
        };
        f.write_str(name)
    }
}

/// Kind of listening activity in progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListenMode {
    Once,
    Continuous,
    Keyword,
}

/// Public session action, as seen by the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    RecognizeOnce,
    StartContinuous,
    StopContinuous,
    StartKeyword,
    StopKeyword,
    Connect,
    Disconnect,
    SendActivity,
}

impl Action {
    /// Operation name used for logging
    pub fn name(self) -> &'static str {
        match self {
            Action::RecognizeOnce => "recognize_once",
            Action::StartContinuous => "start_continuous_recognition",
            Action::StopContinuous => "stop_continuous_recognition",
            Action::StartKeyword => "start_keyword_recognition",
            Action::StopKeyword => "stop_keyword_recognition",
            Action::Connect => "connect",
            Action::Disconnect => "disconnect",
            Action::SendActivity => "send_activity",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Transition accepted by [`StateMachine::begin`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: SessionState,
    pub to: SessionState,
    pub mode: Option<ListenMode>,
}

/// Session state plus the listening mode that produced it
#[derive(Debug, Clone)]
pub struct StateMachine {
    state: SessionState,
    mode: Option<ListenMode>,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            state: SessionState::Idle,
            mode: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn mode(&self) -> Option<ListenMode> {
        self.mode
    }

    pub fn is_disposed(&self) -> bool {
        self.state == SessionState::Disposed
    }

    /// Validate an action against the current state and apply its first transition
    pub fn begin(&mut self, action: Action) -> Result<Transition> {
        use SessionState::*;

        if self.state == Disposed {
            return Err(SessionError::Closed);
        }

        let from = self.state;
        let (to, mode) = match (action, from, self.mode) {
            (Action::RecognizeOnce, Idle, _) => (Connecting, Some(ListenMode::Once)),
            (Action::StartContinuous, Idle, _) => (Connecting, Some(ListenMode::Continuous)),
            (Action::StartKeyword, Idle, _) => (Connecting, Some(ListenMode::Keyword)),
            (Action::Connect, Idle, _) => (Connecting, None),
            (Action::Disconnect, Idle, _) => (Stopping, None),
            (
                Action::StopContinuous,
                Connecting | Listening | Recognizing,
                Some(ListenMode::Continuous),
            ) => (Stopping, self.mode),
            (
                Action::StopKeyword,
                Connecting | KeywordArmed | Listening | Recognizing,
                Some(ListenMode::Keyword),
            ) => (Stopping, self.mode),
            (Action::SendActivity, state, mode) => (state, mode),
            (action, state, _) => return Err(SessionError::InvalidState { action, state }),
        };

        self.state = to;
        self.mode = mode;
        Ok(Transition { from, to, mode })
    }

    /// Recognize-once has reached the engine
    pub fn enter_listening(&mut self) {
        if self.state == SessionState::Connecting {
            self.state = SessionState::Listening;
        }
    }

    /// A start call returned successfully
    pub fn complete_start(&mut self) {
        if self.state == SessionState::Connecting {
            self.state = self.started_state();
        }
    }

    fn started_state(&self) -> SessionState {
        match self.mode {
            Some(ListenMode::Keyword) => SessionState::KeywordArmed,
            Some(_) => SessionState::Listening,
            None => SessionState::Idle,
        }
    }

    /// Return to `Idle`, unless the session was disposed meanwhile
    pub fn finish(&mut self) {
        if self.state != SessionState::Disposed {
            self.state = SessionState::Idle;
            self.mode = None;
        }
    }

    /// Undo a failed stop: listening carries on.
    ///
    /// A stop accepted while connecting only runs after the start call
    /// succeeded, so that case resumes in the started state.
    pub fn abort_stop(&mut self, previous: SessionState) {
        if self.state != SessionState::Stopping {
            return;
        }
        self.state = match previous {
            SessionState::Connecting => self.started_state(),
            other => other,
        };
    }

    /// Speech detected; promotes an armed keyword session
    pub fn on_speech_start(&mut self) {
        if matches!(self.state, SessionState::KeywordArmed | SessionState::Connecting)
            && self.mode.is_some()
        {
            self.state = SessionState::Listening;
        }
    }

    /// Intermediate result activity
    pub fn on_intermediate(&mut self) {
        if matches!(
            self.state,
            SessionState::Connecting | SessionState::Listening | SessionState::KeywordArmed
        ) && self.mode.is_some()
        {
            self.state = SessionState::Recognizing;
        }
    }

    /// Final or terminal result; keyword sessions re-arm
    pub fn on_utterance_end(&mut self) {
        if !matches!(
            self.state,
            SessionState::Connecting
                | SessionState::Listening
                | SessionState::Recognizing
                | SessionState::KeywordArmed
        ) {
            return;
        }
        self.state = match self.mode {
            Some(ListenMode::Keyword) => SessionState::KeywordArmed,
            Some(_) => SessionState::Listening,
            None => self.state,
        };
    }

    /// Enter the terminal state. Returns `false` if already disposed.
    pub fn dispose(&mut self) -> bool {
        if self.state == SessionState::Disposed {
            return false;
        }
        self.state = SessionState::Disposed;
        self.mode = None;
        true
    }
}
