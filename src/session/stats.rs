use super::state::SessionState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Statistics about a recognition session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    /// Current lifecycle state
    pub state: SessionState,

    /// Last session identifier assigned by the engine
    pub session_id: Option<String>,

    /// When the session was created
    pub created_at: DateTime<Utc>,

    /// Seconds since creation
    pub age_secs: f64,

    /// Session lifecycle and speech boundary events delivered
    pub session_events: usize,

    /// Intermediate results delivered
    pub intermediate_results: usize,

    /// Final results delivered
    pub final_results: usize,

    /// Error notifications delivered
    pub errors: usize,

    /// Notifications dropped because the session was disposed
    pub dropped_notifications: usize,
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub session_events: AtomicUsize,
    pub intermediate_results: AtomicUsize,
    pub final_results: AtomicUsize,
    pub errors: AtomicUsize,
    pub dropped_notifications: AtomicUsize,
}

impl Counters {
    pub fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::SeqCst);
    }

    pub fn snapshot(
        &self,
        state: SessionState,
        session_id: Option<String>,
        created_at: DateTime<Utc>,
    ) -> SessionStats {
        let age = Utc::now().signed_duration_since(created_at);

        SessionStats {
            state,
            session_id,
            created_at,
            age_secs: age.num_milliseconds() as f64 / 1000.0,
            session_events: self.session_events.load(Ordering::SeqCst),
            intermediate_results: self.intermediate_results.load(Ordering::SeqCst),
            final_results: self.final_results.load(Ordering::SeqCst),
            errors: self.errors.load(Ordering::SeqCst),
            dropped_notifications: self.dropped_notifications.load(Ordering::SeqCst),
        }
    }
}
