//! Typed event channels
//!
//! One [`EventChannel`] exists per event category so subscribers opt into
//! only the notifications they care about. Delivery is guarded by a
//! [`DispatchGate`] owned by the session.

mod channel;
mod gate;
mod types;

pub use channel::{EventCategory, EventChannel, SubscriptionToken};
pub use gate::{DispatchGate, GateGuard};
pub use types::{ActivityEvent, SessionEvent, SessionEventKind};
