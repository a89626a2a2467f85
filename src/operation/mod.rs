//! Asynchronous operation handles
//!
//! Every session action is submitted as exactly one unit of work to the
//! [`Executor`] and returned to the caller as an [`Operation`] without blocking.

mod executor;
mod handle;
mod sequencer;

pub use executor::Executor;
pub use handle::{Operation, OperationContext, OperationId};
pub use sequencer::{Sequencer, Ticket, Turn};
