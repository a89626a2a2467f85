//! Session parameters
//!
//! A closed set of recognized configuration names with typed values and
//! defaults, plus pass-through storage for engine-specific names.

mod names;
mod store;
mod value;

pub use names::{OutputFormat, ParameterName, RecognitionMode, RESERVED_PREFIX};
pub use store::ParameterStore;
pub use value::{ParameterKind, ParameterValue};
