use super::names::{OutputFormat, ParameterName, RecognitionMode, RESERVED_PREFIX};
use super::value::ParameterValue;
use crate::error::{Result, SessionError};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use tracing::debug;

/// Typed key/value configuration consumed by a session.
///
/// Recognized names always resolve to a value (their default when unset).
/// Names outside the reserved `SPEECH-` namespace are stored as opaque
/// pass-through values for the engine.
#[derive(Debug, Default)]
pub struct ParameterStore {
    values: RwLock<BTreeMap<String, ParameterValue>>,
}

impl ParameterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a parameter by key
    pub fn get(&self, name: &str) -> Option<ParameterValue> {
        if let Some(known) = ParameterName::from_key(name) {
            return Some(self.get_known(known));
        }
        self.values.read().get(name).cloned()
    }

    pub fn get_known(&self, name: ParameterName) -> ParameterValue {
        self.values
            .read()
            .get(name.key())
            .cloned()
            .unwrap_or_else(|| name.default_value())
    }

    /// String form of a recognized parameter
    pub fn get_string(&self, name: ParameterName) -> String {
        self.get_known(name).to_string()
    }

    /// Set a parameter.
    ///
    /// Fails with [`SessionError::UnsupportedParameter`] for unknown names in
    /// the reserved namespace and [`SessionError::InvalidParameter`] when a
    /// recognized name gets a value of the wrong type.
    pub fn set(&self, name: &str, value: impl Into<ParameterValue>) -> Result<()> {
        let value = value.into();
        self.check(name, &value)?;

        self.values.write().insert(name.to_string(), value);
        Ok(())
    }

    /// Validate a value without storing it
    pub fn check(&self, name: &str, value: &ParameterValue) -> Result<()> {
        match ParameterName::from_key(name) {
            Some(known) => {
                known
                    .validate(value)
                    .map_err(|reason| SessionError::InvalidParameter {
                        name: name.to_string(),
                        reason,
                    })?;
            }
            None if name.starts_with(RESERVED_PREFIX) => {
                return Err(SessionError::UnsupportedParameter(name.to_string()));
            }
            None if name.is_empty() => {
                return Err(SessionError::InvalidArgument(
                    "parameter name must not be empty".to_string(),
                ));
            }
            None => debug!("Passing through engine parameter {}", name),
        }
        Ok(())
    }

    pub fn set_known(&self, name: ParameterName, value: impl Into<ParameterValue>) -> Result<()> {
        self.set(name.key(), value)
    }

    pub fn output_format(&self) -> OutputFormat {
        self.get_string(ParameterName::OutputFormat)
            .parse()
            .unwrap_or_default()
    }

    pub fn recognition_mode(&self) -> RecognitionMode {
        self.get_string(ParameterName::RecognitionMode)
            .parse()
            .unwrap_or_default()
    }

    /// Explicitly set values, keyed by name
    pub fn snapshot(&self) -> BTreeMap<String, ParameterValue> {
        self.values.read().clone()
    }

    pub(crate) fn clear(&self) {
        self.values.write().clear();
    }
}
