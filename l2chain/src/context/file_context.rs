//! The per-file context passed through the stage chain.

use super::{FieldContract, FieldStore, FieldValue};
use crate::core::{ContextStatus, FileId, InstrumentMode, Outcome};
use crate::errors::FieldError;
use std::sync::Arc;

#[derive(Debug, Clone)]
struct ActiveStage {
    name: String,
    contract: Arc<FieldContract>,
}

/// Mutable record for one input file.
///
/// Created by the orchestrator right before the first stage runs and owned
/// by exactly one worker until the chain reaches a terminal outcome.
///
/// While a stage runs, the chain registers that stage's [`FieldContract`]; with
/// enforcement on, reads and writes outside the contract fail with a
/// [`FieldError`].
#[derive(Debug, Clone)]
pub struct FileContext {
    file: FileId,
    fields: FieldStore,
    status: ContextStatus,
    outcome: Option<Outcome>,
    active: Option<ActiveStage>,
    enforce_contracts: bool,
}

impl FileContext {
    /// Creates a running context for a file with an empty field store.
    #[must_use]
    pub fn new(file: FileId) -> Self {
        Self {
            file,
            fields: FieldStore::new(),
            status: ContextStatus::Running,
            outcome: None,
            active: None,
            enforce_contracts: true,
        }
    }

    /// Seeds a field before the chain runs.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(key, value.into(), "");
        self
    }

    /// Turns runtime contract enforcement on or off.
    #[must_use]
    pub fn with_contract_enforcement(mut self, enforce: bool) -> Self {
        self.enforce_contracts = enforce;
        self
    }

    /// Returns the file identifier.
    #[must_use]
    pub fn file(&self) -> &FileId {
        &self.file
    }

    /// Returns the instrument mode from the file identity, if known.
    #[must_use]
    pub fn mode(&self) -> Option<InstrumentMode> {
        self.file.mode
    }

    /// Returns the lifecycle status.
    #[must_use]
    pub fn status(&self) -> &ContextStatus {
        &self.status
    }

    /// Returns the terminal outcome once the chain has finished.
    #[must_use]
    pub fn outcome(&self) -> Option<&Outcome> {
        self.outcome.as_ref()
    }

    /// Returns the field store.
    #[must_use]
    pub fn fields(&self) -> &FieldStore {
        &self.fields
    }

    /// Returns the name of the stage currently running, if any.
    #[must_use]
    pub fn active_stage(&self) -> Option<&str> {
        self.active.as_ref().map(|a| a.name.as_str())
    }

    /// Checks if a field is present. Not subject to contract checks.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// Reads a required field.
    ///
    /// # Errors
    ///
    /// Returns `FieldError::UndeclaredRead` if the running stage did not
    /// declare the key, or `FieldError::Missing` if it was never written.
    pub fn get(&self, key: &str) -> Result<&FieldValue, FieldError> {
        self.check_read(key)?;
        self.fields.get(key).ok_or_else(|| FieldError::Missing {
            key: key.to_string(),
        })
    }

    /// Reads a field that may be absent.
    ///
    /// # Errors
    ///
    /// Returns `FieldError::UndeclaredRead` if the running stage did not
    /// declare the key.
    pub fn get_optional(&self, key: &str) -> Result<Option<&FieldValue>, FieldError> {
        self.check_read(key)?;
        Ok(self.fields.get(key))
    }

    /// Reads a boolean scalar.
    pub fn get_bool(&self, key: &str) -> Result<bool, FieldError> {
        let value = self.get(key)?;
        value.as_bool().ok_or_else(|| mismatch(key, "bool", value))
    }

    /// Reads an integer scalar.
    pub fn get_int(&self, key: &str) -> Result<i64, FieldError> {
        let value = self.get(key)?;
        value.as_int().ok_or_else(|| mismatch(key, "int", value))
    }

    /// Reads a float scalar (integers are widened).
    pub fn get_float(&self, key: &str) -> Result<f64, FieldError> {
        let value = self.get(key)?;
        value.as_float().ok_or_else(|| mismatch(key, "float", value))
    }

    /// Reads a string.
    pub fn get_text(&self, key: &str) -> Result<&str, FieldError> {
        let value = self.get(key)?;
        value.as_text().ok_or_else(|| mismatch(key, "text", value))
    }

    /// Reads a boolean array.
    pub fn get_bool_array(&self, key: &str) -> Result<&[bool], FieldError> {
        let value = self.get(key)?;
        value.as_bool_array().ok_or_else(|| mismatch(key, "bool_array", value))
    }

    /// Reads an integer array.
    pub fn get_int_array(&self, key: &str) -> Result<&[i64], FieldError> {
        let value = self.get(key)?;
        value.as_int_array().ok_or_else(|| mismatch(key, "int_array", value))
    }

    /// Reads a float array.
    pub fn get_float_array(&self, key: &str) -> Result<&[f64], FieldError> {
        let value = self.get(key)?;
        value.as_float_array().ok_or_else(|| mismatch(key, "float_array", value))
    }

    /// Writes a field, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns `FieldError::UndeclaredWrite` if the running stage did not
    /// declare the key.
    pub fn put(&mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Result<(), FieldError> {
        let key = key.into();
        let writer = match &self.active {
            Some(active) => {
                if self.enforce_contracts && !active.contract.allows_write(&key) {
                    return Err(FieldError::UndeclaredWrite {
                        stage: active.name.clone(),
                        key,
                    });
                }
                active.name.clone()
            }
            None => String::new(),
        };
        self.fields.insert(key, value.into(), writer);
        Ok(())
    }

    /// Returns a fingerprint of the current field mapping.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        self.fields.fingerprint()
    }

    pub(crate) fn enter_stage(&mut self, name: &str, contract: Arc<FieldContract>) {
        self.active = Some(ActiveStage {
            name: name.to_string(),
            contract,
        });
    }

    pub(crate) fn leave_stage(&mut self) {
        self.active = None;
    }

    /// Attaches the terminal outcome. The first outcome wins.
    pub(crate) fn finish(&mut self, outcome: Outcome) -> bool {
        if self.outcome.is_some() {
            return false;
        }
        self.active = None;
        self.status = ContextStatus::from(&outcome);
        self.outcome = Some(outcome);
        true
    }

    fn check_read(&self, key: &str) -> Result<(), FieldError> {
        if let Some(active) = &self.active {
            if self.enforce_contracts && !active.contract.allows_read(key) {
                return Err(FieldError::UndeclaredRead {
                    stage: active.name.clone(),
                    key: key.to_string(),
                });
            }
        }
        Ok(())
    }
}

fn mismatch(key: &str, expected: &'static str, actual: &FieldValue) -> FieldError {
    FieldError::TypeMismatch {
        key: key.to_string(),
        expected,
        actual: actual.type_name(),
    }
}
