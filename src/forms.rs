use std::{collections::BTreeMap, sync::LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Pattern an email address must match before we try to store it.
pub static EMAIL_RX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$",
    )
    .expect("email pattern is a valid regex")
});

/// FieldErrors
///
/// Per-field validation messages, keyed by the submitted field name.
/// Serialized as a plain JSON object so clients can attach messages to inputs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    /// First message recorded for `field`, if any.
    pub fn get(&self, field: &str) -> Option<&str> {
        self.0
            .get(field)
            .and_then(|messages| messages.first())
            .map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Validator
///
/// Accumulates field errors across a sequence of checks and converts them into
/// an `AppError::Validation` at the end. Checks on a field that already failed
/// `required` are skipped so each field reports its most relevant message.
#[derive(Debug, Default)]
pub struct Validator {
    errors: FieldErrors,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    fn failed(&self, field: &str) -> bool {
        self.errors.get(field).is_some()
    }

    pub fn required(&mut self, field: &str, value: &str) -> &mut Self {
        if value.trim().is_empty() {
            self.errors.add(field, "This field cannot be blank");
        }
        self
    }

    pub fn max_length(&mut self, field: &str, value: &str, max: usize) -> &mut Self {
        if !self.failed(field) && value.chars().count() > max {
            self.errors
                .add(field, format!("This field is too long (maximum is {max} characters)"));
        }
        self
    }

    pub fn min_length(&mut self, field: &str, value: &str, min: usize) -> &mut Self {
        if !self.failed(field) && value.chars().count() < min {
            self.errors
                .add(field, format!("This field is too short (minimum is {min} characters)"));
        }
        self
    }

    pub fn matches_pattern(&mut self, field: &str, value: &str, pattern: &Regex) -> &mut Self {
        if !self.failed(field) && !pattern.is_match(value) {
            self.errors.add(field, "This field is invalid");
        }
        self
    }

    pub fn permitted_values(&mut self, field: &str, value: &str, permitted: &[&str]) -> &mut Self {
        if !self.failed(field) && !permitted.contains(&value) {
            self.errors.add(field, "This field is invalid");
        }
        self
    }

    pub fn finish(&mut self) -> Result<(), AppError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(AppError::Validation(std::mem::take(&mut self.errors)))
        }
    }
}
