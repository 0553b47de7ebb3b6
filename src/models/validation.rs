use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Maximum length of entity names.
pub const NAME_MAX_LEN: usize = 200;
/// Maximum length of PBI and task descriptions.
pub const DESCRIPTION_MAX_LEN: usize = 500;

/// Field-level validation failures for a submitted form.
///
/// Serializes as `{"errors": {"field": ["message", ...]}}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationErrors {
    errors: BTreeMap<String, Vec<String>>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convenience constructor for a single failing field.
    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.errors
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn field(&self, field: &str) -> Option<&[String]> {
        self.errors.get(field).map(Vec::as_slice)
    }

    /// `Ok(value)` when nothing was recorded, otherwise `Err(self)`.
    pub fn into_result<T>(self, value: T) -> Result<T, Self> {
        if self.is_empty() {
            Ok(value)
        } else {
            Err(self)
        }
    }

    pub fn check_name(&mut self, field: &str, value: &str) {
        if value.trim().is_empty() {
            self.add(field, "This field is required.");
        } else if value.chars().count() > NAME_MAX_LEN {
            self.add(
                field,
                format!("Ensure this value has at most {} characters.", NAME_MAX_LEN),
            );
        }
    }

    pub fn check_description(&mut self, field: &str, value: &str) {
        if value.chars().count() > DESCRIPTION_MAX_LEN {
            self.add(
                field,
                format!(
                    "Ensure this value has at most {} characters.",
                    DESCRIPTION_MAX_LEN
                ),
            );
        }
    }
}

/// Description of one input field of a form, for clients that render it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormField {
    pub name: String,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    /// Allowed values; empty for free-form fields.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<String>,
}

impl FormField {
    pub fn text(name: &str, max_length: usize) -> Self {
        Self {
            name: name.to_string(),
            required: true,
            max_length: Some(max_length),
            choices: Vec::new(),
        }
    }

    pub fn choice(name: &str, choices: impl IntoIterator<Item = &'static str>) -> Self {
        Self {
            name: name.to_string(),
            required: false,
            max_length: None,
            choices: choices.into_iter().map(String::from).collect(),
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .errors
            .iter()
            .map(|(field, messages)| format!("{}: {}", field, messages.join(" ")))
            .collect();
        write!(f, "validation failed ({})", parts.join("; "))
    }
}

impl std::error::Error for ValidationErrors {}
