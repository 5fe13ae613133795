use std::{collections::BTreeMap, fmt};

use serde::Serialize;
use ts_rs::TS;

/// Field-level input errors, reported to clients as `error_data.fields`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, TS)]
pub struct ValidationErrors {
    pub fields: BTreeMap<String, String>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    /// Keeps the first message recorded for a field.
    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.fields
            .entry(field.to_string())
            .or_insert_with(|| message.into());
    }

    pub fn check(&mut self, ok: bool, field: &str, message: impl Into<String>) {
        if !ok {
            self.add(field, message);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .fields
            .iter()
            .map(|(field, message)| format!("{field}: {message}"))
            .collect();
        write!(f, "{}", parts.join("; "))
    }
}

impl std::error::Error for ValidationErrors {}

/// Trimmed, non-empty text or a field error.
pub fn required_text(errors: &mut ValidationErrors, field: &str, value: &str, max_len: usize) {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        errors.add(field, "is required");
    } else if trimmed.chars().count() > max_len {
        errors.add(field, format!("must be at most {max_len} characters"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_message_wins_and_display_joins() {
        let mut errors = ValidationErrors::new();
        errors.check(false, "title", "is required");
        errors.check(false, "title", "is too long");
        errors.check(true, "goal", "unused");
        errors.add("amount_cents", "must be positive");
        assert_eq!(errors.fields.len(), 2);
        assert_eq!(errors.to_string(), "amount_cents: must be positive; title: is required");
        assert!(errors.into_result().is_err());
    }

    #[test]
    fn required_text_checks_blank_and_length() {
        let mut errors = ValidationErrors::new();
        required_text(&mut errors, "name", "   ", 10);
        required_text(&mut errors, "title", "abcdefghijk", 10);
        required_text(&mut errors, "summary", "fine", 10);
        assert_eq!(errors.fields.get("name").map(String::as_str), Some("is required"));
        assert!(errors.fields.contains_key("title"));
        assert!(!errors.fields.contains_key("summary"));
    }
}
