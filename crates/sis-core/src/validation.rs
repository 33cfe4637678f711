//! # Form Validation
//!
//! Field-level validation for submitted forms.
//!
//! A `Validator` cleans raw strings one field at a time and collects every
//! problem into `FormErrors` instead of stopping at the first one, so a
//! re-rendered form can show all messages next to their inputs.
//!
//! Messages follow the wording users of the portal already know
//! ("This field is required.", "Enter a valid date.", ...).

use crate::SisError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Key used for errors that belong to the form as a whole.
pub const NON_FIELD: &str = "__all__";

pub const REQUIRED: &str = "This field is required.";
pub const INVALID_EMAIL: &str = "Enter a valid email address.";
pub const INVALID_DATE: &str = "Enter a valid date.";
pub const INVALID_CHOICE: &str =
    "Select a valid choice. That choice is not one of the available choices.";
pub const INVALID_NUMBER: &str = "Enter a whole number.";

// =============================================================================
// FORM ERRORS
// =============================================================================

/// Messages per field name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormErrors {
    fields: BTreeMap<String, Vec<String>>,
}

impl FormErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a message to a field.
    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.fields
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    /// Attach a message to the form as a whole.
    pub fn add_general(&mut self, message: impl Into<String>) {
        self.add(NON_FIELD, message);
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Messages for one field (empty when the field is valid).
    pub fn field(&self, field: &str) -> &[String] {
        self.fields.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Messages that belong to no single field.
    pub fn general(&self) -> &[String] {
        self.field(NON_FIELD)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }
}

impl fmt::Display for FormErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .fields
            .iter()
            .map(|(field, messages)| format!("{}: {}", field, messages.join(" ")))
            .collect();
        f.write_str(&parts.join("; "))
    }
}

// =============================================================================
// VALIDATOR
// =============================================================================

/// Collects cleaned values and errors for one form submission.
#[derive(Debug, Default)]
pub struct Validator {
    errors: FormErrors,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an error produced by a rule outside this type.
    pub fn error(&mut self, field: &str, message: impl Into<String>) {
        self.errors.add(field, message);
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Errors collected so far.
    pub fn errors(&self) -> &FormErrors {
        &self.errors
    }

    /// `Ok(())` when every field passed, the collected errors otherwise.
    pub fn finish(self) -> Result<(), SisError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(SisError::Validation(self.errors))
        }
    }

    /// Optional free text, trimmed and length-checked.
    pub fn text(&mut self, field: &str, raw: &str, max: usize) -> String {
        let value = raw.trim();
        let count = value.chars().count();
        if count > max {
            self.error(
                field,
                format!(
                    "Ensure this value has at most {} characters (it has {}).",
                    max, count
                ),
            );
        }
        value.to_string()
    }

    /// Required free text.
    pub fn required(&mut self, field: &str, raw: &str, max: usize) -> String {
        if raw.trim().is_empty() {
            self.error(field, REQUIRED);
            return String::new();
        }
        self.text(field, raw, max)
    }

    /// Required email address, lowercased for storage.
    pub fn email(&mut self, field: &str, raw: &str) -> String {
        let value = self.required(field, raw, crate::primitives::MAX_EMAIL_LENGTH);
        if !value.is_empty() && !is_valid_email(&value) {
            self.error(field, INVALID_EMAIL);
        }
        value.to_lowercase()
    }

    /// Required ISO date (`YYYY-MM-DD`).
    pub fn date(&mut self, field: &str, raw: &str) -> Option<NaiveDate> {
        if raw.trim().is_empty() {
            self.error(field, REQUIRED);
            return None;
        }
        self.optional_date(field, raw)
    }

    /// Optional ISO date; blank means `None`.
    pub fn optional_date(&mut self, field: &str, raw: &str) -> Option<NaiveDate> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
            Ok(date) => Some(date),
            Err(_) => {
                self.error(field, INVALID_DATE);
                None
            }
        }
    }

    /// Required choice parsed by `parse`.
    pub fn choice<T>(
        &mut self,
        field: &str,
        raw: &str,
        parse: impl Fn(&str) -> Option<T>,
    ) -> Option<T> {
        if raw.trim().is_empty() {
            self.error(field, REQUIRED);
            return None;
        }
        let parsed = parse(raw);
        if parsed.is_none() {
            self.error(field, INVALID_CHOICE);
        }
        parsed
    }

    /// Required whole number or record id.
    pub fn number<T: FromStr>(&mut self, field: &str, raw: &str) -> Option<T> {
        if raw.trim().is_empty() {
            self.error(field, REQUIRED);
            return None;
        }
        self.optional_number(field, raw)
    }

    /// Optional whole number or record id; blank means `None`.
    pub fn optional_number<T: FromStr>(&mut self, field: &str, raw: &str) -> Option<T> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        match raw.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                self.error(field, INVALID_NUMBER);
                None
            }
        }
    }
}

/// Structural email check: one `@`, a non-empty local part, and a dotted domain.
pub fn is_valid_email(value: &str) -> bool {
    if value.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
}

/// Split a comma-separated list of ids, skipping blanks. Returns `None` if any
/// entry fails to parse.
pub fn parse_id_list<T: FromStr>(raw: &str) -> Option<Vec<T>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse().ok())
        .collect()
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_collects_message() {
        let mut v = Validator::new();
        let value = v.required("full_name", "   ", 10);
        assert!(value.is_empty());
        assert_eq!(v.errors().field("full_name"), [REQUIRED.to_string()]);
    }

    #[test]
    fn test_text_length_limit() {
        let mut v = Validator::new();
        v.text("name", "abcdef", 5);
        assert_eq!(
            v.errors().field("name"),
            ["Ensure this value has at most 5 characters (it has 6).".to_string()]
        );
    }

    #[test]
    fn test_email_is_lowercased() {
        let mut v = Validator::new();
        assert_eq!(v.email("email", " Ali@School.EDU "), "ali@school.edu");
        assert!(v.is_valid());
    }

    #[test]
    fn test_email_rejects_malformed() {
        for bad in ["ali", "ali@", "@school.edu", "ali@school", "a b@x.com", "a@b@c.com"] {
            let mut v = Validator::new();
            v.email("email", bad);
            assert!(!v.is_valid(), "{bad} should be rejected");
        }
    }

    #[test]
    fn test_dates() {
        let mut v = Validator::new();
        assert_eq!(
            v.date("date", "2024-03-01"),
            NaiveDate::from_ymd_opt(2024, 3, 1)
        );
        assert_eq!(v.optional_date("dob", ""), None);
        assert!(v.is_valid());
        assert_eq!(v.date("date", "01/03/2024"), None);
        assert_eq!(v.errors().field("date"), [INVALID_DATE.to_string()]);
    }

    #[test]
    fn test_errors_accumulate() {
        let mut v = Validator::new();
        v.required("a", "", 5);
        v.number::<u32>("b", "x");
        v.choice("c", "nope", crate::Role::parse);
        let err = v.finish().expect_err("three errors");
        assert!(matches!(err, SisError::Validation(ref e) if e.iter().count() == 3));
    }

    #[test]
    fn test_parse_id_list() {
        assert_eq!(parse_id_list::<u64>("1, 2,,3"), Some(vec![1, 2, 3]));
        assert_eq!(parse_id_list::<u64>(""), Some(vec![]));
        assert_eq!(parse_id_list::<u64>("1,x"), None);
    }
}
