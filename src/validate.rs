use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer};
use serde_json::json;
use validator::{Validate, ValidationErrors};

use crate::{AppError, AppResult};

/// Field-level validation messages, rendered as `{"field": ["message", ...]}`.
#[derive(Debug, Default)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs the derived rules of `body`. Checks that need the database go on top.
    pub fn of(body: &impl Validate) -> Self {
        match body.validate() {
            Ok(()) => Self::new(),
            Err(errors) => errors.into(),
        }
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0.entry(field.to_owned()).or_default().push(message.into());
    }

    pub fn has(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Turns collected messages into a 400 envelope carrying `message`.
    pub fn check(self, message: &str) -> AppResult<()> {
        if self.0.is_empty() {
            return Ok(());
        }
        Err(AppError::bad_request(message).with_data(json!(self.0)))
    }
}

impl From<ValidationErrors> for FieldErrors {
    fn from(errors: ValidationErrors) -> Self {
        let mut fields = Self::new();
        for (field, errs) in errors.field_errors() {
            for err in errs {
                let message = err.message.clone().unwrap_or_else(|| err.code.clone());
                fields.add(&field, message);
            }
        }
        fields
    }
}

/// Trims a string field; blank input reads as absent.
pub fn trimmed<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?
        .map(|s| s.trim().to_owned())
        .filter(|s| !s.is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize, Validate)]
    struct Form {
        #[serde(default, deserialize_with = "trimmed")]
        #[validate(required(message = "This field is required."), email(message = "Enter a valid email address."))]
        email: Option<String>,
        #[validate(range(min = 1, max = 10, message = "Out of range."))]
        count: Option<i64>,
    }

    fn errors_for(body: serde_json::Value) -> serde_json::Value {
        let form: Form = serde_json::from_value(body).unwrap();
        match FieldErrors::of(&form).check("Failed") {
            Ok(()) => json!({}),
            Err(AppError::Api { data, .. }) => data,
            Err(other) => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn blank_strings_are_missing() {
        assert_eq!(errors_for(json!({"email": "   "}))["email"][0], "This field is required.");
        assert_eq!(errors_for(json!({}))["email"][0], "This field is required.");
    }

    #[test]
    fn derived_rules_become_field_messages() {
        let data = errors_for(json!({"email": "a b@c", "count": 11}));
        assert_eq!(data["email"], json!(["Enter a valid email address."]));
        assert_eq!(data["count"], json!(["Out of range."]));
        assert_eq!(errors_for(json!({"email": " a@b.co ", "count": 3})), json!({}));
    }

    #[test]
    fn domain_checks_stack_on_derived_ones() {
        let form: Form = serde_json::from_value(json!({"email": "x"})).unwrap();
        let mut errors = FieldErrors::of(&form);
        errors.add("password", "Passwords do not match.");
        assert!(errors.has("email"));
        let err = errors.check("Signup failed.").unwrap_err();
        match err {
            AppError::Api { data, .. } => assert_eq!(data["password"][0], "Passwords do not match."),
            other => panic!("unexpected {other:?}"),
        }
    }
}
