//! Field validation that reports every violation at once.

use std::collections::BTreeMap;

use serde::Serialize;

/// Collected field → message validation failures.
///
/// Checks never short-circuit: callers run every check and then inspect the
/// result, so a request with several bad fields reports all of them. Only the
/// first message recorded for a field is kept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors {
    fields: BTreeMap<String, String>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `message` for `field` unless that field already has one.
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.fields.entry(field.into()).or_insert_with(|| message.into());
    }

    /// Record `message` for `field` when `ok` is false.
    pub fn check(&mut self, ok: bool, field: &str, message: &str) {
        if !ok {
            self.add(field, message);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }

    /// `Ok(())` when nothing was recorded, otherwise the collected errors.
    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl core::fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mut first = true;
        for (field, message) in &self.fields {
            if !first {
                f.write_str(", ")?;
            }
            write!(f, "{field}: {message}")?;
            first = false;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collects_every_failed_field() {
        let mut v = ValidationErrors::new();
        v.check(false, "userID", "must be greater than 0");
        v.check(true, "catalogItemID", "must be provided");
        v.check(false, "quantity", "must be greater than 0");

        assert_eq!(v.fields().len(), 2);
        assert_eq!(v.get("userID"), Some("must be greater than 0"));
        assert_eq!(v.get("quantity"), Some("must be greater than 0"));
    }

    #[test]
    fn first_message_per_field_wins() {
        let mut v = ValidationErrors::new();
        v.add("page", "must be an integer value");
        v.add("page", "must be greater than zero");
        assert_eq!(v.get("page"), Some("must be an integer value"));
    }

    #[test]
    fn empty_errors_are_ok() {
        assert!(ValidationErrors::new().into_result().is_ok());
    }
}
