//! Change sets and the allowed/immutable field policies that guard them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// An ordered map of field name to new value, as submitted by a caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldChanges(BTreeMap<String, String>);

impl FieldChanges {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(field.into(), value.into());
        self
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FieldChanges {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Which fields a change set may touch.
#[derive(Debug, Clone, Copy)]
pub struct FieldPolicy {
    pub allowed: &'static [&'static str],
    pub immutable: &'static [&'static str],
}

impl FieldPolicy {
    /// Reject the change set if it is empty, names an immutable field, or
    /// names a field outside the allowed set.
    ///
    /// Immutable fields are reported ahead of unknown ones so callers get
    /// the more specific error.
    pub fn check(&self, changes: &FieldChanges) -> Result<(), CoreError> {
        if changes.is_empty() {
            return Err(CoreError::Validation("No fields to update".to_string()));
        }
        if let Some((field, _)) = changes
            .iter()
            .find(|(field, _)| self.immutable.contains(field))
        {
            return Err(CoreError::ImmutableAttribute(field.to_string()));
        }
        if let Some((field, _)) = changes
            .iter()
            .find(|(field, _)| !self.allowed.contains(field))
        {
            return Err(CoreError::Validation(format!(
                "Field '{field}' cannot be updated (allowed: {})",
                self.allowed.join(", ")
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    const POLICY: FieldPolicy = FieldPolicy {
        allowed: &["email", "phone"],
        immutable: &["accountName"],
    };

    #[test]
    fn accepts_allowed_fields() {
        let changes = FieldChanges::new().with("email", "a@b.c");
        assert!(POLICY.check(&changes).is_ok());
    }

    #[test]
    fn rejects_empty_change_set() {
        assert_matches!(
            POLICY.check(&FieldChanges::new()),
            Err(CoreError::Validation(_))
        );
    }

    #[test]
    fn immutable_wins_over_unknown() {
        let changes = FieldChanges::new()
            .with("bogus", "x")
            .with("accountName", "y");
        assert_matches!(
            POLICY.check(&changes),
            Err(CoreError::ImmutableAttribute(f)) if f == "accountName"
        );
    }

    #[test]
    fn rejects_unknown_field() {
        let changes = FieldChanges::new().with("email", "a@b.c").with("pwd", "x");
        assert_matches!(POLICY.check(&changes), Err(CoreError::Validation(msg)) if msg.contains("pwd"));
    }

    #[test]
    fn deserializes_from_json_object() {
        let changes: FieldChanges =
            serde_json::from_str(r#"{"phone":"123","email":"a@b.c"}"#).unwrap();
        let fields: Vec<_> = changes.iter().map(|(k, _)| k).collect();
        assert_eq!(fields, vec!["email", "phone"]);
    }
}
