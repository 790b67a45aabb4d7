//! Context-keyed annotation documents (`visible-*`, `table-display`, `key-display`).
//!
//! A context maps either to a value or, as a bare string, to the name of
//! another context it aliases. Context order is kept as written.

use serde_json::{Map, Value};

use crate::error::{DecodeError, EditError};

use super::child;

/// Reserved context name applying to every context.
pub const ALL_CONTEXTS: &str = "*";

#[derive(Debug, Clone, PartialEq)]
pub enum ContextSlot<T> {
    Value(T),
    Alias(String),
}

/// Outcome of a context removal request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextRemoval {
    Removed,
    /// Nothing was changed; retry with confirmation.
    NeedsConfirmation,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Contexts<T> {
    entries: Vec<(String, ContextSlot<T>)>,
}

impl<T> Default for Contexts<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<T> Contexts<T> {
    /// Decode a context map. `value` decodes every non-alias slot.
    pub(crate) fn decode<F>(raw: &Value, path: &str, mut value: F) -> Result<Self, DecodeError>
    where
        F: FnMut(&str, &Value, &str) -> Result<T, DecodeError>,
    {
        let map = super::as_object(raw, path)?;
        let mut entries = Vec::with_capacity(map.len());
        for (name, slot) in map {
            let slot_path = child(path, name);
            let slot = match slot {
                Value::String(target) => ContextSlot::Alias(target.clone()),
                other => ContextSlot::Value(value(name, other, &slot_path)?),
            };
            entries.push((name.clone(), slot));
        }
        Ok(Self { entries })
    }

    pub(crate) fn encode<F>(&self, mut value: F) -> Value
    where
        F: FnMut(&T) -> Value,
    {
        let mut map = Map::new();
        for (name, slot) in &self.entries {
            let encoded = match slot {
                ContextSlot::Value(v) => value(v),
                ContextSlot::Alias(target) => Value::String(target.clone()),
            };
            map.insert(name.clone(), encoded);
        }
        Value::Object(map)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ContextSlot<T>)> {
        self.entries.iter().map(|(n, s)| (n.as_str(), s))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(n, _)| n == name)
    }

    pub fn get(&self, name: &str) -> Option<&ContextSlot<T>> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, s)| s)
    }

    /// Value of a context. Aliases are not followed.
    pub fn value(&self, name: &str) -> Result<&T, EditError> {
        match self.get(name) {
            Some(ContextSlot::Value(v)) => Ok(v),
            Some(ContextSlot::Alias(_)) => Err(EditError::AliasContext(name.to_string())),
            None => Err(EditError::UnknownContext(name.to_string())),
        }
    }

    pub fn value_mut(&mut self, name: &str) -> Result<&mut T, EditError> {
        match self.entries.iter_mut().find(|(n, _)| n == name) {
            Some((_, ContextSlot::Value(v))) => Ok(v),
            Some((_, ContextSlot::Alias(_))) => Err(EditError::AliasContext(name.to_string())),
            None => Err(EditError::UnknownContext(name.to_string())),
        }
    }

    /// Append a new context.
    pub fn insert(&mut self, name: &str, slot: ContextSlot<T>) -> Result<(), EditError> {
        if name.is_empty() {
            return Err(EditError::InvalidEntry("context name must not be empty".into()));
        }
        if self.contains(name) {
            return Err(EditError::DuplicateContext(name.to_string()));
        }
        self.entries.push((name.to_string(), slot));
        Ok(())
    }

    /// Remove a context. Without confirmation the document is left untouched.
    pub fn remove(&mut self, name: &str, confirmed: bool) -> Result<ContextRemoval, EditError> {
        let Some(index) = self.entries.iter().position(|(n, _)| n == name) else {
            return Err(EditError::UnknownContext(name.to_string()));
        };
        if !confirmed {
            return Ok(ContextRemoval::NeedsConfirmation);
        }
        self.entries.remove(index);
        Ok(ContextRemoval::Removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn numbers(raw: &Value) -> Contexts<i64> {
        Contexts::decode(raw, "", |_, v, p| {
            v.as_i64().ok_or_else(|| DecodeError::shape(p, "a number"))
        })
        .unwrap()
    }

    #[test]
    fn aliases_and_order_survive() {
        let raw = json!({ "detailed": 1, "*": 2, "compact": "detailed" });
        let contexts = numbers(&raw);
        assert_eq!(contexts.names().collect::<Vec<_>>(), vec!["detailed", "*", "compact"]);
        assert_eq!(contexts.value("compact"), Err(EditError::AliasContext("compact".into())));
        assert_eq!(contexts.encode(|n| json!(n)), raw);
    }

    #[test]
    fn remove_requires_confirmation() {
        let mut contexts = numbers(&json!({ "*": 1 }));
        assert_eq!(contexts.remove("*", false), Ok(ContextRemoval::NeedsConfirmation));
        assert!(contexts.contains("*"));
        assert_eq!(contexts.remove("*", true), Ok(ContextRemoval::Removed));
        assert!(contexts.is_empty());
        assert_eq!(contexts.remove("*", true), Err(EditError::UnknownContext("*".into())));
    }

    #[test]
    fn insert_rejects_duplicates() {
        let mut contexts = numbers(&json!({ "*": 1 }));
        assert_eq!(
            contexts.insert("*", ContextSlot::Value(2)),
            Err(EditError::DuplicateContext("*".into()))
        );
        contexts.insert("entry", ContextSlot::Alias("*".into())).unwrap();
        assert_eq!(contexts.len(), 2);
    }

    #[test]
    fn bad_slot_reports_its_path() {
        let err = Contexts::<i64>::decode(&json!({ "entry": true }), "", |_, v, p| {
            v.as_i64().ok_or_else(|| DecodeError::shape(p, "a number"))
        })
        .unwrap_err();
        assert_eq!(err.to_string(), "/entry: expected a number");
    }
}
