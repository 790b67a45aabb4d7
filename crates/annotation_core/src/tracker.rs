//! Change Tracker — coalesced pending edits keyed by (object, annotation key).
//!
//! At most one edit is held per pair; a later edit replaces the earlier one in
//! place so the pair keeps the position it was first recorded at.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::schema::ObjectId;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PendingKey {
    pub object: ObjectId,
    pub key: String,
}

impl PendingKey {
    pub fn new(object: ObjectId, key: impl Into<String>) -> Self {
        Self {
            object,
            key: key.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", content = "value", rename_all = "snake_case")]
pub enum PendingEdit {
    Set(Value),
    Remove,
}

impl PendingEdit {
    /// Effective value once applied; `None` means unset.
    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Set(v) => Some(v),
            Self::Remove => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ChangeTracker {
    order: Vec<PendingKey>,
    edits: HashMap<PendingKey, PendingEdit>,
}

impl ChangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an edit, returning the one it superseded (if any).
    pub fn record(&mut self, key: PendingKey, edit: PendingEdit) -> Option<PendingEdit> {
        match self.edits.get_mut(&key) {
            Some(slot) => Some(std::mem::replace(slot, edit)),
            None => {
                self.order.push(key.clone());
                self.edits.insert(key, edit);
                None
            }
        }
    }

    /// Drop the pending edit for a pair. Returns whether one existed.
    pub fn cancel(&mut self, key: &PendingKey) -> bool {
        if self.edits.remove(key).is_some() {
            self.order.retain(|k| k != key);
            true
        } else {
            false
        }
    }

    pub fn get(&self, key: &PendingKey) -> Option<&PendingEdit> {
        self.edits.get(key)
    }

    /// Pending edits in first-recorded order.
    pub fn pending_edits(&self) -> Vec<(PendingKey, PendingEdit)> {
        self.order
            .iter()
            .filter_map(|k| self.edits.get(k).map(|e| (k.clone(), e.clone())))
            .collect()
    }

    pub fn keys(&self) -> &[PendingKey] {
        &self.order
    }

    pub fn is_dirty(&self) -> bool {
        !self.order.is_empty()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.edits.clear();
    }
}
