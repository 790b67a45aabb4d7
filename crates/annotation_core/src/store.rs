//! Annotation Store — remote baseline plus the pending-edit overlay.

use std::collections::{BTreeMap, HashMap};

use serde_json::Value;
use tracing::debug;

use crate::error::SchemaParseError;
use crate::ports::ChangeEntry;
use crate::schema::{ConstraintName, ObjectId};
use crate::tracker::{ChangeTracker, PendingEdit, PendingKey};

/// Annotation key → raw document for one object.
pub type AnnotationMap = BTreeMap<String, Value>;

/// What `AnnotationStore::record` did with an edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// First pending edit for the pair.
    Recorded,
    /// Replaced an earlier pending edit for the pair.
    Superseded,
    /// The edit matches the baseline; any pending edit for the pair was dropped.
    NoOp,
}

#[derive(Debug, Clone)]
pub struct AnnotationStore {
    baseline: HashMap<ObjectId, AnnotationMap>,
    tracker: ChangeTracker,
    drop_noop_edits: bool,
}

impl Default for AnnotationStore {
    fn default() -> Self {
        Self {
            baseline: HashMap::new(),
            tracker: ChangeTracker::new(),
            drop_noop_edits: true,
        }
    }
}

impl AnnotationStore {
    pub fn with_baseline(baseline: HashMap<ObjectId, AnnotationMap>, drop_noop_edits: bool) -> Self {
        Self {
            baseline,
            tracker: ChangeTracker::new(),
            drop_noop_edits,
        }
    }

    /// Swap in a freshly fetched baseline. Pending edits are discarded.
    pub fn replace_baseline(&mut self, baseline: HashMap<ObjectId, AnnotationMap>) {
        self.baseline = baseline;
        self.tracker.clear();
    }

    /// Last-loaded remote value, ignoring pending edits.
    pub fn get(&self, object: &ObjectId, key: &str) -> Option<&Value> {
        self.baseline.get(object)?.get(key)
    }

    /// Pending value if one exists, else the baseline value.
    pub fn current_raw(&self, object: &ObjectId, key: &str) -> Option<&Value> {
        match self.tracker.get(&PendingKey::new(object.clone(), key)) {
            Some(edit) => edit.value(),
            None => self.get(object, key),
        }
    }

    /// Every effective annotation of an object, pending edits applied.
    pub fn effective_map(&self, object: &ObjectId) -> AnnotationMap {
        let mut map = self.baseline.get(object).cloned().unwrap_or_default();
        for key in self.tracker.keys().iter().filter(|k| &k.object == object) {
            match self.tracker.get(key) {
                Some(PendingEdit::Set(v)) => {
                    map.insert(key.key.clone(), v.clone());
                }
                Some(PendingEdit::Remove) => {
                    map.remove(&key.key);
                }
                None => {}
            }
        }
        map
    }

    pub fn record(&mut self, object: ObjectId, key: &str, edit: PendingEdit) -> RecordOutcome {
        let pending = PendingKey::new(object, key);
        if self.drop_noop_edits && self.get(&pending.object, key) == edit.value() {
            self.tracker.cancel(&pending);
            debug!(object = %pending.object, key, "edit matches baseline, dropped");
            return RecordOutcome::NoOp;
        }
        match self.tracker.record(pending, edit) {
            Some(_) => RecordOutcome::Superseded,
            None => RecordOutcome::Recorded,
        }
    }

    pub fn pending_edits(&self) -> Vec<(PendingKey, PendingEdit)> {
        self.tracker.pending_edits()
    }

    pub fn is_dirty(&self) -> bool {
        self.tracker.is_dirty()
    }

    /// One write per pending pair, in first-recorded order.
    pub fn changeset(&self) -> Vec<ChangeEntry> {
        self.tracker
            .pending_edits()
            .into_iter()
            .map(|(k, operation)| ChangeEntry {
                object: k.object,
                key: k.key,
                operation,
            })
            .collect()
    }

    /// Fold every pending edit into the baseline.
    pub fn commit(&mut self) {
        let keys = self.tracker.keys().to_vec();
        self.commit_keys(&keys);
    }

    /// Fold the named pending edits into the baseline, leaving the rest pending.
    pub fn commit_keys(&mut self, keys: &[PendingKey]) {
        for key in keys {
            let Some(edit) = self.tracker.get(key).cloned() else {
                continue;
            };
            match edit {
                PendingEdit::Set(value) => {
                    self.baseline
                        .entry(key.object.clone())
                        .or_default()
                        .insert(key.key.clone(), value);
                }
                PendingEdit::Remove => {
                    if let Some(map) = self.baseline.get_mut(&key.object) {
                        map.remove(&key.key);
                    }
                }
            }
            self.tracker.cancel(key);
        }
    }

    /// Drop every pending edit; the baseline is untouched.
    pub fn discard_all(&mut self) {
        self.tracker.clear();
    }
}

// ── Extraction from catalog documents ──────────────────────────

/// Collect the `annotations` blocks of an ERMrest-style catalog document.
///
/// Objects with no annotations are omitted.
pub fn extract_annotations(
    raw: &Value,
) -> Result<HashMap<ObjectId, AnnotationMap>, SchemaParseError> {
    let mut out = HashMap::new();
    collect(&mut out, ObjectId::Catalog, raw, "")?;

    let Some(schemas) = raw.get("schemas").and_then(Value::as_object) else {
        return Err(SchemaParseError::MissingField {
            path: "/".into(),
            field: "schemas",
        });
    };
    for (schema_name, schema) in schemas {
        let path = format!("/schemas/{schema_name}");
        collect(&mut out, ObjectId::schema(schema_name), schema, &path)?;

        let tables = schema.get("tables").and_then(Value::as_object);
        for (table_name, table) in tables.into_iter().flatten() {
            let path = format!("{path}/tables/{table_name}");
            collect(&mut out, ObjectId::table(schema_name, table_name), table, &path)?;

            for column in list(table, "column_definitions") {
                if let Some(name) = column.get("name").and_then(Value::as_str) {
                    let id = ObjectId::column(schema_name, table_name, name);
                    collect(&mut out, id, column, &format!("{path}/{name}"))?;
                }
            }
            for key in list(table, "keys") {
                if let Some(name) = first_name(key) {
                    collect(&mut out, ObjectId::key(&name), key, &path)?;
                }
            }
            for fkey in list(table, "foreign_keys") {
                if let Some(name) = first_name(fkey) {
                    collect(&mut out, ObjectId::foreign_key(&name), fkey, &path)?;
                }
            }
        }
    }
    Ok(out)
}

fn collect(
    out: &mut HashMap<ObjectId, AnnotationMap>,
    id: ObjectId,
    node: &Value,
    path: &str,
) -> Result<(), SchemaParseError> {
    let Some(annotations) = node.get("annotations") else {
        return Ok(());
    };
    let map = annotations
        .as_object()
        .ok_or_else(|| SchemaParseError::InvalidField {
            path: if path.is_empty() { "/".into() } else { path.to_string() },
            field: "annotations",
            message: "expected an object".into(),
        })?;
    if !map.is_empty() {
        out.insert(
            id,
            map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        );
    }
    Ok(())
}

fn list<'a>(node: &'a Value, field: &str) -> impl Iterator<Item = &'a Value> {
    node.get(field)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
}

fn first_name(node: &Value) -> Option<ConstraintName> {
    node.get("names")?
        .as_array()?
        .first()
        .and_then(ConstraintName::from_value)
}
