//! `visible-columns` and `visible-foreign-keys`: per-context ordered entry lists.

use serde_json::{json, Map, Value};

use crate::error::{DecodeError, EditError};
use crate::schema::{ConstraintName, TableInfo};
use crate::tags::AnnotationKind;

use super::contexts::{ContextRemoval, ContextSlot, Contexts};
use super::pseudo::PseudoColumn;
use super::{
    as_array, as_object, child, duplicate_at, extra, insert_at, move_down, move_up, put_extra,
    remove_at, AnnotationCodec, CodecContext, Extra,
};

/// Context that holds facets rather than an entry list in `visible-columns`.
pub const FILTER_CONTEXT: &str = "filter";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisibleSourcesMode {
    Columns,
    ForeignKeys,
}

/// Written form of a column entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnForm {
    /// `"name"`
    Name,
    /// `{"source": "name"}`
    Source,
}

#[derive(Debug, Clone, PartialEq)]
pub enum VisibleSourceEntry {
    Column { name: String, form: ColumnForm },
    Constraint(ConstraintName),
    Pseudo(PseudoColumn),
}

impl VisibleSourceEntry {
    pub fn column(name: impl Into<String>) -> Self {
        Self::Column {
            name: name.into(),
            form: ColumnForm::Name,
        }
    }

    fn decode(raw: &Value, path: &str) -> Result<Self, DecodeError> {
        match raw {
            Value::String(name) => Ok(Self::column(name.clone())),
            Value::Array(_) => ConstraintName::from_value(raw)
                .map(Self::Constraint)
                .ok_or_else(|| DecodeError::shape(path, "a [schema, name] constraint")),
            Value::Object(map) => match (map.len(), map.get("source")) {
                (1, Some(Value::String(name))) => Ok(Self::Column {
                    name: name.clone(),
                    form: ColumnForm::Source,
                }),
                _ => PseudoColumn::decode(raw, path).map(Self::Pseudo),
            },
            _ => Err(DecodeError::shape(path, "a column, constraint or pseudo-column")),
        }
    }

    fn encode(&self) -> Value {
        match self {
            Self::Column {
                name,
                form: ColumnForm::Name,
            } => Value::String(name.clone()),
            Self::Column {
                name,
                form: ColumnForm::Source,
            } => json!({ "source": name }),
            Self::Constraint(name) => name.to_value(),
            Self::Pseudo(p) => p.encode(),
        }
    }

    fn check(
        &self,
        mode: VisibleSourcesMode,
        table: &TableInfo,
        cx: &CodecContext<'_>,
        path: &str,
    ) -> Result<(), DecodeError> {
        match (self, mode) {
            (Self::Column { .. }, VisibleSourcesMode::ForeignKeys) => Err(DecodeError::invalid(
                path,
                "column entries are not allowed in visible-foreign-keys",
            )),
            (Self::Column { name, .. }, VisibleSourcesMode::Columns) => {
                if table.has_column(name) {
                    Ok(())
                } else {
                    Err(DecodeError::unresolved(path, "column", name))
                }
            }
            (Self::Constraint(name), VisibleSourcesMode::Columns) => {
                let own_key = cx.schema.key(name).is_some_and(|k| k.table == table.id());
                let outbound = cx
                    .schema
                    .foreign_key(name)
                    .is_some_and(|f| f.table == table.id());
                if own_key || outbound {
                    Ok(())
                } else {
                    Err(DecodeError::unresolved(
                        path,
                        "key or outbound foreign key",
                        name.to_string(),
                    ))
                }
            }
            (Self::Constraint(name), VisibleSourcesMode::ForeignKeys) => {
                let inbound = cx
                    .schema
                    .foreign_key(name)
                    .is_some_and(|f| f.referenced_table == table.id());
                if inbound {
                    Ok(())
                } else {
                    Err(DecodeError::unresolved(
                        path,
                        "inbound foreign key",
                        name.to_string(),
                    ))
                }
            }
            (Self::Pseudo(p), _) => p.check(cx, path),
        }
    }
}

/// Value of one context.
#[derive(Debug, Clone, PartialEq)]
pub enum ContextValue {
    Entries(Vec<VisibleSourceEntry>),
    /// Facet list of the `filter` context. Facets are kept as written.
    Filter {
        facets: Vec<Value>,
        extra: Extra,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct VisibleSourcesDocument {
    pub mode: VisibleSourcesMode,
    pub contexts: Contexts<ContextValue>,
}

impl VisibleSourcesDocument {
    pub fn new(mode: VisibleSourcesMode) -> Self {
        Self {
            mode,
            contexts: Contexts::default(),
        }
    }

    fn decode(
        raw: &Value,
        mode: VisibleSourcesMode,
        cx: &CodecContext<'_>,
    ) -> Result<Self, DecodeError> {
        let table = cx.require_table()?;
        let contexts = Contexts::decode(raw, "", |name, value, path| {
            if mode == VisibleSourcesMode::Columns && name == FILTER_CONTEXT {
                let map = as_object(value, path)?;
                let facets = map
                    .get("and")
                    .ok_or_else(|| DecodeError::shape(path, "an {\"and\": [...]} facet list"))?;
                return Ok(ContextValue::Filter {
                    facets: as_array(facets, &child(path, "and"))?.clone(),
                    extra: extra(map, &["and"]),
                });
            }
            let entries = as_array(value, path)?
                .iter()
                .enumerate()
                .map(|(i, raw)| {
                    let entry_path = child(path, i);
                    let entry = VisibleSourceEntry::decode(raw, &entry_path)?;
                    entry.check(mode, table, cx, &entry_path)?;
                    Ok(entry)
                })
                .collect::<Result<Vec<_>, DecodeError>>()?;
            Ok(ContextValue::Entries(entries))
        })?;
        Ok(Self { mode, contexts })
    }

    fn encode(&self) -> Value {
        self.contexts.encode(|value| match value {
            ContextValue::Entries(entries) => {
                Value::Array(entries.iter().map(VisibleSourceEntry::encode).collect())
            }
            ContextValue::Filter { facets, extra } => {
                let mut map = Map::new();
                map.insert("and".into(), Value::Array(facets.clone()));
                put_extra(&mut map, extra);
                Value::Object(map)
            }
        })
    }

    // ── Context operations ─────────────────────────────────────

    /// Add an empty context (`{"and": []}` for `filter`).
    pub fn add_context(&mut self, name: &str) -> Result<(), EditError> {
        let value = if self.mode == VisibleSourcesMode::Columns && name == FILTER_CONTEXT {
            ContextValue::Filter {
                facets: Vec::new(),
                extra: Extra::default(),
            }
        } else {
            ContextValue::Entries(Vec::new())
        };
        self.contexts.insert(name, ContextSlot::Value(value))
    }

    pub fn add_alias(&mut self, name: &str, target: &str) -> Result<(), EditError> {
        if !self.contexts.contains(target) {
            return Err(EditError::UnknownContext(target.to_string()));
        }
        self.contexts.insert(name, ContextSlot::Alias(target.to_string()))
    }

    pub fn remove_context(&mut self, name: &str, confirmed: bool) -> Result<ContextRemoval, EditError> {
        self.contexts.remove(name, confirmed)
    }

    // ── Entry operations ───────────────────────────────────────

    pub fn entries(&self, context: &str) -> Result<&[VisibleSourceEntry], EditError> {
        match self.contexts.value(context)? {
            ContextValue::Entries(entries) => Ok(entries),
            ContextValue::Filter { .. } => Err(EditError::InvalidEntry(format!(
                "context '{context}' holds facets"
            ))),
        }
    }

    fn entries_mut(&mut self, context: &str) -> Result<&mut Vec<VisibleSourceEntry>, EditError> {
        match self.contexts.value_mut(context)? {
            ContextValue::Entries(entries) => Ok(entries),
            ContextValue::Filter { .. } => Err(EditError::InvalidEntry(format!(
                "context '{context}' holds facets"
            ))),
        }
    }

    fn validated(
        &self,
        entry: &VisibleSourceEntry,
        cx: &CodecContext<'_>,
    ) -> Result<(), EditError> {
        let table = cx
            .require_table()
            .map_err(|e| EditError::InvalidEntry(e.to_string()))?;
        entry
            .check(self.mode, table, cx, "")
            .map_err(|e| EditError::InvalidEntry(e.to_string()))
    }

    pub fn insert(
        &mut self,
        context: &str,
        index: usize,
        entry: VisibleSourceEntry,
        cx: &CodecContext<'_>,
    ) -> Result<(), EditError> {
        self.validated(&entry, cx)?;
        insert_at(self.entries_mut(context)?, index, entry)
    }

    pub fn push(
        &mut self,
        context: &str,
        entry: VisibleSourceEntry,
        cx: &CodecContext<'_>,
    ) -> Result<(), EditError> {
        self.validated(&entry, cx)?;
        self.entries_mut(context)?.push(entry);
        Ok(())
    }

    pub fn replace(
        &mut self,
        context: &str,
        index: usize,
        entry: VisibleSourceEntry,
        cx: &CodecContext<'_>,
    ) -> Result<VisibleSourceEntry, EditError> {
        self.validated(&entry, cx)?;
        let entries = self.entries_mut(context)?;
        let len = entries.len();
        let slot = entries
            .get_mut(index)
            .ok_or(EditError::IndexOutOfRange { index, len })?;
        Ok(std::mem::replace(slot, entry))
    }

    pub fn remove(&mut self, context: &str, index: usize) -> Result<VisibleSourceEntry, EditError> {
        remove_at(self.entries_mut(context)?, index)
    }

    pub fn move_up(&mut self, context: &str, index: usize) -> Result<(), EditError> {
        move_up(self.entries_mut(context)?, index)
    }

    pub fn move_down(&mut self, context: &str, index: usize) -> Result<(), EditError> {
        move_down(self.entries_mut(context)?, index)
    }

    pub fn duplicate(&mut self, context: &str, index: usize) -> Result<(), EditError> {
        duplicate_at(self.entries_mut(context)?, index)
    }
}

pub struct VisibleColumnsCodec;

impl AnnotationCodec for VisibleColumnsCodec {
    type Document = VisibleSourcesDocument;

    const KIND: AnnotationKind = AnnotationKind::VisibleColumns;

    fn decode(raw: &Value, cx: &CodecContext<'_>) -> Result<Self::Document, DecodeError> {
        VisibleSourcesDocument::decode(raw, VisibleSourcesMode::Columns, cx)
    }

    fn encode(doc: &Self::Document) -> Value {
        doc.encode()
    }

    fn empty(_cx: &CodecContext<'_>) -> Self::Document {
        VisibleSourcesDocument::new(VisibleSourcesMode::Columns)
    }
}

pub struct VisibleForeignKeysCodec;

impl AnnotationCodec for VisibleForeignKeysCodec {
    type Document = VisibleSourcesDocument;

    const KIND: AnnotationKind = AnnotationKind::VisibleForeignKeys;

    fn decode(raw: &Value, cx: &CodecContext<'_>) -> Result<Self::Document, DecodeError> {
        VisibleSourcesDocument::decode(raw, VisibleSourcesMode::ForeignKeys, cx)
    }

    fn encode(doc: &Self::Document) -> Value {
        doc.encode()
    }

    fn empty(_cx: &CodecContext<'_>) -> Self::Document {
        VisibleSourcesDocument::new(VisibleSourcesMode::ForeignKeys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, constraint, dataset};
    use pretty_assertions::assert_eq;

    fn decode_columns(raw: &Value) -> Result<VisibleSourcesDocument, DecodeError> {
        let model = testing::schema_model();
        let table = dataset();
        VisibleColumnsCodec::decode(raw, &CodecContext::new(&model, &table))
    }

    #[test]
    fn entry_forms_are_distinguished() {
        let raw = json!({
            "*": [
                "id",
                { "source": "title" },
                ["isa", "dataset_owner_fkey"],
                { "source": "owner", "markdown_name": "Owner" }
            ]
        });
        let doc = decode_columns(&raw).unwrap();
        let entries = doc.entries("*").unwrap();
        assert!(matches!(entries[0], VisibleSourceEntry::Column { form: ColumnForm::Name, .. }));
        assert!(matches!(entries[1], VisibleSourceEntry::Column { form: ColumnForm::Source, .. }));
        assert_eq!(entries[2], VisibleSourceEntry::Constraint(constraint("dataset_owner_fkey")));
        assert!(matches!(entries[3], VisibleSourceEntry::Pseudo(_)));
        assert_eq!(VisibleColumnsCodec::encode(&doc), raw);
    }

    #[test]
    fn filter_context_keeps_facets() {
        let raw = json!({
            "filter": { "and": [{ "source": "title", "open": true }] },
            "compact": ["id"],
            "detailed": "compact"
        });
        let doc = decode_columns(&raw).unwrap();
        assert!(doc.entries("filter").is_err());
        assert_eq!(VisibleColumnsCodec::encode(&doc), raw);
    }

    #[test]
    fn inbound_constraint_is_not_a_visible_column() {
        let raw = json!({ "*": [["isa", "experiment_dataset_fkey"]] });
        assert!(matches!(
            decode_columns(&raw),
            Err(DecodeError::UnresolvedReference { what: "key or outbound foreign key", .. })
        ));
    }

    #[test]
    fn visible_foreign_keys_require_inbound() {
        let model = testing::schema_model();
        let table = dataset();
        let cx = CodecContext::new(&model, &table);
        let ok = json!({ "detailed": [["isa", "experiment_dataset_fkey"]] });
        assert!(VisibleForeignKeysCodec::decode(&ok, &cx).is_ok());
        let outbound = json!({ "detailed": [["isa", "dataset_owner_fkey"]] });
        assert!(VisibleForeignKeysCodec::decode(&outbound, &cx).is_err());
    }

    #[test]
    fn push_validates_entry() {
        let model = testing::schema_model();
        let table = dataset();
        let cx = CodecContext::new(&model, &table);
        let mut doc = VisibleColumnsCodec::empty(&cx);
        doc.add_context("entry").unwrap();
        doc.push("entry", VisibleSourceEntry::column("title"), &cx).unwrap();
        let err = doc
            .push("entry", VisibleSourceEntry::column("missing"), &cx)
            .unwrap_err();
        assert!(matches!(err, EditError::InvalidEntry(_)));
        assert_eq!(VisibleColumnsCodec::encode(&doc), json!({ "entry": ["title"] }));
    }

    #[test]
    fn alias_contexts_reject_entry_edits() {
        let mut doc = decode_columns(&json!({ "*": ["id"], "entry": "*" })).unwrap();
        assert_eq!(doc.move_up("entry", 0), Err(EditError::AliasContext("entry".into())));
        assert_eq!(doc.add_alias("x", "nope"), Err(EditError::UnknownContext("nope".into())));
    }

    #[test]
    fn replace_swaps_in_place() {
        let model = testing::schema_model();
        let table = dataset();
        let cx = CodecContext::new(&model, &table);
        let mut doc = decode_columns(&json!({ "*": ["id", "title"] })).unwrap();
        let old = doc
            .replace("*", 0, VisibleSourceEntry::column("owner"), &cx)
            .unwrap();
        assert_eq!(old, VisibleSourceEntry::column("id"));
        assert_eq!(VisibleColumnsCodec::encode(&doc), json!({ "*": ["owner", "title"] }));
    }
}
