//! Structured Codecs — typed, schema-aware views of raw annotation documents.
//!
//! Codecs are pure: `decode` reads a raw value, `encode` rebuilds one. Editing
//! happens on the structured document; callers encode and record the result as
//! a `Set` edit. A raw value is only edited structurally when it decodes and
//! re-encodes to exactly the same value, otherwise it is edited as opaque JSON.

pub mod citation;
pub mod column_display;
pub mod contexts;
pub mod display;
pub mod key_display;
pub mod pseudo;
pub mod sort_keys;
pub mod source_definitions;
pub mod source_path;
pub mod table_display;
pub mod visible_sources;

use std::fmt;

use serde_json::{Map, Value};
use tracing::warn;

use crate::error::{DecodeError, EditError};
use crate::schema::{ConstraintName, KeyInfo, ObjectId, SchemaModel, TableInfo};
use crate::store::AnnotationStore;
use crate::tags::{self, AnnotationKind};

pub use citation::{CitationCodec, CitationDocument};
pub use column_display::{ColumnDisplayCodec, ColumnDisplayDocument};
pub use contexts::{ContextRemoval, ContextSlot, Contexts, ALL_CONTEXTS};
pub use display::{DisplayCodec, DisplayDocument, ForeignKeyCodec, ForeignKeyDocument};
pub use key_display::{KeyDisplayCodec, KeyDisplayDocument};
pub use pseudo::PseudoColumn;
pub use sort_keys::SortKey;
pub use source_definitions::{SourceDefinitionsCodec, SourceDefinitionsDocument};
pub use source_path::{PathHop, SourcePath};
pub use table_display::{TableDisplayCodec, TableDisplayDocument};
pub use visible_sources::{
    VisibleColumnsCodec, VisibleForeignKeysCodec, VisibleSourceEntry, VisibleSourcesDocument,
};

// ── Codec contract ─────────────────────────────────────────────

pub trait AnnotationCodec {
    type Document: Clone + PartialEq + fmt::Debug;

    const KIND: AnnotationKind;

    fn decode(raw: &Value, cx: &CodecContext<'_>) -> Result<Self::Document, DecodeError>;

    fn encode(doc: &Self::Document) -> Value;

    /// Document opened for an unset annotation.
    fn empty(cx: &CodecContext<'_>) -> Self::Document;
}

/// Schema context a codec resolves references against.
#[derive(Debug, Clone)]
pub struct CodecContext<'a> {
    pub schema: &'a SchemaModel,
    pub object: &'a ObjectId,
    /// Source keys defined for the owning table.
    pub source_keys: Vec<String>,
}

impl<'a> CodecContext<'a> {
    pub fn new(schema: &'a SchemaModel, object: &'a ObjectId) -> Self {
        Self {
            schema,
            object,
            source_keys: Vec::new(),
        }
    }

    pub fn with_source_keys(mut self, keys: Vec<String>) -> Self {
        self.source_keys = keys;
        self
    }

    /// Context whose source keys come from the owning table's effective
    /// `source-definitions` annotation.
    pub fn from_store(
        schema: &'a SchemaModel,
        store: &AnnotationStore,
        object: &'a ObjectId,
    ) -> Self {
        let keys = schema
            .owning_table(object)
            .map(|table| {
                source_definitions::source_keys_of(
                    store.current_raw(&table, tags::SOURCE_DEFINITIONS),
                )
            })
            .unwrap_or_default();
        Self::new(schema, object).with_source_keys(keys)
    }

    pub fn table(&self) -> Option<&'a TableInfo> {
        self.schema.table(self.object)
    }

    pub(crate) fn require_table(&self) -> Result<&'a TableInfo, DecodeError> {
        self.table()
            .ok_or_else(|| DecodeError::invalid("", format!("{} is not a table", self.object)))
    }

    pub(crate) fn require_key(&self) -> Result<&'a KeyInfo, DecodeError> {
        let schema = self.schema;
        match self.object {
            ObjectId::Key { schema: s, name } => schema
                .key(&ConstraintName::new(s, name))
                .ok_or_else(|| DecodeError::unresolved("", "key", self.object.to_string())),
            _ => Err(DecodeError::invalid("", format!("{} is not a key", self.object))),
        }
    }

    pub(crate) fn require_column(&self) -> Result<&'a ObjectId, DecodeError> {
        match self.object {
            ObjectId::Column { .. } if self.schema.contains(self.object) => Ok(self.object),
            ObjectId::Column { .. } => {
                Err(DecodeError::unresolved("", "column", self.object.to_string()))
            }
            _ => Err(DecodeError::invalid("", format!("{} is not a column", self.object))),
        }
    }

    pub(crate) fn has_source_key(&self, key: &str) -> bool {
        self.source_keys.iter().any(|k| k == key)
    }
}

// ── Editor view ────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum EditorView<D> {
    Structured(D),
    Opaque { raw: Value, reason: String },
}

impl<D> EditorView<D> {
    pub fn is_structured(&self) -> bool {
        matches!(self, Self::Structured(_))
    }

    pub fn structured(self) -> Option<D> {
        match self {
            Self::Structured(doc) => Some(doc),
            Self::Opaque { .. } => None,
        }
    }
}

/// Decode, then require that encoding reproduces the input, property order
/// included.
pub fn decode_exact<C: AnnotationCodec>(
    raw: &Value,
    cx: &CodecContext<'_>,
) -> Result<C::Document, DecodeError> {
    let doc = C::decode(raw, cx)?;
    if !identical(&C::encode(&doc), raw) {
        return Err(DecodeError::Lossy);
    }
    Ok(doc)
}

/// `Value` equality ignores map order; this does not.
pub fn identical(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x
                    .iter()
                    .zip(y)
                    .all(|((ka, va), (kb, vb))| ka == kb && identical(va, vb))
        }
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(va, vb)| identical(va, vb))
        }
        _ => a == b,
    }
}

/// Open an annotation for editing. `raw` is the effective value, `None` when unset.
pub fn open<C: AnnotationCodec>(raw: Option<&Value>, cx: &CodecContext<'_>) -> EditorView<C::Document> {
    let Some(raw) = raw else {
        return EditorView::Structured(C::empty(cx));
    };
    match decode_exact::<C>(raw, cx) {
        Ok(doc) => EditorView::Structured(doc),
        Err(e) => {
            warn!(object = %cx.object, kind = %C::KIND, error = %e, "falling back to opaque editing");
            EditorView::Opaque {
                raw: raw.clone(),
                reason: e.to_string(),
            }
        }
    }
}

/// Structural check of a raw value with the codec for `kind`.
pub fn check(kind: AnnotationKind, raw: &Value, cx: &CodecContext<'_>) -> Result<(), DecodeError> {
    match kind {
        AnnotationKind::VisibleColumns => decode_exact::<VisibleColumnsCodec>(raw, cx).map(drop),
        AnnotationKind::VisibleForeignKeys => {
            decode_exact::<VisibleForeignKeysCodec>(raw, cx).map(drop)
        }
        AnnotationKind::SourceDefinitions => {
            decode_exact::<SourceDefinitionsCodec>(raw, cx).map(drop)
        }
        AnnotationKind::TableDisplay => decode_exact::<TableDisplayCodec>(raw, cx).map(drop),
        AnnotationKind::Citation => decode_exact::<CitationCodec>(raw, cx).map(drop),
        AnnotationKind::Display => decode_exact::<DisplayCodec>(raw, cx).map(drop),
        AnnotationKind::ForeignKey => decode_exact::<ForeignKeyCodec>(raw, cx).map(drop),
        AnnotationKind::KeyDisplay => decode_exact::<KeyDisplayCodec>(raw, cx).map(drop),
        AnnotationKind::ColumnDisplay => decode_exact::<ColumnDisplayCodec>(raw, cx).map(drop),
    }
}

// ── Shared field helpers ───────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateEngine {
    Handlebars,
    Mustache,
}

impl TemplateEngine {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Handlebars => "handlebars",
            Self::Mustache => "mustache",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "handlebars" => Some(Self::Handlebars),
            "mustache" => Some(Self::Mustache),
            _ => None,
        }
    }
}

pub(crate) fn child(path: &str, segment: impl fmt::Display) -> String {
    format!("{path}/{segment}")
}

pub(crate) fn as_object<'v>(
    raw: &'v Value,
    path: &str,
) -> Result<&'v Map<String, Value>, DecodeError> {
    raw.as_object()
        .ok_or_else(|| DecodeError::shape(path, "an object"))
}

pub(crate) fn as_array<'v>(raw: &'v Value, path: &str) -> Result<&'v Vec<Value>, DecodeError> {
    raw.as_array().ok_or_else(|| DecodeError::shape(path, "a list"))
}

pub(crate) fn opt_str(
    map: &Map<String, Value>,
    field: &str,
    path: &str,
) -> Result<Option<String>, DecodeError> {
    match map.get(field) {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(DecodeError::shape(&child(path, field), "a string")),
    }
}

pub(crate) fn opt_bool(
    map: &Map<String, Value>,
    field: &str,
    path: &str,
) -> Result<Option<bool>, DecodeError> {
    match map.get(field) {
        None => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(_) => Err(DecodeError::shape(&child(path, field), "a boolean")),
    }
}

pub(crate) fn opt_engine(
    map: &Map<String, Value>,
    path: &str,
) -> Result<Option<TemplateEngine>, DecodeError> {
    match opt_str(map, "template_engine", path)? {
        None => Ok(None),
        Some(s) => TemplateEngine::parse(&s)
            .map(Some)
            .ok_or_else(|| DecodeError::shape(&child(path, "template_engine"), "handlebars or mustache")),
    }
}

pub(crate) fn opt_str_list(
    map: &Map<String, Value>,
    field: &str,
    path: &str,
) -> Result<Option<Vec<String>>, DecodeError> {
    let Some(raw) = map.get(field) else {
        return Ok(None);
    };
    let path = child(path, field);
    as_array(raw, &path)?
        .iter()
        .enumerate()
        .map(|(i, v)| {
            v.as_str()
                .map(str::to_string)
                .ok_or_else(|| DecodeError::shape(&child(&path, i), "a string"))
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}

/// Properties a codec does not model, kept for re-emission along with the
/// property order of the object they were read from.
#[derive(Debug, Clone, Default)]
pub struct Extra {
    properties: Map<String, Value>,
    order: Vec<String>,
}

/// Property order is layout and does not take part in equality.
impl PartialEq for Extra {
    fn eq(&self, other: &Self) -> bool {
        self.properties == other.properties
    }
}

impl Extra {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.properties.insert(key.into(), value)
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    pub fn iter(&self) -> serde_json::map::Iter<'_> {
        self.properties.iter()
    }
}

/// Properties not in `known`, kept for re-emission.
pub(crate) fn extra(map: &Map<String, Value>, known: &[&str]) -> Extra {
    Extra {
        properties: map
            .iter()
            .filter(|(k, _)| !known.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
        order: map.keys().cloned().collect(),
    }
}

pub(crate) fn put<V: Into<Value>>(map: &mut Map<String, Value>, field: &str, value: Option<V>) {
    if let Some(v) = value {
        map.insert(field.to_string(), v.into());
    }
}

pub(crate) fn put_engine(map: &mut Map<String, Value>, engine: Option<TemplateEngine>) {
    put(map, "template_engine", engine.map(|e| e.as_str()));
}

/// Append unmodelled properties, then restore the order read at decode time.
/// Properties the decoded object did not have follow in encoder order.
pub(crate) fn put_extra(map: &mut Map<String, Value>, extra: &Extra) {
    for (k, v) in &extra.properties {
        map.insert(k.clone(), v.clone());
    }
    if extra.order.is_empty() {
        return;
    }
    let written = std::mem::take(map);
    for key in &extra.order {
        if let Some(v) = written.get(key) {
            map.insert(key.clone(), v.clone());
        }
    }
    for (k, v) in written {
        if !map.contains_key(&k) {
            map.insert(k, v);
        }
    }
}

pub(crate) fn check_wait_for(
    keys: &[String],
    cx: &CodecContext<'_>,
    path: &str,
) -> Result<(), DecodeError> {
    for (i, key) in keys.iter().enumerate() {
        if !cx.has_source_key(key) {
            return Err(DecodeError::unresolved(&child(path, i), "source key", key));
        }
    }
    Ok(())
}

// ── Ordered list operations ────────────────────────────────────

fn in_range<T>(list: &[T], index: usize) -> Result<(), EditError> {
    if index < list.len() {
        Ok(())
    } else {
        Err(EditError::IndexOutOfRange {
            index,
            len: list.len(),
        })
    }
}

/// Insert at `index`; `index == len` appends.
pub fn insert_at<T>(list: &mut Vec<T>, index: usize, item: T) -> Result<(), EditError> {
    if index > list.len() {
        return Err(EditError::IndexOutOfRange {
            index,
            len: list.len(),
        });
    }
    list.insert(index, item);
    Ok(())
}

pub fn remove_at<T>(list: &mut Vec<T>, index: usize) -> Result<T, EditError> {
    in_range(list, index)?;
    Ok(list.remove(index))
}

/// Swap with the previous entry. Moving the first entry is a no-op.
pub fn move_up<T>(list: &mut [T], index: usize) -> Result<(), EditError> {
    in_range(list, index)?;
    if index > 0 {
        list.swap(index - 1, index);
    }
    Ok(())
}

/// Swap with the next entry. Moving the last entry is a no-op.
pub fn move_down<T>(list: &mut [T], index: usize) -> Result<(), EditError> {
    in_range(list, index)?;
    if index + 1 < list.len() {
        list.swap(index, index + 1);
    }
    Ok(())
}

/// Insert a copy directly after the original.
pub fn duplicate_at<T: Clone>(list: &mut Vec<T>, index: usize) -> Result<(), EditError> {
    in_range(list, index)?;
    let copy = list[index].clone();
    list.insert(index + 1, copy);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, dataset};
    use serde_json::json;

    #[test]
    fn list_ops_keep_order() {
        let mut list = vec!["a", "b", "c"];
        move_up(&mut list, 2).unwrap();
        assert_eq!(list, vec!["a", "c", "b"]);
        move_down(&mut list, 0).unwrap();
        assert_eq!(list, vec!["c", "a", "b"]);
        duplicate_at(&mut list, 1).unwrap();
        assert_eq!(list, vec!["c", "a", "a", "b"]);
        assert_eq!(remove_at(&mut list, 3).unwrap(), "b");
        insert_at(&mut list, 3, "z").unwrap();
        assert_eq!(list, vec!["c", "a", "a", "z"]);
    }

    #[test]
    fn list_ops_reject_out_of_range() {
        let mut list = vec![1];
        assert_eq!(
            move_up(&mut list, 1),
            Err(EditError::IndexOutOfRange { index: 1, len: 1 })
        );
        assert!(insert_at(&mut list, 2, 0).is_err());
        assert!(duplicate_at(&mut list, 5).is_err());
        assert_eq!(list, vec![1]);
    }

    #[test]
    fn open_unset_gives_empty_document() {
        let model = testing::schema_model();
        let table = dataset();
        let cx = CodecContext::new(&model, &table);
        let view = open::<CitationCodec>(None, &cx);
        assert_eq!(view, EditorView::Structured(CitationDocument::default()));
    }

    #[test]
    fn open_malformed_falls_back_to_opaque() {
        let model = testing::schema_model();
        let table = dataset();
        let cx = CodecContext::new(&model, &table);
        let raw = json!({ "*": "not-a-list-or-alias-target", "detailed": 3 });
        match open::<VisibleColumnsCodec>(Some(&raw), &cx) {
            EditorView::Opaque { raw: kept, .. } => assert_eq!(kept, raw),
            other => panic!("expected opaque, got {other:?}"),
        }
    }

    #[test]
    fn extra_keeps_unknown_properties() {
        let raw = json!({ "name": "x", "vendor": { "a": 1 } });
        let map = raw.as_object().unwrap();
        let kept = extra(map, &["name"]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept.get("vendor"), Some(&json!({ "a": 1 })));
    }

    #[test]
    fn put_extra_restores_decoded_order() {
        let raw = json!({ "vendor": 1, "title": "t", "name": "n" });
        let kept = extra(raw.as_object().unwrap(), &["name", "title"]);
        let mut map = Map::new();
        map.insert("name".into(), json!("n"));
        map.insert("title".into(), json!("t"));
        map.insert("added".into(), json!(true));
        put_extra(&mut map, &kept);
        let keys: Vec<_> = map.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["vendor", "title", "name", "added"]);
    }

    #[test]
    fn identical_is_order_sensitive() {
        let a = json!({ "x": 1, "y": [{ "p": 1, "q": 2 }] });
        let b = json!({ "y": [{ "p": 1, "q": 2 }], "x": 1 });
        let c = json!({ "x": 1, "y": [{ "q": 2, "p": 1 }] });
        assert_eq!(a, b);
        assert!(!identical(&a, &b));
        assert!(!identical(&a, &c));
        assert!(identical(&a, &a.clone()));
    }

    #[test]
    fn reordered_input_survives_decode_exact() {
        let model = testing::schema_model();
        let table = dataset();
        let cx = CodecContext::new(&model, &table);
        let raw = json!({ "*": { "vendor": 1, "page_size": 25, "row_order": ["title"] } });
        let doc = decode_exact::<TableDisplayCodec>(&raw, &cx).unwrap();
        assert!(identical(&TableDisplayCodec::encode(&doc), &raw));
    }
}
