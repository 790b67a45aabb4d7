//! `key-display`: how the values of a key are presented, per context.

use serde_json::{Map, Value};

use crate::error::{DecodeError, EditError};
use crate::schema::KeyInfo;
use crate::tags::AnnotationKind;

use super::contexts::{ContextRemoval, ContextSlot, Contexts};
use super::sort_keys::{self, SortKey};
use super::{
    as_object, child, extra, opt_engine, opt_str, put, put_engine, put_extra, AnnotationCodec,
    CodecContext, Extra, TemplateEngine,
};

#[derive(Debug, Clone, PartialEq)]
pub enum ColumnOrder {
    /// `false`: sorting by this key is disabled.
    Disabled,
    Keys(Vec<SortKey>),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct KeyDisplayConfig {
    pub markdown_pattern: Option<String>,
    pub template_engine: Option<TemplateEngine>,
    pub column_order: Option<ColumnOrder>,
    pub extra: Extra,
}

impl KeyDisplayConfig {
    fn decode(raw: &Value, key: &KeyInfo, path: &str) -> Result<Self, DecodeError> {
        let map = as_object(raw, path)?;
        let column_order = match map.get("column_order") {
            None => None,
            Some(Value::Bool(false)) => Some(ColumnOrder::Disabled),
            Some(raw) => {
                let order_path = child(path, "column_order");
                let keys = sort_keys::decode_list(raw, &order_path)?;
                sort_keys::check_list(&keys, key.columns.iter().map(String::as_str), &order_path)?;
                Some(ColumnOrder::Keys(keys))
            }
        };
        Ok(Self {
            markdown_pattern: opt_str(map, "markdown_pattern", path)?,
            template_engine: opt_engine(map, path)?,
            column_order,
            extra: extra(map, &["markdown_pattern", "template_engine", "column_order"]),
        })
    }

    fn encode(&self) -> Value {
        let mut map = Map::new();
        put(&mut map, "markdown_pattern", self.markdown_pattern.clone());
        put_engine(&mut map, self.template_engine);
        match &self.column_order {
            Some(ColumnOrder::Disabled) => {
                map.insert("column_order".into(), Value::Bool(false));
            }
            Some(ColumnOrder::Keys(keys)) => {
                map.insert("column_order".into(), sort_keys::encode_list(keys));
            }
            None => {}
        }
        put_extra(&mut map, &self.extra);
        Value::Object(map)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct KeyDisplayDocument {
    pub contexts: Contexts<KeyDisplayConfig>,
}

impl KeyDisplayDocument {
    pub fn add_context(&mut self, name: &str) -> Result<(), EditError> {
        self.contexts
            .insert(name, ContextSlot::Value(KeyDisplayConfig::default()))
    }

    pub fn remove_context(&mut self, name: &str, confirmed: bool) -> Result<ContextRemoval, EditError> {
        self.contexts.remove(name, confirmed)
    }

    pub fn set_column_order(
        &mut self,
        context: &str,
        order: Option<ColumnOrder>,
        cx: &CodecContext<'_>,
    ) -> Result<(), EditError> {
        if let Some(ColumnOrder::Keys(keys)) = &order {
            let key = cx
                .require_key()
                .map_err(|e| EditError::InvalidEntry(e.to_string()))?;
            sort_keys::check_list(keys, key.columns.iter().map(String::as_str), "/column_order")
                .map_err(|e| EditError::InvalidEntry(e.to_string()))?;
        }
        self.contexts.value_mut(context)?.column_order = order;
        Ok(())
    }
}

pub struct KeyDisplayCodec;

impl AnnotationCodec for KeyDisplayCodec {
    type Document = KeyDisplayDocument;

    const KIND: AnnotationKind = AnnotationKind::KeyDisplay;

    fn decode(raw: &Value, cx: &CodecContext<'_>) -> Result<Self::Document, DecodeError> {
        let key = cx.require_key()?;
        let contexts =
            Contexts::decode(raw, "", |_, value, path| KeyDisplayConfig::decode(value, key, path))?;
        Ok(KeyDisplayDocument { contexts })
    }

    fn encode(doc: &Self::Document) -> Value {
        doc.contexts.encode(KeyDisplayConfig::encode)
    }

    fn empty(_cx: &CodecContext<'_>) -> Self::Document {
        KeyDisplayDocument::default()
    }
}
