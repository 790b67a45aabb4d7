//! `column-display`: how the values of a column are presented, per context.

use serde_json::{Map, Value};

use crate::error::{DecodeError, EditError};
use crate::schema::TableInfo;
use crate::tags::AnnotationKind;

use super::contexts::{ContextRemoval, ContextSlot, Contexts};
use super::key_display::ColumnOrder;
use super::sort_keys;
use super::{
    as_object, child, extra, opt_engine, opt_str, put, put_engine, put_extra, AnnotationCodec,
    CodecContext, Extra, TemplateEngine,
};

/// `pre_format`: applied to the raw value before the markdown pattern.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PreFormat {
    /// POSIX format string.
    pub format: Option<String>,
    pub bool_true_value: Option<String>,
    pub bool_false_value: Option<String>,
    pub extra: Extra,
}

const PRE_FORMAT_FIELDS: &[&str] = &["format", "bool_true_value", "bool_false_value"];

impl PreFormat {
    fn decode(raw: &Value, path: &str) -> Result<Self, DecodeError> {
        let map = as_object(raw, path)?;
        Ok(Self {
            format: opt_str(map, "format", path)?,
            bool_true_value: opt_str(map, "bool_true_value", path)?,
            bool_false_value: opt_str(map, "bool_false_value", path)?,
            extra: extra(map, PRE_FORMAT_FIELDS),
        })
    }

    fn encode(&self) -> Value {
        let mut map = Map::new();
        put(&mut map, "format", self.format.clone());
        put(&mut map, "bool_true_value", self.bool_true_value.clone());
        put(&mut map, "bool_false_value", self.bool_false_value.clone());
        put_extra(&mut map, &self.extra);
        Value::Object(map)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ColumnDisplayConfig {
    pub markdown_pattern: Option<String>,
    pub template_engine: Option<TemplateEngine>,
    /// Sort keys name columns of the column's table.
    pub column_order: Option<ColumnOrder>,
    pub pre_format: Option<PreFormat>,
    pub extra: Extra,
}

const FIELDS: &[&str] = &["markdown_pattern", "template_engine", "column_order", "pre_format"];

impl ColumnDisplayConfig {
    fn decode(raw: &Value, table: &TableInfo, path: &str) -> Result<Self, DecodeError> {
        let map = as_object(raw, path)?;
        let column_order = match map.get("column_order") {
            None => None,
            Some(Value::Bool(false)) => Some(ColumnOrder::Disabled),
            Some(raw) => {
                let order_path = child(path, "column_order");
                let keys = sort_keys::decode_list(raw, &order_path)?;
                sort_keys::check_list(&keys, table.column_names(), &order_path)?;
                Some(ColumnOrder::Keys(keys))
            }
        };
        let pre_format = match map.get("pre_format") {
            None => None,
            Some(raw) => Some(PreFormat::decode(raw, &child(path, "pre_format"))?),
        };
        Ok(Self {
            markdown_pattern: opt_str(map, "markdown_pattern", path)?,
            template_engine: opt_engine(map, path)?,
            column_order,
            pre_format,
            extra: extra(map, FIELDS),
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
        put(&mut map, "pre_format", self.pre_format.as_ref().map(PreFormat::encode));
        put_extra(&mut map, &self.extra);
        Value::Object(map)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ColumnDisplayDocument {
    pub contexts: Contexts<ColumnDisplayConfig>,
}

impl ColumnDisplayDocument {
    pub fn add_context(&mut self, name: &str) -> Result<(), EditError> {
        self.contexts
            .insert(name, ContextSlot::Value(ColumnDisplayConfig::default()))
    }

    pub fn remove_context(&mut self, name: &str, confirmed: bool) -> Result<ContextRemoval, EditError> {
        self.contexts.remove(name, confirmed)
    }

    pub fn config_mut(&mut self, context: &str) -> Result<&mut ColumnDisplayConfig, EditError> {
        self.contexts.value_mut(context)
    }

    pub fn set_column_order(
        &mut self,
        context: &str,
        order: Option<ColumnOrder>,
        cx: &CodecContext<'_>,
    ) -> Result<(), EditError> {
        if let Some(ColumnOrder::Keys(keys)) = &order {
            let table = column_table(cx).map_err(|e| EditError::InvalidEntry(e.to_string()))?;
            sort_keys::check_list(keys, table.column_names(), "/column_order")
                .map_err(|e| EditError::InvalidEntry(e.to_string()))?;
        }
        self.config_mut(context)?.column_order = order;
        Ok(())
    }
}

/// Table owning the column `cx` points at.
fn column_table<'a>(cx: &CodecContext<'a>) -> Result<&'a TableInfo, DecodeError> {
    let column = cx.require_column()?;
    cx.schema
        .owning_table(column)
        .and_then(|table| cx.schema.table(&table))
        .ok_or_else(|| DecodeError::unresolved("", "table", column.to_string()))
}

pub struct ColumnDisplayCodec;

impl AnnotationCodec for ColumnDisplayCodec {
    type Document = ColumnDisplayDocument;

    const KIND: AnnotationKind = AnnotationKind::ColumnDisplay;

    fn decode(raw: &Value, cx: &CodecContext<'_>) -> Result<Self::Document, DecodeError> {
        let table = column_table(cx)?;
        let contexts = Contexts::decode(raw, "", |_, value, path| {
            ColumnDisplayConfig::decode(value, table, path)
        })?;
        Ok(ColumnDisplayDocument { contexts })
    }

    fn encode(doc: &Self::Document) -> Value {
        doc.contexts.encode(ColumnDisplayConfig::encode)
    }

    fn empty(_cx: &CodecContext<'_>) -> Self::Document {
        ColumnDisplayDocument::default()
    }
}
