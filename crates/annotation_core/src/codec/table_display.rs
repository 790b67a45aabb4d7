//! `table-display`: per-context row ordering and markdown patterns.

use serde_json::{Map, Value};

use crate::error::{DecodeError, EditError};
use crate::tags::AnnotationKind;

use super::contexts::{ContextRemoval, ContextSlot, Contexts};
use super::sort_keys::{self, SortKey};
use super::{
    as_object, child, extra, insert_at, move_down, move_up, opt_engine, opt_str, put, put_engine,
    put_extra, remove_at, AnnotationCodec, CodecContext, Extra, TemplateEngine,
};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RowPatterns {
    pub row: Option<String>,
    pub separator: Option<String>,
    pub prefix: Option<String>,
    pub suffix: Option<String>,
}

/// Page and row patterns are mutually exclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkdownPattern {
    Page(String),
    Row(RowPatterns),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DisplayConfig {
    pub row_order: Option<Vec<SortKey>>,
    pub markdown: Option<MarkdownPattern>,
    pub template_engine: Option<TemplateEngine>,
    pub page_size: Option<u64>,
    pub extra: Extra,
}

const FIELDS: &[&str] = &[
    "row_order",
    "page_markdown_pattern",
    "row_markdown_pattern",
    "separator_pattern",
    "prefix_pattern",
    "suffix_pattern",
    "template_engine",
    "page_size",
];

impl DisplayConfig {
    fn decode(raw: &Value, cx: &CodecContext<'_>, path: &str) -> Result<Self, DecodeError> {
        let table = cx.require_table()?;
        let map = as_object(raw, path)?;

        let row_order = match map.get("row_order") {
            None => None,
            Some(raw) => {
                let order_path = child(path, "row_order");
                let keys = sort_keys::decode_list(raw, &order_path)?;
                sort_keys::check_list(&keys, table.column_names(), &order_path)?;
                Some(keys)
            }
        };

        let page = opt_str(map, "page_markdown_pattern", path)?;
        let rows = RowPatterns {
            row: opt_str(map, "row_markdown_pattern", path)?,
            separator: opt_str(map, "separator_pattern", path)?,
            prefix: opt_str(map, "prefix_pattern", path)?,
            suffix: opt_str(map, "suffix_pattern", path)?,
        };
        let markdown = match (page, rows == RowPatterns::default()) {
            (Some(_), false) => {
                return Err(DecodeError::invalid(
                    path,
                    "page_markdown_pattern excludes the row patterns",
                ))
            }
            (Some(page), true) => Some(MarkdownPattern::Page(page)),
            (None, false) => Some(MarkdownPattern::Row(rows)),
            (None, true) => None,
        };

        let page_size = match map.get("page_size") {
            None => None,
            Some(v) => Some(
                v.as_u64()
                    .ok_or_else(|| DecodeError::shape(&child(path, "page_size"), "a non-negative integer"))?,
            ),
        };

        Ok(Self {
            row_order,
            markdown,
            template_engine: opt_engine(map, path)?,
            page_size,
            extra: extra(map, FIELDS),
        })
    }

    fn encode(&self) -> Value {
        let mut map = Map::new();
        put(&mut map, "row_order", self.row_order.as_deref().map(sort_keys::encode_list));
        match &self.markdown {
            Some(MarkdownPattern::Page(page)) => {
                map.insert("page_markdown_pattern".into(), Value::String(page.clone()));
            }
            Some(MarkdownPattern::Row(rows)) => {
                put(&mut map, "row_markdown_pattern", rows.row.clone());
                put(&mut map, "separator_pattern", rows.separator.clone());
                put(&mut map, "prefix_pattern", rows.prefix.clone());
                put(&mut map, "suffix_pattern", rows.suffix.clone());
            }
            None => {}
        }
        put_engine(&mut map, self.template_engine);
        put(&mut map, "page_size", self.page_size);
        put_extra(&mut map, &self.extra);
        Value::Object(map)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TableDisplayDocument {
    pub contexts: Contexts<DisplayConfig>,
}

impl TableDisplayDocument {
    pub fn add_context(&mut self, name: &str) -> Result<(), EditError> {
        self.contexts
            .insert(name, ContextSlot::Value(DisplayConfig::default()))
    }

    pub fn remove_context(&mut self, name: &str, confirmed: bool) -> Result<ContextRemoval, EditError> {
        self.contexts.remove(name, confirmed)
    }

    pub fn config(&self, context: &str) -> Result<&DisplayConfig, EditError> {
        self.contexts.value(context)
    }

    pub fn config_mut(&mut self, context: &str) -> Result<&mut DisplayConfig, EditError> {
        self.contexts.value_mut(context)
    }

    pub fn set_markdown(
        &mut self,
        context: &str,
        pattern: Option<MarkdownPattern>,
    ) -> Result<(), EditError> {
        self.config_mut(context)?.markdown = pattern;
        Ok(())
    }

    pub fn set_page_size(&mut self, context: &str, size: Option<u64>) -> Result<(), EditError> {
        self.config_mut(context)?.page_size = size;
        Ok(())
    }

    // ── Row order ──────────────────────────────────────────────

    fn checked(key: &SortKey, cx: &CodecContext<'_>) -> Result<(), EditError> {
        let table = cx
            .require_table()
            .map_err(|e| EditError::InvalidEntry(e.to_string()))?;
        sort_keys::check_list(std::slice::from_ref(key), table.column_names(), "/row_order")
            .map_err(|e| EditError::InvalidEntry(e.to_string()))
    }

    fn row_order_mut(&mut self, context: &str) -> Result<&mut Vec<SortKey>, EditError> {
        Ok(self
            .config_mut(context)?
            .row_order
            .get_or_insert_with(Vec::new))
    }

    /// Drop an emptied `row_order` so it is no longer emitted.
    fn prune(&mut self, context: &str) {
        if let Ok(config) = self.config_mut(context) {
            if config.row_order.as_ref().is_some_and(Vec::is_empty) {
                config.row_order = None;
            }
        }
    }

    pub fn push_sort_key(
        &mut self,
        context: &str,
        key: SortKey,
        cx: &CodecContext<'_>,
    ) -> Result<(), EditError> {
        Self::checked(&key, cx)?;
        self.row_order_mut(context)?.push(key);
        Ok(())
    }

    pub fn insert_sort_key(
        &mut self,
        context: &str,
        index: usize,
        key: SortKey,
        cx: &CodecContext<'_>,
    ) -> Result<(), EditError> {
        Self::checked(&key, cx)?;
        let result = insert_at(self.row_order_mut(context)?, index, key);
        self.prune(context);
        result
    }

    pub fn pop_sort_key(&mut self, context: &str) -> Result<Option<SortKey>, EditError> {
        let popped = self
            .config_mut(context)?
            .row_order
            .as_mut()
            .and_then(Vec::pop);
        self.prune(context);
        Ok(popped)
    }

    pub fn remove_sort_key(&mut self, context: &str, index: usize) -> Result<SortKey, EditError> {
        let result = remove_at(self.row_order_mut(context)?, index);
        self.prune(context);
        result
    }

    pub fn move_sort_key_up(&mut self, context: &str, index: usize) -> Result<(), EditError> {
        let result = move_up(self.row_order_mut(context)?, index);
        self.prune(context);
        result
    }

    pub fn move_sort_key_down(&mut self, context: &str, index: usize) -> Result<(), EditError> {
        let result = move_down(self.row_order_mut(context)?, index);
        self.prune(context);
        result
    }
}

pub struct TableDisplayCodec;

impl AnnotationCodec for TableDisplayCodec {
    type Document = TableDisplayDocument;

    const KIND: AnnotationKind = AnnotationKind::TableDisplay;

    fn decode(raw: &Value, cx: &CodecContext<'_>) -> Result<Self::Document, DecodeError> {
        let contexts = Contexts::decode(raw, "", |_, value, path| {
            DisplayConfig::decode(value, cx, path)
        })?;
        Ok(TableDisplayDocument { contexts })
    }

    fn encode(doc: &Self::Document) -> Value {
        doc.contexts.encode(DisplayConfig::encode)
    }

    fn empty(_cx: &CodecContext<'_>) -> Self::Document {
        TableDisplayDocument::default()
    }
}
