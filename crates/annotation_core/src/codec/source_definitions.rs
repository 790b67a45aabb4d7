//! `source-definitions`: reusable column lists, foreign-key lists and named
//! source paths of a table, plus the reserved `search-box` source.

use serde_json::{Map, Value};

use crate::error::{DecodeError, EditError};
use crate::schema::{ConstraintName, TableInfo};
use crate::tags::AnnotationKind;

use super::pseudo::PseudoColumn;
use super::source_path::SourcePath;
use super::{
    as_array, as_object, child, duplicate_at, extra, move_down, move_up, opt_str, put, put_extra,
    remove_at, AnnotationCodec, CodecContext, Extra,
};

pub const SEARCH_BOX: &str = "search-box";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection<T> {
    /// `true`
    All,
    Listed(Vec<T>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourceDefinition {
    pub key: String,
    pub definition: PseudoColumn,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchColumn {
    pub source: SourcePath,
    pub markdown_name: Option<String>,
    pub extra: Extra,
}

impl SearchColumn {
    pub fn new(source: SourcePath) -> Self {
        Self {
            source,
            markdown_name: None,
            extra: Extra::default(),
        }
    }
}

/// `{"or": [...]}`
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SearchBox {
    pub columns: Vec<SearchColumn>,
    pub extra: Extra,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SourceDefinitionsDocument {
    pub columns: Option<Selection<String>>,
    pub fkeys: Option<Selection<ConstraintName>>,
    pub sources: Vec<SourceDefinition>,
    pub search_box: Option<SearchBox>,
    /// `sources` was written even though it may be empty.
    sources_declared: bool,
    /// Number of sources written before `search-box`. `None` emits it last.
    search_box_at: Option<usize>,
    pub extra: Extra,
}

/// Source keys defined by a raw `source-definitions` value.
pub fn source_keys_of(raw: Option<&Value>) -> Vec<String> {
    raw.and_then(|r| r.get("sources"))
        .and_then(Value::as_object)
        .map(|sources| {
            sources
                .keys()
                .filter(|k| k.as_str() != SEARCH_BOX)
                .cloned()
                .collect()
        })
        .unwrap_or_default()
}

fn edit_error(e: DecodeError) -> EditError {
    EditError::InvalidEntry(e.to_string())
}

impl SourceDefinitionsDocument {
    pub fn source_keys(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.key.clone()).collect()
    }

    pub fn source(&self, key: &str) -> Option<&SourceDefinition> {
        self.sources.iter().find(|s| s.key == key)
    }

    fn position(&self, key: &str) -> Result<usize, EditError> {
        self.sources
            .iter()
            .position(|s| s.key == key)
            .ok_or_else(|| EditError::UnknownSourceKey(key.to_string()))
    }

    fn is_reserved(&self, table: &TableInfo, key: &str) -> bool {
        key == SEARCH_BOX || table.has_column(key) || self.source(key).is_some()
    }

    fn check_new_key(&self, table: &TableInfo, key: &str) -> Result<(), EditError> {
        if key.is_empty() {
            return Err(EditError::EmptySourceKey);
        }
        if self.is_reserved(table, key) {
            return Err(EditError::SourceKeyTaken(key.to_string()));
        }
        Ok(())
    }

    fn check_definition(
        &self,
        definition: &PseudoColumn,
        cx: &CodecContext<'_>,
        path: &str,
    ) -> Result<(), DecodeError> {
        if definition.source_path().is_none() {
            return Err(DecodeError::invalid(path, "a source definition requires a source"));
        }
        let cx = cx.clone().with_source_keys(self.source_keys());
        definition.check(&cx, path)
    }

    // ── Codec ──────────────────────────────────────────────────

    fn decode(raw: &Value, cx: &CodecContext<'_>) -> Result<Self, DecodeError> {
        let table = cx.require_table()?;
        let map = as_object(raw, "")?;

        let columns = match map.get("columns") {
            None => None,
            Some(Value::Bool(true)) => Some(Selection::All),
            Some(list) => {
                let mut names = Vec::new();
                for (i, c) in as_array(list, "/columns")?.iter().enumerate() {
                    let path = child("/columns", i);
                    let name = c
                        .as_str()
                        .ok_or_else(|| DecodeError::shape(&path, "a column name"))?;
                    if !table.has_column(name) {
                        return Err(DecodeError::unresolved(&path, "column", name));
                    }
                    names.push(name.to_string());
                }
                Some(Selection::Listed(names))
            }
        };

        let fkeys = match map.get("fkeys") {
            None => None,
            Some(Value::Bool(true)) => Some(Selection::All),
            Some(list) => {
                let mut names = Vec::new();
                for (i, f) in as_array(list, "/fkeys")?.iter().enumerate() {
                    let path = child("/fkeys", i);
                    let name = ConstraintName::from_value(f)
                        .ok_or_else(|| DecodeError::shape(&path, "a [schema, name] pair"))?;
                    let outbound = cx
                        .schema
                        .foreign_key(&name)
                        .is_some_and(|fk| fk.table == table.id());
                    if !outbound {
                        return Err(DecodeError::unresolved(
                            &path,
                            "outbound foreign key",
                            name.to_string(),
                        ));
                    }
                    names.push(name);
                }
                Some(Selection::Listed(names))
            }
        };

        let mut doc = Self {
            columns,
            fkeys,
            extra: extra(map, &["columns", "fkeys", "sources"]),
            ..Self::default()
        };

        if let Some(sources) = map.get("sources") {
            doc.sources_declared = true;
            for (key, value) in as_object(sources, "/sources")? {
                let path = child("/sources", key);
                if key == SEARCH_BOX {
                    doc.search_box = Some(decode_search_box(value, &path)?);
                    doc.search_box_at = Some(doc.sources.len());
                    continue;
                }
                if key.is_empty() || table.has_column(key) {
                    return Err(DecodeError::invalid(
                        &path,
                        format!("source key '{key}' is empty or shadows a column"),
                    ));
                }
                doc.sources.push(SourceDefinition {
                    key: key.clone(),
                    definition: PseudoColumn::decode(value, &path)?,
                });
            }
        }

        for source in &doc.sources {
            doc.check_definition(&source.definition, cx, &child("/sources", &source.key))?;
        }
        if let Some(search_box) = &doc.search_box {
            let path = child(&child("/sources", SEARCH_BOX), "or");
            for (i, column) in search_box.columns.iter().enumerate() {
                column
                    .source
                    .resolve(cx.schema, &table.id(), &child(&path, i))?;
            }
        }
        Ok(doc)
    }

    fn encode(&self) -> Value {
        let mut map = Map::new();
        if let Some(columns) = &self.columns {
            map.insert(
                "columns".into(),
                match columns {
                    Selection::All => Value::Bool(true),
                    Selection::Listed(names) => names.clone().into(),
                },
            );
        }
        if let Some(fkeys) = &self.fkeys {
            map.insert(
                "fkeys".into(),
                match fkeys {
                    Selection::All => Value::Bool(true),
                    Selection::Listed(names) => {
                        Value::Array(names.iter().map(ConstraintName::to_value).collect())
                    }
                },
            );
        }
        if self.sources_declared || !self.sources.is_empty() || self.search_box.is_some() {
            let mut sources = Map::new();
            let search_box_at = self.search_box_at.unwrap_or(usize::MAX);
            for (i, source) in self.sources.iter().enumerate() {
                if i == search_box_at {
                    self.put_search_box(&mut sources);
                }
                sources.insert(source.key.clone(), source.definition.encode());
            }
            if !sources.contains_key(SEARCH_BOX) {
                self.put_search_box(&mut sources);
            }
            map.insert("sources".into(), Value::Object(sources));
        }
        put_extra(&mut map, &self.extra);
        Value::Object(map)
    }

    fn put_search_box(&self, sources: &mut Map<String, Value>) {
        if let Some(search_box) = &self.search_box {
            sources.insert(SEARCH_BOX.into(), encode_search_box(search_box));
        }
    }

    // ── Column and foreign key lists ───────────────────────────

    pub fn set_columns(
        &mut self,
        columns: Option<Selection<String>>,
        cx: &CodecContext<'_>,
    ) -> Result<(), EditError> {
        let table = cx.require_table().map_err(edit_error)?;
        if let Some(Selection::Listed(names)) = &columns {
            if let Some(missing) = names.iter().find(|n| !table.has_column(n)) {
                return Err(EditError::InvalidEntry(format!("unknown column '{missing}'")));
            }
        }
        self.columns = columns;
        Ok(())
    }

    pub fn set_fkeys(
        &mut self,
        fkeys: Option<Selection<ConstraintName>>,
        cx: &CodecContext<'_>,
    ) -> Result<(), EditError> {
        let table = cx.require_table().map_err(edit_error)?;
        if let Some(Selection::Listed(names)) = &fkeys {
            let outbound = cx.schema.outbound(&table.id());
            if let Some(missing) = names.iter().find(|n| !outbound.iter().any(|f| &f.name == *n)) {
                return Err(EditError::InvalidEntry(format!(
                    "{missing} is not an outbound foreign key"
                )));
            }
        }
        self.fkeys = fkeys;
        Ok(())
    }

    // ── Sources ────────────────────────────────────────────────

    pub fn add_source(
        &mut self,
        key: &str,
        definition: PseudoColumn,
        cx: &CodecContext<'_>,
    ) -> Result<(), EditError> {
        let table = cx.require_table().map_err(edit_error)?;
        self.check_new_key(table, key)?;
        self.check_definition(&definition, cx, "")
            .map_err(edit_error)?;
        self.sources.push(SourceDefinition {
            key: key.to_string(),
            definition,
        });
        Ok(())
    }

    pub fn rename_source(
        &mut self,
        old: &str,
        new: &str,
        cx: &CodecContext<'_>,
    ) -> Result<(), EditError> {
        let index = self.position(old)?;
        if old == new {
            return Ok(());
        }
        let table = cx.require_table().map_err(edit_error)?;
        self.check_new_key(table, new)?;
        self.sources[index].key = new.to_string();
        for source in &mut self.sources {
            source.definition.rename_source_key(old, new);
        }
        Ok(())
    }

    /// Copy a source directly after the original as `<key>_copy_<n>`, `n`
    /// being the smallest free suffix. Returns the new key.
    pub fn duplicate_source(&mut self, key: &str, cx: &CodecContext<'_>) -> Result<String, EditError> {
        let index = self.position(key)?;
        let table = cx.require_table().map_err(edit_error)?;
        let fresh = (1..)
            .map(|n| format!("{key}_copy_{n}"))
            .find(|candidate| !self.is_reserved(table, candidate))
            .unwrap_or_default();
        duplicate_at(&mut self.sources, index)?;
        self.sources[index + 1].key = fresh.clone();
        Ok(fresh)
    }

    /// Sources other sources still refer to cannot be removed.
    pub fn remove_source(&mut self, key: &str) -> Result<SourceDefinition, EditError> {
        let index = self.position(key)?;
        if let Some(user) = self
            .sources
            .iter()
            .find(|s| s.key != key && s.definition.refers_to(key))
        {
            return Err(EditError::InvalidEntry(format!(
                "source '{key}' is still referenced by '{}'",
                user.key
            )));
        }
        remove_at(&mut self.sources, index)
    }

    pub fn move_source_up(&mut self, key: &str) -> Result<(), EditError> {
        let index = self.position(key)?;
        move_up(&mut self.sources, index)
    }

    pub fn move_source_down(&mut self, key: &str) -> Result<(), EditError> {
        let index = self.position(key)?;
        move_down(&mut self.sources, index)
    }

    // ── Search box ─────────────────────────────────────────────

    pub fn search_columns(&self) -> &[SearchColumn] {
        self.search_box
            .as_ref()
            .map(|b| b.columns.as_slice())
            .unwrap_or_default()
    }

    pub fn add_search_column(
        &mut self,
        column: SearchColumn,
        cx: &CodecContext<'_>,
    ) -> Result<(), EditError> {
        let table = cx.require_table().map_err(edit_error)?;
        column
            .source
            .resolve(cx.schema, &table.id(), "")
            .map_err(edit_error)?;
        self.search_box
            .get_or_insert_with(SearchBox::default)
            .columns
            .push(column);
        Ok(())
    }

    fn search_box_mut(&mut self) -> Result<&mut Vec<SearchColumn>, EditError> {
        match &mut self.search_box {
            Some(b) => Ok(&mut b.columns),
            None => Err(EditError::UnknownSourceKey(SEARCH_BOX.to_string())),
        }
    }

    /// Removing the last column drops the `search-box` source.
    pub fn remove_search_column(&mut self, index: usize) -> Result<SearchColumn, EditError> {
        let removed = remove_at(self.search_box_mut()?, index)?;
        if self.search_columns().is_empty() {
            self.search_box = None;
            self.search_box_at = None;
        }
        Ok(removed)
    }

    pub fn move_search_column_up(&mut self, index: usize) -> Result<(), EditError> {
        move_up(self.search_box_mut()?, index)
    }

    pub fn move_search_column_down(&mut self, index: usize) -> Result<(), EditError> {
        move_down(self.search_box_mut()?, index)
    }

    pub fn duplicate_search_column(&mut self, index: usize) -> Result<(), EditError> {
        duplicate_at(self.search_box_mut()?, index)
    }
}

fn decode_search_box(raw: &Value, path: &str) -> Result<SearchBox, DecodeError> {
    let map = as_object(raw, path)?;
    let or_path = child(path, "or");
    let list = map
        .get("or")
        .ok_or_else(|| DecodeError::shape(path, "an {\"or\": [...]} column list"))?;
    let columns = as_array(list, &or_path)?
        .iter()
        .enumerate()
        .map(|(i, raw)| {
            let path = child(&or_path, i);
            let column = as_object(raw, &path)?;
            let source = column
                .get("source")
                .ok_or_else(|| DecodeError::invalid(&path, "search column requires a source"))?;
            Ok(SearchColumn {
                source: SourcePath::decode(source, &child(&path, "source"))?,
                markdown_name: opt_str(column, "markdown_name", &path)?,
                extra: extra(column, &["source", "markdown_name"]),
            })
        })
        .collect::<Result<Vec<_>, DecodeError>>()?;
    Ok(SearchBox {
        columns,
        extra: extra(map, &["or"]),
    })
}

fn encode_search_box(search_box: &SearchBox) -> Value {
    let columns = search_box
        .columns
        .iter()
        .map(|c| {
            let mut map = Map::new();
            map.insert("source".into(), c.source.encode());
            put(&mut map, "markdown_name", c.markdown_name.clone());
            put_extra(&mut map, &c.extra);
            Value::Object(map)
        })
        .collect();
    let mut map = Map::new();
    map.insert("or".into(), Value::Array(columns));
    put_extra(&mut map, &search_box.extra);
    Value::Object(map)
}

pub struct SourceDefinitionsCodec;

impl AnnotationCodec for SourceDefinitionsCodec {
    type Document = SourceDefinitionsDocument;

    const KIND: AnnotationKind = AnnotationKind::SourceDefinitions;

    fn decode(raw: &Value, cx: &CodecContext<'_>) -> Result<Self::Document, DecodeError> {
        SourceDefinitionsDocument::decode(raw, cx)
    }

    fn encode(doc: &Self::Document) -> Value {
        doc.encode()
    }

    fn empty(_cx: &CodecContext<'_>) -> Self::Document {
        SourceDefinitionsDocument::default()
    }
}
