//! Schema Model — arena of catalog objects keyed by stable path identifiers.
//!
//! The model is loaded from a raw ERMrest-style catalog document and replaced
//! wholesale on every refresh. Nothing holds in-memory references into it across
//! a reload; codecs and editors keep `ObjectId`s and re-resolve.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::SchemaParseError;

// ── Identity ───────────────────────────────────────────────────

/// ERMrest constraint name, written `[schema, name]` in annotations.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConstraintName {
    pub schema: String,
    pub name: String,
}

impl ConstraintName {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }

    /// Parses the `[schema, name]` annotation form.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value.as_array()?.as_slice() {
            [Value::String(schema), Value::String(name)] => Some(Self::new(schema, name)),
            _ => None,
        }
    }

    pub fn to_value(&self) -> Value {
        Value::Array(vec![
            Value::String(self.schema.clone()),
            Value::String(self.name.clone()),
        ])
    }
}

impl fmt::Display for ConstraintName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.schema, self.name)
    }
}

/// Path identifier of a node in the catalog browse tree.
///
/// `Annotations` names the annotations document of its owner. It is a valid
/// selection but never a `ModelObject` and never an annotation owner.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ObjectId {
    Catalog,
    Schema {
        schema: String,
    },
    Table {
        schema: String,
        table: String,
    },
    Column {
        schema: String,
        table: String,
        column: String,
    },
    Key {
        schema: String,
        name: String,
    },
    ForeignKey {
        schema: String,
        name: String,
    },
    Annotations {
        owner: Box<ObjectId>,
    },
}

impl ObjectId {
    pub fn schema(schema: impl Into<String>) -> Self {
        Self::Schema {
            schema: schema.into(),
        }
    }

    pub fn table(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self::Table {
            schema: schema.into(),
            table: table.into(),
        }
    }

    pub fn column(
        schema: impl Into<String>,
        table: impl Into<String>,
        column: impl Into<String>,
    ) -> Self {
        Self::Column {
            schema: schema.into(),
            table: table.into(),
            column: column.into(),
        }
    }

    pub fn key(name: &ConstraintName) -> Self {
        Self::Key {
            schema: name.schema.clone(),
            name: name.name.clone(),
        }
    }

    pub fn foreign_key(name: &ConstraintName) -> Self {
        Self::ForeignKey {
            schema: name.schema.clone(),
            name: name.name.clone(),
        }
    }

    pub fn annotations(owner: ObjectId) -> Self {
        Self::Annotations {
            owner: Box::new(owner),
        }
    }

    /// Model object kind, `None` for an annotations document.
    pub fn kind(&self) -> Option<ObjectKind> {
        match self {
            Self::Catalog => Some(ObjectKind::Catalog),
            Self::Schema { .. } => Some(ObjectKind::Schema),
            Self::Table { .. } => Some(ObjectKind::Table),
            Self::Column { .. } => Some(ObjectKind::Column),
            Self::Key { .. } => Some(ObjectKind::Key),
            Self::ForeignKey { .. } => Some(ObjectKind::ForeignKey),
            Self::Annotations { .. } => None,
        }
    }

    pub fn carries_annotations(&self) -> bool {
        !matches!(self, Self::Annotations { .. })
    }
}

/// Leading path words that name an object kind rather than a schema.
const RESERVED: [&str; 4] = ["catalog", "key", "fkey", "annotations"];

/// Escape one path segment. `%` and `:` are always escaped; a leading segment
/// equal to a reserved word has its first letter escaped.
fn escape(segment: &str, leading: bool) -> String {
    let reserved = leading && RESERVED.contains(&segment);
    let mut out = String::with_capacity(segment.len());
    for (i, c) in segment.chars().enumerate() {
        match c {
            '%' => out.push_str("%25"),
            ':' => out.push_str("%3A"),
            c if i == 0 && reserved => out.push_str(&format!("%{:02X}", u32::from(c))),
            c => out.push(c),
        }
    }
    out
}

fn unescape(segment: &str) -> Result<String, String> {
    let invalid = || format!("invalid escape in '{segment}'");
    let mut bytes = Vec::with_capacity(segment.len());
    let mut rest = segment.as_bytes();
    while let Some((&b, tail)) = rest.split_first() {
        if b != b'%' {
            bytes.push(b);
            rest = tail;
            continue;
        }
        let (hex, tail) = (tail.get(..2).ok_or_else(invalid)?, &tail[2..]);
        let byte = std::str::from_utf8(hex)
            .ok()
            .and_then(|h| u8::from_str_radix(h, 16).ok())
            .ok_or_else(invalid)?;
        bytes.push(byte);
        rest = tail;
    }
    String::from_utf8(bytes).map_err(|_| invalid())
}

/// Path form, e.g. `isa:dataset:title` or `fkey:isa:dataset_owner_fkey`.
/// Names are escaped so that every id parses back to itself.
impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Catalog => write!(f, "catalog"),
            Self::Schema { schema } => write!(f, "{}", escape(schema, true)),
            Self::Table { schema, table } => {
                write!(f, "{}:{}", escape(schema, true), escape(table, false))
            }
            Self::Column {
                schema,
                table,
                column,
            } => write!(
                f,
                "{}:{}:{}",
                escape(schema, true),
                escape(table, false),
                escape(column, false)
            ),
            Self::Key { schema, name } => {
                write!(f, "key:{}:{}", escape(schema, false), escape(name, false))
            }
            Self::ForeignKey { schema, name } => {
                write!(f, "fkey:{}:{}", escape(schema, false), escape(name, false))
            }
            Self::Annotations { owner } => write!(f, "annotations:{owner}"),
        }
    }
}

impl FromStr for ObjectId {
    type Err = String;

    /// Parses the display form. Reserved words are only recognised
    /// unescaped, so escaped schema names never collide with them.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "catalog" {
            return Ok(Self::Catalog);
        }
        if let Some(owner) = s.strip_prefix("annotations:") {
            return Ok(Self::annotations(owner.parse()?));
        }
        let parts: Vec<&str> = s.split(':').collect();
        if parts.iter().any(|p| p.is_empty()) {
            return Err(format!("invalid object path '{s}'"));
        }
        let (kind, names) = match parts.split_first() {
            Some((&"key", names)) | Some((&"fkey", names)) => (Some(parts[0]), names),
            _ => (None, parts.as_slice()),
        };
        let names = names
            .iter()
            .map(|p| unescape(p))
            .collect::<Result<Vec<_>, _>>()?;
        match (kind, names.as_slice()) {
            (Some("key"), [schema, name]) => Ok(Self::key(&ConstraintName::new(schema, name))),
            (Some(_), [schema, name]) => Ok(Self::foreign_key(&ConstraintName::new(schema, name))),
            (None, [schema]) => Ok(Self::schema(schema)),
            (None, [schema, table]) => Ok(Self::table(schema, table)),
            (None, [schema, table, column]) => Ok(Self::column(schema, table, column)),
            _ => Err(format!("invalid object path '{s}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    Catalog,
    Schema,
    Table,
    Column,
    Key,
    ForeignKey,
}

impl ObjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Catalog => "catalog",
            Self::Schema => "schema",
            Self::Table => "table",
            Self::Column => "column",
            Self::Key => "key",
            Self::ForeignKey => "foreign_key",
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ── Model objects ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub type_name: Option<String>,
    pub nullok: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableInfo {
    pub schema: String,
    pub name: String,
    pub kind: String,
    pub columns: Vec<ColumnInfo>,
    pub keys: Vec<ConstraintName>,
    pub foreign_keys: Vec<ConstraintName>,
}

impl TableInfo {
    pub fn id(&self) -> ObjectId {
        ObjectId::table(&self.schema, &self.name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> + Clone {
        self.columns.iter().map(|c| c.name.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyInfo {
    pub name: ConstraintName,
    pub table: ObjectId,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyInfo {
    pub name: ConstraintName,
    /// Table holding the referencing columns.
    pub table: ObjectId,
    pub columns: Vec<String>,
    pub referenced_table: ObjectId,
    pub referenced_columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectDetail {
    Catalog { schemas: Vec<String> },
    Schema { tables: Vec<String> },
    Table(TableInfo),
    Column(ColumnInfo),
    Key(KeyInfo),
    ForeignKey(ForeignKeyInfo),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelObject {
    pub id: ObjectId,
    pub comment: Option<String>,
    pub detail: ObjectDetail,
}

impl ModelObject {
    pub fn kind(&self) -> ObjectKind {
        match self.detail {
            ObjectDetail::Catalog { .. } => ObjectKind::Catalog,
            ObjectDetail::Schema { .. } => ObjectKind::Schema,
            ObjectDetail::Table(_) => ObjectKind::Table,
            ObjectDetail::Column(_) => ObjectKind::Column,
            ObjectDetail::Key(_) => ObjectKind::Key,
            ObjectDetail::ForeignKey(_) => ObjectKind::ForeignKey,
        }
    }
}

// ── Schema model ───────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct SchemaModel {
    objects: BTreeMap<ObjectId, ModelObject>,
    inbound: HashMap<ObjectId, Vec<ConstraintName>>,
}

impl SchemaModel {
    /// Build the model from a raw catalog document.
    ///
    /// Foreign keys are resolved in a second pass so that references to
    /// tables declared later in the document are accepted.
    pub fn load(raw: &Value) -> Result<Self, SchemaParseError> {
        let root = object_at(raw, "", "catalog")?;
        let schemas = required(root, "", "schemas")?;
        let schemas = object_at(schemas, "/schemas", "schemas")?;

        let mut model = SchemaModel::default();
        let mut deferred_fkeys = Vec::new();
        let mut schema_names = Vec::new();

        for (schema_name, schema_doc) in schemas {
            let path = format!("/schemas/{schema_name}");
            let schema = object_at(schema_doc, &path, "schemas")?;
            let mut table_names = Vec::new();

            if let Some(tables) = schema.get("tables") {
                let tables_path = format!("{path}/tables");
                for (table_name, table_doc) in object_at(tables, &tables_path, "tables")? {
                    let table_path = format!("{tables_path}/{table_name}");
                    let table = object_at(table_doc, &table_path, "tables")?;
                    model.load_table(schema_name, table_name, table, &table_path)?;
                    if let Some(fkeys) = table.get("foreign_keys") {
                        deferred_fkeys.push((
                            ObjectId::table(schema_name, table_name),
                            table_path.clone(),
                            fkeys,
                        ));
                    }
                    table_names.push(table_name.clone());
                }
            }

            model.insert(ModelObject {
                id: ObjectId::schema(schema_name),
                comment: comment_of(schema),
                detail: ObjectDetail::Schema {
                    tables: table_names,
                },
            })?;
            schema_names.push(schema_name.clone());
        }

        for (table_id, table_path, fkeys) in deferred_fkeys {
            let fkeys_path = format!("{table_path}/foreign_keys");
            let list = fkeys
                .as_array()
                .ok_or_else(|| invalid(&fkeys_path, "foreign_keys", "expected an array"))?;
            for (i, fkey) in list.iter().enumerate() {
                model.load_foreign_key(&table_id, fkey, &format!("{fkeys_path}/{i}"))?;
            }
        }

        model.insert(ModelObject {
            id: ObjectId::Catalog,
            comment: None,
            detail: ObjectDetail::Catalog {
                schemas: schema_names,
            },
        })?;

        Ok(model)
    }

    fn load_table(
        &mut self,
        schema_name: &str,
        table_name: &str,
        table: &Map<String, Value>,
        path: &str,
    ) -> Result<(), SchemaParseError> {
        let columns_path = format!("{path}/column_definitions");
        let raw_columns = required(table, path, "column_definitions")?
            .as_array()
            .ok_or_else(|| invalid(&columns_path, "column_definitions", "expected an array"))?;

        let mut columns = Vec::with_capacity(raw_columns.len());
        for (i, raw_column) in raw_columns.iter().enumerate() {
            let column_path = format!("{columns_path}/{i}");
            let column = object_at(raw_column, &column_path, "column_definitions")?;
            let name = required_str(column, &column_path, "name")?;
            if columns.iter().any(|c: &ColumnInfo| c.name == name) {
                return Err(SchemaParseError::Duplicate(format!(
                    "{schema_name}:{table_name}:{name}"
                )));
            }
            let info = ColumnInfo {
                name: name.to_string(),
                type_name: column
                    .get("type")
                    .and_then(|t| t.get("typename"))
                    .and_then(Value::as_str)
                    .map(str::to_string),
                nullok: column.get("nullok").and_then(Value::as_bool).unwrap_or(true),
            };
            self.insert(ModelObject {
                id: ObjectId::column(schema_name, table_name, name),
                comment: comment_of(column),
                detail: ObjectDetail::Column(info.clone()),
            })?;
            columns.push(info);
        }

        let mut info = TableInfo {
            schema: schema_name.to_string(),
            name: table_name.to_string(),
            kind: table
                .get("kind")
                .and_then(Value::as_str)
                .unwrap_or("table")
                .to_string(),
            columns,
            keys: Vec::new(),
            foreign_keys: Vec::new(),
        };

        if let Some(keys) = table.get("keys") {
            let keys_path = format!("{path}/keys");
            let list = keys
                .as_array()
                .ok_or_else(|| invalid(&keys_path, "keys", "expected an array"))?;
            for (i, raw_key) in list.iter().enumerate() {
                let key_path = format!("{keys_path}/{i}");
                let key = object_at(raw_key, &key_path, "keys")?;
                let name = constraint_name_of(key, &key_path)?;
                let unique = required(key, &key_path, "unique_columns")?
                    .as_array()
                    .ok_or_else(|| invalid(&key_path, "unique_columns", "expected an array"))?;
                let mut key_columns = Vec::with_capacity(unique.len());
                for column in unique {
                    let column = column.as_str().ok_or_else(|| {
                        invalid(&key_path, "unique_columns", "expected column names")
                    })?;
                    if !info.has_column(column) {
                        return Err(SchemaParseError::DanglingReference {
                            path: key_path.clone(),
                            message: format!("key column '{column}' not in {schema_name}:{table_name}"),
                        });
                    }
                    key_columns.push(column.to_string());
                }
                if key_columns.is_empty() {
                    return Err(invalid(&key_path, "unique_columns", "must not be empty"));
                }
                self.insert(ModelObject {
                    id: ObjectId::key(&name),
                    comment: comment_of(key),
                    detail: ObjectDetail::Key(KeyInfo {
                        name: name.clone(),
                        table: info.id(),
                        columns: key_columns,
                    }),
                })?;
                info.keys.push(name);
            }
        }

        self.insert(ModelObject {
            id: info.id(),
            comment: comment_of(table),
            detail: ObjectDetail::Table(info),
        })
    }

    fn load_foreign_key(
        &mut self,
        table_id: &ObjectId,
        raw: &Value,
        path: &str,
    ) -> Result<(), SchemaParseError> {
        let fkey = object_at(raw, path, "foreign_keys")?;
        let name = constraint_name_of(fkey, path)?;
        let from = column_refs(fkey, path, "foreign_key_columns")?;
        let to = column_refs(fkey, path, "referenced_columns")?;
        if from.len() != to.len() {
            return Err(invalid(
                path,
                "referenced_columns",
                "must pair one-to-one with foreign_key_columns",
            ));
        }

        let owner = self
            .table(table_id)
            .ok_or_else(|| SchemaParseError::DanglingReference {
                path: path.to_string(),
                message: format!("owning table {table_id} not loaded"),
            })?;
        for (_, _, column) in &from {
            if !owner.has_column(column) {
                return Err(SchemaParseError::DanglingReference {
                    path: path.to_string(),
                    message: format!("column '{column}' not in {table_id}"),
                });
            }
        }

        let (ref_schema, ref_table, _) = &to[0];
        if to.iter().any(|(s, t, _)| s != ref_schema || t != ref_table) {
            return Err(invalid(
                path,
                "referenced_columns",
                "must all belong to one table",
            ));
        }
        let referenced_id = ObjectId::table(ref_schema, ref_table);
        let referenced = self
            .table(&referenced_id)
            .ok_or_else(|| SchemaParseError::DanglingReference {
                path: path.to_string(),
                message: format!("referenced table {referenced_id} does not exist"),
            })?;
        for (_, _, column) in &to {
            if !referenced.has_column(column) {
                return Err(SchemaParseError::DanglingReference {
                    path: path.to_string(),
                    message: format!("referenced column '{column}' not in {referenced_id}"),
                });
            }
        }

        self.insert(ModelObject {
            id: ObjectId::foreign_key(&name),
            comment: comment_of(fkey),
            detail: ObjectDetail::ForeignKey(ForeignKeyInfo {
                name: name.clone(),
                table: table_id.clone(),
                columns: from.into_iter().map(|(_, _, c)| c).collect(),
                referenced_table: referenced_id.clone(),
                referenced_columns: to.into_iter().map(|(_, _, c)| c).collect(),
            }),
        })?;

        if let Some(ModelObject {
            detail: ObjectDetail::Table(owner),
            ..
        }) = self.objects.get_mut(table_id)
        {
            owner.foreign_keys.push(name.clone());
        }
        self.inbound.entry(referenced_id).or_default().push(name);
        Ok(())
    }

    fn insert(&mut self, object: ModelObject) -> Result<(), SchemaParseError> {
        if self.objects.contains_key(&object.id) {
            return Err(SchemaParseError::Duplicate(object.id.to_string()));
        }
        self.objects.insert(object.id.clone(), object);
        Ok(())
    }

    // ── Queries ────────────────────────────────────────────────

    pub fn resolve(&self, id: &ObjectId) -> Option<&ModelObject> {
        self.objects.get(id)
    }

    pub fn contains(&self, id: &ObjectId) -> bool {
        self.objects.contains_key(id)
    }

    pub fn objects(&self) -> impl Iterator<Item = &ModelObject> {
        self.objects.values()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn table(&self, id: &ObjectId) -> Option<&TableInfo> {
        match &self.objects.get(id)?.detail {
            ObjectDetail::Table(info) => Some(info),
            _ => None,
        }
    }

    pub fn key(&self, name: &ConstraintName) -> Option<&KeyInfo> {
        match &self.objects.get(&ObjectId::key(name))?.detail {
            ObjectDetail::Key(info) => Some(info),
            _ => None,
        }
    }

    pub fn foreign_key(&self, name: &ConstraintName) -> Option<&ForeignKeyInfo> {
        match &self.objects.get(&ObjectId::foreign_key(name))?.detail {
            ObjectDetail::ForeignKey(info) => Some(info),
            _ => None,
        }
    }

    /// Foreign keys declared on `table` (ERMrest `foreign_keys`).
    pub fn outbound(&self, table: &ObjectId) -> Vec<&ForeignKeyInfo> {
        self.table(table)
            .map(|t| {
                t.foreign_keys
                    .iter()
                    .filter_map(|name| self.foreign_key(name))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Foreign keys referencing `table` (ERMrest `referenced_by`).
    pub fn inbound(&self, table: &ObjectId) -> Vec<&ForeignKeyInfo> {
        self.inbound
            .get(table)
            .map(|names| names.iter().filter_map(|n| self.foreign_key(n)).collect())
            .unwrap_or_default()
    }

    /// Table that owns a column, key or foreign key; a table owns itself.
    pub fn owning_table(&self, id: &ObjectId) -> Option<ObjectId> {
        match id {
            ObjectId::Table { .. } => self.table(id).map(TableInfo::id),
            ObjectId::Column { schema, table, .. } => {
                let table = ObjectId::table(schema, table);
                self.contains(&table).then_some(table)
            }
            ObjectId::Key { .. } => match &self.resolve(id)?.detail {
                ObjectDetail::Key(key) => Some(key.table.clone()),
                _ => None,
            },
            ObjectId::ForeignKey { .. } => match &self.resolve(id)?.detail {
                ObjectDetail::ForeignKey(fkey) => Some(fkey.table.clone()),
                _ => None,
            },
            _ => None,
        }
    }
}

// ── Raw document helpers ───────────────────────────────────────

fn object_at<'a>(
    value: &'a Value,
    path: &str,
    field: &'static str,
) -> Result<&'a Map<String, Value>, SchemaParseError> {
    value
        .as_object()
        .ok_or_else(|| invalid(path, field, "expected an object"))
}

fn required<'a>(
    object: &'a Map<String, Value>,
    path: &str,
    field: &'static str,
) -> Result<&'a Value, SchemaParseError> {
    object.get(field).ok_or_else(|| SchemaParseError::MissingField {
        path: display_path(path),
        field,
    })
}

fn required_str<'a>(
    object: &'a Map<String, Value>,
    path: &str,
    field: &'static str,
) -> Result<&'a str, SchemaParseError> {
    required(object, path, field)?
        .as_str()
        .ok_or_else(|| invalid(path, field, "expected a string"))
}

fn constraint_name_of(
    object: &Map<String, Value>,
    path: &str,
) -> Result<ConstraintName, SchemaParseError> {
    required(object, path, "names")?
        .as_array()
        .and_then(|names| names.first())
        .and_then(ConstraintName::from_value)
        .ok_or_else(|| invalid(path, "names", "expected a non-empty list of [schema, name] pairs"))
}

fn column_refs(
    object: &Map<String, Value>,
    path: &str,
    field: &'static str,
) -> Result<Vec<(String, String, String)>, SchemaParseError> {
    let list = required(object, path, field)?
        .as_array()
        .filter(|l| !l.is_empty())
        .ok_or_else(|| invalid(path, field, "expected a non-empty array"))?;
    list.iter()
        .map(|c| {
            let part = |name: &str| c.get(name).and_then(Value::as_str).map(str::to_string);
            match (part("schema_name"), part("table_name"), part("column_name")) {
                (Some(s), Some(t), Some(c)) => Ok((s, t, c)),
                _ => Err(invalid(
                    path,
                    field,
                    "expected schema_name, table_name and column_name",
                )),
            }
        })
        .collect()
}

fn comment_of(object: &Map<String, Value>) -> Option<String> {
    object
        .get("comment")
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn invalid(path: &str, field: &'static str, message: &str) -> SchemaParseError {
    SchemaParseError::InvalidField {
        path: display_path(path),
        field,
        message: message.to_string(),
    }
}

fn display_path(path: &str) -> String {
    if path.is_empty() {
        "/".to_string()
    } else {
        path.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, constraint, dataset, experiment, person};
    use serde_json::json;

    #[test]
    fn loads_fixture_objects() {
        let model = testing::schema_model();
        assert!(model.contains(&ObjectId::Catalog));
        assert!(model.contains(&ObjectId::schema("isa")));
        assert!(model.contains(&ObjectId::column("isa", "dataset", "title")));
        assert_eq!(
            model.resolve(&dataset()).map(ModelObject::kind),
            Some(ObjectKind::Table)
        );
        let table = model.table(&dataset()).unwrap();
        assert_eq!(
            table.column_names().collect::<Vec<_>>(),
            vec!["RID", "id", "title", "owner"]
        );
        assert_eq!(table.keys.len(), 2);
    }

    #[test]
    fn foreign_keys_are_indexed_both_ways() {
        let model = testing::schema_model();
        let outbound: Vec<_> = model.outbound(&dataset()).iter().map(|f| f.name.clone()).collect();
        assert_eq!(outbound, vec![constraint("dataset_owner_fkey")]);
        let inbound: Vec<_> = model.inbound(&dataset()).iter().map(|f| f.name.clone()).collect();
        assert_eq!(inbound, vec![constraint("experiment_dataset_fkey")]);
        assert!(model.inbound(&experiment()).is_empty());
        assert_eq!(model.inbound(&person()).len(), 1);
    }

    #[test]
    fn owning_table_of_constraints() {
        let model = testing::schema_model();
        let fkey = ObjectId::foreign_key(&constraint("experiment_dataset_fkey"));
        assert_eq!(model.owning_table(&fkey), Some(experiment()));
        let key = ObjectId::key(&constraint("dataset_id_key"));
        assert_eq!(model.owning_table(&key), Some(dataset()));
        assert_eq!(model.owning_table(&ObjectId::Catalog), None);
    }

    #[test]
    fn missing_schemas_is_parse_error() {
        let err = SchemaModel::load(&json!({ "annotations": {} })).unwrap_err();
        assert_eq!(
            err,
            SchemaParseError::MissingField {
                path: "/".into(),
                field: "schemas"
            }
        );
    }

    #[test]
    fn dangling_foreign_key_is_parse_error() {
        let mut doc = testing::catalog_document();
        doc["schemas"]["isa"]["tables"]
            .as_object_mut()
            .unwrap()
            .remove("person");
        let err = SchemaModel::load(&doc).unwrap_err();
        assert!(matches!(err, SchemaParseError::DanglingReference { .. }), "{err}");
    }

    #[test]
    fn key_on_unknown_column_is_parse_error() {
        let mut doc = testing::catalog_document();
        doc["schemas"]["isa"]["tables"]["person"]["keys"][0]["unique_columns"] = json!(["nope"]);
        let err = SchemaModel::load(&doc).unwrap_err();
        assert!(matches!(err, SchemaParseError::DanglingReference { .. }));
    }

    #[test]
    fn duplicate_constraint_name_is_parse_error() {
        let mut doc = testing::catalog_document();
        doc["schemas"]["isa"]["tables"]["experiment"]["keys"][0]["names"] =
            json!([["isa", "person_pkey"]]);
        let err = SchemaModel::load(&doc).unwrap_err();
        assert_eq!(err, SchemaParseError::Duplicate("key:isa:person_pkey".into()));
    }

    #[test]
    fn object_id_display_round_trips() {
        let ids = [
            ObjectId::Catalog,
            ObjectId::schema("isa"),
            dataset(),
            ObjectId::column("isa", "dataset", "id"),
            ObjectId::key(&constraint("dataset_pkey")),
            ObjectId::foreign_key(&constraint("dataset_owner_fkey")),
            ObjectId::annotations(dataset()),
        ];
        for id in ids {
            assert_eq!(id.to_string().parse::<ObjectId>().unwrap(), id);
        }
        assert!("isa::x".parse::<ObjectId>().is_err());
        assert!("a:b:c:d".parse::<ObjectId>().is_err());
    }

    #[test]
    fn reserved_and_separator_names_round_trip() {
        let ids = [
            ObjectId::schema("catalog"),
            ObjectId::table("annotations", "t"),
            ObjectId::column("key", "t", "c"),
            ObjectId::column("fkey", "a:b", "50%"),
            ObjectId::key(&ConstraintName::new("key", "k:1")),
            ObjectId::annotations(ObjectId::schema("catalog")),
        ];
        for id in ids {
            let text = id.to_string();
            assert_eq!(text.parse::<ObjectId>().unwrap(), id, "{text}");
        }
        assert_eq!(ObjectId::schema("catalog").to_string(), "%63atalog");
        assert_eq!(ObjectId::column("fkey", "a:b", "c").to_string(), "%66key:a%3Ab:c");
        assert_eq!("catalog".parse::<ObjectId>().unwrap(), ObjectId::Catalog);
        assert!("isa:%zz".parse::<ObjectId>().is_err());
        assert!("isa:50%".parse::<ObjectId>().is_err());
    }

    #[test]
    fn annotations_document_is_not_an_owner() {
        let id = ObjectId::annotations(dataset());
        assert!(!id.carries_annotations());
        assert_eq!(id.kind(), None);
        assert!(dataset().carries_annotations());
    }

    #[test]
    fn constraint_name_value_form() {
        let name = ConstraintName::from_value(&json!(["isa", "k"])).unwrap();
        assert_eq!(name.to_value(), json!(["isa", "k"]));
        assert!(ConstraintName::from_value(&json!(["isa"])).is_none());
        assert!(ConstraintName::from_value(&json!("isa:k")).is_none());
    }
}
