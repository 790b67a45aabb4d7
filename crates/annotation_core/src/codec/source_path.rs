//! Source paths: a column of the annotated table, or a walk over foreign keys
//! ending in a column of the table reached.

use serde_json::{json, Value};

use crate::error::DecodeError;
use crate::schema::{ConstraintName, ObjectId, SchemaModel};

use super::{as_array, as_object, child};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathHop {
    /// Follow a foreign key that references the current table.
    Inbound(ConstraintName),
    /// Follow a foreign key declared on the current table.
    Outbound(ConstraintName),
}

impl PathHop {
    pub fn constraint(&self) -> &ConstraintName {
        match self {
            Self::Inbound(name) | Self::Outbound(name) => name,
        }
    }

    fn decode(raw: &Value, path: &str) -> Result<Self, DecodeError> {
        let map = as_object(raw, path)?;
        let (direction, name) = match (map.get("inbound"), map.get("outbound")) {
            (Some(name), None) if map.len() == 1 => ("inbound", name),
            (None, Some(name)) if map.len() == 1 => ("outbound", name),
            _ => return Err(DecodeError::shape(path, "an inbound or outbound hop")),
        };
        let name = ConstraintName::from_value(name)
            .ok_or_else(|| DecodeError::shape(&child(path, direction), "a [schema, name] pair"))?;
        Ok(match direction {
            "inbound" => Self::Inbound(name),
            _ => Self::Outbound(name),
        })
    }

    fn encode(&self) -> Value {
        match self {
            Self::Inbound(name) => json!({ "inbound": name.to_value() }),
            Self::Outbound(name) => json!({ "outbound": name.to_value() }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourcePath {
    Column(String),
    /// List form; `hops` may be empty.
    Path { hops: Vec<PathHop>, column: String },
}

impl SourcePath {
    pub fn column(name: impl Into<String>) -> Self {
        Self::Column(name.into())
    }

    pub fn terminal_column(&self) -> &str {
        match self {
            Self::Column(c) | Self::Path { column: c, .. } => c,
        }
    }

    pub fn hops(&self) -> &[PathHop] {
        match self {
            Self::Column(_) => &[],
            Self::Path { hops, .. } => hops,
        }
    }

    pub fn decode(raw: &Value, path: &str) -> Result<Self, DecodeError> {
        if let Value::String(column) = raw {
            return Ok(Self::Column(column.clone()));
        }
        let items = as_array(raw, path)?;
        let Some((last, hops)) = items.split_last() else {
            return Err(DecodeError::invalid(path, "source path must not be empty"));
        };
        let column = last
            .as_str()
            .ok_or_else(|| DecodeError::shape(&child(path, hops.len()), "a column name"))?
            .to_string();
        let hops = hops
            .iter()
            .enumerate()
            .map(|(i, hop)| PathHop::decode(hop, &child(path, i)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::Path { hops, column })
    }

    pub fn encode(&self) -> Value {
        match self {
            Self::Column(c) => Value::String(c.clone()),
            Self::Path { hops, column } => {
                let mut items: Vec<Value> = hops.iter().map(PathHop::encode).collect();
                items.push(Value::String(column.clone()));
                Value::Array(items)
            }
        }
    }

    /// Walk the path from `table`; returns the table holding the terminal column.
    pub fn resolve(
        &self,
        schema: &SchemaModel,
        table: &ObjectId,
        path: &str,
    ) -> Result<ObjectId, DecodeError> {
        let mut current = table.clone();
        for (i, hop) in self.hops().iter().enumerate() {
            let hop_path = child(path, i);
            let fkey = schema
                .foreign_key(hop.constraint())
                .ok_or_else(|| {
                    DecodeError::unresolved(&hop_path, "foreign key", hop.constraint().to_string())
                })?;
            current = match hop {
                PathHop::Outbound(_) if fkey.table == current => fkey.referenced_table.clone(),
                PathHop::Inbound(_) if fkey.referenced_table == current => fkey.table.clone(),
                _ => {
                    return Err(DecodeError::invalid(
                        &hop_path,
                        format!("{} does not connect to {current}", fkey.name),
                    ))
                }
            };
        }
        let column = self.terminal_column();
        let holder = schema
            .table(&current)
            .ok_or_else(|| DecodeError::unresolved(path, "table", current.to_string()))?;
        if !holder.has_column(column) {
            return Err(DecodeError::unresolved(path, "column", format!("{current}:{column}")));
        }
        Ok(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, dataset, experiment, person};

    #[test]
    fn bare_column_and_list_forms_are_distinct() {
        let bare = SourcePath::decode(&json!("title"), "").unwrap();
        let list = SourcePath::decode(&json!(["title"]), "").unwrap();
        assert_ne!(bare, list);
        assert_eq!(bare.encode(), json!("title"));
        assert_eq!(list.encode(), json!(["title"]));
    }

    #[test]
    fn resolves_across_hops() {
        let model = testing::schema_model();
        let raw = json!([
            { "inbound": ["isa", "experiment_dataset_fkey"] },
            "label"
        ]);
        let path = SourcePath::decode(&raw, "").unwrap();
        assert_eq!(path.resolve(&model, &dataset(), "").unwrap(), experiment());

        let outbound = SourcePath::decode(
            &json!([{ "outbound": ["isa", "dataset_owner_fkey"] }, "email"]),
            "",
        )
        .unwrap();
        assert_eq!(outbound.resolve(&model, &dataset(), "").unwrap(), person());
    }

    #[test]
    fn wrong_direction_is_rejected() {
        let model = testing::schema_model();
        let path = SourcePath::decode(
            &json!([{ "outbound": ["isa", "experiment_dataset_fkey"] }, "label"]),
            "",
        )
        .unwrap();
        assert!(matches!(
            path.resolve(&model, &dataset(), ""),
            Err(DecodeError::Invalid { .. })
        ));
    }

    #[test]
    fn unknown_column_is_unresolved() {
        let model = testing::schema_model();
        let err = SourcePath::column("nope")
            .resolve(&model, &dataset(), "/source")
            .unwrap_err();
        assert_eq!(
            err,
            DecodeError::UnresolvedReference {
                path: "/source".into(),
                what: "column",
                name: "isa:dataset:nope".into()
            }
        );
    }

    #[test]
    fn malformed_hops() {
        assert!(SourcePath::decode(&json!([]), "").is_err());
        assert!(SourcePath::decode(&json!([{ "sideways": ["isa", "x"] }, "c"]), "").is_err());
        assert!(SourcePath::decode(&json!([{ "inbound": "isa:x" }, "c"]), "").is_err());
        assert!(SourcePath::decode(&json!(3), "").is_err());
    }
}
