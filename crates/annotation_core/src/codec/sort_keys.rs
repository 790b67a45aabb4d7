//! Sort keys used by `row_order` and `column_order`.

use serde_json::{Map, Value};

use crate::error::DecodeError;

use super::{as_array, child, extra, opt_bool, put, put_extra, Extra};

#[derive(Debug, Clone, PartialEq)]
pub enum SortKey {
    /// `"column"`, ascending.
    Name(String),
    /// `{"column": .., "descending": ..}`
    Detailed {
        column: String,
        descending: Option<bool>,
        extra: Extra,
    },
}

impl SortKey {
    pub fn ascending(column: impl Into<String>) -> Self {
        Self::Name(column.into())
    }

    pub fn descending(column: impl Into<String>) -> Self {
        Self::Detailed {
            column: column.into(),
            descending: Some(true),
            extra: Extra::default(),
        }
    }

    pub fn column(&self) -> &str {
        match self {
            Self::Name(c) | Self::Detailed { column: c, .. } => c,
        }
    }

    pub fn is_descending(&self) -> bool {
        matches!(
            self,
            Self::Detailed {
                descending: Some(true),
                ..
            }
        )
    }

    fn decode(raw: &Value, path: &str) -> Result<Self, DecodeError> {
        match raw {
            Value::String(c) => Ok(Self::Name(c.clone())),
            Value::Object(map) => {
                let column = map
                    .get("column")
                    .and_then(Value::as_str)
                    .ok_or_else(|| DecodeError::shape(&child(path, "column"), "a column name"))?;
                Ok(Self::Detailed {
                    column: column.to_string(),
                    descending: opt_bool(map, "descending", path)?,
                    extra: extra(map, &["column", "descending"]),
                })
            }
            _ => Err(DecodeError::shape(path, "a column name or sort key object")),
        }
    }

    fn encode(&self) -> Value {
        match self {
            Self::Name(c) => Value::String(c.clone()),
            Self::Detailed {
                column,
                descending,
                extra,
            } => {
                let mut map = Map::new();
                map.insert("column".into(), Value::String(column.clone()));
                put(&mut map, "descending", *descending);
                put_extra(&mut map, extra);
                Value::Object(map)
            }
        }
    }
}

pub(crate) fn decode_list(raw: &Value, path: &str) -> Result<Vec<SortKey>, DecodeError> {
    as_array(raw, path)?
        .iter()
        .enumerate()
        .map(|(i, k)| SortKey::decode(k, &child(path, i)))
        .collect()
}

pub(crate) fn encode_list(keys: &[SortKey]) -> Value {
    Value::Array(keys.iter().map(SortKey::encode).collect())
}

/// Every key must name one of `columns`.
pub(crate) fn check_list<'c>(
    keys: &[SortKey],
    columns: impl Iterator<Item = &'c str> + Clone,
    path: &str,
) -> Result<(), DecodeError> {
    for (i, key) in keys.iter().enumerate() {
        if !columns.clone().any(|c| c == key.column()) {
            return Err(DecodeError::unresolved(&child(path, i), "column", key.column()));
        }
    }
    Ok(())
}
