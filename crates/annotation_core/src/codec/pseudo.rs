//! Pseudo-column entries shared by `visible-*` lists and `source-definitions`.

use serde_json::{Map, Value};

use crate::error::DecodeError;

use super::source_path::SourcePath;
use super::{
    as_object, check_wait_for, child, extra, opt_bool, opt_engine, opt_str, opt_str_list, put,
    put_engine, put_extra, CodecContext, Extra, TemplateEngine,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregate {
    Min,
    Max,
    Count,
    CountDistinct,
    Array,
    ArrayDistinct,
}

impl Aggregate {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Min => "min",
            Self::Max => "max",
            Self::Count => "cnt",
            Self::CountDistinct => "cnt_d",
            Self::Array => "array",
            Self::ArrayDistinct => "array_d",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "min" => Some(Self::Min),
            "max" => Some(Self::Max),
            "cnt" => Some(Self::Count),
            "cnt_d" => Some(Self::CountDistinct),
            "array" => Some(Self::Array),
            "array_d" => Some(Self::ArrayDistinct),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayUxMode {
    OrderedList,
    UnorderedList,
    Csv,
    Raw,
}

impl ArrayUxMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OrderedList => "olist",
            Self::UnorderedList => "ulist",
            Self::Csv => "csv",
            Self::Raw => "raw",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "olist" => Some(Self::OrderedList),
            "ulist" => Some(Self::UnorderedList),
            "csv" => Some(Self::Csv),
            "raw" => Some(Self::Raw),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PseudoDisplay {
    pub markdown_pattern: Option<String>,
    pub template_engine: Option<TemplateEngine>,
    pub wait_for: Option<Vec<String>>,
    pub show_foreign_key_link: Option<bool>,
    pub array_ux_mode: Option<ArrayUxMode>,
    pub extra: Extra,
}

const DISPLAY_FIELDS: &[&str] = &[
    "markdown_pattern",
    "template_engine",
    "wait_for",
    "show_foreign_key_link",
    "array_ux_mode",
];

impl PseudoDisplay {
    fn decode(raw: &Value, path: &str) -> Result<Self, DecodeError> {
        let map = as_object(raw, path)?;
        let array_ux_mode = match opt_str(map, "array_ux_mode", path)? {
            None => None,
            Some(s) => Some(ArrayUxMode::parse(&s).ok_or_else(|| {
                DecodeError::shape(&child(path, "array_ux_mode"), "olist, ulist, csv or raw")
            })?),
        };
        Ok(Self {
            markdown_pattern: opt_str(map, "markdown_pattern", path)?,
            template_engine: opt_engine(map, path)?,
            wait_for: opt_str_list(map, "wait_for", path)?,
            show_foreign_key_link: opt_bool(map, "show_foreign_key_link", path)?,
            array_ux_mode,
            extra: extra(map, DISPLAY_FIELDS),
        })
    }

    fn encode(&self) -> Value {
        let mut map = Map::new();
        put(&mut map, "markdown_pattern", self.markdown_pattern.clone());
        put_engine(&mut map, self.template_engine);
        put(&mut map, "wait_for", self.wait_for.clone());
        put(&mut map, "show_foreign_key_link", self.show_foreign_key_link);
        put(&mut map, "array_ux_mode", self.array_ux_mode.map(|m| m.as_str()));
        put_extra(&mut map, &self.extra);
        Value::Object(map)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PseudoSource {
    Path(SourcePath),
    /// Reference to a `source-definitions` entry.
    Key(String),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PseudoColumn {
    pub source: Option<PseudoSource>,
    pub markdown_name: Option<String>,
    pub comment: Option<String>,
    pub entity: Option<bool>,
    pub self_link: Option<bool>,
    pub aggregate: Option<Aggregate>,
    pub display: Option<PseudoDisplay>,
    pub extra: Extra,
}

const FIELDS: &[&str] = &[
    "source",
    "sourcekey",
    "markdown_name",
    "comment",
    "entity",
    "self_link",
    "aggregate",
    "display",
];

impl PseudoColumn {
    pub fn from_source(path: SourcePath) -> Self {
        Self {
            source: Some(PseudoSource::Path(path)),
            ..Self::default()
        }
    }

    pub fn from_source_key(key: impl Into<String>) -> Self {
        Self {
            source: Some(PseudoSource::Key(key.into())),
            ..Self::default()
        }
    }

    pub fn source_path(&self) -> Option<&SourcePath> {
        match &self.source {
            Some(PseudoSource::Path(p)) => Some(p),
            _ => None,
        }
    }

    fn wait_for(&self) -> &[String] {
        self.display
            .as_ref()
            .and_then(|d| d.wait_for.as_deref())
            .unwrap_or_default()
    }

    /// Whether `sourcekey` or `display.wait_for` names `key`.
    pub fn refers_to(&self, key: &str) -> bool {
        matches!(&self.source, Some(PseudoSource::Key(k)) if k == key)
            || self.wait_for().iter().any(|k| k == key)
    }

    /// Point every reference to source `old` at `new`.
    pub fn rename_source_key(&mut self, old: &str, new: &str) {
        if let Some(PseudoSource::Key(k)) = &mut self.source {
            if k == old {
                *k = new.to_string();
            }
        }
        if let Some(wait_for) = self.display.as_mut().and_then(|d| d.wait_for.as_mut()) {
            for k in wait_for.iter_mut().filter(|k| k.as_str() == old) {
                *k = new.to_string();
            }
        }
    }

    pub(crate) fn decode(raw: &Value, path: &str) -> Result<Self, DecodeError> {
        let map = as_object(raw, path)?;
        let source = match (map.get("source"), opt_str(map, "sourcekey", path)?) {
            (Some(_), Some(_)) => {
                return Err(DecodeError::invalid(
                    path,
                    "source and sourcekey are mutually exclusive",
                ))
            }
            (Some(raw), None) => Some(PseudoSource::Path(SourcePath::decode(
                raw,
                &child(path, "source"),
            )?)),
            (None, Some(key)) => Some(PseudoSource::Key(key)),
            (None, None) => None,
        };
        let aggregate = match opt_str(map, "aggregate", path)? {
            None => None,
            Some(s) => Some(Aggregate::parse(&s).ok_or_else(|| {
                DecodeError::shape(&child(path, "aggregate"), "a known aggregate function")
            })?),
        };
        let display = match map.get("display") {
            None => None,
            Some(raw) => Some(PseudoDisplay::decode(raw, &child(path, "display"))?),
        };
        Ok(Self {
            source,
            markdown_name: opt_str(map, "markdown_name", path)?,
            comment: opt_str(map, "comment", path)?,
            entity: opt_bool(map, "entity", path)?,
            self_link: opt_bool(map, "self_link", path)?,
            aggregate,
            display,
            extra: extra(map, FIELDS),
        })
    }

    pub(crate) fn encode(&self) -> Value {
        let mut map = Map::new();
        match &self.source {
            Some(PseudoSource::Path(p)) => {
                map.insert("source".into(), p.encode());
            }
            Some(PseudoSource::Key(k)) => {
                map.insert("sourcekey".into(), Value::String(k.clone()));
            }
            None => {}
        }
        put(&mut map, "markdown_name", self.markdown_name.clone());
        put(&mut map, "comment", self.comment.clone());
        put(&mut map, "entity", self.entity);
        put(&mut map, "self_link", self.self_link);
        put(&mut map, "aggregate", self.aggregate.map(|a| a.as_str()));
        put(&mut map, "display", self.display.as_ref().map(PseudoDisplay::encode));
        put_extra(&mut map, &self.extra);
        Value::Object(map)
    }

    /// Resolve the source and every source-key reference against `cx`.
    pub(crate) fn check(&self, cx: &CodecContext<'_>, path: &str) -> Result<(), DecodeError> {
        match &self.source {
            Some(PseudoSource::Path(p)) => {
                let table = cx.require_table()?;
                p.resolve(cx.schema, &table.id(), &child(path, "source"))?;
            }
            Some(PseudoSource::Key(k)) if !cx.has_source_key(k) => {
                return Err(DecodeError::unresolved(&child(path, "sourcekey"), "source key", k));
            }
            _ => {}
        }
        if let Some(wait_for) = self.display.as_ref().and_then(|d| d.wait_for.as_ref()) {
            check_wait_for(wait_for, cx, &child(&child(path, "display"), "wait_for"))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, dataset};
    use serde_json::json;

    #[test]
    fn full_entry_round_trips() {
        let raw = json!({
            "source": [{ "inbound": ["isa", "experiment_dataset_fkey"] }, "RID"],
            "markdown_name": "Experiments",
            "aggregate": "cnt_d",
            "entity": false,
            "display": {
                "markdown_pattern": "{{{$self}}}",
                "template_engine": "handlebars",
                "array_ux_mode": "csv",
                "wait_for": ["n_exp"],
                "vendor_hint": 1
            },
            "hide_column_header": true
        });
        let entry = PseudoColumn::decode(&raw, "").unwrap();
        assert_eq!(entry.aggregate, Some(Aggregate::CountDistinct));
        assert_eq!(entry.extra.len(), 1);
        assert_eq!(entry.encode(), raw);
    }

    #[test]
    fn check_resolves_source_keys() {
        let model = testing::schema_model();
        let table = dataset();
        let cx = CodecContext::new(&model, &table).with_source_keys(vec!["n_exp".into()]);
        assert!(PseudoColumn::from_source_key("n_exp").check(&cx, "").is_ok());
        assert!(matches!(
            PseudoColumn::from_source_key("other").check(&cx, ""),
            Err(DecodeError::UnresolvedReference { what: "source key", .. })
        ));
    }

    #[test]
    fn rename_rewrites_sourcekey_and_wait_for() {
        let raw = json!({
            "sourcekey": "n_exp",
            "display": { "markdown_pattern": "{{{n_exp}}}", "wait_for": ["other", "n_exp"] }
        });
        let mut entry = PseudoColumn::decode(&raw, "").unwrap();
        assert!(entry.refers_to("n_exp"));
        entry.rename_source_key("n_exp", "experiments");
        assert!(!entry.refers_to("n_exp"));
        assert_eq!(
            entry.encode(),
            json!({
                "sourcekey": "experiments",
                "display": { "markdown_pattern": "{{{n_exp}}}", "wait_for": ["other", "experiments"] }
            })
        );
    }

    #[test]
    fn rejects_source_with_sourcekey() {
        let raw = json!({ "source": "id", "sourcekey": "k" });
        assert!(PseudoColumn::decode(&raw, "").is_err());
    }

    #[test]
    fn rejects_unknown_aggregate() {
        assert!(PseudoColumn::decode(&json!({ "source": "id", "aggregate": "avg" }), "").is_err());
    }
}
