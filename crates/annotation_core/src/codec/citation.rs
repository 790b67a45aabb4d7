//! `citation`: how a row of the table is cited.

use serde_json::{Map, Value};

use crate::error::{DecodeError, EditError};
use crate::tags::AnnotationKind;

use super::{
    as_object, check_wait_for, extra, opt_engine, opt_str, opt_str_list, put, put_engine,
    put_extra, AnnotationCodec, CodecContext, Extra, TemplateEngine,
};

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CitationDocument {
    pub journal_pattern: Option<String>,
    pub author_pattern: Option<String>,
    pub title_pattern: Option<String>,
    pub year_pattern: Option<String>,
    pub url_pattern: Option<String>,
    pub id_pattern: Option<String>,
    pub template_engine: Option<TemplateEngine>,
    pub wait_for: Option<Vec<String>>,
    pub extra: Extra,
}

const PATTERNS: [&str; 6] = [
    "journal_pattern",
    "author_pattern",
    "title_pattern",
    "year_pattern",
    "url_pattern",
    "id_pattern",
];

impl CitationDocument {
    fn patterns(&self) -> [&Option<String>; 6] {
        [
            &self.journal_pattern,
            &self.author_pattern,
            &self.title_pattern,
            &self.year_pattern,
            &self.url_pattern,
            &self.id_pattern,
        ]
    }

    /// Replace `wait_for`. Every key must name a defined source.
    pub fn set_wait_for(
        &mut self,
        keys: Option<Vec<String>>,
        cx: &CodecContext<'_>,
    ) -> Result<(), EditError> {
        if let Some(keys) = &keys {
            check_wait_for(keys, cx, "/wait_for").map_err(|e| EditError::InvalidEntry(e.to_string()))?;
        }
        self.wait_for = keys;
        Ok(())
    }
}

pub struct CitationCodec;

impl AnnotationCodec for CitationCodec {
    type Document = CitationDocument;

    const KIND: AnnotationKind = AnnotationKind::Citation;

    fn decode(raw: &Value, cx: &CodecContext<'_>) -> Result<Self::Document, DecodeError> {
        let map = as_object(raw, "")?;
        let wait_for = opt_str_list(map, "wait_for", "")?;
        if let Some(keys) = &wait_for {
            check_wait_for(keys, cx, "/wait_for")?;
        }
        let mut known = PATTERNS.to_vec();
        known.extend(["template_engine", "wait_for"]);
        Ok(CitationDocument {
            journal_pattern: opt_str(map, "journal_pattern", "")?,
            author_pattern: opt_str(map, "author_pattern", "")?,
            title_pattern: opt_str(map, "title_pattern", "")?,
            year_pattern: opt_str(map, "year_pattern", "")?,
            url_pattern: opt_str(map, "url_pattern", "")?,
            id_pattern: opt_str(map, "id_pattern", "")?,
            template_engine: opt_engine(map, "")?,
            wait_for,
            extra: extra(map, &known),
        })
    }

    fn encode(doc: &Self::Document) -> Value {
        let mut map = Map::new();
        for (field, pattern) in PATTERNS.iter().zip(doc.patterns()) {
            put(&mut map, field, pattern.clone());
        }
        put_engine(&mut map, doc.template_engine);
        put(&mut map, "wait_for", doc.wait_for.clone());
        put_extra(&mut map, &doc.extra);
        Value::Object(map)
    }

    fn empty(_cx: &CodecContext<'_>) -> Self::Document {
        CitationDocument::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, dataset};
    use serde_json::json;

    #[test]
    fn round_trips_with_wait_for() {
        let model = testing::schema_model();
        let table = dataset();
        let cx = CodecContext::new(&model, &table).with_source_keys(vec!["authors".into()]);
        let raw = json!({
            "journal_pattern": "ISA",
            "author_pattern": "{{{$fkeys.isa.dataset_owner_fkey.values.name}}}",
            "title_pattern": "{{{title}}}",
            "year_pattern": "{{{$moment.year}}}",
            "url_pattern": "https://example.org/id/{{{RID}}}",
            "id_pattern": "{{{id}}}",
            "template_engine": "handlebars",
            "wait_for": ["authors"]
        });
        let doc = CitationCodec::decode(&raw, &cx).unwrap();
        assert_eq!(CitationCodec::encode(&doc), raw);
    }

    #[test]
    fn wait_for_must_name_defined_sources() {
        let model = testing::schema_model();
        let table = dataset();
        let cx = CodecContext::new(&model, &table);
        assert!(CitationCodec::decode(&json!({ "wait_for": ["x"] }), &cx).is_err());

        let mut doc = CitationDocument::default();
        assert!(matches!(
            doc.set_wait_for(Some(vec!["x".into()]), &cx),
            Err(EditError::InvalidEntry(_))
        ));
        assert_eq!(doc.wait_for, None);
    }

    #[test]
    fn unknown_engine_is_rejected() {
        let model = testing::schema_model();
        let table = dataset();
        let cx = CodecContext::new(&model, &table);
        assert!(CitationCodec::decode(&json!({ "template_engine": "jinja" }), &cx).is_err());
    }
}
