//! `display` (names and comments of any model object) and `foreign-key`
//! (names of the two directions of a foreign key).

use serde_json::{Map, Value};

use crate::error::DecodeError;
use crate::tags::AnnotationKind;

use super::{
    as_object, child, extra, opt_bool, opt_str, put, put_extra, AnnotationCodec, CodecContext, Extra,
};

#[derive(Debug, Clone, PartialEq, Default)]
pub struct NameStyle {
    pub underline_space: Option<bool>,
    pub title_case: Option<bool>,
    pub markdown: Option<bool>,
    pub extra: Extra,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DisplayDocument {
    pub name: Option<String>,
    pub markdown_name: Option<String>,
    pub comment: Option<String>,
    pub name_style: Option<NameStyle>,
    pub extra: Extra,
}

pub struct DisplayCodec;

impl AnnotationCodec for DisplayCodec {
    type Document = DisplayDocument;

    const KIND: AnnotationKind = AnnotationKind::Display;

    fn decode(raw: &Value, _cx: &CodecContext<'_>) -> Result<Self::Document, DecodeError> {
        let map = as_object(raw, "")?;
        let name_style = match map.get("name_style") {
            None => None,
            Some(raw) => {
                let path = child("", "name_style");
                let style = as_object(raw, &path)?;
                Some(NameStyle {
                    underline_space: opt_bool(style, "underline_space", &path)?,
                    title_case: opt_bool(style, "title_case", &path)?,
                    markdown: opt_bool(style, "markdown", &path)?,
                    extra: extra(style, &["underline_space", "title_case", "markdown"]),
                })
            }
        };
        Ok(DisplayDocument {
            name: opt_str(map, "name", "")?,
            markdown_name: opt_str(map, "markdown_name", "")?,
            comment: opt_str(map, "comment", "")?,
            name_style,
            extra: extra(map, &["name", "markdown_name", "comment", "name_style"]),
        })
    }

    fn encode(doc: &Self::Document) -> Value {
        let mut map = Map::new();
        put(&mut map, "name", doc.name.clone());
        put(&mut map, "markdown_name", doc.markdown_name.clone());
        put(&mut map, "comment", doc.comment.clone());
        if let Some(style) = &doc.name_style {
            let mut s = Map::new();
            put(&mut s, "underline_space", style.underline_space);
            put(&mut s, "title_case", style.title_case);
            put(&mut s, "markdown", style.markdown);
            put_extra(&mut s, &style.extra);
            map.insert("name_style".into(), Value::Object(s));
        }
        put_extra(&mut map, &doc.extra);
        Value::Object(map)
    }

    fn empty(_cx: &CodecContext<'_>) -> Self::Document {
        DisplayDocument::default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentDisplay {
    Inline,
    Tooltip,
}

impl CommentDisplay {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inline => "inline",
            Self::Tooltip => "tooltip",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ForeignKeyDocument {
    pub to_name: Option<String>,
    pub from_name: Option<String>,
    pub to_comment: Option<String>,
    pub from_comment: Option<String>,
    pub to_comment_display: Option<CommentDisplay>,
    pub from_comment_display: Option<CommentDisplay>,
    pub extra: Extra,
}

fn comment_display(map: &Map<String, Value>, field: &str) -> Result<Option<CommentDisplay>, DecodeError> {
    match opt_str(map, field, "")?.as_deref() {
        None => Ok(None),
        Some("inline") => Ok(Some(CommentDisplay::Inline)),
        Some("tooltip") => Ok(Some(CommentDisplay::Tooltip)),
        Some(_) => Err(DecodeError::shape(&child("", field), "inline or tooltip")),
    }
}

pub struct ForeignKeyCodec;

impl AnnotationCodec for ForeignKeyCodec {
    type Document = ForeignKeyDocument;

    const KIND: AnnotationKind = AnnotationKind::ForeignKey;

    fn decode(raw: &Value, _cx: &CodecContext<'_>) -> Result<Self::Document, DecodeError> {
        let map = as_object(raw, "")?;
        Ok(ForeignKeyDocument {
            to_name: opt_str(map, "to_name", "")?,
            from_name: opt_str(map, "from_name", "")?,
            to_comment: opt_str(map, "to_comment", "")?,
            from_comment: opt_str(map, "from_comment", "")?,
            to_comment_display: comment_display(map, "to_comment_display")?,
            from_comment_display: comment_display(map, "from_comment_display")?,
            extra: extra(
                map,
                &[
                    "to_name",
                    "from_name",
                    "to_comment",
                    "from_comment",
                    "to_comment_display",
                    "from_comment_display",
                ],
            ),
        })
    }

    fn encode(doc: &Self::Document) -> Value {
        let mut map = Map::new();
        put(&mut map, "to_name", doc.to_name.clone());
        put(&mut map, "from_name", doc.from_name.clone());
        put(&mut map, "to_comment", doc.to_comment.clone());
        put(&mut map, "from_comment", doc.from_comment.clone());
        put(&mut map, "to_comment_display", doc.to_comment_display.map(|d| d.as_str()));
        put(&mut map, "from_comment_display", doc.from_comment_display.map(|d| d.as_str()));
        put_extra(&mut map, &doc.extra);
        Value::Object(map)
    }

    fn empty(_cx: &CodecContext<'_>) -> Self::Document {
        ForeignKeyDocument::default()
    }
}
