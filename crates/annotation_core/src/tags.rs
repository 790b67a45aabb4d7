//! Well-known annotation tag URIs and the kinds the workbench edits structurally.

use std::fmt;

use crate::schema::ObjectKind;

pub const VISIBLE_COLUMNS: &str = "tag:isrd.isi.edu,2016:visible-columns";
pub const VISIBLE_FOREIGN_KEYS: &str = "tag:isrd.isi.edu,2016:visible-foreign-keys";
pub const SOURCE_DEFINITIONS: &str = "tag:isrd.isi.edu,2019:source-definitions";
pub const TABLE_DISPLAY: &str = "tag:isrd.isi.edu,2016:table-display";
pub const CITATION: &str = "tag:isrd.isi.edu,2018:citation";
pub const DISPLAY: &str = "tag:misd.isi.edu,2015:display";
pub const FOREIGN_KEY: &str = "tag:isrd.isi.edu,2016:foreign-key";
pub const KEY_DISPLAY: &str = "tag:isrd.isi.edu,2017:key-display";
pub const COLUMN_DISPLAY: &str = "tag:isrd.isi.edu,2016:column-display";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnnotationKind {
    VisibleColumns,
    VisibleForeignKeys,
    SourceDefinitions,
    TableDisplay,
    Citation,
    Display,
    ForeignKey,
    KeyDisplay,
    ColumnDisplay,
}

impl AnnotationKind {
    pub const ALL: [AnnotationKind; 9] = [
        Self::VisibleColumns,
        Self::VisibleForeignKeys,
        Self::SourceDefinitions,
        Self::TableDisplay,
        Self::Citation,
        Self::Display,
        Self::ForeignKey,
        Self::KeyDisplay,
        Self::ColumnDisplay,
    ];

    pub fn tag(&self) -> &'static str {
        match self {
            Self::VisibleColumns => VISIBLE_COLUMNS,
            Self::VisibleForeignKeys => VISIBLE_FOREIGN_KEYS,
            Self::SourceDefinitions => SOURCE_DEFINITIONS,
            Self::TableDisplay => TABLE_DISPLAY,
            Self::Citation => CITATION,
            Self::Display => DISPLAY,
            Self::ForeignKey => FOREIGN_KEY,
            Self::KeyDisplay => KEY_DISPLAY,
            Self::ColumnDisplay => COLUMN_DISPLAY,
        }
    }

    pub fn short_name(&self) -> &'static str {
        match self {
            Self::VisibleColumns => "visible-columns",
            Self::VisibleForeignKeys => "visible-foreign-keys",
            Self::SourceDefinitions => "source-definitions",
            Self::TableDisplay => "table-display",
            Self::Citation => "citation",
            Self::Display => "display",
            Self::ForeignKey => "foreign-key",
            Self::KeyDisplay => "key-display",
            Self::ColumnDisplay => "column-display",
        }
    }

    /// Exact tag URI match, as used for raw annotation keys.
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.tag() == tag)
    }

    /// Accepts either the full tag URI or the short name.
    pub fn parse(key: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|k| k.tag() == key || k.short_name() == key)
    }

    pub fn applies_to(&self, kind: ObjectKind) -> bool {
        match self {
            Self::VisibleColumns
            | Self::VisibleForeignKeys
            | Self::SourceDefinitions
            | Self::TableDisplay
            | Self::Citation => kind == ObjectKind::Table,
            Self::Display => true,
            Self::ForeignKey => kind == ObjectKind::ForeignKey,
            Self::KeyDisplay => kind == ObjectKind::Key,
            Self::ColumnDisplay => kind == ObjectKind::Column,
        }
    }
}

impl fmt::Display for AnnotationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_uri_and_short_name() {
        for kind in AnnotationKind::ALL {
            assert_eq!(AnnotationKind::parse(kind.tag()), Some(kind));
            assert_eq!(AnnotationKind::parse(kind.short_name()), Some(kind));
        }
        assert_eq!(AnnotationKind::parse("tag:example.org,2020:other"), None);
    }

    #[test]
    fn table_kinds_only_apply_to_tables() {
        assert!(AnnotationKind::VisibleColumns.applies_to(ObjectKind::Table));
        assert!(!AnnotationKind::VisibleColumns.applies_to(ObjectKind::Column));
        assert!(AnnotationKind::Display.applies_to(ObjectKind::Column));
        assert!(AnnotationKind::Display.applies_to(ObjectKind::Catalog));
        assert!(AnnotationKind::KeyDisplay.applies_to(ObjectKind::Key));
        assert!(!AnnotationKind::ForeignKey.applies_to(ObjectKind::Key));
        assert!(AnnotationKind::ColumnDisplay.applies_to(ObjectKind::Column));
        assert!(!AnnotationKind::ColumnDisplay.applies_to(ObjectKind::Table));
        assert_eq!(
            AnnotationKind::parse("column-display"),
            AnnotationKind::from_tag(COLUMN_DISPLAY)
        );
    }
}
