//! Validation reports and the local structural check.

use serde::{Deserialize, Serialize};

use crate::codec::{self, CodecContext};
use crate::schema::{ObjectId, SchemaModel};
use crate::store::AnnotationStore;
use crate::tags::AnnotationKind;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationDetail {
    pub path: String,
    pub message: String,
}

impl ValidationDetail {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ValidationReport {
    pub error_count: usize,
    pub details: Vec<ValidationDetail>,
}

impl ValidationReport {
    pub fn clean() -> Self {
        Self::default()
    }

    pub fn from_details(details: Vec<ValidationDetail>) -> Self {
        Self {
            error_count: details.len(),
            details,
        }
    }

    pub fn is_clean(&self) -> bool {
        self.error_count == 0 && self.details.is_empty()
    }
}

/// Decode every recognised annotation of `object` with its codec.
///
/// Unrecognised keys are skipped. Nothing is mutated.
pub fn check_object(
    schema: &SchemaModel,
    store: &AnnotationStore,
    object: &ObjectId,
) -> ValidationReport {
    let Some(model) = schema.resolve(object) else {
        return ValidationReport::clean();
    };
    let cx = CodecContext::from_store(schema, store, object);
    let mut details = Vec::new();
    for (key, raw) in store.effective_map(object) {
        let Some(kind) = AnnotationKind::from_tag(&key) else {
            continue;
        };
        let path = format!("{object}/{kind}");
        if !kind.applies_to(model.kind()) {
            details.push(ValidationDetail::new(
                path,
                format!("{kind} does not apply to a {}", model.kind()),
            ));
            continue;
        }
        if let Err(e) = codec::check(kind, &raw, &cx) {
            details.push(ValidationDetail::new(path, e.to_string()));
        }
    }
    ValidationReport::from_details(details)
}
