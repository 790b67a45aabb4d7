//! Catalog Service port — the only way the engine reaches a remote catalog.
//!
//! Transport and wire format are owned by implementations; the engine only
//! sees raw JSON documents, changesets and validation reports.

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::EngineError;
use crate::schema::ObjectId;
use crate::store::AnnotationMap;
use crate::tracker::PendingEdit;
use crate::validation::ValidationReport;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CatalogRef {
    pub host: String,
    pub catalog_id: String,
}

impl CatalogRef {
    pub fn new(host: impl Into<String>, catalog_id: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            catalog_id: catalog_id.into(),
        }
    }
}

impl fmt::Display for CatalogRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.host, self.catalog_id)
    }
}

/// One write of a changeset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEntry {
    pub object: ObjectId,
    pub key: String,
    pub operation: PendingEdit,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum KeyOutcome {
    Ok,
    Failed { reason: String },
}

impl KeyOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyResult {
    pub object: ObjectId,
    pub key: String,
    pub outcome: KeyOutcome,
}

#[async_trait]
pub trait CatalogService: Send + Sync {
    /// Raw ERMrest-style schema document.
    async fn fetch_schema(&self, catalog: &CatalogRef) -> Result<Value>;

    async fn fetch_annotations(
        &self,
        catalog: &CatalogRef,
    ) -> Result<HashMap<ObjectId, AnnotationMap>>;

    /// Apply a changeset. Returns one result per entry, in submission order.
    /// An `Err` means nothing is known to have been applied.
    async fn submit_changeset(
        &self,
        catalog: &CatalogRef,
        changes: &[ChangeEntry],
    ) -> Result<Vec<KeyResult>>;

    async fn validate_object(
        &self,
        catalog: &CatalogRef,
        object: &ObjectId,
    ) -> Result<ValidationReport>;
}
