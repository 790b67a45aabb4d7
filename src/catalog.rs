//! In-memory catalog service
//!
//! Serves a catalog document held in memory. Used by the CLI over dump files
//! and by tests, which can script per-key rejections, validation reports and
//! one-shot transport failures.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use annotation_core::ports::Result;
use annotation_core::store::extract_annotations;
use annotation_core::{
    AnnotationMap, CatalogRef, CatalogService, ChangeEntry, EngineError, KeyOutcome, KeyResult,
    ObjectId, PendingEdit, PendingKey, SchemaModel, SchemaParseError, ValidationReport,
};
use anyhow::Context;
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Default)]
struct Script {
    rejections: HashMap<PendingKey, String>,
    reports: HashMap<ObjectId, ValidationReport>,
    fail_next_fetch: Option<String>,
    fail_next_submit: Option<String>,
    submissions: Vec<Vec<ChangeEntry>>,
}

struct Catalog {
    document: Value,
    model: SchemaModel,
    annotations: HashMap<ObjectId, AnnotationMap>,
}

#[derive(Clone)]
pub struct InMemoryCatalog {
    catalog: Arc<RwLock<Catalog>>,
    script: Arc<RwLock<Script>>,
}

impl InMemoryCatalog {
    pub fn new(document: Value) -> std::result::Result<Self, SchemaParseError> {
        let catalog = Catalog::parse(document)?;
        Ok(Self {
            catalog: Arc::new(RwLock::new(catalog)),
            script: Arc::new(RwLock::new(Script::default())),
        })
    }

    /// Load a catalog dump (schema document with inline annotations).
    pub fn from_dump(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let document: Value = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Self::new(document).with_context(|| format!("Invalid catalog dump {}", path.display()))
    }

    /// Replace the served document, as if another client had changed the catalog.
    pub async fn replace_document(&self, document: Value) -> std::result::Result<(), SchemaParseError> {
        *self.catalog.write().await = Catalog::parse(document)?;
        Ok(())
    }

    /// Server-side value of one annotation.
    pub async fn annotation(&self, object: &ObjectId, key: &str) -> Option<Value> {
        let catalog = self.catalog.read().await;
        catalog.annotations.get(object)?.get(key).cloned()
    }

    /// Fail every future write of `key` on `object` with `reason`.
    pub async fn reject(&self, object: ObjectId, key: &str, reason: &str) {
        let mut script = self.script.write().await;
        script.rejections.insert(PendingKey::new(object, key), reason.to_string());
    }

    pub async fn clear_rejections(&self) {
        self.script.write().await.rejections.clear();
    }

    pub async fn set_report(&self, object: ObjectId, report: ValidationReport) {
        self.script.write().await.reports.insert(object, report);
    }

    pub async fn fail_next_fetch(&self, reason: &str) {
        self.script.write().await.fail_next_fetch = Some(reason.to_string());
    }

    pub async fn fail_next_submit(&self, reason: &str) {
        self.script.write().await.fail_next_submit = Some(reason.to_string());
    }

    /// Every changeset received so far, oldest first.
    pub async fn submissions(&self) -> Vec<Vec<ChangeEntry>> {
        self.script.read().await.submissions.clone()
    }

    async fn take_fetch_failure(&self) -> Result<()> {
        match self.script.write().await.fail_next_fetch.take() {
            Some(reason) => Err(EngineError::Remote(reason)),
            None => Ok(()),
        }
    }
}

impl Catalog {
    fn parse(document: Value) -> std::result::Result<Self, SchemaParseError> {
        let model = SchemaModel::load(&document)?;
        let annotations = extract_annotations(&document)?;
        Ok(Self {
            document,
            model,
            annotations,
        })
    }

    fn apply(&mut self, entry: &ChangeEntry) -> KeyOutcome {
        if !entry.object.carries_annotations() || !self.model.contains(&entry.object) {
            return KeyOutcome::Failed {
                reason: format!("no such object {}", entry.object),
            };
        }
        match &entry.operation {
            PendingEdit::Set(value) => {
                self.annotations
                    .entry(entry.object.clone())
                    .or_default()
                    .insert(entry.key.clone(), value.clone());
            }
            PendingEdit::Remove => {
                if let Some(map) = self.annotations.get_mut(&entry.object) {
                    map.remove(&entry.key);
                    if map.is_empty() {
                        self.annotations.remove(&entry.object);
                    }
                }
            }
        }
        KeyOutcome::Ok
    }
}

#[async_trait]
impl CatalogService for InMemoryCatalog {
    async fn fetch_schema(&self, catalog: &CatalogRef) -> Result<Value> {
        self.take_fetch_failure().await?;
        debug!(%catalog, "serving schema document");
        Ok(self.catalog.read().await.document.clone())
    }

    async fn fetch_annotations(&self, catalog: &CatalogRef) -> Result<HashMap<ObjectId, AnnotationMap>> {
        debug!(%catalog, "serving annotations");
        Ok(self.catalog.read().await.annotations.clone())
    }

    async fn submit_changeset(&self, catalog: &CatalogRef, changes: &[ChangeEntry]) -> Result<Vec<KeyResult>> {
        let mut script = self.script.write().await;
        if let Some(reason) = script.fail_next_submit.take() {
            return Err(EngineError::Remote(reason));
        }
        script.submissions.push(changes.to_vec());

        let mut state = self.catalog.write().await;
        let results = changes
            .iter()
            .map(|entry| {
                let pending = PendingKey::new(entry.object.clone(), entry.key.clone());
                let outcome = match script.rejections.get(&pending) {
                    Some(reason) => KeyOutcome::Failed {
                        reason: reason.clone(),
                    },
                    None => state.apply(entry),
                };
                KeyResult {
                    object: entry.object.clone(),
                    key: entry.key.clone(),
                    outcome,
                }
            })
            .collect::<Vec<_>>();

        let failed = results.iter().filter(|r| !r.outcome.is_ok()).count();
        debug!(%catalog, writes = changes.len(), failed, "changeset applied");
        Ok(results)
    }

    async fn validate_object(&self, _catalog: &CatalogRef, object: &ObjectId) -> Result<ValidationReport> {
        if !self.catalog.read().await.model.contains(object) {
            return Err(EngineError::NotFound(object.to_string()));
        }
        let script = self.script.read().await;
        Ok(script.reports.get(object).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use annotation_core::tags;
    use annotation_core::testing::{self, dataset};
    use annotation_core::ValidationDetail;
    use serde_json::json;

    fn catalog() -> (InMemoryCatalog, CatalogRef) {
        (
            InMemoryCatalog::new(testing::catalog_document()).unwrap(),
            CatalogRef::new("https://example.org", "1"),
        )
    }

    fn set(object: ObjectId, key: &str, value: Value) -> ChangeEntry {
        ChangeEntry {
            object,
            key: key.into(),
            operation: PendingEdit::Set(value),
        }
    }

    #[tokio::test]
    async fn submit_applies_writes_and_reports_rejections() {
        let (service, cref) = catalog();
        service.reject(dataset(), tags::CITATION, "denied").await;

        let results = service
            .submit_changeset(
                &cref,
                &[
                    set(dataset(), tags::TABLE_DISPLAY, json!({ "*": {} })),
                    set(dataset(), tags::CITATION, json!({})),
                ],
            )
            .await
            .unwrap();

        assert!(results[0].outcome.is_ok());
        assert_eq!(
            results[1].outcome,
            KeyOutcome::Failed {
                reason: "denied".into()
            }
        );
        assert_eq!(
            service.annotation(&dataset(), tags::TABLE_DISPLAY).await,
            Some(json!({ "*": {} }))
        );
        assert_eq!(service.submissions().await.len(), 1);
    }

    #[tokio::test]
    async fn remove_drops_the_key() {
        let (service, cref) = catalog();
        assert!(service.annotation(&dataset(), tags::VISIBLE_COLUMNS).await.is_some());
        let remove = ChangeEntry {
            object: dataset(),
            key: tags::VISIBLE_COLUMNS.into(),
            operation: PendingEdit::Remove,
        };
        service.submit_changeset(&cref, &[remove]).await.unwrap();
        assert!(service.annotation(&dataset(), tags::VISIBLE_COLUMNS).await.is_none());
    }

    #[tokio::test]
    async fn unknown_objects_fail_per_key() {
        let (service, cref) = catalog();
        let results = service
            .submit_changeset(&cref, &[set(ObjectId::table("isa", "ghost"), tags::DISPLAY, json!({}))])
            .await
            .unwrap();
        assert!(!results[0].outcome.is_ok());
    }

    #[tokio::test]
    async fn one_shot_failures() {
        let (service, cref) = catalog();
        service.fail_next_fetch("offline").await;
        assert!(matches!(service.fetch_schema(&cref).await, Err(EngineError::Remote(_))));
        assert!(service.fetch_schema(&cref).await.is_ok());

        service.fail_next_submit("timeout").await;
        assert!(service.submit_changeset(&cref, &[]).await.is_err());
        assert!(service.submissions().await.is_empty());
    }

    #[tokio::test]
    async fn scripted_validation_reports() {
        let (service, cref) = catalog();
        assert!(service.validate_object(&cref, &dataset()).await.unwrap().is_clean());

        let report = ValidationReport::from_details(vec![ValidationDetail::new("row_name", "bad pattern")]);
        service.set_report(dataset(), report.clone()).await;
        assert_eq!(service.validate_object(&cref, &dataset()).await.unwrap(), report);

        let missing = service.validate_object(&cref, &ObjectId::table("isa", "ghost")).await;
        assert!(matches!(missing, Err(EngineError::NotFound(_))));
    }

    #[test]
    fn from_dump_reports_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        std::fs::write(&path, "not json").unwrap();
        let err = InMemoryCatalog::from_dump(&path).err().unwrap();
        assert!(err.to_string().contains("catalog.json"));
    }
}
