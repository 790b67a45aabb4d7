//! Session state machine against the in-memory catalog.

use std::collections::HashMap;
use std::sync::Arc;

use annotation_core::codec::source_definitions::SourceDefinition;
use annotation_core::codec::{
    ColumnDisplayCodec, PseudoColumn, SourceDefinitionsCodec, VisibleColumnsCodec,
};
use annotation_core::ports::Result as PortResult;
use annotation_core::tags;
use annotation_core::testing::{self, dataset, person};
use annotation_core::{
    AnnotationMap, CatalogRef, CatalogService, ChangeEntry, EngineError, KeyOutcome, KeyResult,
    ObjectId, PendingEdit, RecordOutcome, SyncState, ValidationReport,
};
use annotation_workbench::{EngineConfig, InMemoryCatalog, RawEdit, RefreshOutcome, Session};
use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

fn catalog_ref() -> CatalogRef {
    CatalogRef::new("https://example.org", "1")
}

fn service() -> InMemoryCatalog {
    InMemoryCatalog::new(testing::catalog_document()).unwrap()
}

fn session_over(service: &InMemoryCatalog, config: EngineConfig) -> Session {
    Session::new(Arc::new(service.clone()), catalog_ref(), config)
}

async fn connected() -> (InMemoryCatalog, Session) {
    let service = service();
    let session = session_over(&service, EngineConfig::default());
    session.connect().await.unwrap();
    (service, session)
}

fn set(value: Value) -> PendingEdit {
    PendingEdit::Set(value)
}

fn rejected_in<T>(result: Result<T, EngineError>, expected: SyncState) -> bool {
    matches!(result, Err(EngineError::InvalidState { state, .. }) if state == expected)
}

// ── Connection ─────────────────────────────────────────────────

#[tokio::test]
async fn connect_loads_baseline() {
    let (_, session) = connected().await;
    assert_eq!(session.state(), SyncState::Synced);
    assert_eq!(
        session.get(&dataset(), tags::DISPLAY).unwrap(),
        Some(json!({ "name": "Dataset" }))
    );
    assert!(session.pending_edits().unwrap().is_empty());
}

#[tokio::test]
async fn objects_lists_unannotated_objects_too() {
    let (_, session) = connected().await;
    let objects = session.objects().unwrap();
    assert!(objects.contains(&dataset()));
    assert!(objects.contains(&person()));
    assert!(objects.contains(&ObjectId::column("isa", "person", "email")));
}

#[tokio::test]
async fn operations_before_connect_fail() {
    let session = session_over(&service(), EngineConfig::default());
    assert_eq!(session.state(), SyncState::Disconnected);
    assert!(matches!(
        session.record(&dataset(), tags::DISPLAY, set(json!({}))),
        Err(EngineError::NotConnected)
    ));
    assert!(matches!(session.validate(&dataset()).await, Err(EngineError::NotConnected)));
    assert!(matches!(session.refresh(true).await, Err(EngineError::NotConnected)));
}

#[tokio::test]
async fn failed_connect_moves_to_error_and_can_retry() {
    let service = service();
    service.fail_next_fetch("unreachable").await;
    let session = session_over(&service, EngineConfig::default());

    assert!(matches!(session.connect().await, Err(EngineError::Remote(_))));
    assert_eq!(session.state(), SyncState::Error);

    session.connect().await.unwrap();
    assert_eq!(session.state(), SyncState::Synced);
    assert!(matches!(
        session.connect().await,
        Err(EngineError::InvalidState { operation: "connect", .. })
    ));
}

// ── Edits ──────────────────────────────────────────────────────

#[tokio::test]
async fn repeated_edits_coalesce() {
    let (_, session) = connected().await;
    let first = session.record(&dataset(), tags::CITATION, set(json!({ "title_pattern": "a" })));
    let second = session.record(&dataset(), tags::CITATION, set(json!({ "title_pattern": "b" })));
    assert_eq!(first.unwrap(), RecordOutcome::Recorded);
    assert_eq!(second.unwrap(), RecordOutcome::Superseded);

    let pending = session.pending_edits().unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].operation, set(json!({ "title_pattern": "b" })));
    assert_eq!(session.state(), SyncState::Dirty);
    assert!(session.is_dirty());
}

#[tokio::test]
async fn edit_back_to_baseline_is_a_no_op() {
    let (_, session) = connected().await;
    session.record(&dataset(), tags::DISPLAY, set(json!({ "name": "Data" }))).unwrap();
    assert_eq!(session.state(), SyncState::Dirty);

    let outcome = session.record(&dataset(), tags::DISPLAY, set(json!({ "name": "Dataset" })));
    assert_eq!(outcome.unwrap(), RecordOutcome::NoOp);
    assert_eq!(session.state(), SyncState::Synced);
}

#[tokio::test]
async fn edits_reject_annotation_documents_and_unknown_objects() {
    let (_, session) = connected().await;
    let doc = ObjectId::annotations(dataset());
    assert!(matches!(
        session.record(&doc, tags::DISPLAY, set(json!({}))),
        Err(EngineError::InvalidTarget(_))
    ));
    assert!(matches!(
        session.record(&ObjectId::table("isa", "ghost"), tags::DISPLAY, set(json!({}))),
        Err(EngineError::NotFound(_))
    ));
}

#[tokio::test]
async fn malformed_raw_text_is_ignored() {
    let (_, session) = connected().await;
    let edit = session
        .edit_raw_text(&dataset(), tags::VISIBLE_COLUMNS, r#"{"*": ["id""#)
        .unwrap();
    assert!(matches!(edit, RawEdit::Ignored { .. }));
    assert_eq!(session.state(), SyncState::Synced);
    assert_eq!(
        session.current_raw(&dataset(), tags::VISIBLE_COLUMNS).unwrap(),
        Some(json!({ "*": ["id", "title"] }))
    );

    let edit = session
        .edit_raw_text(&dataset(), tags::VISIBLE_COLUMNS, r#"{"*": ["id"]}"#)
        .unwrap();
    assert_eq!(edit, RawEdit::Applied(RecordOutcome::Recorded));
}

#[tokio::test]
async fn raw_text_is_refused_before_connect() {
    let session = session_over(&service(), EngineConfig::default());
    assert!(matches!(
        session.edit_raw_text(&dataset(), tags::VISIBLE_COLUMNS, r#"{"*": ["id""#),
        Err(EngineError::NotConnected)
    ));
}

#[tokio::test]
async fn structured_edit_that_would_not_reopen_is_refused() {
    let (_, session) = connected().await;
    let mut doc = session
        .open::<SourceDefinitionsCodec>(&dataset())
        .unwrap()
        .structured()
        .unwrap();
    doc.sources.push(SourceDefinition {
        key: "dangling".into(),
        definition: PseudoColumn::from_source_key("ghost"),
    });
    assert!(matches!(
        session.edit_structured::<SourceDefinitionsCodec>(&dataset(), &doc),
        Err(EngineError::InvalidDocument(_))
    ));
    assert_eq!(session.state(), SyncState::Synced);
    assert!(session.pending_edits().unwrap().is_empty());
}

#[tokio::test]
async fn column_display_edits_record_on_the_column() {
    let (_, session) = connected().await;
    let title = ObjectId::column("isa", "dataset", "title");
    let mut doc = session
        .open::<ColumnDisplayCodec>(&title)
        .unwrap()
        .structured()
        .unwrap();
    doc.add_context("compact").unwrap();
    doc.config_mut("compact").unwrap().markdown_pattern = Some("**{{{title}}}**".into());
    session.edit_structured::<ColumnDisplayCodec>(&title, &doc).unwrap();

    assert_eq!(
        session.current_raw(&title, tags::COLUMN_DISPLAY).unwrap(),
        Some(json!({ "compact": { "markdown_pattern": "**{{{title}}}**" } }))
    );
    assert!(session.check(&title).unwrap().is_clean());
}

#[tokio::test]
async fn structured_edit_records_encoded_document() {
    let (_, session) = connected().await;
    let mut doc = session
        .open::<VisibleColumnsCodec>(&dataset())
        .unwrap()
        .structured()
        .unwrap();
    doc.move_down("*", 0).unwrap();
    session.edit_structured::<VisibleColumnsCodec>(&dataset(), &doc).unwrap();

    assert_eq!(
        session.current_raw(&dataset(), tags::VISIBLE_COLUMNS).unwrap(),
        Some(json!({ "*": ["title", "id"] }))
    );
    assert_eq!(
        session.get(&dataset(), tags::VISIBLE_COLUMNS).unwrap(),
        Some(json!({ "*": ["id", "title"] }))
    );
}

#[tokio::test]
async fn discard_restores_baseline() {
    let (_, session) = connected().await;
    assert!(matches!(
        session.discard(),
        Err(EngineError::InvalidState { operation: "discard", .. })
    ));

    session.record(&dataset(), tags::VISIBLE_COLUMNS, PendingEdit::Remove).unwrap();
    assert_eq!(session.current_raw(&dataset(), tags::VISIBLE_COLUMNS).unwrap(), None);

    assert_eq!(session.discard().unwrap(), 1);
    assert_eq!(session.state(), SyncState::Synced);
    assert_eq!(
        session.current_raw(&dataset(), tags::VISIBLE_COLUMNS).unwrap(),
        Some(json!({ "*": ["id", "title"] }))
    );
}

// ── Update ─────────────────────────────────────────────────────

#[tokio::test]
async fn update_commits_accepted_keys_and_keeps_rejected_ones() {
    let (service, session) = connected().await;
    service.reject(dataset(), tags::CITATION, "pattern rejected").await;

    session.record(&dataset(), tags::TABLE_DISPLAY, set(json!({ "*": { "page_size": 25 } }))).unwrap();
    session.record(&dataset(), tags::CITATION, set(json!({ "title_pattern": "x" }))).unwrap();

    let report = session.update().await.unwrap();
    assert!(!report.is_complete());
    assert_eq!(report.results.len(), 2);
    assert_eq!(report.failed().count(), 1);
    assert_eq!(session.state(), SyncState::Dirty);

    let pending = session.pending_edits().unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].key, tags::CITATION);
    assert_eq!(
        session.get(&dataset(), tags::TABLE_DISPLAY).unwrap(),
        Some(json!({ "*": { "page_size": 25 } }))
    );
    assert_eq!(
        service.annotation(&dataset(), tags::TABLE_DISPLAY).await,
        Some(json!({ "*": { "page_size": 25 } }))
    );

    service.clear_rejections().await;
    let retry = session.update().await.unwrap();
    assert!(retry.is_complete());
    assert_ne!(retry.changeset_id, report.changeset_id);
    assert_eq!(session.state(), SyncState::Synced);
    assert_eq!(service.submissions().await.len(), 2);
}

#[tokio::test]
async fn update_requires_pending_edits() {
    let (_, session) = connected().await;
    assert!(matches!(
        session.update().await,
        Err(EngineError::InvalidState {
            operation: "update",
            state: SyncState::Synced
        })
    ));
}

#[tokio::test]
async fn transport_failure_keeps_every_edit() {
    let (service, session) = connected().await;
    service.fail_next_submit("connection reset").await;
    session.record(&person(), tags::DISPLAY, set(json!({ "name": "People" }))).unwrap();

    let err = session.update().await.unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(session.state(), SyncState::Dirty);
    assert_eq!(session.pending_edits().unwrap().len(), 1);
    assert_eq!(service.annotation(&person(), tags::DISPLAY).await, None);
}

// ── Refresh ────────────────────────────────────────────────────

#[tokio::test]
async fn refresh_with_pending_edits_needs_confirmation() {
    let (_, session) = connected().await;
    session.record(&dataset(), tags::DISPLAY, set(json!({ "name": "Data" }))).unwrap();

    assert_eq!(session.refresh(false).await.unwrap(), RefreshOutcome::NeedsConfirmation);
    assert_eq!(session.state(), SyncState::Dirty);

    match session.refresh(true).await.unwrap() {
        RefreshOutcome::Reloaded { discarded, .. } => assert_eq!(discarded, 1),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(session.state(), SyncState::Synced);
    assert!(session.pending_edits().unwrap().is_empty());
}

#[tokio::test]
async fn refresh_picks_up_remote_changes() {
    let (service, session) = connected().await;
    let mut document = testing::catalog_document();
    document["schemas"]["isa"]["tables"]["person"]["annotations"] =
        json!({ (tags::DISPLAY): { "name": "People" } });
    service.replace_document(document).await.unwrap();

    session.refresh(false).await.unwrap();
    assert_eq!(
        session.get(&person(), tags::DISPLAY).unwrap(),
        Some(json!({ "name": "People" }))
    );
}

#[tokio::test]
async fn failed_refresh_keeps_pending_edits() {
    let (service, session) = connected().await;
    session.record(&dataset(), tags::DISPLAY, set(json!({ "name": "Data" }))).unwrap();
    service.fail_next_fetch("offline").await;

    assert!(session.refresh(true).await.is_err());
    assert_eq!(session.state(), SyncState::Dirty);
    assert_eq!(session.pending_edits().unwrap().len(), 1);
}

// ── Validation ─────────────────────────────────────────────────

#[tokio::test]
async fn validate_rejects_non_table_targets() {
    let (_, session) = connected().await;
    assert!(matches!(
        session.validate(&ObjectId::annotations(dataset())).await,
        Err(EngineError::InvalidTarget(_))
    ));
    assert!(matches!(
        session.validate(&ObjectId::Catalog).await,
        Err(EngineError::InvalidTarget(_))
    ));
    assert!(session.validate(&dataset()).await.unwrap().is_clean());
    assert_eq!(session.state(), SyncState::Synced);
}

#[tokio::test]
async fn catalog_root_validation_can_be_enabled() {
    let service = service();
    let config = EngineConfig {
        validate_catalog_root: true,
        ..EngineConfig::default()
    };
    let session = session_over(&service, config);
    session.connect().await.unwrap();
    assert!(session.validate(&ObjectId::Catalog).await.is_ok());
}

#[tokio::test]
async fn local_check_flags_broken_pending_value() {
    let (_, session) = connected().await;
    session
        .record(&dataset(), tags::VISIBLE_COLUMNS, set(json!({ "*": ["missing"] })))
        .unwrap();
    let report = session.check(&dataset()).unwrap();
    assert_eq!(report.error_count, 1);
}

// ── Notifications ──────────────────────────────────────────────

#[tokio::test]
async fn subscribers_see_transitions() {
    let (_, session) = connected().await;
    let mut rx = session.subscribe();
    assert_eq!(*rx.borrow_and_update(), SyncState::Synced);

    session.record(&dataset(), tags::DISPLAY, set(json!({ "name": "Data" }))).unwrap();
    rx.changed().await.unwrap();
    assert_eq!(*rx.borrow_and_update(), SyncState::Dirty);

    session.discard().unwrap();
    rx.changed().await.unwrap();
    assert_eq!(*rx.borrow_and_update(), SyncState::Synced);
}

// ── Exclusion ──────────────────────────────────────────────────

/// Catalog call a `GatedCatalog` holds.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Hold {
    Schema,
    Submit,
    Validate,
}

/// Holds one kind of call until released. Every held call adds an `entered`
/// permit, then waits for a `release` permit.
struct GatedCatalog {
    inner: InMemoryCatalog,
    hold: Hold,
    entered: Semaphore,
    release: Semaphore,
}

impl GatedCatalog {
    fn new(hold: Hold) -> Arc<Self> {
        Arc::new(Self {
            inner: service(),
            hold,
            entered: Semaphore::new(0),
            release: Semaphore::new(0),
        })
    }

    async fn gate(&self, call: Hold) {
        if call != self.hold {
            return;
        }
        self.entered.add_permits(1);
        self.release.acquire().await.unwrap().forget();
    }

    async fn wait_entered(&self, calls: u32) {
        self.entered.acquire_many(calls).await.unwrap().forget();
    }
}

#[async_trait]
impl CatalogService for GatedCatalog {
    async fn fetch_schema(&self, catalog: &CatalogRef) -> PortResult<Value> {
        self.gate(Hold::Schema).await;
        self.inner.fetch_schema(catalog).await
    }

    async fn fetch_annotations(&self, catalog: &CatalogRef) -> PortResult<HashMap<ObjectId, AnnotationMap>> {
        self.inner.fetch_annotations(catalog).await
    }

    async fn submit_changeset(&self, catalog: &CatalogRef, changes: &[ChangeEntry]) -> PortResult<Vec<KeyResult>> {
        self.gate(Hold::Submit).await;
        self.inner.submit_changeset(catalog, changes).await
    }

    async fn validate_object(&self, catalog: &CatalogRef, object: &ObjectId) -> PortResult<ValidationReport> {
        self.gate(Hold::Validate).await;
        self.inner.validate_object(catalog, object).await
    }
}

#[tokio::test]
async fn operations_during_update_are_rejected() {
    let gate = GatedCatalog::new(Hold::Submit);
    let session = Arc::new(Session::new(gate.clone(), catalog_ref(), EngineConfig::default()));
    session.connect().await.unwrap();
    session.record(&dataset(), tags::DISPLAY, set(json!({ "name": "Data" }))).unwrap();

    let updating = tokio::spawn({
        let session = session.clone();
        async move { session.update().await }
    });
    gate.wait_entered(1).await;

    assert_eq!(session.state(), SyncState::Updating);
    assert!(matches!(
        session.update().await,
        Err(EngineError::InvalidState { state: SyncState::Updating, .. })
    ));
    assert!(matches!(
        session.refresh(true).await,
        Err(EngineError::InvalidState { .. })
    ));
    assert!(matches!(
        session.validate(&dataset()).await,
        Err(EngineError::InvalidState { .. })
    ));
    assert!(matches!(
        session.record(&dataset(), tags::DISPLAY, PendingEdit::Remove),
        Err(EngineError::InvalidState { .. })
    ));
    assert!(session.get(&dataset(), tags::DISPLAY).is_err());

    gate.release.add_permits(1);
    let report = updating.await.unwrap().unwrap();
    assert!(report.results.iter().all(|r| r.outcome == KeyOutcome::Ok));
    assert_eq!(session.state(), SyncState::Synced);
}

#[tokio::test]
async fn operations_during_refresh_are_rejected() {
    let gate = GatedCatalog::new(Hold::Schema);
    let session = Arc::new(Session::new(gate.clone(), catalog_ref(), EngineConfig::default()));
    gate.release.add_permits(1);
    session.connect().await.unwrap();
    gate.wait_entered(1).await;
    session.record(&dataset(), tags::DISPLAY, set(json!({ "name": "Data" }))).unwrap();

    let refreshing = tokio::spawn({
        let session = session.clone();
        async move { session.refresh(true).await }
    });
    gate.wait_entered(1).await;

    assert_eq!(session.state(), SyncState::Loading);
    assert!(rejected_in(session.update().await, SyncState::Loading));
    assert!(rejected_in(session.discard(), SyncState::Loading));
    assert!(rejected_in(
        session.record(&dataset(), tags::DISPLAY, PendingEdit::Remove),
        SyncState::Loading
    ));
    assert!(rejected_in(
        session.edit_raw_text(&dataset(), tags::DISPLAY, "{"),
        SyncState::Loading
    ));
    assert!(rejected_in(session.get(&dataset(), tags::DISPLAY), SyncState::Loading));
    assert!(rejected_in(session.validate(&dataset()).await, SyncState::Loading));
    assert!(rejected_in(session.refresh(true).await, SyncState::Loading));

    gate.release.add_permits(1);
    assert!(matches!(
        refreshing.await.unwrap(),
        Ok(RefreshOutcome::Reloaded { discarded: 1, .. })
    ));
    assert_eq!(session.state(), SyncState::Synced);
}

#[tokio::test]
async fn overlapping_validations_hold_validating() {
    let gate = GatedCatalog::new(Hold::Validate);
    let session = Arc::new(Session::new(gate.clone(), catalog_ref(), EngineConfig::default()));
    session.connect().await.unwrap();
    session.record(&dataset(), tags::DISPLAY, set(json!({ "name": "Data" }))).unwrap();

    let mut validations = JoinSet::new();
    for object in [dataset(), person()] {
        let session = session.clone();
        validations.spawn(async move { session.validate(&object).await });
    }
    gate.wait_entered(2).await;

    assert_eq!(session.state(), SyncState::Validating);
    assert!(rejected_in(session.discard(), SyncState::Validating));
    assert!(rejected_in(session.update().await, SyncState::Validating));

    gate.release.add_permits(1);
    validations.join_next().await.unwrap().unwrap().unwrap();
    assert_eq!(session.state(), SyncState::Validating);
    assert!(rejected_in(session.discard(), SyncState::Validating));

    gate.release.add_permits(1);
    validations.join_next().await.unwrap().unwrap().unwrap();
    assert_eq!(session.state(), SyncState::Dirty);
    assert_eq!(session.discard().unwrap(), 1);
}
