//! Session orchestrator
//!
//! Owns the schema model and annotation store of one connected catalog and
//! drives them through the sync state machine. Every remote call goes through
//! the `CatalogService` port.
//!
//! Concurrency:
//! - `connect`, `refresh` and `update` are exclusive; a second call while one
//!   is in flight is rejected with `InvalidState`, never queued.
//! - `validate` calls may overlap each other but not an exclusive operation.
//! - Reads and edits are rejected while the baseline is being replaced.
//!
//! Lock order is machine, then model. Neither lock is held across an await.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use annotation_core::codec::{self, AnnotationCodec, CodecContext, EditorView};
use annotation_core::ports::Result;
use annotation_core::validation::check_object;
use annotation_core::{
    AnnotationStore, CatalogRef, CatalogService, ChangeEntry, EngineError, KeyOutcome, KeyResult,
    ObjectId, ObjectKind, PendingEdit, PendingKey, RecordOutcome, SchemaModel, SyncState,
    ValidationReport,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::EngineConfig;

/// Result of `refresh`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    Reloaded { objects: usize, discarded: usize },
    /// Pending edits exist and the caller has not confirmed discarding them.
    NeedsConfirmation,
}

/// Result of `edit_raw_text`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawEdit {
    Applied(RecordOutcome),
    /// The text is not JSON; nothing was recorded.
    Ignored { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdateReport {
    pub changeset_id: Uuid,
    pub submitted_at: DateTime<Utc>,
    pub results: Vec<KeyResult>,
}

impl UpdateReport {
    pub fn failed(&self) -> impl Iterator<Item = &KeyResult> {
        self.results.iter().filter(|r| !r.outcome.is_ok())
    }

    pub fn is_complete(&self) -> bool {
        self.failed().next().is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Busy {
    Loading,
    Updating,
}

#[derive(Debug)]
struct Machine {
    /// Disconnected, Synced, Dirty or Error.
    settled: SyncState,
    busy: Option<Busy>,
    validations: usize,
}

impl Machine {
    fn current(&self) -> SyncState {
        match self.busy {
            Some(Busy::Loading) => SyncState::Loading,
            Some(Busy::Updating) => SyncState::Updating,
            None if self.validations > 0 => SyncState::Validating,
            None => self.settled,
        }
    }

    fn rejected(&self, operation: &'static str) -> EngineError {
        let state = self.current();
        warn!(operation, %state, "call rejected");
        EngineError::InvalidState { operation, state }
    }

    fn exclusive(&self, operation: &'static str) -> Result<()> {
        if self.busy.is_some() || self.validations > 0 {
            return Err(self.rejected(operation));
        }
        Ok(())
    }

    fn readable(&self, operation: &'static str) -> Result<()> {
        if self.busy.is_some() {
            return Err(self.rejected(operation));
        }
        if !self.settled.is_connected() {
            return Err(EngineError::NotConnected);
        }
        Ok(())
    }
}

struct Loaded {
    schema: SchemaModel,
    store: AnnotationStore,
}

impl Loaded {
    fn target(&self, object: &ObjectId) -> Result<()> {
        if !object.carries_annotations() {
            return Err(EngineError::InvalidTarget(format!(
                "{object} is an annotations document, not an annotated object"
            )));
        }
        if !self.schema.contains(object) {
            return Err(EngineError::NotFound(object.to_string()));
        }
        Ok(())
    }

    fn settled(&self) -> SyncState {
        if self.store.is_dirty() {
            SyncState::Dirty
        } else {
            SyncState::Synced
        }
    }
}

/// Clears its in-flight marker on drop, including when the owning future is
/// cancelled mid-await.
struct Flight<'a> {
    session: &'a Session,
    busy: Option<Busy>,
}

impl Drop for Flight<'_> {
    fn drop(&mut self) {
        let mut machine = self.session.machine();
        match self.busy {
            Some(_) => machine.busy = None,
            None => machine.validations = machine.validations.saturating_sub(1),
        }
        self.session.publish(&machine);
    }
}

pub struct Session {
    service: Arc<dyn CatalogService>,
    catalog: CatalogRef,
    config: EngineConfig,
    machine: Mutex<Machine>,
    model: RwLock<Option<Loaded>>,
    state_tx: watch::Sender<SyncState>,
}

impl Session {
    pub fn new(service: Arc<dyn CatalogService>, catalog: CatalogRef, config: EngineConfig) -> Self {
        let (state_tx, _) = watch::channel(SyncState::Disconnected);
        Self {
            service,
            catalog,
            config,
            machine: Mutex::new(Machine {
                settled: SyncState::Disconnected,
                busy: None,
                validations: 0,
            }),
            model: RwLock::new(None),
            state_tx,
        }
    }

    pub fn catalog(&self) -> &CatalogRef {
        &self.catalog
    }

    pub fn state(&self) -> SyncState {
        *self.state_tx.borrow()
    }

    /// Receiver notified on every state transition.
    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.state_tx.subscribe()
    }

    // ── Connection ─────────────────────────────────────────────

    /// Load the schema model and annotation baseline. Valid from
    /// `Disconnected` or `Error`.
    pub async fn connect(&self) -> Result<usize> {
        let flight = {
            let mut machine = self.machine();
            machine.exclusive("connect")?;
            if machine.settled.is_connected() {
                return Err(machine.rejected("connect"));
            }
            self.begin(&mut machine, Busy::Loading)
        };
        info!(catalog = %self.catalog, "connecting");

        let loaded = self.fetch().await;
        let result = {
            let mut machine = self.machine();
            match loaded {
                Ok(loaded) => {
                    let objects = loaded.schema.len();
                    *self.model_write() = Some(loaded);
                    machine.settled = SyncState::Synced;
                    info!(catalog = %self.catalog, objects, "connected");
                    Ok(objects)
                }
                Err(e) => {
                    machine.settled = SyncState::Error;
                    warn!(catalog = %self.catalog, error = %e, "connect failed");
                    Err(e)
                }
            }
        };
        drop(flight);
        result
    }

    /// Reload everything from the catalog, dropping pending edits.
    ///
    /// With pending edits and `confirmed == false` nothing happens. A failed
    /// reload leaves the session as it was.
    pub async fn refresh(&self, confirmed: bool) -> Result<RefreshOutcome> {
        let flight = {
            let mut machine = self.machine();
            machine.exclusive("refresh")?;
            if machine.settled == SyncState::Disconnected {
                return Err(EngineError::NotConnected);
            }
            if machine.settled == SyncState::Dirty && !confirmed {
                debug!("refresh needs confirmation to drop pending edits");
                return Ok(RefreshOutcome::NeedsConfirmation);
            }
            self.begin(&mut machine, Busy::Loading)
        };
        info!(catalog = %self.catalog, "refreshing");

        let loaded = self.fetch().await;
        let result = {
            let mut machine = self.machine();
            match loaded {
                Ok(loaded) => {
                    let objects = loaded.schema.len();
                    let mut model = self.model_write();
                    let discarded = model.as_ref().map_or(0, |m| m.store.pending_edits().len());
                    *model = Some(loaded);
                    machine.settled = SyncState::Synced;
                    info!(objects, discarded, "refreshed");
                    Ok(RefreshOutcome::Reloaded { objects, discarded })
                }
                Err(e) => {
                    warn!(error = %e, "refresh failed, keeping current state");
                    Err(e)
                }
            }
        };
        drop(flight);
        result
    }

    async fn fetch(&self) -> Result<Loaded> {
        let raw = self.service.fetch_schema(&self.catalog).await?;
        let schema = SchemaModel::load(&raw)?;
        let mut annotations = self.service.fetch_annotations(&self.catalog).await?;

        let before = annotations.len();
        annotations.retain(|object, _| schema.contains(object));
        if annotations.len() < before {
            debug!(dropped = before - annotations.len(), "annotations for unknown objects ignored");
        }
        Ok(Loaded {
            schema,
            store: AnnotationStore::with_baseline(annotations, self.config.drop_noop_edits),
        })
    }

    // ── Reads ──────────────────────────────────────────────────

    /// Every object of the loaded schema.
    pub fn objects(&self) -> Result<Vec<ObjectId>> {
        self.read("list objects", |loaded| {
            Ok(loaded.schema.objects().map(|o| o.id.clone()).collect())
        })
    }

    /// Baseline value, ignoring pending edits.
    pub fn get(&self, object: &ObjectId, key: &str) -> Result<Option<Value>> {
        self.read("read", |loaded| {
            loaded.target(object)?;
            Ok(loaded.store.get(object, key).cloned())
        })
    }

    /// Value as it would be after `update`.
    pub fn current_raw(&self, object: &ObjectId, key: &str) -> Result<Option<Value>> {
        self.read("read", |loaded| {
            loaded.target(object)?;
            Ok(loaded.store.current_raw(object, key).cloned())
        })
    }

    /// The changeset `update` would submit, in first-recorded order.
    pub fn pending_edits(&self) -> Result<Vec<ChangeEntry>> {
        self.read("read", |loaded| Ok(loaded.store.changeset()))
    }

    pub fn is_dirty(&self) -> bool {
        self.machine().settled == SyncState::Dirty
    }

    /// Structured editor for `C` over the current value, or the raw text when
    /// the value does not fit the structured form.
    pub fn open<C: AnnotationCodec>(&self, object: &ObjectId) -> Result<EditorView<C::Document>> {
        self.read("open", |loaded| {
            loaded.target(object)?;
            let cx = CodecContext::from_store(&loaded.schema, &loaded.store, object);
            Ok(codec::open::<C>(loaded.store.current_raw(object, C::KIND.tag()), &cx))
        })
    }

    /// Local structural check of every recognised annotation on `object`.
    pub fn check(&self, object: &ObjectId) -> Result<ValidationReport> {
        self.read("check", |loaded| {
            loaded.target(object)?;
            Ok(check_object(&loaded.schema, &loaded.store, object))
        })
    }

    // ── Edits ──────────────────────────────────────────────────

    pub fn record(&self, object: &ObjectId, key: &str, edit: PendingEdit) -> Result<RecordOutcome> {
        let mut machine = self.machine();
        machine.readable("edit")?;
        let mut model = self.model_write();
        let loaded = model.as_mut().ok_or(EngineError::NotConnected)?;
        loaded.target(object)?;

        let outcome = loaded.store.record(object.clone(), key, edit);
        machine.settled = loaded.settled();
        debug!(%object, key, ?outcome, "edit recorded");
        self.publish(&machine);
        Ok(outcome)
    }

    /// Record the text of a raw editor. Text that is not JSON is ignored so
    /// an in-progress edit never clobbers the last valid value.
    pub fn edit_raw_text(&self, object: &ObjectId, key: &str, text: &str) -> Result<RawEdit> {
        self.machine().readable("edit")?;
        match serde_json::from_str::<Value>(text) {
            Ok(value) => self.record(object, key, PendingEdit::Set(value)).map(RawEdit::Applied),
            Err(e) => {
                warn!(%object, key, error = %e, "raw edit is not valid JSON, ignored");
                Ok(RawEdit::Ignored {
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Encode and record a structured document. A document that would not
    /// reopen structurally is refused and nothing is recorded.
    pub fn edit_structured<C: AnnotationCodec>(&self, object: &ObjectId, document: &C::Document) -> Result<RecordOutcome> {
        let value = C::encode(document);
        self.read("edit", |loaded| {
            loaded.target(object)?;
            let cx = CodecContext::from_store(&loaded.schema, &loaded.store, object);
            codec::decode_exact::<C>(&value, &cx)?;
            Ok(())
        })?;
        self.record(object, C::KIND.tag(), PendingEdit::Set(value))
    }

    /// Drop every pending edit. Valid only from `Dirty`.
    pub fn discard(&self) -> Result<usize> {
        let mut machine = self.machine();
        machine.exclusive("discard")?;
        if machine.settled != SyncState::Dirty {
            return Err(machine.rejected("discard"));
        }
        let mut model = self.model_write();
        let loaded = model.as_mut().ok_or(EngineError::NotConnected)?;
        let discarded = loaded.store.pending_edits().len();
        loaded.store.discard_all();
        machine.settled = SyncState::Synced;
        info!(discarded, "pending edits discarded");
        self.publish(&machine);
        Ok(discarded)
    }

    // ── Remote operations ──────────────────────────────────────

    /// Submit the pending changeset. Keys the catalog accepts are committed;
    /// rejected keys stay pending and the session stays `Dirty`. A transport
    /// failure keeps every edit pending.
    pub async fn update(&self) -> Result<UpdateReport> {
        let (flight, changeset) = {
            let mut machine = self.machine();
            machine.exclusive("update")?;
            if machine.settled != SyncState::Dirty {
                return Err(machine.rejected("update"));
            }
            let changeset = self
                .model_read()
                .as_ref()
                .map(|loaded| loaded.store.changeset())
                .ok_or(EngineError::NotConnected)?;
            (self.begin(&mut machine, Busy::Updating), changeset)
        };

        let changeset_id = Uuid::new_v4();
        let submitted_at = Utc::now();
        info!(%changeset_id, writes = changeset.len(), "submitting changeset");

        let submitted = self.service.submit_changeset(&self.catalog, &changeset).await;
        let result = {
            let mut machine = self.machine();
            match submitted {
                Ok(returned) => {
                    let results = align_results(&changeset, returned);
                    let accepted: Vec<PendingKey> = results
                        .iter()
                        .filter(|r| r.outcome.is_ok())
                        .map(|r| PendingKey::new(r.object.clone(), r.key.clone()))
                        .collect();

                    let mut model = self.model_write();
                    if let Some(loaded) = model.as_mut() {
                        loaded.store.commit_keys(&accepted);
                        machine.settled = loaded.settled();
                    }
                    for failed in results.iter().filter(|r| !r.outcome.is_ok()) {
                        warn!(%changeset_id, object = %failed.object, key = %failed.key, outcome = ?failed.outcome, "write rejected");
                    }
                    info!(%changeset_id, committed = accepted.len(), total = results.len(), "changeset applied");
                    Ok(UpdateReport {
                        changeset_id,
                        submitted_at,
                        results,
                    })
                }
                Err(e) => {
                    warn!(%changeset_id, error = %e, "changeset submission failed, edits kept");
                    Err(e)
                }
            }
        };
        drop(flight);
        result
    }

    /// Ask the catalog to validate one object. Several validations may run
    /// at once.
    pub async fn validate(&self, object: &ObjectId) -> Result<ValidationReport> {
        let flight = {
            let mut machine = self.machine();
            machine.readable("validate")?;
            {
                let model = self.model_read();
                let loaded = model.as_ref().ok_or(EngineError::NotConnected)?;
                loaded.target(object)?;
            }
            if object.kind() == Some(ObjectKind::Catalog) && !self.config.validate_catalog_root {
                return Err(EngineError::InvalidTarget(
                    "validation of the catalog root is disabled".into(),
                ));
            }
            machine.validations += 1;
            self.publish(&machine);
            Flight {
                session: self,
                busy: None,
            }
        };
        debug!(%object, "validating");

        let report = self.service.validate_object(&self.catalog, object).await;
        drop(flight);
        match &report {
            Ok(r) => info!(%object, errors = r.error_count, "validation finished"),
            Err(e) => warn!(%object, error = %e, "validation failed"),
        }
        report
    }

    // ── Internals ──────────────────────────────────────────────

    fn begin(&self, machine: &mut Machine, busy: Busy) -> Flight<'_> {
        machine.busy = Some(busy);
        self.publish(machine);
        Flight {
            session: self,
            busy: Some(busy),
        }
    }

    fn read<T>(&self, operation: &'static str, f: impl FnOnce(&Loaded) -> Result<T>) -> Result<T> {
        let model = {
            let machine = self.machine();
            machine.readable(operation)?;
            self.model_read()
        };
        let loaded = model.as_ref().ok_or(EngineError::NotConnected)?;
        f(loaded)
    }

    fn publish(&self, machine: &Machine) {
        let next = machine.current();
        self.state_tx.send_if_modified(|state| {
            if *state == next {
                return false;
            }
            info!(from = %state, to = %next, "state change");
            *state = next;
            true
        });
    }

    fn machine(&self) -> MutexGuard<'_, Machine> {
        self.machine.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn model_read(&self) -> RwLockReadGuard<'_, Option<Loaded>> {
        self.model.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn model_write(&self) -> RwLockWriteGuard<'_, Option<Loaded>> {
        self.model.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// One result per submitted write, in changeset order. Writes the catalog
/// did not answer for count as failed.
fn align_results(changeset: &[ChangeEntry], mut returned: Vec<KeyResult>) -> Vec<KeyResult> {
    changeset
        .iter()
        .map(|entry| {
            let found = returned
                .iter()
                .position(|r| r.object == entry.object && r.key == entry.key)
                .map(|i| returned.swap_remove(i));
            found.unwrap_or_else(|| KeyResult {
                object: entry.object.clone(),
                key: entry.key.clone(),
                outcome: KeyOutcome::Failed {
                    reason: "no result returned for this write".into(),
                },
            })
        })
        .collect()
}
