//! Annotation engine core.
//!
//! Pure domain: the schema model of a catalog, the annotation store with its
//! pending-edit overlay, structured codecs for the well-known annotation kinds,
//! and the `CatalogService` port. No I/O and no async runtime; the session
//! orchestrator and service implementations live in `annotation-workbench`.

pub mod codec;
pub mod error;
pub mod ports;
pub mod schema;
pub mod state;
pub mod store;
pub mod tags;
pub mod tracker;
pub mod validation;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use codec::{AnnotationCodec, CodecContext, EditorView};
pub use error::{DecodeError, EditError, EngineError, SchemaParseError};
pub use ports::{CatalogRef, CatalogService, ChangeEntry, KeyOutcome, KeyResult};
pub use schema::{ConstraintName, ModelObject, ObjectId, ObjectKind, SchemaModel};
pub use state::SyncState;
pub use store::{AnnotationMap, AnnotationStore, RecordOutcome};
pub use tags::AnnotationKind;
pub use tracker::{ChangeTracker, PendingEdit, PendingKey};
pub use validation::{ValidationDetail, ValidationReport};
