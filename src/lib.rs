//! Annotation workbench
//!
//! Session orchestration over `annotation_core`: connects to a catalog through
//! the `CatalogService` port, tracks pending annotation edits, and submits them
//! as changesets.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use annotation_workbench::{EngineConfig, InMemoryCatalog, Session};
//! use annotation_workbench::core::CatalogRef;
//!
//! # async fn run(service: InMemoryCatalog) -> anyhow::Result<()> {
//! let session = Session::new(Arc::new(service), CatalogRef::new("file://dump", "1"), EngineConfig::default());
//! session.connect().await?;
//! # Ok(())
//! # }
//! ```

pub mod catalog;
pub mod config;
pub mod session;
pub mod telemetry;

pub use annotation_core as core;

pub use catalog::InMemoryCatalog;
pub use config::{ConfigLoader, EngineConfig, ServerConfig, WorkbenchConfig};
pub use session::{RawEdit, RefreshOutcome, Session, UpdateReport};
pub use telemetry::init_tracing;
