//! Annotation CLI
//!
//! Offline checks over catalog dump files (an ERMrest-style schema document
//! with inline annotations).
//!
//! # Usage
//!
//! ```bash
//! # Structural check of every annotated object
//! annotation_cli check catalog.json
//!
//! # One object only
//! annotation_cli check catalog.json --object isa:dataset
//!
//! # Print one annotation (structured view or the opaque fallback reason)
//! annotation_cli show catalog.json isa:dataset visible-columns
//!
//! # Label the dump with the server it was taken from
//! annotation_cli check catalog.json --host https://example.org --catalog 1
//! ```
//!
//! Without `--host` the configured default server labels the dump, if any.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use annotation_workbench::core::codec::{
    CitationCodec, ColumnDisplayCodec, DisplayCodec, ForeignKeyCodec, KeyDisplayCodec,
    SourceDefinitionsCodec, TableDisplayCodec, VisibleColumnsCodec, VisibleForeignKeysCodec,
};
use annotation_workbench::core::{AnnotationCodec, AnnotationKind, CatalogRef, EditorView, ObjectId};
use annotation_workbench::{init_tracing, ConfigLoader, InMemoryCatalog, Session};
use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::Value;
use tracing::debug;

#[derive(Parser)]
#[command(name = "annotation_cli")]
#[command(version = "0.1.0")]
#[command(about = "Check and inspect catalog annotations in dump files")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Workbench configuration file
    #[arg(long, global = true, env = "ANNOTATION_WORKBENCH_CONFIG", default_value = "annotation-workbench.yaml")]
    config: PathBuf,

    /// Output format
    #[arg(long, short = 'o', global = true, default_value = "text", value_enum)]
    format: OutputFormat,

    /// Server the dump was taken from, overriding the configured default
    #[arg(long, global = true)]
    host: Option<String>,

    /// Catalog id on `--host`
    #[arg(long, global = true)]
    catalog: Option<String>,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Json,
    Text,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode every recognised annotation and report failures
    Check {
        dump: PathBuf,

        /// Object path, e.g. `isa:dataset` or `fkey:isa:dataset_owner_fkey`
        #[arg(long)]
        object: Option<String>,
    },

    /// Print the value of one annotation
    Show {
        dump: PathBuf,
        object: String,
        /// Tag URI or short name such as `visible-columns`
        kind: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config = ConfigLoader::new(&cli.config).load()?;
    init_tracing(&config);

    let dump = match &cli.command {
        Commands::Check { dump, .. } | Commands::Show { dump, .. } => dump.clone(),
    };
    let service = InMemoryCatalog::from_dump(&dump)?;
    let catalog = config
        .resolve_server(cli.host.as_deref(), cli.catalog.as_deref())
        .map(|server| server.catalog_ref())
        .unwrap_or_else(|| CatalogRef::new(format!("file://{}", dump.display()), "dump"));
    debug!(%catalog, "catalog resolved");
    let session = Session::new(Arc::new(service), catalog, config.engine.clone());
    let objects = session.connect().await?;
    debug!(objects, "dump loaded");

    match cli.command {
        Commands::Check { object, .. } => check(&session, object.as_deref(), cli.format),
        Commands::Show { object, kind, .. } => show(&session, &object, &kind, cli.format),
    }
}

fn parse_object(path: &str) -> Result<ObjectId> {
    path.parse().map_err(|e: String| anyhow!(e))
}

fn check(session: &Session, object: Option<&str>, format: OutputFormat) -> Result<ExitCode> {
    let targets = match object {
        Some(path) => vec![parse_object(path)?],
        None => session.objects()?,
    };

    let mut errors = 0;
    let mut reports = Vec::new();
    for target in targets {
        let report = session.check(&target)?;
        errors += report.error_count;
        if !report.is_clean() {
            reports.push((target, report));
        }
    }

    match format {
        OutputFormat::Json => {
            let out: Vec<_> = reports
                .iter()
                .map(|(object, report)| serde_json::json!({ "object": object.to_string(), "report": report }))
                .collect();
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        OutputFormat::Text => {
            for (_, report) in &reports {
                for detail in &report.details {
                    println!("{}: {}", detail.path, detail.message);
                }
            }
            println!("{errors} error(s)");
        }
    }
    Ok(if errors == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn show(session: &Session, object: &str, kind: &str, format: OutputFormat) -> Result<ExitCode> {
    let object = parse_object(object)?;
    let kind = AnnotationKind::parse(kind).ok_or_else(|| anyhow!("unknown annotation kind '{kind}'"))?;

    if session.current_raw(&object, kind.tag())?.is_none() {
        eprintln!("{object} has no {kind} annotation");
        return Ok(ExitCode::FAILURE);
    }
    let (value, fallback) = match kind {
        AnnotationKind::VisibleColumns => view::<VisibleColumnsCodec>(session, &object)?,
        AnnotationKind::VisibleForeignKeys => view::<VisibleForeignKeysCodec>(session, &object)?,
        AnnotationKind::SourceDefinitions => view::<SourceDefinitionsCodec>(session, &object)?,
        AnnotationKind::TableDisplay => view::<TableDisplayCodec>(session, &object)?,
        AnnotationKind::Citation => view::<CitationCodec>(session, &object)?,
        AnnotationKind::Display => view::<DisplayCodec>(session, &object)?,
        AnnotationKind::ForeignKey => view::<ForeignKeyCodec>(session, &object)?,
        AnnotationKind::KeyDisplay => view::<KeyDisplayCodec>(session, &object)?,
        AnnotationKind::ColumnDisplay => view::<ColumnDisplayCodec>(session, &object)?,
    };

    match format {
        OutputFormat::Json => {
            let out = serde_json::json!({
                "object": object.to_string(),
                "kind": kind.short_name(),
                "structured": fallback.is_none(),
                "reason": fallback,
                "value": value,
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        OutputFormat::Text => {
            match &fallback {
                Some(reason) => println!("{object} {kind}: opaque ({reason})"),
                None => println!("{object} {kind}: structured"),
            }
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
    }
    Ok(ExitCode::SUCCESS)
}

/// Editor view of one annotation as (value, fallback reason).
fn view<C: AnnotationCodec>(session: &Session, object: &ObjectId) -> Result<(Value, Option<String>)> {
    Ok(match session.open::<C>(object)? {
        EditorView::Structured(doc) => (C::encode(&doc), None),
        EditorView::Opaque { raw, reason } => (raw, Some(reason)),
    })
}
