//! 🚀 krx-cli: poke an index from the terminal.
//!
//! 🎬 Loads settings, sets up logging, builds one criteria from the flags, runs it,
//! and prints a table. `import` goes the other way and pushes an NDJSON file in
//! through a bulk scope. 🦆

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use comfy_table::{Cell, CellAlignment, ContentArrangement, Table, presets::UTF8_FULL};
use krx::prelude::*;
use krx::{Bulk, Response, Settings};
use serde_json::{Value, json};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod filters;
mod ndjson;
mod progress;

use progress::{ImportProgress, format_number};

/// 🔍 Query, aggregate and bulk-load a search index.
#[derive(Debug, Parser)]
#[command(name = "krx", version, about)]
struct Cli {
    /// TOML settings file. It wins over KRX_* environment variables on conflicts.
    #[arg(long, global = true, default_value = "krx.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run a search and print one page of hits.
    Search {
        index: String,
        /// field=value filter; repeatable. `a,b`, `lo..hi` and `null` are understood.
        #[arg(long = "where", value_name = "FIELD=VALUE")]
        where_: Vec<String>,
        /// negated field=value filter; repeatable.
        #[arg(long = "where-not", value_name = "FIELD=VALUE")]
        where_not: Vec<String>,
        /// full-text query
        #[arg(long)]
        query: Option<String>,
        /// `field` or `field:desc`; repeatable.
        #[arg(long)]
        sort: Vec<String>,
        #[arg(long, default_value_t = 1)]
        page: u64,
        #[arg(long, default_value_t = 30)]
        per_page: u64,
    },
    /// Count documents per distinct value of a field.
    Aggregate { index: String, field: String },
    /// Load an NDJSON file (optionally .gz) into an index.
    Import {
        index: String,
        file: PathBuf,
        /// document field that becomes the `_id`
        #[arg(long, default_value = "id")]
        id_field: String,
    },
}

/// 🚀 Parse, log, run. Failures print their whole cause chain and exit 1.
#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        error!("💀 error: {}", err);
        for cause in err.chain().skip(1) {
            error!("⚠️  cause: {}", cause);
        }
        let looks_like_connection_trouble = err.chain().any(|cause| {
            matches!(
                cause.downcast_ref::<krx::Error>(),
                Some(krx::Error::Connection(_) | krx::Error::Timeout(_))
            )
        });
        if looks_like_connection_trouble {
            error!(
                "🔧 hint: the engine isn't answering. Check that it is running and that \
                 connection.url (or KRX_CONNECTION__URL) points at it. \
                 With Docker, `docker ps` shows whether the container is up."
            );
        }
        std::process::exit(1);
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let settings = load_settings(&cli.config)?;
    match cli.command {
        Command::Search {
            index,
            where_,
            where_not,
            query,
            sort,
            page,
            per_page,
        } => {
            let index = Arc::new(Index::new(index, settings));
            let criteria = build_search(&index, &where_, &where_not, query.as_deref(), &sort)?
                .paginate(page, per_page);
            let response = criteria.execute().await?;
            println!("{}", hits_table(&response));
            println!(
                "page {} of {} ({} total, took {} ms)",
                response.current_page(),
                response.total_pages(),
                format_number(response.total_count()),
                response.took().unwrap_or_default()
            );
        }
        Command::Aggregate { index, field } => {
            let index = Arc::new(Index::new(index, settings));
            let buckets = index
                .criteria()
                .limit(0)
                .aggregate(&field, json!({}))
                .aggregation(&field)
                .await?
                .with_context(|| format!("💀 the engine sent back no '{}' aggregation", field))?;
            println!("{}", buckets_table(&field, &buckets));
        }
        Command::Import {
            index,
            file,
            id_field,
        } => {
            let index = Index::new(index, settings);
            import(&index, &file, &id_field).await?;
        }
    }
    Ok(())
}

/// 🔧 Only hand the file to the loader when it's actually there; env vars work alone.
fn load_settings(config: &Path) -> Result<Settings> {
    let exists = config.try_exists().with_context(|| {
        format!(
            "💀 couldn't check whether config file '{}' exists",
            config.display()
        )
    })?;
    krx::load_config(exists.then_some(config))
        .context("💀 krx couldn't load its settings, check the config file and KRX_* variables")
}

fn build_search(
    index: &Arc<Index>,
    where_: &[String],
    where_not: &[String],
    query: Option<&str>,
    sort: &[String],
) -> Result<Criteria> {
    let wheres = where_
        .iter()
        .map(|raw| filters::parse_pair(raw))
        .collect::<Result<Vec<_>>>()?;
    let where_nots = where_not
        .iter()
        .map(|raw| filters::parse_pair(raw))
        .collect::<Result<Vec<_>>>()?;
    let sorts = sort
        .iter()
        .map(|raw| sort_directive(raw))
        .collect::<Result<Vec<_>>>()?;

    let mut criteria = index.criteria().where_(wheres).where_not(where_nots);
    if let Some(text) = query {
        criteria = criteria.search(text, Value::Null);
    }
    if !sorts.is_empty() {
        criteria = criteria.sort(sorts);
    }
    Ok(criteria)
}

/// 🔄 `price` stays a bare field name; `price:desc` becomes `{"price": "desc"}`.
fn sort_directive(raw: &str) -> Result<Value> {
    match raw.split_once(':') {
        None => Ok(Value::from(raw)),
        Some((field, order @ ("asc" | "desc"))) => Ok(json!({ field: order })),
        Some((_, order)) => bail!("💀 sort order must be asc or desc, got '{}'", order),
    }
}

fn hits_table(response: &Response) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["_id", "_score", "_source"]);
    for result in response.results() {
        table.add_row(vec![
            Cell::new(&result.id),
            Cell::new(
                result
                    .meta
                    .score
                    .map(|score| format!("{:.3}", score))
                    .unwrap_or_else(|| "-".to_string()),
            )
            .set_alignment(CellAlignment::Right),
            Cell::new(result.source.to_string()),
        ]);
    }
    table
}

fn buckets_table(field: &str, buckets: &Value) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec![field, "doc_count"]);
    if let Some(buckets) = buckets.as_object() {
        for (key, bucket) in buckets {
            let count = bucket
                .get("doc_count")
                .and_then(Value::as_u64)
                .unwrap_or_default();
            table.add_row(vec![
                Cell::new(key),
                Cell::new(format_number(count)).set_alignment(CellAlignment::Right),
            ]);
        }
    }
    table
}

/// 📥 Stream the file's lines into one bulk scope, then refresh so they're searchable.
async fn import(index: &Index, file: &Path, id_field: &str) -> Result<()> {
    let bytes = ndjson::read_file(file)?;
    let mut progress = ImportProgress::new(index.name(), bytes.len() as u64);

    let ((), flushes) = index
        .bulk_scope(
            BulkOptions::default(),
            async |bulk: &mut Bulk| -> Result<()> {
                for (number, (start, end)) in ndjson::line_spans(&bytes).into_iter().enumerate() {
                    let raw = &bytes[start..end];
                    match ndjson::parse_line(raw, number + 1, id_field)? {
                        Some(line) => {
                            bulk.index(&line.id, &line.document, Value::Null).await?;
                            progress.update(line.bytes, 1, bulk.flushes());
                        }
                        None => progress.update(raw.len() as u64, 0, bulk.flushes()),
                    }
                }
                Ok(())
            },
        )
        .await?;

    progress.finish(flushes);
    index.refresh().await?;
    info!(
        "📥 imported {} documents from '{}' into '{}'",
        progress.docs(),
        file.display(),
        index.name()
    );
    Ok(())
}
