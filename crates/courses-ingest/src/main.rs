//! Courses Ingest - course catalog ingestion tool

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use courses_common::logging::{init_logging, LogConfig, LogLevel};
use courses_ingest::config::IngestConfig;
use courses_ingest::decoder::RecordStream;
use courses_ingest::enrich::{AdmissionControl, BulletinProvider, EnrichmentProvider, NoopProvider};
use courses_ingest::normalize::normalize;
use courses_ingest::pipeline::Pipeline;
use courses_ingest::sink::bulk::IndexTarget;
use courses_ingest::sink::{BulkIndexer, HttpBulkTransport, JsonLinesSink, RowSink, Sinks};
use tokio::io::AsyncRead;
use tracing::{debug, info, warn};

#[derive(Parser, Debug)]
#[command(name = "courses-ingest")]
#[command(author, version, about = "Course catalog ingestion tool")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ingest a JSON array of course sections
    Run {
        /// Input file, or `-` for stdin
        input: PathBuf,

        /// Enrichment workers
        #[arg(short, long, env = "COURSES_WORKERS")]
        workers: Option<usize>,

        /// Ceiling on concurrent bulletin requests
        #[arg(long, env = "COURSES_MAX_REQUESTS")]
        max_requests: Option<usize>,

        /// Documents per bulk request
        #[arg(long, env = "ES_BATCH_SIZE")]
        batch_size: Option<usize>,

        /// Search cluster base URL
        #[arg(long, env = "ES_URL")]
        es_url: Option<String>,

        /// Search index name
        #[arg(long, env = "ES_INDEX")]
        es_index: Option<String>,

        /// Write rows as JSON lines to this file (`-` for stdout)
        #[arg(long)]
        rows_out: Option<PathBuf>,

        /// Skip bulletin lookups
        #[arg(long)]
        no_enrich: bool,

        /// Require the bulk-index sink
        #[arg(long, conflicts_with = "no_bulk")]
        bulk: bool,

        /// Disable the bulk-index sink
        #[arg(long)]
        no_bulk: bool,

        /// Delete and recreate the search index before loading
        #[arg(long)]
        reset_index: bool,
    },

    /// Decode and normalize an input without enriching or writing anything
    Check {
        /// Input file, or `-` for stdin
        input: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Before parsing so `env = ...` arguments see `.env` values
    let dotenv_path = IngestConfig::load_dotenv();
    let cli = Cli::parse();

    // Initialize logging based on verbose flag
    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    // Environment variables take precedence
    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("courses-ingest")
        .build()
        .merge_env()?;

    let _guard = init_logging(&log_config)?;
    if let Some(path) = &dotenv_path {
        debug!(path = %path.display(), "Loaded environment file");
    }

    match cli.command {
        Command::Run {
            input,
            workers,
            max_requests,
            batch_size,
            es_url,
            es_index,
            rows_out,
            no_enrich,
            bulk,
            no_bulk,
            reset_index,
        } => {
            let mut config = IngestConfig::from_env();
            if let Some(workers) = workers {
                config.pipeline.workers = workers;
            }
            if let Some(max_requests) = max_requests {
                config.pipeline.max_requests = max_requests;
            }
            if let Some(batch_size) = batch_size {
                config.search.batch_size = batch_size;
            }
            if es_url.is_some() {
                config.search.url = es_url;
            }
            if let Some(index) = es_index {
                config.search.index = index;
            }
            config.validate().context("Invalid configuration")?;

            let provider: Arc<dyn EnrichmentProvider> = if no_enrich {
                info!("Enrichment disabled");
                Arc::new(NoopProvider)
            } else {
                Arc::new(
                    BulletinProvider::new(
                        config.bulletin.url_template.clone(),
                        Duration::from_secs(config.bulletin.request_timeout_secs),
                    )
                    .context("Failed to build HTTP client")?,
                )
            };

            let mut sinks = Sinks::new();
            if let Some(rows) = row_sink(&config, rows_out.as_deref()).await? {
                sinks = sinks.with_rows(rows);
            }

            let use_bulk = !no_bulk && (bulk || config.search.url.is_some());
            if use_bulk {
                let url = config
                    .search
                    .url
                    .as_deref()
                    .context("--bulk requires ES_URL or --es-url")?;
                let transport = HttpBulkTransport::new(
                    url,
                    config.search.index.clone(),
                    Duration::from_secs(config.search.request_timeout_secs),
                )
                .context("Failed to build HTTP client")?;
                if reset_index {
                    transport
                        .reset_index()
                        .await
                        .context("Failed to reset search index")?;
                }

                let mut target = IndexTarget::new(config.search.index.clone());
                if let Some(doc_type) = &config.search.doc_type {
                    target = target.with_doc_type(doc_type.clone());
                }
                sinks = sinks.with_bulk(BulkIndexer::new(
                    Arc::new(transport),
                    target,
                    config.search.batch_size,
                ));
            }

            if sinks.is_empty() {
                warn!("No sinks configured; records will be counted but not stored");
            }

            let pipeline = Pipeline::new(provider, AdmissionControl::new(config.pipeline.max_requests))
                .with_workers(config.pipeline.workers)
                .with_queue_capacity(config.pipeline.queue_capacity);

            let summary = pipeline.run(open_input(&input).await?, sinks).await?;
            info!(
                decoded = summary.decoded,
                processed = summary.processed,
                skipped = summary.skipped_malformed_key,
                unavailable = summary.enrichment_unavailable,
                groups_computed = summary.groups_computed,
                rows_written = summary.rows_written,
                sink_failures = summary.sink_failures(),
                bulk_flushes = summary.bulk_flushes,
                "Ingestion complete"
            );
        },
        Command::Check { input } => {
            let mut records = RecordStream::new(open_input(&input).await?);
            let mut valid = 0u64;
            let mut malformed = 0u64;

            while let Some(raw) = records.next().await? {
                match normalize(raw) {
                    Ok(_) => valid += 1,
                    Err(err) => {
                        malformed += 1;
                        warn!(course = %err.code, "Malformed course code");
                    },
                }
            }

            info!(
                records = records.records_decoded(),
                valid = valid,
                malformed = malformed,
                "Input check complete"
            );
        },
    }

    Ok(())
}

async fn open_input(path: &Path) -> Result<Box<dyn AsyncRead + Unpin + Send>> {
    if path == Path::new("-") {
        return Ok(Box::new(tokio::io::stdin()));
    }

    let file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("Failed to open input {}", path.display()))?;
    Ok(Box::new(file))
}

async fn row_sink(config: &IngestConfig, rows_out: Option<&Path>) -> Result<Option<Arc<dyn RowSink>>> {
    if let Some(path) = rows_out {
        if path == Path::new("-") {
            return Ok(Some(Arc::new(JsonLinesSink::new(tokio::io::stdout()))));
        }
        let sink = JsonLinesSink::create(path)
            .await
            .with_context(|| format!("Failed to create {}", path.display()))?;
        info!(path = %path.display(), "Writing rows as JSON lines");
        return Ok(Some(Arc::new(sink)));
    }

    let Some(url) = config.database.url.as_deref() else {
        return Ok(None);
    };

    #[cfg(feature = "database")]
    {
        let sink = courses_ingest::sink::PgRowSink::connect(
            url,
            config.database.max_connections,
            &config.database.tables(),
        )
        .await
        .context("Failed to connect to database")?;
        Ok(Some(Arc::new(sink)))
    }

    #[cfg(not(feature = "database"))]
    {
        warn!(
            url_set = !url.is_empty(),
            "DATABASE_URL is set but this build has no database support; rows will not be stored"
        );
        Ok(None)
    }
}
