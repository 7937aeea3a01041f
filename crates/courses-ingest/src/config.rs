//! Configuration management

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::enrich::bulletin::DEFAULT_URL_TEMPLATE;
use crate::sink::catalog::{
    CatalogTables, DEFAULT_COURSES_TABLE, DEFAULT_ROWS_TABLE, DEFAULT_SECTIONS_TABLE,
};

// ============================================================================
// Pipeline Configuration Constants
// ============================================================================

/// Default number of enrichment workers.
pub const DEFAULT_WORKERS: usize = crate::pipeline::DEFAULT_WORKERS;

/// Default ceiling on concurrent bulletin requests.
pub const DEFAULT_MAX_REQUESTS: usize = 10;

/// Default capacity of each inter-stage queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = crate::pipeline::DEFAULT_QUEUE_CAPACITY;

/// Default bulletin request timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default search index name.
pub const DEFAULT_ES_INDEX: &str = "courses";

/// Default bulk request timeout in seconds.
pub const DEFAULT_ES_REQUEST_TIMEOUT_SECS: u64 = 60;

/// Default number of documents per bulk request.
pub const DEFAULT_ES_BATCH_SIZE: usize = 200;

/// Default flat table for the row sink.
pub const DEFAULT_DATABASE_TABLE: &str = DEFAULT_ROWS_TABLE;

/// Default maximum database connections in the pool.
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 10;

/// Ingestion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    pub pipeline: PipelineConfig,
    pub bulletin: BulletinConfig,
    pub search: SearchConfig,
    pub database: DatabaseConfig,
}

/// Worker pool and queue sizing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub workers: usize,
    pub max_requests: usize,
    pub queue_capacity: usize,
}

/// Bulletin enrichment provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulletinConfig {
    pub url_template: String,
    pub request_timeout_secs: u64,
}

/// Bulk-index sink. Disabled when `url` is unset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    pub url: Option<String>,
    pub index: String,
    pub doc_type: Option<String>,
    pub batch_size: usize,
    pub request_timeout_secs: u64,
}

/// Row sink. Disabled when `url` is unset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub table: String,
    pub courses_table: String,
    pub sections_table: String,
    pub max_connections: u32,
}

impl DatabaseConfig {
    pub fn tables(&self) -> CatalogTables {
        CatalogTables {
            rows: self.table.clone(),
            courses: self.courses_table.clone(),
            sections: self.sections_table.clone(),
        }
    }
}

impl IngestConfig {
    /// Load `.env` from the working directory or a parent into the process
    /// environment. Variables already set are kept.
    pub fn load_dotenv() -> Option<PathBuf> {
        dotenvy::dotenv().ok()
    }

    /// Load variables from `path`, then read and validate the configuration.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        dotenvy::from_path(path)
            .with_context(|| format!("Failed to load environment file {}", path.display()))?;

        let config = Self::from_env();
        config.validate()?;

        Ok(config)
    }

    /// Read environment variables over the defaults without validating.
    pub fn from_env() -> Self {
        Self {
            pipeline: PipelineConfig {
                workers: env_parse("COURSES_WORKERS").unwrap_or(DEFAULT_WORKERS),
                max_requests: env_parse("COURSES_MAX_REQUESTS").unwrap_or(DEFAULT_MAX_REQUESTS),
                queue_capacity: env_parse("COURSES_QUEUE_CAPACITY")
                    .unwrap_or(DEFAULT_QUEUE_CAPACITY),
            },
            bulletin: BulletinConfig {
                url_template: std::env::var("BULLETIN_URL_TEMPLATE")
                    .unwrap_or_else(|_| DEFAULT_URL_TEMPLATE.to_string()),
                request_timeout_secs: env_parse("COURSES_REQUEST_TIMEOUT_SECS")
                    .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
            },
            search: SearchConfig {
                url: env_nonempty("ES_URL"),
                index: std::env::var("ES_INDEX").unwrap_or_else(|_| DEFAULT_ES_INDEX.to_string()),
                doc_type: env_nonempty("ES_DOC_TYPE"),
                batch_size: env_parse("ES_BATCH_SIZE").unwrap_or(DEFAULT_ES_BATCH_SIZE),
                request_timeout_secs: env_parse("ES_REQUEST_TIMEOUT_SECS")
                    .unwrap_or(DEFAULT_ES_REQUEST_TIMEOUT_SECS),
            },
            database: DatabaseConfig {
                url: env_nonempty("DATABASE_URL"),
                table: std::env::var("DATABASE_TABLE")
                    .unwrap_or_else(|_| DEFAULT_DATABASE_TABLE.to_string()),
                courses_table: std::env::var("DATABASE_COURSES_TABLE")
                    .unwrap_or_else(|_| DEFAULT_COURSES_TABLE.to_string()),
                sections_table: std::env::var("DATABASE_SECTIONS_TABLE")
                    .unwrap_or_else(|_| DEFAULT_SECTIONS_TABLE.to_string()),
                max_connections: env_parse("DATABASE_MAX_CONNECTIONS")
                    .unwrap_or(DEFAULT_DATABASE_MAX_CONNECTIONS),
            },
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        let pipeline = &self.pipeline;

        if pipeline.workers == 0 {
            anyhow::bail!("Worker count must be greater than 0");
        }

        if pipeline.max_requests == 0 {
            anyhow::bail!("Max concurrent requests must be greater than 0");
        }

        if pipeline.max_requests > pipeline.workers {
            anyhow::bail!(
                "Max concurrent requests ({}) cannot be greater than the worker count ({})",
                pipeline.max_requests,
                pipeline.workers
            );
        }

        if pipeline.queue_capacity == 0 {
            anyhow::bail!("Queue capacity must be greater than 0");
        }

        if self.search.batch_size == 0 {
            anyhow::bail!("Bulk batch size must be greater than 0");
        }

        if self.search.request_timeout_secs == 0 || self.bulletin.request_timeout_secs == 0 {
            anyhow::bail!("Request timeouts must be greater than 0");
        }

        if self.search.index.is_empty() {
            anyhow::bail!("Search index name cannot be empty");
        }

        if self.bulletin.url_template.is_empty() {
            anyhow::bail!("Bulletin URL template cannot be empty");
        }

        if !self.bulletin.url_template.contains("{dept}") {
            tracing::warn!("Bulletin URL template has no {{dept}} placeholder");
        }

        Ok(())
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            pipeline: PipelineConfig {
                workers: DEFAULT_WORKERS,
                max_requests: DEFAULT_MAX_REQUESTS,
                queue_capacity: DEFAULT_QUEUE_CAPACITY,
            },
            bulletin: BulletinConfig {
                url_template: DEFAULT_URL_TEMPLATE.to_string(),
                request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            },
            search: SearchConfig {
                url: None,
                index: DEFAULT_ES_INDEX.to_string(),
                doc_type: None,
                batch_size: DEFAULT_ES_BATCH_SIZE,
                request_timeout_secs: DEFAULT_ES_REQUEST_TIMEOUT_SECS,
            },
            database: DatabaseConfig {
                url: None,
                table: DEFAULT_DATABASE_TABLE.to_string(),
                courses_table: DEFAULT_COURSES_TABLE.to_string(),
                sections_table: DEFAULT_SECTIONS_TABLE.to_string(),
                max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
            },
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.trim().parse().ok())
}

fn env_nonempty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = IngestConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.pipeline.workers, 10);
        assert_eq!(config.pipeline.max_requests, 10);
        assert_eq!(config.pipeline.queue_capacity, 100);
        assert_eq!(config.search.batch_size, 200);
        assert_eq!(config.database.table, "courses_t");
        assert_eq!(config.database.tables(), CatalogTables::default());
    }

    #[test]
    fn test_load_from_env_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(
            &path,
            "COURSES_QUEUE_CAPACITY=42\nDATABASE_SECTIONS_TABLE=catalog.sections_t\n",
        )
        .unwrap();

        let config = IngestConfig::load_from(&path).unwrap();
        assert_eq!(config.pipeline.queue_capacity, 42);
        assert_eq!(config.database.tables().sections, "catalog.sections_t");
        assert_eq!(config.database.tables().courses, "courses_v2_t");
    }

    #[test]
    fn test_missing_env_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = IngestConfig::load_from(&dir.path().join("absent.env")).unwrap_err();
        assert!(err.to_string().contains("Failed to load environment file"));
    }

    #[test]
    fn test_requests_cannot_exceed_workers() {
        let mut config = IngestConfig::default();
        config.pipeline.workers = 4;
        config.pipeline.max_requests = 5;

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("cannot be greater than the worker count"));

        config.pipeline.max_requests = 4;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_values_rejected() {
        let mut config = IngestConfig::default();
        config.pipeline.workers = 0;
        assert!(config.validate().is_err());

        let mut config = IngestConfig::default();
        config.pipeline.max_requests = 0;
        assert!(config.validate().is_err());

        let mut config = IngestConfig::default();
        config.pipeline.queue_capacity = 0;
        assert!(config.validate().is_err());

        let mut config = IngestConfig::default();
        config.search.batch_size = 0;
        assert!(config.validate().is_err());

        let mut config = IngestConfig::default();
        config.search.request_timeout_secs = 0;
        assert!(config.validate().is_err());
    }
}
