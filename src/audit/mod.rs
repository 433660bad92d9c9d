//! Structured build log: one record per pipeline stage.
//!
//! JSONL files are always written (`build.log`, plus `errors.log` for failed
//! records). With the `audit-db` feature and `audit.backend = "duckdb"`, the
//! same records also land in a DuckDB table and `latest` reads from there.

#[cfg(feature = "audit-db")]
pub mod db;

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::config::{AuditBackend, AuditConfig};
use crate::error::RelayError;
use crate::redact::redact;

pub const BUILD_LOG: &str = "build.log";
pub const ERROR_LOG: &str = "errors.log";
/// Upper bound for `latest(n)`.
pub const MAX_LATEST: usize = 500;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    pub run_id: String,
    pub stage: String,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub success: bool,
    pub message: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl LogRecord {
    pub fn new(run_id: impl Into<String>, stage: impl Into<String>, success: bool) -> Self {
        Self {
            timestamp: Utc::now(),
            run_id: run_id.into(),
            stage: stage.into(),
            provider: None,
            model: None,
            success,
            message: None,
            metadata: serde_json::Value::Null,
        }
    }

    /// Copy with every string field passed through `redact`.
    pub fn redacted(&self) -> Self {
        let metadata = match serde_json::to_string(&self.metadata) {
            Ok(raw) => serde_json::from_str(&redact(&raw)).unwrap_or(serde_json::Value::Null),
            Err(_) => serde_json::Value::Null,
        };
        Self {
            timestamp: self.timestamp,
            run_id: redact(&self.run_id),
            stage: self.stage.clone(),
            provider: self.provider.clone(),
            model: self.model.clone(),
            success: self.success,
            message: self.message.as_deref().map(redact),
            metadata,
        }
    }
}

/// Append-only JSONL files under one directory.
pub struct JsonlLog {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub async fn append(&self, record: &LogRecord) -> Result<(), RelayError> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        tokio::fs::create_dir_all(&self.dir).await?;
        append_line(&self.dir.join(BUILD_LOG), &line).await?;
        if !record.success {
            append_line(&self.dir.join(ERROR_LOG), &line).await?;
        }
        Ok(())
    }

    /// Newest first. Lines that fail to parse are skipped.
    pub async fn latest(&self, n: usize) -> Result<Vec<LogRecord>, RelayError> {
        let content = match tokio::fs::read_to_string(self.dir.join(BUILD_LOG)).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(e.into()),
        };
        Ok(content
            .lines()
            .rev()
            .filter(|l| !l.trim().is_empty())
            .filter_map(|l| serde_json::from_str(l).ok())
            .take(n)
            .collect())
    }
}

async fn append_line(path: &Path, line: &str) -> Result<(), std::io::Error> {
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(line.as_bytes()).await?;
    file.flush().await
}

/// The build log. Writes fan out to every configured backend; reads come from
/// DuckDB when it is the selected backend, else from the JSONL file.
pub struct LogStore {
    jsonl: JsonlLog,
    #[cfg(feature = "audit-db")]
    db: Option<db::DuckDbLog>,
}

impl LogStore {
    pub fn open(config: &AuditConfig) -> Self {
        let jsonl = JsonlLog::new(config.logs_dir.clone());

        #[cfg(feature = "audit-db")]
        let db = match config.backend {
            AuditBackend::Duckdb => {
                match db::DuckDbLog::open(&config.logs_dir.join(db::DB_FILE)) {
                    Ok(db) => Some(db),
                    Err(e) => {
                        tracing::warn!("duckdb log store unavailable, using JSONL only: {e}");
                        None
                    }
                }
            }
            AuditBackend::Jsonl => None,
        };

        #[cfg(not(feature = "audit-db"))]
        if config.backend == AuditBackend::Duckdb {
            tracing::warn!("audit.backend = duckdb requires the audit-db feature; using JSONL");
        }

        Self {
            jsonl,
            #[cfg(feature = "audit-db")]
            db,
        }
    }

    /// Redact and persist one record.
    pub async fn append(&self, record: &LogRecord) -> Result<(), RelayError> {
        let record = record.redacted();
        self.jsonl.append(&record).await?;

        #[cfg(feature = "audit-db")]
        if let Some(db) = &self.db {
            db.append(record).await?;
        }
        Ok(())
    }

    /// Append and only log failures. Used where the log must not abort a build.
    pub async fn record(&self, record: &LogRecord) {
        if let Err(e) = self.append(record).await {
            tracing::warn!(stage = %record.stage, "failed to append log record: {e}");
        }
    }

    /// Up to `n` most recent records, newest first.
    pub async fn latest(&self, n: usize) -> Result<Vec<LogRecord>, RelayError> {
        let n = n.min(MAX_LATEST);

        #[cfg(feature = "audit-db")]
        if let Some(db) = &self.db {
            return db.latest(n).await;
        }

        self.jsonl.latest(n).await
    }
}
