//! DuckDB-backed log table. Gated behind the `audit-db` feature.

use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use duckdb::params;

use super::LogRecord;
use crate::error::RelayError;

pub const DB_FILE: &str = "audit.duckdb";

// ---------------------------------------------------------------------------
// Schema
// ---------------------------------------------------------------------------

pub const DDL_SCHEMA_VERSION: &str = "\
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at BIGINT NOT NULL
);";

pub const DDL_LOGS: &str = "\
CREATE TABLE IF NOT EXISTS logs (
    ts_ms BIGINT NOT NULL,
    run_id TEXT NOT NULL,
    stage TEXT NOT NULL,
    provider TEXT,
    model TEXT,
    success BOOLEAN NOT NULL,
    message TEXT,
    metadata TEXT
);";

pub const DDL_INDEX_LOGS_TS: &str = "\
CREATE INDEX IF NOT EXISTS idx_logs_ts ON logs(ts_ms);";

pub const SCHEMA_V1: &[&str] = &[DDL_SCHEMA_VERSION, DDL_LOGS, DDL_INDEX_LOGS_TS];

pub const CURRENT_VERSION: i32 = 1;

#[derive(Debug)]
pub enum MigrationError {
    Duckdb(duckdb::Error),
}

impl fmt::Display for MigrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationError::Duckdb(e) => write!(f, "DuckDB migration error: {e}"),
        }
    }
}

impl std::error::Error for MigrationError {}

/// Bring the schema up to `CURRENT_VERSION`. Idempotent.
pub fn apply_migrations(conn: &duckdb::Connection) -> Result<i32, MigrationError> {
    conn.execute_batch(DDL_SCHEMA_VERSION)
        .map_err(MigrationError::Duckdb)?;

    let current: i32 = conn
        .prepare("SELECT COALESCE(MAX(version), 0) FROM schema_version")
        .and_then(|mut stmt| stmt.query_row([], |row| row.get(0)))
        .map_err(MigrationError::Duckdb)?;

    if current >= CURRENT_VERSION {
        return Ok(current);
    }

    if current < 1 {
        for ddl in SCHEMA_V1 {
            conn.execute_batch(ddl).map_err(MigrationError::Duckdb)?;
        }
        conn.execute(
            "INSERT INTO schema_version (version, applied_at) VALUES (?, ?)",
            params![1, Utc::now().timestamp_millis()],
        )
        .map_err(MigrationError::Duckdb)?;
    }

    Ok(CURRENT_VERSION)
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// DuckDB is synchronous; every call runs on the blocking pool.
pub struct DuckDbLog {
    conn: Arc<Mutex<duckdb::Connection>>,
}

impl DuckDbLog {
    pub fn open(path: &Path) -> Result<Self, RelayError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = duckdb::Connection::open(path).map_err(store_err)?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, RelayError> {
        let conn = duckdb::Connection::open_in_memory().map_err(store_err)?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: duckdb::Connection) -> Result<Self, RelayError> {
        apply_migrations(&conn).map_err(|e| RelayError::Store(e.to_string()))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub async fn append(&self, record: LogRecord) -> Result<(), RelayError> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|_| RelayError::Store("connection lock poisoned".into()))?;
            conn.execute(
                "INSERT INTO logs (ts_ms, run_id, stage, provider, model, success, message, metadata) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    record.timestamp.timestamp_millis(),
                    record.run_id,
                    record.stage,
                    record.provider,
                    record.model,
                    record.success,
                    record.message,
                    record.metadata.to_string(),
                ],
            )
            .map_err(store_err)?;
            Ok(())
        })
        .await
        .map_err(|e| RelayError::Store(format!("log writer task failed: {e}")))?
    }

    pub async fn latest(&self, n: usize) -> Result<Vec<LogRecord>, RelayError> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|_| RelayError::Store("connection lock poisoned".into()))?;
            let mut stmt = conn
                .prepare(
                    "SELECT ts_ms, run_id, stage, provider, model, success, message, metadata \
                     FROM logs ORDER BY ts_ms DESC LIMIT ?",
                )
                .map_err(store_err)?;
            let rows = stmt
                .query_map(params![n as i64], |row| {
                    let ts_ms: i64 = row.get(0)?;
                    let metadata: Option<String> = row.get(7)?;
                    Ok(LogRecord {
                        timestamp: DateTime::<Utc>::from_timestamp_millis(ts_ms)
                            .unwrap_or_default(),
                        run_id: row.get(1)?,
                        stage: row.get(2)?,
                        provider: row.get(3)?,
                        model: row.get(4)?,
                        success: row.get(5)?,
                        message: row.get(6)?,
                        metadata: metadata
                            .and_then(|m| serde_json::from_str(&m).ok())
                            .unwrap_or_default(),
                    })
                })
                .map_err(store_err)?;
            rows.collect::<Result<Vec<_>, _>>().map_err(store_err)
        })
        .await
        .map_err(|e| RelayError::Store(format!("log reader task failed: {e}")))?
    }
}

fn store_err(e: duckdb::Error) -> RelayError {
    RelayError::Store(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_migrations_is_idempotent() {
        let conn = duckdb::Connection::open_in_memory().unwrap();
        let v1 = apply_migrations(&conn).unwrap();
        let v2 = apply_migrations(&conn).unwrap();
        assert_eq!(v1, CURRENT_VERSION);
        assert_eq!(v1, v2);

        let count: i32 = conn
            .prepare("SELECT COUNT(*) FROM schema_version")
            .unwrap()
            .query_row([], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn append_then_latest_round_trips_fields() {
        let db = DuckDbLog::open_in_memory().unwrap();
        let mut first = LogRecord::new("run-1", "requirements", true);
        first.timestamp = DateTime::<Utc>::from_timestamp_millis(1_700_000_000_000).unwrap();
        let mut second = LogRecord::new("run-1", "backend", false);
        second.timestamp = DateTime::<Utc>::from_timestamp_millis(1_700_000_001_000).unwrap();
        second.provider = Some("gemini".into());
        second.message = Some("boom".into());
        second.metadata = serde_json::json!({"files_generated": 0});

        db.append(first).await.unwrap();
        db.append(second.clone()).await.unwrap();

        let latest = db.latest(10).await.unwrap();
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[0], second);
        assert_eq!(latest[1].stage, "requirements");
    }
}
