use schemars::JsonSchema;
use serde::Deserialize;

/// Records returned by `logs` when no limit is given.
pub const DEFAULT_LOG_LIMIT: usize = 50;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct BuildRequest {
    /// Natural-language description of the project to scaffold.
    pub prompt: String,
    /// Run in the background and return a job id immediately (poll with `build_status`).
    /// Default false: wait for the whole build, which can take several minutes.
    pub background: Option<bool>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct BuildStatusRequest {
    /// Job id returned by `build` with background=true. Omit to list all jobs.
    pub job_id: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct LogsRequest {
    /// Number of most recent log records to return (default 50, max 500).
    pub limit: Option<usize>,
}

impl LogsRequest {
    pub fn limit_or_default(&self) -> usize {
        self.limit.filter(|n| *n > 0).unwrap_or(DEFAULT_LOG_LIMIT)
    }
}
