use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::build::{BuildOrchestrator, BuildReport};
use crate::error::RelayError;

/// Finished jobs kept before the oldest are evicted.
pub const MAX_FINISHED_JOBS: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobRecord {
    pub id: String,
    pub status: JobStatus,
    pub prompt: String,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub run_dir: Option<String>,
    pub error: Option<String>,
    pub report: Option<BuildReport>,
}

/// Background builds, polled by id.
///
/// The map lock is only held for insert/lookup, never across an `.await`.
pub struct JobRegistry {
    orchestrator: Arc<BuildOrchestrator>,
    jobs: Arc<Mutex<HashMap<String, JobRecord>>>,
}

impl JobRegistry {
    pub fn new(orchestrator: Arc<BuildOrchestrator>) -> Self {
        Self {
            orchestrator,
            jobs: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Start a build on the runtime and return its job id immediately.
    pub fn submit(&self, prompt: String) -> String {
        let orchestrator = self.orchestrator.clone();
        let build_prompt = prompt.clone();
        self.track(prompt, async move { orchestrator.run_build(&build_prompt).await })
    }

    /// Register a job and run `build` on its own task. A second task awaits
    /// the handle, so a panicking build still ends up `Failed`.
    fn track<F>(&self, prompt: String, build: F) -> String
    where
        F: Future<Output = Result<BuildReport, RelayError>> + Send + 'static,
    {
        let id = uuid::Uuid::new_v4().to_string();
        let record = JobRecord {
            id: id.clone(),
            status: JobStatus::Running,
            prompt,
            created_at: Utc::now(),
            finished_at: None,
            run_dir: None,
            error: None,
            report: None,
        };
        with_jobs(&self.jobs, |jobs| {
            jobs.insert(id.clone(), record);
        });

        let handle = tokio::spawn(build);
        let jobs = self.jobs.clone();
        let job_id = id.clone();
        tokio::spawn(async move {
            let outcome = match handle.await {
                Ok(Ok(report)) => Ok(report),
                Ok(Err(e)) => {
                    tracing::warn!(job_id = %job_id, "background build failed: {e}");
                    Err(e.user_message())
                }
                Err(e) => {
                    tracing::error!(job_id = %job_id, "background build task died: {e}");
                    Err("build task aborted unexpectedly".to_string())
                }
            };
            with_jobs(&jobs, |jobs| {
                if let Some(job) = jobs.get_mut(&job_id) {
                    job.finished_at = Some(Utc::now());
                    match outcome {
                        Ok(report) => {
                            job.status = JobStatus::Completed;
                            job.run_dir = Some(report.run_dir.clone());
                            job.report = Some(report);
                        }
                        Err(message) => {
                            job.status = JobStatus::Failed;
                            job.error = Some(message);
                        }
                    }
                }
                evict_finished(jobs);
            });
        });

        tracing::info!(job_id = %id, "build job submitted");
        id
    }

    pub fn status(&self, id: &str) -> Option<JobRecord> {
        with_jobs(&self.jobs, |jobs| jobs.get(id).cloned())
    }

    /// Every job, newest first.
    pub fn list(&self) -> Vec<JobRecord> {
        let mut all = with_jobs(&self.jobs, |jobs| jobs.values().cloned().collect::<Vec<_>>());
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        all
    }
}

fn with_jobs<T>(
    jobs: &Mutex<HashMap<String, JobRecord>>,
    f: impl FnOnce(&mut HashMap<String, JobRecord>) -> T,
) -> T {
    match jobs.lock() {
        Ok(mut guard) => f(&mut guard),
        Err(poisoned) => f(&mut poisoned.into_inner()),
    }
}

fn evict_finished(jobs: &mut HashMap<String, JobRecord>) {
    let mut finished: Vec<(DateTime<Utc>, String)> = jobs
        .values()
        .filter_map(|j| j.finished_at.map(|t| (t, j.id.clone())))
        .collect();
    if finished.len() <= MAX_FINISHED_JOBS {
        return;
    }
    finished.sort();
    let excess = finished.len() - MAX_FINISHED_JOBS;
    for (_, id) in finished.into_iter().take(excess) {
        jobs.remove(&id);
    }
}
