//! Five-phase project build over one run directory.
//!
//! Phases run strictly in order and never abort the pipeline: a failing phase
//! is recorded with `success = false` and the next phase starts. Only failing
//! to create the run directory or to persist `run_report.json` is an error.

pub mod diagnostics;
pub mod report;
pub mod run;
pub mod templates;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;

use crate::audit::{LogRecord, LogStore};
use crate::classify::classify_prompt;
use crate::config::BuildConfig;
use crate::error::RelayError;
use crate::providers::ProviderId;
use crate::redact::redact;
use crate::router::{GenerationRequest, GenerationResult, InferenceRouter};

pub use report::{BuildReport, REPORT_FILE, Stage, StageRecord};
pub use run::BuildRun;

/// What one phase produced, before it becomes a `StageRecord`.
#[derive(Debug, Default)]
struct StageOutput {
    provider: Option<String>,
    model: Option<String>,
    fallback: bool,
    tokens: u64,
    files: Vec<String>,
    skipped: Vec<String>,
}

impl StageOutput {
    fn note(&mut self, result: &GenerationResult) {
        self.tokens += result.tokens;
        if result.fallback {
            self.fallback = true;
        } else {
            self.provider = Some(result.provider.to_string());
            self.model = Some(result.model.clone());
        }
    }
}

pub struct BuildOrchestrator {
    router: Arc<InferenceRouter>,
    logs: Arc<LogStore>,
    runs_dir: PathBuf,
    diagnostics: bool,
}

impl BuildOrchestrator {
    pub fn new(router: Arc<InferenceRouter>, logs: Arc<LogStore>, config: &BuildConfig) -> Self {
        Self {
            router,
            logs,
            runs_dir: config.runs_dir.clone(),
            diagnostics: config.diagnostics,
        }
    }

    pub fn runs_dir(&self) -> &std::path::Path {
        &self.runs_dir
    }

    /// Refresh provider availability, create a fresh run directory and build.
    pub async fn run_build(&self, prompt: &str) -> Result<BuildReport, RelayError> {
        self.router.refresh_providers().await;
        let run = BuildRun::create(&self.runs_dir, prompt, Utc::now()).await?;
        self.run_in(run, prompt).await
    }

    /// Build into an existing run. Availability is used as-is.
    pub async fn run_in(&self, mut run: BuildRun, prompt: &str) -> Result<BuildReport, RelayError> {
        let kind = classify_prompt(prompt);
        tracing::info!(run_id = run.id(), ?kind, "build started");

        let mut stages = Vec::with_capacity(Stage::ALL.len());
        for stage in Stage::ALL {
            let outcome = match stage {
                Stage::Requirements => self.requirements(&mut run, prompt).await,
                Stage::Backend => self.backend(&mut run, prompt).await,
                Stage::Frontend => self.frontend(&mut run, prompt).await,
                Stage::TestsDeploy => self.tests_deploy(&mut run, prompt).await,
                Stage::Documentation => self.documentation(&mut run, prompt).await,
            };
            let record = stage_record(stage, outcome);
            self.log_stage(run.id(), &record).await;
            stages.push(record);
        }

        let diagnostics = if self.diagnostics {
            let outcomes = diagnostics::run_diagnostics(run.dir()).await;
            let mut rec = LogRecord::new(run.id(), "diagnostics", outcomes.iter().all(|o| o.passed()));
            rec.metadata = serde_json::Value::Object(
                outcomes
                    .iter()
                    .map(|o| (o.name.clone(), serde_json::json!(o.code)))
                    .collect(),
            );
            self.logs.record(&rec).await;
            Some(outcomes)
        } else {
            None
        };

        let report = BuildReport {
            summary: report::summary_line(&stages),
            run_id: run.id().to_string(),
            run_dir: run.dir().display().to_string(),
            prompt: prompt.to_string(),
            kind,
            tokens_total: stages.iter().map(|s| s.tokens).sum(),
            stages,
            commands: report::run_commands(run.dir()),
            artifacts: run.digests().clone(),
            diagnostics,
        };

        let body = serde_json::to_string_pretty(&report)?;
        tokio::fs::write(run.dir().join(REPORT_FILE), redact(&body)).await?;
        tracing::info!(
            run_id = %report.run_id,
            succeeded = report.succeeded(),
            tokens = report.tokens_total,
            "build finished"
        );
        Ok(report)
    }

    async fn log_stage(&self, run_id: &str, record: &StageRecord) {
        let mut rec = LogRecord::new(run_id, record.stage.as_str(), record.success);
        rec.timestamp = record.timestamp;
        rec.provider = record.provider.clone();
        rec.model = record.model.clone();
        rec.message = record.error.clone();
        rec.metadata = serde_json::json!({
            "files_generated": record.files_generated,
            "tokens": record.tokens,
            "fallback": record.fallback,
            "skipped": record.skipped,
        });
        self.logs.record(&rec).await;
    }

    // -----------------------------------------------------------------------
    // Phases
    // -----------------------------------------------------------------------

    async fn requirements(&self, run: &mut BuildRun, prompt: &str) -> Result<StageOutput, RelayError> {
        let mut out = StageOutput::default();

        let draft = self
            .router
            .route(
                &GenerationRequest::text(format!(
                    "Extract detailed, structured requirements (title, description, modules, \
                     frontend stack, backend stack, DB schema, API routes, features, deployment) \
                     for: {prompt}"
                ))
                .prefer([ProviderId::Gemini]),
            )
            .await;
        out.note(&draft);

        let markdown = if draft.fallback {
            templates::requirements_md(prompt)
        } else {
            let refined = self
                .router
                .route(
                    &GenerationRequest::text(format!(
                        "Refine the following requirements to be concise and actionable. \
                         Return the improved text only.\n\n{}",
                        draft.text
                    ))
                    .prefer([ProviderId::OpenAi]),
                )
                .await;
            out.note(&refined);
            if refined.fallback { draft.text } else { refined.text }
        };

        let title: String = prompt.chars().take(64).collect();
        let summary = serde_json::json!({
            "title": if title.trim().is_empty() { "Project".to_string() } else { title },
            "description": prompt,
            "modules": ["Auth", "Core"],
            "frontend": ["React", "TailwindCSS"],
            "backend": ["FastAPI", "SQLite"],
            "features": ["CRUD", "Search", "User roles"],
            "deployment": "Docker + GitHub Actions",
        });

        write_file(run, &mut out, "requirements/requirements.md", &markdown).await?;
        write_file(
            run,
            &mut out,
            "requirements/requirements.json",
            &serde_json::to_string_pretty(&summary)?,
        )
        .await?;
        Ok(out)
    }

    async fn backend(&self, run: &mut BuildRun, prompt: &str) -> Result<StageOutput, RelayError> {
        let mut out = StageOutput::default();

        let result = self
            .router
            .route_code(
                &format!(
                    "Create a FastAPI backend with a modular structure (main.py, routes/, models/, \
                     services/). Include CRUD routes for the key entities of the project and \
                     pytest tests under tests/.\nProject: {prompt}"
                ),
                Some(vec![ProviderId::Gemini, ProviderId::Perplexity]),
            )
            .await;
        out.note(&result);

        let generated = result.files.unwrap_or_default();
        let written = write_generated(run, &mut out, "backend", generated).await?;
        if written == 0 {
            out.fallback = true;
            write_file(run, &mut out, "backend/main.py", templates::BACKEND_MAIN).await?;
        }

        if !run.exists("backend/requirements.txt").await {
            write_file(run, &mut out, "backend/requirements.txt", templates::BACKEND_REQUIREMENTS)
                .await?;
        }
        if !run.exists("backend/tests/test_health.py").await {
            write_file(run, &mut out, "backend/tests/test_health.py", templates::BACKEND_TEST_HEALTH)
                .await?;
        }
        Ok(out)
    }

    async fn frontend(&self, run: &mut BuildRun, prompt: &str) -> Result<StageOutput, RelayError> {
        let mut out = StageOutput::default();

        let result = self
            .router
            .route_code(
                &format!(
                    "Build a production-ready React + Tailwind frontend for: {prompt}. Include \
                     pages, components, routing and a clean UI."
                ),
                Some(vec![ProviderId::V0]),
            )
            .await;
        out.note(&result);

        let generated = result.files.unwrap_or_default();
        let written = write_generated(run, &mut out, "frontend", generated).await?;
        if written == 0 {
            out.fallback = true;
            for (rel, content) in templates::FRONTEND {
                write_file(run, &mut out, &format!("frontend/{rel}"), content).await?;
            }
        }
        Ok(out)
    }

    async fn tests_deploy(&self, run: &mut BuildRun, prompt: &str) -> Result<StageOutput, RelayError> {
        let mut out = StageOutput::default();

        let result = self
            .router
            .route_code(
                &format!(
                    "Write pytest integration tests for a FastAPI backend importable as \
                     `backend.main:app`. Use fastapi.testclient.\nProject: {prompt}"
                ),
                Some(vec![ProviderId::Mistral]),
            )
            .await;
        out.note(&result);

        let generated = result.files.unwrap_or_default();
        let written = write_generated(run, &mut out, "tests", generated).await?;
        if written == 0 {
            out.fallback = true;
            write_file(run, &mut out, "tests/test_api_smoke.py", templates::TESTS_API_SMOKE).await?;
        }

        write_file(run, &mut out, "pytest.ini", templates::PYTEST_INI).await?;
        write_file(run, &mut out, "Dockerfile", templates::DOCKERFILE).await?;
        write_file(run, &mut out, "docker-compose.yml", templates::DOCKER_COMPOSE).await?;
        write_file(run, &mut out, ".github/workflows/deploy.yml", templates::GH_ACTIONS_DEPLOY)
            .await?;
        Ok(out)
    }

    async fn documentation(&self, run: &mut BuildRun, prompt: &str) -> Result<StageOutput, RelayError> {
        let mut out = StageOutput::default();

        let draft = self
            .router
            .route(
                &GenerationRequest::text(format!(
                    "Generate a concise README for the project: {prompt}. Include setup, run, \
                     test, and deploy steps."
                ))
                .prefer([ProviderId::Gemini]),
            )
            .await;
        out.note(&draft);

        let readme = if draft.fallback {
            templates::readme(prompt)
        } else {
            let refined = self
                .router
                .route(
                    &GenerationRequest::text(format!(
                        "Refine this README to be clearer and actionable. Return markdown \
                         only.\n\n{}",
                        draft.text
                    ))
                    .prefer([ProviderId::OpenAi]),
                )
                .await;
            out.note(&refined);
            if refined.fallback { draft.text } else { refined.text }
        };

        write_file(run, &mut out, "README.md", &readme).await?;
        write_file(run, &mut out, "mkdocs.yml", templates::MKDOCS).await?;
        write_file(run, &mut out, "docs/index.md", templates::DOCS_INDEX).await?;
        Ok(out)
    }
}

fn stage_record(stage: Stage, outcome: Result<StageOutput, RelayError>) -> StageRecord {
    let timestamp = Utc::now();
    match outcome {
        Ok(out) => StageRecord {
            timestamp,
            stage,
            success: true,
            provider: out.provider,
            model: out.model,
            fallback: out.fallback,
            tokens: out.tokens,
            files_generated: out.files.len(),
            files: out.files,
            skipped: out.skipped,
            error: None,
        },
        Err(e) => {
            tracing::warn!(%stage, "stage failed: {e}");
            StageRecord {
                timestamp,
                stage,
                success: false,
                provider: None,
                model: None,
                fallback: false,
                tokens: 0,
                files_generated: 0,
                files: vec![],
                skipped: vec![],
                error: Some(e.to_string()),
            }
        }
    }
}

/// Redact and write one artifact, recording its path.
async fn write_file(
    run: &mut BuildRun,
    out: &mut StageOutput,
    rel: &str,
    content: &str,
) -> Result<(), RelayError> {
    run.write_text(rel, &redact(content)).await?;
    out.files.push(rel.to_string());
    Ok(())
}

/// Write a generated file map under `area/`. Unsafe paths are skipped and
/// recorded; a leading `area/` in a generated path is not doubled.
async fn write_generated(
    run: &mut BuildRun,
    out: &mut StageOutput,
    area: &str,
    files: BTreeMap<String, String>,
) -> Result<usize, RelayError> {
    let mut written = 0;
    for (path, content) in files {
        let clean = match run::safe_relative_path(&path) {
            Ok(p) => p,
            Err(_) => {
                tracing::warn!(area, path = %path, "skipping generated file with unsafe path");
                out.skipped.push(path);
                continue;
            }
        };
        let clean = clean.to_string_lossy().replace('\\', "/");
        let rel = match clean.strip_prefix(&format!("{area}/")) {
            Some(inner) => format!("{area}/{inner}"),
            None => format!("{area}/{clean}"),
        };
        write_file(run, out, &rel, &content).await?;
        written += 1;
    }
    Ok(written)
}
