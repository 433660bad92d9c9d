use std::sync::Arc;
use std::time::Instant;

use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{CallToolResult, Implementation, ServerCapabilities, ServerInfo};
use rmcp::{ErrorData as McpError, ServerHandler, tool, tool_handler, tool_router};

use crate::audit::{LogRecord, LogStore};
use crate::build::BuildOrchestrator;
use crate::config::Config;
use crate::jobs::JobRegistry;
use crate::providers::registry::ProviderRegistry;
use crate::response::{ToolMetadata, ToolResponse};
use crate::router::{GenerationRequest, GenerationResult, InferenceRouter};
use crate::tools::build::{BuildRequest, BuildStatusRequest, LogsRequest};
use crate::tools::generate::{GenerateCodeRequest, GenerateRequest};
use crate::tools::providers::ProvidersResponse;
use crate::tools::vision::ClassifyImageRequest;
use crate::tools::{parse_preference, validate_prompt};

#[derive(Clone)]
pub struct RelayServer {
    router: Arc<InferenceRouter>,
    orchestrator: Arc<BuildOrchestrator>,
    jobs: Arc<JobRegistry>,
    logs: Arc<LogStore>,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl RelayServer {
    pub fn new(config: &Config, registry: Arc<ProviderRegistry>) -> Self {
        let router = Arc::new(InferenceRouter::new(config, registry));
        let logs = Arc::new(LogStore::open(&config.audit));
        let orchestrator = Arc::new(BuildOrchestrator::new(
            router.clone(),
            logs.clone(),
            &config.build,
        ));
        let jobs = Arc::new(JobRegistry::new(orchestrator.clone()));
        Self {
            router,
            orchestrator,
            jobs,
            logs,
            tool_router: Self::tool_router(),
        }
    }

    #[tool(
        name = "generate",
        description = "Generate text with the first available LLM provider, falling back through the others. Check metadata.fallback: true means no provider answered and the content is a placeholder.",
        annotations(read_only_hint = true)
    )]
    async fn generate(
        &self,
        Parameters(req): Parameters<GenerateRequest>,
    ) -> Result<CallToolResult, McpError> {
        validate_prompt(&req.prompt).map_err(|msg| McpError::invalid_params(msg, None))?;
        let preference = parse_preference(req.preference.as_deref())
            .map_err(|msg| McpError::invalid_params(msg, None))?;

        let start = Instant::now();
        let request = GenerationRequest {
            preference,
            ..GenerationRequest::text(req.prompt)
        };
        let result = self.router.route(&request).await;
        self.logs.record(&result.log_record("task")).await;
        let metadata = generation_metadata("generate", &result, start);
        Ok(ToolResponse::success(result.text, metadata).into_call_tool_result())
    }

    #[tool(
        name = "generate_code",
        description = "Generate a set of source files. Content is a JSON object mapping relative paths to file contents (empty object when nothing usable came back).",
        annotations(read_only_hint = true)
    )]
    async fn generate_code(
        &self,
        Parameters(req): Parameters<GenerateCodeRequest>,
    ) -> Result<CallToolResult, McpError> {
        validate_prompt(&req.prompt).map_err(|msg| McpError::invalid_params(msg, None))?;
        let preference = parse_preference(req.preference.as_deref())
            .map_err(|msg| McpError::invalid_params(msg, None))?;

        let start = Instant::now();
        let result = self.router.route_code(&req.prompt, preference).await;
        self.logs.record(&result.log_record("code")).await;
        let metadata = generation_metadata("generate_code", &result, start);
        let files = result.files.unwrap_or_default();
        let response = match serde_json::to_string_pretty(&files) {
            Ok(json) => ToolResponse::json(json, metadata),
            Err(e) => ToolResponse::error(format!("failed to encode files: {e}"), metadata),
        };
        Ok(response.into_call_tool_result())
    }

    #[tool(
        name = "classify_image",
        description = "Label an image with the configured vision provider. Without one, a brightness heuristic answers with metadata.fallback = true; that label carries no meaning.",
        annotations(read_only_hint = true)
    )]
    async fn classify_image(
        &self,
        Parameters(req): Parameters<ClassifyImageRequest>,
    ) -> Result<CallToolResult, McpError> {
        let bytes = req
            .load()
            .await
            .map_err(|msg| McpError::invalid_params(msg, None))?;

        let start = Instant::now();
        let response = match self.router.route_vision(&bytes).await {
            Ok(label) => {
                self.logs.record(&label.log_record()).await;
                let metadata = ToolMetadata {
                    tool_name: "classify_image".to_string(),
                    provider_used: label.provider.to_string(),
                    model_used: label.model.clone(),
                    fallback: label.fallback,
                    duration_seconds: start.elapsed().as_secs_f64(),
                    ..ToolMetadata::default()
                };
                match serde_json::to_string(&label) {
                    Ok(json) => ToolResponse::json(json, metadata),
                    Err(e) => ToolResponse::error(format!("failed to encode label: {e}"), metadata),
                }
            }
            Err(e) => {
                let mut record = LogRecord::new(uuid::Uuid::new_v4().to_string(), "predict", false);
                record.message = Some(e.user_message());
                self.logs.record(&record).await;
                ToolResponse::error(
                    e.user_message(),
                    ToolMetadata::local("classify_image", start.elapsed().as_secs_f64()),
                )
            }
        };
        Ok(response.into_call_tool_result())
    }

    #[tool(
        name = "providers",
        description = "List LLM providers, whether each is currently available, and the routing orders.",
        annotations(read_only_hint = true)
    )]
    async fn providers(&self) -> Result<CallToolResult, McpError> {
        let list = ProvidersResponse::new(&self.router.availability(), self.router.routing());
        Ok(
            ToolResponse::success(list.to_markdown(), ToolMetadata::local("providers", 0.0))
                .into_call_tool_result(),
        )
    }

    #[tool(
        name = "refresh_providers",
        description = "Re-detect provider availability (credentials and local endpoint) and return the new list."
    )]
    async fn refresh_providers(&self) -> Result<CallToolResult, McpError> {
        let start = Instant::now();
        let availability = self.router.refresh_providers().await;
        let list = ProvidersResponse::new(&availability, self.router.routing());
        Ok(ToolResponse::success(
            list.to_markdown(),
            ToolMetadata::local("refresh_providers", start.elapsed().as_secs_f64()),
        )
        .into_call_tool_result())
    }

    #[tool(
        name = "build",
        description = "Scaffold a full project (requirements, backend, frontend, tests and deployment, docs) into a new run directory. Returns the build report, or a job id with background=true."
    )]
    async fn build(
        &self,
        Parameters(req): Parameters<BuildRequest>,
    ) -> Result<CallToolResult, McpError> {
        validate_prompt(&req.prompt).map_err(|msg| McpError::invalid_params(msg, None))?;
        let start = Instant::now();

        if req.background.unwrap_or(false) {
            let job_id = self.jobs.submit(req.prompt);
            let body = serde_json::json!({ "job_id": job_id, "status": "running" });
            return Ok(ToolResponse::json(
                body.to_string(),
                ToolMetadata::local("build", start.elapsed().as_secs_f64()),
            )
            .into_call_tool_result());
        }

        let response = match self.orchestrator.run_build(&req.prompt).await {
            Ok(report) => {
                let metadata = ToolMetadata {
                    tool_name: "build".to_string(),
                    provider_used: "multiple".to_string(),
                    model_used: "multiple".to_string(),
                    fallback: report.stages.iter().any(|s| s.fallback),
                    tokens: Some(report.tokens_total),
                    duration_seconds: start.elapsed().as_secs_f64(),
                    ..ToolMetadata::default()
                };
                match serde_json::to_string_pretty(&report) {
                    Ok(json) => ToolResponse::json(json, metadata),
                    Err(e) => ToolResponse::error(format!("failed to encode report: {e}"), metadata),
                }
            }
            Err(e) => {
                tracing::warn!("build failed: {e}");
                ToolResponse::error(
                    e.user_message(),
                    ToolMetadata::local("build", start.elapsed().as_secs_f64()),
                )
            }
        };
        Ok(response.into_call_tool_result())
    }

    #[tool(
        name = "build_status",
        description = "Status of a background build by job id, or every job when job_id is omitted.",
        annotations(read_only_hint = true)
    )]
    async fn build_status(
        &self,
        Parameters(req): Parameters<BuildStatusRequest>,
    ) -> Result<CallToolResult, McpError> {
        let metadata = ToolMetadata::local("build_status", 0.0);
        let body = match req.job_id.as_deref() {
            Some(id) => match self.jobs.status(id) {
                Some(job) => serde_json::to_string_pretty(&job),
                None => {
                    return Ok(ToolResponse::error(format!("unknown job id: {id}"), metadata)
                        .into_call_tool_result());
                }
            },
            None => serde_json::to_string_pretty(&self.jobs.list()),
        };
        let response = match body {
            Ok(json) => ToolResponse::json(json, metadata),
            Err(e) => ToolResponse::error(format!("failed to encode job: {e}"), metadata),
        };
        Ok(response.into_call_tool_result())
    }

    #[tool(
        name = "logs",
        description = "Most recent log records (build stages, generation and vision calls), newest first.",
        annotations(read_only_hint = true)
    )]
    async fn logs(
        &self,
        Parameters(req): Parameters<LogsRequest>,
    ) -> Result<CallToolResult, McpError> {
        let metadata = ToolMetadata::local("logs", 0.0);
        let response = match self.logs.latest(req.limit_or_default()).await {
            Ok(records) => match serde_json::to_string_pretty(&records) {
                Ok(json) => ToolResponse::json(json, metadata),
                Err(e) => ToolResponse::error(format!("failed to encode logs: {e}"), metadata),
            },
            Err(e) => {
                tracing::warn!("reading logs failed: {e}");
                ToolResponse::error(e.user_message(), metadata)
            }
        };
        Ok(response.into_call_tool_result())
    }
}

fn generation_metadata(tool: &str, result: &GenerationResult, start: Instant) -> ToolMetadata {
    ToolMetadata {
        tool_name: tool.to_string(),
        provider_used: result.provider.to_string(),
        model_used: result.model.clone(),
        fallback: result.fallback,
        tokens: Some(result.tokens),
        tokens_estimated: result.tokens_estimated,
        duration_seconds: start.elapsed().as_secs_f64(),
    }
}

#[tool_handler]
impl ServerHandler for RelayServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "sdlc-relay".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                ..Default::default()
            },
            instructions: Some(
                "sdlc-relay: multi-provider LLM routing and project scaffolding.\n\n\
                 1. Call `providers` to see which LLM providers are configured.\n\
                 2. `generate` / `generate_code` route one prompt; pass `preference` to pick providers.\n\
                 3. `build` scaffolds a whole project; use background=true and poll `build_status` for long runs.\n\
                 4. `logs` shows recent build stages and generation calls.\n\n\
                 Always check metadata.fallback: true means no provider answered and the output is a placeholder."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::providers::availability_of;

    fn offline_server(logs_dir: &std::path::Path) -> RelayServer {
        let mut config = Config::default();
        config.audit.logs_dir = logs_dir.to_path_buf();
        config.build.runs_dir = logs_dir.join("runs");
        let registry = ProviderRegistry::with_snapshot(
            config.clone(),
            Arc::new(HashMap::<String, String>::new()),
            availability_of(&[]),
        );
        RelayServer::new(&config, Arc::new(registry))
    }

    /// `content` of the tool envelope carried in the first text block.
    fn envelope(result: &CallToolResult) -> serde_json::Value {
        let raw = serde_json::to_value(result).unwrap();
        let text = raw["content"][0]["text"].as_str().unwrap();
        serde_json::from_str(text).unwrap()
    }

    fn tiny_png() -> String {
        let img = image::RgbImage::from_pixel(4, 4, image::Rgb([20, 20, 20]));
        let mut buf = std::io::Cursor::new(Vec::new());
        img.write_to(&mut buf, image::ImageFormat::Png).unwrap();
        base64::Engine::encode(&base64::engine::general_purpose::STANDARD, buf.into_inner())
    }

    #[tokio::test]
    async fn generation_and_vision_calls_show_up_in_logs() {
        let tmp = tempfile::tempdir().unwrap();
        let server = offline_server(tmp.path());

        server
            .generate(Parameters(GenerateRequest {
                prompt: "hello".into(),
                preference: None,
            }))
            .await
            .unwrap();
        server
            .generate_code(Parameters(GenerateCodeRequest {
                prompt: "hello api".into(),
                preference: None,
            }))
            .await
            .unwrap();
        server
            .classify_image(Parameters(ClassifyImageRequest {
                image_base64: Some(tiny_png()),
                image_path: None,
            }))
            .await
            .unwrap();

        let result = server
            .logs(Parameters(LogsRequest { limit: Some(10) }))
            .await
            .unwrap();
        let body = envelope(&result);
        assert_eq!(body["status"], "success");
        let records: Vec<serde_json::Value> =
            serde_json::from_str(body["content"].as_str().unwrap()).unwrap();

        let stages: Vec<&str> = records.iter().map(|r| r["stage"].as_str().unwrap()).collect();
        assert_eq!(stages, vec!["predict", "code", "task"]);

        let predict = &records[0];
        assert_eq!(predict["provider"], "local");
        assert_eq!(predict["metadata"]["label"], "cow");
        assert_eq!(predict["metadata"]["fallback"], true);

        let code = &records[1];
        assert_eq!(code["metadata"]["files"], 0);

        let task = &records[2];
        assert_eq!(task["provider"], "local");
        assert_eq!(task["model"], "baseline");
        assert_eq!(task["success"], true);
        assert_eq!(task["metadata"]["tokens"], 0);
        assert!(!tmp.path().join(crate::audit::ERROR_LOG).exists());
    }

    #[tokio::test]
    async fn undecodable_image_is_logged_as_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let server = offline_server(tmp.path());

        server
            .classify_image(Parameters(ClassifyImageRequest {
                image_base64: Some("aGVsbG8=".into()),
                image_path: None,
            }))
            .await
            .unwrap();

        let records = server.logs.latest(5).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].stage, "predict");
        assert!(!records[0].success);
        assert!(tmp.path().join(crate::audit::ERROR_LOG).is_file());
    }
}
