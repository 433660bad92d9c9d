use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::diagnostics::CommandOutcome;
use crate::classify::PromptKind;

pub const REPORT_FILE: &str = "run_report.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Requirements,
    Backend,
    Frontend,
    TestsDeploy,
    Documentation,
}

impl Stage {
    /// Pipeline order.
    pub const ALL: [Stage; 5] = [
        Stage::Requirements,
        Stage::Backend,
        Stage::Frontend,
        Stage::TestsDeploy,
        Stage::Documentation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Requirements => "requirements",
            Self::Backend => "backend",
            Self::Frontend => "frontend",
            Self::TestsDeploy => "tests_deploy",
            Self::Documentation => "documentation",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageRecord {
    pub timestamp: DateTime<Utc>,
    pub stage: Stage,
    pub success: bool,
    /// Provider of the last real generation in the stage, if any.
    pub provider: Option<String>,
    pub model: Option<String>,
    /// True when any generation in the stage came from the offline baseline
    /// or a static template.
    pub fallback: bool,
    pub tokens: u64,
    pub files_generated: usize,
    pub files: Vec<String>,
    /// Generated paths refused by path validation.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildReport {
    pub summary: String,
    pub run_id: String,
    pub run_dir: String,
    pub prompt: String,
    pub kind: PromptKind,
    pub stages: Vec<StageRecord>,
    pub commands: BTreeMap<String, Vec<String>>,
    pub tokens_total: u64,
    /// Relative path -> hex SHA-256.
    pub artifacts: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<Vec<CommandOutcome>>,
}

impl BuildReport {
    pub fn stage(&self, stage: Stage) -> Option<&StageRecord> {
        self.stages.iter().find(|s| s.stage == stage)
    }

    pub fn succeeded(&self) -> usize {
        self.stages.iter().filter(|s| s.success).count()
    }
}

pub fn summary_line(stages: &[StageRecord]) -> String {
    let ok = stages.iter().filter(|s| s.success).count();
    format!(
        "Full SDLC build completed: {ok}/{} stages succeeded",
        stages.len()
    )
}

/// Shell commands for running each part of a generated project.
pub fn run_commands(run_dir: &Path) -> BTreeMap<String, Vec<String>> {
    let root = run_dir.display().to_string();
    let frontend = run_dir.join("frontend").display().to_string();
    let venv_install = if cfg!(windows) {
        "python -m venv .venv && .venv\\Scripts\\pip install -r backend/requirements.txt"
    } else {
        "python -m venv .venv && .venv/bin/pip install -r backend/requirements.txt"
    };

    let cd = |dir: &str| format!("cd {dir}");
    BTreeMap::from([
        (
            "backend".to_string(),
            vec![
                cd(&root),
                venv_install.to_string(),
                "uvicorn backend.main:app --host 0.0.0.0 --port 8000".to_string(),
            ],
        ),
        (
            "frontend".to_string(),
            vec![cd(&frontend), "npm install".to_string(), "npm run dev".to_string()],
        ),
        ("tests".to_string(), vec![cd(&root), "pytest -q".to_string()]),
        (
            "docs".to_string(),
            vec![cd(&root), "pip install mkdocs && mkdocs serve".to_string()],
        ),
        (
            "deploy".to_string(),
            vec![cd(&root), "docker compose up --build".to_string()],
        ),
    ])
}
