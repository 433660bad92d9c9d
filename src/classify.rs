use serde::{Deserialize, Serialize};

/// Coarse category of a build prompt, recorded in the build report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PromptKind {
    BuildFullstack,
    FrontendOnly,
    BackendOnly,
    CodeSnippet,
    Requirements,
    Predict,
    OtherText,
}

/// Checked in order; the first list with a hit decides.
const RULES: &[(PromptKind, &[&str])] = &[
    (
        PromptKind::BuildFullstack,
        &["fullstack", "frontend and backend", "end-to-end", "full stack"],
    ),
    (
        PromptKind::FrontendOnly,
        &["frontend only", "ui only", "react", "tailwind", "html", "css"],
    ),
    (
        PromptKind::BackendOnly,
        &["backend only", "api only", "fastapi", "flask", "node", "express"],
    ),
    (
        PromptKind::CodeSnippet,
        &["code snippet", "snippet", "example class", "function only", "method only"],
    ),
    (
        PromptKind::Requirements,
        &["requirements", "spec", "acceptance criteria", "design doc"],
    ),
    (
        PromptKind::Predict,
        &["predict", "classify", "inference", "train", "dataset"],
    ),
];

/// Keyword classification, case-insensitive substring match.
pub fn classify_prompt(prompt: &str) -> PromptKind {
    let text = prompt.to_lowercase();
    RULES
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| text.contains(k)))
        .map(|(kind, _)| *kind)
        .unwrap_or(PromptKind::OtherText)
}
