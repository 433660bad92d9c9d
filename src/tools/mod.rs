pub mod build;
pub mod generate;
pub mod providers;
pub mod vision;

use crate::providers::{ProviderId, parse_provider_list};

/// Prompts longer than this are rejected before any provider is called.
pub const MAX_PROMPT_CHARS: usize = 100_000;

/// Validate prompt is non-empty and within bounds.
pub fn validate_prompt(prompt: &str) -> Result<(), String> {
    if prompt.trim().is_empty() {
        return Err("prompt must not be empty".to_string());
    }
    let len = prompt.chars().count();
    if len > MAX_PROMPT_CHARS {
        return Err(format!(
            "prompt is {len} characters; the limit is {MAX_PROMPT_CHARS}"
        ));
    }
    Ok(())
}

/// Parse optional provider names from a tool request.
pub fn parse_preference(names: Option<&[String]>) -> Result<Option<Vec<ProviderId>>, String> {
    let Some(names) = names else {
        return Ok(None);
    };
    parse_provider_list(&names.join(","))
        .map(|list| if list.is_empty() { None } else { Some(list) })
        .map_err(|e| e.user_message())
}
