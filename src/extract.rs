use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

const FENCE: &str = "```";

/// Info string after an opening fence, up to and including the newline.
static FENCE_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[ \t]*(?:json|JSON)?[ \t]*\r?\n?").expect("valid regex")
});

/// Pull a `path -> content` file map out of a model reply.
///
/// Tries the whole text as a JSON object first, then fenced blocks. For each
/// opening fence the closing fences are tried from the last one backwards, so
/// fences inside JSON string values (a README with a shell snippet) do not cut
/// the object short. Returns an empty map when nothing yields an object;
/// callers treat that as "no files produced".
pub fn extract_files(raw: &str) -> BTreeMap<String, String> {
    if let Some(files) = parse_object(raw) {
        return files;
    }

    let fences: Vec<usize> = raw.match_indices(FENCE).map(|(i, _)| i).collect();
    for (n, &open) in fences.iter().enumerate() {
        let after = open + FENCE.len();
        let start = after + FENCE_TAG.find(&raw[after..]).map_or(0, |m| m.end());
        for &close in fences[n + 1..].iter().rev() {
            if close < start {
                break;
            }
            if let Some(files) = parse_object(&raw[start..close]) {
                return files;
            }
        }
    }
    BTreeMap::new()
}

fn parse_object(text: &str) -> Option<BTreeMap<String, String>> {
    match serde_json::from_str::<Value>(text.trim()) {
        Ok(Value::Object(map)) => Some(
            map.into_iter()
                .map(|(path, value)| (path, coerce_to_string(value)))
                .collect(),
        ),
        _ => None,
    }
}

/// Strings pass through; structured values (e.g. a `package.json` given as
/// an object) are pretty-printed.
fn coerce_to_string(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        v @ (Value::Array(_) | Value::Object(_)) => {
            serde_json::to_string_pretty(&v).unwrap_or_default()
        }
    }
}
