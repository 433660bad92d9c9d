//! Credential masking for anything written to disk or handed back to callers.

use std::sync::LazyLock;

use regex::Regex;

pub const REDACTED: &str = "${REDACTED_ENV_VAR}";

/// Known provider key shapes. Character classes never include quotes or
/// backslashes, so masking a serialized JSON line keeps it valid JSON.
static SECRET_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"sk-[a-zA-Z0-9\-_]{20,}",
        r"AIza[A-Za-z0-9_\-]{10,}",
        r"hf_[A-Za-z0-9]{10,}",
        r"pplx-[A-Za-z0-9_\-]{10,}",
        r"gsk_[A-Za-z0-9_\-]{10,}",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid secret pattern"))
    .collect()
});

/// Replace every credential-shaped substring with the redaction marker.
pub fn redact(text: &str) -> String {
    let mut out = text.to_string();
    for pat in SECRET_PATTERNS.iter() {
        if pat.is_match(&out) {
            out = pat.replace_all(&out, REDACTED).into_owned();
        }
    }
    out
}
