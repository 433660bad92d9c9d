use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use schemars::JsonSchema;
use serde::Deserialize;
use tokio::io::AsyncReadExt;

/// Images larger than this are rejected before decoding.
pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ClassifyImageRequest {
    /// Base64-encoded image (PNG or JPEG). A `data:image/...;base64,` prefix is accepted.
    pub image_base64: Option<String>,
    /// Absolute path to an image file on the server. Used when image_base64 is absent.
    pub image_path: Option<String>,
}

impl ClassifyImageRequest {
    /// Resolve the request to raw image bytes.
    pub async fn load(&self) -> Result<Vec<u8>, String> {
        let bytes = match (&self.image_base64, &self.image_path) {
            (Some(b64), _) => decode_base64_image(b64)?,
            (None, Some(path)) => read_capped(path).await?,
            (None, None) => return Err("one of image_base64 or image_path is required".into()),
        };
        if bytes.is_empty() {
            return Err("image is empty".into());
        }
        if bytes.len() > MAX_IMAGE_BYTES {
            return Err(format!("image exceeds the limit of {MAX_IMAGE_BYTES} bytes"));
        }
        Ok(bytes)
    }
}

/// Read at most one byte past the limit, so an oversized or endless file
/// (a FIFO, `/dev/zero`) is rejected without being read in full.
async fn read_capped(path: &str) -> Result<Vec<u8>, String> {
    let file = tokio::fs::File::open(path)
        .await
        .map_err(|e| format!("cannot read image {path}: {e}"))?;
    let mut bytes = Vec::new();
    file.take(MAX_IMAGE_BYTES as u64 + 1)
        .read_to_end(&mut bytes)
        .await
        .map_err(|e| format!("cannot read image {path}: {e}"))?;
    Ok(bytes)
}

pub fn decode_base64_image(raw: &str) -> Result<Vec<u8>, String> {
    let payload = match raw.split_once(";base64,") {
        Some((prefix, data)) if prefix.starts_with("data:") => data,
        _ => raw,
    };
    let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD
        .decode(compact)
        .map_err(|e| format!("image_base64 is not valid base64: {e}"))
}
