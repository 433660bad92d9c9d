use std::time::{Duration, Instant};

use reqwest::Client;

use crate::error::RelayError;

pub const MAX_RESPONSE_BYTES: usize = 4 * 1024 * 1024; // 4MB

/// Request body of an outbound provider call.
#[derive(Debug, Clone)]
pub enum HttpBody {
    Json(serde_json::Value),
    Bytes {
        content_type: &'static str,
        data: Vec<u8>,
    },
}

/// One fully-described outbound call, built by an adapter.
#[derive(Clone)]
pub struct HttpCall {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: HttpBody,
    pub timeout: Duration,
}

impl std::fmt::Debug for HttpCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // header values carry credentials
        let names: Vec<&str> = self.headers.iter().map(|(k, _)| k.as_str()).collect();
        f.debug_struct("HttpCall")
            .field("url", &self.url)
            .field("headers", &names)
            .field("timeout", &self.timeout)
            .finish()
    }
}

pub struct HttpDispatch {
    client: Client,
}

impl Default for HttpDispatch {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpDispatch {
    pub fn new() -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(4)
            .build()
            .expect("failed to build HTTP client");

        Self { client }
    }

    /// Issue one POST and return the raw 2xx body.
    pub async fn send(&self, provider: &str, call: &HttpCall) -> Result<Vec<u8>, RelayError> {
        let start = Instant::now();

        let mut builder = self.client.post(&call.url).timeout(call.timeout);
        for (name, value) in &call.headers {
            builder = builder.header(name, value);
        }
        builder = match &call.body {
            HttpBody::Json(v) => builder.json(v),
            HttpBody::Bytes { content_type, data } => builder
                .header("Content-Type", *content_type)
                .body(data.clone()),
        };

        let response = builder.send().await.map_err(|e| map_send_error(e, start))?;
        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(RelayError::RateLimited {
                provider: provider.to_string(),
            });
        }

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(RelayError::AuthFailed {
                provider: provider.to_string(),
                message: format!("{status}"),
            });
        }

        if !status.is_success() {
            let error_bytes = response.bytes().await.unwrap_or_default();
            let truncated = &error_bytes[..error_bytes.len().min(1024)];
            let text = String::from_utf8_lossy(truncated);
            return Err(RelayError::Upstream {
                provider: provider.to_string(),
                message: format!("{status}: {text}"),
                status: Some(status.as_u16()),
            });
        }

        if let Some(len) = response.content_length()
            && len as usize > MAX_RESPONSE_BYTES
        {
            return Err(RelayError::Upstream {
                provider: provider.to_string(),
                message: format!("response too large: {len} bytes (max {MAX_RESPONSE_BYTES})"),
                status: None,
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| RelayError::Upstream {
                provider: provider.to_string(),
                message: format!("failed to read response body: {e}"),
                status: None,
            })?;

        if bytes.len() > MAX_RESPONSE_BYTES {
            return Err(RelayError::Upstream {
                provider: provider.to_string(),
                message: format!(
                    "response too large: {} bytes (max {MAX_RESPONSE_BYTES})",
                    bytes.len()
                ),
                status: None,
            });
        }

        tracing::debug!(
            provider,
            latency_ms = start.elapsed().as_millis() as u64,
            bytes = bytes.len(),
            "provider call completed"
        );

        Ok(bytes.to_vec())
    }

    /// Liveness probe: GET `url` and report whether it answered 2xx in time.
    /// Never errors; any failure reads as "not alive".
    pub async fn probe(&self, url: &str, timeout: Duration) -> bool {
        match self.client.get(url).timeout(timeout).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                tracing::debug!(url, "probe failed: {e}");
                false
            }
        }
    }
}

fn map_send_error(e: reqwest::Error, start: Instant) -> RelayError {
    if e.is_timeout() {
        RelayError::Timeout(start.elapsed().as_millis() as u64)
    } else {
        RelayError::Request(e)
    }
}
