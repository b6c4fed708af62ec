use serde::Deserialize;

const MAX_DETAIL_CHARS: usize = 240;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("gateway request {endpoint} failed: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("gateway returned {status} for {endpoint}: {message}")]
    Status {
        endpoint: String,
        status: u16,
        message: String,
    },
    #[error("gateway response for {endpoint} did not match the expected shape: {source}")]
    Decode {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid gateway configuration: {0}")]
    Config(String),
}

impl GatewayError {
    /// HTTP status reported by the gateway, when the call got that far.
    pub fn status(&self) -> Option<u16> {
        match self {
            GatewayError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn endpoint(&self) -> Option<&str> {
        match self {
            GatewayError::Transport { endpoint, .. }
            | GatewayError::Status { endpoint, .. }
            | GatewayError::Decode { endpoint, .. } => Some(endpoint.as_str()),
            GatewayError::Config(_) => None,
        }
    }

    /// Stable label used for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::Transport { .. } => "transport",
            GatewayError::Status { .. } => "status",
            GatewayError::Decode { .. } => "decode",
            GatewayError::Config(_) => "config",
        }
    }
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// Best-effort human message for a non-2xx gateway response.
pub(crate) fn extract_error_message(body: &[u8], fallback: &str) -> String {
    if let Ok(envelope) = serde_json::from_slice::<ErrorEnvelope>(body) {
        let message = envelope.error.message.trim();
        if !message.is_empty() {
            return message.to_string();
        }
    }
    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    if text.is_empty() {
        return fallback.to_string();
    }
    let mut out: String = text.chars().take(MAX_DETAIL_CHARS).collect();
    if text.chars().count() > MAX_DETAIL_CHARS {
        out.push('…');
    }
    out
}
