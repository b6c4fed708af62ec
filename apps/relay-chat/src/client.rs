//! HTTP client for the relay's submit/status endpoints.

use async_trait::async_trait;
use relay_protocol::{ProblemDetails, StatusReply, SubmitAccepted, SubmitRequest};
use reqwest::header::ACCEPT;
use url::Url;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("invalid relay base url {0:?}")]
    InvalidBase(String),
    #[error("relay unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("relay returned {status}: {detail}")]
    Api { status: u16, detail: String },
    #[error("unexpected relay response: {0}")]
    Decode(#[source] serde_json::Error),
}

/// The two calls the chat widget makes.
#[async_trait]
pub trait RelayApi: Send + Sync {
    async fn submit(&self, req: &SubmitRequest) -> Result<SubmitAccepted, ClientError>;

    async fn status(&self, thread_id: &str, run_id: &str) -> Result<StatusReply, ClientError>;
}

pub struct RelayClient {
    base: Url,
    http: reqwest::Client,
}

impl RelayClient {
    pub fn new(base: &str, http: reqwest::Client) -> Result<Self, ClientError> {
        let trimmed = base.trim().trim_end_matches('/');
        let base = Url::parse(trimmed).map_err(|_| ClientError::InvalidBase(base.to_string()))?;
        if !matches!(base.scheme(), "http" | "https") || base.cannot_be_a_base() {
            return Err(ClientError::InvalidBase(base.to_string()));
        }
        Ok(Self { base, http })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ClientError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| ClientError::InvalidBase(self.base.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn decode<T: serde::de::DeserializeOwned>(
        res: reqwest::Response,
    ) -> Result<T, ClientError> {
        let status = res.status();
        let bytes = res.bytes().await?;
        if !status.is_success() {
            let detail = serde_json::from_slice::<ProblemDetails>(&bytes)
                .ok()
                .and_then(|p| p.detail.or(p.error).or(Some(p.title)))
                .filter(|d| !d.trim().is_empty())
                .unwrap_or_else(|| {
                    status
                        .canonical_reason()
                        .unwrap_or("request failed")
                        .to_string()
                });
            return Err(ClientError::Api {
                status: status.as_u16(),
                detail,
            });
        }
        serde_json::from_slice(&bytes).map_err(ClientError::Decode)
    }
}

#[async_trait]
impl RelayApi for RelayClient {
    async fn submit(&self, req: &SubmitRequest) -> Result<SubmitAccepted, ClientError> {
        let url = self.endpoint(&["chat"])?;
        let res = self
            .http
            .post(url)
            .header(ACCEPT, "application/json")
            .json(req)
            .send()
            .await?;
        Self::decode(res).await
    }

    async fn status(&self, thread_id: &str, run_id: &str) -> Result<StatusReply, ClientError> {
        let url = self.endpoint(&["chat", "status", thread_id, run_id])?;
        let res = self
            .http
            .get(url)
            .header(ACCEPT, "application/json")
            .send()
            .await?;
        Self::decode(res).await
    }
}
