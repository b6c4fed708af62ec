use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{extract_error_message, GatewayError};
use crate::types::{CreateMessage, CreateRun, ListMessages, Message, MessageList, Run, Thread};
use crate::AssistantGateway;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_BETA: &str = "assistants=v2";
const BETA_HEADER: &str = "OpenAI-Beta";

#[derive(Clone)]
pub struct GatewayConfig {
    pub base_url: String,
    pub api_key: String,
    pub beta: String,
}

impl GatewayConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            beta: DEFAULT_BETA.to_string(),
        }
    }
}

impl fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("beta", &self.beta)
            .finish()
    }
}

/// [`AssistantGateway`] over HTTP with bearer auth and the beta-feature header.
#[derive(Clone)]
pub struct HttpGateway {
    client: reqwest::Client,
    config: Arc<GatewayConfig>,
}

impl HttpGateway {
    pub fn new(config: GatewayConfig, client: reqwest::Client) -> Result<Self, GatewayError> {
        if config.api_key.trim().is_empty() {
            return Err(GatewayError::Config("api key is empty".into()));
        }
        let parsed = url::Url::parse(&config.base_url)
            .map_err(|err| GatewayError::Config(format!("base url {}: {err}", config.base_url)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(GatewayError::Config(format!(
                "base url {} must use http or https",
                config.base_url
            )));
        }
        Ok(Self {
            client,
            config: Arc::new(config),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), path);
        self.client
            .request(method, url)
            .bearer_auth(self.config.api_key.trim())
            .header(BETA_HEADER, self.config.beta.as_str())
            .header(ACCEPT, "application/json")
    }

    async fn send<T: DeserializeOwned>(
        &self,
        endpoint: String,
        req: RequestBuilder,
    ) -> Result<T, GatewayError> {
        let started = Instant::now();
        let resp = match req.send().await {
            Ok(resp) => resp,
            Err(source) => return Err(GatewayError::Transport { endpoint, source }),
        };
        let status = resp.status();
        let body = match resp.bytes().await {
            Ok(body) => body,
            Err(source) => return Err(GatewayError::Transport { endpoint, source }),
        };
        debug!(
            target: "relay::gateway",
            endpoint = %endpoint,
            status = status.as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "gateway call"
        );
        if !status.is_success() {
            let reason = status.canonical_reason().unwrap_or("request failed");
            return Err(GatewayError::Status {
                message: extract_error_message(&body, reason),
                status: status.as_u16(),
                endpoint,
            });
        }
        serde_json::from_slice(&body).map_err(|source| GatewayError::Decode { endpoint, source })
    }

    async fn get<T: DeserializeOwned>(&self, path: String) -> Result<T, GatewayError> {
        let req = self.request(Method::GET, &path);
        self.send(format!("GET {path}"), req).await
    }

    async fn post<B, T>(&self, path: String, body: &B) -> Result<T, GatewayError>
    where
        B: serde::Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let req = self
            .request(Method::POST, &path)
            .header(CONTENT_TYPE, "application/json")
            .json(body);
        self.send(format!("POST {path}"), req).await
    }
}

#[async_trait]
impl AssistantGateway for HttpGateway {
    async fn create_thread(&self) -> Result<Thread, GatewayError> {
        self.post("/threads".to_string(), &serde_json::json!({})).await
    }

    async fn create_message(
        &self,
        thread_id: &str,
        message: &CreateMessage,
    ) -> Result<Message, GatewayError> {
        self.post(format!("/threads/{thread_id}/messages"), message)
            .await
    }

    async fn create_run(&self, thread_id: &str, run: &CreateRun) -> Result<Run, GatewayError> {
        self.post(format!("/threads/{thread_id}/runs"), run).await
    }

    async fn get_run(&self, thread_id: &str, run_id: &str) -> Result<Run, GatewayError> {
        self.get(format!("/threads/{thread_id}/runs/{run_id}"))
            .await
    }

    async fn list_messages(
        &self,
        thread_id: &str,
        query: &ListMessages,
    ) -> Result<MessageList, GatewayError> {
        let path = format!("/threads/{thread_id}/messages");
        let req = self.request(Method::GET, &path).query(query);
        self.send(format!("GET {path}"), req).await
    }
}
