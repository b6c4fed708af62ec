//! Client for the remote assistant gateway.
//!
//! The gateway is a run-based conversational API: callers append messages to
//! a thread, start a run of a configured assistant over that thread, and poll
//! the run until it reaches a terminal status. Every response is decoded into
//! the typed shapes in [`types`]; anything that does not match surfaces as
//! [`GatewayError::Decode`] instead of leaking partially-read JSON.

use async_trait::async_trait;

pub mod client;
pub mod error;
pub mod reply;
pub mod types;

pub use client::{GatewayConfig, HttpGateway, DEFAULT_BASE_URL, DEFAULT_BETA};
pub use error::GatewayError;
pub use reply::assistant_reply;
pub use types::{
    ContentBlock, CreateMessage, CreateRun, ListMessages, Message, MessageList, Role, Run,
    RunError, RunStatus, SortOrder, TextContent, Thread,
};

/// Operations the relay needs from the gateway.
///
/// Implemented over HTTP by [`HttpGateway`]; tests and local runs plug in an
/// in-memory implementation.
#[async_trait]
pub trait AssistantGateway: Send + Sync {
    async fn create_thread(&self) -> Result<Thread, GatewayError>;

    async fn create_message(
        &self,
        thread_id: &str,
        message: &CreateMessage,
    ) -> Result<Message, GatewayError>;

    async fn create_run(&self, thread_id: &str, run: &CreateRun) -> Result<Run, GatewayError>;

    async fn get_run(&self, thread_id: &str, run_id: &str) -> Result<Run, GatewayError>;

    async fn list_messages(
        &self,
        thread_id: &str,
        query: &ListMessages,
    ) -> Result<MessageList, GatewayError>;
}
