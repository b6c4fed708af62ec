use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// RFC7807-style error payload used at service edges.
///
/// `error` mirrors `detail` for browser clients that only look for a flat
/// error string.
#[derive(Debug, Serialize, Deserialize, Clone, JsonSchema, ToSchema)]
pub struct ProblemDetails {
    pub r#type: String,
    pub title: String,
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProblemDetails {
    pub fn new(status: u16, title: impl Into<String>) -> Self {
        Self {
            r#type: "about:blank".into(),
            title: title.into(),
            status,
            detail: None,
            trace_id: None,
            code: None,
            error: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        let detail = detail.into();
        self.error = Some(detail.clone());
        self.detail = Some(detail);
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }
}

/// Status of a chat turn as reported by the relay.
///
/// Mirrors the gateway's run lifecycle, plus `no_response` for runs that
/// completed without producing an assistant text reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ChatStatus {
    Queued,
    InProgress,
    RequiresAction,
    Cancelling,
    Completed,
    NoResponse,
    Failed,
    Cancelled,
    Expired,
    Incomplete,
}

impl ChatStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ChatStatus::Queued => "queued",
            ChatStatus::InProgress => "in_progress",
            ChatStatus::RequiresAction => "requires_action",
            ChatStatus::Cancelling => "cancelling",
            ChatStatus::Completed => "completed",
            ChatStatus::NoResponse => "no_response",
            ChatStatus::Failed => "failed",
            ChatStatus::Cancelled => "cancelled",
            ChatStatus::Expired => "expired",
            ChatStatus::Incomplete => "incomplete",
        }
    }

    /// True once no further status change will be observed for the run.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ChatStatus::Completed
                | ChatStatus::NoResponse
                | ChatStatus::Failed
                | ChatStatus::Cancelled
                | ChatStatus::Expired
                | ChatStatus::Incomplete
        )
    }

    /// Terminal states that did not produce an answer because the run broke.
    pub fn is_failure(self) -> bool {
        matches!(
            self,
            ChatStatus::Failed | ChatStatus::Cancelled | ChatStatus::Expired | ChatStatus::Incomplete
        )
    }
}

impl fmt::Display for ChatStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body of `POST /chat`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    #[serde(default)]
    pub prompt: String,
    #[serde(default, alias = "thread_id", skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
}

/// Client polling policy advertised by the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PollHint {
    pub interval_ms: u64,
    pub max_attempts: u32,
}

/// `202 Accepted` response of `POST /chat`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubmitAccepted {
    pub thread_id: String,
    pub run_id: String,
    pub status: ChatStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll: Option<PollHint>,
}

/// Failure detail attached to failed/cancelled/expired runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema, ToSchema)]
pub struct RunFailure {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub message: String,
}

/// Response of `GET /chat/status/...`.
///
/// `message` is always present in the JSON body and is `null` until the
/// assistant reply is available.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatusReply {
    pub thread_id: String,
    pub run_id: String,
    pub status: ChatStatus,
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RunFailure>,
}

/// Raw run view served by the diagnostics endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, ToSchema)]
pub struct RunDiagnostic {
    pub id: String,
    pub status: String,
    pub created_at: i64,
    pub completed_at: Option<i64>,
    pub thread_id: String,
    pub assistant_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<RunFailure>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn submit_request_accepts_both_thread_spellings() {
        let camel: SubmitRequest =
            serde_json::from_value(json!({"prompt": "hi", "threadId": "t1"})).unwrap();
        let snake: SubmitRequest =
            serde_json::from_value(json!({"prompt": "hi", "thread_id": "t1"})).unwrap();
        assert_eq!(camel.thread_id.as_deref(), Some("t1"));
        assert_eq!(snake.thread_id.as_deref(), Some("t1"));
        let bare: SubmitRequest = serde_json::from_value(json!({"prompt": "hi"})).unwrap();
        assert!(bare.thread_id.is_none());
    }

    #[test]
    fn status_reply_keeps_null_message() {
        let reply = StatusReply {
            thread_id: "t1".into(),
            run_id: "r1".into(),
            status: ChatStatus::InProgress,
            message: None,
            error: None,
        };
        let value = serde_json::to_value(&reply).unwrap();
        assert_eq!(
            value,
            json!({"threadId": "t1", "runId": "r1", "status": "in_progress", "message": null})
        );
    }

    #[test]
    fn terminal_and_failure_sets_line_up() {
        for status in [
            ChatStatus::Queued,
            ChatStatus::InProgress,
            ChatStatus::RequiresAction,
            ChatStatus::Cancelling,
        ] {
            assert!(!status.is_terminal(), "{status} should be pending");
            assert!(!status.is_failure());
        }
        assert!(ChatStatus::Completed.is_terminal());
        assert!(!ChatStatus::Completed.is_failure());
        assert!(ChatStatus::NoResponse.is_terminal());
        assert!(!ChatStatus::NoResponse.is_failure());
        for status in [
            ChatStatus::Failed,
            ChatStatus::Cancelled,
            ChatStatus::Expired,
            ChatStatus::Incomplete,
        ] {
            assert!(status.is_terminal());
            assert!(status.is_failure());
        }
    }

    #[test]
    fn problem_details_mirrors_detail_into_error() {
        let problem = ProblemDetails::new(400, "Invalid Prompt").with_detail("prompt is required");
        let value = serde_json::to_value(&problem).unwrap();
        assert_eq!(value["detail"], "prompt is required");
        assert_eq!(value["error"], "prompt is required");
        assert_eq!(value["type"], "about:blank");
        assert!(value.get("code").is_none());
    }
}
