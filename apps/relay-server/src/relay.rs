//! Submit/status translation between callers and the assistant gateway.
//!
//! The relay never waits on a run: `submit` returns as soon as the run is
//! created and `status` performs exactly one status read (plus one message
//! listing once the run has completed). Polling is the caller's job.

use std::sync::Arc;

use relay_gateway::{
    assistant_reply, AssistantGateway, CreateMessage, CreateRun, GatewayError, ListMessages,
    RunError, RunStatus,
};
use relay_protocol::{
    ChatStatus, PollHint, RunDiagnostic, RunFailure, StatusReply, SubmitAccepted, SubmitRequest,
};
use tracing::info;

const MAX_ID_LEN: usize = 128;

/// Per-deployment settings the relay needs on every call.
#[derive(Debug, Clone)]
pub(crate) struct RelaySettings {
    pub assistant_id: String,
    pub thread_id: Option<String>,
    pub instructions: Option<String>,
    pub poll: PollHint,
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum RelayError {
    #[error("prompt is required")]
    EmptyPrompt,
    #[error("invalid {field}: {reason}")]
    InvalidId {
        field: &'static str,
        reason: &'static str,
    },
    #[error("no thread id supplied and no thread is configured")]
    MissingThread,
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

impl RelayError {
    /// Short machine-readable label, surfaced as the problem `code`.
    pub fn code(&self) -> &'static str {
        match self {
            RelayError::EmptyPrompt => "empty_prompt",
            RelayError::InvalidId { .. } => "invalid_id",
            RelayError::MissingThread => "missing_thread",
            RelayError::Gateway(_) => "gateway_error",
        }
    }

    pub fn is_validation(&self) -> bool {
        !matches!(self, RelayError::Gateway(_))
    }
}

pub(crate) struct Relay {
    gateway: Arc<dyn AssistantGateway>,
    settings: RelaySettings,
}

impl Relay {
    pub fn new(gateway: Arc<dyn AssistantGateway>, settings: RelaySettings) -> Self {
        Self { gateway, settings }
    }

    pub fn settings(&self) -> &RelaySettings {
        &self.settings
    }

    /// Append `prompt` to a thread and start a run; does not wait for it.
    pub async fn submit(&self, req: SubmitRequest) -> Result<SubmitAccepted, RelayError> {
        if req.prompt.trim().is_empty() {
            return Err(RelayError::EmptyPrompt);
        }
        let explicit = match req.thread_id.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => Some(validate_id("threadId", raw)?),
            _ => None,
        };
        let thread_id = match explicit.or_else(|| self.settings.thread_id.clone()) {
            Some(id) => id,
            None => {
                let thread = self.gateway.create_thread().await?;
                info!(target: "relay::chat", thread_id = %thread.id, "created thread");
                thread.id
            }
        };

        self.gateway
            .create_message(&thread_id, &CreateMessage::user(req.prompt))
            .await?;
        let run = self
            .gateway
            .create_run(
                &thread_id,
                &CreateRun {
                    assistant_id: self.settings.assistant_id.clone(),
                    instructions: self.settings.instructions.clone(),
                },
            )
            .await?;
        info!(
            target: "relay::chat",
            thread_id = %thread_id,
            run_id = %run.id,
            status = %run.status,
            "run started"
        );
        Ok(SubmitAccepted {
            thread_id,
            run_id: run.id,
            status: chat_status(run.status),
            poll: Some(self.settings.poll),
        })
    }

    /// One non-blocking look at a run, with the reply text once completed.
    pub async fn status(
        &self,
        thread_id: Option<&str>,
        run_id: &str,
    ) -> Result<StatusReply, RelayError> {
        let run_id = validate_id("runId", run_id)?;
        let thread_id = self.resolve_thread(thread_id)?;
        let run = self.gateway.get_run(&thread_id, &run_id).await?;

        let mut reply = StatusReply {
            thread_id,
            run_id,
            status: chat_status(run.status),
            message: None,
            error: None,
        };
        match run.status {
            RunStatus::Completed => {
                let list = self
                    .gateway
                    .list_messages(&reply.thread_id, &ListMessages::for_run(&reply.run_id))
                    .await?;
                match assistant_reply(&list.data, &reply.run_id) {
                    Some(text) => reply.message = Some(text.to_string()),
                    None => reply.status = ChatStatus::NoResponse,
                }
            }
            ended if ended.is_terminal() => {
                reply.error = Some(run_failure(ended, run.last_error));
            }
            _ => {}
        }
        Ok(reply)
    }

    /// Raw run object for troubleshooting.
    pub async fn diagnose(
        &self,
        thread_id: Option<&str>,
        run_id: &str,
    ) -> Result<RunDiagnostic, RelayError> {
        let run_id = validate_id("runId", run_id)?;
        let thread_id = self.resolve_thread(thread_id)?;
        let run = self.gateway.get_run(&thread_id, &run_id).await?;
        Ok(RunDiagnostic {
            id: run.id,
            status: run.status.as_str().to_string(),
            created_at: run.created_at,
            completed_at: run.completed_at,
            thread_id: run.thread_id,
            assistant_id: run.assistant_id,
            started_at: run.started_at,
            failed_at: run.failed_at,
            cancelled_at: run.cancelled_at,
            expires_at: run.expires_at,
            last_error: run.last_error.map(|err| RunFailure {
                code: err.code,
                message: err.message,
            }),
        })
    }

    fn resolve_thread(&self, explicit: Option<&str>) -> Result<String, RelayError> {
        match explicit.map(str::trim).filter(|raw| !raw.is_empty()) {
            Some(raw) => validate_id("threadId", raw),
            None => self
                .settings
                .thread_id
                .clone()
                .ok_or(RelayError::MissingThread),
        }
    }
}

pub(crate) fn chat_status(status: RunStatus) -> ChatStatus {
    match status {
        RunStatus::Queued => ChatStatus::Queued,
        RunStatus::InProgress => ChatStatus::InProgress,
        RunStatus::RequiresAction => ChatStatus::RequiresAction,
        RunStatus::Cancelling => ChatStatus::Cancelling,
        RunStatus::Completed => ChatStatus::Completed,
        RunStatus::Failed => ChatStatus::Failed,
        RunStatus::Cancelled => ChatStatus::Cancelled,
        RunStatus::Expired => ChatStatus::Expired,
        RunStatus::Incomplete => ChatStatus::Incomplete,
    }
}

fn run_failure(status: RunStatus, last_error: Option<RunError>) -> RunFailure {
    match last_error {
        Some(err) => RunFailure {
            code: err.code,
            message: err.message,
        },
        None => RunFailure {
            code: None,
            message: format!("run {status}"),
        },
    }
}

/// Ids are interpolated into gateway paths, so only a conservative
/// character set gets through.
pub(crate) fn validate_id(field: &'static str, raw: &str) -> Result<String, RelayError> {
    let id = raw.trim();
    if id.is_empty() {
        return Err(RelayError::InvalidId {
            field,
            reason: "must not be empty",
        });
    }
    if id.len() > MAX_ID_LEN {
        return Err(RelayError::InvalidId {
            field,
            reason: "is too long",
        });
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(RelayError::InvalidId {
            field,
            reason: "contains unsupported characters",
        });
    }
    Ok(id.to_string())
}
