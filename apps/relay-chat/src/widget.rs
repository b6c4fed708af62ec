//! Terminal-independent chat state: one conversation, at most one run in
//! flight, polling owned by the widget.

use std::sync::Arc;

use relay_protocol::{ChatStatus, StatusReply, SubmitRequest};
use tracing::warn;

use crate::client::{ClientError, RelayApi};
use crate::poller::{PollEvent, PollOverride, PollPolicy, PollingTask};
use crate::store::{Conversation, EntryKind, Store};

#[derive(Debug, thiserror::Error)]
pub enum WidgetError {
    #[error("type a message first")]
    EmptyPrompt,
    #[error("still waiting for run {0}")]
    Busy(String),
    #[error("nothing to retry")]
    NothingToRetry,
    #[error(transparent)]
    Submit(#[from] ClientError),
}

/// What the front end should show after a polling event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Update {
    Waiting {
        attempt: u32,
        max_attempts: u32,
        status: ChatStatus,
    },
    StillWaiting {
        attempt: u32,
        error: String,
    },
    Answered(String),
    NoResponse,
    Failed(String),
    TimedOut(u32),
}

impl Update {
    pub fn is_final(&self) -> bool {
        !matches!(self, Update::Waiting { .. } | Update::StillWaiting { .. })
    }
}

struct InFlight {
    task: PollingTask,
    policy: PollPolicy,
    prompt: String,
}

pub struct ChatWidget {
    api: Arc<dyn RelayApi>,
    store: Option<Store>,
    conversation: Conversation,
    overrides: PollOverride,
    in_flight: Option<InFlight>,
    last_failed: Option<String>,
}

impl ChatWidget {
    pub fn new(api: Arc<dyn RelayApi>, store: Option<Store>, overrides: PollOverride) -> Self {
        let conversation = store.as_ref().map(Store::load).unwrap_or_default();
        Self {
            api,
            store,
            conversation,
            overrides,
            in_flight: None,
            last_failed: None,
        }
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn retry_prompt(&self) -> Option<&str> {
        self.last_failed.as_deref()
    }

    /// Validate and send a prompt, then start polling its run.
    pub async fn submit(&mut self, input: &str) -> Result<PollPolicy, WidgetError> {
        let prompt = input.trim();
        if prompt.is_empty() {
            return Err(WidgetError::EmptyPrompt);
        }
        if let Some(active) = &self.in_flight {
            return Err(WidgetError::Busy(active.task.run_id().to_string()));
        }

        self.conversation.push(EntryKind::User, prompt, None);
        self.persist();
        let req = SubmitRequest {
            prompt: prompt.to_string(),
            thread_id: self.conversation.thread_id.clone(),
        };
        let accepted = match self.api.submit(&req).await {
            Ok(accepted) => accepted,
            Err(err) => {
                self.conversation
                    .push(EntryKind::Error, err.to_string(), None);
                self.last_failed = Some(prompt.to_string());
                self.persist();
                return Err(err.into());
            }
        };

        let policy = PollPolicy::resolve(self.overrides, accepted.poll);
        self.conversation.thread_id = Some(accepted.thread_id.clone());
        self.last_failed = None;
        self.persist();
        let task = PollingTask::spawn(
            self.api.clone(),
            accepted.thread_id,
            accepted.run_id,
            policy,
        );
        self.in_flight = Some(InFlight {
            task,
            policy,
            prompt: prompt.to_string(),
        });
        Ok(policy)
    }

    /// Resubmit the last prompt that failed.
    pub async fn retry(&mut self) -> Result<PollPolicy, WidgetError> {
        let prompt = self.last_failed.clone().ok_or(WidgetError::NothingToRetry)?;
        self.submit(&prompt).await
    }

    /// Wait for the next polling event; `None` when nothing is in flight.
    pub async fn next_update(&mut self) -> Option<Update> {
        let active = self.in_flight.as_mut()?;
        let max_attempts = active.policy.max_attempts;
        let event = active.task.next().await;
        let update = match event {
            Some(PollEvent::Pending { attempt, reply }) => Update::Waiting {
                attempt,
                max_attempts,
                status: reply.status,
            },
            Some(PollEvent::Transient { attempt, error }) => {
                Update::StillWaiting { attempt, error }
            }
            Some(PollEvent::Finished(reply)) => self.finish(reply),
            Some(PollEvent::TimedOut { attempts }) => {
                self.record_failure(format!("no answer after {attempts} checks"), None);
                Update::TimedOut(attempts)
            }
            None => {
                self.in_flight = None;
                return None;
            }
        };
        if update.is_final() {
            self.in_flight = None;
            self.persist();
        }
        Some(update)
    }

    /// Forget the conversation, including the thread id.
    pub fn reset(&mut self) {
        self.in_flight = None;
        self.last_failed = None;
        self.conversation = Conversation::default();
        if let Some(store) = &self.store {
            if let Err(err) = store.clear() {
                warn!("could not clear conversation: {err}");
            }
        }
    }

    fn finish(&mut self, reply: StatusReply) -> Update {
        let run_id = Some(reply.run_id.as_str());
        if let Some(text) = reply.message.as_deref() {
            self.conversation.push(EntryKind::Assistant, text, run_id);
            return Update::Answered(text.to_string());
        }
        if reply.status.is_failure() {
            let detail = reply
                .error
                .as_ref()
                .map(|e| e.message.clone())
                .unwrap_or_else(|| format!("run {}", reply.status));
            self.record_failure(detail.clone(), run_id);
            return Update::Failed(detail);
        }
        self.conversation
            .push(EntryKind::Notice, "the assistant did not reply", run_id);
        Update::NoResponse
    }

    fn record_failure(&mut self, detail: String, run_id: Option<&str>) {
        self.conversation.push(EntryKind::Error, detail, run_id);
        self.last_failed = self.in_flight.as_ref().map(|f| f.prompt.clone());
    }

    fn persist(&self) {
        if let Some(store) = &self.store {
            if let Err(err) = store.save(&self.conversation) {
                warn!(path = %store.path().display(), "conversation not saved: {err}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poller::tests::{reply, ScriptedRelay};
    use relay_protocol::{PollHint, RunFailure, SubmitAccepted};

    fn accepted(interval_ms: u64, max_attempts: u32) -> SubmitAccepted {
        SubmitAccepted {
            thread_id: "t1".into(),
            run_id: "r1".into(),
            status: ChatStatus::Queued,
            poll: Some(PollHint {
                interval_ms,
                max_attempts,
            }),
        }
    }

    async fn run_to_end(widget: &mut ChatWidget) -> Vec<Update> {
        let mut out = Vec::new();
        while let Some(update) = widget.next_update().await {
            out.push(update);
        }
        out
    }

    #[tokio::test]
    async fn blank_input_never_reaches_the_relay() {
        let relay = Arc::new(ScriptedRelay::default());
        let mut widget = ChatWidget::new(relay.clone(), None, PollOverride::default());
        assert!(matches!(widget.submit(" \t\n").await, Err(WidgetError::EmptyPrompt)));
        assert_eq!(relay.submit_calls(), 0);
        assert!(widget.conversation().entries.is_empty());
    }

    #[tokio::test]
    async fn answer_is_appended_and_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conversation.json");
        let relay = Arc::new(ScriptedRelay::with_statuses([
            Ok(reply(ChatStatus::InProgress, None)),
            Ok(reply(ChatStatus::Completed, Some("Hi there"))),
        ]));
        relay.push_submit(Ok(accepted(1, 10)));
        let mut widget = ChatWidget::new(relay.clone(), Some(Store::new(&path)), PollOverride::default());

        let policy = widget.submit("Hello").await.unwrap();
        assert_eq!(policy.max_attempts, 10);
        assert!(widget.in_flight.is_some());

        let updates = run_to_end(&mut widget).await;
        assert_eq!(
            updates,
            vec![
                Update::Waiting {
                    attempt: 1,
                    max_attempts: 10,
                    status: ChatStatus::InProgress
                },
                Update::Answered("Hi there".into()),
            ]
        );
        assert!(widget.in_flight.is_none());

        let saved = Store::new(&path).load();
        assert_eq!(saved.thread_id.as_deref(), Some("t1"));
        let kinds: Vec<EntryKind> = saved.entries.iter().map(|e| e.kind).collect();
        assert_eq!(kinds, [EntryKind::User, EntryKind::Assistant]);
        assert_eq!(saved.entries[1].run_id.as_deref(), Some("r1"));
    }

    #[tokio::test]
    async fn only_one_run_in_flight() {
        let relay = Arc::new(ScriptedRelay::default());
        relay.push_submit(Ok(accepted(60_000, 3)));
        relay.push_submit(Ok(accepted(60_000, 3)));
        let mut widget = ChatWidget::new(relay.clone(), None, PollOverride::default());

        widget.submit("first").await.unwrap();
        match widget.submit("second").await {
            Err(WidgetError::Busy(run_id)) => assert_eq!(run_id, "r1"),
            other => panic!("expected busy, got {other:?}"),
        }
        assert_eq!(relay.submit_calls(), 1);
        assert_eq!(widget.conversation().entries.len(), 1);
    }

    #[tokio::test]
    async fn failed_submit_can_be_retried() {
        let relay = Arc::new(ScriptedRelay::with_statuses([Ok(reply(
            ChatStatus::Completed,
            Some("done"),
        ))]));
        relay.push_submit(Err(ClientError::Api {
            status: 500,
            detail: "gateway unreachable".into(),
        }));
        relay.push_submit(Ok(accepted(1, 5)));
        let mut widget = ChatWidget::new(relay.clone(), None, PollOverride::default());

        assert!(matches!(widget.submit("Hello").await, Err(WidgetError::Submit(_))));
        assert_eq!(widget.retry_prompt(), Some("Hello"));
        assert_eq!(
            widget.conversation().entries.last().map(|e| e.kind),
            Some(EntryKind::Error)
        );
        assert!(widget.in_flight.is_none());

        widget.retry().await.unwrap();
        assert_eq!(widget.retry_prompt(), None);
        assert_eq!(run_to_end(&mut widget).await, vec![Update::Answered("done".into())]);
        assert_eq!(relay.submit_calls(), 2);
        assert!(matches!(widget.retry().await, Err(WidgetError::NothingToRetry)));
    }

    #[tokio::test]
    async fn failed_run_is_shown_and_retryable() {
        let mut failed = reply(ChatStatus::Failed, None);
        failed.error = Some(RunFailure {
            code: Some("server_error".into()),
            message: "model overloaded".into(),
        });
        let relay = Arc::new(ScriptedRelay::with_statuses([Ok(failed)]));
        relay.push_submit(Ok(accepted(1, 5)));
        let mut widget = ChatWidget::new(relay, None, PollOverride::default());

        widget.submit("Hello").await.unwrap();
        assert_eq!(
            run_to_end(&mut widget).await,
            vec![Update::Failed("model overloaded".into())]
        );
        assert_eq!(widget.retry_prompt(), Some("Hello"));
    }

    #[tokio::test]
    async fn no_response_is_terminal_but_not_an_error() {
        let relay = Arc::new(ScriptedRelay::with_statuses([Ok(reply(
            ChatStatus::NoResponse,
            None,
        ))]));
        relay.push_submit(Ok(accepted(1, 5)));
        let mut widget = ChatWidget::new(relay, None, PollOverride::default());
        widget.submit("Hello").await.unwrap();
        assert_eq!(run_to_end(&mut widget).await, vec![Update::NoResponse]);
        assert_eq!(widget.retry_prompt(), None);
        assert_eq!(
            widget.conversation().entries.last().map(|e| e.kind),
            Some(EntryKind::Notice)
        );
    }

    #[tokio::test]
    async fn attempt_bound_times_out() {
        let relay = Arc::new(ScriptedRelay::default());
        relay.push_submit(Ok(accepted(60_000, 30)));
        let overrides = PollOverride {
            interval: Some(std::time::Duration::from_millis(1)),
            max_attempts: Some(2),
        };
        let mut widget = ChatWidget::new(relay.clone(), None, overrides);
        widget.submit("Hello").await.unwrap();
        let updates = run_to_end(&mut widget).await;
        assert_eq!(updates.len(), 3);
        assert_eq!(updates[2], Update::TimedOut(2));
        assert_eq!(relay.status_calls(), 2);
        assert_eq!(widget.retry_prompt(), Some("Hello"));
    }

    #[tokio::test]
    async fn reset_forgets_thread_and_history() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conversation.json");
        let mut seeded = Conversation {
            thread_id: Some("t_old".into()),
            ..Default::default()
        };
        seeded.push(EntryKind::User, "earlier", None);
        Store::new(&path).save(&seeded).unwrap();

        let relay = Arc::new(ScriptedRelay::default());
        let mut widget = ChatWidget::new(relay, Some(Store::new(&path)), PollOverride::default());
        assert_eq!(widget.conversation().thread_id.as_deref(), Some("t_old"));
        widget.reset();
        assert_eq!(widget.conversation(), &Conversation::default());
        assert!(!path.exists());
    }
}
