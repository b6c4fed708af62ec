use std::sync::Arc;
use std::time::Duration;

use relay_protocol::{PollHint, StatusReply};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::client::RelayApi;

pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(2000);
pub const DEFAULT_MAX_ATTEMPTS: u32 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

/// User overrides from the command line; unset fields follow the server.
#[derive(Debug, Clone, Copy, Default)]
pub struct PollOverride {
    pub interval: Option<Duration>,
    pub max_attempts: Option<u32>,
}

impl PollPolicy {
    /// CLI override, then the relay's hint, then the built-in defaults.
    pub fn resolve(overrides: PollOverride, hint: Option<PollHint>) -> Self {
        let defaults = Self::default();
        let interval = overrides
            .interval
            .or_else(|| hint.map(|h| Duration::from_millis(h.interval_ms)))
            .filter(|d| !d.is_zero())
            .unwrap_or(defaults.interval);
        let max_attempts = overrides
            .max_attempts
            .or_else(|| hint.map(|h| h.max_attempts))
            .filter(|n| *n > 0)
            .unwrap_or(defaults.max_attempts);
        Self {
            interval,
            max_attempts,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollEvent {
    /// The run is still going.
    Pending { attempt: u32, reply: StatusReply },
    /// A status call failed; polling carries on.
    Transient { attempt: u32, error: String },
    /// Final reply: an answer, `no_response`, or a failure state.
    Finished(StatusReply),
    /// The attempt bound was reached without a final reply.
    TimedOut { attempts: u32 },
}

impl PollEvent {
    pub fn is_final(&self) -> bool {
        matches!(self, PollEvent::Finished(_) | PollEvent::TimedOut { .. })
    }
}

/// Owner of a running polling loop. Dropping it aborts the loop.
pub struct PollingTask {
    run_id: String,
    events: mpsc::Receiver<PollEvent>,
    handle: JoinHandle<()>,
}

impl PollingTask {
    pub fn spawn(
        api: Arc<dyn RelayApi>,
        thread_id: String,
        run_id: String,
        policy: PollPolicy,
    ) -> Self {
        let (tx, events) = mpsc::channel(8);
        let handle = tokio::spawn(poll_loop(api, thread_id, run_id.clone(), policy, tx));
        Self {
            run_id,
            events,
            handle,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Next event, or `None` once the loop has ended.
    pub async fn next(&mut self) -> Option<PollEvent> {
        self.events.recv().await
    }
}

impl Drop for PollingTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn is_final_reply(reply: &StatusReply) -> bool {
    reply.message.is_some() || reply.status.is_terminal()
}

async fn poll_loop(
    api: Arc<dyn RelayApi>,
    thread_id: String,
    run_id: String,
    policy: PollPolicy,
    tx: mpsc::Sender<PollEvent>,
) {
    for attempt in 1..=policy.max_attempts {
        tokio::time::sleep(policy.interval).await;
        let event = match api.status(&thread_id, &run_id).await {
            Ok(reply) if is_final_reply(&reply) => PollEvent::Finished(reply),
            Ok(reply) => PollEvent::Pending { attempt, reply },
            Err(err) => {
                debug!(target: "relay::chat", %run_id, attempt, "status check failed: {err}");
                PollEvent::Transient {
                    attempt,
                    error: err.to_string(),
                }
            }
        };
        let done = event.is_final();
        if tx.send(event).await.is_err() || done {
            return;
        }
    }
    let _ = tx
        .send(PollEvent::TimedOut {
            attempts: policy.max_attempts,
        })
        .await;
}
