//! In-memory stand-in for the assistant gateway.
//!
//! Ids are handed out sequentially (`t1`, `r1`, `m1`, ...) so tests can
//! assert on them directly. Each run follows a [`RunScript`]: every
//! `get_run` advances the run to the next scripted status and the final
//! status sticks. When a run reaches `completed` and the script carries a
//! reply, an assistant message tagged with the run id is appended to the
//! thread.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use relay_gateway::{
    AssistantGateway, ContentBlock, CreateMessage, CreateRun, GatewayError, ListMessages,
    Message, MessageList, Role, Run, RunError, RunStatus, SortOrder, Thread,
};
use tokio::sync::Mutex;

/// Gateway operation, used to target injected failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GatewayOp {
    CreateThread,
    CreateMessage,
    CreateRun,
    GetRun,
    ListMessages,
}

/// One recorded call against the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayCall {
    CreateThread,
    CreateMessage {
        thread_id: String,
        content: String,
    },
    CreateRun {
        thread_id: String,
        assistant_id: String,
        instructions: Option<String>,
    },
    GetRun {
        thread_id: String,
        run_id: String,
    },
    ListMessages {
        thread_id: String,
        run_id: Option<String>,
    },
}

impl GatewayCall {
    pub fn op(&self) -> GatewayOp {
        match self {
            GatewayCall::CreateThread => GatewayOp::CreateThread,
            GatewayCall::CreateMessage { .. } => GatewayOp::CreateMessage,
            GatewayCall::CreateRun { .. } => GatewayOp::CreateRun,
            GatewayCall::GetRun { .. } => GatewayOp::GetRun,
            GatewayCall::ListMessages { .. } => GatewayOp::ListMessages,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Reply {
    None,
    Text(String),
    Echo,
}

/// Scripted progression for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunScript {
    statuses: Vec<RunStatus>,
    reply: Reply,
    error: Option<RunError>,
}

impl Default for RunScript {
    /// Never leaves `queued`.
    fn default() -> Self {
        Self {
            statuses: Vec::new(),
            reply: Reply::None,
            error: None,
        }
    }
}

impl RunScript {
    pub fn new(statuses: impl IntoIterator<Item = RunStatus>) -> Self {
        Self {
            statuses: statuses.into_iter().collect(),
            ..Self::default()
        }
    }

    /// `in_progress` then `completed` with the given reply text.
    pub fn answer(text: impl Into<String>) -> Self {
        Self::new([RunStatus::InProgress, RunStatus::Completed]).reply(text)
    }

    /// `in_progress` then `completed`, echoing the latest user message.
    pub fn echo() -> Self {
        let mut script = Self::new([RunStatus::InProgress, RunStatus::Completed]);
        script.reply = Reply::Echo;
        script
    }

    /// `in_progress` then `failed` with the given error.
    pub fn failure(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new([RunStatus::InProgress, RunStatus::Failed]).error(code, message)
    }

    pub fn reply(mut self, text: impl Into<String>) -> Self {
        self.reply = Reply::Text(text.into());
        self
    }

    pub fn error(mut self, code: impl Into<String>, message: impl Into<String>) -> Self {
        self.error = Some(RunError {
            code: Some(code.into()),
            message: message.into(),
        });
        self
    }
}

struct RunEntry {
    run: Run,
    pending: VecDeque<RunStatus>,
    reply: Reply,
    error: Option<RunError>,
    prompt: Option<String>,
    replied: bool,
}

struct Injected {
    status: u16,
    message: String,
}

struct State {
    clock: i64,
    next_thread: u64,
    next_run: u64,
    next_message: u64,
    threads: HashMap<String, Vec<Message>>,
    runs: HashMap<String, RunEntry>,
    scripts: VecDeque<RunScript>,
    fallback: RunScript,
    failures: HashMap<GatewayOp, VecDeque<Injected>>,
    calls: Vec<GatewayCall>,
}

impl State {
    fn tick(&mut self) -> i64 {
        self.clock += 1;
        self.clock
    }

    fn take_failure(&mut self, op: GatewayOp, endpoint: String) -> Result<(), GatewayError> {
        match self.failures.get_mut(&op).and_then(VecDeque::pop_front) {
            Some(injected) => Err(GatewayError::Status {
                endpoint,
                status: injected.status,
                message: injected.message,
            }),
            None => Ok(()),
        }
    }

    fn ensure_thread(&self, thread_id: &str, endpoint: &str) -> Result<(), GatewayError> {
        if self.threads.contains_key(thread_id) {
            Ok(())
        } else {
            Err(not_found(endpoint, format!("No thread found with id '{thread_id}'.")))
        }
    }

    fn push_message(&mut self, thread_id: &str, role: Role, text: String, run: Option<&Run>) -> Message {
        self.next_message += 1;
        let created_at = self.tick();
        let message = Message {
            id: format!("m{}", self.next_message),
            role,
            content: vec![ContentBlock::text(text)],
            run_id: run.map(|r| r.id.clone()),
            thread_id: Some(thread_id.to_string()),
            assistant_id: run.map(|r| r.assistant_id.clone()),
            created_at: Some(created_at),
        };
        self.threads
            .entry(thread_id.to_string())
            .or_default()
            .push(message.clone());
        message
    }

    fn advance(&mut self, run_id: &str) -> Option<Run> {
        let now = self.tick();
        let entry = self.runs.get_mut(run_id)?;
        if let Some(next) = entry.pending.pop_front() {
            entry.run.status = next;
            match next {
                RunStatus::InProgress => {
                    entry.run.started_at.get_or_insert(now);
                }
                RunStatus::Completed => entry.run.completed_at = Some(now),
                RunStatus::Failed | RunStatus::Incomplete => {
                    entry.run.failed_at = Some(now);
                    entry.run.last_error = entry.error.clone();
                }
                RunStatus::Cancelled => entry.run.cancelled_at = Some(now),
                RunStatus::Expired => {
                    entry.run.expires_at = Some(now);
                    entry.run.last_error = entry.error.clone();
                }
                _ => {}
            }
        }
        let needs_reply = entry.run.status == RunStatus::Completed && !entry.replied;
        let reply = match (&entry.reply, needs_reply) {
            (Reply::Text(text), true) => Some(text.clone()),
            (Reply::Echo, true) => Some(format!("echo: {}", entry.prompt.as_deref().unwrap_or(""))),
            _ => None,
        };
        let run = entry.run.clone();
        if let Some(text) = reply {
            if let Some(entry) = self.runs.get_mut(run_id) {
                entry.replied = true;
            }
            self.push_message(&run.thread_id, Role::Assistant, text, Some(&run));
        }
        Some(run)
    }
}

fn not_found(endpoint: &str, message: String) -> GatewayError {
    GatewayError::Status {
        endpoint: endpoint.to_string(),
        status: 404,
        message,
    }
}

/// In-memory [`AssistantGateway`].
pub struct MockGateway {
    state: Mutex<State>,
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl MockGateway {
    pub fn new() -> Self {
        Self::with_fallback(RunScript::default())
    }

    /// Every run without an explicit script answers by echoing the prompt.
    pub fn echo() -> Self {
        Self::with_fallback(RunScript::echo())
    }

    fn with_fallback(fallback: RunScript) -> Self {
        Self {
            state: Mutex::new(State {
                clock: 1_700_000_000,
                next_thread: 0,
                next_run: 0,
                next_message: 0,
                threads: HashMap::new(),
                runs: HashMap::new(),
                scripts: VecDeque::new(),
                fallback,
                failures: HashMap::new(),
                calls: Vec::new(),
            }),
        }
    }

    /// Register a thread that exists before the relay starts.
    pub fn with_thread(mut self, thread_id: impl Into<String>) -> Self {
        self.state
            .get_mut()
            .threads
            .entry(thread_id.into())
            .or_default();
        self
    }

    /// Script the next run created; scripts are consumed in order.
    pub async fn script_run(&self, script: RunScript) {
        self.state.lock().await.scripts.push_back(script);
    }

    /// Make the next call of `op` fail with a gateway status error.
    pub async fn fail_next(&self, op: GatewayOp, status: u16, message: impl Into<String>) {
        self.state
            .lock()
            .await
            .failures
            .entry(op)
            .or_default()
            .push_back(Injected {
                status,
                message: message.into(),
            });
    }

    pub async fn calls(&self) -> Vec<GatewayCall> {
        self.state.lock().await.calls.clone()
    }

    pub async fn count(&self, op: GatewayOp) -> usize {
        self.state
            .lock()
            .await
            .calls
            .iter()
            .filter(|call| call.op() == op)
            .count()
    }

    /// Messages of a thread, oldest first.
    pub async fn thread_messages(&self, thread_id: &str) -> Vec<Message> {
        self.state
            .lock()
            .await
            .threads
            .get(thread_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl AssistantGateway for MockGateway {
    async fn create_thread(&self) -> Result<Thread, GatewayError> {
        let mut state = self.state.lock().await;
        state.calls.push(GatewayCall::CreateThread);
        state.take_failure(GatewayOp::CreateThread, "POST /threads".into())?;
        state.next_thread += 1;
        let id = format!("t{}", state.next_thread);
        let created_at = state.tick();
        state.threads.insert(id.clone(), Vec::new());
        Ok(Thread {
            id,
            created_at: Some(created_at),
        })
    }

    async fn create_message(
        &self,
        thread_id: &str,
        message: &CreateMessage,
    ) -> Result<Message, GatewayError> {
        let endpoint = format!("POST /threads/{thread_id}/messages");
        let mut state = self.state.lock().await;
        state.calls.push(GatewayCall::CreateMessage {
            thread_id: thread_id.to_string(),
            content: message.content.clone(),
        });
        state.take_failure(GatewayOp::CreateMessage, endpoint.clone())?;
        state.ensure_thread(thread_id, &endpoint)?;
        Ok(state.push_message(thread_id, message.role, message.content.clone(), None))
    }

    async fn create_run(&self, thread_id: &str, run: &CreateRun) -> Result<Run, GatewayError> {
        let endpoint = format!("POST /threads/{thread_id}/runs");
        let mut state = self.state.lock().await;
        state.calls.push(GatewayCall::CreateRun {
            thread_id: thread_id.to_string(),
            assistant_id: run.assistant_id.clone(),
            instructions: run.instructions.clone(),
        });
        state.take_failure(GatewayOp::CreateRun, endpoint.clone())?;
        state.ensure_thread(thread_id, &endpoint)?;
        let script = match state.scripts.pop_front() {
            Some(script) => script,
            None => state.fallback.clone(),
        };
        let prompt = state.threads.get(thread_id).and_then(|messages| {
            messages
                .iter()
                .rev()
                .find(|m| m.role == Role::User)
                .and_then(|m| m.first_text().map(str::to_string))
        });
        state.next_run += 1;
        let created_at = state.tick();
        let created = Run {
            id: format!("r{}", state.next_run),
            thread_id: thread_id.to_string(),
            assistant_id: run.assistant_id.clone(),
            status: RunStatus::Queued,
            created_at,
            started_at: None,
            completed_at: None,
            failed_at: None,
            cancelled_at: None,
            expires_at: None,
            last_error: None,
        };
        state.runs.insert(
            created.id.clone(),
            RunEntry {
                run: created.clone(),
                pending: script.statuses.into(),
                reply: script.reply,
                error: script.error,
                prompt,
                replied: false,
            },
        );
        Ok(created)
    }

    async fn get_run(&self, thread_id: &str, run_id: &str) -> Result<Run, GatewayError> {
        let endpoint = format!("GET /threads/{thread_id}/runs/{run_id}");
        let mut state = self.state.lock().await;
        state.calls.push(GatewayCall::GetRun {
            thread_id: thread_id.to_string(),
            run_id: run_id.to_string(),
        });
        state.take_failure(GatewayOp::GetRun, endpoint.clone())?;
        state.ensure_thread(thread_id, &endpoint)?;
        let belongs = state
            .runs
            .get(run_id)
            .is_some_and(|entry| entry.run.thread_id == thread_id);
        if !belongs {
            return Err(not_found(&endpoint, format!("No run found with id '{run_id}'.")));
        }
        state
            .advance(run_id)
            .ok_or_else(|| not_found(&endpoint, format!("No run found with id '{run_id}'.")))
    }

    async fn list_messages(
        &self,
        thread_id: &str,
        query: &ListMessages,
    ) -> Result<MessageList, GatewayError> {
        let endpoint = format!("GET /threads/{thread_id}/messages");
        let mut state = self.state.lock().await;
        state.calls.push(GatewayCall::ListMessages {
            thread_id: thread_id.to_string(),
            run_id: query.run_id.clone(),
        });
        state.take_failure(GatewayOp::ListMessages, endpoint.clone())?;
        state.ensure_thread(thread_id, &endpoint)?;
        let mut data: Vec<Message> = state
            .threads
            .get(thread_id)
            .map(|messages| {
                messages
                    .iter()
                    .filter(|m| match query.run_id.as_deref() {
                        Some(run_id) => m.run_id.as_deref() == Some(run_id),
                        None => true,
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        if query.order.unwrap_or(SortOrder::Desc) == SortOrder::Desc {
            data.reverse();
        }
        let limit = query.limit.unwrap_or(20) as usize;
        let has_more = data.len() > limit;
        data.truncate(limit);
        Ok(MessageList {
            first_id: data.first().map(|m| m.id.clone()),
            last_id: data.last().map(|m| m.id.clone()),
            data,
            has_more,
        })
    }
}
