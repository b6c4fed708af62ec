use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};

mod client;
mod poller;
mod store;
mod widget;

use client::RelayClient;
use poller::PollOverride;
use store::{EntryKind, Store};
use widget::{ChatWidget, Update, WidgetError};

#[derive(Parser, Debug)]
#[command(name = "relay-chat", version, about = "Terminal chat client for the assistant relay")]
struct Cli {
    /// Relay base URL
    #[arg(long, env = "RELAY_BASE", default_value = "http://127.0.0.1:3001")]
    base: String,
    /// Conversation file (defaults to the user's local data directory)
    #[arg(long, env = "RELAY_CHAT_STORE")]
    store: Option<PathBuf>,
    /// Keep the conversation in memory only
    #[arg(long)]
    no_store: bool,
    /// Status polling interval in milliseconds (overrides the relay's hint)
    #[arg(long)]
    interval_ms: Option<u64>,
    /// Status checks before giving up (overrides the relay's hint)
    #[arg(long)]
    max_attempts: Option<u32>,
    /// Request timeout for each relay call, in seconds
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,
    /// Send one prompt, print the answer and exit
    #[arg(long, value_name = "PROMPT")]
    once: Option<String>,
    /// Start a fresh conversation (forgets the stored thread)
    #[arg(long)]
    reset: bool,
    /// Print the stored conversation and exit
    #[arg(long)]
    history: bool,
}

const HELP: &str = "commands: /retry  /reset  /history  /quit";

#[tokio::main]
async fn main() -> Result<()> {
    relay_otel::init();
    let cli = Cli::parse();

    let http = reqwest::Client::builder()
        .user_agent(format!("relay-chat/{}", env!("CARGO_PKG_VERSION")))
        .timeout(Duration::from_secs(cli.timeout_secs.max(1)))
        .build()
        .context("build http client")?;
    let api = Arc::new(RelayClient::new(&cli.base, http)?);
    let store = if cli.no_store {
        None
    } else {
        Some(Store::new(cli.store.clone().unwrap_or_else(store::default_path)))
    };
    let overrides = PollOverride {
        interval: cli.interval_ms.map(Duration::from_millis),
        max_attempts: cli.max_attempts,
    };
    let mut widget = ChatWidget::new(api.clone(), store, overrides);

    if cli.reset {
        widget.reset();
    }
    if cli.history {
        print_history(&widget);
        return Ok(());
    }
    if let Some(prompt) = cli.once.as_deref() {
        widget.submit(prompt).await?;
        return match drive(&mut widget).await? {
            Some(Update::Answered(_)) | Some(Update::NoResponse) => Ok(()),
            Some(other) => bail!("run did not complete: {other:?}"),
            None => bail!("interrupted"),
        };
    }

    println!("relay-chat → {} ({HELP})", api.base());
    print_history(&widget);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("read stdin")?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };
        let submitted = match line.trim() {
            "/quit" | "/exit" => break,
            "/reset" => {
                widget.reset();
                println!("(new conversation)");
                continue;
            }
            "/history" => {
                print_history(&widget);
                continue;
            }
            "/help" => {
                println!("{HELP}");
                continue;
            }
            "/retry" => widget.retry().await,
            other => widget.submit(other).await,
        };
        match submitted {
            Ok(policy) => println!(
                "… sent, checking every {} ms (up to {} times)",
                policy.interval.as_millis(),
                policy.max_attempts
            ),
            Err(WidgetError::EmptyPrompt) => {
                println!("! {}", WidgetError::EmptyPrompt);
                continue;
            }
            Err(err) => {
                println!("! {err}");
                if widget.retry_prompt().is_some() {
                    println!("  (type /retry to send it again)");
                }
                continue;
            }
        }
        if drive(&mut widget).await?.is_none() {
            break;
        }
    }
    Ok(())
}

/// Render polling updates until the run settles; `None` on Ctrl-C.
async fn drive(widget: &mut ChatWidget) -> Result<Option<Update>> {
    loop {
        let update = tokio::select! {
            update = widget.next_update() => update,
            _ = tokio::signal::ctrl_c() => return Ok(None),
        };
        let Some(update) = update else {
            return Ok(None);
        };
        render(&update);
        if update.is_final() {
            if matches!(update, Update::Failed(_) | Update::TimedOut(_)) {
                println!("  (type /retry to send it again)");
            }
            return Ok(Some(update));
        }
    }
}

fn render(update: &Update) {
    match update {
        Update::Waiting {
            attempt,
            max_attempts,
            status,
        } => println!("… waiting ({status}, check {attempt}/{max_attempts})"),
        Update::StillWaiting { attempt, error } => {
            println!("… still waiting (check {attempt} failed: {error})")
        }
        Update::Answered(text) => println!("assistant> {text}"),
        Update::NoResponse => println!("(the assistant did not reply)"),
        Update::Failed(detail) => println!("! run failed: {detail}"),
        Update::TimedOut(attempts) => println!("! no answer after {attempts} checks"),
    }
}

fn print_history(widget: &ChatWidget) {
    let conversation = widget.conversation();
    if let Some(thread) = &conversation.thread_id {
        println!("(thread {thread})");
    }
    for entry in &conversation.entries {
        let who = match entry.kind {
            EntryKind::User => "you",
            EntryKind::Assistant => "assistant",
            EntryKind::Notice => "note",
            EntryKind::Error => "error",
        };
        println!(
            "[{}] {who}> {}",
            entry.at.with_timezone(&chrono::Local).format("%H:%M:%S"),
            entry.text
        );
    }
}
