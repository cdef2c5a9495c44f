//! Interactive terminal chat.
//!
//! The session's view is rendered incrementally: each time it changes, only
//! messages not yet on screen are printed. Expired and deleted messages simply
//! stop being part of the view.

use std::{
    collections::{HashMap, HashSet},
    path::PathBuf,
    sync::Arc,
};

use anyhow::{Context, Result};
use clap::Args;
use client::{
    ChatSession, CleanupService, HttpRemoteStore, Notice, RemoteStore, SessionHandle,
    SystemClock, clock::Clock, presence,
};
use shared::{
    config::client::ClientConfig,
    expiry::format_time_remaining,
    models::{Message, MessageId, Timestamp},
    telemetry::{LogTarget, initialize_tracing},
};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::{broadcast, watch},
    task::JoinHandle,
};
use tracing::{info, warn};
use url::Url;
use uuid::Uuid;

use crate::resolve_config_path;

const PROVISIONAL_MARKER: &str = "…";

#[derive(Args, Debug)]
#[command(about = "Join the chat room and send messages from stdin")]
pub struct ChatArgs {
    /// Name to chat as; an existing identity with this name is reused
    #[arg(long, short)]
    pub username: String,

    /// Ephemera server base URL (default: <http://localhost:8080>)
    #[arg(long, short)]
    pub server: Option<Url>,

    /// Path to a YAML or JSON client configuration file
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// Do not run the periodic remote cleanup from this client
    #[arg(long)]
    pub no_cleanup: bool,
}

/// A line typed at the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Quit,
    Online,
    List,
    Help,
    Send(String),
    Empty,
    Unknown(String),
}

#[must_use]
pub fn parse_input(line: &str) -> Input {
    let line = line.trim();
    if line.is_empty() {
        return Input::Empty;
    }
    match line {
        "/quit" | "/exit" => Input::Quit,
        "/online" => Input::Online,
        "/list" => Input::List,
        "/help" => Input::Help,
        command if command.starts_with('/') => Input::Unknown(command.to_string()),
        text => Input::Send(text.to_string()),
    }
}

/// Formats one message for the terminal.
#[must_use]
pub fn render_line(message: &Message, me: Uuid, now: Timestamp) -> String {
    let marker = if message.is_provisional() {
        PROVISIONAL_MARKER
    } else {
        " "
    };
    let who = if message.user_id == me {
        "you"
    } else {
        message.username.as_str()
    };
    format!(
        "{marker}[{}] {who}: {} ({})",
        message.created_at.0.format("%H:%M"),
        message.content,
        format_time_remaining(message.expires_at, now)
    )
}

/// Tracks what is on screen so each view change prints only new lines.
#[derive(Debug, Default)]
pub struct ViewPrinter {
    printed: HashSet<MessageId>,
    /// Own provisional lines on screen, by id, with their text.
    pending: HashMap<MessageId, String>,
}

impl ViewPrinter {
    /// Lines to print for `view`. A confirmed message that replaces one of our
    /// provisional lines is not printed again.
    pub fn diff(&mut self, view: &[Message], me: Uuid, now: Timestamp) -> Vec<String> {
        let mut replaced: Vec<String> = self
            .pending
            .iter()
            .filter(|(id, _)| !view.iter().any(|message| &message.id == *id))
            .map(|(_, content)| content.clone())
            .collect();

        let mut lines = Vec::new();
        let mut printed = HashSet::with_capacity(view.len());
        let mut pending = HashMap::new();

        for message in view {
            printed.insert(message.id.clone());
            if message.is_provisional() && message.user_id == me {
                pending.insert(message.id.clone(), message.content.clone());
            }
            if self.printed.contains(&message.id) {
                continue;
            }
            if !message.is_provisional()
                && message.user_id == me
                && let Some(index) = replaced.iter().position(|c| *c == message.content)
            {
                replaced.swap_remove(index);
                continue;
            }
            lines.push(render_line(message, me, now));
        }

        self.printed = printed;
        self.pending = pending;
        lines
    }
}

fn spawn_renderer(mut view: watch::Receiver<Vec<Message>>, me: Uuid) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut printer = ViewPrinter::default();
        loop {
            let current = view.borrow_and_update().clone();
            for line in printer.diff(&current, me, Timestamp::now()) {
                println!("{line}");
            }
            if view.changed().await.is_err() {
                break;
            }
        }
    })
}

fn spawn_notice_printer(mut notices: broadcast::Receiver<Notice>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match notices.recv().await {
                Ok(Notice::SendFailed { draft, reason }) => {
                    eprintln!("! not sent ({reason}): {draft}");
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "missed session notices");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

fn print_help() {
    println!("Type a message and press enter to send it. Messages vanish after 24 hours.");
    println!("  /online  show how many users are online");
    println!("  /list    reprint every visible message");
    println!("  /quit    leave the chat");
}

async fn handle_line(
    line: &str,
    handle: &SessionHandle,
    remote: &dyn RemoteStore,
    clock: &dyn Clock,
    me: Uuid,
) -> bool {
    match parse_input(line) {
        Input::Quit => return false,
        Input::Empty => {}
        Input::Help => print_help(),
        Input::Unknown(command) => eprintln!("unknown command {command}; try /help"),
        Input::Online => match presence::online_count(remote, clock).await {
            Ok(count) => println!("{count} online"),
            Err(err) => eprintln!("! could not count online users: {err}"),
        },
        Input::List => {
            let now = clock.now();
            for message in handle.messages() {
                println!("{}", render_line(&message, me, now));
            }
        }
        Input::Send(text) => {
            if let Err(err) = handle.send(text).await {
                eprintln!("! {err}");
            }
        }
    }
    true
}

/// Runs the interactive chat until `/quit`, end of input or Ctrl-C.
///
/// # Errors
/// Returns an error if configuration cannot be loaded or the user cannot be registered.
pub async fn run(args: ChatArgs) -> Result<()> {
    let config = ClientConfig::load_config(resolve_config_path(args.config), args.server)
        .context("failed to load client configuration")?;
    initialize_tracing(&config.logging, LogTarget::Stderr);

    let http = HttpRemoteStore::new(&config.server_url)?;
    let user = http
        .register_user(&args.username)
        .await
        .with_context(|| format!("failed to join as '{}'", args.username))?;
    let remote: Arc<dyn RemoteStore> = Arc::new(http);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let session = ChatSession::start(
        Arc::clone(&remote),
        Arc::clone(&clock),
        user.author(),
        &config,
    );
    let handle = session.handle();

    let mut cleanup = CleanupService::new(
        Arc::clone(&remote),
        Arc::clone(&clock),
        config.cleanup.clone(),
    );
    if !args.no_cleanup {
        cleanup.start();
    }

    println!("Joined as {} at {}. /help lists commands.", user.username, config.server_url);
    let renderer = spawn_renderer(handle.watch_messages(), user.id);
    let notices = spawn_notice_printer(handle.notices());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if !handle_line(&line, &handle, remote.as_ref(), clock.as_ref(), user.id).await {
                        break;
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    warn!(error = %err, "failed to read stdin");
                    break;
                }
            },
        }
    }

    info!("leaving chat");
    cleanup.stop().await;
    session.stop().await;
    renderer.abort();
    notices.abort();
    Ok(())
}
