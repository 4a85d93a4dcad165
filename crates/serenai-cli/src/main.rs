//! `serenai` — chat with the SerenAI assistant from a terminal.
//!
//! Lines typed at the prompt are sent as chat messages; lines starting
//! with `/` are commands (see `/help`). Conversation lines go to stdout,
//! connection status and diagnostics to stderr.

mod input;
mod render;

use anyhow::Context;
use clap::Parser;
use serenai_sdk::backoff::DEFAULT_MAX_ATTEMPTS;
use serenai_sdk::endpoints::{DEFAULT_API_BASE, DEFAULT_SOCKET_BASE};
use serenai_sdk::{
    submit, ChatApi, ChatConfig, ChatEndpoints, ChatHandle, ChatSnapshot, Credential,
    CredentialSource, Submission, WsConnector,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing::debug;

use crate::input::InputAction;

#[derive(Parser, Debug)]
#[command(name = "serenai")]
#[command(author, version, about = "SerenAI realtime chat client", long_about = None)]
struct Cli {
    /// Base URL of the realtime channel
    #[arg(long, env = "SERENAI_WS_URL", default_value = DEFAULT_SOCKET_BASE)]
    ws_url: String,

    /// Base URL of the REST API, used when the socket is down
    #[arg(long, env = "SERENAI_API_URL", default_value = DEFAULT_API_BASE)]
    api_url: String,

    /// Bearer token; without one, sign in later with /login
    #[arg(long, env = "SERENAI_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Automatic reconnect attempts before giving up
    #[arg(long, env = "SERENAI_MAX_ATTEMPTS", default_value_t = DEFAULT_MAX_ATTEMPTS)]
    max_attempts: u32,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let endpoints =
        ChatEndpoints::new(&cli.ws_url, &cli.api_url).context("invalid backend URL")?;
    debug!(socket = %endpoints.socket_base(), api = %endpoints.api_base(), "starting");

    let mut config = ChatConfig::new(endpoints.clone());
    config.backoff.max_attempts = cli.max_attempts;

    let auth = CredentialSource::new(cli.token.map(Credential::new));
    let chat = ChatHandle::spawn(config, WsConnector, auth.subscribe());
    let api = ChatApi::new(endpoints);
    let printer = tokio::spawn(print_updates(chat.subscribe()));

    eprintln!("Type a message and press Enter. /help lists commands.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match input::parse(&line) {
            InputAction::Submit(text) => {
                match submit(&chat, &api, auth.current().as_ref(), &text).await {
                    Ok(Submission::HttpFallback(_)) => {
                        eprintln!("(sent over HTTP; the reply arrives once the chat reconnects)");
                    }
                    Ok(Submission::Realtime | Submission::Ignored) => {}
                    Err(e) => eprintln!("could not send: {e}"),
                }
            }
            InputAction::Typing(is_typing) => chat.send_typing_status(is_typing)?,
            InputAction::Reconnect => chat.reconnect()?,
            InputAction::Login(token) => auth.set(Credential::new(token)),
            InputAction::Logout => auth.clear(),
            InputAction::Help => eprintln!("{}", input::HELP),
            InputAction::Quit => break,
            InputAction::Invalid(reason) => eprintln!("{reason}"),
        }
    }

    chat.shutdown().await;
    printer.await.context("printer task failed")?;
    Ok(())
}

/// Print new conversation lines and status changes until the manager stops.
async fn print_updates(mut updates: watch::Receiver<ChatSnapshot>) {
    let mut cursor = render::LogCursor::default();
    let mut was_typing = false;
    let mut last_status = String::new();

    loop {
        let snapshot = updates.borrow_and_update().clone();

        for entry in cursor.advance(snapshot.messages.entries()) {
            println!("{}", render::format_entry(entry));
        }

        if snapshot.is_typing && !was_typing {
            eprintln!("SerenAI is typing...");
        }
        was_typing = snapshot.is_typing;

        let status = render::status_line(&snapshot);
        if status != last_status {
            eprintln!("{status}");
            last_status = status;
        }

        if updates.changed().await.is_err() {
            break;
        }
    }
}
