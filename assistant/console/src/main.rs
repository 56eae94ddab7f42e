//! Assistant Console
//!
//! Line-oriented terminal surface for the assistant chat. Each input line is
//! submitted as one message and the reply is printed as it streams in.
//!
//! # Usage
//!
//! ```bash
//! assistant-console --base-url http://localhost:3000
//! ```
//!
//! Ctrl-C cancels the reply in flight. `/quit` or end of input exits.
//!
//! # Environment Variables
//!
//! - `ASSISTANT_BASE_URL`: backend origin (default `http://localhost:3000`)
//! - `ASSISTANT_RESPONSE_TIMEOUT_MS`: response deadline, 0 disables it
//! - `ASSISTANT_CONNECT_TIMEOUT_MS`: TCP connect timeout
//! - `ASSISTANT_DECODE_MODE`: `strict` or `lossy`
//! - `RUST_LOG`: log filter (logs go to stderr)

use std::collections::HashMap;
use std::future::Future;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tokio::sync::mpsc;
use tracing::{info, warn};

use assistant_core::{
    ChatConfig, ChatController, ChatEvent, CycleOutcome, DecodeMode, HttpTransport,
    MessageHandle, SubmitError,
};

/// Command line flags; each overrides the file and environment layers
#[derive(Debug, Parser)]
#[command(name = "assistant-console", version, about)]
struct Cli {
    /// Config file (default: $XDG_CONFIG_HOME/assistant/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Backend origin, e.g. http://localhost:3000
    #[arg(long)]
    base_url: Option<String>,

    /// Response deadline in milliseconds (0 disables it)
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// How to treat invalid UTF-8 in replies (strict or lossy)
    #[arg(long)]
    decode_mode: Option<DecodeMode>,
}

impl Cli {
    fn apply(self, config: &mut ChatConfig) {
        if let Some(base_url) = self.base_url {
            config.base_url = base_url;
        }
        if let Some(ms) = self.timeout_ms {
            config.response_timeout = (ms > 0).then(|| Duration::from_millis(ms));
        }
        if let Some(mode) = self.decode_mode {
            config.decode_mode = mode;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("assistant_console=info".parse()?)
                .add_directive("assistant_core=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();

    let mut cli = Cli::parse();
    let mut config = ChatConfig::load(cli.config.take().as_deref())
        .context("Failed to load configuration")?;
    cli.apply(&mut config);
    config.validate()?;

    info!(endpoint = %config.endpoint_url(), decode_mode = %config.decode_mode, "Starting console");

    let transport = HttpTransport::from_config(&config)?;
    let mut controller = ChatController::new(transport, config);
    let events = controller.subscribe();
    let controller = Arc::new(controller);

    let printer = tokio::spawn(print_events(events));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = next_command(&mut lines, tokio::signal::ctrl_c()).await? {
        let submit = controller.submit(line);
        tokio::pin!(submit);

        let result = loop {
            tokio::select! {
                result = &mut submit => break result,
                signal = tokio::signal::ctrl_c() => {
                    signal?;
                    if controller.cancel() {
                        info!("Cancelling reply");
                    }
                }
            }
        };

        match result {
            Ok(CycleOutcome::Completed { chunks, .. }) => {
                tracing::debug!(chunks, "Reply complete");
            }
            Ok(CycleOutcome::Failed { error }) => warn!(error = %error, "Reply failed"),
            Err(SubmitError::Empty) => {}
            Err(e @ SubmitError::Busy { .. }) => warn!(error = %e, "Message not sent"),
        }
    }

    // The printer ends once the controller and its sender are gone
    drop(controller);
    printer.await?;

    info!("Console stopped");
    Ok(())
}

/// Next non-empty input line
///
/// `None` on end of input, `/quit`, or when `interrupt` fires first. Once
/// Ctrl-C has been hooked for cancelling a reply the default SIGINT exit is
/// gone, so the prompt has to listen for it too.
async fn next_command<R, F>(lines: &mut Lines<R>, interrupt: F) -> Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
    F: Future<Output = std::io::Result<()>>,
{
    tokio::pin!(interrupt);

    loop {
        let line = tokio::select! {
            biased;
            signal = &mut interrupt => {
                signal?;
                info!("Interrupted");
                return Ok(None);
            }
            line = lines.next_line() => line?,
        };

        let Some(line) = line else {
            return Ok(None);
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "/quit" {
            return Ok(None);
        }
        return Ok(Some(line.to_string()));
    }
}

/// Render controller events to stdout
///
/// Streaming updates carry the full text so far; only the new suffix is
/// printed.
async fn print_events(mut events: mpsc::Receiver<ChatEvent>) {
    let mut printed: HashMap<MessageHandle, usize> = HashMap::new();
    let mut stdout = std::io::stdout();

    while let Some(event) = events.recv().await {
        match event {
            ChatEvent::MessageAppended { message } if !message.is_user => {
                if message.streaming {
                    printed.insert(message.handle, 0);
                    let _ = write!(stdout, "assistant> ");
                } else {
                    let _ = writeln!(stdout, "assistant> {}", message.text);
                }
            }
            ChatEvent::MessageUpdated { handle, text } => {
                if let Some(len) = printed.get_mut(&handle) {
                    if let Some(suffix) = text.get(*len..) {
                        let _ = write!(stdout, "{suffix}");
                    }
                    *len = text.len();
                }
            }
            ChatEvent::MessageFinalized { handle } => {
                if printed.remove(&handle).is_some() {
                    let _ = writeln!(stdout);
                }
            }
            _ => {}
        }
        let _ = stdout.flush();
    }
}
