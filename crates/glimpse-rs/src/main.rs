//! Command-line front end for the Glimpse assistant.

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use futures_util::StreamExt;
use glimpse_rs::config::{GlimpseConfig, LayeredConfigOptions};
use glimpse_rs::core::Assistant;
use glimpse_rs::protocol::{AskRequest, EventMsg, EventPayload, EventSink, RequestEnvelope};
use log::{debug, info, warn};
use parking_lot::Mutex;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinSet;

/// Command-line options for the Glimpse client.
#[derive(Debug, Parser)]
#[command(name = "glimpse", version)]
struct Cli {
    /// Extra glimpse.json5 layer applied after the user and cwd layers
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Ask a question and stream the answer to stdout
    Ask {
        question: String,
        /// File whose text is used as the page context
        #[arg(long)]
        context_file: Option<PathBuf>,
        /// Conversation key
        #[arg(long, default_value = "cli")]
        key: String,
        /// Start a fresh conversation
        #[arg(long)]
        new: bool,
    },
    /// Save a snippet into memory
    Save {
        text: String,
        /// Page the snippet came from
        #[arg(long, default_value = "")]
        source: String,
    },
    /// List saved memories, newest first
    List,
    /// Delete a saved memory by id
    Delete { id: u64 },
    /// Read request envelopes from stdin and write events to stdout, one JSON object per line
    Serve,
}

/// Writes events to stdout as JSON lines.
struct StdoutSink {
    stdout: Mutex<io::Stdout>,
}

impl EventSink for StdoutSink {
    fn emit(&self, event: EventMsg) {
        let line = match serde_json::to_string(&event) {
            Ok(line) => line,
            Err(err) => {
                warn!("failed to encode event (err={})", err);
                return;
            }
        };
        let mut stdout = self.stdout.lock();
        if let Err(err) = writeln!(stdout, "{line}").and_then(|_| stdout.flush()) {
            warn!("failed to write event (err={})", err);
        }
    }
}

/// Entry point for the Glimpse CLI.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    glimpse_rs::init_logging();
    let cli = Cli::parse();
    info!("starting glimpse (config_set={})", cli.config.is_some());

    let config = load_config(cli.config.as_deref())?;
    let assistant = Assistant::builder(config)
        .build()
        .context("failed to initialize assistant")?;

    match cli.command {
        Command::Ask {
            question,
            context_file,
            key,
            new,
        } => {
            let page_context = match context_file {
                Some(path) => std::fs::read_to_string(&path)
                    .with_context(|| format!("failed to read {}", path.display()))?,
                None => String::new(),
            };
            run_ask(
                &assistant,
                AskRequest {
                    key,
                    question,
                    page_context,
                    is_new_search: new,
                },
            )
            .await
        }
        Command::Save { text, source } => {
            let id = assistant
                .save(&text, &source)
                .await
                .context("failed to save memory")?;
            println!("{id}");
            Ok(())
        }
        Command::List => {
            for record in assistant.list_memories().await {
                println!(
                    "{}\t{}\t{}\t{}",
                    record.id,
                    record.created_at.to_rfc3339(),
                    record.source_url,
                    record.text
                );
            }
            Ok(())
        }
        Command::Delete { id } => {
            if assistant
                .delete_memory(id)
                .await
                .context("failed to delete memory")?
            {
                println!("deleted {id}");
            } else {
                println!("no memory with id {id}");
            }
            Ok(())
        }
        Command::Serve => serve(assistant).await,
    }
}

/// Load the layered config with an optional runtime override.
fn load_config(runtime_path: Option<&Path>) -> anyhow::Result<GlimpseConfig> {
    let cwd = std::env::current_dir().context("failed to resolve current working directory")?;
    let mut options = LayeredConfigOptions::new(&cwd);
    if let Some(path) = runtime_path {
        options = options.with_runtime_path(path);
    }
    let layered = GlimpseConfig::load_layered_with_options(options)
        .context("failed to load layered config")?;
    debug!("layered config loaded (layers={})", layered.layers.len());
    Ok(layered.config)
}

async fn run_ask(assistant: &Assistant, request: AskRequest) -> anyhow::Result<()> {
    let mut stream = assistant.ask(request).await.context("ask rejected")?;
    let mut stdout = io::stdout();
    while let Some(event) = stream.events.next().await {
        if let EventPayload::AnswerDelta { delta, .. } = event.payload {
            write!(stdout, "{delta}").context("failed to write answer")?;
            stdout.flush().context("failed to flush answer")?;
        }
    }
    writeln!(stdout).context("failed to write answer")?;
    if let Err(err) = stream.finish().await {
        bail!("ask failed: {err}");
    }
    Ok(())
}

/// JSON-lines bridge: one request envelope per stdin line, events on stdout.
async fn serve(assistant: Assistant) -> anyhow::Result<()> {
    let sink: Arc<dyn EventSink> = Arc::new(StdoutSink {
        stdout: Mutex::new(io::stdout()),
    });
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut tasks = JoinSet::new();
    info!("serving requests on stdin");
    while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
        if line.trim().is_empty() {
            continue;
        }
        let envelope: RequestEnvelope = match serde_json::from_str(&line) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!("rejecting malformed request (err={})", err);
                sink.emit(EventMsg::new(
                    None,
                    EventPayload::Error {
                        message: format!("malformed request: {err}"),
                    },
                ));
                continue;
            }
        };
        tasks.spawn(assistant.admit(envelope, sink.clone()).await);
    }
    while let Some(joined) = tasks.join_next().await {
        if let Err(err) = joined {
            warn!("request task failed (err={})", err);
        }
    }
    info!("stdin closed, shutting down");
    Ok(())
}
