use anyhow::{Context, Result};
use chatbubble_core::logging::{self, LogGuard, LoggingConfig};
use chatbubble_core::{Config, Message};
use chatbubble_engine::{ConversationEngine, RejectReason, SubmitOutcome, TurnOutcome};
use chatbubble_store::HistoryStore;
use chatbubble_ui::{HtmlTranscript, ReplayRenderer, TerminalTranscript, TranscriptSink};
use clap::{Parser, Subcommand};
use owo_colors::OwoColorize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

const DEFAULT_CONFIG_PATH: &str = "chatbubble.toml";

/// chatbubble - a persistent chat widget for the terminal
#[derive(Parser, Debug)]
#[command(name = "chatbubble")]
#[command(about = "Chat with a conversational backend, keeping a bounded history between runs", long_about = None)]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to the configuration file (default: ./chatbubble.toml)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start an interactive chat session
    Chat,
    /// Send a single message and print the reply
    Send {
        #[arg(required = true, value_name = "TEXT")]
        text: Vec<String>,
    },
    /// Print the stored conversation
    History {
        /// Print the stored JSON records instead of a transcript
        #[arg(long)]
        json: bool,
    },
    /// Delete the stored conversation and re-seed the welcome message
    Clear {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Render the stored conversation to a standalone HTML page
    Export {
        #[arg(short, long, value_name = "FILE")]
        out: PathBuf,
    },
    /// Write an example configuration file
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

    if let Commands::Init { force } = cli.command {
        return cmd_init(&config_path, force);
    }

    let config = load_config(&config_path, cli.config.is_some())?;
    let _guard = init_logging(&config, cli.verbose)?;

    if cli.verbose {
        println!("{} Storage: {}", "Info:".blue().bold(), config.history.storage.cyan());
        println!("{} Provider: {}", "Info:".blue().bold(), config.provider.name().cyan());
    }

    match cli.command {
        Commands::Chat => cmd_chat(&config).await,
        Commands::Send { text } => cmd_send(&config, &text.join(" ")).await,
        Commands::History { json } => cmd_history(&config, json).await,
        Commands::Clear { yes } => cmd_clear(&config, yes).await,
        Commands::Export { out } => cmd_export(&config, &out).await,
        Commands::Init { .. } => Ok(()),
    }
}

/// Load the config file; a missing default file means built-in defaults
fn load_config(path: &Path, explicit: bool) -> Result<Config> {
    if !path.exists() && !explicit {
        return Ok(Config::default());
    }

    Config::from_file(path).with_context(|| format!("Failed to load config from {}", path.display()))
}

fn init_logging(config: &Config, verbose: bool) -> Result<LogGuard> {
    let mut logging_config = LoggingConfig::from(config.logging.clone());
    if verbose {
        logging_config = logging_config.with_level("debug");
    }
    logging::init_logging(Some(logging_config)).context("Failed to initialize logging")
}

fn use_color() -> bool {
    atty::is(atty::Stream::Stdout)
}

fn terminal_sink(config: &Config) -> Arc<dyn TranscriptSink> {
    Arc::new(TerminalTranscript::stdout(&config.widget.title).with_color(use_color()))
}

fn cmd_init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
    }

    std::fs::write(path, Config::example()).context("Failed to write config")?;
    println!("{} Created config at {}", "Success:".green().bold(), path.display());
    Ok(())
}

async fn cmd_chat(config: &Config) -> Result<()> {
    let engine = ConversationEngine::from_config(config, terminal_sink(config))
        .await
        .context("Failed to start conversation")?;

    engine.initialize().await;
    engine.open().await.wait().await;

    println!(
        "{}",
        "Type a message, or /open, /close, /clear, /history, /quit".dimmed()
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match line.trim() {
            "/quit" | "/exit" => break,
            "/open" => {
                engine.open().await.wait().await;
            }
            "/close" => {
                engine.close();
                println!("{}", "Chat closed. /open to show it again.".dimmed());
            }
            "/clear" => {
                if confirm_async(&mut lines, "Are you sure you want to clear the chat history?").await?
                    && !engine.clear_history().await
                {
                    println!("{} Could not clear chat history", "Warning:".yellow().bold());
                }
            }
            "/history" => print_history(&engine.history().await),
            input => {
                if !engine.is_open() {
                    engine.open().await.wait().await;
                }

                match engine.submit(input).await {
                    SubmitOutcome::Dispatched(turn) => {
                        turn.wait().await;
                    }
                    SubmitOutcome::Rejected(reason) => {
                        tracing::debug!(%reason, "Input ignored");
                        if let Some(hint) = rejection_hint(reason) {
                            println!("{}", hint.dimmed());
                        }
                    }
                }
            }
        }
    }

    engine.shutdown();
    Ok(())
}

async fn confirm_async(lines: &mut Lines<BufReader<Stdin>>, question: &str) -> Result<bool> {
    print!("{} [y/N] ", question);
    std::io::stdout().flush()?;

    let answer = lines.next_line().await?.unwrap_or_default();
    Ok(is_yes(&answer))
}

fn confirm(question: &str) -> Result<bool> {
    print!("{} [y/N] ", question);
    std::io::stdout().flush()?;

    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    Ok(is_yes(&answer))
}

/// What to tell the user when a chat line is refused
fn rejection_hint(reason: RejectReason) -> Option<&'static str> {
    match reason {
        RejectReason::EmptyInput => None,
        RejectReason::DuplicateSender => {
            Some("Still waiting on a reply to your last message. /clear to start over.")
        }
        RejectReason::AwaitingReply => Some("Still waiting on a reply."),
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

async fn cmd_send(config: &Config, text: &str) -> Result<()> {
    let engine = ConversationEngine::from_config(config, terminal_sink(config))
        .await
        .context("Failed to start conversation")?;
    engine.initialize().await;

    let turn = match engine.submit(text).await {
        SubmitOutcome::Dispatched(turn) => turn,
        SubmitOutcome::Rejected(reason) => anyhow::bail!("Message not sent: {}", reason),
    };

    let report = turn.wait().await;
    if report.outcome != TurnOutcome::Replied {
        anyhow::bail!("No reply from the backend ({:?})", report.outcome);
    }

    Ok(())
}

async fn open_store(config: &Config) -> Result<HistoryStore> {
    HistoryStore::from_config(&config.history, &config.widget.welcome_message)
        .await
        .context("Failed to open history storage")
}

async fn cmd_history(config: &Config, json: bool) -> Result<()> {
    let store = open_store(config).await?;
    let history = store.load().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&history)?);
    } else if history.is_empty() {
        println!("{}", "No stored messages".dimmed());
    } else {
        print_history(&history);
    }

    Ok(())
}

fn print_history(history: &[Message]) {
    for msg in history {
        let stamp = msg.timestamp.format("%Y-%m-%d %H:%M:%S").to_string();
        let sender = if msg.is_user { "you".cyan().bold().to_string() } else { "bot".green().bold().to_string() };
        println!("{:>3} {} {} {}", msg.order, stamp.dimmed(), sender, msg.text);
    }
}

async fn cmd_clear(config: &Config, yes: bool) -> Result<()> {
    if !yes && !confirm("Are you sure you want to clear the chat history?")? {
        println!("{}", "Aborted".dimmed());
        return Ok(());
    }

    let store = open_store(config).await?;
    if !store.clear().await {
        anyhow::bail!("Could not clear chat history");
    }

    println!("{} Chat history cleared", "Success:".green().bold());
    Ok(())
}

async fn cmd_export(config: &Config, out: &Path) -> Result<()> {
    let store = open_store(config).await?;
    store.initialize().await;

    let html = Arc::new(HtmlTranscript::new(&config.widget.title));
    let renderer = ReplayRenderer::new(html.clone() as Arc<dyn TranscriptSink>).with_delay(Duration::ZERO);
    let report = renderer.render(store.load().await).wait().await;

    std::fs::write(out, html.document()).with_context(|| format!("Failed to write {}", out.display()))?;
    println!(
        "{} Exported {} messages to {}",
        "Success:".green().bold(),
        report.emitted,
        out.display()
    );
    Ok(())
}
