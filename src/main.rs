//! codeforge — local AI-assisted coding agent
//!
//! Usage:
//!   codeforge                      → interactive chat in the current repo
//!   codeforge ask "question"       → one-shot request
//!   codeforge tools                → list registered tools
//!   codeforge health               → check the model endpoint
//!   codeforge cleanup-backups      → remove old edit backups

use clap::{Parser, Subcommand};
use codeforge_agent::AgentKernel;
use codeforge_core::{AssistantConfig, Outcome};
use codeforge_llm::{LlmProvider, OllamaProvider};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const EXIT_OK: i32 = 0;
const EXIT_USER: i32 = 1;
const EXIT_VALIDATION: i32 = 2;
const EXIT_TOOL: i32 = 3;
const EXIT_CANCELLED: i32 = 130;

#[derive(Parser)]
#[command(
    name = "codeforge",
    about = "Local AI-assisted coding agent backed by an Ollama endpoint",
    version = env!("CARGO_PKG_VERSION")
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Project root (defaults to the current directory)
    #[arg(short, long, global = true)]
    root: Option<PathBuf>,

    /// Model name override
    #[arg(short, long, global = true)]
    model: Option<String>,

    /// Inference endpoint override, e.g. http://localhost:11434
    #[arg(short, long, global = true)]
    base_url: Option<String>,

    /// Config file (defaults to ~/.codeforge/config.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Write logs to a file (in addition to stderr)
    #[arg(long, global = true)]
    log_file: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive chat session (the default)
    Chat,
    /// One-shot request
    Ask {
        /// The request text
        prompt: Vec<String>,
    },
    /// List registered tools
    Tools,
    /// Check connectivity to the model endpoint
    Health,
    /// Remove edit backups older than the given age
    CleanupBackups {
        /// Maximum age in hours
        #[arg(long, default_value = "168")]
        max_age_hours: u64,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.log_file.as_deref());

    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {}", e);
            EXIT_VALIDATION
        }
    };
    std::process::exit(code);
}

fn init_tracing(log_file: Option<&str>) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("codeforge=info"));
    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    if let Some(path) = log_file {
        let path = std::path::Path::new(path);
        let appender = tracing_appender::rolling::never(
            path.parent().unwrap_or_else(|| std::path::Path::new(".")),
            path.file_name()
                .unwrap_or_else(|| std::ffi::OsStr::new("codeforge.log")),
        );
        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(appender)
            .with_ansi(false);
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

async fn run(cli: Cli) -> anyhow::Result<i32> {
    let mut config = match &cli.config {
        Some(path) => AssistantConfig::load(path)?,
        None => AssistantConfig::load_or_default(&AssistantConfig::default_dir())?,
    };
    if let Some(model) = cli.model {
        config.model = model;
    }
    if let Some(base_url) = cli.base_url {
        config.base_url = base_url;
    }

    let root = match cli.root {
        Some(root) => root,
        None => std::env::current_dir()?,
    };

    match cli.command.unwrap_or(Commands::Chat) {
        Commands::Health => {
            let provider = OllamaProvider::new(&config.model).with_base_url(&config.base_url);
            if provider.test_connection().await {
                println!("{} is reachable at {}", provider.name(), config.base_url);
                Ok(EXIT_OK)
            } else {
                println!("no response from {}", config.base_url);
                Ok(EXIT_TOOL)
            }
        }
        Commands::Tools => {
            let registry = codeforge_tools::create_default_registry()?;
            for meta in registry.list() {
                println!(
                    "{:<14} {:<10} v{}  {}",
                    meta.name, meta.category, meta.version, meta.description
                );
            }
            Ok(EXIT_OK)
        }
        Commands::CleanupBackups { max_age_hours } => {
            let kernel = AgentKernel::new(config, &root).await?;
            let removed = kernel
                .editor()
                .cleanup_backups(std::time::Duration::from_secs(max_age_hours * 3600))
                .await?;
            println!("removed {} backup file(s)", removed);
            Ok(EXIT_OK)
        }
        Commands::Ask { prompt } => {
            if prompt.is_empty() {
                eprintln!("usage: codeforge ask <prompt>");
                return Ok(EXIT_USER);
            }
            let kernel = AgentKernel::new(config, &root).await?;
            let response = kernel.handle_message(&prompt.join(" ")).await;
            println!("{}", response);
            Ok(exit_code_for_last_turn(&kernel).await)
        }
        Commands::Chat => chat_loop(config, root).await,
    }
}

async fn chat_loop(config: AssistantConfig, root: PathBuf) -> anyhow::Result<i32> {
    let kernel = AgentKernel::new(config, &root).await?;
    println!(
        "codeforge — session {} in {}. Type 'exit' to quit.",
        kernel.session_id(),
        root.display()
    );

    // live token printer for streamed conversational replies
    let (tx, mut rx) = tokio::sync::mpsc::channel::<String>(64);
    kernel.set_stream_sink(Some(tx)).await;
    let printer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(token) = rx.recv().await {
            let _ = stdout.write_all(token.as_bytes()).await;
            let _ = stdout.flush().await;
        }
    });

    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();
    let exit_code;

    loop {
        {
            use std::io::Write;
            print!("> ");
            std::io::stdout().flush()?;
        }

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                kernel.cancel().await;
                println!("\ninterrupted");
                exit_code = EXIT_CANCELLED;
                break;
            }
        };

        let Some(line) = line else {
            exit_code = EXIT_OK;
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input == "exit" || input == "quit" {
            exit_code = EXIT_OK;
            break;
        }

        let response = tokio::select! {
            response = kernel.handle_message(input) => response,
            _ = tokio::signal::ctrl_c() => {
                kernel.cancel().await;
                println!("\ncancelled");
                continue;
            }
        };
        // conversational tokens streamed above; a trailing newline plus the
        // full text covers command and plan replies
        println!("\n{}", response);
    }

    kernel.set_stream_sink(None).await;
    printer.abort();
    Ok(exit_code)
}

async fn exit_code_for_last_turn(kernel: &AgentKernel) -> i32 {
    match kernel.recent_turns(1).await.first().map(|t| t.outcome) {
        Some(Outcome::Success | Outcome::Pending) => EXIT_OK,
        Some(Outcome::Partial | Outcome::Failure) => EXIT_TOOL,
        None => EXIT_USER,
    }
}
