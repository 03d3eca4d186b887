use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use ratequeue::queue::StatusFormat;

mod cli;

#[derive(Parser)]
#[command(name = "ratequeue")]
#[command(about = "Rate-limited task queue for token-budgeted LLM APIs", long_about = None)]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Drive a prompt file through the queue with a simulated processor
    Run {
        /// Prompt file (plain text, or .json/.jsonl)
        file: PathBuf,
        /// Rate-limit profile: chat or embeddings
        #[arg(short, long, default_value = "chat")]
        profile: String,
        /// Config file (defaults to ~/.config/ratequeue/config.json when present)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Model name recorded on each task
        #[arg(short, long)]
        model: Option<String>,
        /// Simulated latency of each call
        #[arg(long, default_value_t = 250)]
        latency_ms: u64,
        /// Completion tokens reserved per chat prompt
        #[arg(long, default_value_t = 256)]
        max_tokens: u64,
        /// Final status format
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Print the effective configuration as JSON
    Config {
        /// Rate-limit profile: chat or embeddings
        #[arg(short, long, default_value = "chat")]
        profile: String,
        /// Config file to load instead of the default
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Show version information
    Version,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

impl From<OutputFormat> for StatusFormat {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Text => StatusFormat::Text,
            OutputFormat::Json => StatusFormat::Json,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Initialize logging
    if cli.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(EnvFilter::from_default_env())
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .init();
    }

    match cli.command {
        Some(Commands::Version) | None => {
            println!("ratequeue {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Run {
            file,
            profile,
            config,
            model,
            latency_ms,
            max_tokens,
            format,
        }) => {
            cli::run::cmd_run(cli::run::RunArgs {
                file,
                profile,
                config,
                model,
                latency_ms,
                max_tokens,
                format: format.into(),
            })
            .await?;
        }
        Some(Commands::Config { profile, config }) => {
            cli::config::cmd_config(profile, config)?;
        }
    }

    Ok(())
}
