mod subcommands;


use crate::config::{Config, load_config};
use crate::engine::ConversationService;
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "charmcrab")]
#[command(about = "Persona chat response engine")]
pub struct Cli {
    /// Path to config.json (defaults to ~/.charmcrab/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    /// Send messages as a user (reads stdin lines when --message is omitted)
    Chat {
        #[arg(short, long)]
        user: String,
        #[arg(short, long)]
        message: Option<String>,
    },
    /// Teach a question/answer pair
    Train {
        #[arg(short, long)]
        question: String,
        #[arg(short, long)]
        answer: String,
        /// Language code (defaults to the configured persona language)
        #[arg(short, long)]
        language: Option<String>,
    },
    /// Show conversation and knowledge statistics
    Stats,
    /// Forget a user's funnel progress and history
    Reset {
        #[arg(short, long)]
        user: String,
    },
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve { host, port } => {
            subcommands::serve(config, host, port).await?;
        }
        Commands::Chat { user, message } => {
            subcommands::chat(&config, &user, message).await?;
        }
        Commands::Train {
            question,
            answer,
            language,
        } => {
            subcommands::train(&config, &question, &answer, language.as_deref()).await?;
        }
        Commands::Stats => {
            subcommands::stats(&config).await?;
        }
        Commands::Reset { user } => {
            subcommands::reset(&config, &user).await?;
        }
    }

    Ok(())
}

/// Open the service and bootstrap its similarity index.
async fn setup_service(config: &Config) -> Result<Arc<ConversationService>> {
    let service = Arc::new(ConversationService::open(config)?);
    service.initialize().await;
    Ok(service)
}
