mod ai;
mod auth;
mod browser;
mod config;
mod error;
mod files;
mod generate;
mod github;
mod publisher;
mod server;
mod session;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use ai::GeminiModel;
use config::Config;
use github::GitHubClient;

/// Test Case Generator: browse GitHub repositories, have an AI model propose
/// and write tests for selected source files, and open a pull request with them.
#[derive(Parser, Debug)]
#[command(name = "test-case-generator", version, about)]
struct Cli {
    /// Path to the configuration file (defaults to .test-case-generator.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API server
    Serve {
        /// Address to listen on, overriding the configuration
        #[arg(short, long)]
        bind: Option<SocketAddr>,
    },

    /// Generate a test for files in a repository from the terminal
    Generate(generate::GenerateArgs),
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    info!("loading configuration");
    if let Some(path) = cli.config.as_deref() {
        if !path.exists() {
            return Err(format!("config file not found: {}", path.display()).into());
        }
    }
    let mut config = Config::load(cli.config.as_deref())?;

    let hosting = GitHubClient::new(&config)?;
    let model = GeminiModel::new(&config)?;

    match cli.command {
        Command::Serve { bind } => {
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            info!(
                bind = %config.server.bind,
                origin = %config.server.allowed_origin,
                development = config.server.development,
                "starting server"
            );
            let state = server::AppState::new(config, Arc::new(hosting), Arc::new(model));
            server::serve(state).await?;
        }
        Command::Generate(args) => {
            let outcome = generate::run(&args, &config, &hosting, &model).await?;
            match &outcome.pull {
                Some(pull) => info!(
                    test_file = %outcome.generated.test_file_name,
                    pull = pull.number,
                    url = %pull.url,
                    "done"
                ),
                None => info!(test_file = %outcome.generated.test_file_name, "done"),
            }
        }
    }

    Ok(())
}
