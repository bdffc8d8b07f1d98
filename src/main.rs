//! webmcp - MCP tool services behind an HTTP/SSE API.
//!
//! This binary launches the server and offers a few maintenance commands
//! around configuration and API keys.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use webmcp::auth::AuthManager;
use webmcp::config::Config;
use webmcp::server::Server;
use webmcp::service::AVAILABLE_SERVICES;

/// MCP tool services behind an HTTP/SSE API.
#[derive(Parser, Debug)]
#[command(name = "webmcp")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the webmcp server.
    Serve {
        /// Configuration file path.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Server host override.
        #[arg(long)]
        host: Option<String>,
        /// Server port override.
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Write a default configuration file.
    InitConfig {
        /// Output configuration file.
        #[arg(short, long, default_value = "config.yaml")]
        output: PathBuf,
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
    },
    /// List available services.
    ListServices,
    /// Create a new API key.
    CreateKey {
        /// API key name.
        name: String,
        /// Expiration in days.
        #[arg(short, long)]
        expires: Option<i64>,
        /// Configuration file path.
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Show version information.
    Version,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    match run(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command) -> anyhow::Result<()> {
    match command {
        Command::Serve { config, host, port } => {
            let config = Config::load(config.as_deref())?;
            let server = Server::new(config);
            server.run(host, port).await?;
        }
        Command::InitConfig { output, force } => {
            if output.exists() && !force {
                anyhow::bail!(
                    "Configuration file already exists: {}. Use --force to overwrite.",
                    output.display()
                );
            }
            Config::default_config().save(&output)?;
            println!("Configuration file created: {}", output.display());
            println!("A default API key is minted and logged on every `webmcp serve` start.");
        }
        Command::ListServices => {
            let descriptions = [
                ("browseruse", "Web browser automation over WebDriver"),
                ("web_search", "Google search via the Serper API"),
                ("web_crawler", "Webpage content extraction"),
            ];
            println!("Available services:");
            for name in AVAILABLE_SERVICES {
                let description = descriptions
                    .iter()
                    .find(|(n, _)| *n == name)
                    .map(|(_, d)| *d)
                    .unwrap_or("");
                println!("  {name:<12} {description}");
            }
        }
        Command::CreateKey {
            name,
            expires,
            config,
        } => {
            let config = Config::load(config.as_deref())?;
            let auth = AuthManager::new(config.auth);
            let token = auth.create_api_key(&name, expires, None).await;

            println!("API key created:");
            println!("  Name: {name}");
            println!("  Key:  {token}");
            if let Some(days) = expires {
                println!("  Expires in: {days} days");
            }
            println!("Note: keys live in server memory; a running server mints its own.");
        }
        Command::Version => {
            println!("webmcp version {}", env!("CARGO_PKG_VERSION"));
        }
    }
    Ok(())
}
