//! FrameArt command-line entry point.

mod commands;
mod config;

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use commands::Command;
use config::CliConfig;
use frameart_client::ArtClient;

#[derive(Debug, Parser)]
#[command(name = "frameart")]
#[command(about = "Control the art mode of a Samsung Frame TV")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, env = "FRAMEART_CONFIG")]
    config: Option<PathBuf>,

    /// Device address (overrides config file)
    #[arg(long, env = "FRAMEART_HOST")]
    host: Option<String>,

    /// Control port, 8002 for TLS or 8001 for plain (overrides config file)
    #[arg(long, env = "FRAMEART_PORT")]
    port: Option<u16>,

    /// Pairing token (overrides config file)
    #[arg(long, env = "FRAMEART_TOKEN")]
    token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so command output stays parseable.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    tracing::debug!(version = env!("CARGO_PKG_VERSION"), "starting frameart");

    let mut config = CliConfig::load(cli.config.as_deref())?;
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(token) = cli.token {
        config.token = Some(token);
    }

    if let Command::InitConfig = cli.command {
        let path = config.save(cli.config.as_deref())?;
        println!("{}", path.display());
        return Ok(());
    }

    let client = ArtClient::new(config.art_config()?);
    tracing::info!(host = %config.host, port = config.port, "using device");

    let result = commands::run(&client, cli.command).await;
    client.close().await;
    result
}
