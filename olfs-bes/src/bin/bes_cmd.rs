use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::AsyncWriteExt;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use olfs_bes::ppt::{Client, TransportConfig};

#[derive(Parser)]
#[command(name = "bes-cmd")]
#[command(about = "Send commands to a BES over PPT", long_about = None)]
struct Cli {
    /// BES host
    #[arg(long, default_value = "localhost")]
    host: String,

    /// BES port
    #[arg(short, long, default_value_t = 10022)]
    port: u16,

    /// Give up if a response takes longer than this many seconds
    #[arg(long)]
    timeout: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the BES accepts connections
    Ping,

    /// Run a `;`-separated command list
    Exec {
        /// Commands to run (omit to read them from --file)
        commands: Option<String>,

        /// Read commands from a file
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let mut config = TransportConfig::from_env();
    if let Some(secs) = cli.timeout {
        config.read_timeout = Some(Duration::from_secs(secs));
    }
    config.validate().map_err(anyhow::Error::msg)?;

    let mut client = Client::connect_with_config(&cli.host, cli.port, config)
        .await
        .with_context(|| format!("could not connect to BES at {}:{}", cli.host, cli.port))?;

    match cli.command {
        Commands::Ping => {
            println!("BES at {} is ready", client.peer());
            client.close(true).await?;
        }

        Commands::Exec { commands, file } => {
            let commands = match (commands, file) {
                (Some(commands), _) => commands,
                (None, Some(path)) => tokio::fs::read_to_string(&path)
                    .await
                    .with_context(|| format!("could not read {:?}", path))?,
                (None, None) => {
                    client.close(true).await?;
                    bail!("no commands given; pass them as an argument or with --file");
                }
            };

            let mut stdout = tokio::io::stdout();
            let mut stderr = tokio::io::stderr();
            let outcome = client
                .execute_commands(&commands, &mut stdout, &mut stderr)
                .await;
            stdout.flush().await?;
            stderr.flush().await?;

            info!(commands = client.commands_sent(), "Finished");
            client.close(true).await?;

            if !outcome? {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
