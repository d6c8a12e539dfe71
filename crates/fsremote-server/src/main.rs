//! fs-remote server binary
//!
//! Exposes the local filesystem to fs-remote clients.
//!
//! ## Usage
//!
//! ```bash
//! fsremote-server                               # listen on 127.0.0.1:7878
//! fsremote-server --bind 0.0.0.0:7878
//! fsremote-server --config /etc/fsremote/server.toml
//! RUST_LOG=fsremote_server=debug fsremote-server
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use fsremote_server::{RpcServer, ServerConfig};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "fsremote-server", version, about = "Serve the local filesystem to fs-remote clients")]
struct Cli {
    /// Address for the main channel (overrides the config file).
    #[arg(long)]
    bind: Option<String>,

    /// TOML config file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host that side-channel sockets bind to.
    #[arg(long)]
    side_channel_host: Option<String>,
}

impl Cli {
    fn resolve(self) -> anyhow::Result<ServerConfig> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::load(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => ServerConfig::default(),
        };
        if let Some(bind) = self.bind {
            config.bind = bind;
        }
        if let Some(host) = self.side_channel_host {
            config.side_channel_host = host;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("server error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = cli.resolve()?;
    let server = RpcServer::bind(&config).await?;

    let shutdown = server.shutdown_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("received shutdown signal");
            shutdown.cancel();
        }
    });

    server.run().await?;
    Ok(())
}
