use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use edge_node::config::NodeConfig;
use edge_node::error::ServerError;
use edge_node::router::Router;
use edge_node::server::Listener;
use edge_node::status;
use tracing::{error, info, warn};
use tracing_subscriber::FmtSubscriber;

/// Edge cache node connection server.
#[derive(Debug, Parser)]
#[command(name = "edge-node", version)]
struct Args {
    /// TOML configuration file, defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Overrides the configured listen address.
    #[arg(short, long)]
    listen: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => match NodeConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("edge-node: {e}");
                return ExitCode::FAILURE;
            }
        },
        None => NodeConfig::default(),
    };
    if let Some(listen) = args.listen {
        config.listen = listen;
    }

    let level = match config.log_level() {
        Ok(level) => level,
        Err(e) => {
            eprintln!("edge-node: {e}");
            return ExitCode::FAILURE;
        }
    };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("edge-node: setting default subscriber failed: {e}");
        return ExitCode::FAILURE;
    }

    match run(config).await {
        Ok(()) => {
            info!("shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(cause = %e, "edge node stopped");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: NodeConfig) -> Result<(), ServerError> {
    let listener = Listener::bind(config).await?;
    let router = status::routes(Router::builder(), listener.stats()).build().map_err(ServerError::config)?;

    listener
        .serve_with_shutdown(router, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(cause = %e, "can't listen for shutdown signal");
                std::future::pending::<()>().await;
            }
        })
        .await
}
