//! peer-relay: Peer-discovery relay.
//!
//! Clients connect over TCP, get registered in a shared membership set by IP,
//! and receive the IPs of every other connected client as a JSON array.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use relay_core::{InMemoryStore, MembershipStore};
use relay_daemon::{
    Config, ConnectionHandler, HandlerConfig, RedisStore, RelayServer, StoreBackend,
};

#[derive(Parser, Debug)]
#[command(name = "peer-relay")]
#[command(about = "Peer-discovery relay backed by a shared membership set")]
struct Args {
    /// Path to a JSON config file
    #[arg(short, long, env = "RELAY_CONFIG")]
    config: Option<PathBuf>,

    /// Address to listen on for incoming connections
    #[arg(short, long, env = "RELAY_LISTEN")]
    listen: Option<String>,

    /// Membership store backend
    #[arg(long, value_enum, env = "RELAY_STORE")]
    store: Option<StoreBackend>,

    /// Redis address (host:port)
    #[arg(long, env = "RELAY_REDIS_ADDRESS")]
    redis_address: Option<String>,

    /// Redis password
    #[arg(long, env = "RELAY_REDIS_PASSWORD", hide_env_values = true)]
    redis_password: Option<String>,

    /// Redis logical database index
    #[arg(long, env = "RELAY_REDIS_DB")]
    redis_db: Option<i64>,

    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,
}

impl Args {
    /// Apply command-line overrides on top of the loaded config.
    fn apply(self, mut config: Config) -> Config {
        if let Some(listen) = self.listen {
            config.listen_address = listen;
        }
        if let Some(backend) = self.store {
            config.store.backend = backend;
        }
        if let Some(address) = self.redis_address {
            config.store.address = address;
        }
        if let Some(password) = self.redis_password {
            config.store.password = Some(password);
        }
        if let Some(db) = self.redis_db {
            config.store.db = db;
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging - respects RUST_LOG env var, defaults to info (or debug with --verbose)
    let default_filter = if args.verbose {
        "debug,relay_daemon=debug"
    } else {
        "info,relay_daemon=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting peer-relay");

    let config = Config::load(args.config.as_deref())?;
    let config = args.apply(config);
    config.validate()?;

    info!("Listen address: {}", config.listen_address);

    let store: Arc<dyn MembershipStore> = match config.store.backend {
        StoreBackend::Redis => Arc::new(
            RedisStore::connect(&config.store)
                .await
                .with_context(|| format!("Failed to connect to Redis at {}", config.store.address))?,
        ),
        StoreBackend::Memory => {
            info!("Using in-memory membership store (single relay only)");
            Arc::new(InMemoryStore::new())
        }
    };

    let server = RelayServer::bind(&config.listen_address)
        .await
        .context("Failed to start TCP server")?
        .with_shutdown_grace(config.shutdown_grace());

    let handler = ConnectionHandler::new(
        Arc::clone(&store),
        HandlerConfig {
            read_timeout: config.read_timeout(),
            write_timeout: config.write_timeout(),
        },
    );

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            shutdown_signal().await;
            shutdown.cancel();
        }
    });

    info!("Relay running. Press Ctrl+C to stop.");
    server.run(handler, shutdown).await;

    // Last handle to the store; dropping it closes the store connection
    drop(store);
    info!("Shutting down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
