mod app;
mod sessions;

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;
use vellum_guard::{
    Gatekeeper, GuardConfig, OverridePrincipalProvider, PrincipalProvider,
    SessionPrincipalProvider,
};
use vellum_storage::Store;
use vellum_store_sqlite::SqliteStore;

use app::{router, AppState};
use sessions::StaticSessionLookup;

// ────────────────────────────────────── CLI Types ──────────────────────────────────────

#[derive(Parser)]
#[command(name = "vellum-server")]
#[command(about = "Vellum access-control server")]
struct Cli {
    /// Database URL (sqlite://path/to/db.db); defaults to ~/.vellum/store.db
    #[arg(long, global = true, env = "DATABASE_URL")]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP server
    Serve {
        /// Server address
        #[arg(long, default_value = "0.0.0.0:8080")]
        addr: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = GuardConfig::from_env()?;

    let store: Arc<dyn Store> = match &cli.database_url {
        Some(url) => Arc::new(SqliteStore::open(url).await?),
        None => Arc::new(SqliteStore::open_default().await?),
    };

    // Identity strategy is fixed at startup; the override provider refuses to
    // construct unless explicitly enabled.
    let provider: Arc<dyn PrincipalProvider> = if config.identity_override_enabled {
        info!("identity override provider enabled; do not use in production");
        Arc::new(OverridePrincipalProvider::new(store.clone(), &config)?)
    } else {
        let sessions = std::env::var("VELLUM_SESSIONS").unwrap_or_default();
        Arc::new(SessionPrincipalProvider::new(
            Arc::new(StaticSessionLookup::from_csv(&sessions)),
            store.clone(),
        ))
    };

    let gatekeeper = Arc::new(Gatekeeper::new(&config, store.clone(), provider));

    match cli.command {
        Command::Serve { addr } => {
            let state = AppState { gatekeeper, store };
            let listener = tokio::net::TcpListener::bind(&addr).await?;
            info!(%addr, "vellum-server listening");
            axum::serve(listener, router(state))
                .with_graceful_shutdown(shutdown_signal())
                .await?;
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutting down");
}
