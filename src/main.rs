//! `todo-api` server binary.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use todo_api::config::Config;
use todo_api::http::{handlers, AppState};
use todo_api::logging;
use todo_api::storage::TaskStore;

#[derive(Parser, Debug)]
#[command(
    name = "todo-api",
    version,
    about = "SQLite-backed task management REST service"
)]
struct Args {
    /// Path to the SQLite database file
    #[arg(long, env = "TODO_API_DB", default_value = "todo.db")]
    db: PathBuf,

    /// Address to bind the HTTP server to
    #[arg(long, env = "TODO_API_BIND", default_value = "127.0.0.1:8000")]
    bind: SocketAddr,

    /// Register the /admin maintenance endpoints
    #[arg(long, env = "TODO_API_ENABLE_ADMIN")]
    enable_admin: bool,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    logging::init_logging(args.verbose, args.quiet)?;

    let config = Config {
        db_path: args.db,
        bind: args.bind,
        admin_enabled: args.enable_admin,
    };

    // Run migrations and build the full-text index once, before traffic.
    // Request handlers reopen the database but never issue DDL.
    {
        let store = TaskStore::open(&config.db_path).with_context(|| {
            format!("opening database at {}", config.db_path.display())
        })?;
        if !store.fts_available() {
            warn!("FTS5 unavailable in this SQLite build, text search will scan");
        }
    }

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("binding {}", config.bind))?;
    info!(
        db = %config.db_path.display(),
        bind = %config.bind,
        admin = config.admin_enabled,
        "todo-api listening"
    );

    let router = handlers::build_routes().into_router(AppState::new(config));
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.ok();
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(_) => std::future::pending().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }

    info!("shutdown signal received");
}
