use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use mailinglist_server::ServerConfig;
use mailinglist_store::Database;
use mailinglist_telemetry::{init_telemetry, LogFormat, TelemetryConfig};

/// Mailing-list subscriber registry: HTTP+JSON and RPC over one SQLite file.
#[derive(Debug, Parser)]
#[command(name = "mailinglist", version)]
struct Args {
    /// SQLite database file, created if missing.
    #[arg(long, env = "MAILINGLIST_DB", default_value = "list.db")]
    db_path: PathBuf,

    #[arg(long, env = "MAILINGLIST_BIND_JSON", default_value = "0.0.0.0:8000")]
    bind_json: SocketAddr,

    #[arg(long, env = "MAILINGLIST_BIND_GRPC", default_value = "0.0.0.0:8001")]
    bind_rpc: SocketAddr,

    /// Deadline for each storage call, in seconds.
    #[arg(long, env = "MAILINGLIST_REQUEST_TIMEOUT", default_value_t = 5)]
    request_timeout_secs: u64,

    /// `pretty` or `json`.
    #[arg(long, env = "MAILINGLIST_LOG_FORMAT", default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_telemetry(&TelemetryConfig {
        format: args.log_format,
        ..Default::default()
    })?;

    tracing::info!("Starting mailing-list server");

    let db = match Database::open(&args.db_path) {
        Ok(db) => db,
        Err(e) => {
            tracing::error!(path = %args.db_path.display(), error = %e, "failed to open database");
            return Err(e).context("database bootstrap failed");
        }
    };
    tracing::info!(path = %args.db_path.display(), "Database opened");

    let config = ServerConfig {
        json_addr: args.bind_json,
        rpc_addr: args.bind_rpc,
        request_timeout: Duration::from_secs(args.request_timeout_secs),
        ..Default::default()
    };
    let handle = mailinglist_server::start(config, db)
        .await
        .context("failed to start listeners")?;

    tracing::info!(
        json = %handle.json_addr,
        rpc = %handle.rpc_addr,
        "Mailing-list server ready"
    );

    handle
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl+c");
                std::future::pending::<()>().await;
            }
        })
        .await?;

    tracing::info!("Shut down cleanly");
    Ok(())
}
