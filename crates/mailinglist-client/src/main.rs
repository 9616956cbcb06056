use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use mailinglist_client::{ClientError, RpcClient};
use mailinglist_core::SubscriberEntry;
use mailinglist_telemetry::{init_telemetry, LogFormat, TelemetryConfig};

/// Exercise a running mailing-list server over its RPC endpoint: create an
/// address, confirm it, opt it out, then list the first page.
#[derive(Debug, Parser)]
#[command(name = "mailinglist-client", version)]
struct Args {
    /// RPC listener address (host:port).
    #[arg(long, env = "MAILINGLIST_GRPC_ADDR", default_value = "127.0.0.1:8001")]
    rpc_addr: String,

    /// Per-call deadline in milliseconds.
    #[arg(long, env = "MAILINGLIST_CLIENT_TIMEOUT_MS", default_value_t = 1000)]
    timeout_ms: u64,

    /// Address used for the demo sequence.
    #[arg(long, default_value = "9999@999.com")]
    email: String,

    #[arg(long, env = "MAILINGLIST_LOG_FORMAT", default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,
}

fn log_entry(
    label: &str,
    result: Result<Option<SubscriberEntry>, ClientError>,
) -> anyhow::Result<Option<SubscriberEntry>> {
    let entry = result.with_context(|| format!("{label} failed"))?;
    match &entry {
        Some(e) => tracing::info!(
            id = e.id,
            email = %e.email,
            confirmed_at = ?e.confirmed_at,
            opt_out = e.opt_out,
            "{label}: entry"
        ),
        None => tracing::info!("{label}: no entry found"),
    }
    Ok(entry)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_telemetry(&TelemetryConfig {
        format: args.log_format,
        ..Default::default()
    })?;

    let url = format!("ws://{}/ws", args.rpc_addr.trim_start_matches("ws://"));
    let timeout = Duration::from_millis(args.timeout_ms);
    let mut client = RpcClient::connect(&url, timeout)
        .await
        .with_context(|| format!("couldn't connect to {url}"))?;

    tracing::info!(email = %args.email, "creating email");
    let created = log_entry("create", client.create_email(&args.email).await.map(Some))?;

    if let Some(mut entry) = created {
        entry.confirm(chrono::Utc::now());
        tracing::info!(email = %entry.email, "updating email");
        log_entry("update", client.update_email(&entry).await)?;

        tracing::info!(email = %entry.email, "deleting email");
        log_entry("delete", client.delete_email(entry.email.as_str()).await)?;
    }

    tracing::info!("getting batch email");
    let entries = client
        .get_email_batch(1, 10)
        .await
        .context("get batch failed")?;
    for (i, entry) in entries.iter().enumerate() {
        tracing::info!(
            item = i + 1,
            of = entries.len(),
            id = entry.id,
            email = %entry.email,
            "batch entry"
        );
    }

    client.close().await?;
    Ok(())
}
