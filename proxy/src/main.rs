use clap::Parser;
use tracing::{error, info};
use std::process;
use std::sync::Arc;

mod cli;
mod config;
mod proxy;
mod protocol;
mod monitoring;

use cli::CliArguments;
use config::ProxyConfig;
use monitoring::{event_channels, AuditWriter};

macro_rules! fatal {
    ($err:expr, $msg:literal) => {{
        error!(fatal = true, error = %$err, $msg);
        process::exit(1);
    }};
    ($err:expr, $msg:literal, $($key:tt = $val:expr),+) => {{
        error!(fatal = true, error = %$err, $($key = %$val),+, $msg);
        process::exit(1);
    }};
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into())
        )
        .with_target(false)
        .with_thread_ids(true)
        .with_level(true)
        .with_line_number(false)
        .init();

    let config = Arc::new(ProxyConfig::from(CliArguments::parse()));

    info!(
        downstream = %config.downstream,
        upstream = %config.upstream,
        allow_list = config.allow_list.len(),
        password_gate = config.password_gate.is_some(),
        max_connections = ?config.max_connections,
        "Starting MySQL proxy"
    );

    if !config.data_dir.exists() {
        std::fs::create_dir_all(&config.data_dir)
            .unwrap_or_else(|e| fatal!(e, "Failed to create data directory", path = config.data_dir.display()));
    }

    // ==================== Audit log (SQLite) ====================

    let (events, streams) = event_channels(config.event_queue);

    let audit_path = config.data_dir.join("audit.db");
    let audit_writer = AuditWriter::new(&audit_path, streams)
        .await
        .unwrap_or_else(|e| fatal!(e, "Failed to initialize SQLite", path = audit_path.display()));

    info!(path = %audit_path.display(), "SQLite audit log initialized");

    tokio::spawn(audit_writer.run());

    // ==================== Start Proxy Server ====================

    let (ready_tx, ready_rx) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        if let Ok(address) = ready_rx.await {
            info!(address = %address, "Proxy ready to accept connections");
        }
    });

    if let Err(e) = proxy::start_proxy_server(config.clone(), events, Some(ready_tx)).await {
        fatal!(e, "Proxy server failed", address = config.downstream);
    }
}
