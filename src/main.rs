use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use roster_bridge::api::bridge_routes;
use roster_bridge::config::BridgeConfig;
use roster_bridge::error::ConfigError;
use roster_bridge::gateway::{HttpGateway, MessageGateway};
use roster_bridge::manager::BridgeManager;
use roster_bridge::roster::{ContactDirectory, JsonRoster};
use roster_bridge::store::FileConversationStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = BridgeConfig::from_env();

    // Logging: stderr + daily-rotated file
    std::fs::create_dir_all(&config.log_dir)
        .with_context(|| format!("creating log dir {}", config.log_dir.display()))?;
    let file_appender = tracing_appender::rolling::daily(&config.log_dir, "system.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false),
        )
        .init();

    eprintln!("📇 Roster Bridge v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Roster: {}", config.roster_path.display());
    eprintln!("   Storage: {}", config.storage_dir.display());
    eprintln!("   Inbox: {}", config.inbox.dir.display());
    eprintln!("   Gateway: {}", config.gateway_url);
    eprintln!("   API: http://0.0.0.0:{}", config.api_port);

    // ── Collaborators ───────────────────────────────────────────────────
    let roster = JsonRoster::load(&config.roster_path, &config.columns)
        .await
        .with_context(|| format!("loading roster {}", config.roster_path.display()))?;
    if let Some(partition) = &config.roster_partition {
        if !roster.switch_partition(partition).await? {
            return Err(ConfigError::InvalidValue {
                key: "BRIDGE_ROSTER_PARTITION".into(),
                message: format!("no partition named {partition:?}"),
            }
            .into());
        }
    }
    eprintln!(
        "   Partition: {}",
        roster.active_partition().await.unwrap_or_else(|| "(none)".into())
    );

    let store = FileConversationStore::open(&config.storage_dir)
        .await
        .context("opening conversation store")?;
    let gateway = HttpGateway::new(config.gateway_url.clone(), config.gateway_timeout)
        .context("building gateway client")?;

    match gateway.check_status().await {
        Ok(status) if status.ready => tracing::info!("WhatsApp gateway ready"),
        Ok(status) => tracing::warn!(error = ?status.error, "WhatsApp gateway not ready yet"),
        Err(e) => tracing::warn!(error = %e, "WhatsApp gateway unreachable"),
    }

    // ── Bridge ──────────────────────────────────────────────────────────
    let manager = BridgeManager::start(&config, Arc::new(roster), Arc::new(store), Arc::new(gateway))
        .await
        .context("starting bridge")?;
    let report = manager.startup_report();
    if report.replied > 0 {
        eprintln!("   Answered {} pending conversations", report.replied);
    }

    let app = bridge_routes(Arc::clone(&manager));
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.api_port))
        .await
        .with_context(|| format!("binding API port {}", config.api_port))?;
    tracing::info!(port = config.api_port, "API server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received");
        })
        .await
        .context("API server failed")?;

    manager.shutdown().await;
    Ok(())
}
