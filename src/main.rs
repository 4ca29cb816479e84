use std::net::SocketAddr;
use std::time::Duration;
use subgate::config::Config;
use subgate::orchestrator::Orchestrator;
use subgate::server::{PublishedSubscription, SubscriptionServer, PKG_NAME, VERSION};
use tokio::sync::watch;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("subgate=info".parse().expect("valid log directive")),
        )
        .init();

    let config = Config::from_env();

    // Print startup banner
    info!(name = PKG_NAME, version = VERSION, "Starting launcher");
    print_startup_banner(&config);

    // Create shutdown channel
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let published = PublishedSubscription::new();

    // The launch pipeline runs alongside the HTTP front; its failures are
    // logged and never bring the listener down or fail the process.
    let mut orchestrator = Orchestrator::new(config.clone(), published.clone());
    tokio::spawn(async move {
        let stage = orchestrator.run().await;
        info!(?stage, "Launch pipeline settled");
    });

    // Spawn the HTTP front
    let bind_addr: SocketAddr = ([0, 0, 0, 0], config.http_port).into();
    let server = SubscriptionServer::new(
        bind_addr,
        config.subscription_route(),
        published,
        shutdown_rx,
    );
    let server_handle = tokio::spawn(async move {
        if let Err(e) = server.run().await {
            error!(error = %e, "HTTP server error");
        }
    });

    wait_for_shutdown().await;

    // Signal shutdown and give the listener a moment to wind down
    let _ = shutdown_tx.send(true);
    let _ = tokio::time::timeout(Duration::from_secs(5), server_handle).await;

    info!("Shutdown complete");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = signal(SignalKind::terminate()).expect("Failed to install SIGTERM handler");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received SIGINT (Ctrl+C), shutting down...");
        }
        _ = sigterm.recv() => {
            info!("Received SIGTERM, shutting down...");
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to listen for Ctrl+C");
    info!("Received Ctrl+C, shutting down...");
}

fn print_startup_banner(config: &Config) {
    info!(
        http_port = config.http_port,
        work_dir = %config.work_dir.display(),
        sub_route = %config.subscription_route(),
        "Server configuration"
    );
    info!(
        worker_port = config.worker.port,
        node_name = %config.worker.name,
        "Worker settings"
    );
    info!(
        aggregator = config.upload_url.is_some(),
        project_url = config.project_url.is_some(),
        auto_access = config.auto_access,
        "Relay settings"
    );
}
