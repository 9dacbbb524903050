use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use jemallocator::Jemalloc;
use log::{info, LevelFilter};
use simple_logger::SimpleLogger;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use patron::{
    db::PostgresClient,
    gateway::RpcGateway,
    pubsub::{NoopBus, NotificationBus, RedpandaPublisher},
    sync::{BackfillReconciler, EventApplier, LiveSubscriber, SyncHealth, SyncOrchestrator},
    Settings,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    SimpleLogger::new()
        .with_level(LevelFilter::Info)
        .init()
        .unwrap();

    // Load configuration. Any hole in it (missing contract address, bad
    // URL) is fatal here, before anything touches the chain or the store.
    let settings =
        Settings::new().context("Failed to load config.yaml. Please ensure it exists and is valid")?;

    let store = Arc::new(
        PostgresClient::new(settings.postgres.clone())
            .await
            .context("Failed to initialize database connection")?,
    );
    store.migrate().await?;

    let gateway =
        Arc::new(RpcGateway::new(&settings.chain).context("Invalid chain configuration")?);

    let chain_id = settings.chain.chain_id;
    let bus: Arc<dyn NotificationBus> = match settings
        .redpanda
        .as_ref()
        .and_then(|redpanda| RedpandaPublisher::new(redpanda, chain_id))
    {
        Some(publisher) => Arc::new(publisher),
        None => Arc::new(NoopBus),
    };

    let health = Arc::new(SyncHealth::default());
    let reconnected = Arc::new(Notify::new());

    let applier = Arc::new(EventApplier::new(
        chain_id as i64,
        store.clone(),
        bus,
        health.clone(),
    ));
    let backfill = Arc::new(BackfillReconciler::new(
        chain_id as i64,
        gateway.clone(),
        store.clone(),
        applier.clone(),
        health.clone(),
        &settings.chain,
    ));
    let subscriber = Arc::new(LiveSubscriber::new(
        gateway,
        applier,
        reconnected.clone(),
        Duration::from_millis(settings.chain.reconnect_initial_delay_ms),
        Duration::from_millis(settings.chain.reconnect_max_delay_ms),
    ));
    let orchestrator = SyncOrchestrator::new(
        backfill,
        subscriber,
        health,
        reconnected,
        Duration::from_secs(settings.sync.reconcile_interval_secs),
    );

    let cancellation_token = CancellationToken::new();
    let orchestrator_token = cancellation_token.child_token();
    let orchestrator_handle = tokio::spawn(async move {
        if let Err(e) = orchestrator.run(orchestrator_token).await {
            log::error!("Sync orchestrator failed: {:#}", e);
        }
    });

    info!(
        "Indexer running for chain {}. Press Ctrl+C to stop.",
        chain_id
    );

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm_stream =
            signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal (Ctrl+C), exiting gracefully...");
            },
            _ = sigterm_stream.recv() => {
                info!("Received SIGTERM, exiting gracefully...");
            },
        };
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received shutdown signal (Ctrl+C), exiting gracefully...");
    }

    cancellation_token.cancel();

    info!("Waiting for sync orchestrator to stop...");
    let _ = orchestrator_handle.await;

    info!("Shutdown complete");
    Ok(())
}
