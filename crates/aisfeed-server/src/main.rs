use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info, warn};

use aisfeed::store::{create_pool, run_migrations};
use aisfeed::{
    Broadcaster, FeedClient, FeedError, FramePipeline, MemoryPositionStore, PgPositionStore,
    PositionQueryService, PositionSink, PositionStore,
};
use aisfeed_server::config::Args;
use aisfeed_server::{api, shutdown, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Init tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "aisfeed=info,aisfeed_server=info".into()),
        )
        .json()
        .init();

    let args = Args::parse();
    info!(listen_addr = %args.listen_addr, "aisfeed-server starting");

    let backoff = args.backoff_config().context("invalid backoff settings")?;
    let feed_config = args.feed_config().context("invalid feed settings")?;

    let store: Arc<dyn PositionStore> = match &args.database_url {
        Some(url) => {
            let pool = create_pool(url).context("failed to create DB pool")?;
            run_migrations(&pool).await.context("migration failed")?;
            info!("position store ready");
            Arc::new(PgPositionStore::new(pool))
        }
        None => {
            warn!(
                max_rows = args.memory_store_rows,
                "DATABASE_URL not set, positions are kept in memory only"
            );
            Arc::new(MemoryPositionStore::with_max_rows(args.memory_store_rows))
        }
    };

    let broadcaster = Arc::new(Broadcaster::new(args.buffer_capacity));
    let (sink, sink_worker) = PositionSink::new(Arc::clone(&store)).spawn(args.sink_queue);
    let pipeline = FramePipeline::new(Arc::clone(&broadcaster), sink);

    let feed_enabled = feed_config.api_key.is_some();
    let client = FeedClient::new(feed_config, backoff, pipeline);
    let connection = client.state();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let feed_shutdown = shutdown_rx.clone();
    let feed_handle = tokio::spawn(async move {
        match client.run(feed_shutdown).await {
            Ok(()) => {}
            Err(FeedError::MissingApiKey) => {
                warn!("AISSTREAM_API_KEY not set, live feed disabled")
            }
            Err(e) => error!(error = %e, "feed client stopped"),
        }
    });

    let state = Arc::new(AppState {
        broadcaster,
        queries: PositionQueryService::new(store),
        connection,
        feed_enabled,
        shutdown: shutdown_rx,
    });

    let app = api::router(state);
    let listener = tokio::net::TcpListener::bind(&args.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", args.listen_addr))?;
    info!(addr = %args.listen_addr, "API server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown::wait_for_shutdown(shutdown_tx))
        .await
        .context("server error")?;

    // The client owns the last sink handle; once it returns the worker
    // drains what is queued and exits.
    if let Err(e) = feed_handle.await {
        error!(error = %e, "feed client task failed");
    }
    if let Err(e) = sink_worker.await {
        error!(error = %e, "position sink worker failed");
    }

    info!("aisfeed-server stopped");
    Ok(())
}
