// Load configuration
// Set up logging
// Open the database and caches
// Start the matcher pool, block workers and slot tracker
// Serve the HTTP API until Ctrl-C, then drain in order

use clap::Parser;
use sol_trade_indexer::{
    api, blockchain, cache, config::Config, db, emitter, error::IndexerError, matcher, state::AppState,
};

use blockchain::{BlockProcessor, ChainClient, SlotTracker, WorkerPool};
use emitter::{HttpNotifier, LogSink, MatcherNotifier, PriceNotifier, TradePublisher};
use matcher::{Matcher, MatcherPool, MemoryOrderStore, OrderStore, RedisOrderStore};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Parser, Debug)]
#[command(name = "sol-trade-indexer", about = "Solana DEX trade indexer")]
struct Cli {
    /// Environment file loaded before the process environment is read
    #[arg(short = 'f', long = "config", env = "INDEXER_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting sol-trade-indexer");

    if let Some(path) = &cli.config {
        dotenv::from_path(path).map_err(|e| IndexerError::startup(format!("{}: {}", path.display(), e)))?;
    }
    let config = Arc::new(Config::from_env());
    tracing::info!("Configuration loaded: {:?}", config);

    let db_pool = db::connection::establish_connection(&config.database_url).await?;
    tracing::info!("Database connection established");

    let cache = cache::init_cache(&config);
    tracing::info!("Cache initialized with TTL: {:?} and capacity: {}", config.cache_ttl, config.cache_max_capacity);

    let chain = Arc::new(ChainClient::new(&config));

    let store: Arc<dyn OrderStore> = match &config.redis_url {
        Some(url) => Arc::new(RedisOrderStore::connect(url).await?),
        None => {
            tracing::warn!("REDIS_URL not set, limit orders are kept in memory");
            Arc::new(MemoryOrderStore::new())
        }
    };
    let matcher = Arc::new(MatcherPool::start(
        Arc::new(Matcher::new(store, db_pool.clone())),
        config.matcher_workers,
        config.matcher_ring_size,
    ));

    let notifier: Arc<dyn PriceNotifier> = match &config.trade_rpc_endpoint {
        Some(endpoint) => Arc::new(HttpNotifier::new(endpoint)?),
        None => Arc::new(MatcherNotifier::new(matcher.clone())),
    };
    let processor = Arc::new(BlockProcessor::new(
        db_pool.clone(),
        chain.clone(),
        cache.clone(),
        config.clone(),
        TradePublisher::new(Arc::new(LogSink)),
        notifier,
    ));

    let cancel = CancellationToken::new();
    let head = match chain.get_slot().await {
        Ok(slot) => slot,
        Err(e) => {
            tracing::warn!("Could not read the chain head, backfill is skipped: {}", e);
            0
        }
    };
    let tracker = SlotTracker {
        db: db_pool.clone(),
        ws_url: config.solana_ws_url.clone(),
        start_slot: config.start_slot,
        queue_capacity: config.slot_queue_capacity,
    };
    let (slots, producers) = tracker.start(head, cancel.clone()).await?;
    let workers = WorkerPool::start(processor, slots, config.concurrency);

    let app_state = Arc::new(AppState {
        config: config.clone(),
        db_pool: db_pool.clone(),
        cache,
        matcher: matcher.clone(),
    });
    let app = api::create_router(app_state);
    let addr = format!("{}:{}", config.server_host, config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Starting server on {}", addr);

    let server_cancel = cancel.clone();
    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(server_cancel.cancelled_owned())
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown requested");
    cancel.cancel();

    // Producers stop first so the slot queue closes and workers drain it
    for producer in producers {
        if let Err(e) = producer.await {
            tracing::error!("Slot producer panicked: {}", e);
        }
    }
    if !workers.join(SHUTDOWN_TIMEOUT).await {
        tracing::warn!("Block workers did not drain in time");
    }
    if !matcher.release(SHUTDOWN_TIMEOUT).await {
        tracing::warn!("Matcher workers did not drain in time");
    }
    if let Err(e) = server.await {
        tracing::error!("Server task panicked: {}", e);
    }
    db_pool.close().await;

    tracing::info!("Shutdown complete");
    Ok(())
}
