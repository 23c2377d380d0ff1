mod config;
mod pipeline;
mod symbols;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::sync::{RwLock, mpsc, watch};
use tracing::{error, info, warn};

use config::Config;
use detector::SpikeDetector;
use exchanges::{CandleBuilder, ConnectionPool, ExchangeDriver, RateLimiter, StreamEvent, driver_for};
use metrics::Metrics;
use notifier::NotificationDispatcher;
use store::{ErrorWriter, MainStore, SymbolNormalizationStore};
use symbols::PoolMap;

const EVENT_CHANNEL_CAPACITY: usize = 10_000;
const CANDLE_CHANNEL_CAPACITY: usize = 4_096;

#[tokio::main]
async fn main() -> Result<()> {
	tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))).init();

	info!("starting trade ingestor");

	let config = Config::load("config.toml").context("Failed to load configuration")?;
	info!("configuration loaded");

	let store = MainStore::connect(&config.database.main_db_path).await.context("failed to connect to main database")?;
	let normalization = SymbolNormalizationStore::connect(&config.database.symbol_normalization_db_path).await.context("failed to connect to symbol normalization database")?;
	info!("databases connected");

	write_sentinel(&config.ingestion.sentinel_path).await;

	let errors = ErrorWriter::spawn(store.clone());
	let metrics = Arc::new(Metrics::new());
	let registry = Arc::new(exchanges::SymbolRegistry::new());
	let notifier = NotificationDispatcher::new(&config.telegram.bot_token);
	let detector = SpikeDetector::new(Arc::new(store.clone()), Duration::from_secs(config.ingestion.options_cache_ttl_secs));

	let pairs = config.exchanges.enabled_pairs();
	info!(pairs = pairs.len(), "enabled exchange/market pairs");

	let pools: PoolMap = pairs
		.iter()
		.map(|&(exchange, market)| {
			let driver: Box<dyn ExchangeDriver> = driver_for(exchange, market);
			let rate_limiter = if exchange == exchanges::Exchange::Binance { Arc::new(RateLimiter::binance()) } else { Arc::new(RateLimiter::new(100, Duration::from_secs(60))) };
			let pool = Arc::new(ConnectionPool::new(driver, rate_limiter));
			((exchange, market), pool)
		})
		.collect();
	let pools = Arc::new(pools);
	let last_known_symbols = Arc::new(RwLock::new(HashMap::new()));

	let (shutdown_tx, shutdown_rx) = watch::channel(false);
	let (events_tx, events_rx) = mpsc::channel::<StreamEvent>(EVENT_CHANNEL_CAPACITY);
	let (candles_tx, candles_rx) = mpsc::channel::<exchanges::Candle>(CANDLE_CHANNEL_CAPACITY);

	// The initial sync's diff against the (empty) last-known map is the
	// whole filtered symbol set, which is how each pool opens its first,
	// fully-chunked connections before any registry delta arrives.
	symbols::sync_once(&registry, &pools, &last_known_symbols, &store, &normalization, &metrics, &pairs, &events_tx, &shutdown_rx).await;
	info!("initial symbol sync complete, connections opening");

	let mut handles = Vec::new();

	let candle_builder = Arc::new(CandleBuilder::with_close_timeout(candles_tx.clone(), Duration::from_secs(config.ingestion.candle_close_timeout_secs)));

	{
		let metrics = Arc::clone(&metrics);
		let errors = errors.clone();
		let candle_builder = Arc::clone(&candle_builder);
		handles.push(tokio::spawn(pipeline::run_ingest_loop(events_rx, candle_builder, candles_tx, metrics, errors)));
	}

	handles.push(tokio::spawn({
		let metrics = Arc::clone(&metrics);
		let errors = errors.clone();
		let store = store.clone();
		pipeline::run_detection_loop(candles_rx, detector, store, notifier, metrics, errors)
	}));

	handles.push(tokio::spawn({
		let registry = Arc::clone(&registry);
		let pools = Arc::clone(&pools);
		let last_known_symbols = Arc::clone(&last_known_symbols);
		let store = store.clone();
		let normalization = normalization.clone();
		let metrics = Arc::clone(&metrics);
		let pairs = pairs.clone();
		let interval = Duration::from_secs(config.ingestion.symbol_refresh_interval_secs);
		let events_tx = events_tx.clone();
		let shutdown_rx = shutdown_rx.clone();
		symbols::run(registry, pools, last_known_symbols, store, normalization, metrics, pairs, interval, events_tx, shutdown_rx)
	}));

	handles.push(tokio::spawn(pipeline::run_pool_stats_loop(Arc::clone(&pools), Arc::clone(&metrics))));
	handles.push(tokio::spawn(metrics::snapshot::run(Arc::clone(&metrics), store.clone())));
	handles.push(tokio::spawn(metrics::report::run(Arc::clone(&metrics))));
	handles.push(tokio::spawn(metrics::health::run(config.health.into())));

	drop(events_tx);

	info!("all tasks started, streaming");

	tokio::signal::ctrl_c().await.context("failed to listen for shutdown signal")?;
	info!("shutdown signal received");
	let _ = shutdown_tx.send(true);

	// Connection tasks (owned internally by each pool) and the handful of
	// plain timer loops above don't all observe `shutdown_rx`; rather than
	// block indefinitely on stragglers, give everything a brief grace
	// period to wind down and let the process exit drop the rest.
	const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);
	for handle in handles {
		if tokio::time::timeout(SHUTDOWN_GRACE, handle).await.is_err() {
			warn!("background task did not exit within the shutdown grace period");
		}
	}

	Ok(())
}

async fn write_sentinel(path: &str) {
	let now_ms = Utc::now().timestamp_millis();
	if let Err(err) = tokio::fs::write(path, now_ms.to_string()).await {
		warn!(%path, error = %err, "failed to write start-time sentinel file");
	}
}
