//! Snapshot task (§4.7): every 15 seconds, upserts `exchange_statistics`
//! from the in-memory counters for every `(exchange, market)` seen so far.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::interval;
use tracing::warn;

use store::{ExchangeStatistics, MainStore};

use crate::counters::Metrics;

const SNAPSHOT_INTERVAL: Duration = Duration::from_secs(15);

pub async fn run(metrics: Arc<Metrics>, store: MainStore) {
	let mut ticker = interval(SNAPSHOT_INTERVAL);
	loop {
		ticker.tick().await;
		let now_ms = Utc::now().timestamp_millis();

		for (exchange, market) in metrics.keys().await {
			let snap = metrics.snapshot(exchange, market, now_ms).await;
			let chunk_size = exchanges::driver_for(exchange, market).subscribe_chunk_size();
			let batches_per_ws = (chunk_size < usize::MAX && snap.symbols_count > 0).then(|| snap.symbols_count.div_ceil(chunk_size as u64) as i64);

			let stats = ExchangeStatistics {
				exchange: exchange.to_string(),
				market: market.to_string(),
				symbols_count: snap.symbols_count as i64,
				ws_connections: snap.ws_connections as i64,
				batches_per_ws,
				reconnects: snap.reconnects as i64,
				candles_count: snap.candles as i64,
				last_candle_time: snap.last_candle_ts_ms.and_then(|ts| DateTime::from_timestamp_millis(ts)),
				ticks_per_second: snap.ticks_per_second,
			};

			if let Err(err) = store.upsert_statistics(&stats).await {
				warn!(%exchange, %market, error = %err, "failed to upsert exchange statistics");
			}
		}
	}
}
