//! In-memory counters (§4.7): candles/trades per `(exchange, market)`,
//! last candle time, connection attempts, and a rolling ticks-per-second
//! rate computed from a monotonic counter plus its window start time.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;

use exchanges::{Exchange, Market};

#[derive(Default)]
struct PerKeyCounters {
	candles: AtomicU64,
	trades: AtomicU64,
	last_candle_ts_ms: AtomicI64,
	connection_attempts: AtomicU64,
	reconnects: AtomicU64,
	ws_connections: AtomicU64,
	symbols_count: AtomicU64,
	tick_window_start_ms: AtomicI64,
	tick_window_count: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Snapshot {
	pub candles: u64,
	pub trades: u64,
	pub last_candle_ts_ms: Option<i64>,
	pub connection_attempts: u64,
	pub reconnects: u64,
	pub ws_connections: u64,
	pub symbols_count: u64,
	pub ticks_per_second: Option<f64>,
}

#[derive(Default)]
pub struct Metrics {
	counters: RwLock<HashMap<(Exchange, Market), Arc<PerKeyCounters>>>,
}

impl Metrics {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	async fn entry(&self, exchange: Exchange, market: Market) -> Arc<PerKeyCounters> {
		if let Some(counters) = self.counters.read().await.get(&(exchange, market)) {
			return Arc::clone(counters);
		}
		Arc::clone(self.counters.write().await.entry((exchange, market)).or_default())
	}

	pub async fn record_trade(&self, exchange: Exchange, market: Market, now_ms: i64) {
		let counters = self.entry(exchange, market).await;
		counters.trades.fetch_add(1, Ordering::Relaxed);
		bump_tick_window(&counters, now_ms);
	}

	pub async fn record_candle(&self, exchange: Exchange, market: Market, candle_ts_ms: i64) {
		let counters = self.entry(exchange, market).await;
		counters.candles.fetch_add(1, Ordering::Relaxed);
		counters.last_candle_ts_ms.store(candle_ts_ms, Ordering::Relaxed);
	}

	pub async fn record_connection_attempt(&self, exchange: Exchange, market: Market) {
		self.entry(exchange, market).await.connection_attempts.fetch_add(1, Ordering::Relaxed);
	}

	/// Reconnects are counted authoritatively per connection by the pool
	/// (scheduled refreshes don't bump it); this mirrors that total into the
	/// gauge a `snapshot` reads, rather than incrementing independently.
	pub async fn set_reconnects(&self, exchange: Exchange, market: Market, count: u64) {
		self.entry(exchange, market).await.reconnects.store(count, Ordering::Relaxed);
	}

	pub async fn set_ws_connections(&self, exchange: Exchange, market: Market, count: u64) {
		self.entry(exchange, market).await.ws_connections.store(count, Ordering::Relaxed);
	}

	pub async fn set_symbols_count(&self, exchange: Exchange, market: Market, count: u64) {
		self.entry(exchange, market).await.symbols_count.store(count, Ordering::Relaxed);
	}

	pub async fn keys(&self) -> Vec<(Exchange, Market)> {
		self.counters.read().await.keys().copied().collect()
	}

	pub async fn snapshot(&self, exchange: Exchange, market: Market, now_ms: i64) -> Snapshot {
		let counters = self.entry(exchange, market).await;
		let last_candle_ts_ms = match counters.last_candle_ts_ms.load(Ordering::Relaxed) {
			0 => None,
			ts => Some(ts),
		};

		let window_start = counters.tick_window_start_ms.load(Ordering::Relaxed);
		let window_count = counters.tick_window_count.load(Ordering::Relaxed);
		let elapsed_secs = (now_ms - window_start) as f64 / 1000.0;
		let ticks_per_second = if window_start > 0 && elapsed_secs > 0.0 { Some(window_count as f64 / elapsed_secs) } else { None };

		Snapshot {
			candles: counters.candles.load(Ordering::Relaxed),
			trades: counters.trades.load(Ordering::Relaxed),
			last_candle_ts_ms,
			connection_attempts: counters.connection_attempts.load(Ordering::Relaxed),
			reconnects: counters.reconnects.load(Ordering::Relaxed),
			ws_connections: counters.ws_connections.load(Ordering::Relaxed),
			symbols_count: counters.symbols_count.load(Ordering::Relaxed),
			ticks_per_second,
		}
	}
}

/// Resets the tick-rate window once an hour's worth of ticks have been
/// folded in so the average stays representative of recent activity
/// rather than the whole process lifetime.
fn bump_tick_window(counters: &PerKeyCounters, now_ms: i64) {
	counters.tick_window_start_ms.compare_exchange(0, now_ms, Ordering::Relaxed, Ordering::Relaxed).ok();
	let count = counters.tick_window_count.fetch_add(1, Ordering::Relaxed) + 1;

	let start = counters.tick_window_start_ms.load(Ordering::Relaxed);
	if now_ms - start > 3_600_000 {
		counters.tick_window_start_ms.store(now_ms, Ordering::Relaxed);
		counters.tick_window_count.store(0, Ordering::Relaxed);
	}
	let _ = count;
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn records_trades_and_candles_independently() {
		let metrics = Metrics::new();
		metrics.record_trade(Exchange::Binance, Market::Spot, 1_000).await;
		metrics.record_trade(Exchange::Binance, Market::Spot, 1_100).await;
		metrics.record_candle(Exchange::Binance, Market::Spot, 1_000).await;

		let snap = metrics.snapshot(Exchange::Binance, Market::Spot, 2_000).await;
		assert_eq!(snap.trades, 2);
		assert_eq!(snap.candles, 1);
		assert_eq!(snap.last_candle_ts_ms, Some(1_000));
	}

	#[tokio::test]
	async fn ticks_per_second_is_none_before_any_trade() {
		let metrics = Metrics::new();
		let snap = metrics.snapshot(Exchange::Bybit, Market::Linear, 1_000).await;
		assert!(snap.ticks_per_second.is_none());
	}

	#[tokio::test]
	async fn keys_are_independent_per_exchange_market() {
		let metrics = Metrics::new();
		metrics.record_trade(Exchange::Binance, Market::Spot, 0).await;
		metrics.record_trade(Exchange::Binance, Market::Linear, 0).await;

		let keys = metrics.keys().await;
		assert_eq!(keys.len(), 2);
	}
}
