//! Aggregates canonical trades into closed 1-second candles, one active
//! candle per `(exchange, market, symbol)` key. A trade whose second
//! differs from the active candle's second promotes the old candle and
//! starts a new one; a forced close timer emits the active candle if no
//! such trade arrives within one second of its creation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tracing::warn;

use crate::types::{Candle, CandleKey, Exchange, Market};

const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

struct ActiveCandle {
	ts_ms: i64,
	open: f64,
	high: f64,
	low: f64,
	close: f64,
	volume: f64,
	/// Bumped every time this slot is replaced; a forced-close timer only
	/// acts if the generation it captured still matches, so promoting the
	/// candle via trade flow makes the stray timer a no-op instead of
	/// requiring a cancelled `JoinHandle`.
	generation: u64,
	has_trades: bool,
}

impl ActiveCandle {
	fn new(ts_ms: i64, generation: u64) -> Self {
		Self { ts_ms, open: 0.0, high: 0.0, low: 0.0, close: 0.0, volume: 0.0, generation, has_trades: false }
	}

	fn add_trade(&mut self, price: f64, qty: f64) {
		if !self.has_trades {
			self.open = price;
			self.high = price;
			self.low = price;
			self.has_trades = true;
		}
		self.close = price;
		self.high = self.high.max(price);
		self.low = self.low.min(price);
		self.volume += qty;
	}

	fn to_candle(&self, key: &CandleKey) -> Option<Candle> {
		if !self.has_trades {
			return None;
		}
		Some(Candle {
			exchange: key.exchange,
			market: key.market,
			symbol: key.symbol.clone(),
			ts_ms: self.ts_ms,
			open: self.open,
			high: self.high,
			low: self.low,
			close: self.close,
			volume: self.volume,
		})
	}
}

pub struct CandleBuilder {
	active: Arc<Mutex<HashMap<CandleKey, ActiveCandle>>>,
	on_candle: mpsc::Sender<Candle>,
	close_timeout: Duration,
}

impl CandleBuilder {
	#[must_use]
	pub fn new(on_candle: mpsc::Sender<Candle>) -> Self {
		Self { active: Arc::new(Mutex::new(HashMap::new())), on_candle, close_timeout: DEFAULT_CLOSE_TIMEOUT }
	}

	#[must_use]
	pub fn with_close_timeout(on_candle: mpsc::Sender<Candle>, close_timeout: Duration) -> Self {
		Self { active: Arc::new(Mutex::new(HashMap::new())), on_candle, close_timeout }
	}

	/// Adds a trade, returning a just-closed Candle if this trade rolled
	/// the active candle into a new second.
	pub async fn add_trade(&self, exchange: Exchange, market: Market, symbol: &str, price: f64, qty: f64, ts_ms: i64) -> Option<Candle> {
		let candle_ts_ms = (ts_ms / 1000) * 1000;
		let key = CandleKey { exchange, market, symbol: symbol.to_string() };

		let mut guard = self.active.lock().await;

		let finished = match guard.get(&key) {
			None => {
				guard.insert(key.clone(), ActiveCandle::new(candle_ts_ms, 0));
				self.schedule_close(key.clone(), candle_ts_ms, 0);
				None
			},
			Some(current) if current.ts_ms == candle_ts_ms => None,
			Some(current) => {
				let finished = current.to_candle(&key);
				let next_generation = current.generation.wrapping_add(1);
				guard.insert(key.clone(), ActiveCandle::new(candle_ts_ms, next_generation));
				self.schedule_close(key.clone(), candle_ts_ms, next_generation);
				finished
			},
		};

		if let Some(current) = guard.get_mut(&key) {
			current.add_trade(price, qty);
		}

		drop(guard);
		finished
	}

	/// Direct path for exchanges (Binance kline stream) that already
	/// deliver closed 1-second candles; forwards immediately.
	pub async fn add_candle(&self, candle: Candle) {
		if self.on_candle.send(candle).await.is_err() {
			warn!("candle sink closed; dropping directly-ingested candle");
		}
	}

	fn schedule_close(&self, key: CandleKey, ts_ms: i64, generation: u64) {
		let active = Arc::clone(&self.active);
		let on_candle = self.on_candle.clone();
		let timeout = self.close_timeout;

		tokio::spawn(async move {
			tokio::time::sleep(timeout).await;

			let finished = {
				let mut guard = active.lock().await;
				match guard.get(&key) {
					Some(current) if current.generation == generation => {
						let candle = current.to_candle(&key);
						guard.remove(&key);
						candle
					},
					_ => None,
				}
			};

			if let Some(candle) = finished {
				if on_candle.send(candle).await.is_err() {
					warn!(symbol = %key.symbol, "candle sink closed; dropping forced-close candle");
				}
			}
		});
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn key() -> (Exchange, Market, &'static str) {
		(Exchange::Binance, Market::Spot, "BTCUSDT")
	}

	#[tokio::test]
	async fn s1_candle_from_trades() {
		let (tx, mut rx) = mpsc::channel(8);
		let builder = CandleBuilder::new(tx);
		let (ex, mk, sym) = key();

		assert!(builder.add_trade(ex, mk, sym, 100.0, 1.0, 1_000).await.is_none());
		assert!(builder.add_trade(ex, mk, sym, 110.0, 2.0, 1_400).await.is_none());
		assert!(builder.add_trade(ex, mk, sym, 90.0, 1.0, 1_900).await.is_none());

		let finished = builder.add_trade(ex, mk, sym, 95.0, 1.0, 2_050).await.expect("second rolled over");
		assert_eq!(finished.ts_ms, 1_000);
		assert_eq!(finished.open, 100.0);
		assert_eq!(finished.high, 110.0);
		assert_eq!(finished.low, 90.0);
		assert_eq!(finished.close, 90.0);
		assert_eq!(finished.volume, 4.0);

		drop(builder);
		assert!(rx.try_recv().is_err());
	}

	#[tokio::test(start_paused = true)]
	async fn s2_forced_close() {
		let (tx, mut rx) = mpsc::channel(8);
		let builder = CandleBuilder::new(tx);
		let (ex, mk, sym) = key();

		assert!(builder.add_trade(ex, mk, sym, 50.0, 1.0, 5_000).await.is_none());

		tokio::time::advance(Duration::from_millis(1_100)).await;

		let candle = rx.recv().await.expect("forced close should fire");
		assert_eq!(candle.ts_ms, 5_000);
		assert_eq!((candle.open, candle.high, candle.low, candle.close, candle.volume), (50.0, 50.0, 50.0, 50.0, 1.0));
	}

	#[tokio::test(start_paused = true)]
	async fn forced_close_is_cancelled_by_promotion() {
		let (tx, mut rx) = mpsc::channel(8);
		let builder = CandleBuilder::new(tx);
		let (ex, mk, sym) = key();

		assert!(builder.add_trade(ex, mk, sym, 50.0, 1.0, 5_000).await.is_none());
		let finished = builder.add_trade(ex, mk, sym, 51.0, 1.0, 6_000).await;
		assert!(finished.is_some());

		tokio::time::advance(Duration::from_millis(1_100)).await;

		// The 6_000 candle's own forced-close timer fires and emits it;
		// the stray 5_000 timer (already promoted) must not emit twice.
		let second = rx.recv().await.expect("second candle's forced close fires");
		assert_eq!(second.ts_ms, 6_000);
		assert!(rx.try_recv().is_err());
	}

	#[tokio::test]
	async fn never_emits_a_candle_with_zero_trades() {
		let (tx, _rx) = mpsc::channel(8);
		let builder = CandleBuilder::new(tx);
		let (ex, mk, sym) = key();
		let active = ActiveCandle::new(0, 0);
		let key = CandleKey { exchange: ex, market: mk, symbol: sym.to_string() };
		assert!(active.to_candle(&key).is_none());
	}
}
