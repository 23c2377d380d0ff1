//! Sliding time-windowed ring of past qualifying candles per
//! `(user, candle key, series condition)`, used to evaluate `Condition::Series`.
//! "Qualifying" is defined by the strategy's other, non-series conditions
//! (§4.4), so the caller passes in whether those already matched this
//! candle rather than this module owning any notion of a single `inner`.

use std::collections::{HashMap, VecDeque};

use tokio::sync::Mutex;

use exchanges::{Candle, CandleKey};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SeriesKey {
	user_id: i64,
	candle_key: CandleKey,
	window_secs: u64,
	count: u32,
}

#[derive(Default)]
pub struct SeriesTracker {
	history: Mutex<HashMap<SeriesKey, VecDeque<i64>>>,
}

impl SeriesTracker {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Records `candle` in the ring (if `siblings_match`), prunes anything
	/// older than `window_secs`, and reports whether the ring now holds at
	/// least `count` entries.
	pub async fn record_and_check(&self, user_id: i64, candle: &Candle, window_secs: u64, count: u32, siblings_match: bool) -> bool {
		let key = SeriesKey {
			user_id,
			candle_key: CandleKey { exchange: candle.exchange, market: candle.market, symbol: candle.symbol.clone() },
			window_secs,
			count,
		};

		let mut guard = self.history.lock().await;
		let ring = guard.entry(key).or_default();

		if siblings_match {
			ring.push_back(candle.ts_ms);
		}

		let cutoff = candle.ts_ms - (window_secs as i64) * 1000;
		while matches!(ring.front(), Some(&front) if front < cutoff) {
			ring.pop_front();
		}

		u32::try_from(ring.len()).unwrap_or(u32::MAX) >= count
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use exchanges::{Exchange, Market};

	fn candle(ts_ms: i64) -> Candle {
		Candle { exchange: Exchange::Binance, market: Market::Spot, symbol: "BTCUSDT".to_string(), ts_ms, open: 1.0, high: 1.0, low: 1.0, close: 1.0, volume: 1.0 }
	}

	#[tokio::test]
	async fn requires_count_within_window() {
		let tracker = SeriesTracker::new();

		assert!(!tracker.record_and_check(1, &candle(0), 10, 3, true).await);
		assert!(!tracker.record_and_check(1, &candle(3_000), 10, 3, true).await);
		assert!(tracker.record_and_check(1, &candle(6_000), 10, 3, true).await);
	}

	#[tokio::test]
	async fn prunes_entries_outside_the_window() {
		let tracker = SeriesTracker::new();

		assert!(!tracker.record_and_check(1, &candle(0), 5, 2, true).await);
		// far enough ahead that the first entry falls out of the window
		assert!(!tracker.record_and_check(1, &candle(10_000), 5, 2, true).await);
	}
}
