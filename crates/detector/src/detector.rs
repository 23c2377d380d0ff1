//! `SpikeDetector`: evaluates one closed candle against every active
//! user's strategies.

use std::sync::Arc;
use std::time::Duration;

use exchanges::{Candle, Market, symbol_utils};

use crate::cache::{OptionsCache, OptionsSource};
use crate::conditions::Condition;
use crate::series::SeriesTracker;

#[derive(Debug, Clone, PartialEq)]
pub struct SpikeMatch {
	pub user_id: i64,
	pub user_name: String,
	pub strategy: String,
	pub delta: f64,
	pub wick_pct: f64,
	pub volume_usdt: f64,
}

pub struct SpikeDetector {
	source: Arc<dyn OptionsSource>,
	cache: OptionsCache,
	series: SeriesTracker,
}

impl SpikeDetector {
	#[must_use]
	pub fn new(source: Arc<dyn OptionsSource>, cache_ttl: Duration) -> Self {
		Self { source, cache: OptionsCache::new(cache_ttl), series: SeriesTracker::new() }
	}

	/// Runs every active user's base thresholds and strategies against
	/// `candle`. Step 2 of §4.4: a user with no `pairSettings` entry for
	/// this `(exchange, market, quote)` is skipped outright. Step 3: the
	/// base `deltaMin`/`volumeMin`/`wickMin` gate is evaluated once; each
	/// strategy is then gated on it too unless it opted out via
	/// `useGlobalFilters: false`. A user fires at most one `SpikeMatch` per
	/// candle, `strategy` naming every strategy that matched (empty if only
	/// the base threshold fired).
	pub async fn detect(&self, candle: &Candle, now_ms: i64) -> anyhow::Result<Vec<SpikeMatch>> {
		let users = self.source.active_users().await?;
		let mut matches = Vec::with_capacity(users.len());

		let market_key = if candle.market == Market::Linear { "futures" } else { "spot" };
		let Some(quote) = symbol_utils::extract_quote(&candle.symbol) else { return Ok(matches) };

		for (user_id, user_name) in users {
			let Some(options) = self.cache.get(self.source.as_ref(), user_id, now_ms).await else { continue };

			if !options.exchange_enabled(candle.exchange.as_str()) {
				continue;
			}

			let Some(pair) = options.pair_settings_for(candle.exchange.as_str(), market_key, &quote) else { continue };
			let base_pass = pair.passes(candle);

			let mut matched_strategies = Vec::new();
			for strategy in &options.strategies {
				let gate = if strategy.use_global_filters { base_pass } else { true };
				if gate && self.conditions_match(user_id, candle, &strategy.conditions).await {
					matched_strategies.push(strategy.name.as_str());
				}
			}

			if !base_pass && matched_strategies.is_empty() {
				continue;
			}

			matches.push(SpikeMatch {
				user_id,
				user_name: user_name.clone(),
				strategy: matched_strategies.join(", "),
				delta: candle.delta_pct(),
				wick_pct: candle.wick_pct(),
				volume_usdt: candle.volume_usdt(),
			});
		}

		Ok(matches)
	}

	/// Evaluates an AND-combined condition list (a Strategy's or a
	/// `ConditionalTemplate`'s) against `candle` through the shared
	/// series-aware ring, so `notifier`'s template selection (§4.6) sees
	/// the same series state the detector itself consults. A condition
	/// list's series conditions are evaluated against a ring of past
	/// candles qualified by the list's *other* conditions (§4.4): a candle
	/// only joins the ring if every non-series condition in the same list
	/// matched it.
	pub async fn conditions_match(&self, user_id: i64, candle: &Candle, conditions: &[Condition]) -> bool {
		let siblings_match = conditions.iter().all(|c| matches!(c, Condition::Series { .. }) || c.matches_single(candle));

		for condition in conditions {
			let satisfied = match condition {
				Condition::Series { window_secs, count } => self.series.record_and_check(user_id, candle, *window_secs, *count, siblings_match).await,
				other => other.matches_single(candle),
			};

			if !satisfied {
				return false;
			}
		}
		true
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::options::Strategy;
	use async_trait::async_trait;
	use exchanges::{Exchange, Market};

	struct FakeSource {
		users: Vec<(i64, String)>,
		options_json: String,
	}

	#[async_trait]
	impl OptionsSource for FakeSource {
		async fn active_users(&self) -> anyhow::Result<Vec<(i64, String)>> {
			Ok(self.users.clone())
		}

		async fn load_options_json(&self, _user_id: i64) -> anyhow::Result<Option<String>> {
			Ok(Some(self.options_json.clone()))
		}

		async fn invalidated_at_ms(&self, _user_id: i64) -> anyhow::Result<Option<i64>> {
			Ok(None)
		}
	}

	fn candle(open: f64, close: f64) -> Candle {
		Candle { exchange: Exchange::Binance, market: Market::Spot, symbol: "BTCUSDT".to_string(), ts_ms: 1_000, open, high: close.max(open), low: close.min(open), close, volume: 100.0 }
	}

	fn options_with_strategy(pair_settings: serde_json::Value, strategy: serde_json::Value) -> String {
		serde_json::to_string(&serde_json::json!({
			"pairSettings": { "binance_spot_USDT": pair_settings },
			"strategies": [strategy],
		}))
		.unwrap()
	}

	#[tokio::test]
	async fn matches_a_simple_delta_strategy() {
		let source = Arc::new(FakeSource {
			users: vec![(1, "alice".to_string())],
			options_json: options_with_strategy(serde_json::json!({}), serde_json::json!({ "name": "big-move", "conditions": [{ "type": "delta", "min": 5.0 }] })),
		});
		let detector = SpikeDetector::new(source, Duration::from_secs(60));

		let matches = detector.detect(&candle(100.0, 90.0), 0).await.unwrap();
		assert_eq!(matches.len(), 1);
		assert_eq!(matches[0].user_id, 1);
		assert_eq!(matches[0].strategy, "big-move");
	}

	#[tokio::test]
	async fn no_match_below_threshold() {
		let source = Arc::new(FakeSource {
			users: vec![(1, "alice".to_string())],
			options_json: options_with_strategy(serde_json::json!({}), serde_json::json!({ "name": "big-move", "conditions": [{ "type": "delta", "min": 5.0 }] })),
		});
		let detector = SpikeDetector::new(source, Duration::from_secs(60));

		let matches = detector.detect(&candle(100.0, 99.0), 0).await.unwrap();
		assert!(matches.is_empty());
	}

	#[tokio::test]
	async fn skips_user_with_no_pair_settings_for_this_symbol() {
		let source = Arc::new(FakeSource {
			users: vec![(1, "alice".to_string())],
			options_json: serde_json::to_string(&serde_json::json!({
				"strategies": [{ "name": "big-move", "conditions": [{ "type": "delta", "min": 5.0 }] }]
			}))
			.unwrap(),
		});
		let detector = SpikeDetector::new(source, Duration::from_secs(60));

		let matches = detector.detect(&candle(100.0, 90.0), 0).await.unwrap();
		assert!(matches.is_empty());
	}

	#[tokio::test]
	async fn base_threshold_alone_fires_without_any_strategy() {
		let source = Arc::new(FakeSource { users: vec![(1, "alice".to_string())], options_json: serde_json::to_string(&serde_json::json!({ "pairSettings": { "binance_spot_USDT": { "deltaMin": 5.0 } } })).unwrap() });
		let detector = SpikeDetector::new(source, Duration::from_secs(60));

		let matches = detector.detect(&candle(100.0, 90.0), 0).await.unwrap();
		assert_eq!(matches.len(), 1);
		assert_eq!(matches[0].strategy, "");
	}

	#[tokio::test]
	async fn use_global_filters_false_bypasses_the_base_threshold_gate() {
		let source = Arc::new(FakeSource {
			users: vec![(1, "alice".to_string())],
			options_json: options_with_strategy(
				serde_json::json!({ "deltaMin": 50.0 }),
				serde_json::json!({ "name": "loose", "useGlobalFilters": false, "conditions": [{ "type": "delta", "min": 1.0 }] }),
			),
		});
		let detector = SpikeDetector::new(source, Duration::from_secs(60));

		// The pair's own deltaMin (50%) would block this candle, but the
		// strategy opted out of the base gate so its own 1% threshold rules.
		let matches = detector.detect(&candle(100.0, 90.0), 0).await.unwrap();
		assert_eq!(matches.len(), 1);
		assert_eq!(matches[0].strategy, "loose");
	}

	#[tokio::test]
	async fn default_use_global_filters_blocks_strategy_when_base_fails() {
		let source = Arc::new(FakeSource {
			users: vec![(1, "alice".to_string())],
			options_json: options_with_strategy(serde_json::json!({ "deltaMin": 50.0 }), serde_json::json!({ "name": "gated", "conditions": [{ "type": "delta", "min": 1.0 }] })),
		});
		let detector = SpikeDetector::new(source, Duration::from_secs(60));

		let matches = detector.detect(&candle(100.0, 90.0), 0).await.unwrap();
		assert!(matches.is_empty());
	}

	#[tokio::test]
	async fn series_condition_counts_only_candles_matching_sibling_conditions() {
		// Mirrors S5: a strategy combining `volume >= 1000` with `series
		// count=3, window=60s`; the ring only grows on candles that also
		// clear the sibling volume condition.
		let source = Arc::new(FakeSource {
			users: vec![(1, "alice".to_string())],
			options_json: options_with_strategy(
				serde_json::json!({ "deltaMin": 50.0 }),
				serde_json::json!({
					"name": "volume-series",
					"useGlobalFilters": false,
					"conditions": [{ "type": "volume", "min": 1000.0 }, { "type": "series", "window_secs": 60, "count": 3 }],
				}),
			),
		});
		let detector = SpikeDetector::new(source, Duration::from_secs(60));

		fn volume_candle(ts_ms: i64, volume: f64) -> Candle {
			Candle { exchange: Exchange::Binance, market: Market::Spot, symbol: "BTCUSDT".to_string(), ts_ms, open: 100.0, high: 100.0, low: 100.0, close: 100.0, volume }
		}

		// 1500 * 100 = 150_000 usdt, clears the 1000 volume_usdt minimum.
		assert!(detector.detect(&volume_candle(0, 1500.0), 0).await.unwrap().is_empty());
		assert!(detector.detect(&volume_candle(20_000, 1500.0), 0).await.unwrap().is_empty());
		let matches = detector.detect(&volume_candle(40_000, 1500.0), 0).await.unwrap();
		assert_eq!(matches.len(), 1);
	}

	#[test]
	fn strategy_struct_roundtrips() {
		let strategy = Strategy { name: "x".to_string(), conditions: vec![Condition::Direction { up: true }], use_global_filters: true };
		let json = serde_json::to_string(&strategy).unwrap();
		let back: Strategy = serde_json::from_str(&json).unwrap();
		assert_eq!(back.name, "x");
	}
}
