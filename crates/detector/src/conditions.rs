//! Spike conditions: delta/volume/wick_pct/direction/symbol/exchange_market
//! are evaluated against a single candle; `series` additionally consults
//! the per-user sliding window of past qualifying candles built up by
//! `series::SeriesTracker`.

use serde::{Deserialize, Serialize};

use exchanges::{Candle, symbol_utils};

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Condition {
	/// `|delta_pct|` within `[min, max]`; either bound may be omitted.
	Delta { min: Option<f64>, max: Option<f64> },
	/// Volume in quote currency (`candle.volume_usdt()`).
	Volume { min: Option<f64>, max: Option<f64> },
	WickPct { min: Option<f64>, max: Option<f64> },
	/// `true` requires an up candle, `false` requires a down candle.
	Direction { up: bool },
	/// Matches after normalizing both the candle's symbol and each
	/// configured value to their base currency, so `"BTC"` or `"BTC/USDC"`
	/// both match a `BTCUSDT` candle.
	Symbol { symbols: Vec<String> },
	ExchangeMarket { exchange: Option<String>, market: Option<String> },
	/// Requires at least `count` qualifying candles within the trailing
	/// `window_secs`, including the current one. "Qualifying" is defined by
	/// the strategy's other, non-series conditions — evaluated by the
	/// caller (`SpikeDetector::conditions_match`), never standalone.
	Series { window_secs: u64, count: u32 },
}

impl Condition {
	#[must_use]
	pub fn matches_single(&self, candle: &Candle) -> bool {
		match self {
			Self::Delta { min, max } => in_bounds(candle.delta_pct().abs(), *min, *max),
			Self::Volume { min, max } => in_bounds(candle.volume_usdt(), *min, *max),
			Self::WickPct { min, max } => in_bounds(candle.wick_pct(), *min, *max),
			Self::Direction { up } => candle.is_up() == *up,
			Self::Symbol { symbols } => {
				let Some(candle_base) = symbol_utils::normalize_base(&candle.symbol, candle.exchange.as_str(), candle.market.as_str()) else { return false };
				symbols.iter().any(|s| symbol_utils::normalize_base(s, candle.exchange.as_str(), candle.market.as_str()).is_some_and(|base| base.eq_ignore_ascii_case(&candle_base)))
			},
			Self::ExchangeMarket { exchange, market } => {
				let exchange_ok = exchange.as_deref().is_none_or(|e| e.eq_ignore_ascii_case(candle.exchange.as_str()));
				let market_ok = market.as_deref().is_none_or(|m| m.eq_ignore_ascii_case(candle.market.as_str()));
				exchange_ok && market_ok
			},
			// Series conditions need historical context; evaluated by the
			// caller via `SeriesTracker`, never standalone.
			Self::Series { .. } => false,
		}
	}
}

fn in_bounds(value: f64, min: Option<f64>, max: Option<f64>) -> bool {
	min.is_none_or(|m| value >= m) && max.is_none_or(|m| value <= m)
}

#[cfg(test)]
mod tests {
	use super::*;
	use exchanges::{Exchange, Market};

	fn candle(open: f64, close: f64, high: f64, low: f64) -> Candle {
		Candle { exchange: Exchange::Binance, market: Market::Spot, symbol: "BTCUSDT".to_string(), ts_ms: 0, open, high, low, close, volume: 10.0 }
	}

	#[test]
	fn delta_condition_uses_absolute_value() {
		let cond = Condition::Delta { min: Some(5.0), max: None };
		assert!(cond.matches_single(&candle(100.0, 94.0, 100.0, 94.0)));
		assert!(cond.matches_single(&candle(100.0, 106.0, 106.0, 100.0)));
		assert!(!cond.matches_single(&candle(100.0, 102.0, 102.0, 100.0)));
	}

	#[test]
	fn direction_condition() {
		assert!(Condition::Direction { up: true }.matches_single(&candle(100.0, 105.0, 105.0, 100.0)));
		assert!(!Condition::Direction { up: true }.matches_single(&candle(100.0, 95.0, 100.0, 95.0)));
	}

	#[test]
	fn symbol_condition_is_case_insensitive() {
		let cond = Condition::Symbol { symbols: vec!["btcusdt".to_string()] };
		assert!(cond.matches_single(&candle(1.0, 1.0, 1.0, 1.0)));
	}

	#[test]
	fn symbol_condition_matches_after_normalizing_both_sides() {
		assert!(Condition::Symbol { symbols: vec!["BTC".to_string()] }.matches_single(&candle(1.0, 1.0, 1.0, 1.0)));
		assert!(Condition::Symbol { symbols: vec!["BTC/USDC".to_string()] }.matches_single(&candle(1.0, 1.0, 1.0, 1.0)));
		assert!(!Condition::Symbol { symbols: vec!["ETH".to_string()] }.matches_single(&candle(1.0, 1.0, 1.0, 1.0)));
	}
}
