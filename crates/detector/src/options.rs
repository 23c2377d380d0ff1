//! Decoded view of `users.options_json`: `messageTemplate`,
//! `conditionalTemplates`, `timezone`, `pairSettings`, `exchangeSettings`
//! plus the strategy list that drives spike detection.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use exchanges::Candle;

use crate::conditions::Condition;

fn default_timezone() -> String {
	"UTC".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct UserOptions {
	/// Empty means "all exchanges"; non-empty restricts detection to these.
	#[serde(default)]
	pub exchanges: Vec<String>,

	#[serde(default, rename = "pairSettings")]
	pub pair_settings: HashMap<String, PairSettings>,

	#[serde(default, rename = "exchangeSettings")]
	pub exchange_settings: HashMap<String, ExchangeSettings>,

	#[serde(default, rename = "conditionalTemplates")]
	pub conditional_templates: Vec<ConditionalTemplate>,

	#[serde(default = "default_timezone")]
	pub timezone: String,

	#[serde(default, rename = "messageTemplate")]
	pub message_template: Option<String>,

	#[serde(default)]
	pub strategies: Vec<Strategy>,
}

impl UserOptions {
	/// `"{exchange}_{market_key}_{quote}"` settings, falling back to the
	/// exchange/market-wide setting, matching `on_candle`'s two-tier
	/// `pairSettings` / `exchangeSettings` lookup.
	#[must_use]
	pub fn should_send_chart(&self, exchange: &str, market_key: &str, quote: Option<&str>) -> bool {
		if let Some(quote) = quote {
			let pair_key = format!("{exchange}_{market_key}_{quote}");
			if let Some(pair) = self.pair_settings.get(&pair_key) {
				return pair.send_chart;
			}
		}

		self.exchange_settings
			.get(exchange)
			.map(|settings| if market_key == "futures" { settings.futures.send_chart } else { settings.spot.send_chart })
			.unwrap_or(false)
	}

	/// `true` if the user's `exchanges` toggle map permits this exchange; an
	/// empty map (the default, unset) is interpreted as "all exchanges on"
	/// since a brand-new user has configured nothing yet.
	#[must_use]
	pub fn exchange_enabled(&self, exchange: &str) -> bool {
		self.exchanges.is_empty() || self.exchanges.iter().any(|e| e.eq_ignore_ascii_case(exchange))
	}

	/// The base `deltaMin`/`volumeMin`/`wickMin` thresholds for this
	/// `(exchange, market, quote)` triple, `None` if the user never
	/// configured this pair — §4.4 step 2's "no matching pair config" skip.
	#[must_use]
	pub fn pair_settings_for(&self, exchange: &str, market_key: &str, quote: &str) -> Option<&PairSettings> {
		let pair_key = format!("{exchange}_{market_key}_{quote}");
		self.pair_settings.get(&pair_key)
	}
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct PairSettings {
	#[serde(default, rename = "deltaMin")]
	pub delta_min: f64,
	#[serde(default, rename = "volumeMin")]
	pub volume_min: f64,
	#[serde(default, rename = "wickMin")]
	pub wick_min: f64,
	#[serde(default, rename = "sendChart")]
	pub send_chart: bool,
}

impl PairSettings {
	/// §4.4 step 3's base-threshold gate: `|delta| >= deltaMin AND
	/// volume_usdt >= volumeMin AND wick_pct >= wickMin`.
	#[must_use]
	pub fn passes(&self, candle: &Candle) -> bool {
		candle.delta_pct().abs() >= self.delta_min && candle.volume_usdt() >= self.volume_min && candle.wick_pct() >= self.wick_min
	}
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct ExchangeSettings {
	#[serde(default)]
	pub spot: MarketSettings,
	#[serde(default)]
	pub futures: MarketSettings,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct MarketSettings {
	#[serde(default, rename = "sendChart")]
	pub send_chart: bool,
}

fn default_true() -> bool {
	true
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConditionalTemplate {
	pub conditions: Vec<Condition>,
	pub template: String,
	#[serde(default = "default_true")]
	pub enabled: bool,
	/// Overrides the user's default chat id for this template; `None` falls
	/// back to the user's account-level chat id.
	#[serde(default, rename = "chatId")]
	pub chat_id: Option<String>,
}

/// A named, AND-combined set of conditions; a candle trips the detector
/// for a user if any one of their strategies fully matches.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Strategy {
	pub name: String,
	pub conditions: Vec<Condition>,
	/// When `true` (the default), the strategy only evaluates on candles
	/// that already cleared the pair's base `deltaMin`/`volumeMin`/`wickMin`
	/// gate; `false` lets the strategy's own conditions stand alone.
	#[serde(default = "default_true", rename = "useGlobalFilters")]
	pub use_global_filters: bool,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn decodes_minimal_options_json() {
		let json = r#"{"strategies":[{"name":"big move","conditions":[{"type":"delta","min":5.0}]}]}"#;
		let options: UserOptions = serde_json::from_str(json).unwrap();
		assert_eq!(options.timezone, "UTC");
		assert_eq!(options.strategies.len(), 1);
	}

	#[test]
	fn pair_settings_take_priority_over_exchange_settings() {
		let mut options = UserOptions::default();
		options.exchange_settings.insert("binance".to_string(), ExchangeSettings { spot: MarketSettings { send_chart: false }, futures: MarketSettings::default() });
		options.pair_settings.insert("binance_spot_USDT".to_string(), PairSettings { send_chart: true, ..PairSettings::default() });

		assert!(options.should_send_chart("binance", "spot", Some("USDT")));
	}

	#[test]
	fn empty_exchanges_list_means_all_enabled() {
		let options = UserOptions::default();
		assert!(options.exchange_enabled("binance"));
		assert!(options.exchange_enabled("bybit"));
	}

	#[test]
	fn exchanges_list_restricts_to_named_exchanges() {
		let mut options = UserOptions::default();
		options.exchanges.push("binance".to_string());
		assert!(options.exchange_enabled("binance"));
		assert!(!options.exchange_enabled("bybit"));
	}

	#[test]
	fn pair_settings_for_is_none_without_a_matching_entry() {
		let options = UserOptions::default();
		assert!(options.pair_settings_for("binance", "spot", "USDT").is_none());
	}

	#[test]
	fn strategy_defaults_to_using_global_filters() {
		let json = r#"{"name":"s","conditions":[]}"#;
		let strategy: Strategy = serde_json::from_str(json).unwrap();
		assert!(strategy.use_global_filters);
	}
}
