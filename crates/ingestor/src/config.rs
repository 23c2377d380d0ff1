//! Process configuration, loaded from `config.toml`: nested
//! `#[derive(Deserialize)]` structs plus a `load`/`validate` pair.

use std::fs;

use anyhow::{Context, Result};
use serde::Deserialize;

use exchanges::{Exchange, Market};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
	pub database: DatabaseConfig,
	pub telegram: TelegramConfig,
	#[serde(default)]
	pub exchanges: ExchangeToggles,
	#[serde(default)]
	pub ingestion: IngestionConfig,
	#[serde(default)]
	pub health: HealthConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
	pub main_db_path: String,
	pub symbol_normalization_db_path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
	pub bot_token: String,
	/// Receives error/health alerts outside the per-user notification path;
	/// `None` disables that channel rather than failing startup.
	#[serde(default)]
	pub admin_chat_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeToggles {
	#[serde(default = "default_true")]
	pub binance_spot: bool,
	#[serde(default = "default_true")]
	pub binance_linear: bool,
	#[serde(default = "default_true")]
	pub bybit_spot: bool,
	#[serde(default = "default_true")]
	pub bybit_linear: bool,
	#[serde(default = "default_true")]
	pub bitget_spot: bool,
	#[serde(default = "default_true")]
	pub bitget_linear: bool,
	#[serde(default = "default_true")]
	pub gate_spot: bool,
	#[serde(default = "default_true")]
	pub gate_linear: bool,
	#[serde(default = "default_true")]
	pub hyperliquid_spot: bool,
	#[serde(default = "default_true")]
	pub hyperliquid_linear: bool,
}

impl Default for ExchangeToggles {
	fn default() -> Self {
		Self {
			binance_spot: true,
			binance_linear: true,
			bybit_spot: true,
			bybit_linear: true,
			bitget_spot: true,
			bitget_linear: true,
			gate_spot: true,
			gate_linear: true,
			hyperliquid_spot: true,
			hyperliquid_linear: true,
		}
	}
}

impl ExchangeToggles {
	/// The `(exchange, market)` pairs this process should ingest.
	#[must_use]
	pub fn enabled_pairs(&self) -> Vec<(Exchange, Market)> {
		let all = [
			(Exchange::Binance, Market::Spot, self.binance_spot),
			(Exchange::Binance, Market::Linear, self.binance_linear),
			(Exchange::Bybit, Market::Spot, self.bybit_spot),
			(Exchange::Bybit, Market::Linear, self.bybit_linear),
			(Exchange::Bitget, Market::Spot, self.bitget_spot),
			(Exchange::Bitget, Market::Linear, self.bitget_linear),
			(Exchange::Gate, Market::Spot, self.gate_spot),
			(Exchange::Gate, Market::Linear, self.gate_linear),
			(Exchange::Hyperliquid, Market::Spot, self.hyperliquid_spot),
			(Exchange::Hyperliquid, Market::Linear, self.hyperliquid_linear),
		];
		all.into_iter().filter(|&(_, _, on)| on).map(|(e, m, _)| (e, m)).collect()
	}
}

fn default_true() -> bool {
	true
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IngestionConfig {
	pub symbol_refresh_interval_secs: u64,
	pub candle_close_timeout_secs: u64,
	pub options_cache_ttl_secs: u64,
	pub sentinel_path: String,
}

impl Default for IngestionConfig {
	fn default() -> Self {
		Self { symbol_refresh_interval_secs: 60, candle_close_timeout_secs: 1, options_cache_ttl_secs: 30, sentinel_path: "ingestor.started_at".to_string() }
	}
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
	pub max_cpu_percent: f32,
	pub max_rss_bytes: u64,
	pub max_threads: usize,
	pub max_open_fds: usize,
}

impl Default for HealthConfig {
	fn default() -> Self {
		let defaults = metrics::HealthThresholds::default();
		Self {
			max_cpu_percent: defaults.max_cpu_percent,
			max_rss_bytes: defaults.max_rss_bytes,
			max_threads: defaults.max_threads,
			max_open_fds: defaults.max_open_fds,
		}
	}
}

impl From<HealthConfig> for metrics::HealthThresholds {
	fn from(config: HealthConfig) -> Self {
		Self { max_cpu_percent: config.max_cpu_percent, max_rss_bytes: config.max_rss_bytes, max_threads: config.max_threads, max_open_fds: config.max_open_fds }
	}
}

impl Config {
	pub fn load(path: &str) -> Result<Self> {
		let content = fs::read_to_string(path).with_context(|| format!("Failed to read config file: {path}"))?;
		let config: Self = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
		config.validate()?;
		Ok(config)
	}

	fn validate(&self) -> Result<()> {
		if self.telegram.bot_token == "YOUR_BOT_TOKEN_HERE" || self.telegram.bot_token.is_empty() {
			anyhow::bail!("Please set a valid Telegram bot token in config.toml");
		}

		if self.database.main_db_path.is_empty() {
			anyhow::bail!("database.main_db_path must not be empty");
		}

		if self.database.symbol_normalization_db_path.is_empty() {
			anyhow::bail!("database.symbol_normalization_db_path must not be empty");
		}

		if self.exchanges.enabled_pairs().is_empty() {
			anyhow::bail!("at least one exchange/market pair must be enabled");
		}

		if self.ingestion.symbol_refresh_interval_secs == 0 {
			anyhow::bail!("ingestion.symbol_refresh_interval_secs must be positive");
		}

		if self.ingestion.candle_close_timeout_secs == 0 {
			anyhow::bail!("ingestion.candle_close_timeout_secs must be positive");
		}

		if self.ingestion.options_cache_ttl_secs == 0 {
			anyhow::bail!("ingestion.options_cache_ttl_secs must be positive");
		}

		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn rejects_placeholder_bot_token() {
		let toml = r#"
			[database]
			main_db_path = "main.db"
			symbol_normalization_db_path = "aliases.db"

			[telegram]
			bot_token = "YOUR_BOT_TOKEN_HERE"
		"#;
		let config: Config = toml::from_str(toml).unwrap();
		assert!(config.validate().is_err());
	}

	#[test]
	fn enabled_pairs_respects_toggles() {
		let mut toggles = ExchangeToggles::default();
		toggles.bybit_spot = false;
		toggles.bybit_linear = false;
		let pairs = toggles.enabled_pairs();
		assert_eq!(pairs.len(), 8);
		assert!(!pairs.contains(&(Exchange::Bybit, Market::Spot)));
	}

	#[test]
	fn defaults_fill_in_missing_sections() {
		let toml = r#"
			[database]
			main_db_path = "main.db"
			symbol_normalization_db_path = "aliases.db"

			[telegram]
			bot_token = "123:abc"
		"#;
		let config: Config = toml::from_str(toml).unwrap();
		assert!(config.validate().is_ok());
		assert_eq!(config.ingestion.symbol_refresh_interval_secs, 60);
		assert_eq!(config.exchanges.enabled_pairs().len(), 10);
	}
}
