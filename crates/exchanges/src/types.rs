use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the five supported exchanges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Exchange {
	Binance,
	Bybit,
	Bitget,
	Gate,
	Hyperliquid,
}

impl Exchange {
	#[must_use]
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Binance => "binance",
			Self::Bybit => "bybit",
			Self::Bitget => "bitget",
			Self::Gate => "gate",
			Self::Hyperliquid => "hyperliquid",
		}
	}

	#[must_use]
	pub const fn all() -> [Self; 5] {
		[Self::Binance, Self::Bybit, Self::Bitget, Self::Gate, Self::Hyperliquid]
	}
}

impl fmt::Display for Exchange {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl std::str::FromStr for Exchange {
	type Err = anyhow::Error;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_lowercase().as_str() {
			"binance" => Ok(Self::Binance),
			"bybit" => Ok(Self::Bybit),
			"bitget" => Ok(Self::Bitget),
			"gate" | "gateio" | "gate.io" => Ok(Self::Gate),
			"hyperliquid" => Ok(Self::Hyperliquid),
			other => anyhow::bail!("unknown exchange: {other}"),
		}
	}
}

/// Spot or linear (perpetual futures settled in quote currency).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Market {
	Spot,
	Linear,
}

impl Market {
	#[must_use]
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Spot => "spot",
			Self::Linear => "linear",
		}
	}
}

impl fmt::Display for Market {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl std::str::FromStr for Market {
	type Err = anyhow::Error;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_lowercase().as_str() {
			"spot" => Ok(Self::Spot),
			"linear" | "futures" | "perp" | "perpetual" => Ok(Self::Linear),
			other => anyhow::bail!("unknown market: {other}"),
		}
	}
}

/// A symbol as reported by the exchange, plus its derived key fields. The
/// `raw` form preserves exchange-native casing/separators; `base`/`quote`
/// are the normalized, upper-cased currency codes used for cross-exchange
/// matching (see `symbol_utils`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Symbol {
	pub raw: String,
	pub base: String,
	pub quote: String,
}

impl Symbol {
	#[must_use]
	pub fn new(raw: impl Into<String>, base: impl Into<String>, quote: impl Into<String>) -> Self {
		Self { raw: raw.into(), base: base.into(), quote: quote.into() }
	}

	#[must_use]
	pub fn normalized(&self) -> String {
		format!("{}{}", self.base, self.quote)
	}
}

impl fmt::Display for Symbol {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}-{}", self.base, self.quote)
	}
}

/// A single key identifying a candle stream: (exchange, market, symbol).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CandleKey {
	pub exchange: Exchange,
	pub market: Market,
	pub symbol: String,
}

/// Canonical trade, never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct Trade {
	pub exchange: Exchange,
	pub market: Market,
	pub symbol: String,
	pub price: f64,
	pub qty: f64,
	pub ts_ms: i64,
}

impl Trade {
	/// Defensive validity check applied by every decoder: price/qty must be
	/// finite and strictly positive, ts_ms must be positive.
	#[must_use]
	pub fn is_valid(&self) -> bool {
		self.price.is_finite() && self.price > 0.0 && self.qty.is_finite() && self.qty > 0.0 && self.ts_ms > 0
	}
}

/// OHLCV aggregate for a fixed one-second window, emitted when closed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
	pub exchange: Exchange,
	pub market: Market,
	pub symbol: String,
	pub ts_ms: i64,
	pub open: f64,
	pub high: f64,
	pub low: f64,
	pub close: f64,
	pub volume: f64,
}

impl Candle {
	/// `(close - open) / open * 100`, the raw signed delta. Callers that
	/// need an absolute-value comparison take `.abs()` themselves.
	#[must_use]
	pub fn delta_pct(&self) -> f64 {
		if self.open == 0.0 {
			return 0.0;
		}
		(self.close - self.open) / self.open * 100.0
	}

	#[must_use]
	pub fn upper_wick(&self) -> f64 {
		self.high - self.open.max(self.close)
	}

	#[must_use]
	pub fn lower_wick(&self) -> f64 {
		self.open.min(self.close) - self.low
	}

	#[must_use]
	pub fn wick_pct(&self) -> f64 {
		let range = self.high - self.low;
		if range <= 0.0 {
			return 0.0;
		}
		self.upper_wick().max(self.lower_wick()) / range * 100.0
	}

	#[must_use]
	pub fn volume_usdt(&self) -> f64 {
		self.volume * self.close
	}

	#[must_use]
	pub const fn is_up(&self) -> bool {
		self.close >= self.open
	}
}

/// Output of one exchange driver's stream: either a decoded trade, a
/// pre-built candle (exchanges that deliver 1s klines directly skip the
/// trade stage), or a recoverable stream error.
#[derive(Debug, Clone)]
pub enum StreamEvent {
	Trade(Trade),
	Candle(Candle),
	Error(String),
}
