//! Tick chart generation (§4.6, optional): plots the most recent public
//! trades for a symbol as percent-change-from-open over time, colored by
//! buy/sell side. Rendered off the hot path, PNG bytes cached in memory
//! per `(exchange, market, symbol, candle_ts_ms)` for 10 minutes.
//!
//! Chart support is limited to Binance's REST trade endpoint shape (the
//! only one this pack's chart-rendering example, `plotters`, needs to
//! cover); other exchanges simply produce no chart.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use plotters::prelude::*;
use serde::Deserialize;
use tokio::sync::Mutex;

use exchanges::{Exchange, Market};

const CACHE_TTL: Duration = Duration::from_secs(600);
const MAX_TRADES: usize = 1000;

#[derive(Debug, Clone, Deserialize)]
struct RestTrade {
	#[serde(rename = "price", deserialize_with = "exchanges::utils::parse_str_f64")]
	price: f64,
	#[serde(rename = "isBuyerMaker")]
	is_buyer_maker: bool,
}

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
struct CacheKey {
	exchange: Exchange,
	market: Market,
	symbol: String,
	candle_ts_ms: i64,
}

pub struct ChartRenderer {
	client: reqwest::Client,
	cache: Mutex<HashMap<CacheKey, (Vec<u8>, Instant)>>,
}

impl Default for ChartRenderer {
	fn default() -> Self {
		Self::new()
	}
}

impl ChartRenderer {
	#[must_use]
	pub fn new() -> Self {
		Self { client: reqwest::Client::new(), cache: Mutex::new(HashMap::new()) }
	}

	/// Returns `None` for any exchange other than Binance, matching the
	/// "one exchange's REST endpoint shape" limitation.
	pub async fn render(&self, exchange: Exchange, market: Market, symbol: &str, candle_ts_ms: i64, open_price: f64) -> anyhow::Result<Option<Vec<u8>>> {
		if exchange != Exchange::Binance {
			return Ok(None);
		}

		let key = CacheKey { exchange, market, symbol: symbol.to_string(), candle_ts_ms };
		if let Some((bytes, cached_at)) = self.cache.lock().await.get(&key) {
			if cached_at.elapsed() < CACHE_TTL {
				return Ok(Some(bytes.clone()));
			}
		}

		let trades = self.fetch_trades(market, symbol).await?;
		if trades.is_empty() {
			return Ok(None);
		}

		let png = render_tick_chart(symbol, open_price, &trades)?;
		self.cache.lock().await.insert(key, (png.clone(), Instant::now()));
		Ok(Some(png))
	}

	async fn fetch_trades(&self, market: Market, symbol: &str) -> anyhow::Result<Vec<RestTrade>> {
		let base = match market {
			Market::Spot => "https://api.binance.com/api/v3/trades",
			Market::Linear => "https://fapi.binance.com/fapi/v1/trades",
		};
		let limit = MAX_TRADES.to_string();
		let trades = self
			.client
			.get(base)
			.query(&[("symbol", symbol), ("limit", limit.as_str())])
			.send()
			.await?
			.error_for_status()?
			.json::<Vec<RestTrade>>()
			.await?;
		Ok(trades)
	}
}

fn render_tick_chart(symbol: &str, open_price: f64, trades: &[RestTrade]) -> anyhow::Result<Vec<u8>> {
	let points: Vec<(f64, f64, bool)> = trades
		.iter()
		.enumerate()
		.map(|(i, t)| {
			let pct = if open_price > 0.0 { (t.price - open_price) / open_price * 100.0 } else { 0.0 };
			(i as f64, pct, !t.is_buyer_maker)
		})
		.collect();

	let min_y = points.iter().map(|(_, y, _)| *y).fold(f64::INFINITY, f64::min);
	let max_y = points.iter().map(|(_, y, _)| *y).fold(f64::NEG_INFINITY, f64::max);
	let pad = (max_y - min_y).abs().max(0.01) * 0.1;

	let path = std::env::temp_dir().join(format!("chart-{}.png", uuid::Uuid::new_v4()));

	{
		let root = BitMapBackend::new(&path, (800, 450)).into_drawing_area();
		root.fill(&WHITE)?;

		let mut chart = ChartBuilder::on(&root)
			.caption(format!("{symbol} ticks"), ("sans-serif", 20))
			.margin(10)
			.x_label_area_size(30)
			.y_label_area_size(40)
			.build_cartesian_2d(0f64..points.len() as f64, (min_y - pad)..(max_y + pad))?;

		chart.configure_mesh().y_desc("% from open").x_desc("tick").draw()?;

		chart.draw_series(points.iter().map(|(x, y, is_buy)| {
			let color = if *is_buy { GREEN } else { RED };
			Circle::new((*x, *y), 2, color.filled())
		}))?;

		root.present()?;
	}

	let bytes = std::fs::read(&path)?;
	let _ = std::fs::remove_file(&path);
	Ok(bytes)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn renders_non_empty_png() {
		let trades = vec![
			RestTrade { price: 100.0, is_buyer_maker: false },
			RestTrade { price: 102.0, is_buyer_maker: true },
			RestTrade { price: 99.0, is_buyer_maker: false },
		];
		let png = render_tick_chart("BTCUSDT", 100.0, &trades).unwrap();
		assert!(!png.is_empty());
		assert_eq!(&png[1..4], b"PNG");
	}
}
