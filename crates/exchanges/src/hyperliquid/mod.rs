//! Hyperliquid driver: one `{"method":"subscribe","subscription":{"type":"trades","coin":...}}`
//! frame per symbol (no batching), `{"method":"ping"}` every 55s. Symbol
//! normalization for Hyperliquid's fused spot symbols (`"TNSRUSDC"`) and
//! bare perp symbols (`"BTC"`) is handled upstream by `symbol_utils`.

use serde_json::Value;
use tokio_tungstenite::tungstenite::Message;

use crate::driver::ExchangeDriver;
use crate::types::{Exchange, Market, StreamEvent, Trade};
use crate::utils::parse_flexible_f64;

const WS_URL: &str = "wss://api.hyperliquid.xyz/ws";
const PING_INTERVAL_SEC: u64 = 55;

pub struct HyperliquidDriver {
	market: Market,
}

impl HyperliquidDriver {
	#[must_use]
	pub const fn spot() -> Self {
		Self { market: Market::Spot }
	}

	#[must_use]
	pub const fn linear() -> Self {
		Self { market: Market::Linear }
	}
}

impl ExchangeDriver for HyperliquidDriver {
	fn exchange(&self) -> Exchange {
		Exchange::Hyperliquid
	}

	fn market(&self) -> Market {
		self.market
	}

	fn ws_url(&self) -> &str {
		WS_URL
	}

	fn ping_interval(&self) -> Option<std::time::Duration> {
		Some(std::time::Duration::from_secs(PING_INTERVAL_SEC))
	}

	fn max_symbols_per_connection(&self) -> usize {
		50
	}

	fn encode_subscribe(&self, symbols: &[String]) -> Vec<Message> {
		symbols
			.iter()
			.map(|coin| Message::Text(serde_json::json!({ "method": "subscribe", "subscription": { "type": "trades", "coin": coin } }).to_string().into()))
			.collect()
	}

	fn encode_unsubscribe(&self, symbols: &[String]) -> Vec<Message> {
		symbols
			.iter()
			.map(|coin| {
				Message::Text(serde_json::json!({ "method": "unsubscribe", "subscription": { "type": "trades", "coin": coin } }).to_string().into())
			})
			.collect()
	}

	fn encode_ping(&self) -> Option<Message> {
		Some(Message::Text(serde_json::json!({ "method": "ping" }).to_string().into()))
	}

	fn is_pong(&self, msg: &Message) -> bool {
		let Message::Text(text) = msg else { return false };
		let Ok(value) = serde_json::from_str::<Value>(text) else { return false };
		value.get("channel").and_then(Value::as_str) == Some("pong")
	}

	fn decode(&self, msg: &Message) -> Vec<StreamEvent> {
		let Message::Text(text) = msg else { return Vec::new() };
		let Ok(value) = serde_json::from_str::<Value>(text) else { return Vec::new() };

		if value.get("channel").and_then(Value::as_str) != Some("trades") {
			return Vec::new();
		}
		let Some(rows) = value.get("data").and_then(Value::as_array) else { return Vec::new() };

		rows.iter().filter_map(|row| decode_trade_row(row, self.market)).collect()
	}
}

fn decode_trade_row(row: &Value, market: Market) -> Option<StreamEvent> {
	let price = row.get("px").or_else(|| row.get("price")).and_then(parse_flexible_f64)?;
	let qty = row.get("sz").or_else(|| row.get("size")).and_then(parse_flexible_f64)?;
	let ts_ms = row.get("time").or_else(|| row.get("ts")).and_then(parse_flexible_f64)? as i64;
	let symbol = row.get("coin").or_else(|| row.get("symbol")).and_then(Value::as_str)?.to_string();

	if price <= 0.0 || qty <= 0.0 || ts_ms <= 0 {
		return None;
	}

	Some(StreamEvent::Trade(Trade { exchange: Exchange::Hyperliquid, market, symbol, price, qty, ts_ms }))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn decodes_trades_channel() {
		let driver = HyperliquidDriver::linear();
		let frame = Message::Text(
			serde_json::json!({ "channel": "trades", "data": [{ "coin": "BTC", "px": "65000.0", "sz": "1.5", "time": 1_700_000_000_000_i64 }] })
				.to_string()
				.into(),
		);

		let events = driver.decode(&frame);
		assert_eq!(events.len(), 1);
		let StreamEvent::Trade(trade) = &events[0] else { panic!("expected trade") };
		assert_eq!(trade.symbol, "BTC");
	}

	#[test]
	fn recognizes_pong() {
		let driver = HyperliquidDriver::linear();
		assert!(driver.is_pong(&Message::Text(serde_json::json!({ "channel": "pong" }).to_string().into())));
	}
}
