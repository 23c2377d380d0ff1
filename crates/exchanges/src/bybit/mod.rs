//! Bybit driver: `publicTrade.{symbol}` topics, batched in groups of 10 per
//! subscribe frame (Bybit's own limit), JSON `{"op":"ping"}` every 20s.

use serde::Deserialize;
use serde_json::Value;
use tokio_tungstenite::tungstenite::Message;

use crate::driver::ExchangeDriver;
use crate::types::{Exchange, Market, StreamEvent, Trade};

const WS_SPOT: &str = "wss://stream.bybit.com/v5/public/spot";
const WS_LINEAR: &str = "wss://stream.bybit.com/v5/public/linear";
const PING_INTERVAL_SEC: u64 = 20;
const SUBSCRIBE_CHUNK_SIZE: usize = 10;

pub struct BybitDriver {
	market: Market,
}

impl BybitDriver {
	#[must_use]
	pub const fn spot() -> Self {
		Self { market: Market::Spot }
	}

	#[must_use]
	pub const fn linear() -> Self {
		Self { market: Market::Linear }
	}
}

impl ExchangeDriver for BybitDriver {
	fn exchange(&self) -> Exchange {
		Exchange::Bybit
	}

	fn market(&self) -> Market {
		self.market
	}

	fn ws_url(&self) -> &str {
		match self.market {
			Market::Spot => WS_SPOT,
			Market::Linear => WS_LINEAR,
		}
	}

	fn subscribe_chunk_size(&self) -> usize {
		SUBSCRIBE_CHUNK_SIZE
	}

	fn max_symbols_per_connection(&self) -> usize {
		match self.market {
			Market::Spot => 86,
			Market::Linear => 100,
		}
	}

	fn ping_interval(&self) -> Option<std::time::Duration> {
		Some(std::time::Duration::from_secs(PING_INTERVAL_SEC))
	}

	fn encode_subscribe(&self, symbols: &[String]) -> Vec<Message> {
		let args: Vec<String> = symbols.iter().map(|s| format!("publicTrade.{s}")).collect();
		vec![Message::Text(serde_json::json!({ "op": "subscribe", "args": args }).to_string().into())]
	}

	fn encode_unsubscribe(&self, symbols: &[String]) -> Vec<Message> {
		let args: Vec<String> = symbols.iter().map(|s| format!("publicTrade.{s}")).collect();
		vec![Message::Text(serde_json::json!({ "op": "unsubscribe", "args": args }).to_string().into())]
	}

	fn encode_ping(&self) -> Option<Message> {
		Some(Message::Text(serde_json::json!({ "op": "ping" }).to_string().into()))
	}

	fn is_pong(&self, msg: &Message) -> bool {
		let Message::Text(text) = msg else { return false };
		serde_json::from_str::<Value>(text).ok().and_then(|v| v.get("op").and_then(Value::as_str).map(str::to_owned)).as_deref() == Some("pong")
	}

	fn decode(&self, msg: &Message) -> Vec<StreamEvent> {
		let Message::Text(text) = msg else { return Vec::new() };
		let Ok(value) = serde_json::from_str::<Value>(text) else { return Vec::new() };

		let Some(topic) = value.get("topic").and_then(Value::as_str) else { return Vec::new() };
		let Some(symbol) = topic.strip_prefix("publicTrade.") else { return Vec::new() };

		let Some(rows) = value.get("data").and_then(Value::as_array) else { return Vec::new() };

		rows.iter()
			.filter_map(|row| serde_json::from_value::<BybitTradeRow>(row.clone()).ok())
			.map(|row| {
				StreamEvent::Trade(Trade { exchange: Exchange::Bybit, market: self.market, symbol: symbol.to_string(), price: row.p, qty: row.v, ts_ms: row.t })
			})
			.collect()
	}
}

#[derive(Deserialize)]
struct BybitTradeRow {
	#[serde(rename = "p", deserialize_with = "crate::utils::parse_str_f64")]
	p: f64,
	#[serde(rename = "v", deserialize_with = "crate::utils::parse_str_f64")]
	v: f64,
	#[serde(rename = "T")]
	t: i64,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn decodes_public_trade_topic() {
		let driver = BybitDriver::spot();
		let frame = Message::Text(
			serde_json::json!({ "topic": "publicTrade.BTCUSDT", "data": [{ "p": "50000.1", "v": "0.5", "T": 1_700_000_000_000_i64 }] })
				.to_string()
				.into(),
		);

		let events = driver.decode(&frame);
		assert_eq!(events.len(), 1);
		let StreamEvent::Trade(trade) = &events[0] else { panic!("expected trade") };
		assert_eq!(trade.symbol, "BTCUSDT");
		assert_eq!(trade.price, 50_000.1);
	}

	#[test]
	fn recognizes_pong() {
		let driver = BybitDriver::spot();
		let frame = Message::Text(serde_json::json!({ "op": "pong" }).to_string().into());
		assert!(driver.is_pong(&frame));
	}
}
