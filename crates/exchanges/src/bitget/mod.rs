//! Bitget driver: `trade` channel subscribes chunked 19-per-frame with a
//! 300ms pause between chunks, plain-text `"ping"`/`"pong"` heartbeat every
//! 30s.

use std::collections::HashSet;
use std::sync::Mutex;

use serde_json::Value;
use tokio_tungstenite::tungstenite::Message;

use crate::driver::ExchangeDriver;
use crate::types::{Exchange, Market, StreamEvent, Trade};
use crate::utils::parse_flexible_f64;

const WS_URL: &str = "wss://ws.bitget.com/v2/ws/public";
const PING_INTERVAL_SEC: u64 = 30;
const SUBSCRIBE_CHUNK_SIZE: usize = 19;
const SUBSCRIBE_CHUNK_PAUSE_MS: u64 = 300;
const MAX_SYMBOLS_PER_CONNECTION_SPOT: usize = 39;
const MAX_SYMBOLS_PER_CONNECTION_LINEAR: usize = 49;

pub struct BitgetDriver {
	market: Market,
	/// Bitget's first `trade` frame for a freshly-subscribed symbol replays
	/// historical rows rather than live ones; tracked here so it can be
	/// discarded once per symbol regardless of which connection owns it.
	seen_symbols: Mutex<HashSet<String>>,
}

impl BitgetDriver {
	#[must_use]
	pub fn spot() -> Self {
		Self { market: Market::Spot, seen_symbols: Mutex::new(HashSet::new()) }
	}

	#[must_use]
	pub fn linear() -> Self {
		Self { market: Market::Linear, seen_symbols: Mutex::new(HashSet::new()) }
	}

	fn inst_type(&self) -> &'static str {
		match self.market {
			Market::Spot => "SPOT",
			Market::Linear => "USDT-FUTURES",
		}
	}
}

impl ExchangeDriver for BitgetDriver {
	fn exchange(&self) -> Exchange {
		Exchange::Bitget
	}

	fn market(&self) -> Market {
		self.market
	}

	fn ws_url(&self) -> &str {
		WS_URL
	}

	fn subscribe_chunk_size(&self) -> usize {
		SUBSCRIBE_CHUNK_SIZE
	}

	fn subscribe_chunk_pause(&self) -> std::time::Duration {
		std::time::Duration::from_millis(SUBSCRIBE_CHUNK_PAUSE_MS)
	}

	fn max_symbols_per_connection(&self) -> usize {
		match self.market {
			Market::Spot => MAX_SYMBOLS_PER_CONNECTION_SPOT,
			Market::Linear => MAX_SYMBOLS_PER_CONNECTION_LINEAR,
		}
	}

	fn ping_interval(&self) -> Option<std::time::Duration> {
		Some(std::time::Duration::from_secs(PING_INTERVAL_SEC))
	}

	fn encode_subscribe(&self, symbols: &[String]) -> Vec<Message> {
		let args: Vec<Value> = symbols.iter().map(|s| serde_json::json!({ "instType": self.inst_type(), "channel": "trade", "instId": s })).collect();
		vec![Message::Text(serde_json::json!({ "op": "subscribe", "args": args }).to_string().into())]
	}

	fn encode_unsubscribe(&self, symbols: &[String]) -> Vec<Message> {
		let args: Vec<Value> = symbols.iter().map(|s| serde_json::json!({ "instType": self.inst_type(), "channel": "trade", "instId": s })).collect();
		vec![Message::Text(serde_json::json!({ "op": "unsubscribe", "args": args }).to_string().into())]
	}

	fn encode_ping(&self) -> Option<Message> {
		Some(Message::Text("ping".into()))
	}

	fn is_pong(&self, msg: &Message) -> bool {
		matches!(msg, Message::Text(text) if text.trim().eq_ignore_ascii_case("pong"))
	}

	fn decode(&self, msg: &Message) -> Vec<StreamEvent> {
		let Message::Text(text) = msg else { return Vec::new() };
		let Ok(value) = serde_json::from_str::<Value>(text) else { return Vec::new() };

		let Some(arg) = value.get("arg") else { return Vec::new() };
		if arg.get("channel").and_then(Value::as_str) != Some("trade") {
			return Vec::new();
		}
		let Some(symbol) = arg.get("instId").and_then(Value::as_str) else { return Vec::new() };
		let Some(rows) = value.get("data").and_then(Value::as_array) else { return Vec::new() };

		// Historical snapshot: Bitget's first trade push per symbol replays
		// backlog rows instead of streaming live ones. Discard it once.
		let is_first_frame = {
			let mut seen = self.seen_symbols.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
			seen.insert(symbol.to_string())
		};
		if is_first_frame {
			return Vec::new();
		}

		rows.iter()
			.filter_map(|row| {
				let px = row.get("px").or_else(|| row.get("price")).and_then(parse_flexible_f64)?;
				let sz = row.get("sz").or_else(|| row.get("size")).and_then(parse_flexible_f64)?;
				let ts_ms = row.get("ts").or_else(|| row.get("timestamp")).and_then(parse_flexible_f64)? as i64;
				(sz > 0.0 && ts_ms > 0).then_some((px, sz, ts_ms))
			})
			.map(|(price, qty, ts_ms)| StreamEvent::Trade(Trade { exchange: Exchange::Bitget, market: self.market, symbol: symbol.to_string(), price, qty, ts_ms }))
			.collect()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn decodes_trade_channel_rows() {
		let driver = BitgetDriver::spot();
		let frame = Message::Text(
			serde_json::json!({
				"arg": { "instType": "SPOT", "channel": "trade", "instId": "BTCUSDT" },
				"data": [{ "px": "50000.0", "sz": "0.1", "ts": "1700000000000" }]
			})
			.to_string()
			.into(),
		);

		let events = driver.decode(&frame);
		assert_eq!(events.len(), 1);
		let StreamEvent::Trade(trade) = &events[0] else { panic!("expected trade") };
		assert_eq!(trade.symbol, "BTCUSDT");
		assert_eq!(trade.qty, 0.1);
	}

	#[test]
	fn recognizes_pong() {
		let driver = BitgetDriver::spot();
		assert!(driver.is_pong(&Message::Text("pong".into())));
	}
}
