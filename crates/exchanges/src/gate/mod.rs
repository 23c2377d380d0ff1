//! Gate.io driver: `spot.trades` / `futures.trades` channels, JSON
//! `{"channel": "...ping", "event": "ping"}` heartbeat every 30s.

use serde_json::Value;
use tokio_tungstenite::tungstenite::Message;

use crate::driver::ExchangeDriver;
use crate::types::{Exchange, Market, StreamEvent, Trade};
use crate::utils::parse_flexible_f64;

const SPOT_WS_URL: &str = "wss://api.gateio.ws/ws/v4/";
const LINEAR_WS_URL: &str = "wss://fx-ws.gateio.ws/v4/ws/usdt";
const HEARTBEAT_INTERVAL_SEC: u64 = 30;

pub struct GateDriver {
	market: Market,
}

impl GateDriver {
	#[must_use]
	pub const fn spot() -> Self {
		Self { market: Market::Spot }
	}

	#[must_use]
	pub const fn linear() -> Self {
		Self { market: Market::Linear }
	}

	fn trades_channel(&self) -> &'static str {
		match self.market {
			Market::Spot => "spot.trades",
			Market::Linear => "futures.trades",
		}
	}

	fn ping_channel(&self) -> &'static str {
		match self.market {
			Market::Spot => "spot.ping",
			Market::Linear => "futures.ping",
		}
	}
}

impl ExchangeDriver for GateDriver {
	fn exchange(&self) -> Exchange {
		Exchange::Gate
	}

	fn market(&self) -> Market {
		self.market
	}

	fn ws_url(&self) -> &str {
		match self.market {
			Market::Spot => SPOT_WS_URL,
			Market::Linear => LINEAR_WS_URL,
		}
	}

	fn ping_interval(&self) -> Option<std::time::Duration> {
		Some(std::time::Duration::from_secs(HEARTBEAT_INTERVAL_SEC))
	}

	fn max_symbols_per_connection(&self) -> usize {
		match self.market {
			Market::Spot => 135,
			Market::Linear => 100,
		}
	}

	fn encode_subscribe(&self, symbols: &[String]) -> Vec<Message> {
		let frame = serde_json::json!({ "time": 0, "channel": self.trades_channel(), "event": "subscribe", "payload": symbols });
		vec![Message::Text(frame.to_string().into())]
	}

	fn encode_unsubscribe(&self, symbols: &[String]) -> Vec<Message> {
		let frame = serde_json::json!({ "time": 0, "channel": self.trades_channel(), "event": "unsubscribe", "payload": symbols });
		vec![Message::Text(frame.to_string().into())]
	}

	fn encode_ping(&self) -> Option<Message> {
		Some(Message::Text(serde_json::json!({ "time": 0, "channel": self.ping_channel() }).to_string().into()))
	}

	fn is_pong(&self, msg: &Message) -> bool {
		let Message::Text(text) = msg else { return false };
		let Ok(value) = serde_json::from_str::<Value>(text) else { return false };
		matches!(value.get("channel").and_then(Value::as_str), Some("spot.pong" | "futures.pong"))
	}

	fn decode(&self, msg: &Message) -> Vec<StreamEvent> {
		let Message::Text(text) = msg else { return Vec::new() };
		let Ok(value) = serde_json::from_str::<Value>(text) else { return Vec::new() };

		let channel = value.get("channel").and_then(Value::as_str).unwrap_or_default();
		if !channel.contains("trades") {
			return Vec::new();
		}

		let Some(result) = value.get("result") else { return Vec::new() };
		let rows: Vec<&Value> = match result {
			Value::Array(items) => items.iter().collect(),
			Value::Object(_) => vec![result],
			_ => return Vec::new(),
		};

		rows.into_iter().filter_map(|row| decode_trade_row(row, self.market)).collect()
	}
}

fn decode_trade_row(row: &Value, market: Market) -> Option<StreamEvent> {
	let symbol = row.get("currency_pair").or_else(|| row.get("contract")).and_then(Value::as_str)?.to_string();

	let ts_ms = if let Some(ms) = row.get("create_time_ms").and_then(parse_flexible_f64) {
		ms as i64
	} else {
		let secs = row.get("create_time").and_then(parse_flexible_f64).unwrap_or(0.0);
		(secs * 1000.0) as i64
	};

	let price = row.get("price").and_then(parse_flexible_f64)?;
	let raw_qty = row.get("size").or_else(|| row.get("amount")).and_then(parse_flexible_f64)?.abs();

	if price <= 0.0 || raw_qty <= 0.0 || ts_ms <= 0 {
		return None;
	}

	// Spot trade size is already denominated in base currency; linear
	// ("futures") trade size is denominated in USDT and must be converted.
	let qty = match market {
		Market::Spot => raw_qty,
		Market::Linear => raw_qty / price,
	};

	Some(StreamEvent::Trade(Trade { exchange: Exchange::Gate, market, symbol, price, qty, ts_ms }))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn decodes_spot_trade_result() {
		let driver = GateDriver::spot();
		let frame = Message::Text(
			serde_json::json!({
				"channel": "spot.trades",
				"result": { "currency_pair": "BTC_USDT", "create_time_ms": "1700000000000", "price": "50000.0", "amount": "0.25" }
			})
			.to_string()
			.into(),
		);

		let events = driver.decode(&frame);
		assert_eq!(events.len(), 1);
		let StreamEvent::Trade(trade) = &events[0] else { panic!("expected trade") };
		assert_eq!(trade.symbol, "BTC_USDT");
		assert_eq!(trade.qty, 0.25);
	}

	#[test]
	fn recognizes_pong() {
		let driver = GateDriver::spot();
		assert!(driver.is_pong(&Message::Text(serde_json::json!({ "channel": "spot.pong" }).to_string().into())));
	}
}
