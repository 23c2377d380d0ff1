//! Binance driver. Binance is the one exchange that streams pre-built 1s
//! klines directly (`@kline_1s` / `continuousKline_1s`), so this driver
//! decodes straight to `StreamEvent::Candle` and skips the trade stage
//! entirely.

use serde::Deserialize;
use serde_json::Value;
use tokio_tungstenite::tungstenite::Message;

use crate::driver::ExchangeDriver;
use crate::types::{Candle, Exchange, Market, StreamEvent};

const SPOT_WS_URL: &str = "wss://stream.binance.com:9443/stream";
const FUTURES_WS_URL: &str = "wss://fstream.binance.com/ws";
const SCHEDULED_RECONNECT: std::time::Duration = std::time::Duration::from_secs(23 * 3600);
const STREAMS_PER_CONNECTION: usize = 150;

pub struct BinanceDriver {
	market: Market,
}

impl BinanceDriver {
	#[must_use]
	pub const fn spot() -> Self {
		Self { market: Market::Spot }
	}

	#[must_use]
	pub const fn linear() -> Self {
		Self { market: Market::Linear }
	}

	fn stream_name(&self, symbol: &str) -> String {
		let lower = symbol.to_lowercase();
		match self.market {
			Market::Spot => format!("{lower}@kline_1s"),
			Market::Linear => format!("{lower}_perpetual@continuousKline_1s"),
		}
	}
}

impl ExchangeDriver for BinanceDriver {
	fn exchange(&self) -> Exchange {
		Exchange::Binance
	}

	fn market(&self) -> Market {
		self.market
	}

	fn ws_url(&self) -> &str {
		match self.market {
			Market::Spot => SPOT_WS_URL,
			Market::Linear => FUTURES_WS_URL,
		}
	}

	fn ping_interval(&self) -> Option<std::time::Duration> {
		// Binance sends protocol-level pings every 20s (spot) / 3m (linear);
		// tokio-tungstenite answers these automatically, no app-level ping needed.
		None
	}

	fn scheduled_reconnect_after(&self) -> Option<std::time::Duration> {
		Some(SCHEDULED_RECONNECT)
	}

	fn max_symbols_per_connection(&self) -> usize {
		STREAMS_PER_CONNECTION
	}

	fn requires_reconnect_for_changes(&self) -> bool {
		matches!(self.market, Market::Spot)
	}

	fn encode_subscribe(&self, symbols: &[String]) -> Vec<Message> {
		let params: Vec<String> = symbols.iter().map(|s| self.stream_name(s)).collect();
		let frame = serde_json::json!({ "method": "SUBSCRIBE", "params": params, "id": 1 });
		vec![Message::Text(frame.to_string().into())]
	}

	fn encode_unsubscribe(&self, symbols: &[String]) -> Vec<Message> {
		let params: Vec<String> = symbols.iter().map(|s| self.stream_name(s)).collect();
		let frame = serde_json::json!({ "method": "UNSUBSCRIBE", "params": params, "id": 2 });
		vec![Message::Text(frame.to_string().into())]
	}

	fn is_pong(&self, msg: &Message) -> bool {
		matches!(msg, Message::Pong(_))
	}

	fn decode(&self, msg: &Message) -> Vec<StreamEvent> {
		let Message::Text(text) = msg else { return Vec::new() };
		let Ok(value) = serde_json::from_str::<Value>(text) else { return Vec::new() };

		// Combined-stream spot frames wrap the payload as {"stream": ..., "data": {...}};
		// the JSON-subscribed futures socket delivers the event unwrapped.
		let payload = value.get("data").unwrap_or(&value);

		match payload.get("e").and_then(Value::as_str) {
			Some("kline") => decode_kline(payload, self.market).into_iter().collect(),
			Some("continuous_kline") => decode_continuous_kline(payload).into_iter().collect(),
			_ => Vec::new(),
		}
	}
}

#[derive(Deserialize)]
struct KlinePayload {
	s: String,
	k: KlineBody,
}

#[derive(Deserialize)]
struct ContinuousKlinePayload {
	ps: String,
	k: KlineBody,
}

#[derive(Deserialize)]
struct KlineBody {
	t: i64,
	#[serde(deserialize_with = "crate::utils::parse_str_f64")]
	o: f64,
	#[serde(deserialize_with = "crate::utils::parse_str_f64")]
	h: f64,
	#[serde(deserialize_with = "crate::utils::parse_str_f64")]
	l: f64,
	#[serde(deserialize_with = "crate::utils::parse_str_f64")]
	c: f64,
	#[serde(deserialize_with = "crate::utils::parse_str_f64")]
	v: f64,
}

fn decode_kline(payload: &Value, market: Market) -> Option<StreamEvent> {
	let parsed: KlinePayload = serde_json::from_value(payload.clone()).ok()?;
	Some(StreamEvent::Candle(Candle {
		exchange: Exchange::Binance,
		market,
		symbol: parsed.s,
		ts_ms: parsed.k.t,
		open: parsed.k.o,
		high: parsed.k.h,
		low: parsed.k.l,
		close: parsed.k.c,
		volume: parsed.k.v,
	}))
}

fn decode_continuous_kline(payload: &Value) -> Option<StreamEvent> {
	let parsed: ContinuousKlinePayload = serde_json::from_value(payload.clone()).ok()?;
	Some(StreamEvent::Candle(Candle {
		exchange: Exchange::Binance,
		market: Market::Linear,
		symbol: parsed.ps,
		ts_ms: parsed.k.t,
		open: parsed.k.o,
		high: parsed.k.h,
		low: parsed.k.l,
		close: parsed.k.c,
		volume: parsed.k.v,
	}))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn stream_names_match_exchange_wire_format() {
		assert_eq!(BinanceDriver::spot().stream_name("BTCUSDT"), "btcusdt@kline_1s");
		assert_eq!(BinanceDriver::linear().stream_name("BTCUSDT"), "btcusdt_perpetual@continuousKline_1s");
	}

	#[test]
	fn decodes_spot_kline_frame() {
		let driver = BinanceDriver::spot();
		let frame = Message::Text(
			serde_json::json!({
				"stream": "btcusdt@kline_1s",
				"data": { "e": "kline", "s": "BTCUSDT", "k": { "t": 1_700_000_000_000_i64, "o": "100.0", "h": "110.0", "l": "90.0", "c": "105.0", "v": "12.5" } }
			})
			.to_string()
			.into(),
		);

		let events = driver.decode(&frame);
		assert_eq!(events.len(), 1);
		let StreamEvent::Candle(candle) = &events[0] else { panic!("expected candle") };
		assert_eq!(candle.symbol, "BTCUSDT");
		assert_eq!(candle.close, 105.0);
	}
}
