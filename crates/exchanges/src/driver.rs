//! The `ExchangeDriver` trait: one implementation per exchange, plugged
//! into the shared connection-pool state machine in `pool.rs`. Covers
//! subscribe/unsubscribe framing, ping cadence and trade/candle decoding.

use std::time::Duration;

use tokio_tungstenite::tungstenite::Message;

use crate::types::{Exchange, Market, StreamEvent};

pub trait ExchangeDriver: Send + Sync {
	fn exchange(&self) -> Exchange;
	fn market(&self) -> Market;
	fn ws_url(&self) -> &str;

	/// Max symbols per outgoing subscribe frame; `usize::MAX` for "no
	/// chunking needed".
	fn subscribe_chunk_size(&self) -> usize {
		usize::MAX
	}

	/// `STREAMS_PER_CONNECTION`: the pool opens a new socket once a
	/// connection's owned-symbols count would exceed this. Distinct from
	/// `subscribe_chunk_size`, which sub-batches topics within one
	/// connection's subscribe frames.
	fn max_symbols_per_connection(&self) -> usize {
		usize::MAX
	}

	/// Binance spot's combined-streams URL has no live subscribe/unsubscribe
	/// protocol: changing a connection's owned symbols requires closing and
	/// reopening the socket. Every other driver can add/remove topics on a
	/// running connection.
	fn requires_reconnect_for_changes(&self) -> bool {
		false
	}

	/// Pause between consecutive subscribe chunks (Bitget paces these to
	/// avoid tripping its own rate limiter).
	fn subscribe_chunk_pause(&self) -> Duration {
		Duration::ZERO
	}

	/// `None` means the transport's own ping/pong (e.g. WS protocol-level
	/// ping) is sufficient and no application-level ping is sent.
	fn ping_interval(&self) -> Option<Duration>;

	/// Only Binance schedules a preemptive reconnect (23h) independent of
	/// any transport failure; every other driver returns `None` here per
	/// the Open Question resolution in DESIGN.md.
	fn scheduled_reconnect_after(&self) -> Option<Duration> {
		None
	}

	fn encode_subscribe(&self, symbols: &[String]) -> Vec<Message>;
	fn encode_unsubscribe(&self, symbols: &[String]) -> Vec<Message>;

	/// `None` if this driver relies on transport-level pings exclusively.
	fn encode_ping(&self) -> Option<Message> {
		None
	}

	fn is_pong(&self, msg: &Message) -> bool;

	/// Decodes one inbound WS frame into zero or more stream events. A
	/// frame that yields nothing useful (a subscribe ack, a pong already
	/// consumed by `is_pong`) decodes to an empty `Vec`.
	fn decode(&self, msg: &Message) -> Vec<StreamEvent>;
}

/// Lets `driver_for`'s boxed return value plug straight into
/// `ConnectionPool<D>`, which is generic over a concrete `D: ExchangeDriver`.
impl ExchangeDriver for Box<dyn ExchangeDriver> {
	fn exchange(&self) -> Exchange {
		(**self).exchange()
	}

	fn market(&self) -> Market {
		(**self).market()
	}

	fn ws_url(&self) -> &str {
		(**self).ws_url()
	}

	fn subscribe_chunk_size(&self) -> usize {
		(**self).subscribe_chunk_size()
	}

	fn max_symbols_per_connection(&self) -> usize {
		(**self).max_symbols_per_connection()
	}

	fn requires_reconnect_for_changes(&self) -> bool {
		(**self).requires_reconnect_for_changes()
	}

	fn subscribe_chunk_pause(&self) -> Duration {
		(**self).subscribe_chunk_pause()
	}

	fn ping_interval(&self) -> Option<Duration> {
		(**self).ping_interval()
	}

	fn scheduled_reconnect_after(&self) -> Option<Duration> {
		(**self).scheduled_reconnect_after()
	}

	fn encode_subscribe(&self, symbols: &[String]) -> Vec<Message> {
		(**self).encode_subscribe(symbols)
	}

	fn encode_unsubscribe(&self, symbols: &[String]) -> Vec<Message> {
		(**self).encode_unsubscribe(symbols)
	}

	fn encode_ping(&self) -> Option<Message> {
		(**self).encode_ping()
	}

	fn is_pong(&self, msg: &Message) -> bool {
		(**self).is_pong(msg)
	}

	fn decode(&self, msg: &Message) -> Vec<StreamEvent> {
		(**self).decode(msg)
	}
}
