//! Connection pool: a bounded set of WebSocket connections per
//! `(exchange, market)`, each owning a slice of symbols under the driver's
//! `max_symbols_per_connection` cap. Every connection runs the same state
//! machine (Connecting → Subscribing → Running → ReconnectBackoff →
//! Closing); only the driver varies subscribe/unsubscribe framing, ping
//! cadence, and decoding. `reconcile` is the single entry point for both
//! the first symbol sync (added = the whole set, removed = none) and every
//! later registry delta.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::Context;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{RwLock, mpsc, watch};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::warn;

use crate::driver::ExchangeDriver;
use crate::rate_limiter::RateLimiter;
use crate::types::StreamEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
	Connecting,
	Subscribing,
	Running,
	ReconnectBackoff,
	Closing,
}

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(60);
const COMMAND_CHANNEL_CAPACITY: usize = 64;

enum ConnCommand {
	Subscribe(Vec<String>),
	Unsubscribe(Vec<String>),
}

/// Outcome of one `run_once` pass, distinguishing real failures (which
/// count toward the reconnect metric) from intentional socket rebuilds
/// (scheduled refresh, or a driver that can only change subscriptions by
/// reconnecting) which don't.
enum RunExit {
	Shutdown,
	SymbolsEmpty,
	Rebuild,
}

/// One live (or reconnecting) WebSocket connection and the slice of
/// symbols it owns. The pool is the only writer of `owned`; the
/// connection's own task only reads it when (re)subscribing after a
/// reconnect.
struct ConnectionHandle {
	id: u64,
	owned: RwLock<Vec<String>>,
	cmd_tx: mpsc::Sender<ConnCommand>,
	state: RwLock<ConnectionState>,
	reconnects: AtomicU64,
}

impl ConnectionHandle {
	async fn set_state(&self, state: ConnectionState) {
		*self.state.write().await = state;
	}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PoolStatistics {
	pub active_connections: usize,
	pub active_symbols: usize,
	pub reconnects: u64,
}

pub struct ConnectionPool<D> {
	driver: Arc<D>,
	rate_limiter: Arc<RateLimiter>,
	connections: RwLock<Vec<Arc<ConnectionHandle>>>,
	next_id: AtomicU64,
}

impl<D: ExchangeDriver + 'static> ConnectionPool<D> {
	#[must_use]
	pub fn new(driver: D, rate_limiter: Arc<RateLimiter>) -> Self {
		Self { driver: Arc::new(driver), rate_limiter, connections: RwLock::new(Vec::new()), next_id: AtomicU64::new(0) }
	}

	#[must_use]
	pub fn exchange(&self) -> crate::types::Exchange {
		self.driver.exchange()
	}

	#[must_use]
	pub fn market(&self) -> crate::types::Market {
		self.driver.market()
	}

	pub async fn get_statistics(&self) -> PoolStatistics {
		let conns = self.connections.read().await;
		let mut active_symbols = 0usize;
		let mut reconnects = 0u64;
		for conn in conns.iter() {
			active_symbols += conn.owned.read().await.len();
			reconnects += conn.reconnects.load(Ordering::Relaxed);
		}
		PoolStatistics { active_connections: conns.len(), active_symbols, reconnects }
	}

	/// Applies a symbol-registry delta: unsubscribes `removed` from every
	/// connection holding it (closing it if it ends up empty), then packs
	/// `added` into under-capacity connections before spawning fresh,
	/// fully-chunked ones for whatever doesn't fit. Calling this once with
	/// `removed` empty and `added` the whole initial set is how the pool
	/// opens its first connections.
	pub async fn reconcile(self: &Arc<Self>, added: &[String], removed: &[String], events: mpsc::Sender<StreamEvent>, shutdown: watch::Receiver<bool>) {
		if !removed.is_empty() {
			let conns = self.connections.read().await.clone();
			for sym in removed {
				for conn in &conns {
					let removed_here = {
						let mut owned = conn.owned.write().await;
						let before = owned.len();
						owned.retain(|s| s != sym);
						owned.len() != before
					};
					if removed_here {
						let _ = conn.cmd_tx.send(ConnCommand::Unsubscribe(vec![sym.clone()])).await;
					}
				}
			}
		}

		if added.is_empty() {
			return;
		}

		let cap = self.driver.max_symbols_per_connection().max(1);
		let mut remaining: Vec<String> = added.to_vec();

		let conns = self.connections.read().await.clone();
		for conn in &conns {
			if remaining.is_empty() {
				break;
			}
			let room = cap.saturating_sub(conn.owned.read().await.len());
			if room == 0 {
				continue;
			}
			let take = remaining.len().min(room);
			let batch: Vec<String> = remaining.drain(..take).collect();
			conn.owned.write().await.extend(batch.iter().cloned());
			let _ = conn.cmd_tx.send(ConnCommand::Subscribe(batch)).await;
		}

		for chunk in remaining.chunks(cap) {
			self.spawn_connection(chunk.to_vec(), events.clone(), shutdown.clone()).await;
		}
	}

	async fn spawn_connection(self: &Arc<Self>, symbols: Vec<String>, events: mpsc::Sender<StreamEvent>, shutdown: watch::Receiver<bool>) {
		let id = self.next_id.fetch_add(1, Ordering::Relaxed);
		let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
		let handle = Arc::new(ConnectionHandle { id, owned: RwLock::new(symbols), cmd_tx, state: RwLock::new(ConnectionState::Connecting), reconnects: AtomicU64::new(0) });
		self.connections.write().await.push(Arc::clone(&handle));

		let pool = Arc::clone(self);
		tokio::spawn(async move { pool.run_connection(handle, cmd_rx, events, shutdown).await });
	}

	async fn remove_connection(&self, id: u64) {
		self.connections.write().await.retain(|c| c.id != id);
	}

	/// Drives one connection's full lifecycle: connect, subscribe, run,
	/// and on any transport failure sleep with exponential backoff before
	/// retrying. Exits for good once `shutdown` fires or the connection's
	/// owned-symbols slice has been emptied by a reconciliation removal.
	async fn run_connection(self: Arc<Self>, handle: Arc<ConnectionHandle>, mut cmd_rx: mpsc::Receiver<ConnCommand>, events: mpsc::Sender<StreamEvent>, mut shutdown: watch::Receiver<bool>) {
		let mut backoff = INITIAL_BACKOFF;

		loop {
			if *shutdown.borrow() {
				handle.set_state(ConnectionState::Closing).await;
				return;
			}
			if handle.owned.read().await.is_empty() {
				handle.set_state(ConnectionState::Closing).await;
				self.remove_connection(handle.id).await;
				return;
			}

			if !self.rate_limiter.try_acquire().await {
				tokio::time::sleep(backoff).await;
				continue;
			}

			handle.set_state(ConnectionState::Connecting).await;

			match self.run_once(&handle, &mut cmd_rx, &events, &mut shutdown).await {
				Ok(RunExit::Shutdown) => {
					handle.set_state(ConnectionState::Closing).await;
					return;
				},
				Ok(RunExit::SymbolsEmpty) => {
					handle.set_state(ConnectionState::Closing).await;
					self.remove_connection(handle.id).await;
					return;
				},
				Ok(RunExit::Rebuild) => {
					// Scheduled refresh or a driver that can only change
					// subscriptions by reconnecting: not a failure.
					backoff = INITIAL_BACKOFF;
				},
				Err(err) => {
					warn!(exchange = %self.driver.exchange(), market = %self.driver.market(), connection_id = handle.id, error = %err, "connection failed, reconnecting");
					handle.reconnects.fetch_add(1, Ordering::Relaxed);
					handle.set_state(ConnectionState::ReconnectBackoff).await;
					tokio::time::sleep(backoff).await;
					backoff = (backoff * 2).min(MAX_BACKOFF);
				},
			}
		}
	}

	async fn run_once(&self, handle: &Arc<ConnectionHandle>, cmd_rx: &mut mpsc::Receiver<ConnCommand>, events: &mpsc::Sender<StreamEvent>, shutdown: &mut watch::Receiver<bool>) -> anyhow::Result<RunExit> {
		let (ws_stream, _) = connect_async(self.driver.ws_url()).await.context("websocket connect failed")?;
		let (mut write, mut read) = ws_stream.split();

		handle.set_state(ConnectionState::Subscribing).await;

		let symbols = handle.owned.read().await.clone();
		let chunk_size = self.driver.subscribe_chunk_size().max(1);
		for chunk in symbols.chunks(chunk_size) {
			for frame in self.driver.encode_subscribe(chunk) {
				write.send(frame).await.context("subscribe send failed")?;
			}
			if !self.driver.subscribe_chunk_pause().is_zero() {
				tokio::time::sleep(self.driver.subscribe_chunk_pause()).await;
			}
		}

		handle.set_state(ConnectionState::Running).await;

		let mut ping_ticker = self.driver.ping_interval().map(tokio::time::interval);
		let scheduled_reconnect_at = self.driver.scheduled_reconnect_after().map(|d| tokio::time::Instant::now() + d);

		loop {
			tokio::select! {
				changed = shutdown.changed() => {
					if changed.is_err() || *shutdown.borrow() {
						let _ = write.send(Message::Close(None)).await;
						return Ok(RunExit::Shutdown);
					}
				}

				() = async {
					match &mut ping_ticker {
						Some(ticker) => { ticker.tick().await; },
						None => std::future::pending::<()>().await,
					}
				} => {
					if let Some(ping) = self.driver.encode_ping() {
						write.send(ping).await.context("ping send failed")?;
					}
				}

				() = async {
					match scheduled_reconnect_at {
						Some(at) => tokio::time::sleep_until(at).await,
						None => std::future::pending::<()>().await,
					}
				} => {
					let _ = write.send(Message::Close(None)).await;
					return Ok(RunExit::Rebuild);
				}

				cmd = cmd_rx.recv() => {
					let Some(cmd) = cmd else { continue };
					match cmd {
						ConnCommand::Subscribe(symbols) => {
							if self.driver.requires_reconnect_for_changes() {
								let _ = write.send(Message::Close(None)).await;
								return Ok(RunExit::Rebuild);
							}
							for frame in self.driver.encode_subscribe(&symbols) {
								write.send(frame).await.context("subscribe send failed")?;
							}
						}
						ConnCommand::Unsubscribe(symbols) => {
							if self.driver.requires_reconnect_for_changes() {
								let _ = write.send(Message::Close(None)).await;
								return Ok(RunExit::Rebuild);
							}
							for frame in self.driver.encode_unsubscribe(&symbols) {
								write.send(frame).await.context("unsubscribe send failed")?;
							}
							if handle.owned.read().await.is_empty() {
								let _ = write.send(Message::Close(None)).await;
								return Ok(RunExit::SymbolsEmpty);
							}
						}
					}
				}

				msg = read.next() => {
					let Some(msg) = msg else {
						anyhow::bail!("websocket stream ended");
					};
					let msg = msg.context("websocket read error")?;

					if self.driver.is_pong(&msg) {
						continue;
					}

					for event in self.driver.decode(&msg) {
						if events.send(event).await.is_err() {
							anyhow::bail!("event sink closed");
						}
					}
				}
			}
		}
	}
}
