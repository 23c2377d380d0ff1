//! The two consumer loops downstream of the connection pools: one folds
//! `StreamEvent`s into closed candles, the other runs the spike detector
//! and notification dispatcher over each closed candle.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{error, warn};

use detector::{SpikeDetector, SpikeMatch, UserOptions};
use exchanges::{Candle, CandleBuilder, StreamEvent};
use metrics::Metrics;
use notifier::NotificationDispatcher;
use store::{ErrorWriter, MainStore, NewError};

use crate::symbols::PoolMap;

const STATS_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Mirrors each pool's live connection count and reconnect total into the
/// process-wide `Metrics` gauges the snapshot/report tasks read, since the
/// `exchanges` crate can't depend on `metrics` (the dependency runs the
/// other way). Never returns.
pub async fn run_pool_stats_loop(pools: Arc<PoolMap>, metrics: Arc<Metrics>) {
	let mut ticker = tokio::time::interval(STATS_POLL_INTERVAL);
	loop {
		ticker.tick().await;
		for (&(exchange, market), pool) in pools.iter() {
			let stats = pool.get_statistics().await;
			metrics.set_ws_connections(exchange, market, stats.active_connections as u64).await;
			metrics.set_reconnects(exchange, market, stats.reconnects).await;
		}
	}
}

/// Folds incoming trades into closed candles and forwards exchanges that
/// already stream closed candles directly; never returns.
pub async fn run_ingest_loop(mut events: mpsc::Receiver<StreamEvent>, candle_builder: Arc<CandleBuilder>, candles: mpsc::Sender<Candle>, metrics: Arc<Metrics>, errors: ErrorWriter) {
	while let Some(event) = events.recv().await {
		match event {
			StreamEvent::Trade(trade) => {
				if !trade.is_valid() {
					continue;
				}
				metrics.record_trade(trade.exchange, trade.market, trade.ts_ms).await;

				let closed = candle_builder.add_trade(trade.exchange, trade.market, &trade.symbol, trade.price, trade.qty, trade.ts_ms).await;
				if let Some(candle) = closed {
					if candles.send(candle).await.is_err() {
						warn!("candle consumer closed, stopping ingest loop");
						return;
					}
				}
			},
			StreamEvent::Candle(candle) => {
				candle_builder.add_candle(candle).await;
			},
			StreamEvent::Error(message) => {
				errors.report(NewError { exchange: None, error_type: "StreamDecodeError".to_string(), error_message: message, connection_id: None, market: None, symbol: None, stack_trace: None });
			},
		}
	}
}

/// Runs every closed candle through the spike detector, persists matches
/// and dispatches notifications; never returns.
pub async fn run_detection_loop(mut candles: mpsc::Receiver<Candle>, detector: SpikeDetector, store: MainStore, notifier: NotificationDispatcher, metrics: Arc<Metrics>, errors: ErrorWriter) {
	while let Some(candle) = candles.recv().await {
		metrics.record_candle(candle.exchange, candle.market, candle.ts_ms).await;

		let now_ms = Utc::now().timestamp_millis();
		let matches = match detector.detect(&candle, now_ms).await {
			Ok(matches) => matches,
			Err(err) => {
				errors.report(NewError {
					exchange: Some(candle.exchange.to_string()),
					error_type: "DetectionError".to_string(),
					error_message: err.to_string(),
					connection_id: None,
					market: Some(candle.market.to_string()),
					symbol: Some(candle.symbol.clone()),
					stack_trace: None,
				});
				continue;
			},
		};

		for spike in matches {
			handle_spike(&store, &notifier, &detector, &errors, &spike, &candle).await;
		}
	}
}

async fn handle_spike(store: &MainStore, notifier: &NotificationDispatcher, detector: &SpikeDetector, errors: &ErrorWriter, spike: &SpikeMatch, candle: &Candle) {
	if let Err(err) = store.add_alert(candle.ts_ms, candle.exchange.as_str(), candle.market.as_str(), &candle.symbol, spike.delta, spike.wick_pct, spike.volume_usdt, spike.user_id, None).await {
		errors.report(NewError {
			exchange: Some(candle.exchange.to_string()),
			error_type: "AlertPersistError".to_string(),
			error_message: err.to_string(),
			connection_id: None,
			market: Some(candle.market.to_string()),
			symbol: Some(candle.symbol.clone()),
			stack_trace: None,
		});
	}

	let options_json = match store.load_options_json(spike.user_id).await {
		Ok(Some(json)) => json,
		Ok(None) => return,
		Err(err) => {
			warn!(user_id = spike.user_id, error = %err, "failed to reload user options for notification");
			return;
		},
	};
	let options: UserOptions = match serde_json::from_str(&options_json) {
		Ok(options) => options,
		Err(err) => {
			warn!(user_id = spike.user_id, error = %err, "failed to parse user options for notification");
			return;
		},
	};

	let chat_id = match store.chat_id_for_user(spike.user_id).await {
		Ok(Some(chat_id)) if !chat_id.is_empty() => chat_id,
		_ => return,
	};

	for outcome in notifier.notify(detector, spike, &options, candle, &chat_id).await {
		if !outcome.ok {
			let message = outcome.error.unwrap_or_else(|| "unknown telegram error".to_string());
			error!(user_id = spike.user_id, error = %message, "failed to deliver notification");
			errors.report(NewError {
				exchange: Some(candle.exchange.to_string()),
				error_type: "NotificationError".to_string(),
				error_message: message,
				connection_id: None,
				market: Some(candle.market.to_string()),
				symbol: Some(candle.symbol.clone()),
				stack_trace: None,
			});
		}
	}
}
