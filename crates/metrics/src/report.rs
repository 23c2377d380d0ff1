//! Periodic text report (§4.7): every 30 seconds, logs a one-line summary
//! per `(exchange, market)`, matching the teacher's `stats_timer` pattern
//! (root `src/engine.rs`'s `signal_engine_task`).

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::interval;
use tracing::info;

use crate::counters::Metrics;

const REPORT_INTERVAL: Duration = Duration::from_secs(30);

pub async fn run(metrics: Arc<Metrics>) {
	let mut ticker = interval(REPORT_INTERVAL);
	loop {
		ticker.tick().await;
		let now_ms = Utc::now().timestamp_millis();

		for (exchange, market) in metrics.keys().await {
			let snap = metrics.snapshot(exchange, market, now_ms).await;
			info!(
				%exchange,
				%market,
				symbols = snap.symbols_count,
				connections = snap.ws_connections,
				candles = snap.candles,
				trades = snap.trades,
				reconnects = snap.reconnects,
				tps = ?snap.ticks_per_second,
				"exchange stats"
			);
		}
	}
}
