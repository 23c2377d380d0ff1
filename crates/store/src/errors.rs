//! Structured error logging (§7): callers push `ErrorRecord`s onto a
//! bounded channel so writing to the `errors` table never blocks the hot
//! path; a single task drains it and performs the actual insert. Grounded
//! on the teacher's `alert_tx`/`alert_rx` worker pattern in
//! `crates/pump_dump_scanner/src/main.rs`.

use tokio::sync::mpsc;
use tracing::{error, warn};

use crate::models::ErrorRecord;
use crate::pool::MainStore;

#[derive(Debug, Clone)]
pub struct NewError {
	pub exchange: Option<String>,
	pub error_type: String,
	pub error_message: String,
	pub connection_id: Option<String>,
	pub market: Option<String>,
	pub symbol: Option<String>,
	pub stack_trace: Option<String>,
}

#[derive(Clone)]
pub struct ErrorWriter {
	tx: mpsc::Sender<NewError>,
}

impl ErrorWriter {
	/// Spawns the drain task and returns a cheaply-cloneable handle. The
	/// channel is bounded: a burst of errors drops the oldest rather than
	/// applying backpressure to whichever task is reporting them.
	#[must_use]
	pub fn spawn(store: MainStore) -> Self {
		let (tx, mut rx) = mpsc::channel::<NewError>(256);

		tokio::spawn(async move {
			while let Some(record) = rx.recv().await {
				if let Err(err) = store.insert_error(&record).await {
					error!(error = %err, "failed to persist error record");
				}
			}
		});

		Self { tx }
	}

	pub fn report(&self, record: NewError) {
		match self.tx.try_send(record) {
			Ok(()) => {},
			Err(mpsc::error::TrySendError::Full(record)) => {
				warn!(error_type = %record.error_type, "error queue is full; dropping error record");
			},
			Err(mpsc::error::TrySendError::Closed(_)) => {
				warn!("error writer task is down; dropping error record");
			},
		}
	}
}

impl MainStore {
	async fn insert_error(&self, record: &NewError) -> anyhow::Result<()> {
		sqlx::query(
			"INSERT INTO errors (exchange, error_type, error_message, connection_id, market, symbol, stack_trace) \
			 VALUES (?, ?, ?, ?, ?, ?, ?)",
		)
		.bind(&record.exchange)
		.bind(&record.error_type)
		.bind(&record.error_message)
		.bind(&record.connection_id)
		.bind(&record.market)
		.bind(&record.symbol)
		.bind(&record.stack_trace)
		.execute(&self.pool)
		.await?;
		Ok(())
	}

	pub async fn recent_errors(&self, limit: i64) -> anyhow::Result<Vec<ErrorRecord>> {
		let rows = sqlx::query_as::<_, ErrorRecord>("SELECT * FROM errors ORDER BY timestamp DESC LIMIT ?").bind(limit).fetch_all(&self.pool).await?;
		Ok(rows)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn reported_errors_land_in_the_table() {
		let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
		sqlx::migrate!("./migrations").run(&pool).await.unwrap();
		let store = MainStore { pool };

		let writer = ErrorWriter::spawn(store.clone());
		writer.report(NewError {
			exchange: Some("binance".to_string()),
			error_type: "DataError".to_string(),
			error_message: "bad trade".to_string(),
			connection_id: None,
			market: Some("spot".to_string()),
			symbol: Some("BTCUSDT".to_string()),
			stack_trace: None,
		});

		// give the drain task a chance to run
		tokio::task::yield_now().await;
		for _ in 0..20 {
			if !store.recent_errors(10).await.unwrap().is_empty() {
				break;
			}
			tokio::time::sleep(std::time::Duration::from_millis(10)).await;
		}

		let errors = store.recent_errors(10).await.unwrap();
		assert_eq!(errors.len(), 1);
		assert_eq!(errors[0].error_type, "DataError");
	}
}
