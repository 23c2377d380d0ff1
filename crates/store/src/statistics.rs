//! `exchange_statistics` upserts, grounded on §4.7's 15-second snapshot
//! task that rolls in-memory counters into the persisted row per
//! `(exchange, market)`.

use crate::models::ExchangeStatistics;
use crate::pool::MainStore;

impl MainStore {
	pub async fn upsert_statistics(&self, stats: &ExchangeStatistics) -> anyhow::Result<()> {
		sqlx::query(
			"INSERT INTO exchange_statistics \
			 (exchange, market, symbols_count, ws_connections, batches_per_ws, reconnects, candles_count, last_candle_time, ticks_per_second, updated_at) \
			 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, CURRENT_TIMESTAMP) \
			 ON CONFLICT(exchange, market) DO UPDATE SET \
			 symbols_count = excluded.symbols_count, \
			 ws_connections = excluded.ws_connections, \
			 batches_per_ws = excluded.batches_per_ws, \
			 reconnects = excluded.reconnects, \
			 candles_count = excluded.candles_count, \
			 last_candle_time = excluded.last_candle_time, \
			 ticks_per_second = excluded.ticks_per_second, \
			 updated_at = CURRENT_TIMESTAMP",
		)
		.bind(&stats.exchange)
		.bind(&stats.market)
		.bind(stats.symbols_count)
		.bind(stats.ws_connections)
		.bind(stats.batches_per_ws)
		.bind(stats.reconnects)
		.bind(stats.candles_count)
		.bind(stats.last_candle_time)
		.bind(stats.ticks_per_second)
		.execute(&self.pool)
		.await?;
		Ok(())
	}

	pub async fn get_statistics(&self, exchange: &str, market: &str) -> anyhow::Result<Option<ExchangeStatistics>> {
		let row = sqlx::query_as::<_, ExchangeStatistics>(
			"SELECT exchange, market, symbols_count, ws_connections, batches_per_ws, reconnects, candles_count, last_candle_time, ticks_per_second \
			 FROM exchange_statistics WHERE exchange = ? AND market = ?",
		)
		.bind(exchange)
		.bind(market)
		.fetch_optional(&self.pool)
		.await?;
		Ok(row)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	async fn test_store() -> MainStore {
		let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
		sqlx::migrate!("./migrations").run(&pool).await.unwrap();
		MainStore { pool }
	}

	#[tokio::test]
	async fn upsert_then_read_back() {
		let store = test_store().await;
		let stats = ExchangeStatistics {
			exchange: "binance".to_string(),
			market: "spot".to_string(),
			symbols_count: 500,
			ws_connections: 2,
			batches_per_ws: Some(250),
			reconnects: 0,
			candles_count: 10_000,
			last_candle_time: None,
			ticks_per_second: Some(42.5),
		};

		store.upsert_statistics(&stats).await.unwrap();
		store.upsert_statistics(&ExchangeStatistics { reconnects: 1, ..stats.clone() }).await.unwrap();

		let read_back = store.get_statistics("binance", "spot").await.unwrap().unwrap();
		assert_eq!(read_back.reconnects, 1);
		assert_eq!(read_back.symbols_count, 500);
	}
}
