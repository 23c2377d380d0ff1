//! Exchange blacklist: symbols an operator has opted out of ingesting,
//! checked by the symbol registry reconciliation step before a symbol is
//! handed to the connection pool. Ported from `BD/database.py`'s
//! `add_to_blacklist`/`is_blacklisted`/`get_blacklist`.

use crate::models::ExchangeBlacklistEntry;
use crate::pool::MainStore;

impl MainStore {
	pub async fn add_to_blacklist(&self, exchange: &str, market: &str, symbol: &str) -> anyhow::Result<()> {
		sqlx::query("INSERT OR IGNORE INTO exchange_blacklists (exchange, market, symbol) VALUES (?, ?, ?)")
			.bind(exchange)
			.bind(market)
			.bind(symbol)
			.execute(&self.pool)
			.await?;
		Ok(())
	}

	pub async fn remove_from_blacklist(&self, exchange: &str, market: &str, symbol: &str) -> anyhow::Result<()> {
		sqlx::query("DELETE FROM exchange_blacklists WHERE exchange = ? AND market = ? AND symbol = ?")
			.bind(exchange)
			.bind(market)
			.bind(symbol)
			.execute(&self.pool)
			.await?;
		Ok(())
	}

	pub async fn is_blacklisted(&self, exchange: &str, market: &str, symbol: &str) -> anyhow::Result<bool> {
		let row: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM exchange_blacklists WHERE exchange = ? AND market = ? AND symbol = ?")
			.bind(exchange)
			.bind(market)
			.bind(symbol)
			.fetch_optional(&self.pool)
			.await?;
		Ok(row.is_some())
	}

	/// The full blacklisted set for one `(exchange, market)`, loaded once per
	/// symbol-registry refresh rather than queried per symbol.
	pub async fn blacklist_for(&self, exchange: &str, market: &str) -> anyhow::Result<Vec<ExchangeBlacklistEntry>> {
		let rows = sqlx::query_as::<_, ExchangeBlacklistEntry>(
			"SELECT exchange, market, symbol FROM exchange_blacklists WHERE exchange = ? AND market = ?",
		)
		.bind(exchange)
		.bind(market)
		.fetch_all(&self.pool)
		.await?;
		Ok(rows)
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
	async fn blacklisted_symbol_is_reported_and_removable() {
		let store = test_store().await;
		assert!(!store.is_blacklisted("binance", "spot", "TRYUSDT").await.unwrap());

		store.add_to_blacklist("binance", "spot", "TRYUSDT").await.unwrap();
		assert!(store.is_blacklisted("binance", "spot", "TRYUSDT").await.unwrap());

		store.remove_from_blacklist("binance", "spot", "TRYUSDT").await.unwrap();
		assert!(!store.is_blacklisted("binance", "spot", "TRYUSDT").await.unwrap());
	}

	#[tokio::test]
	async fn adding_the_same_entry_twice_is_idempotent() {
		let store = test_store().await;
		store.add_to_blacklist("bybit", "linear", "BTCUSDT").await.unwrap();
		store.add_to_blacklist("bybit", "linear", "BTCUSDT").await.unwrap();

		let entries = store.blacklist_for("bybit", "linear").await.unwrap();
		assert_eq!(entries.len(), 1);
	}
}
