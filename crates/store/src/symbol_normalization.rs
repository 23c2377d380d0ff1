//! `symbol_normalization.db`: a second SQLite file, kept separate from the
//! main database per §6, mapping each exchange's raw wire symbol to the
//! normalized `BASE-QUOTE` form used for cross-exchange matching. Grounded
//! on `original_source/BD/symbol_normalization_db.py`.

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;

const INIT_SQL: &str = r"
CREATE TABLE IF NOT EXISTS symbol_normalization (
	id INTEGER PRIMARY KEY AUTOINCREMENT,
	exchange TEXT NOT NULL,
	market TEXT NOT NULL,
	original_symbol TEXT NOT NULL,
	normalized_symbol TEXT NOT NULL,
	created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
	updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
	UNIQUE(exchange, market, original_symbol)
);
CREATE INDEX IF NOT EXISTS idx_symbol_lookup ON symbol_normalization(exchange, market, original_symbol);
CREATE INDEX IF NOT EXISTS idx_normalized_lookup ON symbol_normalization(normalized_symbol);
CREATE INDEX IF NOT EXISTS idx_exchange_market_normalized ON symbol_normalization(exchange, market, normalized_symbol);
";

#[derive(Clone)]
pub struct SymbolNormalizationStore {
	pool: SqlitePool,
}

impl SymbolNormalizationStore {
	pub async fn connect(db_path: &str) -> anyhow::Result<Self> {
		let url = if db_path == ":memory:" { "sqlite::memory:".to_string() } else { format!("sqlite://{db_path}") };
		let options = SqliteConnectOptions::from_str(&url)?
			.create_if_missing(true)
			.journal_mode(SqliteJournalMode::Wal)
			.busy_timeout(Duration::from_secs(30))
			.synchronous(SqliteSynchronous::Normal);

		let pool = SqlitePoolOptions::new().max_connections(5).connect_with(options).await?;
		sqlx::raw_sql(INIT_SQL).execute(&pool).await?;

		Ok(Self { pool })
	}

	pub async fn get_normalized(&self, exchange: &str, market: &str, original_symbol: &str) -> anyhow::Result<Option<String>> {
		let row: Option<(String,)> = sqlx::query_as("SELECT normalized_symbol FROM symbol_normalization WHERE exchange = ? AND market = ? AND original_symbol = ?")
			.bind(exchange)
			.bind(market)
			.bind(original_symbol)
			.fetch_optional(&self.pool)
			.await?;
		Ok(row.map(|(s,)| s))
	}

	pub async fn set_normalized(&self, exchange: &str, market: &str, original_symbol: &str, normalized_symbol: &str) -> anyhow::Result<()> {
		sqlx::query(
			"INSERT INTO symbol_normalization (exchange, market, original_symbol, normalized_symbol) VALUES (?, ?, ?, ?) \
			 ON CONFLICT(exchange, market, original_symbol) DO UPDATE SET normalized_symbol = excluded.normalized_symbol, updated_at = CURRENT_TIMESTAMP",
		)
		.bind(exchange)
		.bind(market)
		.bind(original_symbol)
		.bind(normalized_symbol)
		.execute(&self.pool)
		.await?;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn unknown_symbol_returns_none() {
		let store = SymbolNormalizationStore::connect(":memory:").await.unwrap();
		assert!(store.get_normalized("binance", "spot", "BTCUSDT").await.unwrap().is_none());
	}

	#[tokio::test]
	async fn set_then_get_round_trips() {
		let store = SymbolNormalizationStore::connect(":memory:").await.unwrap();
		store.set_normalized("binance", "spot", "BTCUSDT", "BTC-USDT").await.unwrap();
		assert_eq!(store.get_normalized("binance", "spot", "BTCUSDT").await.unwrap(), Some("BTC-USDT".to_string()));

		store.set_normalized("binance", "spot", "BTCUSDT", "BTC-USD").await.unwrap();
		assert_eq!(store.get_normalized("binance", "spot", "BTCUSDT").await.unwrap(), Some("BTC-USD".to_string()));
	}
}
