//! Main database connection, grounded on `leemthai-sniper`'s
//! `SqliteStorage::new` (`src/data/storage.rs`): connection options carry
//! WAL journaling, a busy timeout and `synchronous = NORMAL` so every
//! connection in the pool picks them up without per-query `PRAGMA` calls,
//! then `sqlx::migrate!` brings the schema up to date.

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;

#[derive(Clone)]
pub struct MainStore {
	pub(crate) pool: SqlitePool,
}

impl MainStore {
	pub async fn connect(db_path: &str) -> anyhow::Result<Self> {
		let url = if db_path == ":memory:" { "sqlite::memory:".to_string() } else { format!("sqlite://{db_path}") };
		let options = SqliteConnectOptions::from_str(&url)?
			.create_if_missing(true)
			.journal_mode(SqliteJournalMode::Wal)
			.busy_timeout(Duration::from_secs(30))
			.synchronous(SqliteSynchronous::Normal);

		let pool = SqlitePoolOptions::new().max_connections(5).connect_with(options).await?;

		sqlx::migrate!("./migrations").run(&pool).await?;

		Ok(Self { pool })
	}

	#[must_use]
	pub const fn pool(&self) -> &SqlitePool {
		&self.pool
	}
}
