//! User read-path (the `users` table is owned by the external account
//! subsystem; this crate only reads `options_json` and the invalidation
//! signal for the detector). "Active" means configured to receive
//! notifications: a non-empty Telegram token and chat id.

use async_trait::async_trait;
use detector::OptionsSource;

use crate::pool::MainStore;

impl MainStore {
	pub async fn active_users(&self) -> anyhow::Result<Vec<(i64, String)>> {
		let rows: Vec<(i64, String)> = sqlx::query_as("SELECT id, user FROM users WHERE tg_token != '' AND chat_id != ''").fetch_all(&self.pool).await?;
		Ok(rows)
	}

	pub async fn load_options_json(&self, user_id: i64) -> anyhow::Result<Option<String>> {
		let row: Option<(String,)> = sqlx::query_as("SELECT options_json FROM users WHERE id = ?").bind(user_id).fetch_optional(&self.pool).await?;
		Ok(row.map(|(json,)| json))
	}

	/// The account-level chat id notifications fall back to when no
	/// `conditionalTemplate` override applies.
	pub async fn chat_id_for_user(&self, user_id: i64) -> anyhow::Result<Option<String>> {
		let row: Option<(String,)> = sqlx::query_as("SELECT chat_id FROM users WHERE id = ?").bind(user_id).fetch_optional(&self.pool).await?;
		Ok(row.map(|(chat_id,)| chat_id))
	}

	/// Records an external write's invalidation timestamp (§9's polled
	/// cache-invalidate signal). The HTTP layer that owns user accounts
	/// calls this whenever it changes a user's `options_json`.
	pub async fn mark_options_invalidated(&self, user_id: i64, invalidated_at_ms: i64) -> anyhow::Result<()> {
		sqlx::query(
			"INSERT INTO user_cache_invalidations (user_id, invalidated_at) VALUES (?, ?) \
			 ON CONFLICT(user_id) DO UPDATE SET invalidated_at = excluded.invalidated_at",
		)
		.bind(user_id)
		.bind(invalidated_at_ms)
		.execute(&self.pool)
		.await?;
		Ok(())
	}

	pub async fn invalidated_at_ms(&self, user_id: i64) -> anyhow::Result<Option<i64>> {
		let row: Option<(i64,)> = sqlx::query_as("SELECT invalidated_at FROM user_cache_invalidations WHERE user_id = ?").bind(user_id).fetch_optional(&self.pool).await?;
		Ok(row.map(|(ts,)| ts))
	}
}

#[async_trait]
impl OptionsSource for MainStore {
	async fn active_users(&self) -> anyhow::Result<Vec<(i64, String)>> {
		Self::active_users(self).await
	}

	async fn load_options_json(&self, user_id: i64) -> anyhow::Result<Option<String>> {
		Self::load_options_json(self, user_id).await
	}

	async fn invalidated_at_ms(&self, user_id: i64) -> anyhow::Result<Option<i64>> {
		Self::invalidated_at_ms(self, user_id).await
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
	async fn only_users_with_telegram_configured_are_active() {
		let store = test_store().await;
		sqlx::query("INSERT INTO users (user, tg_token, chat_id) VALUES ('alice', 'tok', '123')").execute(&store.pool).await.unwrap();
		sqlx::query("INSERT INTO users (user) VALUES ('bob')").execute(&store.pool).await.unwrap();

		let active = store.active_users().await.unwrap();
		assert_eq!(active.len(), 1);
		assert_eq!(active[0].1, "alice");
	}

	#[tokio::test]
	async fn invalidation_timestamp_round_trips() {
		let store = test_store().await;
		sqlx::query("INSERT INTO users (user, tg_token, chat_id) VALUES ('alice', 'tok', '123')").execute(&store.pool).await.unwrap();

		assert!(store.invalidated_at_ms(1).await.unwrap().is_none());
		store.mark_options_invalidated(1, 5_000).await.unwrap();
		assert_eq!(store.invalidated_at_ms(1).await.unwrap(), Some(5_000));
	}
}
