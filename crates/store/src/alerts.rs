//! Alert persistence (§4.5): canonical alerts deduplicated by their
//! seven-field unique key, linked to users via `user_alerts`, with
//! orphan garbage collection on link deletion.

use sqlx::QueryBuilder;

use crate::models::{Alert, AlertFilters, Order};
use crate::pool::MainStore;

impl MainStore {
	/// Inserts or finds the canonical alert, then inserts-or-ignores the
	/// `(alert_id, user_id)` link. Idempotent per user: replaying the same
	/// candle for the same user never creates a second link.
	pub async fn add_alert(
		&self,
		ts: i64,
		exchange: &str,
		market: &str,
		symbol: &str,
		delta: f64,
		wick_pct: f64,
		volume_usdt: f64,
		user_id: i64,
		meta: Option<&str>,
	) -> anyhow::Result<i64> {
		let mut tx = self.pool.begin().await?;

		sqlx::query(
			"INSERT INTO alerts (ts, exchange, market, symbol, delta, wick_pct, volume_usdt, meta) \
			 VALUES (?, ?, ?, ?, ?, ?, ?, ?) \
			 ON CONFLICT(ts, exchange, market, symbol, delta, wick_pct, volume_usdt) DO NOTHING",
		)
		.bind(ts)
		.bind(exchange)
		.bind(market)
		.bind(symbol)
		.bind(delta)
		.bind(wick_pct)
		.bind(volume_usdt)
		.bind(meta)
		.execute(&mut *tx)
		.await?;

		let alert_id: i64 = sqlx::query_scalar(
			"SELECT id FROM alerts WHERE ts = ? AND exchange = ? AND market = ? AND symbol = ? \
			 AND delta = ? AND wick_pct = ? AND volume_usdt = ?",
		)
		.bind(ts)
		.bind(exchange)
		.bind(market)
		.bind(symbol)
		.bind(delta)
		.bind(wick_pct)
		.bind(volume_usdt)
		.fetch_one(&mut *tx)
		.await?;

		sqlx::query("INSERT OR IGNORE INTO user_alerts (alert_id, user_id) VALUES (?, ?)")
			.bind(alert_id)
			.bind(user_id)
			.execute(&mut *tx)
			.await?;

		tx.commit().await?;
		Ok(alert_id)
	}

	pub async fn get_alerts(&self, filters: &AlertFilters, limit: i64, offset: i64, order: Order) -> anyhow::Result<Vec<Alert>> {
		let mut query = select_builder(filters);
		query.push(match order {
			Order::TsDesc => " ORDER BY a.ts DESC",
			Order::TsAsc => " ORDER BY a.ts ASC",
		});
		query.push(" LIMIT ").push_bind(limit).push(" OFFSET ").push_bind(offset);

		let alerts = query.build_query_as::<Alert>().fetch_all(&self.pool).await?;
		Ok(alerts)
	}

	pub async fn count_alerts(&self, filters: &AlertFilters) -> anyhow::Result<i64> {
		let mut query = count_builder(filters);
		let count: i64 = query.build_query_scalar().fetch_one(&self.pool).await?;
		Ok(count)
	}

	/// Deletes `user_id`'s links matching `filters`, then garbage-collects
	/// any alert left with no remaining `user_alerts` row. `filters`'
	/// `exchange`/`market`/`symbol`/`since_ts`/`until_ts` are applied via a
	/// correlated `alerts` subselect using the same predicates as the read
	/// path (`push_filters`), so narrowing by e.g. `symbol` only deletes the
	/// matching subset of the user's links, not all of them.
	pub async fn delete_user_links(&self, user_id: i64, filters: &AlertFilters) -> anyhow::Result<u64> {
		let mut tx = self.pool.begin().await?;

		let mut query = QueryBuilder::new("DELETE FROM user_alerts WHERE user_id = ");
		query.push_bind(user_id);
		query.push(" AND alert_id IN (SELECT a.id FROM alerts a WHERE 1 = 1");
		push_filters(&mut query, filters);
		query.push(")");

		let deleted = query.build().execute(&mut *tx).await?.rows_affected();

		sqlx::query("DELETE FROM alerts WHERE id NOT IN (SELECT DISTINCT alert_id FROM user_alerts)").execute(&mut *tx).await?;

		tx.commit().await?;
		Ok(deleted)
	}
}

fn push_filters(query: &mut QueryBuilder<'_, sqlx::Sqlite>, filters: &AlertFilters) {
	if let Some(exchange) = &filters.exchange {
		query.push(" AND a.exchange = ").push_bind(exchange.clone());
	}
	if let Some(market) = &filters.market {
		query.push(" AND a.market = ").push_bind(market.clone());
	}
	if let Some(symbol) = &filters.symbol {
		query.push(" AND a.symbol = ").push_bind(symbol.clone());
	}
	if let Some(since) = filters.since_ts {
		query.push(" AND a.ts >= ").push_bind(since);
	}
	if let Some(until) = filters.until_ts {
		query.push(" AND a.ts <= ").push_bind(until);
	}
}

fn select_builder(filters: &AlertFilters) -> QueryBuilder<'_, sqlx::Sqlite> {
	let mut query = if let Some(user_id) = filters.user_id {
		let mut q = QueryBuilder::new(
			"SELECT a.id, a.ts, a.exchange, a.market, a.symbol, a.delta, a.wick_pct, a.volume_usdt, a.meta, a.created_at \
			 FROM alerts a INNER JOIN user_alerts ua ON ua.alert_id = a.id WHERE ua.user_id = ",
		);
		q.push_bind(user_id);
		q
	} else {
		QueryBuilder::new(
			"SELECT a.id, a.ts, a.exchange, a.market, a.symbol, a.delta, a.wick_pct, a.volume_usdt, a.meta, a.created_at \
			 FROM alerts a WHERE 1 = 1",
		)
	};
	push_filters(&mut query, filters);
	query
}

fn count_builder(filters: &AlertFilters) -> QueryBuilder<'_, sqlx::Sqlite> {
	let mut query = if let Some(user_id) = filters.user_id {
		let mut q = QueryBuilder::new("SELECT COUNT(*) FROM alerts a INNER JOIN user_alerts ua ON ua.alert_id = a.id WHERE ua.user_id = ");
		q.push_bind(user_id);
		q
	} else {
		QueryBuilder::new("SELECT COUNT(*) FROM alerts a WHERE 1 = 1")
	};
	push_filters(&mut query, filters);
	query
}

#[cfg(test)]
mod tests {
	use super::*;

	async fn test_store() -> MainStore {
		let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
		sqlx::migrate!("./migrations").run(&pool).await.unwrap();
		MainStore { pool }
	}

	async fn seed_user(store: &MainStore, name: &str) -> i64 {
		sqlx::query_scalar("INSERT INTO users (user) VALUES (?) RETURNING id").bind(name).fetch_one(&store.pool).await.unwrap()
	}

	#[tokio::test]
	async fn same_candle_two_users_one_alert_two_links() {
		let store = test_store().await;
		let u1 = seed_user(&store, "alice").await;
		let u2 = seed_user(&store, "bob").await;

		let a1 = store.add_alert(1_000, "binance", "spot", "BTCUSDT", 5.0, 1.0, 1000.0, u1, None).await.unwrap();
		let a2 = store.add_alert(1_000, "binance", "spot", "BTCUSDT", 5.0, 1.0, 1000.0, u2, None).await.unwrap();
		assert_eq!(a1, a2);

		let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM alerts").fetch_one(&store.pool).await.unwrap();
		assert_eq!(count, 1);
		let links: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM user_alerts").fetch_one(&store.pool).await.unwrap();
		assert_eq!(links, 2);
	}

	#[tokio::test]
	async fn add_alert_is_idempotent_per_user() {
		let store = test_store().await;
		let u1 = seed_user(&store, "alice").await;

		store.add_alert(1_000, "binance", "spot", "BTCUSDT", 5.0, 1.0, 1000.0, u1, None).await.unwrap();
		store.add_alert(1_000, "binance", "spot", "BTCUSDT", 5.0, 1.0, 1000.0, u1, None).await.unwrap();

		let links: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM user_alerts").fetch_one(&store.pool).await.unwrap();
		assert_eq!(links, 1);
	}

	#[tokio::test]
	async fn delete_user_links_garbage_collects_orphaned_alerts() {
		let store = test_store().await;
		let u1 = seed_user(&store, "alice").await;
		store.add_alert(1_000, "binance", "spot", "BTCUSDT", 5.0, 1.0, 1000.0, u1, None).await.unwrap();

		store.delete_user_links(u1, &AlertFilters::default()).await.unwrap();

		let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM alerts").fetch_one(&store.pool).await.unwrap();
		assert_eq!(count, 0);
	}

	#[tokio::test]
	async fn delete_user_links_honors_symbol_filter() {
		let store = test_store().await;
		let u1 = seed_user(&store, "alice").await;
		store.add_alert(1_000, "binance", "spot", "BTCUSDT", 5.0, 1.0, 1000.0, u1, None).await.unwrap();
		store.add_alert(2_000, "binance", "spot", "ETHUSDT", 6.0, 2.0, 2000.0, u1, None).await.unwrap();

		let filters = AlertFilters { symbol: Some("BTCUSDT".to_string()), ..Default::default() };
		let deleted = store.delete_user_links(u1, &filters).await.unwrap();
		assert_eq!(deleted, 1);

		let remaining = store.get_alerts(&AlertFilters { user_id: Some(u1), ..Default::default() }, 10, 0, Order::TsDesc).await.unwrap();
		assert_eq!(remaining.len(), 1);
		assert_eq!(remaining[0].symbol, "ETHUSDT");
	}

	#[tokio::test]
	async fn get_alerts_filters_by_user() {
		let store = test_store().await;
		let u1 = seed_user(&store, "alice").await;
		let u2 = seed_user(&store, "bob").await;
		store.add_alert(1_000, "binance", "spot", "BTCUSDT", 5.0, 1.0, 1000.0, u1, None).await.unwrap();
		store.add_alert(2_000, "binance", "spot", "ETHUSDT", 6.0, 2.0, 2000.0, u2, None).await.unwrap();

		let filters = AlertFilters { user_id: Some(u1), ..Default::default() };
		let alerts = store.get_alerts(&filters, 10, 0, Order::TsDesc).await.unwrap();
		assert_eq!(alerts.len(), 1);
		assert_eq!(alerts[0].symbol, "BTCUSDT");
	}
}
