use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Alert {
	pub id: i64,
	pub ts: i64,
	pub exchange: String,
	pub market: String,
	pub symbol: String,
	pub delta: f64,
	pub wick_pct: f64,
	pub volume_usdt: f64,
	pub meta: Option<String>,
	pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ErrorRecord {
	pub id: i64,
	pub timestamp: DateTime<Utc>,
	pub exchange: Option<String>,
	pub error_type: String,
	pub error_message: String,
	pub connection_id: Option<String>,
	pub market: Option<String>,
	pub symbol: Option<String>,
	pub stack_trace: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ExchangeStatistics {
	pub exchange: String,
	pub market: String,
	pub symbols_count: i64,
	pub ws_connections: i64,
	pub batches_per_ws: Option<i64>,
	pub reconnects: i64,
	pub candles_count: i64,
	pub last_candle_time: Option<DateTime<Utc>>,
	pub ticks_per_second: Option<f64>,
}

/// Read-path filters for `MainStore::get_alerts`/`count_alerts`. `user_id`
/// present means an inner join against `user_alerts`; absent means the
/// global `alerts` set.
#[derive(Debug, Clone, Default)]
pub struct AlertFilters {
	pub user_id: Option<i64>,
	pub exchange: Option<String>,
	pub market: Option<String>,
	pub symbol: Option<String>,
	pub since_ts: Option<i64>,
	pub until_ts: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Order {
	#[default]
	TsDesc,
	TsAsc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ExchangeBlacklistEntry {
	pub exchange: String,
	pub market: String,
	pub symbol: String,
}
