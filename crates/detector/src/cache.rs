//! Per-user options cache: avoids a DB round trip on every candle for
//! every user by caching the decoded `UserOptions` for a TTL, invalidated
//! early if the cross-process invalidation table (polled via
//! `OptionsSource::invalidated_at_ms`) shows a write newer than the cache
//! entry. A user whose `options_json` fails to parse is logged once and
//! then silently skipped until their options change, rather than spamming
//! a parse-error log on every candle.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::warn;

use crate::options::UserOptions;

#[async_trait]
pub trait OptionsSource: Send + Sync {
	async fn active_users(&self) -> anyhow::Result<Vec<(i64, String)>>;
	async fn load_options_json(&self, user_id: i64) -> anyhow::Result<Option<String>>;
	async fn invalidated_at_ms(&self, user_id: i64) -> anyhow::Result<Option<i64>>;
}

struct CacheEntry {
	options: Arc<UserOptions>,
	loaded_at_ms: i64,
}

pub struct OptionsCache {
	ttl: Duration,
	entries: RwLock<HashMap<i64, CacheEntry>>,
	parse_failed: RwLock<HashSet<i64>>,
}

impl OptionsCache {
	#[must_use]
	pub fn new(ttl: Duration) -> Self {
		Self { ttl, entries: RwLock::new(HashMap::new()), parse_failed: RwLock::new(HashSet::new()) }
	}

	pub async fn get(&self, source: &dyn OptionsSource, user_id: i64, now_ms: i64) -> Option<Arc<UserOptions>> {
		if let Some(entry) = self.entries.read().await.get(&user_id) {
			if now_ms - entry.loaded_at_ms < self.ttl.as_millis() as i64 {
				let invalidated = source.invalidated_at_ms(user_id).await.ok().flatten().is_some_and(|ts| ts > entry.loaded_at_ms);
				if !invalidated {
					return Some(Arc::clone(&entry.options));
				}
			}
		}

		self.reload(source, user_id, now_ms).await
	}

	async fn reload(&self, source: &dyn OptionsSource, user_id: i64, now_ms: i64) -> Option<Arc<UserOptions>> {
		let raw = match source.load_options_json(user_id).await {
			Ok(Some(json)) => json,
			Ok(None) => return None,
			Err(err) => {
				warn!(user_id, error = %err, "failed to load user options");
				return None;
			},
		};

		match serde_json::from_str::<UserOptions>(&raw) {
			Ok(options) => {
				let options = Arc::new(options);
				self.entries.write().await.insert(user_id, CacheEntry { options: Arc::clone(&options), loaded_at_ms: now_ms });
				self.parse_failed.write().await.remove(&user_id);
				Some(options)
			},
			Err(err) => {
				let mut failed = self.parse_failed.write().await;
				if failed.insert(user_id) {
					warn!(user_id, error = %err, "failed to parse user options_json, skipping user until their options change");
				}
				None
			},
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	struct FakeSource {
		json: Option<String>,
	}

	#[async_trait]
	impl OptionsSource for FakeSource {
		async fn active_users(&self) -> anyhow::Result<Vec<(i64, String)>> {
			Ok(vec![])
		}

		async fn load_options_json(&self, _user_id: i64) -> anyhow::Result<Option<String>> {
			Ok(self.json.clone())
		}

		async fn invalidated_at_ms(&self, _user_id: i64) -> anyhow::Result<Option<i64>> {
			Ok(None)
		}
	}

	#[tokio::test]
	async fn caches_successfully_parsed_options() {
		let source = FakeSource { json: Some(r#"{"strategies":[]}"#.to_string()) };
		let cache = OptionsCache::new(Duration::from_secs(60));

		assert!(cache.get(&source, 1, 0).await.is_some());
		assert!(cache.get(&source, 1, 1_000).await.is_some());
	}

	#[tokio::test]
	async fn skips_user_on_parse_failure() {
		let source = FakeSource { json: Some("not json".to_string()) };
		let cache = OptionsCache::new(Duration::from_secs(60));

		assert!(cache.get(&source, 1, 0).await.is_none());
		assert!(cache.get(&source, 1, 1_000).await.is_none());
	}
}
