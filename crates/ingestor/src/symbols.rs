//! Periodic symbol reconciliation: refreshes each `(exchange, market)`'s
//! tradable set from `SymbolRegistry`, drops blacklisted symbols, persists
//! the normalized base/quote split, updates the symbol-count gauge, diffs
//! against the last-known set, and forwards `(added, removed)` into that
//! pair's `ConnectionPool`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{RwLock, mpsc, watch};
use tracing::{debug, warn};

use exchanges::symbol_utils::{extract_quote, normalize_base};
use exchanges::{ConnectionPool, Exchange, ExchangeDriver, Market, StreamEvent, SymbolRegistry};
use metrics::Metrics;
use store::{MainStore, SymbolNormalizationStore};

pub type PoolMap = HashMap<(Exchange, Market), Arc<ConnectionPool<Box<dyn ExchangeDriver>>>>;
type LastKnown = RwLock<HashMap<(Exchange, Market), HashSet<String>>>;

/// Fetches, filters and republishes the symbol set for every configured
/// pair once; used both for the first sync before any pool connects and
/// as the body of the periodic loop below.
#[allow(clippy::too_many_arguments)]
pub async fn sync_once(
	registry: &SymbolRegistry,
	pools: &PoolMap,
	last_known: &LastKnown,
	store: &MainStore,
	normalization: &SymbolNormalizationStore,
	metrics: &Metrics,
	pairs: &[(Exchange, Market)],
	events: &mpsc::Sender<StreamEvent>,
	shutdown: &watch::Receiver<bool>,
) {
	for &(exchange, market) in pairs {
		match registry.refresh(exchange, market).await {
			Ok(symbols) => {
				let filtered = filter_blacklisted(store, exchange, market, &symbols).await;
				persist_normalized(normalization, exchange, market, &filtered).await;
				metrics.set_symbols_count(exchange, market, filtered.len() as u64).await;

				let fresh: HashSet<String> = filtered.into_iter().collect();
				let mut known = last_known.write().await;
				let previous = known.entry((exchange, market)).or_default();

				let added: Vec<String> = fresh.difference(previous).cloned().collect();
				let removed: Vec<String> = previous.difference(&fresh).cloned().collect();
				*previous = fresh;
				drop(known);

				if let Some(pool) = pools.get(&(exchange, market)) {
					if !added.is_empty() || !removed.is_empty() {
						pool.reconcile(&added, &removed, events.clone(), shutdown.clone()).await;
					}
				}
				debug!(%exchange, %market, added = added.len(), removed = removed.len(), "synced symbol set");
			},
			Err(err) => warn!(%exchange, %market, error = %err, "symbol refresh failed, keeping previous subscriptions"),
		}
	}
}

async fn filter_blacklisted(store: &MainStore, exchange: Exchange, market: Market, symbols: &[String]) -> Vec<String> {
	let blacklist = store.blacklist_for(exchange.as_str(), market.as_str()).await.unwrap_or_else(|err| {
		warn!(%exchange, %market, error = %err, "failed to load blacklist, ingesting full symbol set");
		Vec::new()
	});
	let blocked: HashSet<&str> = blacklist.iter().map(|entry| entry.symbol.as_str()).collect();
	symbols.iter().filter(|s| !blocked.contains(s.as_str())).cloned().collect()
}

async fn persist_normalized(normalization: &SymbolNormalizationStore, exchange: Exchange, market: Market, symbols: &[String]) {
	for symbol in symbols {
		let Some(base) = normalize_base(symbol, exchange.as_str(), market.as_str()) else { continue };
		let quote = extract_quote(symbol).unwrap_or_default();
		let normalized = format!("{base}-{quote}");
		if let Err(err) = normalization.set_normalized(exchange.as_str(), market.as_str(), symbol, &normalized).await {
			warn!(%exchange, %market, %symbol, error = %err, "failed to persist symbol normalization");
		}
	}
}

/// Runs `sync_once` on a timer; never returns.
#[allow(clippy::too_many_arguments)]
pub async fn run(
	registry: Arc<SymbolRegistry>,
	pools: Arc<PoolMap>,
	last_known: Arc<LastKnown>,
	store: MainStore,
	normalization: SymbolNormalizationStore,
	metrics: Arc<Metrics>,
	pairs: Vec<(Exchange, Market)>,
	refresh_interval: Duration,
	events: mpsc::Sender<StreamEvent>,
	shutdown: watch::Receiver<bool>,
) {
	let mut ticker = tokio::time::interval(refresh_interval);
	ticker.tick().await; // first tick fires immediately; the caller already did the initial sync
	loop {
		ticker.tick().await;
		sync_once(&registry, &pools, &last_known, &store, &normalization, &metrics, &pairs, &events, &shutdown).await;
	}
}
