//! Symbol Registry: periodically fetches the tradable symbol set for each
//! `(exchange, market)` pair over REST and republishes it so the connection
//! pool can reconcile its subscriptions.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::types::{Exchange, Market};

const REST_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum RegistryError {
	#[error("transient error fetching symbols for {exchange}/{market}: {source}")]
	Transient { exchange: Exchange, market: Market, #[source] source: reqwest::Error },
	#[error("permanent error fetching symbols for {exchange}/{market}: {reason}")]
	Permanent { exchange: Exchange, market: Market, reason: String },
}

/// Read-only snapshot of the currently known symbol set for one
/// `(exchange, market)` pair; reconciliation builds a new owned `Vec` and
/// swaps it in under the write lock, never mutating in place.
#[derive(Default)]
pub struct SymbolRegistry {
	client: reqwest::Client,
	sets: RwLock<HashMap<(Exchange, Market), Arc<Vec<String>>>>,
}

impl SymbolRegistry {
	#[must_use]
	pub fn new() -> Self {
		Self { client: reqwest::Client::new(), sets: RwLock::new(HashMap::new()) }
	}

	#[must_use]
	pub async fn symbols(&self, exchange: Exchange, market: Market) -> Arc<Vec<String>> {
		self.sets.read().await.get(&(exchange, market)).cloned().unwrap_or_default()
	}

	/// Fetches the live symbol set and atomically replaces the cached one.
	/// Returns the new set so the caller can diff it against the previous
	/// connection-pool subscriptions.
	pub async fn refresh(&self, exchange: Exchange, market: Market) -> Result<Arc<Vec<String>>, RegistryError> {
		let fetched = fetch_symbols(&self.client, exchange, market).await?;
		let fetched = Arc::new(fetched);
		self.sets.write().await.insert((exchange, market), Arc::clone(&fetched));
		Ok(fetched)
	}

	/// Spawns the periodic refresh loop for every exchange/market pair this
	/// process cares about; never returns.
	pub async fn run(self: Arc<Self>, pairs: Vec<(Exchange, Market)>, interval: Duration) {
		let mut ticker = tokio::time::interval(interval);
		loop {
			ticker.tick().await;
			for &(exchange, market) in &pairs {
				match self.refresh(exchange, market).await {
					Ok(symbols) => debug!(%exchange, %market, count = symbols.len(), "refreshed symbol registry"),
					Err(RegistryError::Transient { exchange, market, source }) => {
						warn!(%exchange, %market, error = %source, "transient symbol registry fetch failure, keeping stale set");
					},
					Err(err @ RegistryError::Permanent { .. }) => {
						warn!(error = %err, "permanent symbol registry fetch failure, keeping stale set");
					},
				}
			}
		}
	}
}

async fn fetch_symbols(client: &reqwest::Client, exchange: Exchange, market: Market) -> Result<Vec<String>, RegistryError> {
	match exchange {
		Exchange::Binance => fetch_binance(client, market).await,
		Exchange::Bybit => fetch_bybit(client, market).await,
		Exchange::Bitget => fetch_bitget(client, market).await,
		Exchange::Gate => fetch_gate(client, market).await,
		Exchange::Hyperliquid => fetch_hyperliquid(client, market).await,
	}
}

fn transient(exchange: Exchange, market: Market, source: reqwest::Error) -> RegistryError {
	RegistryError::Transient { exchange, market, source }
}

const BINANCE_SPOT_QUOTES: &[&str] = &["BTC", "ETH", "USDT", "BNB", "USD", "TUSD", "BRL", "USDC", "TRX", "EUR", "DOGE", "FDUSD", "IDR"];
const BINANCE_FAPI_QUOTES: &[&str] = &["USDT", "USDC", "BTC"];

#[derive(Deserialize)]
struct BinanceExchangeInfo {
	symbols: Vec<BinanceSymbolInfo>,
}

#[derive(Deserialize)]
struct BinanceSymbolInfo {
	symbol: String,
	status: String,
	#[serde(rename = "quoteAsset")]
	quote_asset: String,
	#[serde(rename = "baseAsset", default)]
	base_asset: String,
	#[serde(rename = "contractType", default)]
	contract_type: Option<String>,
}

async fn fetch_binance(client: &reqwest::Client, market: Market) -> Result<Vec<String>, RegistryError> {
	let (url, quotes): (&str, &[&str]) = match market {
		Market::Spot => ("https://api.binance.com/api/v3/exchangeInfo", BINANCE_SPOT_QUOTES),
		Market::Linear => ("https://fapi.binance.com/fapi/v1/exchangeInfo", BINANCE_FAPI_QUOTES),
	};

	let info: BinanceExchangeInfo = client
		.get(url)
		.timeout(REST_TIMEOUT)
		.send()
		.await
		.map_err(|e| transient(Exchange::Binance, market, e))?
		.error_for_status()
		.map_err(|e| transient(Exchange::Binance, market, e))?
		.json()
		.await
		.map_err(|e| transient(Exchange::Binance, market, e))?;

	let symbols = info
		.symbols
		.into_iter()
		.filter(|s| s.status == "TRADING")
		.filter_map(|s| match market {
			Market::Spot => quotes.contains(&s.quote_asset.as_str()).then_some(s.symbol),
			Market::Linear => {
				let is_perp = s.contract_type.as_deref() == Some("PERPETUAL");
				(is_perp && quotes.contains(&s.quote_asset.as_str())).then(|| format!("{}{}", s.base_asset, s.quote_asset).to_uppercase())
			},
		})
		.collect();

	Ok(symbols)
}

#[derive(Deserialize)]
struct BybitResponse {
	#[serde(rename = "retCode")]
	ret_code: i64,
	result: BybitResult,
}

#[derive(Deserialize)]
struct BybitResult {
	list: Vec<BybitInstrument>,
}

#[derive(Deserialize)]
struct BybitInstrument {
	symbol: String,
	status: String,
}

async fn fetch_bybit(client: &reqwest::Client, market: Market) -> Result<Vec<String>, RegistryError> {
	let category = market.as_str();
	let resp: BybitResponse = client
		.get("https://api.bybit.com/v5/market/instruments-info")
		.query(&[("category", category), ("limit", "1000")])
		.timeout(REST_TIMEOUT)
		.send()
		.await
		.map_err(|e| transient(Exchange::Bybit, market, e))?
		.error_for_status()
		.map_err(|e| transient(Exchange::Bybit, market, e))?
		.json()
		.await
		.map_err(|e| transient(Exchange::Bybit, market, e))?;

	if resp.ret_code != 0 {
		return Err(RegistryError::Permanent { exchange: Exchange::Bybit, market, reason: format!("retCode {}", resp.ret_code) });
	}

	let spot_quotes = ["USDT", "USDC", "BTC", "ETH", "EUR"];
	let symbols = resp
		.result
		.list
		.into_iter()
		.filter(|i| i.status.eq_ignore_ascii_case("trading") || i.status == "1")
		.filter(|i| match market {
			Market::Spot => spot_quotes.iter().any(|q| i.symbol.ends_with(q)),
			Market::Linear => i.symbol.ends_with("USDT"),
		})
		.map(|i| i.symbol)
		.collect();

	Ok(symbols)
}

#[derive(Deserialize)]
struct BitgetSpotResponse {
	data: Vec<BitgetSpotSymbol>,
}

#[derive(Deserialize)]
struct BitgetSpotSymbol {
	symbol: String,
	status: String,
	#[serde(rename = "quoteCoin")]
	quote_coin: String,
}

#[derive(Deserialize)]
struct BitgetMixResponse {
	data: Option<Vec<BitgetMixSymbol>>,
}

#[derive(Deserialize)]
struct BitgetMixSymbol {
	symbol: Option<String>,
	#[serde(rename = "instId")]
	inst_id: Option<String>,
	status: Option<String>,
	state: Option<String>,
}

async fn fetch_bitget(client: &reqwest::Client, market: Market) -> Result<Vec<String>, RegistryError> {
	match market {
		Market::Spot => {
			let resp: BitgetSpotResponse = client
				.get("https://api.bitget.com/api/v2/spot/public/symbols")
				.timeout(REST_TIMEOUT)
				.send()
				.await
				.map_err(|e| transient(Exchange::Bitget, market, e))?
				.error_for_status()
				.map_err(|e| transient(Exchange::Bitget, market, e))?
				.json()
				.await
				.map_err(|e| transient(Exchange::Bitget, market, e))?;

			let mut symbols: Vec<String> = resp
				.data
				.into_iter()
				.filter(|s| s.status == "online" && s.quote_coin == "USDT" && s.symbol.ends_with("USDT"))
				.map(|s| s.symbol)
				.collect();
			symbols.sort();
			Ok(symbols)
		},
		Market::Linear => {
			const ENDPOINTS: &[&str] = &[
				"https://api.bitget.com/api/v2/mix/market/tickers?productType=USDT-FUTURES",
				"https://api.bitget.com/api/v2/mix/market/contracts?productType=USDT-FUTURES",
			];
			for url in ENDPOINTS {
				let resp = client.get(*url).timeout(REST_TIMEOUT).send().await;
				let Ok(resp) = resp else { continue };
				let Ok(resp) = resp.error_for_status() else { continue };
				let Ok(parsed) = resp.json::<BitgetMixResponse>().await else { continue };
				let Some(rows) = parsed.data else { continue };

				let mut symbols: Vec<String> = rows
					.into_iter()
					.filter_map(|it| {
						let sym = it.symbol.or(it.inst_id)?;
						let status = it.status.or(it.state).unwrap_or_default().to_lowercase();
						let ok = status.is_empty() || matches!(status.as_str(), "online" | "normal" | "trading");
						(sym.ends_with("USDT") && ok).then_some(sym)
					})
					.collect();

				if !symbols.is_empty() {
					symbols.sort();
					symbols.dedup();
					return Ok(symbols);
				}
			}
			Ok(Vec::new())
		},
	}
}

#[derive(Deserialize)]
struct GateSpotPair {
	id: String,
	trade_status: String,
}

#[derive(Deserialize)]
struct GateFuturesContract {
	name: String,
	status: String,
}

async fn fetch_gate(client: &reqwest::Client, market: Market) -> Result<Vec<String>, RegistryError> {
	match market {
		Market::Spot => {
			let pairs: Vec<GateSpotPair> = client
				.get("https://api.gateio.ws/api/v4/spot/currency_pairs")
				.timeout(REST_TIMEOUT)
				.send()
				.await
				.map_err(|e| transient(Exchange::Gate, market, e))?
				.error_for_status()
				.map_err(|e| transient(Exchange::Gate, market, e))?
				.json()
				.await
				.map_err(|e| transient(Exchange::Gate, market, e))?;
			Ok(pairs.into_iter().filter(|p| p.trade_status == "tradable").map(|p| p.id).collect())
		},
		Market::Linear => {
			let contracts: Vec<GateFuturesContract> = client
				.get("https://api.gateio.ws/api/v4/futures/usdt/contracts")
				.timeout(REST_TIMEOUT)
				.send()
				.await
				.map_err(|e| transient(Exchange::Gate, market, e))?
				.error_for_status()
				.map_err(|e| transient(Exchange::Gate, market, e))?
				.json()
				.await
				.map_err(|e| transient(Exchange::Gate, market, e))?;
			Ok(contracts.into_iter().filter(|c| c.status == "trading").map(|c| c.name).collect())
		},
	}
}

#[derive(Deserialize)]
struct HyperliquidSpotMeta {
	universe: Vec<HyperliquidSpotUniverseItem>,
}

#[derive(Deserialize)]
struct HyperliquidSpotUniverseItem {
	name: String,
}

#[derive(Deserialize)]
struct HyperliquidPerpMeta {
	universe: Vec<HyperliquidPerpUniverseItem>,
}

#[derive(Deserialize)]
struct HyperliquidPerpUniverseItem {
	name: String,
	#[serde(rename = "isDelisted", default)]
	is_delisted: bool,
}

async fn fetch_hyperliquid(client: &reqwest::Client, market: Market) -> Result<Vec<String>, RegistryError> {
	let payload = match market {
		Market::Spot => serde_json::json!({ "type": "spotMeta" }),
		Market::Linear => serde_json::json!({ "type": "meta" }),
	};

	let response = client
		.post("https://api.hyperliquid.xyz/info")
		.json(&payload)
		.timeout(REST_TIMEOUT)
		.send()
		.await
		.map_err(|e| transient(Exchange::Hyperliquid, market, e))?
		.error_for_status()
		.map_err(|e| transient(Exchange::Hyperliquid, market, e))?;

	let mut symbols = match market {
		Market::Spot => {
			let meta: HyperliquidSpotMeta = response.json().await.map_err(|e| transient(Exchange::Hyperliquid, market, e))?;
			meta.universe.into_iter().map(|item| item.name).collect::<Vec<_>>()
		},
		Market::Linear => {
			let meta: HyperliquidPerpMeta = response.json().await.map_err(|e| transient(Exchange::Hyperliquid, market, e))?;
			meta.universe.into_iter().filter(|item| !item.is_delisted).map(|item| item.name).collect::<Vec<_>>()
		},
	};

	symbols.sort();
	symbols.dedup();
	Ok(symbols)
}
