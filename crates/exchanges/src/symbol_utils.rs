//! Symbol normalization: extracting the base currency from an
//! exchange-native symbol so spikes on the same coin can be matched across
//! exchanges.

use std::sync::LazyLock;

const SEPARATORS: [char; 3] = ['_', '-', '/'];

static QUOTE_CURRENCIES: LazyLock<Vec<&'static str>> = LazyLock::new(|| {
	let mut quotes = vec![
		"USDT", "USDC", "BTC", "ETH", "BNB", "TRY", "EUR", "GBP", "AUD", "BRL", "BIDR", "AEUR", "TRX", "DOGE", "TUSD",
		"FDUSD",
	];
	// longest-match-first so e.g. "FDUSD" wins over "USD" were it present
	quotes.sort_by_key(|q| std::cmp::Reverse(q.len()));
	quotes
});

/// Extracts the base currency from a raw exchange symbol. Idempotent:
/// `normalize(normalize(x)) == normalize(x)` because a bare base currency
/// (no separator, not itself a quote currency) is returned unchanged.
#[must_use]
pub fn normalize_base(symbol: &str, exchange: &str, market: &str) -> Option<String> {
	if symbol.is_empty() {
		return None;
	}

	let upper = symbol.to_uppercase();

	if upper.len() <= 6 && !SEPARATORS.iter().any(|sep| upper.contains(*sep)) && !is_quote_currency(&upper) {
		return Some(upper);
	}

	if exchange.eq_ignore_ascii_case("hyperliquid") {
		return normalize_hyperliquid(&upper, market);
	}

	extract_base_standard(&upper)
}

fn normalize_hyperliquid(upper: &str, market: &str) -> Option<String> {
	if market.eq_ignore_ascii_case("linear") {
		return if is_quote_currency(upper) { None } else { Some(upper.to_string()) };
	}

	// spot: "PURR/USDC" or fused "TNSRUSDC"
	if let Some((base, quote)) = upper.split_once('/') {
		if is_quote_currency(quote) {
			return Some(base.to_string());
		}
	}

	if let Some(base) = strip_longest_quote_suffix(upper) {
		return Some(base);
	}

	extract_base_standard(upper)
}

fn extract_base_standard(upper: &str) -> Option<String> {
	for sep in SEPARATORS {
		if let Some((base, rest)) = upper.split_once(sep) {
			let quote = rest.split(sep).next().unwrap_or(rest);
			if is_quote_currency(quote) || base.len() >= 2 {
				return Some(base.to_string());
			}
		}
	}

	if let Some(base) = strip_longest_quote_suffix(upper) {
		return Some(base);
	}

	if upper.len() <= 10 {
		return Some(upper.to_string());
	}

	None
}

fn strip_longest_quote_suffix(upper: &str) -> Option<String> {
	for quote in QUOTE_CURRENCIES.iter() {
		if let Some(base) = upper.strip_suffix(quote) {
			if base.len() >= 2 {
				return Some(base.to_string());
			}
		}
	}
	None
}

fn is_quote_currency(value: &str) -> bool {
	QUOTE_CURRENCIES.iter().any(|q| *q == value)
}

/// Extracts the quote currency (the currency the pair is priced in), used
/// by the detector to look up per-quote thresholds.
#[must_use]
pub fn extract_quote(symbol: &str) -> Option<String> {
	let upper = symbol.to_uppercase();

	for sep in SEPARATORS {
		if let Some((_, rest)) = upper.split_once(sep) {
			let quote = rest.split(sep).next().unwrap_or(rest);
			if is_quote_currency(quote) {
				return Some(quote.to_string());
			}
		}
	}

	for quote in QUOTE_CURRENCIES.iter() {
		if upper.ends_with(quote) {
			return Some((*quote).to_string());
		}
	}

	None
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn normalizes_binance_style() {
		assert_eq!(normalize_base("BTCUSDT", "binance", "spot"), Some("BTC".to_string()));
		assert_eq!(normalize_base("ETHUSDT", "binance", "linear"), Some("ETH".to_string()));
	}

	#[test]
	fn normalizes_separated_symbols() {
		assert_eq!(normalize_base("BTC_USDT", "gate", "spot"), Some("BTC".to_string()));
		assert_eq!(normalize_base("BTC/USDC", "hyperliquid", "spot"), Some("BTC".to_string()));
	}

	#[test]
	fn normalizes_hyperliquid_linear_bare_symbol() {
		assert_eq!(normalize_base("BTC", "hyperliquid", "linear"), Some("BTC".to_string()));
	}

	#[test]
	fn normalizes_hyperliquid_fused_spot_symbol() {
		assert_eq!(normalize_base("TNSRUSDC", "hyperliquid", "spot"), Some("TNSR".to_string()));
	}

	#[test]
	fn is_idempotent() {
		for (sym, ex, mk) in [("BTCUSDT", "binance", "spot"), ("BTC/USDC", "hyperliquid", "spot"), ("BTC", "hyperliquid", "linear")]
		{
			let once = normalize_base(sym, ex, mk).unwrap();
			let twice = normalize_base(&once, ex, mk).unwrap();
			assert_eq!(once, twice);
		}
	}

	#[test]
	fn extracts_quote_currency() {
		assert_eq!(extract_quote("BTCUSDT"), Some("USDT".to_string()));
		assert_eq!(extract_quote("BTC_USDC"), Some("USDC".to_string()));
	}
}
