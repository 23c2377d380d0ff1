//! Placeholder substitution for message/caption templates (§4.6):
//! `{delta_formatted}`, `{volume_formatted}`, `{wick_formatted}`,
//! `{timestamp}`, `{direction}`, `{exchange_market}`,
//! `{exchange_market_short}`, `{symbol}`, `{time}`.

use chrono::TimeZone;
use chrono_tz::Tz;

use detector::SpikeMatch;
use exchanges::Candle;

/// `exchange_market` renders as `"{exchange}/{market}"`; `exchange_market_short`
/// drops the market suffix, leaving just the exchange name. Neither form is
/// specified further upstream, so this is the chosen, documented rendering
/// (see DESIGN.md).
#[must_use]
pub fn render(template: &str, spike: &SpikeMatch, candle: &Candle, timezone: &str) -> String {
	let direction = if candle.is_up() { "🟢" } else { "🔴" };
	let symbol = split_symbol(&candle.symbol);
	let exchange_market = format!("{}/{}", candle.exchange, candle.market);
	let exchange_market_short = candle.exchange.to_string();
	let timestamp = candle.ts_ms;
	let time = format_time(candle.ts_ms, timezone);

	template
		.replace("{delta_formatted}", &format!("{:+.2}%", spike.delta))
		.replace("{volume_formatted}", &format!("{:.0}", spike.volume_usdt))
		.replace("{wick_formatted}", &format!("{:.2}%", spike.wick_pct))
		.replace("{timestamp}", &timestamp.to_string())
		.replace("{direction}", direction)
		.replace("{exchange_market}", &exchange_market)
		.replace("{exchange_market_short}", &exchange_market_short)
		.replace("{symbol}", &symbol)
		.replace("{time}", &time)
}

/// Best-effort `BASE-QUOTE` split: exchange wire symbols carry no
/// separator (`BTCUSDT`), so this guesses on the common quote-currency
/// suffixes the symbol registry filters by.
fn split_symbol(symbol: &str) -> String {
	const QUOTES: &[&str] = &["USDT", "USDC", "USD", "BTC", "ETH"];
	for quote in QUOTES {
		if let Some(base) = symbol.strip_suffix(quote) {
			if !base.is_empty() {
				return format!("{base}-{quote}");
			}
		}
	}
	symbol.to_string()
}

fn format_time(ts_ms: i64, timezone: &str) -> String {
	let tz: Tz = timezone.parse().unwrap_or(chrono_tz::UTC);
	chrono::Utc
		.timestamp_millis_opt(ts_ms)
		.single()
		.map_or_else(|| ts_ms.to_string(), |utc| utc.with_timezone(&tz).format("%Y-%m-%d %H:%M:%S").to_string())
}

/// Synthesized fallback when the user's template is empty (§4.6).
#[must_use]
pub fn default_message(spike: &SpikeMatch, candle: &Candle, timezone: &str) -> String {
	let direction = if candle.is_up() { "🟢" } else { "🔴" };
	format!(
		"{direction} <b>{}</b> {}\nΔ {:+.2}%  |  wick {:.2}%  |  vol {:.0}\n{}",
		split_symbol(&candle.symbol),
		candle.exchange,
		spike.delta,
		spike.wick_pct,
		spike.volume_usdt,
		format_time(candle.ts_ms, timezone),
	)
}

#[cfg(test)]
mod tests {
	use super::*;
	use exchanges::{Exchange, Market};

	fn spike() -> SpikeMatch {
		SpikeMatch { user_id: 1, user_name: "alice".to_string(), strategy: "big-move".to_string(), delta: 7.5, wick_pct: 2.0, volume_usdt: 150_000.0 }
	}

	fn candle() -> Candle {
		Candle { exchange: Exchange::Binance, market: Market::Spot, symbol: "BTCUSDT".to_string(), ts_ms: 1_700_000_000_000, open: 100.0, high: 110.0, low: 99.0, close: 108.0, volume: 10.0 }
	}

	#[test]
	fn substitutes_all_placeholders() {
		let template = "{symbol} on {exchange_market} ({exchange_market_short}) {direction} {delta_formatted} {wick_formatted} {volume_formatted} {time} {timestamp}";
		let rendered = render(template, &spike(), &candle(), "UTC");
		assert!(rendered.contains("BTC-USDT"));
		assert!(rendered.contains("binance/spot"));
		assert!(rendered.contains("binance"));
		assert!(rendered.contains("🟢"));
		assert!(rendered.contains("+7.50%"));
		assert!(!rendered.contains('{'));
	}

	#[test]
	fn default_message_is_non_empty_html() {
		let message = default_message(&spike(), &candle(), "UTC");
		assert!(message.contains("BTC-USDT"));
	}
}
