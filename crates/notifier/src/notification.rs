//! Ties together template selection, chart generation and the Telegram
//! send path for one `SpikeMatch` (§4.6's message-selection rule).

use detector::{SpikeDetector, SpikeMatch, UserOptions};
use exchanges::{Candle, Market};

use crate::chart::ChartRenderer;
use crate::dispatcher::{SendOutcome, TelegramDispatcher};
use crate::template::{default_message, render};

pub struct NotificationDispatcher {
	telegram: TelegramDispatcher,
	charts: ChartRenderer,
}

impl NotificationDispatcher {
	#[must_use]
	pub fn new(bot_token: &str) -> Self {
		Self { telegram: TelegramDispatcher::new(bot_token), charts: ChartRenderer::new() }
	}

	/// Sends one message (and optionally a chart) for `spike` to `options`'s
	/// user. `default_chat_id` is the user's account-level chat id, used
	/// when no matching `conditionalTemplate` (or the default path) sets
	/// its own.
	pub async fn notify(&self, detector: &SpikeDetector, spike: &SpikeMatch, options: &UserOptions, candle: &Candle, default_chat_id: &str) -> Vec<SendOutcome> {
		let sends = select_messages(detector, options, spike, candle, default_chat_id).await;
		let mut outcomes = Vec::with_capacity(sends.len());

		for (text, chat_id) in sends {
			let market_key = if candle.market == Market::Linear { "futures" } else { "spot" };
			let quote = quote_of(&candle.symbol);

			if options.should_send_chart(&candle.exchange.to_string(), market_key, quote.as_deref()) {
				match self.charts.render(candle.exchange, candle.market, &candle.symbol, candle.ts_ms, candle.open).await {
					Ok(Some(png)) => {
						outcomes.push(self.telegram.send_photo(&chat_id, png, &text).await);
						continue;
					},
					Ok(None) => {},
					Err(err) => tracing::warn!(error = %err, "chart generation failed, falling back to text"),
				}
			}

			outcomes.push(self.telegram.send_message(&chat_id, &text).await);
		}

		outcomes
	}
}

/// Picks `(rendered_text, chat_id)` pairs per §4.6: every enabled
/// conditional template whose conditions match the candle fires;
/// if none match, falls back to the user's default template (or a
/// synthesized message if that's empty) and default chat id. Conditions
/// are evaluated through `detector`'s series-aware path so a template
/// containing a `series` condition sees the same ring the detector does.
async fn select_messages(detector: &SpikeDetector, options: &UserOptions, spike: &SpikeMatch, candle: &Candle, default_chat_id: &str) -> Vec<(String, String)> {
	let mut matched = Vec::new();
	for t in options.conditional_templates.iter().filter(|t| t.enabled) {
		if detector.conditions_match(spike.user_id, candle, &t.conditions).await {
			let chat_id = t.chat_id.clone().unwrap_or_else(|| default_chat_id.to_string());
			matched.push((render(&t.template, spike, candle, &options.timezone), chat_id));
		}
	}

	if !matched.is_empty() {
		return matched;
	}

	let text = match &options.message_template {
		Some(template) if !template.is_empty() => render(template, spike, candle, &options.timezone),
		_ => default_message(spike, candle, &options.timezone),
	};
	vec![(text, default_chat_id.to_string())]
}

fn quote_of(symbol: &str) -> Option<String> {
	const QUOTES: &[&str] = &["USDT", "USDC", "USD", "BTC", "ETH"];
	QUOTES.iter().find(|q| symbol.ends_with(*q)).map(|q| (*q).to_string())
}

#[cfg(test)]
mod tests {
	use super::*;
	use async_trait::async_trait;
	use detector::{Condition, OptionsSource};
	use exchanges::Exchange;
	use std::sync::Arc;
	use std::time::Duration;

	fn spike() -> SpikeMatch {
		SpikeMatch { user_id: 1, user_name: "alice".to_string(), strategy: "big-move".to_string(), delta: 7.5, wick_pct: 2.0, volume_usdt: 150_000.0 }
	}

	fn candle() -> Candle {
		Candle { exchange: Exchange::Binance, market: Market::Spot, symbol: "BTCUSDT".to_string(), ts_ms: 0, open: 100.0, high: 110.0, low: 99.0, close: 108.0, volume: 10.0 }
	}

	/// `select_messages` only needs a detector to evaluate conditions; none
	/// of these tests touch `OptionsCache`/`OptionsSource`, so a detector
	/// with an empty source is enough to exercise `conditions_match`.
	struct EmptySource;

	#[async_trait]
	impl OptionsSource for EmptySource {
		async fn active_users(&self) -> anyhow::Result<Vec<(i64, String)>> {
			Ok(Vec::new())
		}

		async fn load_options_json(&self, _user_id: i64) -> anyhow::Result<Option<String>> {
			Ok(None)
		}

		async fn invalidated_at_ms(&self, _user_id: i64) -> anyhow::Result<Option<i64>> {
			Ok(None)
		}
	}

	fn detector() -> SpikeDetector {
		SpikeDetector::new(Arc::new(EmptySource), Duration::from_secs(60))
	}

	#[tokio::test]
	async fn falls_back_to_default_template_when_no_conditional_matches() {
		let options = UserOptions { message_template: Some("hi {symbol}".to_string()), ..Default::default() };
		let sends = select_messages(&detector(), &options, &spike(), &candle(), "42").await;
		assert_eq!(sends.len(), 1);
		assert!(sends[0].0.contains("BTC-USDT"));
		assert_eq!(sends[0].1, "42");
	}

	#[tokio::test]
	async fn uses_matching_conditional_template_over_default() {
		let mut options = UserOptions { message_template: Some("default".to_string()), ..Default::default() };
		options.conditional_templates.push(detector::ConditionalTemplate {
			conditions: vec![Condition::Direction { up: true }],
			template: "up move!".to_string(),
			enabled: true,
			chat_id: Some("99".to_string()),
		});

		let sends = select_messages(&detector(), &options, &spike(), &candle(), "42").await;
		assert_eq!(sends.len(), 1);
		assert_eq!(sends[0].0, "up move!");
		assert_eq!(sends[0].1, "99");
	}

	#[tokio::test]
	async fn disabled_conditional_templates_are_skipped() {
		let mut options = UserOptions::default();
		options.conditional_templates.push(detector::ConditionalTemplate {
			conditions: vec![Condition::Direction { up: true }],
			template: "should not fire".to_string(),
			enabled: false,
			chat_id: None,
		});

		let sends = select_messages(&detector(), &options, &spike(), &candle(), "42").await;
		assert_eq!(sends.len(), 1);
		assert_ne!(sends[0].0, "should not fire");
	}

	#[tokio::test]
	async fn conditional_template_with_series_condition_can_fire() {
		// The bug this guards: before routing through `conditions_match`,
		// a `series` condition inside a conditional template always
		// evaluated to `false` via `matches_single`, so it could never fire.
		let mut options = UserOptions::default();
		options.conditional_templates.push(detector::ConditionalTemplate {
			conditions: vec![Condition::Series { window_secs: 60, count: 1 }],
			template: "series fired!".to_string(),
			enabled: true,
			chat_id: Some("7".to_string()),
		});

		let sends = select_messages(&detector(), &options, &spike(), &candle(), "42").await;
		assert_eq!(sends.len(), 1);
		assert_eq!(sends[0].0, "series fired!");
		assert_eq!(sends[0].1, "7");
	}
}
