//! Telegram send path (§4.6): a single reusable `teloxide::Bot` behind a
//! 30-slot concurrency cap (not a rate cap — it bounds in-flight requests,
//! not requests per second), matching the teacher's `TelegramBot` wrapper
//! (`crates/pump_dump_scanner/src/telegram.rs`) generalized from one fixed
//! chat to per-user chat ids and from photo-only to text-or-photo sends.

use std::sync::Arc;
use std::time::Duration;

use teloxide::prelude::*;
use teloxide::types::{InputFile, ParseMode};
use teloxide::RequestError;
use tokio::sync::Semaphore;
use tracing::warn;

use crate::html::sanitize;

const MAX_INFLIGHT: usize = 30;
const MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct SendOutcome {
	pub ok: bool,
	pub error: Option<String>,
}

impl SendOutcome {
	const fn ok() -> Self {
		Self { ok: true, error: None }
	}

	fn failed(error: impl Into<String>) -> Self {
		Self { ok: false, error: Some(error.into()) }
	}
}

pub struct TelegramDispatcher {
	bot: Bot,
	inflight: Arc<Semaphore>,
}

impl TelegramDispatcher {
	#[must_use]
	pub fn new(bot_token: &str) -> Self {
		Self { bot: Bot::new(bot_token), inflight: Arc::new(Semaphore::new(MAX_INFLIGHT)) }
	}

	pub async fn send_message(&self, chat_id: &str, text: &str) -> SendOutcome {
		let Ok(chat_id) = chat_id.parse::<i64>() else {
			return SendOutcome::failed(format!("invalid chat id: {chat_id}"));
		};
		let Ok(_permit) = self.inflight.acquire().await else {
			return SendOutcome::failed("dispatcher shut down");
		};

		let text = sanitize(text);
		self.with_retries(|| async { self.bot.send_message(ChatId(chat_id), text.clone()).parse_mode(ParseMode::Html).await.map(drop) }).await
	}

	pub async fn send_photo(&self, chat_id: &str, png: Vec<u8>, caption: &str) -> SendOutcome {
		let Ok(chat_id) = chat_id.parse::<i64>() else {
			return SendOutcome::failed(format!("invalid chat id: {chat_id}"));
		};
		let Ok(_permit) = self.inflight.acquire().await else {
			return SendOutcome::failed("dispatcher shut down");
		};

		let caption = sanitize(caption);
		self.with_retries(|| async {
			self.bot.send_photo(ChatId(chat_id), InputFile::memory(png.clone())).caption(caption.clone()).parse_mode(ParseMode::Html).await.map(drop)
		})
		.await
	}

	/// Retries network/timeout errors up to `MAX_ATTEMPTS` with exponential
	/// backoff; a logical 4xx (`RequestError::Api`) is reported immediately.
	async fn with_retries<F, Fut>(&self, send: F) -> SendOutcome
	where
		F: Fn() -> Fut,
		Fut: std::future::Future<Output = Result<(), RequestError>>,
	{
		let mut attempt = 0;
		loop {
			attempt += 1;
			match send().await {
				Ok(()) => return SendOutcome::ok(),
				Err(err @ RequestError::Api(_)) => return SendOutcome::failed(err.to_string()),
				Err(err) if attempt >= MAX_ATTEMPTS => return SendOutcome::failed(err.to_string()),
				Err(err) => {
					warn!(attempt, error = %err, "telegram send failed, retrying");
					tokio::time::sleep(Duration::from_millis(250 * 2u64.pow(attempt - 1))).await;
				},
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn rejects_non_numeric_chat_id() {
		let dispatcher = TelegramDispatcher::new("123:fake-token-for-tests");
		let outcome = dispatcher.send_message("not-a-number", "hello").await;
		assert!(!outcome.ok);
	}
}
