//! Sliding-window connection-attempt limiter, one instance per exchange.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

pub struct RateLimiter {
	window: Duration,
	max_attempts: usize,
	attempts: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
	#[must_use]
	pub fn new(max_attempts: usize, window: Duration) -> Self {
		Self { window, max_attempts, attempts: Mutex::new(VecDeque::new()) }
	}

	/// Binance allows 300 connection attempts per 300 seconds.
	#[must_use]
	pub fn binance() -> Self {
		Self::new(300, Duration::from_secs(300))
	}

	/// Records an attempt and reports whether it fits within the window;
	/// callers that get `false` back must back off rather than connect.
	pub async fn try_acquire(&self) -> bool {
		let now = Instant::now();
		let mut attempts = self.attempts.lock().await;

		while let Some(&oldest) = attempts.front() {
			if now.duration_since(oldest) > self.window {
				attempts.pop_front();
			} else {
				break;
			}
		}

		if attempts.len() >= self.max_attempts {
			return false;
		}

		attempts.push_back(now);
		true
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn allows_attempts_under_the_cap() {
		let limiter = RateLimiter::new(3, Duration::from_secs(60));
		assert!(limiter.try_acquire().await);
		assert!(limiter.try_acquire().await);
		assert!(limiter.try_acquire().await);
		assert!(!limiter.try_acquire().await);
	}
}
