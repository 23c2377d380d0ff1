//! Process-wide health monitor (§4.7): samples CPU, RSS, thread count,
//! fd count and system memory once a minute, warning above configured
//! thresholds. Grounded on `original_source/core/monitoring/resource_usage.py`'s
//! `psutil`-based sampling, ported to `sysinfo` since that's the crate the
//! broader pack reaches for process/host metrics.

use std::time::Duration;

use sysinfo::{Pid, ProcessRefreshKind, RefreshKind, System};
use tokio::time::interval;
use tracing::warn;

const SAMPLE_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy)]
pub struct HealthThresholds {
	pub max_cpu_percent: f32,
	pub max_rss_bytes: u64,
	pub max_threads: usize,
	pub max_open_fds: usize,
}

impl Default for HealthThresholds {
	fn default() -> Self {
		Self { max_cpu_percent: 90.0, max_rss_bytes: 2 * 1024 * 1024 * 1024, max_threads: 512, max_open_fds: 4096 }
	}
}

pub async fn run(thresholds: HealthThresholds) {
	let pid = Pid::from_u32(std::process::id());
	let mut system = System::new_with_specifics(RefreshKind::nothing().with_processes(ProcessRefreshKind::everything()));
	let mut ticker = interval(SAMPLE_INTERVAL);

	loop {
		ticker.tick().await;
		system.refresh_processes(sysinfo::ProcessesToUpdate::Some(&[pid]), true);
		system.refresh_memory();

		let Some(process) = system.process(pid) else { continue };

		let cpu = process.cpu_usage();
		let rss = process.memory();
		let threads = process.tasks().map_or(0, |tasks| tasks.len());
		let open_fds = count_open_fds();

		if cpu > thresholds.max_cpu_percent {
			warn!(cpu_percent = cpu, threshold = thresholds.max_cpu_percent, "process CPU usage above threshold");
		}
		if rss > thresholds.max_rss_bytes {
			warn!(rss_bytes = rss, threshold = thresholds.max_rss_bytes, "process RSS above threshold");
		}
		if threads > thresholds.max_threads {
			warn!(threads, threshold = thresholds.max_threads, "process thread count above threshold");
		}
		if open_fds > thresholds.max_open_fds {
			warn!(open_fds, threshold = thresholds.max_open_fds, "process fd count above threshold");
		}

		let used_memory_pct = system.used_memory() as f64 / system.total_memory().max(1) as f64 * 100.0;
		if used_memory_pct > 90.0 {
			warn!(used_memory_pct, "system memory usage above 90%");
		}
	}
}

/// `sysinfo` has no cross-platform fd-count API; on Linux, `/proc/self/fd`
/// is a directory with one entry per open descriptor.
#[cfg(target_os = "linux")]
fn count_open_fds() -> usize {
	std::fs::read_dir("/proc/self/fd").map(Iterator::count).unwrap_or(0)
}

#[cfg(not(target_os = "linux"))]
fn count_open_fds() -> usize {
	0
}
