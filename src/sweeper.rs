//! Sweeper (§4.7): a periodic task that expires stale cached orders.

use crate::cache::OrderCache;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub struct Sweeper {
	cache: Arc<OrderCache>,
	interval: Duration,
	expiry_hours: i64,
	retention_days: i64,
	auto_cleanup: bool,
}

impl Sweeper {
	#[must_use]
	pub fn new(
		cache: Arc<OrderCache>,
		cleanup_interval_minutes: u64,
		expiry_hours: i64,
		retention_days: i64,
		auto_cleanup: bool,
	) -> Self {
		Self {
			cache,
			interval: Duration::from_secs(cleanup_interval_minutes.max(1) * 60),
			expiry_hours,
			retention_days,
			auto_cleanup,
		}
	}

	/// Ticks until `cancel` fires. A tick in flight is allowed to finish;
	/// the caller enforces the 5 s shutdown grace around this task.
	pub async fn run(self, cancel: CancellationToken) {
		let mut ticker = tokio::time::interval(self.interval);
		ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

		loop {
			tokio::select! {
				() = cancel.cancelled() => {
					info!("sweeper shutting down");
					return;
				}
				_ = ticker.tick() => {
					let expired = self.cache.sweep_expired(self.expiry_hours);
					if expired > 0 {
						info!(expired, "swept expired orders");
					}
					if self.auto_cleanup {
						let old = self.cache.sweep_old(self.retention_days);
						if old > 0 {
							info!(old, "swept orders past retention");
						}
					}
					let stats = self.cache.stats();
					debug!(
						active_count = stats.active_count,
						oldest_received_at = ?stats.oldest_received_at,
						"cache stats",
					);
				}
			}
		}
	}
}
