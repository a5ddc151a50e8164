//! Lifecycle (§4.8): coordinates startup and shutdown of the cache, HL7
//! Listener, Worklist SCP, and Sweeper.

use crate::cache::OrderCache;
use crate::config::AppConfig;
use crate::error::BridgeError;
use crate::hl7_listener::Hl7Listener;
use crate::mapper::{DefaultOrderMapper, OrderMapper};
use crate::sweeper::Sweeper;
use crate::worklist_scp::WorklistScp;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

pub struct Lifecycle {
	cache: Arc<OrderCache>,
	hl7_cancel: CancellationToken,
	hl7_handle: JoinHandle<()>,
	scp_cancel: CancellationToken,
	scp_handle: JoinHandle<()>,
	sweeper_cancel: CancellationToken,
	sweeper_handle: JoinHandle<()>,
	stopped: AtomicBool,
}

impl Lifecycle {
	/// Start sequence: cache → HL7 Listener → Worklist SCP → Sweeper. The
	/// listen sockets are bound here, synchronously, so a port conflict
	/// fails startup immediately instead of surfacing later inside a
	/// spawned task (§4.8, §7).
	pub async fn start(config: &AppConfig, cache_root: &Path) -> Result<Self, BridgeError> {
		let cache = Arc::new(OrderCache::new(cache_root, config.hl7.max_orms_per_patient)?);
		let mapper: Arc<dyn OrderMapper> = Arc::new(DefaultOrderMapper);

		let hl7_listener = Arc::new(
			Hl7Listener::bind(
				Arc::clone(&cache),
				Arc::clone(&mapper),
				config.hl7.listen_ip,
				config.hl7.listen_port,
			)
			.await
			.map_err(BridgeError::Hl7Bind)?,
		);
		let hl7_cancel = CancellationToken::new();
		let hl7_handle = tokio::spawn(hl7_listener.run(hl7_cancel.clone()));

		let scp = Arc::new(
			WorklistScp::bind(
				Arc::clone(&cache),
				Arc::clone(&mapper),
				config.dicom.ae_title.clone(),
				config.dicom.listen_port,
			)
			.await
			.map_err(BridgeError::DicomBind)?,
		);
		let scp_cancel = CancellationToken::new();
		let scp_handle = tokio::spawn(scp.run(scp_cancel.clone()));

		let sweeper_cancel = CancellationToken::new();
		let sweeper = Sweeper::new(
			Arc::clone(&cache),
			config.cache.cleanup_interval_minutes,
			config.order.expiry_hours,
			config.cache.retention_days,
			config.cache.auto_cleanup,
		);
		let sweeper_handle = tokio::spawn(sweeper.run(sweeper_cancel.clone()));

		info!("lifecycle started");

		Ok(Self {
			cache,
			hl7_cancel,
			hl7_handle,
			scp_cancel,
			scp_handle,
			sweeper_cancel,
			sweeper_handle,
			stopped: AtomicBool::new(false),
		})
	}

	#[must_use]
	pub fn cache(&self) -> &Arc<OrderCache> {
		&self.cache
	}

	/// Stop sequence: Sweeper → Worklist SCP → HL7 Listener, each given a
	/// 5 s grace to drain. Idempotent: a second call is a no-op.
	pub async fn stop(&mut self) {
		if self.stopped.swap(true, Ordering::SeqCst) {
			return;
		}

		self.sweeper_cancel.cancel();
		if tokio::time::timeout(SHUTDOWN_GRACE, &mut self.sweeper_handle)
			.await
			.is_err()
		{
			warn!("sweeper did not stop within grace period, aborting");
			self.sweeper_handle.abort();
		}

		self.scp_cancel.cancel();
		match tokio::time::timeout(SHUTDOWN_GRACE, &mut self.scp_handle).await {
			Ok(Ok(())) => {}
			Ok(Err(err)) => warn!(%err, "worklist SCP task panicked"),
			Err(_) => {
				warn!("worklist SCP did not stop within grace period, aborting");
				self.scp_handle.abort();
			}
		}

		self.hl7_cancel.cancel();
		match tokio::time::timeout(SHUTDOWN_GRACE, &mut self.hl7_handle).await {
			Ok(Ok(())) => {}
			Ok(Err(err)) => warn!(%err, "HL7 listener task panicked"),
			Err(_) => {
				warn!("HL7 listener did not stop within grace period, aborting");
				self.hl7_handle.abort();
			}
		}

		info!("lifecycle stopped");
	}
}
