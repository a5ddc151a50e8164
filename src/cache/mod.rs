//! The order cache (§4.3): a filesystem-backed store of active orders with
//! time-based expiry and per-patient retention.

use crate::hl7::{self, ParseError};
use crate::types::OrderId;
use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum CacheError {
	#[error("failed to parse HL7 message: {0}")]
	Parse(#[from] ParseError),
	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),
}

/// A cached order, read back from `active/<uuid>.hl7`.
#[derive(Debug, Clone)]
pub struct Order {
	pub id: OrderId,
	pub raw: String,
	pub received_at: DateTime<Utc>,
	pub patient_id: String,
}

/// Diagnostics snapshot logged by the sweeper each tick (§4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
	pub active_count: usize,
	pub oldest_received_at: Option<DateTime<Utc>>,
}

/// Fixed namespace used to derive an order's UUID from its message control
/// id (or, lacking one, its raw content) — see §3 and §9's documented
/// last-writer-wins-by-uuid behavior.
const ORDER_ID_NAMESPACE: Uuid = Uuid::from_bytes([
	0xD1, 0xC0, 0x17, 0x00, 0x0A, 0xE0, 0x4B, 0x3F, 0x8A, 0x21, 0x5E, 0x9F, 0x21, 0x1C, 0x9B, 0x01,
]);

fn derive_order_id(message: &hl7::Message, raw: &str) -> OrderId {
	let control_id = message.msh.message_control_id.trim();
	let name: &[u8] = if control_id.is_empty() {
		raw.as_bytes()
	} else {
		control_id.as_bytes()
	};
	OrderId::from_uuid(Uuid::new_v5(&ORDER_ID_NAMESPACE, name))
}

/// Filesystem root holding `active/<uuid>.hl7`. All mutation (`put`,
/// `sweep_expired`, `sweep_old`) is serialized by an internal mutex; reads
/// (`list`, `exists`) are lock-free and tolerate files vanishing mid-read.
pub struct OrderCache {
	active_dir: PathBuf,
	max_orms_per_patient: usize,
	mutation_lock: Mutex<()>,
}

impl OrderCache {
	/// Ensures `<root>/active/` exists.
	pub fn new(root: &Path, max_orms_per_patient: usize) -> Result<Self, CacheError> {
		let active_dir = root.join("active");
		fs::create_dir_all(&active_dir)?;
		Ok(Self {
			active_dir,
			max_orms_per_patient,
			mutation_lock: Mutex::new(()),
		})
	}

	/// Stores the raw HL7 for an accepted ORM, enforcing the per-patient
	/// cap by evicting the oldest order for that patient first if needed.
	/// The write itself is atomic (stage as `.tmp`, then rename).
	pub fn put(&self, raw: &str) -> Result<OrderId, CacheError> {
		let message = hl7::parse(raw)?;
		let patient_id = message.patient_id().unwrap_or_default().to_string();
		let id = derive_order_id(&message, raw);

		let _guard = self.mutation_lock.lock().expect("cache mutex poisoned");

		self.evict_for_patient_cap(&patient_id, id)?;
		self.write_atomic(id, raw)?;

		Ok(id)
	}

	#[must_use]
	pub fn exists(&self, id: OrderId) -> bool {
		self.path_for(id).is_file()
	}

	/// Lazily enumerates orders currently in `active/`. Files that vanish
	/// between directory enumeration and open are silently skipped.
	pub fn list(&self) -> impl Iterator<Item = Order> + '_ {
		read_active_dir(&self.active_dir).filter_map(load_order)
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.list().count()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.list().next().is_none()
	}

	/// Snapshot used for periodic diagnostics logging (§4.3).
	#[must_use]
	pub fn stats(&self) -> CacheStats {
		let mut active_count = 0;
		let mut oldest_received_at = None;
		for order in self.list() {
			active_count += 1;
			oldest_received_at = Some(match oldest_received_at {
				Some(oldest) if oldest <= order.received_at => oldest,
				_ => order.received_at,
			});
		}
		CacheStats {
			active_count,
			oldest_received_at,
		}
	}

	/// Removes orders whose last-write timestamp is older than
	/// `now - hours`. Returns the count removed.
	pub fn sweep_expired(&self, hours: i64) -> usize {
		let cutoff = Utc::now() - chrono::Duration::hours(hours);
		self.sweep_older_than(cutoff)
	}

	/// Identical contract to [`Self::sweep_expired`] but measured in days;
	/// used by the cache janitor distinct from order expiry.
	pub fn sweep_old(&self, days: i64) -> usize {
		let cutoff = Utc::now() - chrono::Duration::days(days);
		self.sweep_older_than(cutoff)
	}

	fn sweep_older_than(&self, cutoff: DateTime<Utc>) -> usize {
		let _guard = self.mutation_lock.lock().expect("cache mutex poisoned");

		let mut removed = 0;
		for entry in read_active_dir(&self.active_dir) {
			let path = entry.path();
			let Ok(metadata) = fs::metadata(&path) else {
				continue;
			};
			let Ok(modified) = metadata.modified() else {
				continue;
			};
			if DateTime::<Utc>::from(modified) >= cutoff {
				continue;
			}
			match fs::remove_file(&path) {
				Ok(()) => removed += 1,
				Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
				Err(err) => warn!(path = %path.display(), %err, "failed to remove expired order"),
			}
		}
		removed
	}

	/// Evicts the oldest order(s) for `patient_id` until there is room for
	/// the incoming `incoming_id`. A re-`put` of an existing control id
	/// resolves to the same UUID (§9's last-writer-wins keying) and is
	/// excluded from the count — it overwrites in place rather than
	/// consuming a cap slot.
	fn evict_for_patient_cap(&self, patient_id: &str, incoming_id: OrderId) -> Result<(), CacheError> {
		if self.max_orms_per_patient == 0 {
			return Ok(());
		}
		loop {
			let mut for_patient: Vec<Order> = self
				.list()
				.filter(|order| order.patient_id == patient_id && order.id != incoming_id)
				.collect();
			if for_patient.len() < self.max_orms_per_patient {
				return Ok(());
			}
			// Oldest by received_at; ties broken by lexicographically
			// smaller UUID (§4.3).
			for_patient.sort_by(|a, b| {
				a.received_at
					.cmp(&b.received_at)
					.then_with(|| a.id.to_string().cmp(&b.id.to_string()))
			});
			let oldest = &for_patient[0];
			let path = self.path_for(oldest.id);
			match fs::remove_file(&path) {
				Ok(()) => {}
				Err(_) if !path.exists() => {}
				Err(err) => return Err(CacheError::Io(err)),
			}
		}
	}

	fn write_atomic(&self, id: OrderId, raw: &str) -> Result<(), CacheError> {
		let target = self.path_for(id);
		let staging = self.staging_path_for(id);

		fs::write(&staging, raw)?;
		if target.exists() {
			fs::remove_file(&target)?;
		}
		fs::rename(&staging, &target)?;
		Ok(())
	}

	fn path_for(&self, id: OrderId) -> PathBuf {
		self.active_dir.join(format!("{id}.hl7"))
	}

	fn staging_path_for(&self, id: OrderId) -> PathBuf {
		self.active_dir.join(format!("{id}.hl7.tmp"))
	}
}

fn read_active_dir(active_dir: &Path) -> impl Iterator<Item = fs::DirEntry> {
	fs::read_dir(active_dir)
		.into_iter()
		.flatten()
		.filter_map(Result::ok)
}

fn load_order(entry: fs::DirEntry) -> Option<Order> {
	let path = entry.path();
	if path.extension().and_then(|ext| ext.to_str()) != Some("hl7") {
		return None;
	}
	let id: OrderId = path.file_stem()?.to_str()?.parse().ok()?;
	let raw = fs::read_to_string(&path).ok()?;
	let modified = fs::metadata(&path).ok()?.modified().ok()?;
	let message = hl7::parse(&raw).ok();
	let patient_id = message
		.as_ref()
		.and_then(hl7::Message::patient_id)
		.unwrap_or_default()
		.to_string();

	Some(Order {
		id,
		raw,
		received_at: DateTime::<Utc>::from(modified),
		patient_id,
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::tempdir;

	const ORM: &str = "MSH|^~\\&|HIS|MC|LIS|MC|20060307110114||ORM^O01|MID1|P|2.3\rPID|||12001||Jones^John\rORC|NW|20060307110114";

	fn orm_with_control_id(control_id: &str) -> String {
		ORM.replacen("MID1", control_id, 1)
	}

	#[test]
	fn put_creates_exactly_one_file_with_original_bytes() {
		let dir = tempdir().unwrap();
		let cache = OrderCache::new(dir.path(), 5).unwrap();
		let id = cache.put(ORM).unwrap();
		assert!(cache.exists(id));
		assert_eq!(cache.list().count(), 1);
		let order = cache.list().next().unwrap();
		assert_eq!(order.raw, ORM);
	}

	#[test]
	fn per_patient_cap_evicts_oldest() {
		let dir = tempdir().unwrap();
		let cache = OrderCache::new(dir.path(), 5).unwrap();
		for i in 0..6 {
			let raw = orm_with_control_id(&format!("MID{i}"));
			cache.put(&raw).unwrap();
			std::thread::sleep(std::time::Duration::from_millis(5));
		}
		assert_eq!(cache.list().count(), 5);
	}

	#[test]
	fn sweep_expired_removes_old_files_and_is_idempotent() {
		let dir = tempdir().unwrap();
		let cache = OrderCache::new(dir.path(), 5).unwrap();
		cache.put(ORM).unwrap();

		// Not yet expired.
		assert_eq!(cache.sweep_expired(72), 0);

		// Force the file to look old.
		let path = dir.path().join("active");
		let entry = fs::read_dir(&path).unwrap().next().unwrap().unwrap();
		let old_time = std::time::SystemTime::now() - std::time::Duration::from_secs(73 * 3600);
		let file = fs::File::open(entry.path()).unwrap();
		file.set_modified(old_time).unwrap();

		assert_eq!(cache.sweep_expired(72), 1);
		assert_eq!(cache.list().count(), 0);
		// Idempotent: second sweep removes nothing more.
		assert_eq!(cache.sweep_expired(72), 0);
	}

	#[test]
	fn list_tolerates_tmp_files() {
		let dir = tempdir().unwrap();
		let cache = OrderCache::new(dir.path(), 5).unwrap();
		cache.put(ORM).unwrap();
		fs::write(dir.path().join("active").join("stray.hl7.tmp"), "partial").unwrap();
		assert_eq!(cache.list().count(), 1);
	}
}
