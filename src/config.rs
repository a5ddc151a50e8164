use serde::Deserialize;
use std::net::Ipv4Addr;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
	#[serde(default)]
	pub logging: LoggingConfig,
	pub hl7: Hl7Config,
	pub dicom: DicomConfig,
	#[serde(default)]
	pub cache: CacheConfig,
	#[serde(default)]
	pub order: OrderConfig,
}

impl AppConfig {
	/// Loads configuration layered as compiled-in defaults, then
	/// `<base>/config.yaml` if present, then environment overrides
	/// prefixed `DICOM7_ORM2DICOM` (double underscore separates nesting,
	/// e.g. `DICOM7_ORM2DICOM__HL7__LISTEN_PORT`).
	pub fn load(base: &std::path::Path) -> Result<Self, config::ConfigError> {
		use config::Config;

		let config_path = base.join("config.yaml");
		let s = Config::builder()
			.add_source(config::File::from_str(
				include_str!("defaults.yaml"),
				config::FileFormat::Yaml,
			))
			.add_source(config::File::from(config_path).required(false))
			.add_source(
				config::Environment::with_prefix("DICOM7_ORM2DICOM")
					.separator("__")
					.try_parsing(true),
			)
			.build()?;

		s.try_deserialize()
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
	/// Also configurable via `RUST_LOG`.
	pub level: String,
}

impl Default for LoggingConfig {
	fn default() -> Self {
		Self {
			level: "info".to_string(),
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct Hl7Config {
	#[serde(default = "Hl7Config::default_listen_port")]
	pub listen_port: u16,
	#[serde(default = "Hl7Config::default_listen_ip")]
	pub listen_ip: Ipv4Addr,
	#[serde(default = "Hl7Config::default_max_orms_per_patient")]
	pub max_orms_per_patient: usize,
	pub sender_name: String,
	pub facility_name: String,
}

impl Hl7Config {
	const fn default_listen_port() -> u16 {
		7777
	}

	const fn default_listen_ip() -> Ipv4Addr {
		Ipv4Addr::UNSPECIFIED
	}

	const fn default_max_orms_per_patient() -> usize {
		5
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct DicomConfig {
	#[serde(default = "DicomConfig::default_ae_title")]
	pub ae_title: String,
	#[serde(default = "DicomConfig::default_listen_port")]
	pub listen_port: u16,
	#[serde(default = "DicomConfig::default_max_connections")]
	pub max_connections: usize,
	pub facility_name: String,
}

impl DicomConfig {
	fn default_ae_title() -> String {
		"DICOM7_ORM2DICOM".to_string()
	}

	const fn default_listen_port() -> u16 {
		11112
	}

	const fn default_max_connections() -> usize {
		10
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
	/// Absolute or relative path; relative is resolved under the platform
	/// common app-data root. `None` means "use the platform default".
	pub folder: Option<PathBuf>,
	#[serde(default = "CacheConfig::default_retention_days")]
	pub retention_days: i64,
	#[serde(default = "CacheConfig::default_auto_cleanup")]
	pub auto_cleanup: bool,
	#[serde(default = "CacheConfig::default_cleanup_interval_minutes")]
	pub cleanup_interval_minutes: u64,
}

impl CacheConfig {
	const fn default_retention_days() -> i64 {
		3
	}

	const fn default_auto_cleanup() -> bool {
		true
	}

	const fn default_cleanup_interval_minutes() -> u64 {
		60
	}
}

impl Default for CacheConfig {
	fn default() -> Self {
		Self {
			folder: None,
			retention_days: Self::default_retention_days(),
			auto_cleanup: Self::default_auto_cleanup(),
			cleanup_interval_minutes: Self::default_cleanup_interval_minutes(),
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderConfig {
	#[serde(default = "OrderConfig::default_expiry_hours")]
	pub expiry_hours: i64,
}

impl OrderConfig {
	const fn default_expiry_hours() -> i64 {
		72
	}
}

impl Default for OrderConfig {
	fn default() -> Self {
		Self {
			expiry_hours: Self::default_expiry_hours(),
		}
	}
}

/// The platform common app-data root used when `--path` is not given:
/// `<platform app data dir>/dicom7-bridge`.
#[must_use]
pub fn default_base_dir() -> PathBuf {
	dirs::data_dir()
		.unwrap_or_else(std::env::temp_dir)
		.join("dicom7-bridge")
}

/// Resolves `cache.folder` against `base` (either the platform common
/// app-data root, or the `--path` override) when relative, per §6.
#[must_use]
pub fn resolve_cache_root(cache: &CacheConfig, base: &std::path::Path) -> PathBuf {
	match &cache.folder {
		Some(folder) if folder.is_absolute() => folder.clone(),
		Some(folder) => base.join(folder),
		None => base.to_path_buf(),
	}
}
