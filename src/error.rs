use thiserror::Error;

/// Top-level error surfaced at the process boundary (`main`). Per-connection
/// and per-association errors never reach here — they are caught and logged
/// at their task boundary (§7) and do not stop the owning listener.
#[derive(Debug, Error)]
pub enum BridgeError {
	#[error("Failed to load configuration: {0}")]
	Config(#[from] config::ConfigError),
	#[error("Failed to bind HL7 listener: {0}")]
	Hl7Bind(std::io::Error),
	#[error("Failed to bind Worklist SCP listener: {0}")]
	DicomBind(std::io::Error),
	#[error("Failed to initialize order cache: {0}")]
	Cache(#[from] crate::cache::CacheError),
	#[error("The given --path does not exist: {0}")]
	PathNotFound(std::path::PathBuf),
}
