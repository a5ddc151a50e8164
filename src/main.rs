mod cache;
mod config;
mod dimse;
mod error;
mod hl7;
mod hl7_listener;
mod lifecycle;
mod mapper;
mod mllp;
mod sweeper;
mod types;
mod worklist_scp;

use clap::Parser;
use error::BridgeError;
use lifecycle::Lifecycle;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::{debug, info, level_filters::LevelFilter};
use tracing_subscriber::EnvFilter;

/// HL7 ORM to DICOM Modality Worklist bridge.
#[derive(Debug, Parser)]
struct Cli {
	/// Overrides the base directory used for config lookup (`<path>/config.yaml`)
	/// and relative cache folder resolution. Defaults to the platform
	/// common app-data directory.
	#[arg(long)]
	path: Option<PathBuf>,
}

fn init_logger(level: &str) -> Result<(), anyhow::Error> {
	let log_level: tracing::Level = tracing::Level::from_str(level)?;

	let subscriber = tracing_subscriber::fmt()
		.compact()
		.with_file(true)
		.with_line_number(true)
		.with_target(false)
		.with_env_filter(
			EnvFilter::builder()
				.with_default_directive(LevelFilter::from_level(log_level).into())
				.from_env_lossy(),
		)
		.finish();
	tracing::subscriber::set_global_default(subscriber)?;
	Ok(())
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
	let cli = Cli::parse();

	let base = match &cli.path {
		Some(path) => {
			if !path.is_dir() {
				return Err(BridgeError::PathNotFound(path.clone()).into());
			}
			path.clone()
		}
		None => config::default_base_dir(),
	};

	let app_config = config::AppConfig::load(&base)?;
	init_logger(&app_config.logging.level)?;
	debug!(config = ?app_config, "loaded configuration");

	let cache_root = config::resolve_cache_root(&app_config.cache, &base);
	info!(cache_root = %cache_root.display(), "resolved cache root");

	let mut lifecycle = Lifecycle::start(&app_config, &cache_root).await?;

	tokio::signal::ctrl_c().await?;
	info!("shutdown requested");
	lifecycle.stop().await;

	Ok(())
}
