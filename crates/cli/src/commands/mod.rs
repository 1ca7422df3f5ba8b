//! Command implementations.

mod info;
mod report;
mod run;
mod validate;

use std::path::Path;

use config_loader::ConfigLoader;
use contracts::MonitorBlueprint;
use tracing::info;

use crate::error::{CliError, Result};

pub use info::run_info;
pub use report::run_report;
pub use run::run_monitor;
pub use validate::run_validate;

/// Configuration file picked up when no `--config` is given
pub const DEFAULT_CONFIG: &str = "soil_monitor.toml";

/// Load the blueprint from `path`, or from `DEFAULT_CONFIG` if present,
/// or fall back to built-in defaults
pub fn load_blueprint(path: Option<&Path>) -> Result<MonitorBlueprint> {
    match path {
        Some(path) => {
            if !path.exists() {
                return Err(CliError::config_not_found(path.display().to_string()));
            }
            Ok(ConfigLoader::load_from_path(path)?)
        }
        None => {
            let default = Path::new(DEFAULT_CONFIG);
            if default.exists() {
                info!(config = DEFAULT_CONFIG, "Using default configuration file");
                Ok(ConfigLoader::load_from_path(default)?)
            } else {
                info!("No configuration file, using built-in defaults");
                Ok(MonitorBlueprint::default())
            }
        }
    }
}
