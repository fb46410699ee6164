pub mod config_cmd;
pub mod replay;
pub mod tools;

use std::error::Error;
use std::path::Path;

use turnloop_config::AppConfig;

/// Load the default config, or `path` with the same env overrides and
/// validation applied.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, Box<dyn Error>> {
    let Some(path) = path else {
        return Ok(AppConfig::load()?);
    };
    let mut config = AppConfig::load_from(path)?;
    config.apply_env_overrides(|key| std::env::var(key).ok())?;
    config.validate()?;
    Ok(config)
}
