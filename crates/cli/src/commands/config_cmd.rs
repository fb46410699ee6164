//! `turnloop config`: configuration management commands.

use std::path::{Path, PathBuf};

use turnloop_config::AppConfig;

use super::load_config;

fn target(path: Option<&Path>) -> PathBuf {
    path.map(Path::to_path_buf).unwrap_or_else(AppConfig::config_path)
}

pub fn show(path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(path).map_err(|e| format!("Failed to load config: {e}"))?;
    println!("# {}", target(path).display());
    println!("{}", config.to_toml());
    Ok(())
}

pub fn init(path: Option<&Path>, force: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = target(path);
    if config_path.exists() && !force {
        return Err(format!(
            "{} already exists (use --force to overwrite)",
            config_path.display()
        )
        .into());
    }

    if let Some(dir) = config_path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::write(&config_path, AppConfig::default_toml())?;
    println!("✅ Wrote default config to {}", config_path.display());
    Ok(())
}

pub fn path(path: Option<&Path>) {
    println!("{}", target(path).display());
}
