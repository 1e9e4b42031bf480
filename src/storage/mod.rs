//! Storage Layer
//!
//! Resolves the configuration directory and prepares the working directory tree.

use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::debug;

use crate::config::DirectoryConfig;

/// Get the configuration directory
pub fn get_config_dir() -> Result<PathBuf> {
    let proj_dirs = directories::ProjectDirs::from("com", "boxtrain", "BoxTrain")
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

    let config_dir = proj_dirs.config_dir().to_path_buf();
    std::fs::create_dir_all(&config_dir)?;

    Ok(config_dir)
}

/// Default location of the configuration file
pub fn default_config_path() -> Result<PathBuf> {
    Ok(get_config_dir()?.join("config.toml"))
}

/// Create every configured directory that does not exist yet
pub fn prepare_directories(dirs: &DirectoryConfig) -> Result<()> {
    for dir in dirs.all() {
        if !dir.exists() {
            debug!("Creating directory {:?}", dir);
        }
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory {:?}", dir))?;
    }
    Ok(())
}
