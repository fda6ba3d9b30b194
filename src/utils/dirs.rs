use anyhow::{anyhow, Result};
use std::fs;
use std::path::Path;

pub const DUPLICATE_LOG_FILE: &str = "duplicate_log.txt";

pub fn ensure_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).map_err(|e| anyhow!("Failed to create directory {:?}: {}", path, e))?;
    Ok(())
}

pub fn ensure_parent_dir(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => ensure_dir(parent),
        _ => Ok(()),
    }
}
