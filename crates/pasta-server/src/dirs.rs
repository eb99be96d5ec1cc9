use std::path::PathBuf;

use anyhow::{Context, Result};
use directories::ProjectDirs;

/// Platform data dir for `pasta.db` (`~/.local/share/pasta/` on Linux).
/// Used only when no data dir was configured.
pub fn platform_data_dir() -> Result<PathBuf> {
    let path = ProjectDirs::from("", "", "pasta")
        .context("could not determine platform data directory")?
        .data_dir()
        .to_owned();
    std::fs::create_dir_all(&path).context("create platform data dir")?;
    Ok(path)
}
