//! Writing a starter config file.

use super::defaults_toml;
use anyhow::{Context, Result};
use std::fs;
use std::io::Write;
use std::path::Path;

pub(super) fn init_config_with_writer(
    path: &Path,
    force: bool,
    output: &mut dyn Write,
) -> Result<bool> {
    if path.exists() && !force {
        writeln!(
            output,
            "Config already exists at {}. Use --force to overwrite.",
            path.display()
        )?;
        return Ok(false);
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory {}", parent.display()))?;
    }

    fs::write(path, defaults_toml()?)
        .with_context(|| format!("Failed to write config file {}", path.display()))?;
    writeln!(output, "Wrote default config to {}", path.display())?;
    Ok(true)
}
