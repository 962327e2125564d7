//! `config path` and `config show`.

use super::defaults_toml;
use crate::common::config::AppConfig;
use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;

pub(super) fn write_path(path: &Path, out: &mut dyn Write) -> Result<()> {
    writeln!(out, "{}", path.display())?;
    Ok(())
}

/// Print the config file as written. Notes go to `notes`: a missing file
/// (defaults are printed instead) or a file the loader would reject.
pub(super) fn write_config(path: &Path, out: &mut dyn Write, notes: &mut dyn Write) -> Result<()> {
    if !path.exists() {
        writeln!(notes, "No config file at {}; showing defaults.", path.display())?;
        writeln!(notes, "Create it with `wa-bridge config init`.")?;
        write!(out, "{}", defaults_toml()?)?;
        return Ok(());
    }

    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    write!(out, "{text}")?;

    if let Err(e) = toml::from_str::<AppConfig>(&text) {
        writeln!(notes, "Warning: {} does not parse: {}", path.display(), e)?;
    }
    Ok(())
}
