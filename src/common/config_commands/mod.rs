//! CLI handlers for config subcommands.

mod init;
mod show;

use crate::common::config::AppConfig;
use anyhow::{Context, Result};
use std::path::Path;

fn defaults_toml() -> Result<String> {
    toml::to_string_pretty(&AppConfig::default()).context("Failed to serialize default config")
}

/// Print resolved config file path.
pub fn run_config_path(path: &Path) -> Result<()> {
    show::write_path(path, &mut std::io::stdout().lock())
}

/// Print config file contents, or the defaults when no file exists.
pub fn run_config_show(path: &Path) -> Result<()> {
    show::write_config(
        path,
        &mut std::io::stdout().lock(),
        &mut std::io::stderr().lock(),
    )
}

/// Write a default config file. Returns false when one already exists.
pub fn run_config_init(path: &Path, force: bool) -> Result<bool> {
    let stdout = std::io::stdout();
    let mut output = stdout.lock();
    init::init_config_with_writer(path, force, &mut output)
}
