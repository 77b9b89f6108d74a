use std::path::Path;

use anyhow::{bail, Context, Result};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

pub(crate) fn init_tracing() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

/// Reads an API token from a one-line text file. Missing or blank files are
/// fatal at startup.
pub(crate) fn load_token_file(path: &Path, label: &str) -> Result<String> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {label} token file {}", path.display()))?;
    let token = raw.trim();
    if token.is_empty() {
        bail!("{label} token file {} is empty", path.display());
    }
    Ok(token.to_string())
}
