//! Embedded supervisor unit files, compiled into the binary.

use anyhow::{Context, Result};
use include_dir::{Dir, include_dir};
use tempfile::NamedTempFile;

static AGENT_ASSETS: Dir<'_> = include_dir!("$CARGO_MANIFEST_DIR/assets/agent");

/// Raw bytes of one embedded agent asset.
///
/// # Errors
///
/// Returns an error when no asset with the given name exists.
pub fn get(name: &str) -> Result<&'static [u8]> {
    AGENT_ASSETS
        .get_file(name)
        .map(include_dir::File::contents)
        .ok_or_else(|| anyhow::anyhow!("embedded asset not found: {name}"))
}

/// Write an embedded asset to a local temp file so it can be copied to the
/// target. The file is deleted when the returned handle drops.
///
/// # Errors
///
/// Returns an error when the asset is unknown or the temp file cannot be
/// written.
pub fn stage_agent_asset(name: &str) -> Result<NamedTempFile> {
    let content = get(name)?;
    let file = NamedTempFile::new().context("creating temp file for asset")?;
    std::fs::write(file.path(), content)
        .with_context(|| format!("staging asset {name}"))?;
    Ok(file)
}
