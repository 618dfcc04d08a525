//! Embedded service configuration templates.
//!
//! Template bodies are opaque to the engine; rendering is plain placeholder
//! substitution of `{{key}}` markers.

use anyhow::{Context, Result};
use include_dir::{Dir, include_dir};
use tempfile::NamedTempFile;

static SERVICE_ASSETS: Dir<'_> = include_dir!("$CARGO_MANIFEST_DIR/assets/service");

/// Raw bytes of one embedded service asset.
///
/// # Errors
///
/// Returns an error when no asset with the given name exists.
pub fn get(name: &str) -> Result<&'static [u8]> {
    SERVICE_ASSETS
        .get_file(name)
        .map(include_dir::File::contents)
        .ok_or_else(|| anyhow::anyhow!("embedded asset not found: {name}"))
}

/// Substitute `{{key}}` markers in a template body.
#[must_use]
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (key, value) in vars {
        out = out.replace(&format!("{{{{{key}}}}}"), value);
    }
    out
}

/// Stage arbitrary bytes into a local temp file for a target copy. The file
/// is deleted when the returned handle drops.
///
/// # Errors
///
/// Returns an error when the temp file cannot be created or written.
pub fn stage_bytes(content: &[u8]) -> Result<NamedTempFile> {
    let file = NamedTempFile::new().context("creating temp file for asset")?;
    std::fs::write(file.path(), content).context("staging asset content")?;
    Ok(file)
}

/// Stage an embedded asset verbatim.
///
/// # Errors
///
/// Returns an error when the asset is unknown or cannot be staged.
pub fn stage_asset(name: &str) -> Result<NamedTempFile> {
    stage_bytes(get(name)?)
}

/// Render the template asset `<name>.tmpl` and stage the result.
///
/// # Errors
///
/// Returns an error when the template is unknown, not UTF-8, or cannot be
/// staged.
pub fn stage_template(name: &str, vars: &[(&str, &str)]) -> Result<NamedTempFile> {
    let raw = get(&format!("{name}.tmpl"))?;
    let template = std::str::from_utf8(raw)
        .with_context(|| format!("template {name}.tmpl is not UTF-8"))?;
    stage_bytes(render(template, vars).as_bytes())
}
