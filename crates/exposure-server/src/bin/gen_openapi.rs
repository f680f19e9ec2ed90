//! Writes the OpenAPI specification to `openapi.json` at the workspace root.
//!
//! Run with: cargo run --bin gen-openapi -p exposure-server

use std::fs;
use std::path::PathBuf;

use anyhow::Context;

fn main() -> anyhow::Result<()> {
    let json = exposure_server::api::get_openapi_json()?;

    let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    let workspace_root = manifest_dir
        .parent()
        .and_then(|p| p.parent())
        .context("could not find workspace root")?;
    let output_path = workspace_root.join("openapi.json");

    fs::write(&output_path, &json)
        .with_context(|| format!("failed to write {}", output_path.display()))?;

    let spec: serde_json::Value = serde_json::from_str(&json)?;
    let count = |key: &str| spec.pointer(key).and_then(|v| v.as_object()).map_or(0, serde_json::Map::len);
    println!(
        "wrote {} ({} paths, {} schemas)",
        output_path.display(),
        count("/paths"),
        count("/components/schemas")
    );

    Ok(())
}
