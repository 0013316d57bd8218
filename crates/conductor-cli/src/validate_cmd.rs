//! `conductor validate`: check a workflow definition without running it.

use std::io::{self, Write};
use std::path::Path;

use conductor_core::workflow::validate_with_default_workers;

/// Validate the definition at `path` and print the resulting spec.
pub fn run(path: &Path, default_max_workers: u32) -> anyhow::Result<()> {
    let definition = crate::load_definition(path)?;
    let spec = validate_with_default_workers(&definition, default_max_workers)?;

    let mut out = io::stdout();
    writeln!(out, "{}", serde_json::to_string_pretty(&spec)?)?;
    Ok(())
}
