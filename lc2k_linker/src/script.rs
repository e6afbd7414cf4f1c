use std::fs;

use serde::Deserialize;

/// A TOML link script, an alternative to listing the object files and
/// output path on the command line.
#[derive(Debug, Deserialize)]
pub struct LinkerScript {
  pub input_files: Vec<String>,
  pub output_file: String,
}

pub fn parse_linker_script<P: AsRef<std::path::Path>>(path: P) -> Result<LinkerScript, String> {
  let content = fs::read_to_string(&path)
    .map_err(|e| format!("error in opening {}: {e}", path.as_ref().display()))?;
  toml::from_str(&content)
    .map_err(|e| format!("error in link script {}: {e}", path.as_ref().display()))
}
