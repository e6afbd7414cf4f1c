use std::fmt;
use std::fs;
use std::path::Path;

/// Every artifact the toolchain puts on disk (object record,
/// executable image) is newline-terminated decimal text. A resource
/// renders itself through [`fmt::Display`] and parses back from text;
/// the path-taking methods fold the file name into the one-line
/// diagnostic the binaries print on failure.
pub trait TextResource: fmt::Display + Sized {
  fn parse(text: &str) -> Result<Self, String>;

  fn read_from_path<P: AsRef<Path>>(path: P) -> Result<Self, String> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)
      .map_err(|e| format!("error in opening {}: {e}", path.display()))?;
    Self::parse(&text)
  }

  fn write_to_path<P: AsRef<Path>>(&self, path: P) -> Result<(), String> {
    let path = path.as_ref();
    fs::write(path, self.to_string())
      .map_err(|e| format!("error in opening {}: {e}", path.display()))
  }
}
