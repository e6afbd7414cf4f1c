use std::fmt;

use crate::resource::TextResource;

/// A flat executable image: `textSize + dataSize` words, text first,
/// one decimal integer per line, no header.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct Executable {
  pub words: Vec<i32>,
}

impl fmt::Display for Executable {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for word in &self.words {
      writeln!(f, "{word}")?;
    }
    Ok(())
  }
}

impl TextResource for Executable {
  fn parse(text: &str) -> Result<Self, String> {
    let mut words = Vec::new();
    for (address, line) in text.lines().enumerate() {
      let word = line
        .trim()
        .parse::<i32>()
        .map_err(|_| format!("error in reading address {address}"))?;
      words.push(word);
    }
    Ok(Executable { words })
  }
}
