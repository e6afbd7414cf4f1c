use std::fmt;

use crate::resource::TextResource;

/// Where a symbol lives: defined in text, defined in data, or only
/// referenced by this object and left for the linker.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum SymbolKind {
  Text,
  Data,
  Undefined,
}

impl SymbolKind {
  pub fn letter(self) -> char {
    match self {
      SymbolKind::Text => 'T',
      SymbolKind::Data => 'D',
      SymbolKind::Undefined => 'U',
    }
  }

  pub fn from_letter(letter: &str) -> Option<SymbolKind> {
    match letter {
      "T" => Some(SymbolKind::Text),
      "D" => Some(SymbolKind::Data),
      "U" => Some(SymbolKind::Undefined),
      _ => None,
    }
  }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SymbolEntry {
  pub name: String,
  pub kind: SymbolKind,
  /// Section-relative index for `T`/`D`; always 0 for `U`.
  pub offset: usize,
}

/// The instruction a relocation entry was emitted for. Only `lw`, `sw`
/// and `.fill` references are relocatable.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum RelocationKind {
  Lw,
  Sw,
  Fill,
}

impl RelocationKind {
  pub fn mnemonic(self) -> &'static str {
    match self {
      RelocationKind::Lw => "lw",
      RelocationKind::Sw => "sw",
      RelocationKind::Fill => ".fill",
    }
  }

  pub fn from_mnemonic(s: &str) -> Option<RelocationKind> {
    match s {
      "lw" => Some(RelocationKind::Lw),
      "sw" => Some(RelocationKind::Sw),
      ".fill" => Some(RelocationKind::Fill),
      _ => None,
    }
  }

  /// `.fill` relocations patch a data word; the rest patch a text word.
  pub fn is_fill(self) -> bool {
    self == RelocationKind::Fill
  }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct RelocationEntry {
  /// Index into the object's text section, or into its data section
  /// for `.fill` entries.
  pub offset: usize,
  pub kind: RelocationKind,
  pub label: String,
}

/// A relocatable object record: assembler output, linker input.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct ObjectFile {
  pub text: Vec<i32>,
  pub data: Vec<i32>,
  pub symbols: Vec<SymbolEntry>,
  pub relocations: Vec<RelocationEntry>,
}

impl ObjectFile {
  pub fn find_symbol(&self, name: &str) -> Option<&SymbolEntry> {
    self.symbols.iter().find(|s| s.name == name)
  }

  /// True iff this object carries a `T` or `D` entry for `name`.
  pub fn defines(&self, name: &str) -> bool {
    self
      .find_symbol(name)
      .is_some_and(|s| s.kind != SymbolKind::Undefined)
  }
}

fn parse_word(line: Option<&str>, what: &str) -> Result<i32, String> {
  let line = line.ok_or_else(|| format!("truncated object file in {what}"))?;
  line
    .trim()
    .parse::<i32>()
    .map_err(|e| format!("bad {what} word {line:?}: {e}"))
}

impl fmt::Display for ObjectFile {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    writeln!(
      f,
      "{} {} {} {}",
      self.text.len(),
      self.data.len(),
      self.symbols.len(),
      self.relocations.len()
    )?;
    for word in &self.text {
      writeln!(f, "{word}")?;
    }
    for word in &self.data {
      writeln!(f, "{word}")?;
    }
    for sym in &self.symbols {
      writeln!(f, "{} {} {}", sym.name, sym.kind.letter(), sym.offset)?;
    }
    for reloc in &self.relocations {
      writeln!(f, "{} {} {}", reloc.offset, reloc.kind.mnemonic(), reloc.label)?;
    }
    Ok(())
  }
}

impl TextResource for ObjectFile {
  fn parse(text: &str) -> Result<Self, String> {
    let mut lines = text.lines();

    let header = lines.next().ok_or_else(|| "empty object file".to_string())?;
    let sizes = header
      .split_whitespace()
      .map(|f| f.parse::<usize>())
      .collect::<Result<Vec<_>, _>>()
      .map_err(|e| format!("bad object header {header:?}: {e}"))?;
    let [text_size, data_size, symbol_size, reloc_size] = sizes[..] else {
      return Err(format!("bad object header {header:?}"));
    };

    let mut object = ObjectFile::default();
    for _ in 0..text_size {
      object.text.push(parse_word(lines.next(), "text")?);
    }
    for _ in 0..data_size {
      object.data.push(parse_word(lines.next(), "data")?);
    }
    for _ in 0..symbol_size {
      let line = lines.next().ok_or_else(|| "truncated symbol table".to_string())?;
      let fields: Vec<&str> = line.split_whitespace().collect();
      let [name, kind, offset] = fields[..] else {
        return Err(format!("bad symbol entry {line:?}"));
      };
      let kind = SymbolKind::from_letter(kind)
        .ok_or_else(|| format!("bad symbol type in {line:?}"))?;
      let offset = offset
        .parse::<usize>()
        .map_err(|e| format!("bad symbol offset in {line:?}: {e}"))?;
      object.symbols.push(SymbolEntry { name: name.to_string(), kind, offset });
    }
    for _ in 0..reloc_size {
      let line = lines
        .next()
        .ok_or_else(|| "truncated relocation table".to_string())?;
      let fields: Vec<&str> = line.split_whitespace().collect();
      let [offset, mnemonic, label] = fields[..] else {
        return Err(format!("bad relocation entry {line:?}"));
      };
      let offset = offset
        .parse::<usize>()
        .map_err(|e| format!("bad relocation offset in {line:?}: {e}"))?;
      let kind = RelocationKind::from_mnemonic(mnemonic)
        .ok_or_else(|| format!("bad relocation opcode in {line:?}"))?;
      object.relocations.push(RelocationEntry { offset, kind, label: label.to_string() });
    }
    Ok(object)
  }
}
