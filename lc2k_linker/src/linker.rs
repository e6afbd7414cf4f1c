use log::{debug, info};

use lc2k_common::image::Executable;
use lc2k_common::isa::{OFFSET_MASK, WordFields};
use lc2k_common::label::{STACK_LABEL, is_global_label};
use lc2k_common::object::{ObjectFile, SymbolKind};

/// Final placement of each object in the image: text segments in input
/// order, then every data segment in input order.
struct AddressMap {
  text_bases: Vec<usize>,
  data_bases: Vec<usize>,
  total_text: usize,
  total_data: usize,
}

impl AddressMap {
  fn new(objects: &[ObjectFile]) -> Self {
    let total_text: usize = objects.iter().map(|o| o.text.len()).sum();
    let total_data: usize = objects.iter().map(|o| o.data.len()).sum();

    let mut text_bases = Vec::with_capacity(objects.len());
    let mut data_bases = Vec::with_capacity(objects.len());
    let mut text_base = 0;
    let mut data_base = total_text;
    for object in objects {
      text_bases.push(text_base);
      data_bases.push(data_base);
      text_base += object.text.len();
      data_base += object.data.len();
    }
    AddressMap { text_bases, data_bases, total_text, total_data }
  }

  /// Address one past the end of data, where `Stack` lands when nothing
  /// defines it.
  fn stack_address(&self) -> usize {
    self.total_text + self.total_data
  }
}

pub fn link(objects: &[ObjectFile]) -> Result<Executable, String> {
  check_duplicate_globals(objects)?;
  check_reserved(objects)?;

  let map = AddressMap::new(objects);
  info!(
    "linking {} objects: {} text words, {} data words",
    objects.len(),
    map.total_text,
    map.total_data
  );

  let mut text: Vec<i32> = objects.iter().flat_map(|o| o.text.iter().copied()).collect();
  let mut data: Vec<i32> = objects.iter().flat_map(|o| o.data.iter().copied()).collect();

  for (index, object) in objects.iter().enumerate() {
    for reloc in &object.relocations {
      // a label with a T/D entry here (or a local name) patches by the
      // line-number split rule; an undefined global resolves elsewhere
      let local = !is_global_label(&reloc.label) || object.defines(&reloc.label);

      if !reloc.kind.is_fill() {
        let position = map.text_bases[index] + reloc.offset;
        let word = *text
          .get(position)
          .ok_or_else(|| format!("relocation offset {} out of bounds", reloc.offset))?;
        let fields = WordFields::decode(word);
        let address = if local {
          split_line_number(fields.offset as i64, object, index, &map)
        } else {
          resolve_global(objects, index, &reloc.label, &map)? as i64
        };
        debug!("patching text[{position}] for {} to {address}", reloc.label);
        text[position] = WordFields { offset: address as i32, ..fields }.encode();
      } else {
        let position = map.data_bases[index] - map.total_text + reloc.offset;
        let word = *data
          .get(position)
          .ok_or_else(|| format!("relocation offset {} out of bounds", reloc.offset))?;
        let value = if local {
          // full 32-bit data word, no 16-bit masking
          split_line_number(word as i64, object, index, &map) as i32
        } else {
          (resolve_global(objects, index, &reloc.label, &map)? & OFFSET_MASK as usize) as i32
        };
        debug!("patching data[{position}] for {} to {value}", reloc.label);
        data[position] = value;
      }
    }
  }

  let mut words = text;
  words.append(&mut data);
  Ok(Executable { words })
}

/// A locally resolved reference holds an absolute line number within
/// its object: at or past the text size it points into that object's
/// data, otherwise into its text.
fn split_line_number(line_number: i64, object: &ObjectFile, index: usize, map: &AddressMap) -> i64 {
  if line_number >= object.text.len() as i64 {
    line_number - object.text.len() as i64 + map.data_bases[index] as i64
  } else {
    line_number + map.text_bases[index] as i64
  }
}

/// Find the unique other object defining `label` and return its image
/// address; `Stack` falls back to one past the end of data.
fn resolve_global(
  objects: &[ObjectFile],
  index: usize,
  label: &str,
  map: &AddressMap,
) -> Result<usize, String> {
  for (k, other) in objects.iter().enumerate() {
    if k == index {
      continue;
    }
    let defined = other
      .symbols
      .iter()
      .find(|s| s.kind != SymbolKind::Undefined && s.name == label);
    if let Some(symbol) = defined {
      let address = match symbol.kind {
        SymbolKind::Text => map.text_bases[k] + symbol.offset,
        _ => map.data_bases[k] + symbol.offset,
      };
      return Ok(address);
    }
  }
  if label == STACK_LABEL {
    return Ok(map.stack_address());
  }
  Err(format!("error resolving global label {label}"))
}

fn check_duplicate_globals(objects: &[ObjectFile]) -> Result<(), String> {
  for (i, first) in objects.iter().enumerate() {
    for second in &objects[i + 1..] {
      for symbol in &first.symbols {
        if symbol.kind == SymbolKind::Undefined {
          continue;
        }
        if second.defines(&symbol.name) {
          return Err("error: duplicate global labels found".to_string());
        }
      }
    }
  }
  Ok(())
}

fn check_reserved(objects: &[ObjectFile]) -> Result<(), String> {
  if objects.iter().any(|o| o.defines(STACK_LABEL)) {
    return Err("error: reserved label Stack used".to_string());
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use lc2k_common::object::{RelocationEntry, RelocationKind, SymbolEntry};

  fn symbol(name: &str, kind: SymbolKind, offset: usize) -> SymbolEntry {
    SymbolEntry { name: name.to_string(), kind, offset }
  }

  fn reloc(offset: usize, kind: RelocationKind, label: &str) -> RelocationEntry {
    RelocationEntry { offset, kind, label: label.to_string() }
  }

  fn lw_word(reg_a: i32, reg_b: i32, offset: i32) -> i32 {
    WordFields { opcode: 2, reg_a, reg_b, offset }.encode()
  }

  #[test]
  fn single_object_without_relocations_is_copied_verbatim() {
    let object = ObjectFile {
      text: vec![622595, 25165824],
      data: vec![42, -7],
      symbols: vec![],
      relocations: vec![],
    };
    let image = link(&[object]).unwrap();
    assert_eq!(image.words, vec![622595, 25165824, 42, -7]);
  }

  #[test]
  fn local_text_reference_shifts_by_text_base() {
    // second object's lw points at its own text line 1
    let first = ObjectFile { text: vec![0, 0, 0], ..Default::default() };
    let second = ObjectFile {
      text: vec![lw_word(0, 1, 1), 0],
      relocations: vec![reloc(0, RelocationKind::Lw, "here")],
      ..Default::default()
    };
    let image = link(&[first, second]).unwrap();
    assert_eq!(image.words[3], lw_word(0, 1, 4));
  }

  #[test]
  fn local_data_reference_lands_after_all_text() {
    // one object: lw to its own .fill on line 2 (text size 2)
    let object = ObjectFile {
      text: vec![lw_word(0, 1, 2), 25165824],
      data: vec![42],
      relocations: vec![reloc(0, RelocationKind::Lw, "x")],
      ..Default::default()
    };
    let image = link(&[object]).unwrap();
    // data starts at 2, so line 2 maps to image address 2
    assert_eq!(image.words[0], lw_word(0, 1, 2));
    assert_eq!(image.words[2], 42);
  }

  #[test]
  fn local_data_reference_shifts_across_objects() {
    // second object's data sits after the first object's data
    let first = ObjectFile { text: vec![0], data: vec![10, 11], ..Default::default() };
    // second object: text occupies its lines 0..2, the .fill is line 2
    let second = ObjectFile {
      text: vec![lw_word(0, 1, 2), 0],
      data: vec![99],
      relocations: vec![reloc(0, RelocationKind::Lw, "y")],
      ..Default::default()
    };
    let image = link(&[first, second]).unwrap();
    // combined text = 3 words, first data = 2 words, so y lands at 5
    assert_eq!(image.words[1], lw_word(0, 1, 5));
    assert_eq!(image.words[5], 99);
  }

  #[test]
  fn global_fill_reference_resolves_across_objects() {
    // object A defines Foo on a text line at offset 3; B takes it via .fill
    let first = ObjectFile {
      text: vec![0, 0, 0, 622595],
      symbols: vec![symbol("Foo", SymbolKind::Text, 3)],
      ..Default::default()
    };
    let second = ObjectFile {
      data: vec![0],
      symbols: vec![symbol("Foo", SymbolKind::Undefined, 0)],
      relocations: vec![reloc(0, RelocationKind::Fill, "Foo")],
      ..Default::default()
    };
    let image = link(&[first, second]).unwrap();
    assert_eq!(image.words[4], 3);
  }

  #[test]
  fn global_text_reference_resolves_to_data_symbol() {
    let first = ObjectFile {
      text: vec![lw_word(0, 1, 0)],
      symbols: vec![symbol("Val", SymbolKind::Undefined, 0)],
      relocations: vec![reloc(0, RelocationKind::Lw, "Val")],
      ..Default::default()
    };
    let second = ObjectFile {
      text: vec![25165824],
      data: vec![5, 6],
      symbols: vec![symbol("Val", SymbolKind::Data, 1)],
      ..Default::default()
    };
    let image = link(&[first, second]).unwrap();
    // total text 2, first has no data, Val = 2 + 0 + 1
    assert_eq!(image.words[0], lw_word(0, 1, 3));
  }

  #[test]
  fn stack_resolves_past_end_of_data() {
    let object = ObjectFile {
      text: vec![25165824],
      data: vec![0],
      symbols: vec![symbol("Stack", SymbolKind::Undefined, 0)],
      relocations: vec![reloc(0, RelocationKind::Fill, "Stack")],
      ..Default::default()
    };
    let image = link(&[object]).unwrap();
    assert_eq!(image.words[1], 2);
  }

  #[test]
  fn rejects_duplicate_global_definitions() {
    let make = || ObjectFile {
      text: vec![0],
      symbols: vec![symbol("Main", SymbolKind::Text, 0)],
      ..Default::default()
    };
    assert_eq!(link(&[make(), make()]).unwrap_err(), "error: duplicate global labels found");
  }

  #[test]
  fn undefined_references_do_not_count_as_duplicates() {
    let defines = ObjectFile {
      text: vec![0],
      symbols: vec![symbol("Main", SymbolKind::Text, 0)],
      ..Default::default()
    };
    let references = ObjectFile {
      text: vec![lw_word(0, 1, 0)],
      symbols: vec![symbol("Main", SymbolKind::Undefined, 0)],
      relocations: vec![reloc(0, RelocationKind::Lw, "Main")],
      ..Default::default()
    };
    let image = link(&[defines, references]).unwrap();
    assert_eq!(image.words[1], lw_word(0, 1, 0));
  }

  #[test]
  fn rejects_defined_stack() {
    let object = ObjectFile {
      data: vec![0],
      symbols: vec![symbol("Stack", SymbolKind::Data, 0)],
      ..Default::default()
    };
    assert_eq!(link(&[object]).unwrap_err(), "error: reserved label Stack used");
  }

  #[test]
  fn rejects_unresolved_global() {
    let object = ObjectFile {
      text: vec![lw_word(0, 1, 0)],
      symbols: vec![symbol("Gone", SymbolKind::Undefined, 0)],
      relocations: vec![reloc(0, RelocationKind::Lw, "Gone")],
      ..Default::default()
    };
    assert_eq!(link(&[object]).unwrap_err(), "error resolving global label Gone");
  }
}
