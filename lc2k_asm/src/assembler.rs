use std::collections::HashMap;

use log::debug;

use lc2k_common::isa::{MAX_OFFSET, MIN_OFFSET, NUM_REGS, OPCODE_SHIFT, Opcode, OpcodeKind, WordFields};
use lc2k_common::label::{is_global_label, is_valid_label};
use lc2k_common::object::{ObjectFile, RelocationEntry, RelocationKind, SymbolEntry, SymbolKind};

use crate::parser::Statement;

const FILL: &str = ".fill";
const MIN_FILL: i64 = i32::MIN as i64;
const MAX_FILL: i64 = i32::MAX as i64;

pub struct Assembler {
  /// Pass-1 map from label name to its 0-based input line number,
  /// counting instruction and `.fill` lines alike.
  labels: HashMap<String, usize>,
  text: Vec<i32>,
  data: Vec<i32>,
  symbols: Vec<SymbolEntry>,
  relocations: Vec<RelocationEntry>,
}

/// The numeric value of a field, or `None` when the field is a label.
/// Values beyond i64 saturate so the range checks downstream still fire.
fn parse_numeric(field: &str) -> Option<i64> {
  let body = field.strip_prefix(['+', '-']).unwrap_or(field);
  if body.is_empty() || !body.bytes().all(|b| b.is_ascii_digit()) {
    return None;
  }
  Some(
    field
      .parse::<i64>()
      .unwrap_or(if field.starts_with('-') { i64::MIN } else { i64::MAX }),
  )
}

fn parse_register(field: &str) -> Result<i32, String> {
  match parse_numeric(field) {
    Some(n) if (0..NUM_REGS as i64).contains(&n) => Ok(n as i32),
    _ => Err("Invalid registers".to_string()),
  }
}

impl Assembler {
  pub fn new() -> Self {
    Self {
      labels: HashMap::new(),
      text: Vec::new(),
      data: Vec::new(),
      symbols: Vec::new(),
      relocations: Vec::new(),
    }
  }

  pub fn assemble(program: &[Statement]) -> Result<ObjectFile, String> {
    let mut assembler = Assembler::new();
    assembler.first_pass(program)?;
    assembler.second_pass(program)?;
    debug!(
      "assembled {} text words, {} data words, {} symbols, {} relocations",
      assembler.text.len(),
      assembler.data.len(),
      assembler.symbols.len(),
      assembler.relocations.len()
    );
    Ok(ObjectFile {
      text: assembler.text,
      data: assembler.data,
      symbols: assembler.symbols,
      relocations: assembler.relocations,
    })
  }

  /// First pass: map every defined label to its line number and check
  /// `.fill` operands for overflow.
  fn first_pass(&mut self, program: &[Statement]) -> Result<(), String> {
    for (line_number, statement) in program.iter().enumerate() {
      if let Some(label) = &statement.label {
        if !is_valid_label(label) {
          return Err("Invalid label".to_string());
        }
        if self.labels.contains_key(label) {
          return Err("Duplicate label".to_string());
        }
        debug!("pass 1: label {label} at line {line_number}");
        self.labels.insert(label.clone(), line_number);
      }
      if statement.opcode == FILL {
        if let Some(value) = parse_numeric(&statement.args[0]) {
          if !(MIN_FILL..=MAX_FILL).contains(&value) {
            return Err(".fill overflow".to_string());
          }
        }
      }
    }
    Ok(())
  }

  /// Second pass: emit one text word per instruction line and one data
  /// word per `.fill`, producing symbol and relocation entries as they
  /// arise.
  fn second_pass(&mut self, program: &[Statement]) -> Result<(), String> {
    for (line_number, statement) in program.iter().enumerate() {
      if statement.opcode == FILL {
        self.emit_fill(statement)?;
        continue;
      }
      let opcode =
        Opcode::from_mnemonic(&statement.opcode).ok_or_else(|| "Unsupported opcode".to_string())?;
      let word = self.encode_instruction(opcode, statement, line_number)?;
      self.text.push(word);
    }
    Ok(())
  }

  fn encode_instruction(
    &mut self,
    opcode: Opcode,
    statement: &Statement,
    line_number: usize,
  ) -> Result<i32, String> {
    let [arg0, arg1, arg2] = &statement.args;
    match opcode.kind() {
      OpcodeKind::RType => {
        let reg_a = parse_register(arg0)?;
        let reg_b = parse_register(arg1)?;
        let dest = parse_register(arg2)?;
        self.define_text_symbol(statement);
        Ok(WordFields { opcode: opcode.code(), reg_a, reg_b, offset: dest }.encode())
      }
      OpcodeKind::IType => {
        let reg_a = parse_register(arg0)?;
        let reg_b = parse_register(arg1)?;
        self.define_text_symbol(statement);
        let numeric = parse_numeric(arg2);
        let mut offset = match numeric {
          Some(value) => {
            if !(MIN_OFFSET..=MAX_OFFSET).contains(&value) {
              return Err("Offset out of range".to_string());
            }
            value
          }
          None => match self.labels.get(arg2.as_str()) {
            Some(&line) => line as i64,
            None => {
              if !is_global_label(arg2) {
                return Err("Invalid label".to_string());
              }
              if opcode == Opcode::Beq {
                return Err("Undefined label".to_string());
              }
              self.reference_undefined(arg2);
              0
            }
          },
        };
        if numeric.is_none() && opcode != Opcode::Beq {
          // lw/sw label operands are patched by the linker
          let kind = if opcode == Opcode::Lw { RelocationKind::Lw } else { RelocationKind::Sw };
          self.relocations.push(RelocationEntry {
            offset: self.text.len(),
            kind,
            label: arg2.clone(),
          });
        }
        if numeric.is_none() && opcode == Opcode::Beq {
          // PC-relative, resolved here and never relocated
          offset -= line_number as i64 + 1;
          if !(MIN_OFFSET..=MAX_OFFSET).contains(&offset) {
            return Err("Offset out of range".to_string());
          }
        }
        Ok(WordFields { opcode: opcode.code(), reg_a, reg_b, offset: offset as i32 }.encode())
      }
      OpcodeKind::JType => {
        let reg_a = parse_register(arg0)?;
        let reg_b = parse_register(arg1)?;
        self.define_text_symbol(statement);
        Ok(WordFields { opcode: opcode.code(), reg_a, reg_b, offset: 0 }.encode())
      }
      OpcodeKind::OType => {
        self.define_text_symbol(statement);
        Ok(opcode.code() << OPCODE_SHIFT)
      }
    }
  }

  fn emit_fill(&mut self, statement: &Statement) -> Result<(), String> {
    let operand = &statement.args[0];
    match parse_numeric(operand) {
      Some(value) => {
        // bounds were enforced in pass 1
        self.define_data_symbol(statement);
        self.data.push(value as i32);
      }
      None => match self.labels.get(operand.as_str()) {
        None => {
          if !is_global_label(operand) {
            return Err("Invalid label".to_string());
          }
          self.reference_undefined(operand);
          self.define_data_symbol(statement);
          self.relocations.push(RelocationEntry {
            offset: self.data.len(),
            kind: RelocationKind::Fill,
            label: operand.clone(),
          });
          self.data.push(0);
        }
        Some(&line) => {
          self.relocations.push(RelocationEntry {
            offset: self.data.len(),
            kind: RelocationKind::Fill,
            label: operand.clone(),
          });
          self.define_data_symbol(statement);
          self.data.push(line as i32);
        }
      },
    }
    Ok(())
  }

  /// A global label defined on an instruction line becomes a `T` entry
  /// at the current text index.
  fn define_text_symbol(&mut self, statement: &Statement) {
    if let Some(label) = &statement.label {
      if is_global_label(label) {
        self.symbols.push(SymbolEntry {
          name: label.clone(),
          kind: SymbolKind::Text,
          offset: self.text.len(),
        });
      }
    }
  }

  /// A global label defined on a `.fill` line becomes a `D` entry at
  /// the current data index.
  fn define_data_symbol(&mut self, statement: &Statement) {
    if let Some(label) = &statement.label {
      if is_global_label(label) {
        self.symbols.push(SymbolEntry {
          name: label.clone(),
          kind: SymbolKind::Data,
          offset: self.data.len(),
        });
      }
    }
  }

  /// Record a `U` entry for a referenced-but-undefined global, at most
  /// once per object.
  fn reference_undefined(&mut self, name: &str) {
    let seen = self
      .symbols
      .iter()
      .any(|s| s.kind == SymbolKind::Undefined && s.name == name);
    if !seen {
      self.symbols.push(SymbolEntry {
        name: name.to_string(),
        kind: SymbolKind::Undefined,
        offset: 0,
      });
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::parser::parse_program;

  fn assemble_source(source: &str) -> Result<ObjectFile, String> {
    Assembler::assemble(&parse_program(source)?)
  }

  #[test]
  fn encodes_rtype_add() {
    let object = assemble_source("\tadd 1 2 3\n").unwrap();
    assert_eq!(object.text, vec![622595]);
    assert_eq!(object.to_string(), "1 0 0 0\n622595\n");
  }

  #[test]
  fn encodes_local_backward_branch_without_relocation() {
    let source = "start\tadd 0 0 0\n\tbeq 0 0 start\n";
    let object = assemble_source(source).unwrap();
    // branch target = (0 - 1 - 1) & 0xFFFF
    assert_eq!(object.text[1] & 0xFFFF, 0xFFFE);
    assert_eq!(object.text[1] >> 22, Opcode::Beq.code());
    assert!(object.relocations.is_empty());
    assert!(object.symbols.is_empty());
  }

  #[test]
  fn numeric_offsets_never_relocate() {
    let object = assemble_source("\tlw 0 1 7\n\tsw 1 2 -3\n").unwrap();
    assert!(object.relocations.is_empty());
    assert_eq!(object.text[0] & 0xFFFF, 7);
    assert_eq!(object.text[1] & 0xFFFF, (-3i32) & 0xFFFF);
  }

  #[test]
  fn local_fill_reference_resolves_to_line_number() {
    let source = "\tlw 0 1 x\n\thalt\nx\t.fill 42\n";
    let object = assemble_source(source).unwrap();
    assert_eq!(object.text.len(), 2);
    assert_eq!(object.data, vec![42]);
    // x lives on line 2; lw takes the absolute line number and a relocation
    assert_eq!(object.text[0] & 0xFFFF, 2);
    assert!(object.symbols.is_empty());
    assert_eq!(
      object.relocations,
      vec![RelocationEntry { offset: 0, kind: RelocationKind::Lw, label: "x".to_string() }]
    );
  }

  #[test]
  fn undefined_global_lw_gets_u_symbol_and_relocation() {
    let object = assemble_source("\tlw 0 1 Far\n\tsw 0 1 Far\n\thalt\n").unwrap();
    assert_eq!(object.text[0] & 0xFFFF, 0);
    // the U entry is deduplicated across both references
    assert_eq!(
      object.symbols,
      vec![SymbolEntry { name: "Far".to_string(), kind: SymbolKind::Undefined, offset: 0 }]
    );
    assert_eq!(
      object.relocations,
      vec![
        RelocationEntry { offset: 0, kind: RelocationKind::Lw, label: "Far".to_string() },
        RelocationEntry { offset: 1, kind: RelocationKind::Sw, label: "Far".to_string() },
      ]
    );
  }

  #[test]
  fn global_definitions_become_t_and_d_symbols() {
    let source = "Main\tadd 0 0 0\nloop\tnoop\nVal\t.fill 5\n\t.fill Val\n";
    let object = assemble_source(source).unwrap();
    assert_eq!(
      object.symbols,
      vec![
        SymbolEntry { name: "Main".to_string(), kind: SymbolKind::Text, offset: 0 },
        SymbolEntry { name: "Val".to_string(), kind: SymbolKind::Data, offset: 0 },
      ]
    );
    // `.fill Val` sees a locally defined label: its line number, relocated
    assert_eq!(object.data, vec![5, 2]);
    assert_eq!(
      object.relocations,
      vec![RelocationEntry { offset: 1, kind: RelocationKind::Fill, label: "Val".to_string() }]
    );
  }

  #[test]
  fn undefined_global_fill_emits_placeholder() {
    let object = assemble_source("Pos\t.fill Stack\n").unwrap();
    assert_eq!(object.data, vec![0]);
    assert_eq!(
      object.symbols,
      vec![
        SymbolEntry { name: "Stack".to_string(), kind: SymbolKind::Undefined, offset: 0 },
        SymbolEntry { name: "Pos".to_string(), kind: SymbolKind::Data, offset: 0 },
      ]
    );
    assert_eq!(
      object.relocations,
      vec![RelocationEntry { offset: 0, kind: RelocationKind::Fill, label: "Stack".to_string() }]
    );
  }

  #[test]
  fn jalr_and_otype_encode_registers_only() {
    let object = assemble_source("\tjalr 3 5\n\thalt\n\tnoop\n").unwrap();
    assert_eq!(
      object.text,
      vec![
        (5 << 22) | (3 << 19) | (5 << 16),
        6 << 22,
        7 << 22,
      ]
    );
  }

  #[test]
  fn emits_object_record_in_section_order() {
    let source = "Entry\tlw 0 1 Five\n\thalt\nFive\t.fill 5\n";
    let object = assemble_source(source).unwrap();
    assert_eq!(
      object.to_string(),
      "2 1 2 1\n\
       8454146\n\
       25165824\n\
       5\n\
       Entry T 0\n\
       Five D 0\n\
       0 lw Five\n"
    );
  }

  #[test]
  fn rejects_duplicate_label() {
    let err = assemble_source("loop\tnoop\nloop\tnoop\n").unwrap_err();
    assert_eq!(err, "Duplicate label");
  }

  #[test]
  fn rejects_invalid_defined_label() {
    assert_eq!(assemble_source("7loop\tnoop\n").unwrap_err(), "Invalid label");
    assert_eq!(assemble_source("toolong7\tnoop\n").unwrap_err(), "Invalid label");
  }

  #[test]
  fn rejects_undefined_local_reference() {
    assert_eq!(assemble_source("\tlw 0 1 nope\n").unwrap_err(), "Invalid label");
    assert_eq!(assemble_source("\t.fill nope\n").unwrap_err(), "Invalid label");
  }

  #[test]
  fn rejects_beq_to_undefined_global() {
    assert_eq!(assemble_source("\tbeq 0 0 Gone\n").unwrap_err(), "Undefined label");
  }

  #[test]
  fn rejects_unknown_opcode_and_blank_line() {
    assert_eq!(assemble_source("\tmov 1 2\n").unwrap_err(), "Unsupported opcode");
    assert_eq!(assemble_source("\tnoop\n\n").unwrap_err(), "Unsupported opcode");
  }

  #[test]
  fn rejects_bad_registers() {
    assert_eq!(assemble_source("\tadd 1 2 8\n").unwrap_err(), "Invalid registers");
    assert_eq!(assemble_source("\tadd -1 2 3\n").unwrap_err(), "Invalid registers");
    assert_eq!(assemble_source("\tlw x 1 0\n").unwrap_err(), "Invalid registers");
  }

  #[test]
  fn rejects_out_of_range_offsets() {
    assert_eq!(assemble_source("\tlw 0 1 32768\n").unwrap_err(), "Offset out of range");
    assert_eq!(assemble_source("\tlw 0 1 -32769\n").unwrap_err(), "Offset out of range");
    assert!(assemble_source("\tlw 0 1 32767\n").is_ok());
    assert!(assemble_source("\tlw 0 1 -32768\n").is_ok());
  }

  #[test]
  fn rejects_fill_overflow() {
    assert_eq!(assemble_source("\t.fill 2147483648\n").unwrap_err(), ".fill overflow");
    assert_eq!(assemble_source("\t.fill -2147483649\n").unwrap_err(), ".fill overflow");
    assert_eq!(assemble_source("\t.fill 99999999999999999999\n").unwrap_err(), ".fill overflow");
    let object = assemble_source("\t.fill 2147483647\n\t.fill -2147483648\n").unwrap();
    assert_eq!(object.data, vec![i32::MAX, i32::MIN]);
  }

  #[test]
  fn beq_range_checked_after_pc_relative_conversion() {
    // a backward branch from line 40000 to line 0 is out of reach
    let mut source = String::from("start\tnoop\n");
    for _ in 0..40000 {
      source.push_str("\tnoop\n");
    }
    source.push_str("\tbeq 0 0 start\n");
    assert_eq!(assemble_source(&source).unwrap_err(), "Offset out of range");
  }
}
