/// Machine word layout:
/// `[unused:7][opcode:3][regA:3][regB:3][offset/dest:16]`, opcode at
/// bits 22..24, regA at 19..21, regB at 16..18. The low 16 bits hold
/// the destination register (R-type) or a two's-complement offset.
pub const OPCODE_SHIFT: u32 = 22;
pub const REG_A_SHIFT: u32 = 19;
pub const REG_B_SHIFT: u32 = 16;

/// Mask for the 3-bit opcode and register fields.
pub const FIELD_MASK: i32 = 0x7;
/// Mask for the 16-bit offset field.
pub const OFFSET_MASK: i32 = 0xFFFF;

pub const NUM_REGS: usize = 8;
/// Word-addressed machine memory size; also the upper bound on any
/// resolved address.
pub const MEMORY_WORDS: usize = 65536;

pub const MIN_OFFSET: i64 = -32768;
pub const MAX_OFFSET: i64 = 32767;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Opcode {
  Add,
  Nor,
  Lw,
  Sw,
  Beq,
  Jalr,
  Halt,
  Noop,
}

/// Operand shape of an opcode.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum OpcodeKind {
  /// regA, regB, regDest
  RType,
  /// regA, regB, offset-or-label
  IType,
  /// regA, regB
  JType,
  /// no operands
  OType,
}

impl Opcode {
  pub fn code(self) -> i32 {
    match self {
      Opcode::Add => 0,
      Opcode::Nor => 1,
      Opcode::Lw => 2,
      Opcode::Sw => 3,
      Opcode::Beq => 4,
      Opcode::Jalr => 5,
      Opcode::Halt => 6,
      Opcode::Noop => 7,
    }
  }

  pub fn from_code(code: i32) -> Option<Opcode> {
    match code {
      0 => Some(Opcode::Add),
      1 => Some(Opcode::Nor),
      2 => Some(Opcode::Lw),
      3 => Some(Opcode::Sw),
      4 => Some(Opcode::Beq),
      5 => Some(Opcode::Jalr),
      6 => Some(Opcode::Halt),
      7 => Some(Opcode::Noop),
      _ => None,
    }
  }

  pub fn mnemonic(self) -> &'static str {
    match self {
      Opcode::Add => "add",
      Opcode::Nor => "nor",
      Opcode::Lw => "lw",
      Opcode::Sw => "sw",
      Opcode::Beq => "beq",
      Opcode::Jalr => "jalr",
      Opcode::Halt => "halt",
      Opcode::Noop => "noop",
    }
  }

  pub fn from_mnemonic(s: &str) -> Option<Opcode> {
    match s {
      "add" => Some(Opcode::Add),
      "nor" => Some(Opcode::Nor),
      "lw" => Some(Opcode::Lw),
      "sw" => Some(Opcode::Sw),
      "beq" => Some(Opcode::Beq),
      "jalr" => Some(Opcode::Jalr),
      "halt" => Some(Opcode::Halt),
      "noop" => Some(Opcode::Noop),
      _ => None,
    }
  }

  pub fn kind(self) -> OpcodeKind {
    match self {
      Opcode::Add | Opcode::Nor => OpcodeKind::RType,
      Opcode::Lw | Opcode::Sw | Opcode::Beq => OpcodeKind::IType,
      Opcode::Jalr => OpcodeKind::JType,
      Opcode::Halt | Opcode::Noop => OpcodeKind::OType,
    }
  }
}

/// Raw bit fields of a machine word, as the linker and simulator see
/// them before any opcode interpretation.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct WordFields {
  pub opcode: i32,
  pub reg_a: i32,
  pub reg_b: i32,
  pub offset: i32,
}

impl WordFields {
  pub fn decode(word: i32) -> Self {
    WordFields {
      opcode: (word >> OPCODE_SHIFT) & FIELD_MASK,
      reg_a: (word >> REG_A_SHIFT) & FIELD_MASK,
      reg_b: (word >> REG_B_SHIFT) & FIELD_MASK,
      offset: word & OFFSET_MASK,
    }
  }

  /// Reassemble a word from fields; `offset` is masked to 16 bits.
  pub fn encode(&self) -> i32 {
    self.opcode << OPCODE_SHIFT
      | self.reg_a << REG_A_SHIFT
      | self.reg_b << REG_B_SHIFT
      | (self.offset & OFFSET_MASK)
  }
}

/// Interpret the low 16 bits of a word as a two's-complement value.
pub fn sign_extend_16(num: i32) -> i32 {
  if num & (1 << 15) != 0 {
    num - (1 << 16)
  } else {
    num
  }
}
