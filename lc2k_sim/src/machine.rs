use std::io::Write;

use log::{debug, info, trace};

use lc2k_common::image::Executable;
use lc2k_common::isa::{MEMORY_WORDS, NUM_REGS, Opcode, WordFields, sign_extend_16};

use crate::cache::Cache;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum StepOutcome {
  Running,
  Halted,
}

/// The simulated LC-2K machine: registers, word-addressed memory and
/// the cache every memory reference is serviced through.
pub struct Machine {
  pc: i32,
  regs: [i32; NUM_REGS],
  memory: Vec<i32>,
  loaded_words: usize,
  cache: Cache,
  executed: u64,
}

/// The R-type destination rides in the 16-bit field and is the only
/// register designator that can escape the register file.
fn register_index(value: i32) -> Result<usize, String> {
  if (0..NUM_REGS as i32).contains(&value) {
    Ok(value as usize)
  } else {
    Err("Invalid register".to_string())
  }
}

impl Machine {
  pub fn new(image: &Executable, cache: Cache) -> Result<Machine, String> {
    if image.words.len() > MEMORY_WORDS {
      return Err(format!(
        "error: executable has {} words, memory holds {MEMORY_WORDS}",
        image.words.len()
      ));
    }
    let mut memory = vec![0; MEMORY_WORDS];
    memory[..image.words.len()].copy_from_slice(&image.words);
    Ok(Machine {
      pc: 0,
      regs: [0; NUM_REGS],
      memory,
      loaded_words: image.words.len(),
      cache,
      executed: 0,
    })
  }

  /// Run until `halt`, writing the cache-action trace to `trace_out`.
  /// Returns the number of instructions executed.
  pub fn run(&mut self, trace_out: &mut dyn Write) -> Result<u64, String> {
    loop {
      if self.step(trace_out)? == StepOutcome::Halted {
        info!("machine halted after {} instructions", self.executed);
        self.cache.dump();
        self.dump_state();
        return Ok(self.executed);
      }
    }
  }

  pub fn step(&mut self, trace_out: &mut dyn Write) -> Result<StepOutcome, String> {
    if !(0..MEMORY_WORDS as i32).contains(&self.pc) {
      return Err("Program counter out of bounds".to_string());
    }
    let word = self.load(self.pc as usize, trace_out)?;
    let fields = WordFields::decode(word);
    self.pc += 1;
    self.executed += 1;
    if self.pc >= MEMORY_WORDS as i32 {
      return Err("Program counter out of bounds".to_string());
    }

    let opcode = Opcode::from_code(fields.opcode)
      .ok_or_else(|| "Unsupported opcode".to_string())?;
    let reg_a = fields.reg_a as usize;
    let reg_b = fields.reg_b as usize;
    match opcode {
      Opcode::Add => {
        let dest = register_index(fields.offset)?;
        self.regs[dest] = self.regs[reg_a].wrapping_add(self.regs[reg_b]);
      }
      Opcode::Nor => {
        let dest = register_index(fields.offset)?;
        self.regs[dest] = !(self.regs[reg_a] | self.regs[reg_b]);
      }
      Opcode::Lw => {
        let address = self.data_address(&fields)?;
        self.regs[reg_b] = self.load(address, trace_out)?;
      }
      Opcode::Sw => {
        let address = self.data_address(&fields)?;
        self.store(address, self.regs[reg_b], trace_out)?;
      }
      Opcode::Beq => {
        if self.regs[reg_a] == self.regs[reg_b] {
          self.pc += sign_extend_16(fields.offset);
        }
      }
      Opcode::Jalr => {
        // the return address lands in regB before PC is replaced, so
        // jalr with regA == regB falls through to the next instruction
        self.regs[reg_b] = self.pc;
        self.pc = self.regs[reg_a];
      }
      Opcode::Halt => return Ok(StepOutcome::Halted),
      Opcode::Noop => {}
    }
    trace!("pc {} regs {:?}", self.pc, self.regs);
    Ok(StepOutcome::Running)
  }

  pub fn pc(&self) -> i32 {
    self.pc
  }

  pub fn registers(&self) -> &[i32; NUM_REGS] {
    &self.regs
  }

  pub fn memory(&self) -> &[i32] {
    &self.memory
  }

  fn data_address(&self, fields: &WordFields) -> Result<usize, String> {
    let address = self.regs[fields.reg_a as usize].wrapping_add(sign_extend_16(fields.offset));
    if !(0..MEMORY_WORDS as i32).contains(&address) {
      return Err("Memory address out of bounds".to_string());
    }
    Ok(address as usize)
  }

  fn load(&mut self, address: usize, trace_out: &mut dyn Write) -> Result<i32, String> {
    let value = self.cache.load(address, &mut self.memory);
    self.flush_trace(trace_out)?;
    Ok(value)
  }

  fn store(&mut self, address: usize, value: i32, trace_out: &mut dyn Write) -> Result<(), String> {
    self.cache.store(address, value, &mut self.memory);
    self.flush_trace(trace_out)
  }

  fn flush_trace(&mut self, trace_out: &mut dyn Write) -> Result<(), String> {
    for action in self.cache.take_actions() {
      writeln!(trace_out, "{action}").map_err(|e| format!("error writing trace: {e}"))?;
    }
    Ok(())
  }

  fn dump_state(&self) {
    debug!("pc {}", self.pc);
    for (index, value) in self.regs.iter().enumerate() {
      debug!("reg[ {index} ] {value}");
    }
    for address in 0..self.loaded_words {
      debug!("mem[ {address} ] {}", self.memory[address]);
    }
  }
}
