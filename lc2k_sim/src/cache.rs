use std::fmt;

use log::debug;

use lc2k_common::isa::MEMORY_WORDS;

/// Source and destination of one traced transfer.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ActionKind {
  CacheToProcessor,
  ProcessorToCache,
  MemoryToCache,
  CacheToMemory,
  CacheToNowhere,
}

impl ActionKind {
  fn endpoints(self) -> (&'static str, &'static str) {
    match self {
      ActionKind::CacheToProcessor => ("cache", "processor"),
      ActionKind::ProcessorToCache => ("processor", "cache"),
      ActionKind::MemoryToCache => ("memory", "cache"),
      ActionKind::CacheToMemory => ("cache", "memory"),
      ActionKind::CacheToNowhere => ("cache", "nowhere"),
    }
  }
}

/// One traced transfer: a whole block for installs and evictions, a
/// single word for processor traffic.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct CacheAction {
  pub start: usize,
  pub size: usize,
  pub kind: ActionKind,
}

impl fmt::Display for CacheAction {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let (source, destination) = self.kind.endpoints();
    write!(
      f,
      "@@@ transferring word [{}-{}] from the {} to the {}",
      self.start,
      self.start + self.size - 1,
      source,
      destination
    )
  }
}

#[derive(Debug, Clone)]
struct ValidLine {
  tag: usize,
  /// Word address of the cached block in memory, the write-back target.
  block_head: usize,
  dirty: bool,
  stamp: u64,
  data: Vec<i32>,
}

#[derive(Debug, Clone)]
enum CacheLine {
  Invalid,
  Valid(ValidLine),
}

/// A write-back, write-allocate set-associative cache with LRU
/// replacement. Every transfer is recorded as a [`CacheAction`] for the
/// owner to drain in program order.
pub struct Cache {
  sets: Vec<Vec<CacheLine>>,
  block_size: usize,
  block_bits: u32,
  set_bits: u32,
  stamp: u64,
  actions: Vec<CacheAction>,
}

impl Cache {
  pub fn new(block_size: usize, num_sets: usize, blocks_per_set: usize) -> Result<Cache, String> {
    if !block_size.is_power_of_two() {
      return Err("error: block size must be a power of two".to_string());
    }
    if block_size > MEMORY_WORDS {
      return Err("error: block size exceeds memory".to_string());
    }
    if !num_sets.is_power_of_two() {
      return Err("error: number of sets must be a power of two".to_string());
    }
    if blocks_per_set == 0 {
      return Err("error: blocks per set must be positive".to_string());
    }
    Ok(Cache {
      sets: vec![vec![CacheLine::Invalid; blocks_per_set]; num_sets],
      block_size,
      block_bits: block_size.trailing_zeros(),
      set_bits: num_sets.trailing_zeros(),
      stamp: 0,
      actions: Vec::new(),
    })
  }

  pub fn load(&mut self, address: usize, memory: &mut [i32]) -> i32 {
    self.access(address, None, memory)
  }

  pub fn store(&mut self, address: usize, value: i32, memory: &mut [i32]) {
    self.access(address, Some(value), memory);
  }

  /// Hand over the transfers recorded since the last call.
  pub fn take_actions(&mut self) -> Vec<CacheAction> {
    std::mem::take(&mut self.actions)
  }

  fn split(&self, address: usize) -> (usize, usize, usize) {
    let block_offset = address & (self.block_size - 1);
    let set_index = (address >> self.block_bits) & (self.sets.len() - 1);
    let tag = address >> (self.block_bits + self.set_bits);
    (tag, set_index, block_offset)
  }

  fn access(&mut self, address: usize, write: Option<i32>, memory: &mut [i32]) -> i32 {
    let (tag, set_index, block_offset) = self.split(address);

    if let Some(line_index) = self.find(set_index, tag) {
      return self.service(set_index, line_index, block_offset, address, write);
    }

    let block_head = address - block_offset;
    loop {
      let free = self.sets[set_index]
        .iter()
        .position(|line| matches!(line, CacheLine::Invalid));
      if let Some(line_index) = free {
        self.actions.push(CacheAction {
          start: block_head,
          size: self.block_size,
          kind: ActionKind::MemoryToCache,
        });
        self.sets[set_index][line_index] = CacheLine::Valid(ValidLine {
          tag,
          block_head,
          dirty: false,
          stamp: self.stamp,
          data: memory[block_head..block_head + self.block_size].to_vec(),
        });
        return self.service(set_index, line_index, block_offset, address, write);
      }
      self.evict_lru(set_index, memory);
    }
  }

  fn find(&self, set_index: usize, tag: usize) -> Option<usize> {
    self.sets[set_index].iter().position(|line| match line {
      CacheLine::Valid(v) => v.tag == tag,
      CacheLine::Invalid => false,
    })
  }

  /// Read or write one word of a resident line, tracing the transfer
  /// and refreshing the line's LRU stamp.
  fn service(
    &mut self,
    set_index: usize,
    line_index: usize,
    block_offset: usize,
    address: usize,
    write: Option<i32>,
  ) -> i32 {
    let kind = if write.is_some() {
      ActionKind::ProcessorToCache
    } else {
      ActionKind::CacheToProcessor
    };
    self.actions.push(CacheAction { start: address, size: 1, kind });
    self.stamp += 1;
    let stamp = self.stamp;
    match &mut self.sets[set_index][line_index] {
      CacheLine::Valid(line) => {
        line.stamp = stamp;
        match write {
          Some(value) => {
            line.data[block_offset] = value;
            line.dirty = true;
            value
          }
          None => line.data[block_offset],
        }
      }
      // callers only pass resident lines
      CacheLine::Invalid => 0,
    }
  }

  /// Drop the least recently touched line of a set, writing it back to
  /// its block head first when dirty.
  fn evict_lru(&mut self, set_index: usize, memory: &mut [i32]) {
    let mut victim: Option<(usize, u64)> = None;
    for (line_index, line) in self.sets[set_index].iter().enumerate() {
      if let CacheLine::Valid(v) = line {
        if victim.is_none_or(|(_, best)| v.stamp < best) {
          victim = Some((line_index, v.stamp));
        }
      }
    }
    let Some((line_index, _)) = victim else {
      return;
    };
    let evicted = std::mem::replace(&mut self.sets[set_index][line_index], CacheLine::Invalid);
    let CacheLine::Valid(line) = evicted else {
      return;
    };
    if line.dirty {
      self.actions.push(CacheAction {
        start: line.block_head,
        size: self.block_size,
        kind: ActionKind::CacheToMemory,
      });
      memory[line.block_head..line.block_head + self.block_size].copy_from_slice(&line.data);
    } else {
      self.actions.push(CacheAction {
        start: line.block_head,
        size: self.block_size,
        kind: ActionKind::CacheToNowhere,
      });
    }
  }

  /// Debug dump of every set, in the shape of the action trace's
  /// sibling cache printout.
  pub fn dump(&self) {
    debug!("cache:");
    for (set_index, set) in self.sets.iter().enumerate() {
      debug!("  set {set_index}:");
      for (line_index, line) in set.iter().enumerate() {
        match line {
          CacheLine::Invalid => debug!("    [ {line_index} ]: invalid"),
          CacheLine::Valid(v) => debug!(
            "    [ {line_index} ]: tag {} head {} dirty {} data {:?}",
            v.tag, v.block_head, v.dirty, v.data
          ),
        }
      }
    }
  }
}
