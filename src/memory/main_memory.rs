//! Flat, bounds-checked main memory

use std::fmt;

use super::{Address, BackingStore, Word};
use crate::error::{MemoryError, MemoryResult};

/// Default number of words, matching the simulated SPARC machine
pub const DEFAULT_MEMORY_SIZE: usize = 256;

/// Main memory
pub struct Memory {
    words: Vec<Word>,
}

impl Default for Memory {
    fn default() -> Self {
        Self::make(DEFAULT_MEMORY_SIZE)
    }
}

impl Memory {
    /// Make a zero-filled memory of `size` words
    pub fn make(size: usize) -> Self {
        Self { words: vec![0; size] }
    }

    /// Translate an address into an index, rejecting anything outside [0, size)
    fn index(&self, address: Address) -> MemoryResult<usize> {
        usize::try_from(address)
            .ok()
            .filter(|&i| i < self.words.len())
            .ok_or(MemoryError::OutOfBounds { address, size: self.words.len() })
    }

    pub fn words(&self) -> &[Word] {
        &self.words
    }
}

impl BackingStore for Memory {
    fn read(&self, address: Address) -> MemoryResult<Word> {
        let i = self.index(address)?;
        Ok(self.words[i])
    }

    fn write(&mut self, address: Address, value: Word) -> MemoryResult<()> {
        let i = self.index(address)?;
        self.words[i] = value;
        Ok(())
    }

    fn size(&self) -> usize {
        self.words.len()
    }
}

impl fmt::Display for Memory {
    /// Prints only the non-zero words
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        write!(f, "[")?;
        for (address, word) in self.words.iter().enumerate() {
            if *word == 0 {
                continue;
            }
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", address, word)?;
            first = false;
        }
        write!(f, "]")
    }
}
