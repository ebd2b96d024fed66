//! Memory structure

pub mod cache;
pub mod main_memory;
pub mod replacement;
pub mod set;

use crate::error::MemoryResult;

/// One addressable unit of memory
pub type Word = i64;

/// Linear word address.
/// Signed so that bad stack arithmetic surfaces as an out-of-bounds error
/// instead of wrapping around
pub type Address = i64;

/// Flat storage sitting behind a cache
pub trait BackingStore {
    fn read(&self, address: Address) -> MemoryResult<Word>;
    fn write(&mut self, address: Address, value: Word) -> MemoryResult<()>;
    fn size(&self) -> usize;
}

impl<T: BackingStore + ?Sized> BackingStore for &mut T {
    fn read(&self, address: Address) -> MemoryResult<Word> {
        (**self).read(address)
    }
    fn write(&mut self, address: Address, value: Word) -> MemoryResult<()> {
        (**self).write(address, value)
    }
    fn size(&self) -> usize {
        (**self).size()
    }
}

/// Storage interface used by the instruction executor
pub trait StorageInterface {
    fn read(&mut self, address: Address) -> MemoryResult<Word>;
    fn write(&mut self, address: Address, value: Word) -> MemoryResult<()>;

    /// Push all modified data down to the backing store,
    /// returning the number of words written
    fn flush(&mut self) -> MemoryResult<usize>;

    /// Drop all cached state without writing anything back
    fn clear(&mut self);
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum AccessType {
    Read,
    Write,
}
