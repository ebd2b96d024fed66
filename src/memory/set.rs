//! Cache blocks and associative sets

use rand::rngs::StdRng;
use rand::Rng;

use super::replacement::ReplacementPolicy;
use super::{Address, Word};
use crate::error::MemoryResult;

/// One storage slot of a set
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Block {
    pub valid: bool,
    /// Implies `valid`
    pub dirty: bool,

    pub tag: Address,
    pub payload: Word,
    /// Where the payload goes on write-back
    pub address: Address,

    /// Access stamp of the last hit or insertion (LRU)
    pub last_used: u64,
    /// Access stamp of the insertion (FIFO)
    pub loaded_at: u64,
}

impl Block {
    /// Make a clean block freshly loaded from the backing store
    pub fn loaded(tag: Address, address: Address, payload: Word, stamp: u64) -> Self {
        Self {
            valid: true,
            dirty: false,
            tag,
            payload,
            address,
            last_used: stamp,
            loaded_at: stamp,
        }
    }
}

/// A set of `n_way` blocks
#[derive(Clone, Debug)]
pub struct CacheSet {
    blocks: Vec<Block>,
}

impl CacheSet {
    pub fn new(n_way: usize) -> Self {
        assert!(n_way > 0);
        Self { blocks: vec![Block::default(); n_way] }
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn block(&self, way: usize) -> &Block {
        &self.blocks[way]
    }

    pub fn block_mut(&mut self, way: usize) -> &mut Block {
        &mut self.blocks[way]
    }

    /// The way holding a valid block with the given tag
    pub fn find(&self, tag: Address) -> Option<usize> {
        self.blocks.iter().position(|block| block.valid && block.tag == tag)
    }

    /// The first invalid way
    pub fn find_empty(&self) -> Option<usize> {
        self.blocks.iter().position(|block| !block.valid)
    }

    /// Pick the way to evict from a full set
    pub fn select_victim(&self, policy: ReplacementPolicy, rng: &mut StdRng) -> usize {
        let oldest_by = |key: fn(&Block) -> u64| {
            self.blocks
                .iter()
                .enumerate()
                .min_by_key(|(_, block)| key(block))
                .map(|(way, _)| way)
                .unwrap_or(0)
        };
        match policy {
            ReplacementPolicy::Lru => oldest_by(|block| block.last_used),
            ReplacementPolicy::Fifo => oldest_by(|block| block.loaded_at),
            ReplacementPolicy::Random => rng.gen_range(0..self.blocks.len()),
            ReplacementPolicy::SlotZero => 0,
        }
    }

    /// Record a hit on the given way
    pub fn touch(&mut self, way: usize, stamp: u64) {
        self.blocks[way].last_used = stamp;
    }

    /// Place `block` into an empty way, or into a victim's way.
    /// A dirty victim is handed to `write_back` before it gets overwritten;
    /// if that fails, the set is left untouched.
    /// Returns the way used and the evicted block, if any
    pub fn insert<F>(
        &mut self,
        block: Block,
        policy: ReplacementPolicy,
        rng: &mut StdRng,
        write_back: F,
    ) -> MemoryResult<(usize, Option<Block>)>
    where
        F: FnOnce(&Block) -> MemoryResult<()>,
    {
        // Duplicate tags must never coexist
        debug_assert!(self.find(block.tag).is_none());

        if let Some(way) = self.find_empty() {
            self.blocks[way] = block;
            return Ok((way, None));
        }

        let way = self.select_victim(policy, rng);
        let victim = self.blocks[way];
        if victim.dirty {
            write_back(&victim)?;
        }
        self.blocks[way] = block;
        Ok((way, Some(victim)))
    }

    /// Invalidate every block
    pub fn clear(&mut self) {
        for block in self.blocks.iter_mut() {
            *block = Block::default();
        }
    }
}
