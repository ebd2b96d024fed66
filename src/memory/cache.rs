//! Cache implementation

use std::fmt;

use log::{debug, trace};
use rand::rngs::StdRng;
use rand::SeedableRng;

use super::replacement::ReplacementPolicy;
use super::set::{Block, CacheSet};
use super::{AccessType, Address, BackingStore, StorageInterface, Word};
use crate::error::{ConfigError, MemoryResult};

/// Split an address into (tag, set index).
/// Addresses look like this, in units of blocks:
/// | tag | index |
pub fn decode(address: Address, block_size: usize, num_sets: usize) -> (Address, usize) {
    let block_number = address.div_euclid(block_size as Address);
    let index = block_number.rem_euclid(num_sets as Address) as usize;
    let tag = block_number.div_euclid(num_sets as Address);
    (tag, index)
}

/// Cache implementation.
/// Write-back and write-allocate; every block holds one word
pub struct Cache<M: BackingStore> {
    pub policy: CachePolicy,

    pub history: CacheHistory,

    num_sets: usize,
    sets: Vec<CacheSet>,

    memory: M,

    ref_counter: u64,
    rng: StdRng,
}

impl<M: BackingStore> Cache<M> {
    /// Build an empty cache in front of `memory`
    pub fn make(policy: CachePolicy, memory: M) -> Result<Self, ConfigError> {
        policy.validate()?;

        let num_sets = policy.num_sets();
        let sets = (0..num_sets).map(|_| CacheSet::new(policy.n_way)).collect();

        debug!(
            "[CACHE] {} words, block size {}, {}-way, {} sets, {} replacement",
            policy.cache_size, policy.block_size, policy.n_way, num_sets, policy.replacement
        );

        Ok(Self {
            policy,
            history: CacheHistory::default(),
            num_sets,
            sets,
            memory,
            ref_counter: 0,
            rng: StdRng::seed_from_u64(policy.seed),
        })
    }

    pub fn num_sets(&self) -> usize {
        self.num_sets
    }

    pub fn sets(&self) -> &[CacheSet] {
        &self.sets
    }

    /// Read-only view of the backing store
    pub fn memory(&self) -> &M {
        &self.memory
    }

    /// Give the backing store back, dropping the cache without flushing
    pub fn into_memory(self) -> M {
        self.memory
    }

    pub fn decode(&self, address: Address) -> (Address, usize) {
        decode(address, self.policy.block_size, self.num_sets)
    }

    pub fn is_in_cache(&self, address: Address) -> bool {
        let (tag, index) = self.decode(address);
        self.sets[index].find(tag).is_some()
    }

    /// Number of blocks holding data not yet written back
    pub fn dirty_count(&self) -> usize {
        self.sets
            .iter()
            .flat_map(|set| set.blocks())
            .filter(|block| block.valid && block.dirty)
            .count()
    }

    pub fn read(&mut self, address: Address) -> MemoryResult<Word> {
        let (index, way) = self.access(address, AccessType::Read)?;
        Ok(self.sets[index].block(way).payload)
    }

    pub fn write(&mut self, address: Address, value: Word) -> MemoryResult<()> {
        let (index, way) = self.access(address, AccessType::Write)?;
        let block = self.sets[index].block_mut(way);
        block.payload = value;
        block.dirty = true;
        block.address = address;
        Ok(())
    }

    /// Write every dirty block back, keeping it cached.
    /// Returns the number of blocks written
    pub fn flush(&mut self) -> MemoryResult<usize> {
        let mut written = 0;
        for set in self.sets.iter_mut() {
            for way in 0..set.blocks().len() {
                let block = set.block_mut(way);
                if block.valid && block.dirty {
                    self.memory.write(block.address, block.payload)?;
                    block.dirty = false;
                    written += 1;
                    self.history.num_write_back += 1;
                }
            }
        }
        debug!("[CACHE] flush wrote {} blocks", written);
        Ok(written)
    }

    /// Invalidate everything. Dirty data is lost
    pub fn clear(&mut self) {
        let lost = self.dirty_count();
        for set in self.sets.iter_mut() {
            set.clear();
        }
        if lost > 0 {
            debug!("[CACHE] clear discarded {} dirty blocks", lost);
        } else {
            debug!("[CACHE] clear");
        }
    }

    /// Locate the block for `address`, loading it on a miss.
    /// Returns (set index, way)
    fn access(
        &mut self,
        address: Address,
        access_type: AccessType,
    ) -> MemoryResult<(usize, usize)> {
        self.ref_counter += 1;
        let (tag, index) = self.decode(address);

        if let Some(way) = self.sets[index].find(tag) {
            trace!(
                "[CACHE] {:?} hit at {}: set {} way {} tag {}",
                access_type,
                address,
                index,
                way,
                tag
            );
            self.sets[index].touch(way, self.ref_counter);
            self.history.record_hit();
            return Ok((index, way));
        }

        let way = self.fetch(address, tag, index)?;
        trace!(
            "[CACHE] {:?} miss at {}: loaded into set {} way {} tag {}",
            access_type,
            address,
            index,
            way,
            tag
        );
        self.history.record_miss();
        Ok((index, way))
    }

    /// Load `address` from the backing store into set `index`,
    /// evicting (and writing back) a block if the set is full
    fn fetch(&mut self, address: Address, tag: Address, index: usize) -> MemoryResult<usize> {
        // Nothing is touched before this read succeeds
        let payload = self.memory.read(address)?;
        let block = Block::loaded(tag, address, payload, self.ref_counter);

        let memory = &mut self.memory;
        let (way, evicted) = self.sets[index].insert(
            block,
            self.policy.replacement,
            &mut self.rng,
            |victim| memory.write(victim.address, victim.payload),
        )?;

        if let Some(victim) = evicted {
            self.history.num_eviction += 1;
            if victim.dirty {
                self.history.num_write_back += 1;
                debug!(
                    "[CACHE] evicted dirty tag {} from set {} way {}, wrote {} to {}",
                    victim.tag, index, way, victim.payload, victim.address
                );
            } else {
                debug!("[CACHE] evicted clean tag {} from set {} way {}", victim.tag, index, way);
            }
        }

        Ok(way)
    }
}

impl<M: BackingStore> StorageInterface for Cache<M> {
    fn read(&mut self, address: Address) -> MemoryResult<Word> {
        Cache::read(self, address)
    }
    fn write(&mut self, address: Address, value: Word) -> MemoryResult<()> {
        Cache::write(self, address, value)
    }
    fn flush(&mut self) -> MemoryResult<usize> {
        Cache::flush(self)
    }
    fn clear(&mut self) {
        Cache::clear(self)
    }
}

impl<M: BackingStore> fmt::Display for Cache<M> {
    /// One line per set; `V`alid/`D`irty flags, tag, address and payload per way
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, set) in self.sets.iter().enumerate() {
            write!(f, "set {:>3}:", index)?;
            for block in set.blocks() {
                if block.valid {
                    write!(
                        f,
                        " [V{} tag={} addr={} data={}]",
                        if block.dirty { "D" } else { "-" },
                        block.tag,
                        block.address,
                        block.payload
                    )?;
                } else {
                    write!(f, " [--]")?;
                }
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Default, Debug, PartialEq)]
pub struct CacheHistory {
    pub num_hit: u64,
    pub num_miss: u64,
    pub num_eviction: u64,
    pub num_write_back: u64,
}

impl CacheHistory {
    pub fn record_hit(&mut self) {
        self.num_hit += 1;
    }

    pub fn record_miss(&mut self) {
        self.num_miss += 1;
    }

    pub fn accesses(&self) -> u64 {
        self.num_hit + self.num_miss
    }

    /// Computes the current miss rate of the cache
    pub fn get_miss_rate(&self) -> f64 {
        if self.accesses() == 0 {
            return 0.;
        }
        (self.num_miss as f64) / (self.accesses() as f64)
    }
}

/// Seed used for random replacement unless told otherwise
pub const DEFAULT_SEED: u64 = 0x5EED;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CachePolicy {
    /// Capacity, in words
    pub cache_size: usize,
    /// Addresses per block
    pub block_size: usize,
    /// Associativity
    pub n_way: usize,

    pub replacement: ReplacementPolicy,
    pub seed: u64,
}

impl Default for CachePolicy {
    /// 16 words, one word per block, 2-way, LRU
    fn default() -> Self {
        Self::make(16, 1, 2, ReplacementPolicy::default())
    }
}

impl CachePolicy {
    pub fn make(
        cache_size: usize,
        block_size: usize,
        n_way: usize,
        replacement: ReplacementPolicy,
    ) -> Self {
        Self { cache_size, block_size, n_way, replacement, seed: DEFAULT_SEED }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Only meaningful once `validate` passed
    pub fn num_sets(&self) -> usize {
        self.cache_size / (self.block_size * self.n_way)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache_size == 0 {
            return Err(ConfigError::NonPositive("cache size"));
        }
        if self.block_size == 0 {
            return Err(ConfigError::NonPositive("block size"));
        }
        if self.n_way == 0 {
            return Err(ConfigError::NonPositive("associativity"));
        }
        // Block size and set count never exceed the capacity
        if Address::try_from(self.cache_size).is_err() {
            return Err(ConfigError::TooLarge(self.cache_size));
        }
        let words_per_set = self.block_size.checked_mul(self.n_way);
        if words_per_set.map_or(true, |per_set| self.cache_size % per_set != 0) {
            return Err(ConfigError::NotDivisible {
                cache_size: self.cache_size,
                block_size: self.block_size,
                n_way: self.n_way,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::error::MemoryError;
    use crate::memory::main_memory::Memory;

    /// Memory that counts its traffic
    struct Recording {
        memory: Memory,
        reads: Cell<usize>,
        writes: Vec<(Address, Word)>,
    }

    impl Recording {
        fn new(size: usize) -> Self {
            Self { memory: Memory::make(size), reads: Cell::new(0), writes: Vec::new() }
        }
    }

    impl BackingStore for Recording {
        fn read(&self, address: Address) -> MemoryResult<Word> {
            self.reads.set(self.reads.get() + 1);
            self.memory.read(address)
        }
        fn write(&mut self, address: Address, value: Word) -> MemoryResult<()> {
            self.writes.push((address, value));
            self.memory.write(address, value)
        }
        fn size(&self) -> usize {
            self.memory.size()
        }
    }

    fn make_cache(
        cache_size: usize,
        block_size: usize,
        n_way: usize,
        replacement: ReplacementPolicy,
    ) -> Cache<Recording> {
        let policy = CachePolicy::make(cache_size, block_size, n_way, replacement);
        Cache::make(policy, Recording::new(64)).unwrap()
    }

    #[test]
    fn test_decode() {
        // 2 sets of 4-word blocks
        assert_eq!(decode(0, 4, 2), (0, 0));
        assert_eq!(decode(3, 4, 2), (0, 0));
        assert_eq!(decode(4, 4, 2), (0, 1));
        assert_eq!(decode(8, 4, 2), (1, 0));
        assert_eq!(decode(16, 4, 2), (2, 0));
        assert_eq!(decode(21, 4, 2), (2, 1));
        for address in 0..100 {
            assert_eq!(decode(address, 4, 2), decode(address, 4, 2));
        }
    }

    #[test]
    fn test_decode_negative_is_total() {
        let (tag, index) = decode(-1, 4, 2);
        assert!(index < 2);
        assert!(tag < 0);
    }

    #[test]
    fn test_policy_validation() {
        assert!(CachePolicy::default().validate().is_ok());
        assert_eq!(
            CachePolicy::make(0, 4, 2, ReplacementPolicy::Lru).validate(),
            Err(ConfigError::NonPositive("cache size"))
        );
        assert_eq!(
            CachePolicy::make(16, 0, 2, ReplacementPolicy::Lru).validate(),
            Err(ConfigError::NonPositive("block size"))
        );
        assert_eq!(
            CachePolicy::make(16, 4, 0, ReplacementPolicy::Lru).validate(),
            Err(ConfigError::NonPositive("associativity"))
        );
        assert_eq!(
            CachePolicy::make(20, 4, 2, ReplacementPolicy::Lru).validate(),
            Err(ConfigError::NotDivisible { cache_size: 20, block_size: 4, n_way: 2 })
        );
        assert!(Cache::make(CachePolicy::make(12, 4, 2, ReplacementPolicy::Lru), Memory::make(8))
            .is_err());
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn test_policy_beyond_address_range() {
        let too_big = i64::MAX as usize + 1;
        assert_eq!(
            CachePolicy::make(too_big, 1, 1, ReplacementPolicy::Lru).validate(),
            Err(ConfigError::TooLarge(too_big))
        );
        assert_eq!(
            CachePolicy::make(too_big, too_big, 1, ReplacementPolicy::Lru).validate(),
            Err(ConfigError::TooLarge(too_big))
        );
        assert!(CachePolicy::make(i64::MAX as usize, 1, 1, ReplacementPolicy::Lru)
            .validate()
            .is_ok());
    }

    #[test]
    fn test_num_sets() {
        assert_eq!(CachePolicy::make(16, 4, 2, ReplacementPolicy::Lru).num_sets(), 2);
        assert_eq!(CachePolicy::make(24, 1, 3, ReplacementPolicy::Lru).num_sets(), 8);
        let cache = make_cache(16, 1, 16, ReplacementPolicy::Lru);
        assert_eq!(cache.num_sets(), 1);
        assert_eq!(cache.sets()[0].blocks().len(), 16);
    }

    #[test]
    fn test_starts_empty() {
        let cache = make_cache(16, 4, 2, ReplacementPolicy::Lru);
        assert!(cache.sets().iter().flat_map(|s| s.blocks()).all(|b| !b.valid && !b.dirty));
        assert!(!cache.is_in_cache(0));
    }

    #[test]
    fn test_hit_stability() {
        let mut cache = make_cache(16, 1, 2, ReplacementPolicy::Lru);
        cache.memory.memory.write(5, 55).unwrap();

        assert_eq!(cache.read(5), Ok(55));
        for _ in 0..10 {
            assert_eq!(cache.read(5), Ok(55));
        }
        assert_eq!(cache.memory().reads.get(), 1);
        assert_eq!(cache.history.num_miss, 1);
        assert_eq!(cache.history.num_hit, 10);
    }

    #[test]
    fn test_read_your_write() {
        let mut cache = make_cache(16, 4, 2, ReplacementPolicy::Lru);
        cache.write(9, 123).unwrap();
        assert_eq!(cache.read(9), Ok(123));
        cache.flush().unwrap();
        assert_eq!(cache.read(9), Ok(123));
        assert_eq!(cache.memory().memory.read(9), Ok(123));
    }

    #[test]
    fn test_write_is_write_back() {
        let mut cache = make_cache(16, 1, 2, ReplacementPolicy::Lru);
        cache.write(3, 7).unwrap();
        cache.write(3, 8).unwrap();
        // Write miss loads the block once, nothing is written through
        assert_eq!(cache.memory().reads.get(), 1);
        assert!(cache.memory().writes.is_empty());
        assert_eq!(cache.memory().memory.read(3), Ok(0));
        assert_eq!(cache.dirty_count(), 1);
        assert_eq!(cache.history.num_miss, 1);
        assert_eq!(cache.history.num_hit, 1);
    }

    #[test]
    fn test_eviction_scenario_slot_zero() {
        // 2-way, block size 4, 16 words => 2 sets.
        // 0, 8, 16 all map to set 0 with tags 0, 1, 2
        let mut cache = make_cache(16, 4, 2, ReplacementPolicy::SlotZero);
        assert_eq!(cache.num_sets(), 2);

        cache.write(0, 42).unwrap();
        cache.read(8).unwrap();
        assert_eq!(cache.history.num_eviction, 0);
        assert!(cache.is_in_cache(0) && cache.is_in_cache(8));

        cache.read(16).unwrap();
        assert_eq!(cache.history.num_eviction, 1);
        // Slot 0 held tag 0, which was dirty
        assert!(!cache.is_in_cache(0));
        assert!(cache.is_in_cache(8) && cache.is_in_cache(16));
        assert_eq!(cache.memory().writes, vec![(0, 42)]);
        assert_eq!(cache.memory().memory.read(0), Ok(42));
        assert_eq!(cache.history.num_write_back, 1);
    }

    #[test]
    fn test_slot_zero_keeps_evicting_slot_zero() {
        let mut cache = make_cache(16, 4, 2, ReplacementPolicy::SlotZero);
        for address in [0, 8, 16, 24, 32] {
            cache.read(address).unwrap();
        }
        // Slot 1 still holds the second block loaded
        assert!(cache.is_in_cache(8));
        assert!(cache.is_in_cache(32));
        assert_eq!(cache.sets()[0].block(1).tag, 1);
        assert_eq!(cache.history.num_eviction, 3);
    }

    #[test]
    fn test_eviction_scenario_lru() {
        let mut cache = make_cache(16, 4, 2, ReplacementPolicy::Lru);
        cache.write(0, 42).unwrap();
        cache.read(8).unwrap();
        // Touch tag 0 again so tag 1 is the least recently used
        cache.read(0).unwrap();
        cache.read(16).unwrap();

        assert_eq!(cache.history.num_eviction, 1);
        assert!(cache.is_in_cache(0));
        assert!(!cache.is_in_cache(8));
        // The victim was clean: the store is untouched
        assert!(cache.memory().writes.is_empty());
    }

    #[test]
    fn test_fifo_differs_from_lru() {
        let mut fifo = make_cache(16, 4, 2, ReplacementPolicy::Fifo);
        let mut lru = make_cache(16, 4, 2, ReplacementPolicy::Lru);
        for cache in [&mut fifo, &mut lru] {
            cache.read(0).unwrap();
            cache.read(8).unwrap();
            cache.read(0).unwrap();
            cache.read(16).unwrap();
        }
        // FIFO evicts the first loaded block regardless of the hit
        assert!(!fifo.is_in_cache(0) && fifo.is_in_cache(8));
        assert!(lru.is_in_cache(0) && !lru.is_in_cache(8));
    }

    #[test]
    fn test_random_is_reproducible() {
        let run = |seed| {
            let policy = CachePolicy::make(8, 1, 4, ReplacementPolicy::Random).with_seed(seed);
            let mut cache = Cache::make(policy, Memory::make(64)).unwrap();
            for address in 0..40 {
                cache.read((address * 7) % 64).unwrap();
            }
            (0..64).filter(|a| cache.is_in_cache(*a)).collect::<Vec<_>>()
        };
        assert_eq!(run(3), run(3));
    }

    #[test]
    fn test_k_plus_one_tags_evict_exactly_once() {
        for policy in ReplacementPolicy::ALL {
            let mut cache = make_cache(8, 1, 4, policy);
            // 2 sets; even addresses all go to set 0
            for address in [0, 2, 4, 6, 8] {
                cache.read(address).unwrap();
            }
            assert_eq!(cache.history.num_eviction, 1, "policy {}", policy);
            assert_eq!(cache.sets()[0].blocks().iter().filter(|b| b.valid).count(), 4);
        }
    }

    #[test]
    fn test_flush_idempotent() {
        let mut cache = make_cache(16, 1, 2, ReplacementPolicy::Lru);
        cache.write(1, 10).unwrap();
        cache.write(2, 20).unwrap();
        assert_eq!(cache.flush(), Ok(2));
        assert_eq!(cache.flush(), Ok(0));
        assert_eq!(cache.memory().writes.len(), 2);
        assert_eq!(cache.dirty_count(), 0);
        // Flushed blocks stay cached
        assert!(cache.is_in_cache(1) && cache.is_in_cache(2));
        let reads = cache.memory().reads.get();
        assert_eq!(cache.read(1), Ok(10));
        assert_eq!(cache.memory().reads.get(), reads);
    }

    #[test]
    fn test_clear_discards() {
        let mut cache = make_cache(16, 1, 2, ReplacementPolicy::Lru);
        cache.memory.memory.write(4, 4).unwrap();
        cache.read(4).unwrap();
        cache.write(5, 99).unwrap();
        cache.clear();

        assert!(!cache.is_in_cache(4) && !cache.is_in_cache(5));
        assert_eq!(cache.flush(), Ok(0));
        assert!(cache.memory().writes.is_empty());

        let misses = cache.history.num_miss;
        assert_eq!(cache.read(4), Ok(4));
        // The unflushed write is gone
        assert_eq!(cache.read(5), Ok(0));
        assert_eq!(cache.history.num_miss, misses + 2);
    }

    #[test]
    fn test_out_of_bounds_propagates() {
        let mut cache = make_cache(16, 1, 2, ReplacementPolicy::Lru);
        assert_eq!(cache.read(64), Err(MemoryError::OutOfBounds { address: 64, size: 64 }));
        assert_eq!(cache.write(-3, 1), Err(MemoryError::OutOfBounds { address: -3, size: 64 }));
        assert!(cache.sets().iter().flat_map(|s| s.blocks()).all(|b| !b.valid));
        assert_eq!(cache.history, CacheHistory::default());
    }

    #[test]
    fn test_failed_miss_keeps_resident_blocks() {
        let mut cache = make_cache(2, 1, 2, ReplacementPolicy::SlotZero);
        cache.write(0, 1).unwrap();
        cache.write(1, 2).unwrap();
        let before: Vec<Block> = cache.sets()[0].blocks().to_vec();
        // 64 is outside the store; the set is full and dirty
        assert!(cache.read(64).is_err());
        assert_eq!(cache.sets()[0].blocks(), &before[..]);
        assert!(cache.memory().writes.is_empty());
    }

    #[test]
    fn test_direct_mapped_unit_blocks_are_transparent() {
        let mut cache = Cache::make(
            CachePolicy::make(4, 1, 1, ReplacementPolicy::Lru),
            Memory::make(32),
        )
        .unwrap();
        let mut model = [0 as Word; 32];
        for step in 0..200 {
            let address = (step * 13 + 5) % 32;
            if step % 3 == 0 {
                cache.write(address, step).unwrap();
                model[address as usize] = step;
            } else {
                assert_eq!(cache.read(address), Ok(model[address as usize]));
            }
        }
        cache.flush().unwrap();
        assert_eq!(cache.memory().words(), &model[..]);
    }

    #[test]
    fn test_borrowed_memory() {
        let mut memory = Memory::make(16);
        {
            let mut cache = Cache::make(CachePolicy::default(), &mut memory).unwrap();
            cache.write(3, 33).unwrap();
            StorageInterface::flush(&mut cache).unwrap();
        }
        assert_eq!(memory.read(3), Ok(33));
    }

    #[test]
    fn test_display() {
        let mut cache = make_cache(4, 1, 2, ReplacementPolicy::Lru);
        cache.write(0, 5).unwrap();
        let dump = cache.to_string();
        assert_eq!(dump.lines().count(), 2);
        assert!(dump.contains("[VD tag=0 addr=0 data=5]"));
        assert!(dump.contains("[--]"));
    }

    #[test]
    fn test_miss_rate() {
        let mut history = CacheHistory::default();
        assert_eq!(history.get_miss_rate(), 0.);
        history.record_miss();
        history.record_hit();
        history.record_hit();
        history.record_hit();
        assert_eq!(history.get_miss_rate(), 0.25);
    }
}
