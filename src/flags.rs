use std::path::PathBuf;

use crate::cpu::CPUPolicy;
use crate::memory::cache::CachePolicy;
use crate::memory::main_memory::DEFAULT_MEMORY_SIZE;
use crate::memory::replacement::ReplacementPolicy;

xflags::xflags! {
    /// SPARC-subset simulator with a configurable write-back cache.
    cmd sim-args {
        /// Path to the assembly program, or to a memory trace with --trace.
        required file: PathBuf

        /// Treats the file as a trace of `r <address>` / `w <address> <value>` lines.
        optional --trace

        /// Enables history module, printing instruction and cache counters after simulation.
        optional --history

        /// Prints registers, cache contents and memory after simulation.
        optional --dump

        /// Enables verbose mode, logging every instruction and cache event.
        optional -v, --verbose

        /// Cache capacity in words (default 16).
        optional --cache-size words: usize

        /// Addresses per cache block (default 1).
        optional --block-size words: usize

        /// Cache associativity (default 2).
        optional -w, --ways n: usize

        /// Replacement policy.
        /// lru (default), fifo, random, slot0
        optional -p, --policy policy: ReplacementPolicy

        /// Seed for random replacement.
        optional --seed seed: u64

        /// Main memory size in words (default 256; traces default to their largest address).
        optional --memory-size words: usize

        /// Label execution starts at (default main).
        optional --entry label: String

        /// Aborts after this many instructions.
        optional --max-steps n: u64
    }
}

impl SimArgs {
    pub fn cache_policy(&self) -> CachePolicy {
        let default = CachePolicy::default();
        let policy = CachePolicy::make(
            self.cache_size.unwrap_or(default.cache_size),
            self.block_size.unwrap_or(default.block_size),
            self.ways.unwrap_or(default.n_way),
            self.policy.unwrap_or_default(),
        );
        match self.seed {
            Some(seed) => policy.with_seed(seed),
            None => policy,
        }
    }

    pub fn cpu_policy(&self) -> CPUPolicy {
        let default = CPUPolicy::default();
        CPUPolicy {
            verbose: self.verbose,
            history: self.history,
            dump: self.dump,
            memory_size: self.memory_size.unwrap_or(DEFAULT_MEMORY_SIZE),
            max_steps: self.max_steps.unwrap_or(default.max_steps),
        }
    }

    pub fn entry(&self) -> &str {
        self.entry.as_deref().unwrap_or("main")
    }
}
