//! A simulator wrapper

use std::path::Path;

use env_logger::Env;
use log::{debug, info, warn, LevelFilter};

use crate::cpu::CPUPolicy;
use crate::cpu::CPUState;
use crate::error::LoadError;
use crate::error::MemoryResult;
use crate::error::SimulatorResult;
use crate::executor;
use crate::loader;
use crate::loader::Program;
use crate::memory::cache::{Cache, CacheHistory, CachePolicy};
use crate::memory::main_memory::{Memory, DEFAULT_MEMORY_SIZE};
use crate::memory::{Address, BackingStore, Word};

/// Counters reported after a program run
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RunStats {
    pub inst_count: u64,
    pub load_count: u64,
    pub store_count: u64,
    pub call_count: u64,
    /// Blocks written back by the final flush
    pub flushed: usize,
    pub cache: CacheHistory,
}

/// A finished program run; the cache has been flushed into memory
pub struct Simulation {
    pub cpu: CPUState,
    pub cache: Cache<Memory>,
    pub flushed: usize,
}

impl Simulation {
    pub fn stats(&self) -> RunStats {
        RunStats {
            inst_count: self.cpu.history.inst_count,
            load_count: self.cpu.history.load_count,
            store_count: self.cpu.history.store_count,
            call_count: self.cpu.history.call_count,
            flushed: self.flushed,
            cache: self.cache.history,
        }
    }
}

/// Sets up `env_logger`. Verbose mode forces debug output,
/// otherwise `RUST_LOG` applies with `warn` as the default
pub fn init_logging(verbose: bool) {
    let mut builder = env_logger::Builder::from_env(Env::default().default_filter_or("warn"));
    if verbose {
        builder.filter_level(LevelFilter::Debug);
    }
    // A second initialization keeps the first logger
    let _ = builder.format_timestamp(None).try_init();
}

/// Execute a loaded program from `entry`, then flush the cache
pub fn simulate(
    program: &Program,
    entry: &str,
    policy: CPUPolicy,
    cache_policy: CachePolicy,
) -> SimulatorResult<Simulation> {
    let mut cpu = CPUState::make(policy);
    let mut cache = Cache::make(cache_policy, Memory::make(policy.memory_size))?;

    executor::run(&mut cpu, program, &mut cache, entry)?;
    let flushed = cache.flush()?;

    Ok(Simulation { cpu, cache, flushed })
}

/// Run simulation on the given assembly file
pub fn run(
    path: impl AsRef<Path>,
    entry: &str,
    policy: CPUPolicy,
    cache_policy: CachePolicy,
) -> SimulatorResult<RunStats> {
    let program = loader::load_program(path)?;
    let sim = simulate(&program, entry, policy, cache_policy)?;
    let stats = sim.stats();

    if policy.dump {
        eprintln!("[DUMP] Registers:\n{}", sim.cpu.regs);
        eprintln!("[DUMP] Cache:\n{}", sim.cache);
        eprintln!("[DUMP] Memory: {}", sim.cache.memory());
    }

    if policy.history {
        eprintln!("[HISTORY] # instructions = {}", stats.inst_count);
        eprintln!(
            "[HISTORY] # loads = {}, # stores = {}, # calls = {}",
            stats.load_count, stats.store_count, stats.call_count
        );
        report_cache(&stats.cache);
    }

    Ok(stats)
}

fn report_cache(history: &CacheHistory) {
    eprintln!("[HISTORY] {:?}", history);
    eprintln!("[HISTORY] Miss rate = {:.4}", history.get_miss_rate());
}

/// One access of a memory trace
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Operation {
    Read(Address),
    Write(Address, Word),
}

impl Operation {
    pub fn address(&self) -> Address {
        match *self {
            Operation::Read(address) | Operation::Write(address, _) => address,
        }
    }
}

/// Decimal, or hexadecimal with a `0x` prefix
fn parse_number(text: &str) -> Option<i64> {
    let (negative, digits) = match text.strip_prefix('-') {
        Some(digits) => (true, digits),
        None => (false, text),
    };
    let value = match digits.strip_prefix("0x") {
        Some(hex) => i64::from_str_radix(hex, 16).ok()?,
        None => digits.parse::<i64>().ok()?,
    };
    Some(if negative { -value } else { value })
}

/// Parses trace text: one `r <address>` or `w <address> <value>` per line,
/// `#` starts a comment
pub fn parse_trace(content: &str) -> Result<Vec<Operation>, LoadError> {
    let mut operations = Vec::new();

    for (line_num, line) in content.lines().enumerate() {
        let line_num = line_num + 1;
        let line = line.split('#').next().unwrap_or("").trim();
        // Skip empty lines
        if line.is_empty() {
            continue;
        }

        let syntax = |message: String| LoadError::Syntax { line: line_num, message };
        let number = |text: &str| {
            parse_number(text).ok_or_else(|| syntax(format!("Invalid number '{}'", text)))
        };

        let parts: Vec<&str> = line.split_whitespace().collect();
        let op = match parts.as_slice() {
            ["r" | "R", address] => Operation::Read(number(*address)?),
            ["w" | "W", address, value] => {
                Operation::Write(number(*address)?, number(*value)?)
            }
            [op, ..] if !matches!(*op, "r" | "R" | "w" | "W") => {
                return Err(syntax(format!(
                    "Invalid operation '{}': expected 'r' or 'w'",
                    op
                )));
            }
            _ => {
                return Err(syntax(
                    "Expected 'r <address>' or 'w <address> <value>'".to_string(),
                ))
            }
        };
        operations.push(op);
    }

    Ok(operations)
}

/// Fetch operations from the trace file
pub fn fetch_operations(trace_path: impl AsRef<Path>) -> SimulatorResult<Vec<Operation>> {
    let trace_path = trace_path.as_ref();
    let content = std::fs::read_to_string(trace_path)
        .map_err(|e| LoadError::FileReadError(trace_path.to_path_buf(), e))?;
    let operations = parse_trace(&content)?;
    debug!("[LOAD] {}: {} operations", trace_path.display(), operations.len());
    Ok(operations)
}

/// Largest memory a trace can ask for, in words
pub const MAX_TRACE_MEMORY_SIZE: usize = 1 << 20;

/// Smallest memory holding every address of the trace,
/// never below the default size.
/// Addresses past `MAX_TRACE_MEMORY_SIZE` don't count; they fail as out of bounds
pub fn trace_memory_size(operations: &[Operation]) -> usize {
    operations
        .iter()
        .filter_map(|op| usize::try_from(op.address()).ok())
        .filter(|&address| {
            let fits = address < MAX_TRACE_MEMORY_SIZE;
            if !fits {
                warn!("[TRACE] address {} is beyond the largest trace memory", address);
            }
            fits
        })
        .map(|address| address + 1)
        .max()
        .unwrap_or(0)
        .max(DEFAULT_MEMORY_SIZE)
}

/// Feed every operation to the cache, stopping at the first failure
pub fn replay<M: BackingStore>(
    cache: &mut Cache<M>,
    operations: &[Operation],
) -> MemoryResult<()> {
    for op in operations {
        match *op {
            Operation::Read(address) => {
                cache.read(address)?;
            }
            Operation::Write(address, value) => cache.write(address, value)?,
        }
    }
    Ok(())
}

/// Replay a trace on a fresh cache over `memory_size` words, then flush
pub fn simulate_trace(
    operations: &[Operation],
    cache_policy: CachePolicy,
    memory_size: usize,
) -> SimulatorResult<Cache<Memory>> {
    let mut cache = Cache::make(cache_policy, Memory::make(memory_size))?;
    replay(&mut cache, operations)?;
    let flushed = cache.flush()?;
    info!(
        "[TRACE] {} operations, {} blocks flushed at exit",
        operations.len(),
        flushed
    );
    Ok(cache)
}

/// Run simulation on the given trace file.
/// Memory is sized to fit the trace unless `memory_size` is given
pub fn run_trace(
    trace_path: impl AsRef<Path>,
    policy: CPUPolicy,
    cache_policy: CachePolicy,
    memory_size: Option<usize>,
) -> SimulatorResult<CacheHistory> {
    let operations = fetch_operations(trace_path)?;
    let memory_size = memory_size.unwrap_or_else(|| trace_memory_size(&operations));
    let cache = simulate_trace(&operations, cache_policy, memory_size)?;

    if policy.dump {
        eprintln!("[DUMP] Cache:\n{}", cache);
        eprintln!("[DUMP] Memory: {}", cache.memory());
    }
    if policy.history {
        eprintln!("[HISTORY] # operations = {}", operations.len());
        report_cache(&cache.history);
    }

    Ok(cache.history)
}
