use std::path::PathBuf;

use thiserror::Error;

use crate::memory::Address;

/// Top-level error type for the simulator
#[derive(Error, Debug)]
pub enum SimulatorError {
    #[error("Failed to load program: {0}")]
    LoadError(#[from] LoadError),

    #[error("Execution error: {0}")]
    ExecutionError(#[from] ExecutionError),

    #[error("Memory error: {0}")]
    MemoryError(#[from] MemoryError),

    #[error("Invalid cache configuration: {0}")]
    ConfigError(#[from] ConfigError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
}

/// Errors related to reading assembly programs and traces
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Failed to read '{0}': {1}")]
    FileReadError(PathBuf, #[source] std::io::Error),

    #[error("Syntax error at line {line}: {message}")]
    Syntax { line: usize, message: String },

    #[error("Instruction outside of any label at line {0}")]
    NoLabel(usize),

    #[error("Duplicate label '{0}'")]
    DuplicateLabel(String),

    #[error("Label '{0}' not found")]
    MissingLabel(String),
}

/// Errors related to instruction execution
#[derive(Error, Debug, PartialEq)]
pub enum ExecutionError {
    #[error("Stack pointer would become negative: {0}")]
    StackUnderflow(i64),

    #[error("Jump to unknown label '{0}'")]
    UnknownLabel(String),

    #[error("Execution limit reached: {0} instructions")]
    StepLimitExceeded(u64),
}

/// Errors raised by a backing store
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryError {
    #[error("Memory address {address} out of bounds (size {size})")]
    OutOfBounds { address: Address, size: usize },
}

/// Cache geometry errors, raised once at construction
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be positive")]
    NonPositive(&'static str),

    #[error(
        "cache size {cache_size} is not divisible by block size {block_size} * associativity {n_way}"
    )]
    NotDivisible { cache_size: usize, block_size: usize, n_way: usize },

    #[error("cache size {0} exceeds the address range")]
    TooLarge(usize),
}

/// Type alias for Result with SimulatorError
pub type SimulatorResult<T> = Result<T, SimulatorError>;

/// Type alias for Result with MemoryError
pub type MemoryResult<T> = Result<T, MemoryError>;
