pub mod cpu;
pub mod executor;
pub mod flags;
pub mod instruction;
pub mod loader;
pub mod memory;
pub mod run_wrapper;

pub mod error;
