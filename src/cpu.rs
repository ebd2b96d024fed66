//! SPARC-subset CPU state

use std::fmt;
use std::str::FromStr;

use crate::memory::main_memory::DEFAULT_MEMORY_SIZE;
use crate::memory::Word;

/// %g0-7, %o0-7, %l0-7, %i0-7, %sp, %fp
pub const NUM_REGISTERS: usize = 34;

/// Default cap on executed instructions
pub const DEFAULT_MAX_STEPS: u64 = 1_000_000;

/// CPU state
#[derive(Clone)]
pub struct CPUState {
    /// Index of the instruction being executed
    pub pc: usize,
    /// Index of the next instruction; differs from pc + 1 in a delay slot
    pub npc: usize,
    /// Register file
    pub regs: RegisterFile,
    /// Return indices of active calls
    pub call_stack: Vec<usize>,

    /// CPU policy
    pub policy: CPUPolicy,

    /// History of execution
    pub history: CPUHistory,
}

impl CPUState {
    /// Make a CPU whose stack starts at the top of memory
    pub fn make(policy: CPUPolicy) -> Self {
        let top = policy.memory_size as Word - 1;
        let mut regs = RegisterFile::default();
        regs.set(Register::Sp, top);
        regs.set(Register::Fp, top);
        Self {
            pc: 0,
            npc: 1,
            regs,
            call_stack: Vec::new(),
            policy,
            history: CPUHistory::default(),
        }
    }
}

/// Register names
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Register {
    Global(u8),
    Out(u8),
    Local(u8),
    In(u8),
    Sp,
    Fp,
}

impl Register {
    fn index(&self) -> usize {
        match *self {
            Register::Global(n) => n as usize,
            Register::Out(n) => 8 + n as usize,
            Register::Local(n) => 16 + n as usize,
            Register::In(n) => 24 + n as usize,
            Register::Sp => 32,
            Register::Fp => 33,
        }
    }
}

impl FromStr for Register {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s
            .strip_prefix('%')
            .ok_or_else(|| format!("Invalid register: '{}'", s))?;
        match name {
            "sp" | "o6" => return Ok(Register::Sp),
            "fp" | "i6" => return Ok(Register::Fp),
            _ => {}
        }

        let mut chars = name.chars();
        let group = chars.next();
        let number = chars.as_str().parse::<u8>().ok().filter(|n| *n < 8);
        match (group, number) {
            (Some('g'), Some(n)) => Ok(Register::Global(n)),
            (Some('o'), Some(n)) => Ok(Register::Out(n)),
            (Some('l'), Some(n)) => Ok(Register::Local(n)),
            (Some('i'), Some(n)) => Ok(Register::In(n)),
            _ => Err(format!("Invalid register: '{}'", s)),
        }
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Register::Global(n) => write!(f, "%g{}", n),
            Register::Out(n) => write!(f, "%o{}", n),
            Register::Local(n) => write!(f, "%l{}", n),
            Register::In(n) => write!(f, "%i{}", n),
            Register::Sp => write!(f, "%sp"),
            Register::Fp => write!(f, "%fp"),
        }
    }
}

/// Register file simulation
#[derive(Clone)]
pub struct RegisterFile {
    data: [Word; NUM_REGISTERS],
}

impl Default for RegisterFile {
    fn default() -> Self {
        Self { data: [0; NUM_REGISTERS] }
    }
}

impl RegisterFile {
    /// Reads a register
    pub fn get(&self, reg: Register) -> Word {
        self.data[reg.index()]
    }

    /// Writes a register. %g0 stays zero
    pub fn set(&mut self, reg: Register, value: Word) {
        if reg != Register::Global(0) {
            self.data[reg.index()] = value;
        }
    }
}

impl fmt::Display for RegisterFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let groups: [(&str, fn(u8) -> Register); 4] = [
            ("<global>", Register::Global),
            ("<output>", Register::Out),
            ("<local>", Register::Local),
            ("<input>", Register::In),
        ];
        for (name, make) in groups {
            write!(f, "{}:", name)?;
            for n in 0..8 {
                let reg = make(n);
                write!(f, " [{}]: {}", reg, self.get(reg))?;
            }
            writeln!(f)?;
        }
        write!(
            f,
            "<special>: [%sp]: {}, [%fp]: {}",
            self.get(Register::Sp),
            self.get(Register::Fp)
        )
    }
}

/// CPU policy
#[derive(Clone, Copy, Debug)]
pub struct CPUPolicy {
    pub verbose: bool,
    pub history: bool,
    pub dump: bool,
    /// Memory size in words
    pub memory_size: usize,
    pub max_steps: u64,
}

impl Default for CPUPolicy {
    fn default() -> Self {
        Self {
            verbose: false,
            history: false,
            dump: false,
            memory_size: DEFAULT_MEMORY_SIZE,
            max_steps: DEFAULT_MAX_STEPS,
        }
    }
}

/// History module
#[derive(Clone, Copy, Default, Debug, PartialEq)]
pub struct CPUHistory {
    pub inst_count: u64,
    pub load_count: u64,
    pub store_count: u64,
    pub call_count: u64,
}
