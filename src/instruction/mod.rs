//! Instruction representation

use std::fmt;

use crate::cpu::Register;
use crate::memory::Word;

pub mod decode_helper;

/// A decoded SPARC-subset instruction
#[derive(Clone, Debug, PartialEq)]
pub enum Instruction {
    /// rd = src
    Mov { src: Operand, rd: Register },
    /// rd = rs1 + src2
    Add { rs1: Register, src2: Operand, rd: Register },
    /// rd = mem[address]
    Ld { address: MemOperand, rd: Register },
    /// mem[address] = rs
    St { rs: Register, address: MemOperand },
    /// Open a stack frame of rs1 + src2, result in rd
    Save { rs1: Register, src2: Operand, rd: Register },
    /// Close the current frame, optionally computing rd = rs1 + src2
    Restore { add: Option<(Register, Operand, Register)> },
    Call { label: String },
    Jmp { label: String },
    Ret,
    Nop,
}

impl Instruction {
    /// Whether the instruction has a delay slot
    pub fn is_control_transfer(&self) -> bool {
        matches!(
            self,
            Instruction::Call { .. } | Instruction::Jmp { .. } | Instruction::Ret
        )
    }
}

/// Register or signed immediate
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Operand {
    Reg(Register),
    Imm(Word),
}

/// `[base + offset]`
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MemOperand {
    pub base: Register,
    pub offset: Word,
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Reg(reg) => write!(f, "{}", reg),
            Operand::Imm(value) => write!(f, "{}", value),
        }
    }
}

impl fmt::Display for MemOperand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.offset {
            0 => write!(f, "[{}]", self.base),
            offset if offset < 0 => write!(f, "[{}{}]", self.base, offset),
            offset => write!(f, "[{}+{}]", self.base, offset),
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Instruction::*;
        match self {
            Mov { src, rd } => write!(f, "mov {}, {}", src, rd),
            Add { rs1, src2, rd } => write!(f, "add {}, {}, {}", rs1, src2, rd),
            Ld { address, rd } => write!(f, "ld {}, {}", address, rd),
            St { rs, address } => write!(f, "st {}, {}", rs, address),
            Save { rs1, src2, rd } => write!(f, "save {}, {}, {}", rs1, src2, rd),
            Restore { add: None } => write!(f, "restore"),
            Restore { add: Some((rs1, src2, rd)) } => {
                write!(f, "restore {}, {}, {}", rs1, src2, rd)
            }
            Call { label } => write!(f, "call {}", label),
            Jmp { label } => write!(f, "jmp {}", label),
            Ret => write!(f, "ret"),
            Nop => write!(f, "nop"),
        }
    }
}
