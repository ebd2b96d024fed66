//! Instruction executor.
//! Sequential, with SPARC's single delay slot after control transfers

use log::{debug, warn};

use crate::cpu::CPUState;
use crate::cpu::Register;
use crate::error::ExecutionError;
use crate::error::SimulatorResult;
use crate::instruction::{Instruction, MemOperand, Operand};
use crate::loader::Program;
use crate::memory::{Address, StorageInterface, Word};

/// npc value that stops the run once the delay slot has executed
const HALT: usize = usize::MAX;

/// Where execution goes after an instruction
#[derive(Clone, Copy, Debug, PartialEq)]
enum Flow {
    Next,
    /// Jump after the delay slot
    Jump(usize),
    /// Stop after the delay slot
    Halt,
}

/// Runs the program from the `entry` label until it finishes.
/// Returns the number of executed instructions
pub fn run(
    cpu: &mut CPUState,
    program: &Program,
    mem: &mut impl StorageInterface,
    entry: &str,
) -> SimulatorResult<u64> {
    let start = program.entry(entry)?;
    cpu.pc = start;
    cpu.npc = start + 1;

    while step(cpu, program, mem)? {}

    Ok(cpu.history.inst_count)
}

/// Executes one instruction.
/// Returns false once the pc has left the program
pub fn step(
    cpu: &mut CPUState,
    program: &Program,
    mem: &mut impl StorageInterface,
) -> SimulatorResult<bool> {
    let pc = cpu.pc;
    let inst = match program.fetch(pc) {
        Some(inst) => inst,
        None => return Ok(false),
    };

    if cpu.history.inst_count >= cpu.policy.max_steps {
        return Err(ExecutionError::StepLimitExceeded(cpu.policy.max_steps).into());
    }

    debug!("[EXEC] {:>4}: {}", pc, inst);
    if inst.is_control_transfer() {
        if let Some(slot) = program.fetch(cpu.npc).filter(|i| i.is_control_transfer()) {
            warn!("[EXEC] {} in the delay slot of {} at {}", slot, inst, pc);
        }
    }

    // Advance first, so that a control transfer only redirects
    // the instruction after its delay slot
    cpu.pc = cpu.npc;
    cpu.npc = cpu.npc.saturating_add(1);

    let flow = execute(cpu, program, inst, pc, mem)?;
    cpu.history.inst_count += 1;

    match flow {
        Flow::Next => {}
        Flow::Jump(target) => cpu.npc = target,
        Flow::Halt => cpu.npc = HALT,
    }

    Ok(cpu.pc < program.len())
}

fn operand(cpu: &CPUState, op: Operand) -> Word {
    match op {
        Operand::Reg(reg) => cpu.regs.get(reg),
        Operand::Imm(value) => value,
    }
}

/// Wraps on overflow; the storage rejects the result
fn effective_address(cpu: &CPUState, address: MemOperand) -> Address {
    cpu.regs.get(address.base).wrapping_add(address.offset)
}

fn jump_target(program: &Program, label: &str) -> SimulatorResult<usize> {
    program
        .label(label)
        .ok_or_else(|| ExecutionError::UnknownLabel(label.to_string()).into())
}

fn execute(
    cpu: &mut CPUState,
    program: &Program,
    inst: &Instruction,
    pc: usize,
    mem: &mut impl StorageInterface,
) -> SimulatorResult<Flow> {
    match inst {
        Instruction::Mov { src, rd } => {
            let value = operand(cpu, *src);
            cpu.regs.set(*rd, value);
        }
        Instruction::Add { rs1, src2, rd } => {
            let value = cpu.regs.get(*rs1).wrapping_add(operand(cpu, *src2));
            cpu.regs.set(*rd, value);
        }
        Instruction::Ld { address, rd } => {
            let address = effective_address(cpu, *address);
            let value = mem.read(address)?;
            cpu.history.load_count += 1;
            cpu.regs.set(*rd, value);
        }
        Instruction::St { rs, address } => {
            let address = effective_address(cpu, *address);
            mem.write(address, cpu.regs.get(*rs))?;
            cpu.history.store_count += 1;
        }
        Instruction::Save { rs1, src2, rd } => {
            let sp = cpu.regs.get(Register::Sp);
            let new_sp = cpu.regs.get(*rs1).wrapping_add(operand(cpu, *src2));
            if new_sp < 0 {
                return Err(ExecutionError::StackUnderflow(new_sp).into());
            }
            // The new frame remembers the caller's frame pointer
            mem.write(new_sp, cpu.regs.get(Register::Fp))?;
            cpu.regs.set(Register::Fp, sp);
            cpu.regs.set(*rd, new_sp);
        }
        Instruction::Restore { add } => {
            let result = add.map(|(rs1, src2, rd)| {
                (rd, cpu.regs.get(rs1).wrapping_add(operand(cpu, src2)))
            });
            let sp = cpu.regs.get(Register::Sp);
            let saved_fp = mem.read(sp)?;
            cpu.regs.set(Register::Sp, cpu.regs.get(Register::Fp));
            cpu.regs.set(Register::Fp, saved_fp);
            if let Some((rd, value)) = result {
                cpu.regs.set(rd, value);
            }
        }
        Instruction::Call { label } => {
            let target = jump_target(program, label)?;
            // Return past the delay slot
            cpu.call_stack.push(pc + 2);
            cpu.regs.set(Register::Out(7), pc as Word);
            cpu.history.call_count += 1;
            return Ok(Flow::Jump(target));
        }
        Instruction::Jmp { label } => {
            return Ok(Flow::Jump(jump_target(program, label)?));
        }
        Instruction::Ret => {
            return Ok(match cpu.call_stack.pop() {
                Some(target) => Flow::Jump(target),
                None => {
                    debug!("[EXEC] return from the entry point, ending program");
                    Flow::Halt
                }
            });
        }
        Instruction::Nop => {}
    }

    Ok(Flow::Next)
}
