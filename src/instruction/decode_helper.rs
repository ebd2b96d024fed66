//! Decoding helper functions: assembly text to `Instruction`

use super::Instruction;
use super::MemOperand;
use super::Operand;
use crate::cpu::Register;
use crate::memory::Word;

/// Parses a single instruction, without comments or labels
pub fn parse(text: &str) -> Result<Instruction, String> {
    let text = text.trim();
    let (mnemonic, rest) = match text.split_once(char::is_whitespace) {
        Some((mnemonic, rest)) => (mnemonic, rest.trim()),
        None => (text, ""),
    };
    let operands = split_operands(rest);

    use Instruction::*;
    let inst = match mnemonic {
        "mov" => {
            let [src, rd] = expect_operands::<2>(mnemonic, &operands)?;
            Mov { src: parse_operand(src)?, rd: parse_register(rd)? }
        }
        "add" => {
            let [rs1, src2, rd] = expect_operands::<3>(mnemonic, &operands)?;
            Add {
                rs1: parse_register(rs1)?,
                src2: parse_operand(src2)?,
                rd: parse_register(rd)?,
            }
        }
        "ld" => {
            let [address, rd] = expect_operands::<2>(mnemonic, &operands)?;
            Ld { address: parse_mem_operand(address)?, rd: parse_register(rd)? }
        }
        "st" => {
            let [rs, address] = expect_operands::<2>(mnemonic, &operands)?;
            St { rs: parse_register(rs)?, address: parse_mem_operand(address)? }
        }
        "save" => {
            let [rs1, src2, rd] = expect_operands::<3>(mnemonic, &operands)?;
            Save {
                rs1: parse_register(rs1)?,
                src2: parse_operand(src2)?,
                rd: parse_register(rd)?,
            }
        }
        "restore" if operands.is_empty() => Restore { add: None },
        "restore" => {
            let [rs1, src2, rd] = expect_operands::<3>(mnemonic, &operands)?;
            Restore {
                add: Some((
                    parse_register(rs1)?,
                    parse_operand(src2)?,
                    parse_register(rd)?,
                )),
            }
        }
        // `call label, n` carries an argument count we don't need
        "call" => match operands.as_slice() {
            [label] | [label, _] => Call { label: parse_label(label)? },
            _ => return Err(operand_count_error(mnemonic, 1, operands.len())),
        },
        "jmp" | "ba" | "b" => {
            let [label] = expect_operands::<1>(mnemonic, &operands)?;
            Jmp { label: parse_label(label)? }
        }
        "ret" | "retl" => {
            expect_operands::<0>(mnemonic, &operands)?;
            Ret
        }
        "nop" => {
            expect_operands::<0>(mnemonic, &operands)?;
            Nop
        }
        "" => return Err("Empty instruction".to_string()),
        _ => return Err(format!("Unknown instruction '{}'", mnemonic)),
    };
    Ok(inst)
}

/// Splits on commas; memory operands never contain one
fn split_operands(text: &str) -> Vec<&str> {
    if text.is_empty() {
        return Vec::new();
    }
    text.split(',').map(str::trim).collect()
}

fn operand_count_error(mnemonic: &str, expected: usize, found: usize) -> String {
    format!("'{}' expects {} operand(s), found {}", mnemonic, expected, found)
}

fn expect_operands<'a, const N: usize>(
    mnemonic: &str,
    operands: &[&'a str],
) -> Result<[&'a str; N], String> {
    <[&str; N]>::try_from(operands)
        .map_err(|_| operand_count_error(mnemonic, N, operands.len()))
}

fn parse_register(text: &str) -> Result<Register, String> {
    text.parse()
}

fn parse_immediate(text: &str) -> Result<Word, String> {
    let text = text.trim();
    let (negative, digits) = match text.strip_prefix('-') {
        Some(digits) => (true, digits),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    if digits.starts_with(['+', '-']) {
        return Err(format!("Invalid immediate: '{}'", text));
    }
    let value = match digits.strip_prefix("0x") {
        Some(hex) => Word::from_str_radix(hex, 16),
        None => digits.parse::<Word>(),
    }
    .map_err(|_| format!("Invalid immediate: '{}'", text))?;
    Ok(if negative { -value } else { value })
}

/// A register or a signed immediate
fn parse_operand(text: &str) -> Result<Operand, String> {
    if text.starts_with('%') {
        Ok(Operand::Reg(parse_register(text)?))
    } else {
        Ok(Operand::Imm(parse_immediate(text)?))
    }
}

/// Accepts `[%fp]`, `[%fp+4]`, `[%fp-4]` and `[%fp+-4]`
fn parse_mem_operand(text: &str) -> Result<MemOperand, String> {
    let inner = text
        .strip_prefix('[')
        .and_then(|t| t.strip_suffix(']'))
        .ok_or_else(|| format!("Invalid memory address: '{}'", text))?
        .trim();

    // The base register ends at the first sign
    let split = inner.find(|c: char| c == '+' || c == '-').unwrap_or(inner.len());
    let (base, offset) = inner.split_at(split);
    let base = parse_register(base.trim())
        .map_err(|_| format!("Invalid memory address: '{}'", text))?;

    let offset = match offset.trim() {
        "" => 0,
        offset => {
            let offset = offset.strip_prefix('+').unwrap_or(offset);
            parse_immediate(offset)
                .map_err(|_| format!("Invalid memory address: '{}'", text))?
        }
    };
    Ok(MemOperand { base, offset })
}

fn parse_label(text: &str) -> Result<String, String> {
    let valid = !text.is_empty()
        && text
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '$');
    if valid {
        Ok(text.to_string())
    } else {
        Err(format!("Invalid label: '{}'", text))
    }
}
