//! Utility functions for loading assembly programs

use std::collections::HashMap;
use std::path::Path;

use log::debug;

use crate::error::LoadError;
use crate::error::SimulatorResult;
use crate::instruction::decode_helper;
use crate::instruction::Instruction;

/// A loaded program: every label's instructions laid out in file order
#[derive(Debug, Default)]
pub struct Program {
    pub instructions: Vec<Instruction>,
    /// Source line of each instruction
    pub lines: Vec<usize>,
    labels: HashMap<String, usize>,
}

impl Program {
    /// Parses assembly text.
    /// `!` starts a comment, lines starting with `.` are directives
    pub fn parse(source: &str) -> Result<Self, LoadError> {
        let mut program = Program::default();
        let mut has_label = false;

        for (line_num, raw_line) in source.lines().enumerate() {
            let line_num = line_num + 1;
            let mut line = raw_line.split('!').next().unwrap_or("").trim();
            if line.is_empty() || (line.starts_with('.') && !line.contains(':')) {
                continue;
            }

            // Label, possibly followed by an instruction
            if let Some((label, rest)) = line.split_once(':') {
                let label = label.trim();
                if label.is_empty() || label.contains(char::is_whitespace) {
                    return Err(LoadError::Syntax {
                        line: line_num,
                        message: format!("Invalid label '{}'", label),
                    });
                }
                if program.labels.contains_key(label) {
                    return Err(LoadError::DuplicateLabel(label.to_string()));
                }
                debug!("[LOAD] label '{}' at {}", label, program.instructions.len());
                program.labels.insert(label.to_string(), program.instructions.len());
                has_label = true;
                line = rest.trim();
                if line.is_empty() {
                    continue;
                }
            }

            if !has_label {
                return Err(LoadError::NoLabel(line_num));
            }

            let inst = decode_helper::parse(line)
                .map_err(|message| LoadError::Syntax { line: line_num, message })?;
            program.instructions.push(inst);
            program.lines.push(line_num);
        }

        Ok(program)
    }

    /// Start index of a label
    pub fn label(&self, name: &str) -> Option<usize> {
        self.labels.get(name).copied()
    }

    /// Start index of the entry label
    pub fn entry(&self, name: &str) -> Result<usize, LoadError> {
        self.label(name).ok_or_else(|| LoadError::MissingLabel(name.to_string()))
    }

    pub fn fetch(&self, pc: usize) -> Option<&Instruction> {
        self.instructions.get(pc)
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }
}

/// Loads an assembly file
pub fn load_program(path: impl AsRef<Path>) -> SimulatorResult<Program> {
    let path = path.as_ref();
    let source = std::fs::read_to_string(path)
        .map_err(|e| LoadError::FileReadError(path.to_path_buf(), e))?;
    let program = Program::parse(&source)?;
    debug!(
        "[LOAD] {}: {} instructions, {} labels",
        path.display(),
        program.len(),
        program.labels.len()
    );
    Ok(program)
}
