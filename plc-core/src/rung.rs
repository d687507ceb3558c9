//! Compiled rungs (component C): the instruction array a program compiles
//! to, label resolution, and the bounded push-stack used during execution.
//!
//! Grounded in the original's `rung.c`: `append()`/`get()` build the
//! instruction array while rejecting duplicate labels, and `push()`/`pop()`
//! are the VM's suspended-operation stack, capped at 255 entries (the
//! original's stack index is a single unsigned byte).

use std::collections::HashMap;

use crate::data::{DataType, Value};
use crate::error::{CompileError, PlcError, PlcResult};
use crate::instruction::{Instruction, Opcode, Target};

/// The push-stack is indexed by a single byte in the original VM, so it
/// can never hold more than this many suspended operations.
pub const MAX_PUSH_DEPTH: usize = 255;

/// A value suspended on the push-stack by a `(` modifier, to be resumed
/// by a later `POP`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PushFrame {
    pub op: Opcode,
    pub value: Value,
    pub ty: DataType,
}

/// One compiled program: a flat instruction array with labels resolved
/// to indices, plus the source line text each instruction came from.
#[derive(Debug, Clone, Default)]
pub struct Rung {
    pub instructions: Vec<Instruction>,
    pub source_lines: Vec<String>,
    labels: HashMap<String, usize>,
}

impl Rung {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an instruction, recording its source line and, if labeled,
    /// its position for later jump resolution. Rejects a label already in
    /// use, matching the original's duplicate-label check in `append()`.
    pub fn append(&mut self, instr: Instruction, source_line: impl Into<String>) -> PlcResult<()> {
        if let Some(label) = instr.label.clone() {
            if self.labels.contains_key(&label) {
                return Err(PlcError::BadProg);
            }
            self.labels.insert(label, self.instructions.len());
        }
        self.source_lines.push(source_line.into());
        self.instructions.push(instr);
        Ok(())
    }

    /// Resolve every `Target::Jump` against the labels collected so far.
    /// Must run once, after every instruction has been appended. On
    /// failure, returns the index of the first unresolved jump.
    pub fn resolve_jumps(&mut self) -> Result<(), usize> {
        for (idx, instr) in self.instructions.iter_mut().enumerate() {
            if let Target::Jump { label, resolved } = &mut instr.target {
                match self.labels.get(label) {
                    Some(target) => *resolved = Some(*target),
                    None => return Err(idx),
                }
            }
        }
        Ok(())
    }

    /// Look up a label's resolved instruction index, for tests and
    /// diagnostics.
    pub fn label_index(&self, label: &str) -> Option<usize> {
        self.labels.get(label).copied()
    }

    pub fn error_at(&self, index: usize, kind: PlcError) -> CompileError {
        let line = self.instructions.get(index).map_or(0, |i| i.source_line);
        let text = self.source_lines.get(index).cloned().unwrap_or_default();
        CompileError::new(line, text, kind)
    }
}

/// The accumulator and push-stack a rung executes with. Reset once per
/// scan before the rung runs top to bottom.
#[derive(Debug)]
pub struct ExecState {
    pub acc: Value,
    pub acc_ty: DataType,
    stack: Vec<PushFrame>,
}

impl Default for ExecState {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecState {
    pub fn new() -> Self {
        Self {
            acc: Value::Int(0),
            acc_ty: DataType::Bool,
            stack: Vec::new(),
        }
    }

    /// Suspend the current accumulator value under `op`, for a `(`
    /// modifier. `op` is reapplied against whatever the accumulator
    /// becomes by the time the matching `POP` runs.
    pub fn push(&mut self, op: Opcode) -> PlcResult<()> {
        if self.stack.len() >= MAX_PUSH_DEPTH {
            return Err(PlcError::Overflow);
        }
        self.stack.push(PushFrame {
            op,
            value: self.acc,
            ty: self.acc_ty,
        });
        Ok(())
    }

    /// Resume the most recently suspended frame, for the VM to combine
    /// with the current accumulator.
    pub fn pop(&mut self) -> PlcResult<PushFrame> {
        self.stack.pop().ok_or(PlcError::BadOperator)
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::{Modifier, Opcode};

    #[test]
    fn duplicate_label_rejected() {
        let mut rung = Rung::new();
        let mut a = Instruction::new(Opcode::Nop, Modifier::Norm, Target::None, 1);
        a.label = Some("L1".into());
        rung.append(a.clone(), "L1: NOP").unwrap();
        let err = rung.append(a, "L1: NOP").unwrap_err();
        assert_eq!(err, PlcError::BadProg);
    }

    #[test]
    fn jump_resolves_to_label_index() {
        let mut rung = Rung::new();
        let mut target = Instruction::new(Opcode::Nop, Modifier::Norm, Target::None, 1);
        target.label = Some("L1".into());
        rung.append(target, "L1: NOP").unwrap();
        rung.append(
            Instruction::new(
                Opcode::Jmp,
                Modifier::Norm,
                Target::Jump {
                    label: "L1".into(),
                    resolved: None,
                },
                2,
            ),
            "JMP L1",
        )
        .unwrap();
        rung.resolve_jumps().unwrap();
        match &rung.instructions[1].target {
            Target::Jump { resolved, .. } => assert_eq!(*resolved, Some(0)),
            _ => panic!("expected jump"),
        }
    }

    #[test]
    fn push_stack_bounded() {
        let mut st = ExecState::new();
        for _ in 0..MAX_PUSH_DEPTH {
            st.push(Opcode::Or).unwrap();
        }
        assert!(matches!(st.push(Opcode::Or), Err(PlcError::Overflow)));
        assert_eq!(st.depth(), MAX_PUSH_DEPTH);
    }

    #[test]
    fn pop_empty_errors() {
        let mut st = ExecState::new();
        assert!(matches!(st.pop(), Err(PlcError::BadOperator)));
    }
}
