//! The instruction model (component B): opcode/operand/modifier triples,
//! byte/bit addressing, and labels.

use crate::data::DataType;
use crate::error::PlcError;

/// The opcode of a single micro-instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    /// No operation.
    Nop,
    /// Pop the push-stack and apply it to the accumulator.
    Pop,
    /// Unconditional or conditional jump.
    Jmp,
    /// Subroutine call. Reserved, unimplemented (spec.md Non-goals).
    Cal,
    /// Subroutine return. Reserved, unimplemented (spec.md Non-goals).
    Ret,
    /// Drive a coil's set-pending flag.
    Set,
    /// Drive a coil's reset-pending flag.
    Reset,
    /// Load an operand into the accumulator.
    Ld,
    /// Store the accumulator to an operand.
    St,
    And,
    Or,
    Xor,
    Add,
    Sub,
    Mul,
    Div,
    Gt,
    Ge,
    Eq,
    Ne,
    Lt,
    Le,
}

impl Opcode {
    /// The six bitwise/arithmetic/comparison groups share the push-stack
    /// discipline in spec.md §4.4; this is true for all of them.
    pub fn is_stackable(self) -> bool {
        self.is_bitwise() || self.is_arithmetic() || self.is_comparison()
    }

    pub fn is_bitwise(self) -> bool {
        matches!(self, Opcode::And | Opcode::Or | Opcode::Xor)
    }

    pub fn is_arithmetic(self) -> bool {
        matches!(self, Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::Div)
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            Opcode::Gt | Opcode::Ge | Opcode::Eq | Opcode::Ne | Opcode::Lt | Opcode::Le
        )
    }
}

/// The modifier attached to an opcode: negate, push, conditional, or
/// normal (no modifier character present).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modifier {
    /// ` ` — no modifier.
    Norm,
    /// `!` — negate.
    Negate,
    /// `(` — push onto the rung's suspended-operation stack.
    Push,
    /// `?` — execute only if the accumulator is truthy.
    Cond,
}

/// One of the eleven read-side operand kinds or six write-side (coil)
/// aliases named in spec.md §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandKind {
    /// `i` digital input.
    Input,
    /// `if` analog input.
    RealInput,
    /// `f` falling-edge flag of a digital input.
    Falling,
    /// `r` rising-edge flag of a digital input.
    Rising,
    /// `m` memory counter (read side).
    Memory,
    /// `mf` real memory register (read side).
    RealMemory,
    /// `c` external command register (read side).
    Command,
    /// `b` blinker output.
    Blinker,
    /// `t` timer output.
    Timer,
    /// `q` digital output (read side).
    Output,
    /// `qf` analog output (read side).
    RealOutput,
    /// `Q` digital output coil (write side of `q`).
    Contact,
    /// `QF` analog output coil (write side of `qf`).
    RealContact,
    /// `T` timer start/reset coil (write side of `t`).
    TimerStart,
    /// `M` memory counter set/reset coil (write side of `m`).
    MemoryPulse,
    /// `MF` real memory store (write side of `mf`).
    RealMemoryStore,
    /// `W` process command register (write side; no read alias).
    Write,
}

impl OperandKind {
    /// True for the six write-side (coil-class) operand kinds: valid
    /// targets of `ST`, `SET`, and `RESET`.
    pub fn is_coil(self) -> bool {
        matches!(
            self,
            OperandKind::Contact
                | OperandKind::RealContact
                | OperandKind::TimerStart
                | OperandKind::MemoryPulse
                | OperandKind::RealMemoryStore
                | OperandKind::Write
        )
    }

    /// True for the real-valued operand kinds.
    pub fn is_real(self) -> bool {
        matches!(
            self,
            OperandKind::RealInput
                | OperandKind::RealOutput
                | OperandKind::RealMemory
                | OperandKind::RealContact
                | OperandKind::RealMemoryStore
        )
    }

    /// Rewrite a read-side operand to its write-side (coil) alias, as the
    /// IL parser does for store targets (spec.md §4.2: "aliases are
    /// rewritten, e.g. `q -> Q`, `m -> M`, `t -> T`").
    pub fn to_coil(self) -> Option<OperandKind> {
        match self {
            OperandKind::Output => Some(OperandKind::Contact),
            OperandKind::RealOutput => Some(OperandKind::RealContact),
            OperandKind::Timer => Some(OperandKind::TimerStart),
            OperandKind::Memory => Some(OperandKind::MemoryPulse),
            OperandKind::RealMemory => Some(OperandKind::RealMemoryStore),
            OperandKind::Command => Some(OperandKind::Write),
            already_coil if already_coil.is_coil() => Some(already_coil),
            _ => None,
        }
    }
}

/// A concrete `(kind, byte, bit)` operand address.
///
/// `bit` carries a dual role per spec.md §3: `bit < 8` addresses a single
/// bit, while `bit in {8,16,32,64}` declares the width of a multi-byte
/// access starting at `byte`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Operand {
    pub kind: OperandKind,
    pub byte: u16,
    pub bit: u8,
}

impl Operand {
    pub fn new(kind: OperandKind, byte: u16, bit: u8) -> Self {
        Self { kind, byte, bit }
    }

    /// True if `bit` declares a multi-byte access rather than a single bit.
    pub fn is_multi_byte(&self) -> bool {
        self.bit >= 8
    }

    /// The data type this operand is read/written at: real operand kinds
    /// are always [`DataType::Real`]; otherwise the type is derived from
    /// `bit`'s dual role.
    pub fn data_type(&self) -> Result<DataType, PlcError> {
        if self.kind.is_real() {
            return Ok(DataType::Real);
        }
        // Memory counters and the command/response word are whole 64-bit
        // registers by default; `bit` only narrows them when explicit.
        if self.bit == 0
            && matches!(
                self.kind,
                OperandKind::Memory | OperandKind::MemoryPulse | OperandKind::Command | OperandKind::Write
            )
        {
            return Ok(DataType::Lword);
        }
        match self.bit {
            0..=7 => Ok(DataType::Bool),
            8 => Ok(DataType::Byte),
            16 => Ok(DataType::Word),
            32 => Ok(DataType::Dword),
            64 => Ok(DataType::Lword),
            _ => Err(PlcError::BadOperand),
        }
    }
}

/// What an instruction acts on: a concrete operand address, a jump
/// target (by label until interning, by instruction index after), or
/// nothing (`NOP`, `POP`, `CAL`, `RET`).
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    None,
    Addr(Operand),
    Jump {
        label: String,
        resolved: Option<usize>,
    },
}

/// One micro-instruction: `(label?, opcode, modifier, operand/jump)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub label: Option<String>,
    pub opcode: Opcode,
    pub modifier: Modifier,
    pub target: Target,
    /// 1-based source line, kept for diagnostics (spec.md §3 "Rung").
    pub source_line: usize,
}

impl Instruction {
    pub fn new(opcode: Opcode, modifier: Modifier, target: Target, source_line: usize) -> Self {
        Self {
            label: None,
            opcode,
            modifier,
            target,
            source_line,
        }
    }

    pub fn operand(&self) -> Option<&Operand> {
        match &self.target {
            Target::Addr(op) => Some(op),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coil_alias_rewrite() {
        assert_eq!(OperandKind::Output.to_coil(), Some(OperandKind::Contact));
        assert_eq!(OperandKind::Memory.to_coil(), Some(OperandKind::MemoryPulse));
        assert_eq!(OperandKind::Input.to_coil(), None);
    }

    #[test]
    fn operand_data_type_from_bit() {
        let op = Operand::new(OperandKind::Memory, 0, 32);
        assert_eq!(op.data_type().unwrap(), DataType::Dword);
        let op = Operand::new(OperandKind::Input, 0, 3);
        assert_eq!(op.data_type().unwrap(), DataType::Bool);
        let op = Operand::new(OperandKind::RealMemory, 0, 0);
        assert_eq!(op.data_type().unwrap(), DataType::Real);
    }
}
