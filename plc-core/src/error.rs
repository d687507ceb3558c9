//! Error taxonomy for the PLC core.
//!
//! Every fallible operation in this crate returns one of these variants
//! instead of panicking; compilation errors additionally carry the
//! offending source line for diagnostics.

use thiserror::Error;

/// A single error kind from the PLC's error-code surface.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PlcError {
    /// Arithmetic width overflow was detected by a caller.
    #[error("arithmetic overflow")]
    Overflow,
    /// A rung exceeded its per-cycle time budget.
    #[error("rung exceeded cycle budget")]
    Timeout,
    /// A driver `enable`/`disable`/IO call failed.
    #[error("hardware error: {0}")]
    Hardware(String),
    /// An opcode was paired with a modifier it doesn't accept.
    #[error("illegal opcode/modifier combination")]
    BadOperator,
    /// A store/SET/RESET target was not a coil-class operand.
    #[error("store or set/reset target is not a coil")]
    BadCoil,
    /// A byte/bit index was out of the configured range.
    #[error("operand index out of range")]
    BadIndex,
    /// An operand kind, type, or width was invalid.
    #[error("invalid operand")]
    BadOperand,
    /// The program source could not be read.
    #[error("unreadable program file: {0}")]
    BadFile(String),
    /// The lexer encountered an unexpected character.
    #[error("unexpected character in source")]
    BadChar,
    /// A JMP label could not be resolved after interning.
    #[error("unresolved jump label")]
    BadProg,
}

/// A compilation error annotated with the originating source line.
#[derive(Debug, Error, Clone, PartialEq)]
#[error("line {line}: {kind} ({text:?})")]
pub struct CompileError {
    /// 1-based source line number.
    pub line: usize,
    /// Raw source text of the offending line.
    pub text: String,
    /// The underlying error kind.
    pub kind: PlcError,
}

impl CompileError {
    /// Build a compile error from a line number, raw text, and kind.
    pub fn new(line: usize, text: impl Into<String>, kind: PlcError) -> Self {
        Self {
            line,
            text: text.into(),
            kind,
        }
    }
}

/// Convenience alias for runtime (non-compile) results.
pub type PlcResult<T> = Result<T, PlcError>;
/// Convenience alias for compile-time results.
pub type CompileResult<T> = Result<T, CompileError>;
