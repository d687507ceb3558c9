//! The Instruction List front-end (component E): lexes one text line into
//! one instruction, then resolves jump labels once the whole program has
//! been read.
//!
//! Grammar (spec.md §4.2):
//! `[label:] operator [modifier [ %operand[type] byte[/bit] | jump_label ] ] [; comment]`

use crate::error::{CompileError, CompileResult, PlcError};
use crate::instruction::{Instruction, Modifier, Opcode, Operand, OperandKind, Target};
use crate::rung::Rung;

/// spec.md §6: a program is at most 256 lines.
pub const MAX_PROGRAM_LINES: usize = 256;
/// spec.md §6: a line is at most 1024 characters.
pub const MAX_LINE_LEN: usize = 1024;

/// Parse a full IL source text into a finalized [`Rung`] with every jump
/// label resolved to an instruction index.
pub fn parse_program(source: &str) -> CompileResult<Rung> {
    let mut rung = Rung::new();
    let mut appended = 0usize;

    for (i, raw_line) in source.lines().enumerate() {
        let line_no = i + 1;
        if raw_line.len() > MAX_LINE_LEN {
            return Err(CompileError::new(line_no, raw_line, PlcError::BadChar));
        }
        let code = strip_comment(raw_line);
        if code.trim().is_empty() {
            continue;
        }
        if appended >= MAX_PROGRAM_LINES {
            return Err(CompileError::new(line_no, raw_line, PlcError::BadProg));
        }
        let instr = parse_line(code, line_no).map_err(|kind| CompileError::new(line_no, raw_line, kind))?;
        rung
            .append(instr, raw_line.to_string())
            .map_err(|kind| CompileError::new(line_no, raw_line, kind))?;
        appended += 1;
    }

    if let Err(idx) = rung.resolve_jumps() {
        return Err(rung.error_at(idx, PlcError::BadProg));
    }
    Ok(rung)
}

/// Strip everything from the first `;` onward.
fn strip_comment(line: &str) -> &str {
    match line.find(';') {
        Some(i) => &line[..i],
        None => line,
    }
}

/// Split a `label:` prefix off the front of a (comment-stripped) line.
/// The label is the text before the rightmost `:` that is itself
/// followed only by whitespace before the operator — in practice, the
/// first `:` in an IL line, since operands never contain one.
fn split_label(line: &str) -> (Option<&str>, &str) {
    match line.find(':') {
        Some(i) => (Some(line[..i].trim()), &line[i + 1..]),
        None => (None, line),
    }
}

fn parse_line(code: &str, line_no: usize) -> Result<Instruction, PlcError> {
    let (label, rest) = split_label(code);
    let rest = rest.trim_start();

    let (op_tok, rest) = read_token(rest);
    let (opcode, fused_modifier) = split_opcode_and_modifier(op_tok)?;

    let (modifier, rest) = match fused_modifier {
        Some(c) => (char_to_modifier(c), rest),
        None => {
            let trimmed = rest.trim_start();
            match trimmed.chars().next() {
                Some(c @ ('(' | '!' | '?')) => (char_to_modifier(c), &trimmed[1..]),
                _ => (Modifier::Norm, rest),
            }
        }
    };

    if !allowed_modifiers(opcode).contains(&modifier) {
        return Err(PlcError::BadOperator);
    }

    let rest = rest.trim();
    let target = if opcode == Opcode::Jmp {
        if rest.is_empty() {
            return Err(PlcError::BadProg);
        }
        Target::Jump {
            label: rest.to_string(),
            resolved: None,
        }
    } else if matches!(opcode, Opcode::Nop | Opcode::Cal | Opcode::Ret | Opcode::Pop) {
        Target::None
    } else {
        let operand = parse_operand(rest)?;
        let operand = normalize_store_target(opcode, operand)?;
        Target::Addr(operand)
    };

    let mut instr = Instruction::new(opcode, modifier, target, line_no);
    instr.label = label.map(str::to_string);
    Ok(instr)
}

/// An operator token may carry its modifier fused to the end (`AND(`,
/// `ST!`, `JMP?`) or as a separate token (`OR (`); this handles the
/// fused case, peeling a trailing `(`/`!`/`?` off if what remains is a
/// known opcode name.
fn split_opcode_and_modifier(tok: &str) -> Result<(Opcode, Option<char>), PlcError> {
    if let Some(last) = tok.chars().last() {
        if matches!(last, '(' | '!' | '?') {
            let name = &tok[..tok.len() - 1];
            if let Ok(op) = lookup_opcode(name) {
                return Ok((op, Some(last)));
            }
        }
    }
    Ok((lookup_opcode(tok)?, None))
}

fn char_to_modifier(c: char) -> Modifier {
    match c {
        '(' => Modifier::Push,
        '!' => Modifier::Negate,
        '?' => Modifier::Cond,
        _ => Modifier::Norm,
    }
}

fn read_token(rest: &str) -> (&str, &str) {
    let rest = rest.trim_start();
    match rest.find(char::is_whitespace) {
        Some(i) => (&rest[..i], &rest[i..]),
        None => (rest, ""),
    }
}

fn lookup_opcode(name: &str) -> Result<Opcode, PlcError> {
    Ok(match name.to_ascii_uppercase().as_str() {
        "NOP" => Opcode::Nop,
        "POP" | ")" => Opcode::Pop,
        "JMP" => Opcode::Jmp,
        "CAL" => Opcode::Cal,
        "RET" => Opcode::Ret,
        "S" | "SET" => Opcode::Set,
        "R" | "RST" | "RESET" => Opcode::Reset,
        "LD" => Opcode::Ld,
        "ST" => Opcode::St,
        "AND" => Opcode::And,
        "OR" => Opcode::Or,
        "XOR" => Opcode::Xor,
        "ADD" => Opcode::Add,
        "SUB" => Opcode::Sub,
        "MUL" => Opcode::Mul,
        "DIV" => Opcode::Div,
        "GT" => Opcode::Gt,
        "GE" => Opcode::Ge,
        "EQ" => Opcode::Eq,
        "NE" => Opcode::Ne,
        "LT" => Opcode::Lt,
        "LE" => Opcode::Le,
        _ => return Err(PlcError::BadChar),
    })
}

/// Which modifiers spec.md §4.2's validity rules allow for each opcode.
fn allowed_modifiers(op: Opcode) -> &'static [Modifier] {
    use Modifier::*;
    match op {
        Opcode::And | Opcode::Or | Opcode::Xor => &[Norm, Negate, Push],
        Opcode::Ld | Opcode::St => &[Norm, Negate],
        Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::Div => &[Norm, Push],
        Opcode::Gt | Opcode::Ge | Opcode::Eq | Opcode::Ne | Opcode::Lt | Opcode::Le => {
            &[Norm, Push]
        }
        Opcode::Set | Opcode::Reset | Opcode::Jmp => &[Norm, Cond],
        Opcode::Nop | Opcode::Cal | Opcode::Ret | Opcode::Pop => &[Norm],
    }
}

/// Parse `%<char>[f]<N>[/<M>]` into a concrete [`Operand`].
fn parse_operand(text: &str) -> Result<Operand, PlcError> {
    let text = text.strip_prefix('%').ok_or(PlcError::BadOperand)?;
    let mut chars = text.chars().peekable();
    let base = chars.next().ok_or(PlcError::BadOperand)?;
    let mut real = false;
    if matches!(chars.peek(), Some(&'f') | Some(&'F')) {
        real = true;
        chars.next();
    }

    let kind = operand_kind(base, real)?;

    let remainder: String = chars.collect();
    let (byte_str, bit_str) = match remainder.split_once('/') {
        Some((b, m)) => (b, Some(m)),
        None => (remainder.as_str(), None),
    };
    let byte: u16 = byte_str.parse().map_err(|_| PlcError::BadOperand)?;
    let bit: u8 = match bit_str {
        Some(m) => m.parse().map_err(|_| PlcError::BadOperand)?,
        None => 0,
    };

    Ok(Operand::new(kind, byte, bit))
}

pub(crate) fn operand_kind(base: char, real: bool) -> Result<OperandKind, PlcError> {
    use OperandKind::*;
    Ok(match (base, real) {
        ('i', false) => Input,
        ('i', true) => RealInput,
        ('r', false) => Rising,
        ('f', false) => Falling,
        ('m', false) => Memory,
        ('m', true) => RealMemory,
        ('c', false) => Command,
        ('b', false) => Blinker,
        ('t', false) => Timer,
        ('q', false) => Output,
        ('q', true) => RealOutput,
        ('Q', false) => Contact,
        ('Q', true) => RealContact,
        ('T', false) => TimerStart,
        ('M', false) => MemoryPulse,
        ('M', true) => RealMemoryStore,
        ('W', false) => Write,
        _ => return Err(PlcError::BadOperand),
    })
}

/// `ST`, `SET`, and `RESET` targets must be coil-class; rewrite a
/// read-side alias to its write-side counterpart (spec.md §4.2).
fn normalize_store_target(op: Opcode, operand: Operand) -> Result<Operand, PlcError> {
    if !matches!(op, Opcode::St | Opcode::Set | Opcode::Reset) {
        return Ok(operand);
    }
    let kind = operand.kind.to_coil().ok_or(PlcError::BadCoil)?;
    Ok(Operand::new(kind, operand.byte, operand.bit))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::Target;

    #[test]
    fn parses_simple_ld_st() {
        let prog = parse_program("LD %i0/0\nST %q0/0\n").unwrap();
        assert_eq!(prog.instructions.len(), 2);
        assert_eq!(prog.instructions[0].opcode, Opcode::Ld);
        let op = prog.instructions[1].operand().unwrap();
        assert_eq!(op.kind, OperandKind::Contact);
    }

    #[test]
    fn jmp_resolves_label() {
        let prog = parse_program("start: LD %i0/0\nJMP start\n").unwrap();
        match &prog.instructions[1].target {
            Target::Jump { resolved, .. } => assert_eq!(*resolved, Some(0)),
            _ => panic!("expected jump"),
        }
    }

    #[test]
    fn unresolved_label_errors() {
        let err = parse_program("JMP nowhere\n").unwrap_err();
        assert_eq!(err.kind, PlcError::BadProg);
    }

    #[test]
    fn comments_and_blank_lines_skipped() {
        let prog = parse_program("; a comment\n\nLD %i0/0 ; trailing\n").unwrap();
        assert_eq!(prog.instructions.len(), 1);
    }

    #[test]
    fn bitwise_rejects_push_modifier() {
        let err = parse_program("LD( %i0/0\n").unwrap_err();
        assert_eq!(err.kind, PlcError::BadOperator);
    }

    #[test]
    fn triple_majority_gate_compiles() {
        let src = "LD  %i0/0\nAND %i0/1\nOR( %i0/2\nAND %i0/1\n)\nOR( %i0/2\nAND %i0/0\n)\nST %q0/0\n";
        let prog = parse_program(src).unwrap();
        assert_eq!(prog.instructions.len(), 9);
    }
}
