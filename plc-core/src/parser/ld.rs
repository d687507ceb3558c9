//! The Ladder Diagram front-end (component F): a two-pass grid parser
//! that turns a fixed-width text grid into the arena AST of [`tree`].
//!
//! Grounded in spec.md §4.3's horizontal/vertical alternation. Lines and
//! columns are both just character indices into the grid.

use crate::error::{CompileError, CompileResult, PlcError};
use crate::instruction::{Operand, OperandKind};
use crate::parser::il::operand_kind;
use crate::parser::tree::{Arena, AssignKind, Node, NodeId};

struct Grid {
    rows: Vec<Vec<char>>,
}

impl Grid {
    fn parse(text: &str) -> Self {
        Self {
            rows: text.lines().map(|l| l.chars().collect()).collect(),
        }
    }

    fn height(&self) -> usize {
        self.rows.len()
    }

    fn width(&self) -> usize {
        self.rows.iter().map(|r| r.len()).max().unwrap_or(0)
    }

    fn cell(&self, row: usize, col: usize) -> char {
        self.rows.get(row).and_then(|r| r.get(col)).copied().unwrap_or(' ')
    }

    fn row_text(&self, row: usize) -> String {
        self.rows.get(row).map(|r| r.iter().collect()).unwrap_or_default()
    }
}

struct LineState {
    cursor: usize,
    stmt: Option<NodeId>,
    resolved: bool,
    negate_pending: bool,
}

/// Parse a fixed-width LD grid into one [`Node::Assignment`] per coil
/// line, in source order.
pub fn parse_ld(source: &str, arena: &mut Arena) -> CompileResult<Vec<NodeId>> {
    let grid = Grid::parse(source);
    let mut states: Vec<LineState> = (0..grid.height())
        .map(|_| LineState {
            cursor: 0,
            stmt: None,
            resolved: true,
            negate_pending: false,
        })
        .collect();
    for (row, state) in states.iter_mut().enumerate() {
        let blank = (0..grid.width()).all(|c| grid.cell(row, c) == ' ');
        state.resolved = blank;
    }

    let mut assignments = Vec::new();

    loop {
        let mut progressed = false;
        for row in 0..grid.height() {
            if states[row].resolved {
                continue;
            }
            loop {
                let col = states[row].cursor;
                if col >= grid.width() {
                    states[row].resolved = true;
                    progressed = true;
                    break;
                }
                let ch = grid.cell(row, col);
                match ch {
                    '-' | ' ' => {
                        states[row].cursor += 1;
                        progressed = true;
                    }
                    '!' => {
                        states[row].negate_pending = true;
                        states[row].cursor += 1;
                        progressed = true;
                    }
                    '+' => break,
                    '(' | '[' | ']' | ')' => {
                        let stmt = states[row].stmt;
                        let (node, consumed) = parse_coil(&grid, row, col, arena, stmt)
                            .map_err(|e| CompileError::new(row + 1, grid.row_text(row), e))?;
                        assignments.push(node);
                        states[row].cursor += consumed;
                        states[row].resolved = true;
                        progressed = true;
                        break;
                    }
                    c if c.is_ascii_alphabetic() => {
                        let chars: Vec<char> = (col..grid.width()).map(|c| grid.cell(row, c)).collect();
                        let (operand, consumed) = lex_operand(&chars)
                            .map_err(|e| CompileError::new(row + 1, grid.row_text(row), e))?;
                        let negated = states[row].negate_pending;
                        states[row].negate_pending = false;
                        let id = arena.alloc(Node::Identifier { operand, negated });
                        states[row].stmt = Some(match states[row].stmt {
                            None => id,
                            Some(prev) => arena.alloc(Node::Expression {
                                op: crate::instruction::Opcode::And,
                                left: prev,
                                right: id,
                            }),
                        });
                        states[row].cursor += consumed;
                        progressed = true;
                    }
                    _ => {
                        states[row].cursor += 1;
                        progressed = true;
                    }
                }
            }
        }

        if states.iter().all(|s| s.resolved) {
            break;
        }

        let col = states
            .iter()
            .filter(|s| !s.resolved)
            .map(|s| s.cursor)
            .min();
        let Some(col) = col else { break };

        let node_rows: Vec<usize> = (0..grid.height())
            .filter(|&row| !states[row].resolved && states[row].cursor == col && grid.cell(row, col) == '+')
            .collect();

        if node_rows.is_empty() {
            if !progressed {
                return Err(CompileError::new(1, "", PlcError::BadChar));
            }
            continue;
        }

        let mut combined: Option<NodeId> = None;
        for &row in &node_rows {
            if let Some(s) = states[row].stmt {
                combined = Some(match combined {
                    None => s,
                    Some(c) => arena.alloc(Node::Expression {
                        op: crate::instruction::Opcode::Or,
                        left: c,
                        right: s,
                    }),
                });
            }
        }
        for &row in &node_rows {
            states[row].stmt = combined;
            states[row].cursor = col + 1;
        }
    }

    Ok(assignments)
}

fn parse_coil(
    grid: &Grid,
    row: usize,
    col: usize,
    arena: &mut Arena,
    stmt: Option<NodeId>,
) -> Result<(NodeId, usize), PlcError> {
    let open = grid.cell(row, col);
    let (close, kind) = match open {
        '(' => (')', AssignKind::Store),
        '[' => (']', AssignKind::Set),
        ']' => ('[', AssignKind::Reset),
        ')' => ('(', AssignKind::Down),
        _ => return Err(PlcError::BadChar),
    };
    let mut end = col + 1;
    while grid.cell(row, end) != close {
        end += 1;
        if end - col > 64 {
            return Err(PlcError::BadChar);
        }
    }
    let inner: Vec<char> = (col + 1..end).map(|c| grid.cell(row, c)).collect();
    let (operand, _) = lex_operand(&inner)?;
    let target_kind = operand.kind.to_coil().ok_or(PlcError::BadCoil)?;
    let target = Operand::new(target_kind, operand.byte, operand.bit);
    let value = stmt.ok_or(PlcError::BadOperand)?;
    let node = arena.alloc(Node::Assignment { value, target, kind });
    Ok((node, end - col + 1))
}

/// Lex `<char>[f]<digits>[/<digits>]` starting at `chars[0]`, returning
/// the parsed operand and how many characters it consumed.
fn lex_operand(chars: &[char]) -> Result<(Operand, usize), PlcError> {
    let mut i = 0;
    let base = *chars.first().ok_or(PlcError::BadOperand)?;
    i += 1;
    let mut real = false;
    if chars.get(i) == Some(&'f') {
        real = true;
        i += 1;
    }
    let kind: OperandKind = operand_kind(base, real)?;

    let start = i;
    while chars.get(i).is_some_and(|c| c.is_ascii_digit()) {
        i += 1;
    }
    if i == start {
        return Err(PlcError::BadOperand);
    }
    let byte: u16 = chars[start..i]
        .iter()
        .collect::<String>()
        .parse()
        .map_err(|_| PlcError::BadOperand)?;

    let mut bit = 0u8;
    if chars.get(i) == Some(&'/') {
        i += 1;
        let start = i;
        while chars.get(i).is_some_and(|c| c.is_ascii_digit()) {
            i += 1;
        }
        bit = chars[start..i]
            .iter()
            .collect::<String>()
            .parse()
            .map_err(|_| PlcError::BadOperand)?;
    }

    Ok((Operand::new(kind, byte, bit), i))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_series_contacts_to_coil() {
        let src = "--i0/0--i0/1--(q0/0)--";
        let mut arena = Arena::new();
        let assigns = parse_ld(src, &mut arena).unwrap();
        assert_eq!(assigns.len(), 1);
        match arena.get(assigns[0]) {
            Node::Assignment { kind, target, .. } => {
                assert_eq!(*kind, AssignKind::Store);
                assert_eq!(target.kind, OperandKind::Contact);
            }
            _ => panic!("expected assignment"),
        }
    }

    #[test]
    fn negated_contact_prefix() {
        let src = "--!i0/0--(q0/0)--";
        let mut arena = Arena::new();
        let assigns = parse_ld(src, &mut arena).unwrap();
        match arena.get(assigns[0]) {
            Node::Assignment { value, .. } => match arena.get(*value) {
                Node::Identifier { negated, .. } => assert!(*negated),
                _ => panic!("expected identifier"),
            },
            _ => panic!("expected assignment"),
        }
    }

    #[test]
    fn vertical_or_node_combines_two_lines() {
        let src = "--i0/0--+--(q0/0)--\n--i0/1--+";
        let mut arena = Arena::new();
        let assigns = parse_ld(src, &mut arena).unwrap();
        assert_eq!(assigns.len(), 1);
        match arena.get(assigns[0]) {
            Node::Assignment { value, .. } => {
                assert!(matches!(arena.get(*value), Node::Expression { .. }));
            }
            _ => panic!("expected assignment"),
        }
    }
}
