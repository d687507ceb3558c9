//! Codegen (component G): lowers the LD arena AST into the same
//! instruction stream IL produces, so the VM never needs to know which
//! front-end a rung came from.

use crate::error::{CompileError, CompileResult, PlcError};
use crate::instruction::{Instruction, Modifier, Opcode, Target};
use crate::parser::ld::parse_ld;
use crate::parser::tree::{Arena, AssignKind, Node, NodeId};
use crate::rung::Rung;

type Step = (Opcode, Modifier, Target);

/// Compile an LD source grid straight to a finalized [`Rung`].
pub fn compile(source: &str) -> CompileResult<Rung> {
    let mut arena = Arena::new();
    let assignments = parse_ld(source, &mut arena)?;

    let mut rung = Rung::new();
    for id in assignments {
        let steps = lower_assignment(&arena, id).map_err(|e| CompileError::new(0, "", e))?;
        for (opcode, modifier, target) in steps {
            rung
                .append(Instruction::new(opcode, modifier, target, 0), "")
                .map_err(|e| CompileError::new(0, "", e))?;
        }
    }
    Ok(rung)
}

/// Lower a value subtree so that, once executed, the accumulator holds
/// its value.
fn lower_value(arena: &Arena, id: NodeId) -> Result<Vec<Step>, PlcError> {
    match arena.get(id) {
        Node::Identifier { operand, negated } => {
            let modifier = if *negated { Modifier::Negate } else { Modifier::Norm };
            Ok(vec![(Opcode::Ld, modifier, Target::Addr(*operand))])
        }
        Node::Expression { op, left, right } => {
            let mut out = lower_value(arena, *left)?;
            match arena.get(*right) {
                Node::Identifier { operand, negated } => {
                    let modifier = if *negated { Modifier::Negate } else { Modifier::Norm };
                    out.push((*op, modifier, Target::Addr(*operand)));
                }
                Node::Expression { .. } => {
                    let mut right_steps = lower_value(arena, *right)?;
                    let (_, _, first_target) = right_steps.remove(0);
                    out.push((*op, Modifier::Push, first_target));
                    out.extend(right_steps);
                    out.push((Opcode::Pop, Modifier::Norm, Target::None));
                }
                Node::Assignment { .. } => return Err(PlcError::BadOperand),
            }
            Ok(out)
        }
        Node::Assignment { .. } => Err(PlcError::BadOperand),
    }
}

fn lower_assignment(arena: &Arena, id: NodeId) -> Result<Vec<Step>, PlcError> {
    match arena.get(id) {
        Node::Assignment { value, target, kind } => {
            let mut out = lower_value(arena, *value)?;
            let coil = match kind {
                AssignKind::Store => (Opcode::St, Modifier::Norm, Target::Addr(*target)),
                AssignKind::Down => (Opcode::St, Modifier::Negate, Target::Addr(*target)),
                AssignKind::Set => (Opcode::Set, Modifier::Cond, Target::Addr(*target)),
                AssignKind::Reset => (Opcode::Reset, Modifier::Cond, Target::Addr(*target)),
            };
            out.push(coil);
            Ok(out)
        }
        _ => Err(PlcError::BadOperand),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn series_contacts_compile_to_ld_and_st() {
        let rung = compile("--i0/0--i0/1--(q0/0)--").unwrap();
        assert_eq!(rung.instructions[0].opcode, Opcode::Ld);
        assert_eq!(rung.instructions[1].opcode, Opcode::And);
        assert_eq!(rung.instructions[2].opcode, Opcode::St);
    }

    #[test]
    fn or_node_combines_two_lines_without_push() {
        // A vertical OR between two plain identifiers needs no push/pop:
        // the parent opcode directly consumes the second operand.
        let src = "--i0/0--+--(q0/0)--\n--i0/1--+";
        let rung = compile(src).unwrap();
        assert!(rung.instructions.iter().any(|i| i.opcode == Opcode::Or));
        assert!(!rung.instructions.iter().any(|i| i.opcode == Opcode::Pop));
    }

    #[test]
    fn nested_right_expression_uses_push_and_pop() {
        use crate::instruction::{Operand, OperandKind};

        let mut arena = Arena::new();
        let a = arena.alloc(Node::Identifier {
            operand: Operand::new(OperandKind::Input, 0, 0),
            negated: false,
        });
        let b = arena.alloc(Node::Identifier {
            operand: Operand::new(OperandKind::Input, 0, 1),
            negated: false,
        });
        let c = arena.alloc(Node::Identifier {
            operand: Operand::new(OperandKind::Input, 0, 2),
            negated: false,
        });
        let right = arena.alloc(Node::Expression {
            op: Opcode::And,
            left: b,
            right: c,
        });
        let top = arena.alloc(Node::Expression {
            op: Opcode::Or,
            left: a,
            right,
        });
        let target = Operand::new(OperandKind::Contact, 0, 0);
        let assign = arena.alloc(Node::Assignment {
            value: top,
            target,
            kind: AssignKind::Store,
        });
        let steps = lower_assignment(&arena, assign).unwrap();
        assert!(steps.iter().any(|(op, m, _)| *op == Opcode::Or && *m == Modifier::Push));
        assert!(steps.iter().any(|(op, _, _)| *op == Opcode::Pop));
    }
}
