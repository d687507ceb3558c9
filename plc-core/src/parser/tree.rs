//! Arena-based AST for the LD front-end.
//!
//! spec.md §9: the original's pointer-linked tree shares subexpressions
//! by reference and is vulnerable to double-free on cyclical branches.
//! Nodes here are indexed by integer into one arena instead, so the
//! vertical pass's OR-rewiring is just assigning a child index, and the
//! whole tree is dropped wholesale after codegen.

use crate::instruction::{Opcode, Operand};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub usize);

/// What a coil assignment does with its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignKind {
    /// `(...)` — plain store.
    Store,
    /// `)...(` — negate-and-store ("down" coil).
    Down,
    /// `[...]` — set-pending.
    Set,
    /// `]...[` — reset-pending.
    Reset,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// A leaf operand read, optionally negated by a `!` prefix.
    Identifier { operand: Operand, negated: bool },
    /// A binary combination of two subtrees under a bitwise opcode
    /// (`AND` from horizontal adjacency, `OR` from a vertical node).
    Expression {
        op: Opcode,
        left: NodeId,
        right: NodeId,
    },
    /// A coil: the value subtree plus the target operand and mode.
    Assignment {
        value: NodeId,
        target: Operand,
        kind: AssignKind,
    },
}

/// The node arena a single LD source compiles into.
#[derive(Debug, Default)]
pub struct Arena {
    nodes: Vec<Node>,
}

impl Arena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    pub fn get(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }
}
