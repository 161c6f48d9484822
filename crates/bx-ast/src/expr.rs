//! Expression forms. Already type-checked by the (external) front-end
//! -- the lowerer trusts this tree's shape completely.

use serde::{Deserialize, Serialize};

/// Unary operators. Boolean negation of a *comparison* result is
/// handled by the lowerer flipping branch polarity rather than by
/// this variant; `BoolNot` covers the general case of
/// negating an already-materialized boolean value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnOp {
    /// Arithmetic negation (`-x`).
    Neg,
    /// Bitwise complement (`~x`).
    BitNot,
    /// Logical negation of a boolean value (`!x`).
    BoolNot,
}

/// Binary operators, grouped the way the lowerer handles them:
/// arithmetic/bitwise emit a single op, `&&`/`||` use short-circuit
/// branch lowering, and relational ops feed the branch-lowering
/// routine when used as a condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    BitAnd,
    BitOr,
    BitXor,
    Lshift,
    Rshift,
    And,
    Or,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinOp {
    pub fn is_short_circuit(self) -> bool {
        matches!(self, BinOp::And | BinOp::Or)
    }

    pub fn is_relational(self) -> bool {
        matches!(
            self,
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Expr {
    Int(i64),
    Bool(bool),
    Var(String),
    UnOp {
        op: UnOp,
        expr: Box<Expr>,
    },
    BinOp {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Call {
        target: String,
        args: Vec<Expr>,
    },
}
