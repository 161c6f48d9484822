//! Statement and block forms.

use serde::{Deserialize, Serialize};

use crate::expr::Expr;
use crate::types::Type;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block(pub Vec<Stmt>);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Stmt {
    Decl {
        name: String,
        ty: Type,
        init: Expr,
    },
    Assign {
        name: String,
        expr: Expr,
    },
    Eval(Expr),
    If {
        cond: Expr,
        then_branch: Block,
        else_branch: Option<Block>,
    },
    While {
        cond: Expr,
        body: Block,
    },
    Break,
    Continue,
}
