//! The type-checked AST the lowerer consumes.
//!
//! This is the front-end/back-end seam: the
//! lexer, parser and type/syntax checkers that *produce* a [`Program`]
//! are external collaborators and live outside this crate. What's
//! here is only the shape of their output.

pub mod expr;
pub mod program;
pub mod stmt;
pub mod types;

pub use expr::{BinOp, Expr, UnOp};
pub use program::{FunctionDecl, GlobalDecl, Param, Program};
pub use stmt::{Block, Stmt};
pub use types::Type;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn program_serde_roundtrip() {
        let program = Program {
            globals: vec![GlobalDecl {
                name: "g".into(),
                ty: Type::Int,
                init: 7,
            }],
            functions: vec![FunctionDecl {
                name: "main".into(),
                params: vec![],
                return_type: Type::Int,
                body: Block(vec![
                    Stmt::Decl {
                        name: "x".into(),
                        ty: Type::Int,
                        init: Expr::Int(0),
                    },
                    Stmt::Assign {
                        name: "x".into(),
                        expr: Expr::BinOp {
                            op: BinOp::Add,
                            left: Box::new(Expr::Var("x".into())),
                            right: Box::new(Expr::Int(1)),
                        },
                    },
                    Stmt::Eval(Expr::Call {
                        target: "print".into(),
                        args: vec![Expr::Var("x".into())],
                    }),
                ]),
            }],
        };
        let json = serde_json::to_string(&program).unwrap();
        let back: Program = serde_json::from_str(&json).unwrap();
        assert_eq!(back.functions[0].name, "main");
        assert_eq!(back.globals[0].name, "g");
    }

    #[test]
    fn binop_classification() {
        assert!(BinOp::And.is_short_circuit());
        assert!(BinOp::Or.is_short_circuit());
        assert!(!BinOp::Add.is_short_circuit());
        assert!(BinOp::Lt.is_relational());
        assert!(!BinOp::Add.is_relational());
    }
}
