use thiserror::Error;

/// Failures raised while lowering a type-checked [`bx_ast::Program`] into
/// TAC. Both variants indicate a front-end that let something through it
/// shouldn't have -- a well-formed, already type-checked program never
/// triggers either.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LowerError {
    #[error("unbound name `{0}`")]
    UnboundName(String),

    #[error("break or continue outside a loop")]
    LoopMisplaced,
}
