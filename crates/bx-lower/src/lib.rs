//! Lowers a type-checked [`bx_ast::Program`] into one [`bx_core::TacListing`]
//! per function.
//!
//! The lowerer trusts its input completely -- front-end name and type
//! checking already happened. The two errors it can still raise
//! ([`LowerError`]) only fire on a malformed AST a correct front-end
//! would never produce.

mod error;
mod lowerer;

pub use error::LowerError;
pub use lowerer::{global_map, lower_function};

use std::collections::HashMap;

use bx_ast::Program;
use bx_core::{Global, TacListing};

/// Lowers every function in a program, sharing one global map across
/// all of them.
pub fn lower_program(program: &Program) -> Result<Vec<TacListing>, LowerError> {
    let globals: HashMap<String, Global> = global_map(&program.globals);
    program
        .functions
        .iter()
        .map(|f| lower_function(f, &globals))
        .collect()
}
