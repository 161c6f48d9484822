//! Top-level declarations: functions and module-level globals.

use serde::{Deserialize, Serialize};

use crate::stmt::Block;
use crate::types::Type;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub ty: Type,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDecl {
    pub name: String,
    pub params: Vec<Param>,
    pub return_type: Type,
    pub body: Block,
}

/// A module-level variable with a constant integer initializer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalDecl {
    pub name: String,
    pub ty: Type,
    pub init: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Program {
    pub globals: Vec<GlobalDecl>,
    pub functions: Vec<FunctionDecl>,
}
