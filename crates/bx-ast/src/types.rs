//! The two scalar source types. No compound types exist in this
//! language family.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Type {
    /// 64-bit signed integer.
    Int,
    Bool,
}
