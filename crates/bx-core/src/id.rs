//! Identity newtypes for the IR: temporaries, labels and globals.
//!
//! All three are distinct wrapper types so a `Label` cannot be
//! accidentally used where a `Global` is expected, following the
//! same newtype discipline the front-end graph model uses for its
//! node/edge/function identities.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A virtual register minted by the lowerer's per-procedure fresh-name
/// counter.
///
/// `Counter` temporaries are fresh, compiler-generated names; `Named`
/// temporaries carry a stable source name (parameters and, after SSA
/// deconstruction, anything that needs to keep a calling-convention
/// identity). Equality and hashing are by identity alone -- two temps
/// are the same iff they are the same variant with the same payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Temp {
    /// A fresh temporary minted from a per-procedure counter.
    Counter(u32),
    /// A temporary bound to a stable name (source variable, parameter,
    /// or a pre-colored register constraint such as `%%rax`).
    Named(String),
}

impl Temp {
    /// `true` for pre-colored register-constraint temps (`%%rax`, …),
    /// which the register allocator treats as fixed and which bypass
    /// the SSA->TAC temp mapping during deconstruction.
    pub fn is_dummy_register(&self) -> bool {
        matches!(self, Temp::Named(name) if name.starts_with("%%"))
    }
}

impl fmt::Display for Temp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Temp::Counter(n) => write!(f, "%{n}"),
            Temp::Named(s) => write!(f, "%{s}"),
        }
    }
}

/// A named jump target, unique within a procedure.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Label(pub String);

impl Label {
    pub fn new(name: impl Into<String>) -> Self {
        Label(name.into())
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A named module-level variable, distinct from temporaries. Globals
/// are never SSA-versioned -- they are assumed to alias across calls.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Global(pub String);

impl fmt::Display for Global {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}
