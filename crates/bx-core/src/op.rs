//! The closed opcode vocabulary and the polymorphic three-address op.
//!
//! Arguments mix temporaries, labels, globals and integer literals, so
//! [`Operand`] is a tagged variant rather than a trait object; callers
//! pattern-match exhaustively on opcode + arity instead of relying on
//! dynamic dispatch, per the "abstract base class" redesign note.

use std::fmt;
use std::hash::Hash;

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use crate::id::{Global, Label};

/// The closed set of three-address opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Opcode {
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Neg,
    // Bitwise / shift
    And,
    Or,
    Xor,
    Not,
    Lshift,
    Rshift,
    // Data movement
    Copy,
    Const,
    // Control
    Jmp,
    Jz,
    Jnz,
    Jl,
    Jle,
    Jnl,
    Jnle,
    Ret,
    // Call protocol
    Param,
    Call,
    // Built-in
    Print,
    // Pseudo-op (SSA construction scaffold; must not leak past phi rewrite)
    Phony,
}

impl Opcode {
    /// Every opcode that transfers control.
    pub const JMP_OPS: &'static [Opcode] = &[
        Opcode::Jmp,
        Opcode::Jz,
        Opcode::Jnz,
        Opcode::Jl,
        Opcode::Jle,
        Opcode::Jnl,
        Opcode::Jnle,
        Opcode::Ret,
    ];

    /// Jumps that always transfer control, unconditionally.
    pub const UNCOND: &'static [Opcode] = &[Opcode::Jmp, Opcode::Ret];

    pub fn is_jump(self) -> bool {
        Self::JMP_OPS.contains(&self)
    }

    pub fn is_unconditional(self) -> bool {
        Self::UNCOND.contains(&self)
    }

    /// `COND_JMP = JMP_OPS \ UNCOND`.
    pub fn is_conditional_jump(self) -> bool {
        self.is_jump() && !self.is_unconditional()
    }

    /// The label argument a jump targets, if this op is a jump that
    /// carries exactly one label argument (all of `JMP_OPS` except `ret`).
    pub fn carries_label(self) -> bool {
        self.is_jump() && self != Opcode::Ret
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Opcode::Add => "add",
            Opcode::Sub => "sub",
            Opcode::Mul => "mul",
            Opcode::Div => "div",
            Opcode::Mod => "mod",
            Opcode::Neg => "neg",
            Opcode::And => "and",
            Opcode::Or => "or",
            Opcode::Xor => "xor",
            Opcode::Not => "not",
            Opcode::Lshift => "lshift",
            Opcode::Rshift => "rshift",
            Opcode::Copy => "copy",
            Opcode::Const => "const",
            Opcode::Jmp => "jmp",
            Opcode::Jz => "jz",
            Opcode::Jnz => "jnz",
            Opcode::Jl => "jl",
            Opcode::Jle => "jle",
            Opcode::Jnl => "jnl",
            Opcode::Jnle => "jnle",
            Opcode::Ret => "ret",
            Opcode::Param => "param",
            Opcode::Call => "call",
            Opcode::Print => "print",
            Opcode::Phony => "phony",
        };
        write!(f, "{s}")
    }
}

/// One argument of an [`Op`]: a temp of whatever flavor `T` is for this
/// pipeline stage (`Temp` pre-SSA/post-deconstruction, `SSATemp` in SSA
/// form), a global, an integer literal, or a jump-target label.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operand<T> {
    Temp(T),
    Global(Global),
    Const(i64),
    Label(Label),
}

impl<T: fmt::Display> fmt::Display for Operand<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Temp(t) => write!(f, "{t}"),
            Operand::Global(g) => write!(f, "{g}"),
            Operand::Const(n) => write!(f, "{n}"),
            Operand::Label(l) => write!(f, "{l}"),
        }
    }
}

/// Where an op's result is written: a temp, or a global (`copy t -> @g`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dest<T> {
    Temp(T),
    Global(Global),
}

impl<T: fmt::Display> fmt::Display for Dest<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dest::Temp(t) => write!(f, "{t}"),
            Dest::Global(g) => write!(f, "{g}"),
        }
    }
}

impl<T> Dest<T> {
    pub fn as_temp(&self) -> Option<&T> {
        match self {
            Dest::Temp(t) => Some(t),
            Dest::Global(_) => None,
        }
    }
}

/// A single three-address operation: `(opcode, args[], result?)` plus
/// the liveness sets the external liveness collaborator populates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Op<T: Eq + Hash> {
    pub opcode: Opcode,
    pub args: Vec<Operand<T>>,
    pub result: Option<Dest<T>>,
    #[serde(bound(serialize = "T: Serialize", deserialize = "T: Deserialize<'de>"))]
    pub live_in: IndexSet<T>,
    #[serde(bound(serialize = "T: Serialize", deserialize = "T: Deserialize<'de>"))]
    pub live_out: IndexSet<T>,
}

impl<T: Eq + Hash + Clone> Op<T> {
    /// Build an op with empty liveness sets -- the common case at
    /// construction time, before the liveness collaborator runs.
    pub fn new(opcode: Opcode, args: Vec<Operand<T>>, result: Option<Dest<T>>) -> Self {
        Op {
            opcode,
            args,
            result,
            live_in: IndexSet::new(),
            live_out: IndexSet::new(),
        }
    }

    /// Temps read by this op (args only; the phi/copy destination is a
    /// write, not a read, except that `copy`'s lone arg is a read).
    pub fn used_temps(&self) -> impl Iterator<Item = &T> {
        self.args.iter().filter_map(|a| match a {
            Operand::Temp(t) => Some(t),
            _ => None,
        })
    }

    /// The temp this op defines, if its result is a temp (not a global).
    pub fn defined_temp(&self) -> Option<&T> {
        self.result.as_ref().and_then(Dest::as_temp)
    }

    /// The single jump target label, for ops in `JMP_OPS` other than `ret`.
    pub fn jump_target(&self) -> Option<&Label> {
        if !self.opcode.carries_label() {
            return None;
        }
        self.args.iter().find_map(|a| match a {
            Operand::Label(l) => Some(l),
            _ => None,
        })
    }
}

impl<T: Eq + Hash + fmt::Display> fmt::Display for Op<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let args = self
            .args
            .iter()
            .map(|a| a.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        match &self.result {
            Some(result) => write!(f, "{result} = {} {args}", self.opcode),
            None if args.is_empty() => write!(f, "{}", self.opcode),
            None => write!(f, "{} {args}", self.opcode),
        }
    }
}
