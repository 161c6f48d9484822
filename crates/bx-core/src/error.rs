//! Core error type for pipeline-internal invariant violations.
//!
//! The core runs on already type-checked input: every
//! variant here is a programmer-invariant violation, not a
//! user-facing diagnostic. The enclosing driver is expected to treat
//! any of these as a fatal compilation failure.

use thiserror::Error;

use crate::id::Label;

#[derive(Debug, Error)]
pub enum CoreError {
    /// An opcode appeared where validation did not expect it -- a
    /// pipeline bug, never a consequence of malformed source.
    #[error("unknown or misplaced opcode: {0}")]
    UnknownOpcode(String),

    /// A symmetry or reachability invariant was violated after CFG
    /// optimization (e.g. `b in a.successors` without `a in b.predecessors`).
    #[error("CFG invariant violated: {0}")]
    CfgInvariant(String),

    /// A jump targets a label that does not exist in the listing/CFG.
    #[error("jump target label not found: {0}")]
    DanglingLabel(Label),
}
