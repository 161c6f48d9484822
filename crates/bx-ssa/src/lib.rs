//! SSA construction (crude-then-simplify), optimization to a fixpoint,
//! and deconstruction back into flat TAC.
//!
//! Each stage is independently testable and usable on its own; [`pipeline`]
//! wires the usual order together for callers -- `bx-cli` among them --
//! that just want an optimized, SSA-cleaned-up listing back out.

pub mod deconstructor;
pub mod error;
pub mod generator;
pub mod optimizer;

use bx_core::{Cfg, TacListing, Temp};

pub use error::SsaError;

/// Runs construction, optimization and deconstruction over an already
/// built-and-optimized CFG, handing back a flat listing with every
/// phi eliminated into parallel copies.
pub fn pipeline(cfg: &Cfg<Temp>) -> Result<TacListing, SsaError> {
    let ssa = generator::construct(cfg)?;
    let optimized = optimizer::optimize(ssa);
    Ok(deconstructor::deconstruct(&optimized))
}
