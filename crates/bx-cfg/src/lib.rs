//! Builds a [`bx_core::Cfg`] out of a flat [`bx_core::TacListing`],
//! optimizes it to a fixpoint, runs the (external-interface-shaped)
//! liveness collaborator over it, and serializes it back to a listing.
//!
//! Each function is a thin, independently testable pass; [`compile`]
//! wires the usual order together for callers that don't need to
//! inspect intermediate CFG state (the SSA pipeline does need it, and
//! calls the individual passes directly instead).

pub mod builder;
pub mod error;
pub mod liveness;
pub mod optimize;
pub mod serialize;

use bx_core::{Cfg, TacListing, Temp};

pub use error::CfgError;

/// Builds, optimizes and re-serializes a listing in one call; runs
/// liveness over the optimized shape before serializing so the
/// returned listing's ops already carry `live_in`/`live_out`.
pub fn compile(listing: &TacListing) -> Result<TacListing, CfgError> {
    let mut cfg = build_and_optimize(listing)?;
    liveness::analyze(&mut cfg);
    Ok(serialize::to_listing(&cfg))
}

/// Builds and optimizes without serializing back -- what the SSA
/// generator consumes, since it needs block structure rather than a
/// flat listing.
pub fn build_and_optimize(listing: &TacListing) -> Result<Cfg<Temp>, CfgError> {
    let cfg = builder::build(listing)?;
    Ok(optimize::optimize(cfg))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bx_core::{Dest, Label, Listing, Op, Opcode, Operand};

    #[test]
    fn compile_runs_liveness_over_the_optimized_shape() {
        let mut listing: TacListing = Listing::new("f", vec![]);
        listing.push_label(Label::new("f"));
        listing.push_op(Op::new(
            Opcode::Const,
            vec![Operand::Const(1)],
            Some(Dest::Temp(Temp::Counter(0))),
        ));
        listing.push_op(Op::new(
            Opcode::Ret,
            vec![Operand::Temp(Temp::Counter(0))],
            None,
        ));
        let out = compile(&listing).unwrap();
        let has_ret = out
            .items
            .iter()
            .any(|item| matches!(item, bx_core::Item::Op(op) if op.opcode == Opcode::Ret));
        assert!(has_ret);
    }
}
