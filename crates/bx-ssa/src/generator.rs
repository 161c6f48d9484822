//! "Crude-then-simplify" SSA construction: phony insertion, a single
//! versioning pass threaded across the whole procedure, and a
//! separate phi-resolution pass that only runs once every block has a
//! final `versions_out`.
//!
//! Liveness (`live_in` per block) must already be populated on `cfg`
//! -- this is the §4.3 prerequisite supplied by [`bx_cfg::liveness`].

use std::collections::HashMap;

use bx_core::{Cfg, Dest, Label, Op, Operand, Phi, SSATemp, SsaBlock, SsaCfg, Temp};

use crate::error::SsaError;

/// Builds an [`SsaCfg`] from an optimized, liveness-annotated [`Cfg`].
pub fn construct(cfg: &Cfg<Temp>) -> Result<SsaCfg, SsaError> {
    let span = tracing::debug_span!("ssa_construct", proc = %cfg.name);
    let _enter = span.enter();

    let mut current_version: HashMap<Temp, SSATemp> = HashMap::new();
    for param in &cfg.params {
        current_version.insert(param.clone(), SSATemp::new(param.clone(), 0));
    }

    let mut ssa_blocks: Vec<SsaBlock> = Vec::with_capacity(cfg.len());
    for block in cfg.blocks() {
        let mut ssa_block = SsaBlock::new(block.entry.clone());
        ssa_block.successors = block.successors.clone();
        ssa_block.predecessors = block.predecessors.clone();
        ssa_block.fallthrough = block.fallthrough.clone();
        ssa_block.initial = block.initial;

        // Phony insertion: one placeholder def per live-in temp, skipped
        // for the initial block (no predecessors to join; its names are
        // the pre-seeded parameters instead). Each placeholder's
        // `defined` records the freshly minted version; `sources` is
        // filled in by `resolve_phis` once every block is versioned.
        if !block.initial {
            for id in &block.live_in {
                let version = next_version(&mut current_version, id);
                ssa_block.defs.push(Phi::new(version));
            }
        }

        for op in &block.ops {
            let args = op
                .args
                .iter()
                .map(|arg| version_operand(arg, &current_version))
                .collect();
            // live_in reflects versions as they stand *before* this op's
            // write, live_out *after* -- both read from `current_version`
            // on either side of the result's version bump.
            let live_in = op
                .live_in
                .iter()
                .map(|t| current_version.get(t).cloned().unwrap_or_else(|| SSATemp::new(t.clone(), 0)))
                .collect();
            let result = match &op.result {
                Some(Dest::Temp(t)) => Some(Dest::Temp(next_version(&mut current_version, t))),
                Some(Dest::Global(g)) => Some(Dest::Global(g.clone())),
                None => None,
            };
            let live_out = op
                .live_out
                .iter()
                .map(|t| current_version.get(t).cloned().unwrap_or_else(|| SSATemp::new(t.clone(), 0)))
                .collect();
            let mut versioned = Op::new(op.opcode, args, result);
            versioned.live_in = live_in;
            versioned.live_out = live_out;
            ssa_block.ops.push(versioned);
        }

        ssa_block.versions_out = current_version
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        ssa_blocks.push(ssa_block);
    }

    resolve_phis(&mut ssa_blocks)?;

    Ok(SsaCfg::new(
        cfg.name.clone(),
        cfg.params.clone(),
        cfg.entry.clone(),
        ssa_blocks,
    ))
}

fn version_operand(
    arg: &Operand<Temp>,
    current_version: &HashMap<Temp, SSATemp>,
) -> Operand<SSATemp> {
    match arg {
        Operand::Temp(t) => Operand::Temp(
            current_version
                .get(t)
                .cloned()
                .unwrap_or_else(|| SSATemp::new(t.clone(), 0)),
        ),
        Operand::Global(g) => Operand::Global(g.clone()),
        Operand::Const(n) => Operand::Const(*n),
        Operand::Label(l) => Operand::Label(l.clone()),
    }
}

fn next_version(current_version: &mut HashMap<Temp, SSATemp>, id: &Temp) -> SSATemp {
    let version = current_version
        .get(id)
        .map(|prev| prev.version + 1)
        .unwrap_or(0);
    let fresh = SSATemp::new(id.clone(), version);
    current_version.insert(id.clone(), fresh.clone());
    fresh
}

/// Replaces every phony placeholder with a real phi once `versions_out`
/// is final for every block: each predecessor contributes the version
/// it held of the phony's source name at its own exit.
fn resolve_phis(blocks: &mut [SsaBlock]) -> Result<(), SsaError> {
    let index: HashMap<Label, usize> = blocks
        .iter()
        .enumerate()
        .map(|(i, b)| (b.entry.clone(), i))
        .collect();
    let versions_out: Vec<_> = blocks.iter().map(|b| b.versions_out.clone()).collect();

    for i in 0..blocks.len() {
        let placeholders = std::mem::take(&mut blocks[i].defs);
        let mut resolved = Vec::with_capacity(placeholders.len());
        for placeholder in placeholders {
            let temp_id = placeholder.defined.id.clone();
            let mut phi = Phi::new(placeholder.defined);
            for pred in &blocks[i].predecessors {
                let pred_idx = index[pred];
                let source = versions_out[pred_idx].get(&temp_id).cloned().ok_or_else(|| {
                    SsaError::PhiSourceMissing {
                        block: blocks[i].entry.clone(),
                        predecessor: pred.clone(),
                        temp: temp_id.clone(),
                    }
                })?;
                phi.sources.insert(pred.clone(), source);
            }
            resolved.push(phi);
        }
        blocks[i].defs = resolved;
    }
    Ok(())
}


#[cfg(test)]
mod proptests {
    use proptest::prelude::*;

    use super::*;
    use bx_cfg::{builder, liveness, optimize};
    use bx_core::{Label as L, Listing, Opcode, TacListing};

    /// Nests `depth` levels of `if (x) { x = x + 1 } else { x = x + 1 }`
    /// around a shared variable `x`, each level reassigning it in both
    /// arms -- a worst case for phi placement, since every join at
    /// every depth needs its own phi.
    fn nested_if_listing(depth: u32) -> TacListing {
        let mut listing: TacListing = Listing::new("f", vec![]);
        let mut counter = 0u32;
        let mut fresh = |prefix: &str| {
            let l = L::new(format!("{prefix}{counter}"));
            counter += 1;
            l
        };

        listing.push_label(L::new("entry"));
        listing.push_op(Op::new(
            Opcode::Const,
            vec![Operand::Const(0)],
            Some(Dest::Temp(Temp::Named("x".into()))),
        ));

        for _ in 0..depth {
            let lelse = fresh("Lelse");
            let ljoin = fresh("Ljoin");
            listing.push_op(Op::new(
                Opcode::Jz,
                vec![Operand::Temp(Temp::Named("x".into())), Operand::Label(lelse.clone())],
                None,
            ));
            listing.push_op(Op::new(
                Opcode::Add,
                vec![Operand::Temp(Temp::Named("x".into())), Operand::Const(1)],
                Some(Dest::Temp(Temp::Named("x".into()))),
            ));
            listing.push_op(Op::new(Opcode::Jmp, vec![Operand::Label(ljoin.clone())], None));
            listing.push_label(lelse);
            listing.push_op(Op::new(
                Opcode::Add,
                vec![Operand::Temp(Temp::Named("x".into())), Operand::Const(1)],
                Some(Dest::Temp(Temp::Named("x".into()))),
            ));
            listing.push_label(ljoin);
        }
        listing.push_op(Op::new(Opcode::Ret, vec![Operand::Temp(Temp::Named("x".into()))], None));
        listing
    }

    proptest! {
        #[test]
        fn every_ssatemp_is_defined_at_most_once_across_nesting_depths(depth in 0u32..6) {
            let listing = nested_if_listing(depth);
            let mut cfg = optimize::optimize(builder::build(&listing).unwrap());
            liveness::analyze(&mut cfg);
            let ssa = construct(&cfg).unwrap();

            let mut defined = std::collections::HashSet::new();
            for block in ssa.blocks() {
                for phi in &block.defs {
                    prop_assert!(defined.insert(phi.defined.clone()));
                }
                for op in &block.ops {
                    if let Some(Dest::Temp(t)) = &op.result {
                        prop_assert!(defined.insert(t.clone()));
                    }
                }
            }
        }

        /// Every phi's source domain is exactly its block's predecessor
        /// set, one source per predecessor -- `spec.md §3` invariant 4.
        #[test]
        fn every_phi_has_one_source_per_predecessor(depth in 0u32..6) {
            let listing = nested_if_listing(depth);
            let mut cfg = optimize::optimize(builder::build(&listing).unwrap());
            liveness::analyze(&mut cfg);
            let ssa = construct(&cfg).unwrap();

            for block in ssa.blocks() {
                for phi in &block.defs {
                    prop_assert_eq!(phi.sources.len(), block.predecessors.len());
                    for pred in &block.predecessors {
                        prop_assert!(phi.sources.contains_key(pred));
                    }
                }
            }
        }
    }
}
