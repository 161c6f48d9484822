//! Three SSA-local passes, iterated to a fixpoint: copy propagation,
//! phi-rename simplification, and null-choice (self-loop) phi
//! elimination. Running this to fixpoint and then once more changes
//! nothing -- each pass either removes an op/phi or leaves the
//! procedure untouched.

use indexmap::IndexSet;

use bx_core::{Dest, Opcode, Operand, SSATemp, SsaCfg};

fn rename_in_set(set: &mut IndexSet<SSATemp>, old: &SSATemp, new: &SSATemp) {
    if set.shift_remove(old) {
        set.insert(new.clone());
    }
}

/// Runs copy propagation, rename simplification and null-choice
/// elimination in a loop until a full round makes no change.
pub fn optimize(mut cfg: SsaCfg) -> SsaCfg {
    let span = tracing::debug_span!("ssa_optimize", proc = %cfg.name);
    let _enter = span.enter();

    let mut iterations = 0u32;
    loop {
        iterations += 1;
        let before = signature(&cfg);
        propagate_copies(&mut cfg);
        simplify_phis(&mut cfg);
        let after = signature(&cfg);
        tracing::debug!(iterations, ?before, ?after, "fixpoint pass");
        if after == before {
            if iterations > 20 {
                tracing::warn!(proc = %cfg.name, iterations, "ssa optimize took an unusually long time to reach a fixpoint");
            }
            return cfg;
        }
    }
}

/// A cheap "did anything change" fingerprint: total op count plus
/// total phi count. Both passes only ever remove items, so equality
/// here is exactly the fixpoint condition spec.md §4.4 describes.
fn signature(cfg: &SsaCfg) -> (usize, usize) {
    let ops: usize = cfg.blocks().iter().map(|b| b.ops.len()).sum();
    let phis: usize = cfg.blocks().iter().map(|b| b.defs.len()).sum();
    (ops, phis)
}

/// Within each block, rewrites every `t2 = copy t1` (t1 not a global)
/// into a rename of `t2` to `t1` across the whole procedure, then
/// drops the copy. Global-valued copies (`t = copy @g`) are left in
/// place -- globals never get an SSA identity to rename into.
fn propagate_copies(cfg: &mut SsaCfg) {
    loop {
        let rename = cfg.blocks().iter().find_map(|block| {
            block.ops.iter().find_map(|op| {
                if op.opcode != Opcode::Copy {
                    return None;
                }
                let Some(Dest::Temp(dest)) = &op.result else {
                    return None;
                };
                match op.args.as_slice() {
                    [Operand::Temp(src)] => Some((dest.clone(), src.clone())),
                    _ => None,
                }
            })
        });
        let Some((old, new)) = rename else { break };
        rename_temp(cfg, &old, &new);
        drop_copy_of(cfg, &old);
    }
}

fn drop_copy_of(cfg: &mut SsaCfg, defined: &SSATemp) {
    for block in cfg.blocks_mut() {
        block.ops.retain(|op| {
            !(op.opcode == Opcode::Copy && op.result.as_ref() == Some(&Dest::Temp(defined.clone())))
        });
    }
}

/// Iterates phi-rename simplification (a phi whose distinct source
/// ids collapse to one is a pure rename) and null-choice elimination
/// (every source already equals the phi's own value) until neither
/// finds anything new in a full pass.
fn simplify_phis(cfg: &mut SsaCfg) {
    loop {
        let renames: Vec<(SSATemp, SSATemp)> = cfg
            .blocks()
            .iter()
            .flat_map(|b| &b.defs)
            .filter_map(find_rename)
            .collect();

        let mut changed = false;
        for (old, new) in renames {
            rename_temp(cfg, &old, &new);
            changed = true;
        }
        if eliminate_self_loops(cfg) {
            changed = true;
        }
        if !changed {
            break;
        }
    }
}

/// A phi simplifies to a rename when its distinct source *ids*
/// collapse to one, per the conservative reading spec.md §9 adopts:
/// the phi's own defined version must not be among the contributing
/// ids either (a source that happens to equal `defined` is a
/// self-reference, not real information) -- see [`bx_core::Phi::distinct_source_ids`].
fn find_rename(phi: &bx_core::Phi) -> Option<(SSATemp, SSATemp)> {
    let distinct = phi.distinct_source_ids();
    match distinct.as_slice() {
        [only_id] => {
            let source = phi.sources.values().find(|src| src.id == **only_id)?;
            Some((phi.defined.clone(), source.clone()))
        }
        _ => None,
    }
}

/// Drops every phi whose every source equals its own `defined` value
/// -- a join with nothing left to choose between. Returns whether any
/// phi was actually removed.
fn eliminate_self_loops(cfg: &mut SsaCfg) -> bool {
    let mut removed = false;
    for block in cfg.blocks_mut() {
        let before = block.defs.len();
        block.defs.retain(|phi| !phi.is_self_loop());
        removed |= block.defs.len() != before;
    }
    removed
}

/// Renames `old` to `new` everywhere: phi definitions and sources, and
/// every op's args/result, across every block in the procedure.
fn rename_temp(cfg: &mut SsaCfg, old: &SSATemp, new: &SSATemp) {
    for block in cfg.blocks_mut() {
        for phi in &mut block.defs {
            if phi.defined == *old {
                phi.defined = new.clone();
            }
            for src in phi.sources.values_mut() {
                if src == old {
                    *src = new.clone();
                }
            }
        }
        for op in &mut block.ops {
            for arg in &mut op.args {
                if let Operand::Temp(t) = arg {
                    if t == old {
                        *t = new.clone();
                    }
                }
            }
            if let Some(Dest::Temp(t)) = &mut op.result {
                if t == old {
                    *t = new.clone();
                }
            }
            rename_in_set(&mut op.live_in, old, new);
            rename_in_set(&mut op.live_out, old, new);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bx_cfg::{builder, liveness, optimize as cfg_optimize};
    use bx_core::{Label, Listing, Op, TacListing, Temp};

    fn to_ssa(listing: &TacListing) -> SsaCfg {
        let mut cfg = cfg_optimize::optimize(builder::build(listing).unwrap());
        liveness::analyze(&mut cfg);
        crate::generator::construct(&cfg).unwrap()
    }

    #[test]
    fn copy_propagation_drops_the_copy_and_renames_uses() {
        let mut listing: TacListing = Listing::new("f", vec![]);
        listing.push_label(Label::new("f"));
        listing.push_op(Op::new(
            Opcode::Const,
            vec![Operand::Const(1)],
            Some(Dest::Temp(Temp::Counter(0))),
        ));
        listing.push_op(Op::new(
            Opcode::Copy,
            vec![Operand::Temp(Temp::Counter(0))],
            Some(Dest::Temp(Temp::Counter(1))),
        ));
        listing.push_op(Op::new(Opcode::Ret, vec![Operand::Temp(Temp::Counter(1))], None));

        let ssa = to_ssa(&listing);
        let optimized = optimize(ssa);
        let block = optimized.entry_block();
        assert!(!block.ops.iter().any(|op| op.opcode == Opcode::Copy));
        let ret = block.ops.iter().find(|op| op.opcode == Opcode::Ret).unwrap();
        assert!(matches!(&ret.args[0], Operand::Temp(t) if t.id == Temp::Counter(0)));
    }

    #[test]
    fn if_else_join_phi_survives_when_sources_differ() {
        let mut listing: TacListing = Listing::new("f", vec![]);
        listing.push_label(Label::new("entry"));
        listing.push_op(Op::new(
            Opcode::Const,
            vec![Operand::Const(0)],
            Some(Dest::Temp(Temp::Named("x".into()))),
        ));
        listing.push_op(Op::new(
            Opcode::Jz,
            vec![Operand::Temp(Temp::Named("x".into())), Operand::Label(Label::new("Lelse"))],
            None,
        ));
        listing.push_label(Label::new("Lthen"));
        listing.push_op(Op::new(
            Opcode::Const,
            vec![Operand::Const(1)],
            Some(Dest::Temp(Temp::Named("x".into()))),
        ));
        listing.push_op(Op::new(Opcode::Jmp, vec![Operand::Label(Label::new("Ljoin"))], None));
        listing.push_label(Label::new("Lelse"));
        listing.push_op(Op::new(
            Opcode::Const,
            vec![Operand::Const(2)],
            Some(Dest::Temp(Temp::Named("x".into()))),
        ));
        listing.push_label(Label::new("Ljoin"));
        listing.push_op(Op::new(Opcode::Ret, vec![Operand::Temp(Temp::Named("x".into()))], None));

        let ssa = to_ssa(&listing);
        let optimized = optimize(ssa);
        let join = optimized.block(&Label::new("Ljoin")).unwrap();
        assert_eq!(join.defs.len(), 1);
    }

    #[test]
    fn fixpoint_is_idempotent() {
        let mut listing: TacListing = Listing::new("f", vec![]);
        listing.push_label(Label::new("entry"));
        listing.push_op(Op::new(
            Opcode::Const,
            vec![Operand::Const(0)],
            Some(Dest::Temp(Temp::Named("i".into()))),
        ));
        listing.push_label(Label::new("head"));
        listing.push_op(Op::new(
            Opcode::Jz,
            vec![Operand::Temp(Temp::Named("i".into())), Operand::Label(Label::new("exit"))],
            None,
        ));
        listing.push_label(Label::new("body"));
        listing.push_op(Op::new(
            Opcode::Sub,
            vec![Operand::Temp(Temp::Named("i".into())), Operand::Const(1)],
            Some(Dest::Temp(Temp::Named("i".into()))),
        ));
        listing.push_op(Op::new(Opcode::Jmp, vec![Operand::Label(Label::new("head"))], None));
        listing.push_label(Label::new("exit"));
        listing.push_op(Op::new(Opcode::Ret, vec![], None));

        let ssa = to_ssa(&listing);
        let once = optimize(ssa);
        let twice = optimize(once.clone());
        assert_eq!(signature(&once), signature(&twice));
    }
}
