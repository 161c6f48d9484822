//! Block-level CFG optimization, iterated to a fixpoint: unreachable
//! block elimination, jump threading through pure-jump blocks,
//! conditional-to-unconditional collapse, and single-pred/single-succ
//! block coalescing. Running this twice on an already-optimized CFG
//! is a no-op.

use std::collections::HashSet;

use bx_core::{BasicBlock, Cfg, Dest, Label, Op, Opcode, Operand, Temp};

pub fn optimize(mut cfg: Cfg<Temp>) -> Cfg<Temp> {
    let span = tracing::debug_span!("cfg_optimize", proc = %cfg.name);
    let _enter = span.enter();

    let mut iterations = 0u32;
    loop {
        iterations += 1;
        let before = cfg.blocks().len();
        let before_ops: usize = cfg.blocks().iter().map(|b| b.ops.len()).sum();

        cfg = eliminate_unreachable(cfg);
        cfg = thread_jumps(cfg);
        cfg = collapse_conditional_to_unconditional(cfg);
        cfg = coalesce_chains(cfg);
        cfg = rebuild_predecessors(cfg);

        let after = cfg.blocks().len();
        let after_ops: usize = cfg.blocks().iter().map(|b| b.ops.len()).sum();
        tracing::debug!(iterations, before, after, before_ops, after_ops, "fixpoint pass");
        if after == before && after_ops == before_ops {
            if iterations > 20 {
                tracing::warn!(proc = %cfg.name, iterations, "cfg optimize took an unusually long time to reach a fixpoint");
            }
            return cfg;
        }
    }
}

/// Drops every block not reachable from the entry by successor edges,
/// and prunes dangling predecessor entries left behind.
fn eliminate_unreachable(cfg: Cfg<Temp>) -> Cfg<Temp> {
    let mut reachable: HashSet<Label> = HashSet::new();
    let mut stack = vec![cfg.entry.clone()];
    while let Some(label) = stack.pop() {
        if !reachable.insert(label.clone()) {
            continue;
        }
        if let Some(block) = cfg.block(&label) {
            stack.extend(block.successors.iter().cloned());
        }
    }

    let entry = cfg.entry.clone();
    let name = cfg.name.clone();
    let params = cfg.params.clone();
    let mut blocks: Vec<BasicBlock<Temp>> = cfg
        .into_blocks()
        .into_iter()
        .filter(|b| reachable.contains(&b.entry))
        .collect();
    for block in &mut blocks {
        block.predecessors.retain(|p| reachable.contains(p));
    }
    Cfg::new(name, params, entry, blocks)
}

/// Redirects any edge landing on a pure-jump block straight to that
/// block's own target, repeating until no predecessor still points at
/// a pure-jump block it could skip. A pure-jump block that targets
/// itself is left alone (it's either dead after unreachable-elimination
/// drops its sole remaining predecessor, or a deliberate infinite loop).
fn thread_jumps(cfg: Cfg<Temp>) -> Cfg<Temp> {
    let entry = cfg.entry.clone();
    let name = cfg.name.clone();
    let params = cfg.params.clone();

    let redirects: Vec<(Label, Label)> = cfg
        .blocks()
        .iter()
        .filter_map(|b| {
            if b.is_pure_jump() && b.ops.len() == 1 {
                let target = b.ops[0].jump_target()?;
                if *target != b.entry {
                    return Some((b.entry.clone(), target.clone()));
                }
            }
            None
        })
        .collect();

    if redirects.is_empty() {
        return cfg;
    }
    let redirect_map: std::collections::HashMap<Label, Label> = redirects.into_iter().collect();

    let mut blocks = cfg.into_blocks();
    for block in &mut blocks {
        retarget_jumps(block, &redirect_map);
    }
    Cfg::new(name, params, entry, blocks)
}

fn retarget_jumps(block: &mut BasicBlock<Temp>, redirect_map: &std::collections::HashMap<Label, Label>) {
    let mut changed = false;
    for op in &mut block.ops {
        if !op.opcode.carries_label() {
            continue;
        }
        for arg in &mut op.args {
            if let Operand::Label(l) = arg {
                if let Some(retarget) = redirect_map.get(l) {
                    *l = retarget.clone();
                    changed = true;
                }
            }
        }
    }
    if let Some(ft) = &block.fallthrough {
        if let Some(retarget) = redirect_map.get(ft) {
            block.fallthrough = Some(retarget.clone());
            changed = true;
        }
    }
    if changed {
        let mut new_succ = indexmap::IndexSet::new();
        for s in &block.successors {
            new_succ.insert(redirect_map.get(s).cloned().unwrap_or_else(|| s.clone()));
        }
        block.successors = new_succ;
    }
}

/// If a conditional jump's taken target and its fallthrough are the
/// same label, the branch decides nothing -- replace it with a plain
/// `jmp`.
fn collapse_conditional_to_unconditional(cfg: Cfg<Temp>) -> Cfg<Temp> {
    let entry = cfg.entry.clone();
    let name = cfg.name.clone();
    let params = cfg.params.clone();
    let mut blocks = cfg.into_blocks();

    for block in &mut blocks {
        let collapse_target = match (block.ops.last(), &block.fallthrough) {
            (Some(op), Some(ft)) if op.opcode.is_conditional_jump() => {
                op.jump_target().filter(|t| *t == ft).cloned()
            }
            _ => None,
        };
        if let Some(target) = collapse_target {
            block.ops.pop();
            block.ops.push(Op::new(
                Opcode::Jmp,
                vec![Operand::Label(target.clone())],
                None::<Dest<Temp>>,
            ));
            block.fallthrough = None;
            block.successors = indexmap::IndexSet::from([target]);
        }
    }
    Cfg::new(name, params, entry, blocks)
}

/// Merges `b` into its single predecessor `a` whenever `a`'s only
/// successor is `b` and `b`'s only predecessor is `a`, dropping `a`'s
/// terminator jump and splicing `b`'s ops and edges directly in.
fn coalesce_chains(cfg: Cfg<Temp>) -> Cfg<Temp> {
    let entry = cfg.entry.clone();
    let name = cfg.name.clone();
    let params = cfg.params.clone();
    let mut blocks = cfg.into_blocks();

    loop {
        let merge = blocks.iter().enumerate().find_map(|(i, a)| {
            if a.successors.len() != 1 {
                return None;
            }
            let b_label = a.successors.iter().next().cloned().unwrap();
            if b_label == a.entry {
                return None; // self-loop, not a chain
            }
            let j = blocks.iter().position(|b| b.entry == b_label)?;
            let b = &blocks[j];
            if b.predecessors.len() == 1 && !b.initial {
                Some((i, j))
            } else {
                None
            }
        });

        let Some((i, j)) = merge else { break };
        let b = blocks.remove(j);
        let b_label = b.entry.clone();
        let a_index = if j < i { i - 1 } else { i };
        let a_label = blocks[a_index].entry.clone();
        let a = &mut blocks[a_index];
        if let Some(last) = a.ops.last() {
            if last.opcode.is_jump() {
                a.ops.pop();
            }
        }
        a.ops.extend(b.ops);
        a.successors = b.successors;
        a.fallthrough = b.fallthrough;

        for other in &mut blocks {
            if other.entry == a_label {
                continue;
            }
            if other.predecessors.shift_remove(&b_label) {
                other.predecessors.insert(a_label.clone());
            }
        }
    }

    Cfg::new(name, params, entry, blocks)
}

/// Recomputes every block's `predecessors` as the transpose of
/// `successors`. Jump threading and conditional collapse rewrite
/// successor edges in place without touching the far end's
/// predecessor set, so a single authoritative rebuild after each
/// fixpoint iteration is cheaper and less error-prone than teaching
/// every mutating pass to patch both sides of each edge it touches.
fn rebuild_predecessors(cfg: Cfg<Temp>) -> Cfg<Temp> {
    let entry = cfg.entry.clone();
    let name = cfg.name.clone();
    let params = cfg.params.clone();
    let mut blocks = cfg.into_blocks();

    for block in &mut blocks {
        block.predecessors.clear();
    }
    let successors_snapshot: Vec<(Label, Vec<Label>)> = blocks
        .iter()
        .map(|b| (b.entry.clone(), b.successors.iter().cloned().collect()))
        .collect();
    for (from, succs) in successors_snapshot {
        for to in succs {
            if let Some(block) = blocks.iter_mut().find(|b| b.entry == to) {
                block.predecessors.insert(from.clone());
            }
        }
    }

    Cfg::new(name, params, entry, blocks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bx_core::{Listing, TacListing};

    fn ret_only(label: &str) -> BasicBlock<Temp> {
        let mut b = BasicBlock::new(Label::new(label));
        b.ops.push(Op::new(Opcode::Ret, vec![], None));
        b
    }

    #[test]
    fn unreachable_block_is_dropped() {
        let mut e = BasicBlock::new(Label::new("entry"));
        e.initial = true;
        e.ops.push(Op::new(
            Opcode::Jmp,
            vec![Operand::Label(Label::new("live"))],
            None,
        ));
        e.successors.insert(Label::new("live"));
        let live = ret_only("live");
        let dead = ret_only("dead");
        let cfg = Cfg::new("f".into(), vec![], Label::new("entry"), vec![e, live, dead]);
        let optimized = optimize(cfg);
        assert!(optimized.block(&Label::new("dead")).is_none());
        assert!(optimized.block(&Label::new("live")).is_some());
    }

    #[test]
    fn pure_jump_chain_is_threaded() {
        let mut e = BasicBlock::new(Label::new("entry"));
        e.initial = true;
        e.ops.push(Op::new(
            Opcode::Jmp,
            vec![Operand::Label(Label::new("mid"))],
            None,
        ));
        e.successors.insert(Label::new("mid"));

        let mut mid = BasicBlock::new(Label::new("mid"));
        mid.ops.push(Op::new(
            Opcode::Jmp,
            vec![Operand::Label(Label::new("end"))],
            None,
        ));
        mid.successors.insert(Label::new("end"));

        let end = ret_only("end");
        let cfg = Cfg::new("f".into(), vec![], Label::new("entry"), vec![e, mid, end]);
        let optimized = optimize(cfg);
        // `mid` is pure jump with a single predecessor -- threading
        // plus unreachable-elimination collapse it away entirely, and
        // coalescing folds entry straight into end.
        assert_eq!(optimized.len(), 1);
    }

    #[test]
    fn jump_threading_keeps_predecessors_symmetric_with_successors() {
        // entry -jz-> thread (fallthrough: other); thread is a pure
        // jump to "end". Threading must redirect entry's conditional
        // target to "end" directly *and* update end's predecessors,
        // not just entry's successors.
        let mut e = BasicBlock::new(Label::new("entry"));
        e.initial = true;
        e.ops.push(Op::new(
            Opcode::Jz,
            vec![
                Operand::Temp(Temp::Counter(0)),
                Operand::Label(Label::new("thread")),
            ],
            None,
        ));
        e.successors.insert(Label::new("thread"));
        e.successors.insert(Label::new("other"));
        e.fallthrough = Some(Label::new("other"));

        let mut thread = BasicBlock::new(Label::new("thread"));
        thread.ops.push(Op::new(
            Opcode::Jmp,
            vec![Operand::Label(Label::new("end"))],
            None,
        ));
        thread.successors.insert(Label::new("end"));
        thread.predecessors.insert(Label::new("entry"));

        let mut other = ret_only("other");
        other.predecessors.insert(Label::new("entry"));

        let mut end = ret_only("end");
        end.predecessors.insert(Label::new("thread"));

        let cfg = Cfg::new(
            "f".into(),
            vec![],
            Label::new("entry"),
            vec![e, thread, other, end],
        );
        let optimized = optimize(cfg);

        for block in optimized.blocks() {
            for succ in &block.successors {
                let target = optimized.block(succ).expect("successor block exists");
                assert!(
                    target.predecessors.contains(&block.entry),
                    "{} -> {} missing reverse predecessor edge",
                    block.entry,
                    succ
                );
            }
            for pred in &block.predecessors {
                let source = optimized.block(pred).expect("predecessor block exists");
                assert!(
                    source.successors.contains(&block.entry),
                    "{} <- {} missing forward successor edge",
                    block.entry,
                    pred
                );
            }
        }
    }

    #[test]
    fn idempotent_on_an_already_optimized_cfg() {
        let mut listing: TacListing = Listing::new("f", vec![]);
        listing.push_label(Label::new("f"));
        listing.push_op(Op::new(
            Opcode::Const,
            vec![Operand::Const(0)],
            Some(Dest::Temp(Temp::Counter(0))),
        ));
        listing.push_op(Op::new(Opcode::Ret, vec![], None));
        let cfg = crate::builder::build(&listing).unwrap();
        let once = optimize(cfg);
        let twice = optimize(once.clone());
        assert_eq!(once.len(), twice.len());
        let ops_once: usize = once.blocks().iter().map(|b| b.ops.len()).sum();
        let ops_twice: usize = twice.blocks().iter().map(|b| b.ops.len()).sum();
        assert_eq!(ops_once, ops_twice);
    }
}
