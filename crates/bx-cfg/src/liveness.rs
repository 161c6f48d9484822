//! Backward liveness analysis: populates `live_in`/`live_out` on every
//! op and `live_in` on every block, to a fixpoint over the CFG's
//! successor edges.
//!
//! This is deliberately decoupled from [`crate::optimize::optimize`]
//! -- liveness is a read of the finished CFG shape, not a
//! transformation of it, so it runs as a separate pass once block
//! structure has stabilized.

use std::collections::HashMap;

use bx_core::{Cfg, Label, Temp};
use indexmap::IndexSet;

pub fn analyze(cfg: &mut Cfg<Temp>) {
    let span = tracing::debug_span!("liveness_analyze", proc = %cfg.name);
    let _enter = span.enter();

    let labels: Vec<Label> = cfg.blocks().iter().map(|b| b.entry.clone()).collect();
    let mut block_live_in: HashMap<Label, IndexSet<Temp>> =
        labels.iter().map(|l| (l.clone(), IndexSet::new())).collect();

    let mut iterations = 0u32;
    loop {
        iterations += 1;
        let mut changed = false;
        for label in labels.iter().rev() {
            let block = cfg.block(label).expect("label came from this cfg's blocks");
            let mut live: IndexSet<Temp> = IndexSet::new();
            for succ in &block.successors {
                live.extend(block_live_in[succ].iter().cloned());
            }
            for op in block.ops.iter().rev() {
                if let Some(d) = op.defined_temp() {
                    live.shift_remove(d);
                }
                for u in op.used_temps() {
                    live.insert(u.clone());
                }
            }
            let entry = block_live_in.get_mut(label).unwrap();
            if *entry != live {
                *entry = live;
                changed = true;
            }
        }
        if !changed {
            if iterations > 20 {
                tracing::warn!(proc = %cfg.name, iterations, "liveness fixpoint took an unusually long time to converge");
            }
            break;
        }
    }
    tracing::debug!(iterations, "backward liveness fixpoint reached");

    for label in &labels {
        let mut live: IndexSet<Temp> = IndexSet::new();
        {
            let block = cfg.block(label).unwrap();
            for succ in &block.successors {
                live.extend(block_live_in[succ].iter().cloned());
            }
        }

        let op_count = cfg.block(label).unwrap().ops.len();
        let mut live_ins = Vec::with_capacity(op_count);
        let mut live_outs = Vec::with_capacity(op_count);
        {
            let block = cfg.block(label).unwrap();
            for op in block.ops.iter().rev() {
                live_outs.push(live.clone());
                if let Some(d) = op.defined_temp() {
                    live.shift_remove(d);
                }
                for u in op.used_temps() {
                    live.insert(u.clone());
                }
                live_ins.push(live.clone());
            }
        }
        live_ins.reverse();
        live_outs.reverse();

        let block_live_in_value = live_ins.first().cloned().unwrap_or_else(|| live.clone());

        let block = cfg.block_mut(label).unwrap();
        for (op, (lin, lout)) in block.ops.iter_mut().zip(live_ins.into_iter().zip(live_outs)) {
            op.live_in = lin;
            op.live_out = lout;
        }
        block.live_in = block_live_in_value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bx_core::{BasicBlock, Dest, Op, Opcode, Operand};

    #[test]
    fn temp_dead_after_its_last_use_is_not_live_out_of_block() {
        let mut entry = BasicBlock::new(Label::new("entry"));
        entry.initial = true;
        entry.ops.push(Op::new(
            Opcode::Const,
            vec![Operand::Const(1)],
            Some(Dest::Temp(Temp::Counter(0))),
        ));
        entry.ops.push(Op::new(
            Opcode::Ret,
            vec![Operand::Temp(Temp::Counter(0))],
            None,
        ));
        let mut cfg = Cfg::new("f".into(), vec![], Label::new("entry"), vec![entry]);
        analyze(&mut cfg);
        let block = cfg.block(&Label::new("entry")).unwrap();
        assert!(block.live_in.is_empty());
        assert!(block.ops[0].live_out.contains(&Temp::Counter(0)));
        assert!(block.ops[1].live_out.is_empty());
    }

    #[test]
    fn loop_back_edge_keeps_counter_live_across_iterations() {
        let mut head = BasicBlock::new(Label::new("head"));
        head.initial = true;
        head.ops.push(Op::new(
            Opcode::Jnz,
            vec![
                Operand::Temp(Temp::Counter(0)),
                Operand::Label(Label::new("body")),
            ],
            None,
        ));
        head.ops.push(Op::new(
            Opcode::Jmp,
            vec![Operand::Label(Label::new("exit"))],
            None,
        ));
        head.successors.insert(Label::new("body"));
        head.successors.insert(Label::new("exit"));

        let mut body = BasicBlock::new(Label::new("body"));
        body.predecessors.insert(Label::new("head"));
        body.ops.push(Op::new(
            Opcode::Sub,
            vec![Operand::Temp(Temp::Counter(0)), Operand::Const(1)],
            Some(Dest::Temp(Temp::Counter(0))),
        ));
        body.ops.push(Op::new(
            Opcode::Jmp,
            vec![Operand::Label(Label::new("head"))],
            None,
        ));
        body.successors.insert(Label::new("head"));

        let mut exit = BasicBlock::new(Label::new("exit"));
        exit.predecessors.insert(Label::new("head"));
        exit.ops.push(Op::new(Opcode::Ret, vec![], None));

        let mut cfg = Cfg::new(
            "f".into(),
            vec![],
            Label::new("head"),
            vec![head, body, exit],
        );
        cfg.block_mut(&Label::new("head"))
            .unwrap()
            .predecessors
            .insert(Label::new("body"));
        analyze(&mut cfg);
        assert!(cfg
            .block(&Label::new("head"))
            .unwrap()
            .live_in
            .contains(&Temp::Counter(0)));
        assert!(cfg
            .block(&Label::new("body"))
            .unwrap()
            .live_in
            .contains(&Temp::Counter(0)));
    }
}
