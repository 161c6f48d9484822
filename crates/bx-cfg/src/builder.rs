//! Partitions a flat [`TacListing`] into a [`Cfg`] of basic blocks.

use bx_core::{BasicBlock, Cfg, CoreError, Item, Label, TacListing, Temp};

use crate::error::CfgError;

/// Splits `listing` into maximal runs of ops with a jump only in the
/// final position, then wires up successors/predecessors/fallthrough.
///
/// A block that doesn't end in a jump falls through to the next block
/// in listing order; a block ending in a conditional jump falls
/// through to the next block as its "not taken" edge. Neither case
/// inserts a synthetic `jmp` op -- `fallthrough` models the edge.
pub fn build(listing: &TacListing) -> Result<Cfg<Temp>, CfgError> {
    let entry_label = listing
        .entry_label()
        .cloned()
        .ok_or(CfgError::MissingEntryLabel)?;

    let mut blocks: Vec<BasicBlock<Temp>> = Vec::new();
    let mut current: Option<BasicBlock<Temp>> = None;

    for item in &listing.items {
        match item {
            Item::Label(label) => {
                if let Some(block) = current.take() {
                    blocks.push(block);
                }
                current = Some(BasicBlock::new(label.clone()));
            }
            Item::Op(op) => {
                let block = current.get_or_insert_with(|| {
                    // A listing that starts with an op rather than a
                    // label gets a synthetic entry -- shouldn't happen
                    // given the lowerer always opens with one, but it
                    // keeps this builder robust for hand-written TAC.
                    BasicBlock::new(entry_label.clone())
                });
                block.ops.push(op.clone());
                if op.opcode.is_unconditional() {
                    blocks.push(current.take().unwrap());
                }
            }
        }
    }
    if let Some(block) = current.take() {
        blocks.push(block);
    }

    if let Some(first) = blocks.first_mut() {
        first.initial = true;
    }

    // Wire successors/fallthrough in a second pass, now that every
    // block's final position in the arena is known.
    let labels: Vec<Label> = blocks.iter().map(|b| b.entry.clone()).collect();
    let label_set: std::collections::HashSet<&Label> = labels.iter().collect();

    for i in 0..blocks.len() {
        let next_label = labels.get(i + 1).cloned();
        let terminator = blocks[i].terminator().cloned();

        match &terminator {
            Some(op) if op.opcode.is_unconditional() => {
                if let Some(target) = op.jump_target() {
                    if !label_set.contains(target) {
                        return Err(CoreError::DanglingLabel(target.clone()).into());
                    }
                    blocks[i].successors.insert(target.clone());
                }
                // `ret` carries no label and has no successor.
            }
            Some(op) => {
                // Conditional jump: taken edge plus fallthrough.
                if let Some(target) = op.jump_target() {
                    if !label_set.contains(target) {
                        return Err(CoreError::DanglingLabel(target.clone()).into());
                    }
                    blocks[i].successors.insert(target.clone());
                }
                if let Some(next) = &next_label {
                    blocks[i].fallthrough = Some(next.clone());
                    blocks[i].successors.insert(next.clone());
                }
            }
            None => {
                if let Some(next) = &next_label {
                    blocks[i].fallthrough = Some(next.clone());
                    blocks[i].successors.insert(next.clone());
                }
            }
        }
    }

    // Predecessors are the transpose of successors.
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

    Ok(Cfg::new(
        listing.name.clone(),
        listing.params.clone(),
        entry_label,
        blocks,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bx_core::{Dest, Listing, Opcode, Operand};

    fn op(opcode: Opcode, args: Vec<Operand<Temp>>, result: Option<Dest<Temp>>) -> bx_core::Op<Temp> {
        bx_core::Op::new(opcode, args, result)
    }

    #[test]
    fn straight_line_listing_is_one_block() {
        let mut listing: TacListing = Listing::new("f", vec![]);
        listing.push_label(Label::new("f"));
        listing.push_op(op(
            Opcode::Const,
            vec![Operand::Const(0)],
            Some(Dest::Temp(Temp::Counter(0))),
        ));
        listing.push_op(op(Opcode::Ret, vec![], None));
        let cfg = build(&listing).unwrap();
        assert_eq!(cfg.len(), 1);
        assert!(cfg.entry_block().initial);
        assert!(cfg.entry_block().successors.is_empty());
    }

    #[test]
    fn conditional_jump_gets_both_successors() {
        let mut listing: TacListing = Listing::new("f", vec![]);
        listing.push_label(Label::new("entry"));
        listing.push_op(op(
            Opcode::Jz,
            vec![
                Operand::Temp(Temp::Counter(0)),
                Operand::Label(Label::new("then")),
            ],
            None,
        ));
        listing.push_label(Label::new("else"));
        listing.push_op(op(Opcode::Ret, vec![], None));
        listing.push_label(Label::new("then"));
        listing.push_op(op(Opcode::Ret, vec![], None));

        let cfg = build(&listing).unwrap();
        let entry = cfg.block(&Label::new("entry")).unwrap();
        assert_eq!(entry.successors.len(), 2);
        assert_eq!(entry.fallthrough, Some(Label::new("else")));
        assert!(cfg
            .block(&Label::new("else"))
            .unwrap()
            .predecessors
            .contains(&Label::new("entry")));
    }

    #[test]
    fn dangling_jump_target_is_rejected() {
        let mut listing: TacListing = Listing::new("f", vec![]);
        listing.push_label(Label::new("entry"));
        listing.push_op(op(
            Opcode::Jmp,
            vec![Operand::Label(Label::new("nowhere"))],
            None,
        ));
        let err = build(&listing).unwrap_err();
        assert!(matches!(err, CfgError::Core(CoreError::DanglingLabel(_))));
    }

    #[test]
    fn fallthrough_without_explicit_jump_is_modeled() {
        let mut listing: TacListing = Listing::new("f", vec![]);
        listing.push_label(Label::new("a"));
        listing.push_op(op(
            Opcode::Const,
            vec![Operand::Const(1)],
            Some(Dest::Temp(Temp::Counter(0))),
        ));
        listing.push_label(Label::new("b"));
        listing.push_op(op(Opcode::Ret, vec![], None));

        let cfg = build(&listing).unwrap();
        let a = cfg.block(&Label::new("a")).unwrap();
        assert_eq!(a.fallthrough, Some(Label::new("b")));
        assert!(a.successors.contains(&Label::new("b")));
    }
}
