//! Flattens an optimized [`Cfg`] back into a [`TacListing`], arena
//! order. A block whose `fallthrough` target isn't physically next in
//! the arena gets an explicit synthesized `jmp` so the listing stays
//! well-formed on its own; this is a simpler linearization than the
//! DFS-preferring-fallthrough pass SSA deconstruction does on its way
//! back out of the pipeline.

use bx_core::{Listing, Op, Opcode, Operand, TacListing, Temp};

pub fn to_listing(cfg: &bx_core::Cfg<Temp>) -> TacListing {
    let blocks = cfg.blocks();
    let mut listing: TacListing = Listing::new(cfg.name.clone(), cfg.params.clone());

    for (i, block) in blocks.iter().enumerate() {
        listing.push_label(block.entry.clone());
        for op in &block.ops {
            listing.push_op(op.clone());
        }
        if let Some(target) = &block.fallthrough {
            let falls_through_naturally = blocks
                .get(i + 1)
                .map(|next| next.entry == *target)
                .unwrap_or(false);
            if !falls_through_naturally {
                listing.push_op(Op::new(
                    Opcode::Jmp,
                    vec![Operand::Label(target.clone())],
                    None,
                ));
            }
        }
    }
    listing
}
