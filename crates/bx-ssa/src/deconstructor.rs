//! SSA deconstruction: phi elimination via per-predecessor parallel-copy
//! insertion (with cycle breakup -- the one place this pipeline
//! intentionally diverges from the reference implementation, which
//! inserts the copies but never detects the read/write conflicts a
//! swap-like pattern produces), renaming every surviving SSA temp into
//! a fresh plain [`Temp`], depth-first serialization preferring the
//! fallthrough edge, and cleanup of the jumps/labels serialization
//! leaves redundant.

use std::collections::{HashMap, HashSet};

use indexmap::{IndexMap, IndexSet};

use bx_core::{Dest, Item, Label, Listing, Op, Opcode, Operand, SSATemp, SsaCfg, TacListing, Temp};

/// Deconstructs `ssa` into a flat [`TacListing`] ready for the
/// register allocator.
pub fn deconstruct(ssa: &SsaCfg) -> TacListing {
    let span = tracing::debug_span!("ssa_deconstruct", proc = %ssa.name);
    let _enter = span.enter();

    let copies_by_predecessor = collect_transfers(ssa);

    let mut dummy_counter: u32 = 0;
    let mut fresh_dummy = || {
        let t = SSATemp::new(Temp::Named(format!(".dummy.{dummy_counter}")), 0);
        dummy_counter += 1;
        t
    };

    let mut mapper = TempMapper::default();
    let mut blocks: IndexMap<Label, PlainBlock> = IndexMap::new();

    for block in ssa.blocks() {
        let transfers = copies_by_predecessor
            .get(&block.entry)
            .cloned()
            .unwrap_or_default();
        let resolved = resolve_edge(&transfers, &mut fresh_dummy);

        // Transfers belong "on the edge p -> b": spliced into p's own
        // op list, immediately before whatever terminates it (a block
        // with no terminating jump -- a pure fallthrough -- just gets
        // them appended at the end).
        let split = block
            .ops
            .iter()
            .position(|op| op.opcode.is_jump())
            .unwrap_or(block.ops.len());

        let mut ops: Vec<Op<Temp>> = Vec::with_capacity(block.ops.len() + resolved.len());
        for op in &block.ops[..split] {
            ops.push(map_op(op, &mut mapper));
        }
        for (dest, src) in &resolved {
            ops.push(Op::new(
                Opcode::Copy,
                vec![Operand::Temp(mapper.map(src))],
                Some(Dest::Temp(mapper.map(dest))),
            ));
        }
        for op in &block.ops[split..] {
            ops.push(map_op(op, &mut mapper));
        }

        blocks.insert(
            block.entry.clone(),
            PlainBlock {
                ops,
                successors: block.successors.clone(),
                fallthrough: block.fallthrough.clone(),
            },
        );
    }

    tracing::debug!(dummies = dummy_counter, "resolved parallel copies on all edges");

    let listing = serialize(ssa, &blocks);
    cleanup(listing)
}

struct PlainBlock {
    ops: Vec<Op<Temp>>,
    successors: IndexSet<Label>,
    fallthrough: Option<Label>,
}

/// `T(p) = { (defined_i, sources_i[p.entry]) : phi_i in b.defs }` for
/// every block `b`, keyed by the predecessor label `p` the transfer
/// must run on the edge of -- matching every phi in every block, not
/// just one block at a time, since a single predecessor can feed phis
/// in more than one block along different edges.
fn collect_transfers(ssa: &SsaCfg) -> HashMap<Label, Vec<(SSATemp, SSATemp)>> {
    let mut out: HashMap<Label, Vec<(SSATemp, SSATemp)>> = HashMap::new();
    for block in ssa.blocks() {
        for phi in &block.defs {
            for (pred, src) in &phi.sources {
                out.entry(pred.clone())
                    .or_default()
                    .push((phi.defined.clone(), src.clone()));
            }
        }
    }
    out
}

/// Resolves one edge's transfer set into a sequence of plain copies
/// safe to execute one after another. Scans transfers in order,
/// tracking which SSA temps have already been written (as a
/// destination) or read (as a source) earlier in the scan; a source
/// whose original value was already clobbered by an earlier transfer
/// -- or a destination already consumed as someone else's source --
/// gets a fresh dummy temp holding the pre-transfer snapshot, with one
/// dummy introduced per conflict (a single dummy correctly resolves a
/// simple 2-cycle; a longer cycle or chain may need more than one).
fn resolve_edge(
    transfers: &[(SSATemp, SSATemp)],
    fresh: &mut impl FnMut() -> SSATemp,
) -> Vec<(SSATemp, SSATemp)> {
    let mut written: HashSet<SSATemp> = HashSet::new();
    let mut read: HashSet<SSATemp> = HashSet::new();
    let mut dummy_for: HashMap<SSATemp, SSATemp> = HashMap::new();
    let mut preamble: Vec<(SSATemp, SSATemp)> = Vec::new();
    let mut output: Vec<(SSATemp, SSATemp)> = Vec::new();

    for (dest, src) in transfers {
        let conflict = written.contains(src) || read.contains(dest);
        let resolved_src = if conflict {
            dummy_for
                .entry(src.clone())
                .or_insert_with(|| {
                    let dummy = fresh();
                    preamble.push((dummy.clone(), src.clone()));
                    dummy
                })
                .clone()
        } else {
            src.clone()
        };
        output.push((dest.clone(), resolved_src));
        written.insert(dest.clone());
        read.insert(src.clone());
    }

    preamble.into_iter().chain(output).collect()
}

/// Memoized `SSATemp -> Temp` mapping. Parameters (a string id at
/// version 0) keep their name so the calling convention still lines
/// up after deconstruction; everything else gets a fresh integer id.
/// Pre-coloured register-constraint temps (`%%rax`, ...) are handled
/// by [`map_liveness_temp`] instead, which bypasses this map entirely.
#[derive(Default)]
struct TempMapper {
    mapping: HashMap<SSATemp, Temp>,
    counter: u32,
}

impl TempMapper {
    fn map(&mut self, ssa: &SSATemp) -> Temp {
        if let Some(t) = self.mapping.get(ssa) {
            return t.clone();
        }
        let mapped = match &ssa.id {
            Temp::Named(name) if ssa.version == 0 => Temp::Named(name.clone()),
            _ => {
                let t = Temp::Counter(self.counter);
                self.counter += 1;
                t
            }
        };
        self.mapping.insert(ssa.clone(), mapped.clone());
        mapped
    }
}

fn map_op(op: &Op<SSATemp>, mapper: &mut TempMapper) -> Op<Temp> {
    let args = op.args.iter().map(|a| map_operand(a, mapper)).collect();
    let result = op.result.as_ref().map(|d| match d {
        Dest::Temp(t) => Dest::Temp(mapper.map(t)),
        Dest::Global(g) => Dest::Global(g.clone()),
    });
    let mut mapped = Op::new(op.opcode, args, result);
    mapped.live_in = op.live_in.iter().map(|t| map_liveness_temp(t, mapper)).collect();
    mapped.live_out = op.live_out.iter().map(|t| map_liveness_temp(t, mapper)).collect();
    mapped
}

fn map_operand(arg: &Operand<SSATemp>, mapper: &mut TempMapper) -> Operand<Temp> {
    match arg {
        Operand::Temp(t) => Operand::Temp(mapper.map(t)),
        Operand::Global(g) => Operand::Global(g.clone()),
        Operand::Const(n) => Operand::Const(*n),
        Operand::Label(l) => Operand::Label(l.clone()),
    }
}

fn map_liveness_temp(ssa: &SSATemp, mapper: &mut TempMapper) -> Temp {
    if ssa.id.is_dummy_register() {
        ssa.id.clone()
    } else {
        mapper.map(ssa)
    }
}

/// Depth-first from the initial block, preferring the fallthrough edge
/// so adjacent-in-listing blocks stay adjacent whenever topology
/// allows; skips blocks already emitted.
fn serialize(ssa: &SsaCfg, blocks: &IndexMap<Label, PlainBlock>) -> TacListing {
    let mut listing: TacListing = Listing::new(ssa.name.clone(), ssa.params.clone());
    let mut visited: HashSet<Label> = HashSet::new();
    serialize_from(&ssa.entry, blocks, &mut visited, &mut listing);
    listing
}

fn serialize_from(
    label: &Label,
    blocks: &IndexMap<Label, PlainBlock>,
    visited: &mut HashSet<Label>,
    listing: &mut TacListing,
) {
    if !visited.insert(label.clone()) {
        return;
    }
    let block = &blocks[label];
    listing.push_label(label.clone());
    for op in &block.ops {
        listing.push_op(op.clone());
    }
    if let Some(ft) = &block.fallthrough {
        serialize_from(ft, blocks, visited, listing);
    }
    for succ in &block.successors {
        serialize_from(succ, blocks, visited, listing);
    }
}

/// Drops `jmp L` immediately followed by `L:`, then removes any label
/// no remaining jump targets (the entry label is always kept, even if
/// nothing jumps back to it).
fn cleanup(mut listing: TacListing) -> TacListing {
    let items = std::mem::take(&mut listing.items);
    let mut cleaned: Vec<Item<Temp>> = Vec::with_capacity(items.len());
    let mut i = 0;
    while i < items.len() {
        if let Item::Op(op) = &items[i] {
            if op.opcode == Opcode::Jmp {
                if let (Some(target), Some(Item::Label(next))) = (op.jump_target(), items.get(i + 1)) {
                    if target == next {
                        i += 1;
                        continue;
                    }
                }
            }
        }
        cleaned.push(items[i].clone());
        i += 1;
    }

    let referenced: HashSet<Label> = cleaned
        .iter()
        .filter_map(|item| match item {
            Item::Op(op) => op.jump_target().cloned(),
            Item::Label(_) => None,
        })
        .collect();
    let entry = cleaned.iter().find_map(|item| match item {
        Item::Label(l) => Some(l.clone()),
        Item::Op(_) => None,
    });

    listing.items = cleaned
        .into_iter()
        .filter(|item| match item {
            Item::Label(l) => referenced.contains(l) || Some(l) == entry.as_ref(),
            Item::Op(_) => true,
        })
        .collect();
    listing
}
