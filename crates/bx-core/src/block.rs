//! Basic blocks and the per-procedure block arena.
//!
//! Blocks reference each other only through [`Label`] sets, never
//! through owning references or shared pointers -- the per-procedure
//! [`Cfg`]/[`SsaCfg`] arena (a `Vec` indexed by position, with a
//! `Label -> index` lookup) is the single owner of every block. This
//! sidesteps the aliasing problems a cyclic graph of `Rc`/`RefCell`
//! nodes would create in a borrow-checked language.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

use crate::id::{Label, Temp};
use crate::op::Op;
use crate::ssa::{Phi, SSATemp};

/// A maximal run of ops whose only jumps are in the final positions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BasicBlock<T: Eq + Hash> {
    pub entry: Label,
    pub ops: Vec<Op<T>>,
    pub successors: IndexSet<Label>,
    pub predecessors: IndexSet<Label>,
    pub fallthrough: Option<Label>,
    pub initial: bool,
    #[serde(bound(serialize = "T: Serialize", deserialize = "T: Deserialize<'de>"))]
    pub live_in: IndexSet<T>,
}

impl<T: Eq + Hash + Clone> BasicBlock<T> {
    pub fn new(entry: Label) -> Self {
        BasicBlock {
            entry,
            ops: Vec::new(),
            successors: IndexSet::new(),
            predecessors: IndexSet::new(),
            fallthrough: None,
            initial: false,
            live_in: IndexSet::new(),
        }
    }

    /// A block is empty of "real" work if every op is a jump -- used
    /// by the CFG optimizer to recognize pure-redirect blocks.
    pub fn is_pure_jump(&self) -> bool {
        !self.ops.is_empty() && self.ops.iter().all(|op| op.opcode.is_jump())
    }

    pub fn terminator(&self) -> Option<&Op<T>> {
        self.ops.last().filter(|op| op.opcode.is_jump())
    }
}

/// Owning arena of a procedure's basic blocks, indexed by [`Label`].
///
/// This is the "per-procedure arena" the cyclic-structure design note
/// calls for: blocks never reference each other directly, only by
/// label, and the arena is the sole owner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cfg<T: Eq + Hash> {
    pub name: String,
    pub params: Vec<T>,
    pub entry: Label,
    blocks: Vec<BasicBlock<T>>,
    #[serde(skip)]
    index: HashMap<Label, usize>,
}

impl<T: Eq + Hash + Clone> Cfg<T> {
    pub fn new(name: String, params: Vec<T>, entry: Label, blocks: Vec<BasicBlock<T>>) -> Self {
        let mut cfg = Cfg {
            name,
            params,
            entry,
            blocks,
            index: HashMap::new(),
        };
        cfg.rebuild_index();
        cfg
    }

    /// Recompute the `Label -> index` lookup. Must be called after any
    /// mutation that reorders or removes blocks in place; callers that
    /// build a fresh `Vec<BasicBlock<T>>` should prefer
    /// [`Cfg::new`]/[`Cfg::with_blocks`] instead.
    pub fn rebuild_index(&mut self) {
        self.index = self
            .blocks
            .iter()
            .enumerate()
            .map(|(i, b)| (b.entry.clone(), i))
            .collect();
    }

    /// Replace the block list, rebuilding the lookup index. The usual
    /// way an optimization pass hands its output to the next pass.
    pub fn with_blocks(mut self, blocks: Vec<BasicBlock<T>>) -> Self {
        self.blocks = blocks;
        self.rebuild_index();
        self
    }

    pub fn blocks(&self) -> &[BasicBlock<T>] {
        &self.blocks
    }

    pub fn into_blocks(self) -> Vec<BasicBlock<T>> {
        self.blocks
    }

    pub fn block(&self, label: &Label) -> Option<&BasicBlock<T>> {
        self.index.get(label).map(|&i| &self.blocks[i])
    }

    pub fn block_mut(&mut self, label: &Label) -> Option<&mut BasicBlock<T>> {
        self.index.get(label).map(|&i| &mut self.blocks[i])
    }

    pub fn entry_block(&self) -> &BasicBlock<T> {
        self.block(&self.entry).expect("entry block must exist")
    }

    pub fn contains(&self, label: &Label) -> bool {
        self.index.contains_key(label)
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

/// An SSA-form basic block: the same topology as [`BasicBlock`], plus
/// the phi list and the exit-version snapshot phi resolution needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SsaBlock {
    pub entry: Label,
    pub defs: Vec<Phi>,
    pub ops: Vec<Op<SSATemp>>,
    pub successors: IndexSet<Label>,
    pub predecessors: IndexSet<Label>,
    pub fallthrough: Option<Label>,
    pub initial: bool,
    pub versions_out: IndexMap<Temp, SSATemp>,
}

impl SsaBlock {
    pub fn new(entry: Label) -> Self {
        SsaBlock {
            entry,
            defs: Vec::new(),
            ops: Vec::new(),
            successors: IndexSet::new(),
            predecessors: IndexSet::new(),
            fallthrough: None,
            initial: false,
            versions_out: IndexMap::new(),
        }
    }
}

/// Arena of SSA blocks, mirroring [`Cfg`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SsaCfg {
    pub name: String,
    pub params: Vec<Temp>,
    pub entry: Label,
    blocks: Vec<SsaBlock>,
    #[serde(skip)]
    index: HashMap<Label, usize>,
}

impl SsaCfg {
    pub fn new(name: String, params: Vec<Temp>, entry: Label, blocks: Vec<SsaBlock>) -> Self {
        let mut cfg = SsaCfg {
            name,
            params,
            entry,
            blocks,
            index: HashMap::new(),
        };
        cfg.rebuild_index();
        cfg
    }

    pub fn rebuild_index(&mut self) {
        self.index = self
            .blocks
            .iter()
            .enumerate()
            .map(|(i, b)| (b.entry.clone(), i))
            .collect();
    }

    pub fn with_blocks(mut self, blocks: Vec<SsaBlock>) -> Self {
        self.blocks = blocks;
        self.rebuild_index();
        self
    }

    pub fn blocks(&self) -> &[SsaBlock] {
        &self.blocks
    }

    pub fn blocks_mut(&mut self) -> &mut [SsaBlock] {
        &mut self.blocks
    }

    pub fn into_blocks(self) -> Vec<SsaBlock> {
        self.blocks
    }

    pub fn block(&self, label: &Label) -> Option<&SsaBlock> {
        self.index.get(label).map(|&i| &self.blocks[i])
    }

    pub fn block_mut(&mut self, label: &Label) -> Option<&mut SsaBlock> {
        self.index.get(label).map(|&i| &mut self.blocks[i])
    }

    pub fn entry_block(&self) -> &SsaBlock {
        self.block(&self.entry).expect("entry block must exist")
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

impl<T: Eq + Hash + Clone + fmt::Display> fmt::Display for BasicBlock<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}:", self.entry)?;
        for op in &self.ops {
            writeln!(f, "\t{op}")?;
        }
        Ok(())
    }
}

impl fmt::Display for SsaBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}:", self.entry)?;
        for phi in &self.defs {
            writeln!(f, "\t{phi}")?;
        }
        for op in &self.ops {
            writeln!(f, "\t{op}")?;
        }
        Ok(())
    }
}
