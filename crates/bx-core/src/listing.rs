//! The linear TAC form: what the lowerer emits and what the SSA
//! deconstructor serializes back into.

use std::fmt;
use std::hash::Hash;

use serde::{Deserialize, Serialize};

use crate::id::{Label, Temp};
use crate::op::Op;

/// One entry of a linear listing: either a label marking a jump
/// target, or an operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Item<T: Eq + Hash> {
    Label(Label),
    Op(Op<T>),
}

/// A flat, order-significant procedure body, as produced by the
/// lowerer and consumed by the CFG builder (and, at the other end of
/// the pipeline, produced by the SSA deconstructor for the register
/// allocator).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Listing<T: Eq + Hash> {
    pub name: String,
    pub params: Vec<T>,
    pub items: Vec<Item<T>>,
}

/// The lowerer's output type: a listing over plain (pre-SSA) temps.
pub type TacListing = Listing<Temp>;

impl<T: Eq + Hash + Clone> Listing<T> {
    pub fn new(name: impl Into<String>, params: Vec<T>) -> Self {
        Listing {
            name: name.into(),
            params,
            items: Vec::new(),
        }
    }

    pub fn push_label(&mut self, label: Label) {
        self.items.push(Item::Label(label));
    }

    pub fn push_op(&mut self, op: Op<T>) {
        self.items.push(Item::Op(op));
    }

    /// The label that opens the listing -- the procedure's entry
    /// label, which must be the first item.
    pub fn entry_label(&self) -> Option<&Label> {
        self.items.iter().find_map(|item| match item {
            Item::Label(l) => Some(l),
            Item::Op(_) => None,
        })
    }
}

impl<T: Eq + Hash + Clone + fmt::Display> fmt::Display for Listing<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params = self
            .params
            .iter()
            .map(|p| p.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        writeln!(f, "proc {}({params}):", self.name)?;
        for item in &self.items {
            match item {
                Item::Label(l) => writeln!(f, "{l}:")?,
                Item::Op(op) => writeln!(f, "\t{op}")?,
            }
        }
        Ok(())
    }
}
