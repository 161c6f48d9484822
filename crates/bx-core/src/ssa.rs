//! SSA-only value types: versioned temporaries and phi nodes.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::id::{Label, Temp};

/// `(id, version)`. Two SSA temporaries are equal iff both fields
/// match -- this is what lets phi bookkeeping distinguish reaching
/// definitions of the same source name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SSATemp {
    pub id: Temp,
    pub version: u32,
}

impl SSATemp {
    pub fn new(id: Temp, version: u32) -> Self {
        SSATemp { id, version }
    }
}

impl fmt::Display for SSATemp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.id, self.version)
    }
}

/// A control-flow-join phi: one source SSA temp per predecessor block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Phi {
    pub defined: SSATemp,
    pub sources: IndexMap<Label, SSATemp>,
}

impl Phi {
    pub fn new(defined: SSATemp) -> Self {
        Phi {
            defined,
            sources: IndexMap::new(),
        }
    }

    /// Distinct source ids, excluding a source that equals this phi's
    /// own `defined` value (a self-reference contributes no real
    /// information) and otherwise ignoring version -- what phi-rename
    /// simplification collapses on.
    pub fn distinct_source_ids(&self) -> Vec<&Temp> {
        let mut ids: Vec<&Temp> = Vec::new();
        for src in self.sources.values() {
            if *src == self.defined {
                continue;
            }
            if !ids.contains(&&src.id) {
                ids.push(&src.id);
            }
        }
        ids
    }

    /// `true` if every source equals this phi's own defined value
    /// (a self-loop phi with nothing to choose between).
    pub fn is_self_loop(&self) -> bool {
        self.sources.values().all(|src| *src == self.defined)
    }
}

impl fmt::Display for Phi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sources = self
            .sources
            .iter()
            .map(|(label, temp)| format!("{label}:{temp}"))
            .collect::<Vec<_>>()
            .join(" ");
        write!(f, "{} = phi {sources}", self.defined)
    }
}
