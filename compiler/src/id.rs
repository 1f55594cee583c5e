// id.rs — Stable identifiers for graph nodes and synthesized names
//
// Node ids index the graph arena and are never reused. The allocator also
// owns the counter behind generated argument names, so freshness does not
// depend on how many nodes currently exist.

use std::fmt;

use serde::Serialize;

/// Stable identifier for a node in an `SsaGraph`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Allocator for node ids and name suffixes. Produces monotonically
/// increasing values in allocation order, scoped to one compilation.
#[derive(Debug, Default, Clone)]
pub struct IdAllocator {
    next_node: u32,
    next_trans: u64,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc_node(&mut self) -> NodeId {
        let id = NodeId(self.next_node);
        self.next_node += 1;
        id
    }

    /// Next suffix for a synthesized `<var>/trans/<n>` argument name.
    pub fn alloc_trans(&mut self) -> u64 {
        let n = self.next_trans;
        self.next_trans += 1;
        n
    }
}
