//! Cells: (node, byte offset) references
//!
//! A `Cell` is a plain value. It never borrows the graph, so holding one
//! across a unification is fine; it just has to be resolved again before
//! its node or offset is interpreted.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Index of a node in its graph's arena (insertion order)
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub struct NodeId(pub u32);

impl NodeId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// The unit of "a pointer value points here"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Cell {
    pub node: NodeId,
    pub offset: u32,
}

impl Cell {
    #[inline]
    pub fn new(node: NodeId, offset: u32) -> Self {
        Self { node, offset }
    }

    /// Same node, `delta` bytes further, saturating at `u32::MAX`
    #[inline]
    pub fn shifted(self, delta: u32) -> Self {
        Self::new(self.node, self.offset.saturating_add(delta))
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}, {}>", self.node, self.offset)
    }
}
