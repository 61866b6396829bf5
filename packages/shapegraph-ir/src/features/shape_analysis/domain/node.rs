//! Nodes: abstract memory objects
//!
//! A node is one union-find class of allocations believed to alias. The
//! forwarding (parent) link lives in the graph's union-find, not here, so a
//! `Node` only ever describes a representative.

use super::cell::{Cell, NodeId};
use super::field::Field;
use super::program::{FuncId, ValueId};
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

bitflags! {
    /// Monotone node attributes, OR-combined on every merge
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
    pub struct NodeFlags: u16 {
        /// Size-indexed repeating region; `size` is the element stride
        const ARRAY = 1 << 0;
        /// Field structure destroyed, every access folds to offset 0
        const OFFSET_COLLAPSED = 1 << 1;
        const MODIFIED = 1 << 2;
        const READ = 1 << 3;
        /// Reachable from code outside the analyzed program
        const EXTERNAL = 1 << 4;
        const HEAP = 1 << 5;
        /// Address converted to an integer
        const ESCAPES_TO_INT = 1 << 6;
        const STACK = 1 << 7;
        const GLOBAL = 1 << 8;
        const FUNCTION = 1 << 9;

        /// Flags that describe memory effects rather than layout
        const EFFECTS = Self::MODIFIED.bits() | Self::READ.bits();
        /// Flags that describe layout; merges reconcile these explicitly
        const LAYOUT = Self::ARRAY.bits() | Self::OFFSET_COLLAPSED.bits();
    }
}

/// Program entity a node stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocSite {
    /// Allocation instruction (stack or heap)
    Alloc(u32),
    /// Global variable
    Global(ValueId),
    /// Address of a function
    Function(FuncId),
}

/// Node payload stored in the arena
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Node {
    pub(crate) size: u32,
    pub(crate) flags: NodeFlags,
    pub(crate) links: BTreeMap<Field, Cell>,
    pub(crate) alloc_sites: BTreeSet<AllocSite>,
}

impl Node {
    pub(crate) fn new(size: u32, flags: NodeFlags) -> Self {
        Self {
            size,
            flags,
            links: BTreeMap::new(),
            alloc_sites: BTreeSet::new(),
        }
    }

    #[inline]
    pub fn is_array(&self) -> bool {
        self.flags.contains(NodeFlags::ARRAY)
    }

    #[inline]
    pub fn is_offset_collapsed(&self) -> bool {
        self.flags.contains(NodeFlags::OFFSET_COLLAPSED)
    }

    /// Largest byte extent covered by a link, given the pointer width
    pub(crate) fn link_extent(&self, pointer_width: u32) -> u32 {
        self.links
            .keys()
            .map(|f| f.offset.saturating_add(pointer_width))
            .max()
            .unwrap_or(0)
    }
}

/// Offset of an access into a node, folded for arrays and collapsed nodes
///
/// All offset arithmetic goes through here; comparing raw offsets across
/// nodes of different array-ness is meaningless.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Offset {
    raw: u32,
    folded: u32,
}

impl Offset {
    pub fn new(node: &Node, raw: u32) -> Self {
        let folded = if node.is_offset_collapsed() {
            0
        } else if node.is_array() && node.size > 0 {
            raw % node.size
        } else {
            raw
        };
        Self { raw, folded }
    }

    #[inline]
    pub fn raw(&self) -> u32 {
        self.raw
    }

    #[inline]
    pub fn value(&self) -> u32 {
        self.folded
    }
}

impl From<Offset> for u32 {
    fn from(o: Offset) -> u32 {
        o.folded
    }
}

/// Read-only view of a representative node
#[derive(Debug, Clone, Copy)]
pub struct NodeView<'g> {
    pub(crate) id: NodeId,
    pub(crate) node: &'g Node,
}

impl<'g> NodeView<'g> {
    #[inline]
    pub fn id(&self) -> NodeId {
        self.id
    }

    #[inline]
    pub fn size(&self) -> u32 {
        self.node.size
    }

    #[inline]
    pub fn flags(&self) -> NodeFlags {
        self.node.flags
    }

    #[inline]
    pub fn is_array(&self) -> bool {
        self.node.is_array()
    }

    #[inline]
    pub fn is_offset_collapsed(&self) -> bool {
        self.node.is_offset_collapsed()
    }

    #[inline]
    pub fn is_modified(&self) -> bool {
        self.node.flags.contains(NodeFlags::MODIFIED)
    }

    #[inline]
    pub fn is_read(&self) -> bool {
        self.node.flags.contains(NodeFlags::READ)
    }

    /// Outgoing links; the target cells are unresolved
    pub fn links(&self) -> impl Iterator<Item = (&'g Field, &'g Cell)> + 'g {
        self.node.links.iter()
    }

    #[inline]
    pub fn link_count(&self) -> usize {
        self.node.links.len()
    }

    pub fn alloc_sites(&self) -> impl Iterator<Item = &'g AllocSite> + 'g {
        self.node.alloc_sites.iter()
    }

    /// Functions whose address this node may hold
    pub fn functions(&self) -> impl Iterator<Item = FuncId> + 'g {
        self.node.alloc_sites.iter().filter_map(|s| match s {
            AllocSite::Function(f) => Some(*f),
            _ => None,
        })
    }

    /// Offset of a raw access into this node
    #[inline]
    pub fn offset(&self, raw: u32) -> Offset {
        Offset::new(self.node, raw)
    }
}
