//! Heap graph and unification
//!
//! The graph owns an arena of nodes, the union-find that forwards merged
//! nodes to their representative, and the cell bound to every analyzed
//! value. Its single primitive is `unify`: make two cells denote the same
//! memory location, reconciling layout, flags and outgoing links.
//!
//! No operation here can fail. Layout conflicts are resolved by widening:
//! growing a node, turning it into an array, or collapsing its offsets.
//!
//! # Termination
//! Every merge removes one representative from the union-find and every
//! collapse flips a monotone flag, so the potential
//! `(live nodes, uncollapsed nodes)` strictly decreases along any chain of
//! recursive merges triggered by link reconciliation. Re-adding a link only
//! recurses when two distinct cells meet.
//!
//! # Representative choice
//! When the two resolved offsets differ, the node reached at the larger
//! offset absorbs the other (the smaller one starts inside it). When they
//! are equal the larger node wins and ties go to the lower `NodeId`. Array
//! layout overrides this: a plain node merged into an array always ends up
//! inside the array node.
//!
//! # Array strides
//! The stride of an array only ever gets finer. Folding a layout onto a
//! finer stride merges locations; coarsening would split cells that already
//! name one location. Offsets past `u32::MAX` collapse their node.

use super::cell::{Cell, NodeId};
use super::field::{Field, FieldType, TypeAwareness};
use super::node::{AllocSite, Node, NodeFlags, NodeView, Offset};
use super::program::{FuncId, ValueId};
use crate::features::shape_analysis::infrastructure::union_find::OffsetUnionFind;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Default pointer width in bytes
pub const DEFAULT_POINTER_WIDTH: u32 = 8;

/// Statistics about a graph
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStats {
    /// Nodes ever created (including forwarded ones)
    pub nodes: usize,
    /// Representatives
    pub live_nodes: usize,
    pub collapsed: usize,
    pub arrays: usize,
    pub links: usize,
    pub unifications: usize,
    pub collapses: usize,
}

/// Serializable, fully resolved picture of a graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub nodes: Vec<NodeSnapshot>,
    pub values: Vec<(ValueId, Cell)>,
    pub globals: Vec<(ValueId, Cell)>,
    pub formals: Vec<(FuncId, u32, Cell)>,
    pub returns: Vec<(FuncId, Cell)>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub id: NodeId,
    pub size: u32,
    pub flags: NodeFlags,
    pub links: Vec<(Field, Cell)>,
    pub alloc_sites: Vec<AllocSite>,
}

/// Heap graph of one analysis unit (a function, an SCC, or the program)
#[derive(Debug, Clone)]
pub struct Graph {
    nodes: Vec<Node>,
    uf: OffsetUnionFind,
    values: FxHashMap<ValueId, Cell>,
    globals: BTreeMap<ValueId, Cell>,
    formals: BTreeMap<(FuncId, u32), Cell>,
    returns: BTreeMap<FuncId, Cell>,
    functions: BTreeSet<FuncId>,
    awareness: TypeAwareness,
    pointer_width: u32,
    unifications: usize,
    collapses: usize,
}

impl Default for Graph {
    fn default() -> Self {
        Self::new(TypeAwareness::default(), DEFAULT_POINTER_WIDTH)
    }
}

impl Graph {
    pub fn new(awareness: TypeAwareness, pointer_width: u32) -> Self {
        Self {
            nodes: Vec::new(),
            uf: OffsetUnionFind::default(),
            values: FxHashMap::default(),
            globals: BTreeMap::new(),
            formals: BTreeMap::new(),
            returns: BTreeMap::new(),
            functions: BTreeSet::new(),
            awareness,
            pointer_width,
            unifications: 0,
            collapses: 0,
        }
    }

    #[inline]
    pub fn awareness(&self) -> TypeAwareness {
        self.awareness
    }

    #[inline]
    pub fn pointer_width(&self) -> u32 {
        self.pointer_width
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Nodes and resolution
    // ═══════════════════════════════════════════════════════════════════════

    /// Fresh empty node
    pub fn mk_node(&mut self) -> NodeId {
        self.mk_node_with(0, NodeFlags::empty())
    }

    pub fn mk_node_with(&mut self, size: u32, flags: NodeFlags) -> NodeId {
        let id = self.uf.push();
        debug_assert_eq!(id as usize, self.nodes.len());
        self.nodes.push(Node::new(size, flags));
        NodeId(id)
    }

    /// Fresh node with one allocation site, as a cell at offset 0
    pub fn mk_alloc(&mut self, size: u32, flags: NodeFlags, site: AllocSite) -> Cell {
        let id = self.mk_node_with(size, flags);
        self.nodes[id.index()].alloc_sites.insert(site);
        Cell::new(id, 0)
    }

    pub fn add_alloc_sites(&mut self, node: NodeId, sites: impl IntoIterator<Item = AllocSite>) {
        let root = self.find(node);
        self.nodes[root.index()].alloc_sites.extend(sites);
    }

    #[inline]
    fn find(&mut self, node: NodeId) -> NodeId {
        NodeId(self.uf.find(node.0).0)
    }

    /// Canonicalize a cell: follow forwarding, accumulate offsets, fold
    ///
    /// Panics if the cell names a node that does not belong to this graph.
    pub fn resolve(&mut self, cell: Cell) -> Cell {
        let (root, delta) = self.uf.find(cell.node.0);
        let Some(raw) = cell.offset.checked_add(delta) else {
            let root = NodeId(root);
            self.collapse(root);
            return self.resolve(Cell::new(root, 0));
        };
        let node = &self.nodes[root as usize];
        Cell::new(NodeId(root), Offset::new(node, raw).value())
    }

    /// `resolve` without path compression
    ///
    /// An offset past the address space saturates instead of collapsing.
    pub fn resolve_readonly(&self, cell: Cell) -> Cell {
        let (root, delta) = self.uf.find_readonly(cell.node.0);
        let node = &self.nodes[root as usize];
        let raw = cell.offset.saturating_add(delta);
        Cell::new(NodeId(root), Offset::new(node, raw).value())
    }

    /// View of the representative of `id`
    pub fn node(&self, id: NodeId) -> NodeView<'_> {
        let root = NodeId(self.uf.find_readonly(id.0).0);
        NodeView {
            id: root,
            node: &self.nodes[root.index()],
        }
    }

    /// Representatives, in insertion order
    pub fn live_nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.uf.roots().map(NodeId)
    }

    #[inline]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_collapsed(&self, id: NodeId) -> bool {
        self.node(id).is_offset_collapsed()
    }

    /// Same memory location after resolution
    pub fn same_location(&self, a: Cell, b: Cell) -> bool {
        self.resolve_readonly(a) == self.resolve_readonly(b)
    }

    /// Same abstract object after resolution (offsets ignored)
    pub fn may_alias(&self, a: Cell, b: Cell) -> bool {
        self.resolve_readonly(a).node == self.resolve_readonly(b).node
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Flags, size, links
    // ═══════════════════════════════════════════════════════════════════════

    /// OR effect/attribute flags into the node of `at`
    ///
    /// Layout flags are ignored here; use `mark_array` / `collapse`.
    pub fn set_flags(&mut self, at: Cell, flags: NodeFlags) {
        let root = self.find(at.node);
        self.nodes[root.index()].flags |= flags - NodeFlags::LAYOUT;
    }

    /// Record an access of `bytes` bytes at `at`
    pub fn grow(&mut self, at: Cell, bytes: u32) {
        let at = self.resolve(at);
        let node = &self.nodes[at.node.index()];
        let end = match at.offset.checked_add(bytes) {
            _ if node.is_offset_collapsed() => Some(bytes),
            // the access straddles two elements
            Some(end) if node.is_array() && end > node.size => None,
            end => end,
        };

        match end {
            Some(end) => {
                let node = &mut self.nodes[at.node.index()];
                if !node.is_array() || node.is_offset_collapsed() {
                    node.size = node.size.max(end);
                }
            }
            None => {
                self.collapse(at.node);
                let root = self.find(at.node);
                let node = &mut self.nodes[root.index()];
                node.size = node.size.max(bytes);
            }
        }
    }

    /// Access of `bytes` at `at` with effect `flags`
    pub fn access(&mut self, at: Cell, bytes: u32, flags: NodeFlags) {
        self.grow(at, bytes);
        self.set_flags(at, flags);
    }

    fn normalize_field(&self, at: Cell, ty: FieldType) -> Field {
        let node = &self.nodes[at.node.index()];
        if node.is_offset_collapsed() {
            Field::collapsed()
        } else {
            Field::new(at.offset, self.awareness.normalize(ty))
        }
    }

    /// Resolve `at` as the home of a pointer field, growing its node to
    /// hold the field
    fn link_slot(&mut self, at: Cell, ty: FieldType) -> (NodeId, Field) {
        let mut at = self.resolve(at);
        let width = self.pointer_width;
        let node = &mut self.nodes[at.node.index()];
        if !node.is_array() && !node.is_offset_collapsed() {
            match at.offset.checked_add(width) {
                Some(end) => node.size = node.size.max(end),
                None => {
                    self.collapse(at.node);
                    at = self.resolve(at);
                }
            }
        }
        (at.node, self.normalize_field(at, ty))
    }

    /// Existing link at `at`, if any
    pub fn get_link(&self, at: Cell, ty: FieldType) -> Option<Cell> {
        let at = self.resolve_readonly(at);
        let field = self.normalize_field(at, ty);
        self.nodes[at.node.index()].links.get(&field).copied()
    }

    /// Link at `at`, created pointing to a fresh node when missing
    pub fn link(&mut self, at: Cell, ty: FieldType) -> Cell {
        let (node, field) = self.link_slot(at, ty);
        if let Some(&existing) = self.nodes[node.index()].links.get(&field) {
            return existing;
        }

        let target = Cell::new(self.mk_node(), 0);
        self.nodes[node.index()].links.insert(field, target);
        target
    }

    /// Make the field at `at` point to `target`
    ///
    /// Returns whether reconciling with an existing link ran into an
    /// incompatible layout.
    pub fn add_link(&mut self, at: Cell, ty: FieldType, target: Cell) -> bool {
        let (node, field) = self.link_slot(at, ty);
        match self.nodes[node.index()].links.get(&field).copied() {
            Some(existing) => self.unify_cells(existing, target),
            None => {
                self.nodes[node.index()].links.insert(field, target);
                false
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Unification
    // ═══════════════════════════════════════════════════════════════════════

    /// Merge the locations denoted by `a` and `b`. Always succeeds.
    pub fn unify(&mut self, a: Cell, b: Cell) {
        self.unify_cells(a, b);
    }

    /// `unify`, reporting whether an incompatible layout forced a collapse
    pub(crate) fn unify_cells(&mut self, a: Cell, b: Cell) -> bool {
        let a = self.resolve(a);
        let b = self.resolve(b);
        if a == b {
            return false;
        }
        self.unifications += 1;

        if a.node == b.node {
            // one object reached at two different folded offsets
            self.collapse(a.node);
            return true;
        }

        if a.offset > b.offset {
            self.merge_at(a.node, b.node, a.offset - b.offset)
        } else if b.offset > a.offset {
            self.merge_at(b.node, a.node, b.offset - a.offset)
        } else {
            let (winner, loser) = self.pick_representative(a.node, b.node);
            self.merge_at(winner, loser, 0)
        }
    }

    /// Larger node wins, ties go to the earlier node
    fn pick_representative(&self, a: NodeId, b: NodeId) -> (NodeId, NodeId) {
        let sa = self.nodes[a.index()].size;
        let sb = self.nodes[b.index()].size;
        if sa > sb || (sa == sb && a < b) {
            (a, b)
        } else {
            (b, a)
        }
    }

    /// Merge root `source` into root `target` so that byte 0 of `source`
    /// is byte `offset` of `target`.
    fn merge_at(&mut self, target: NodeId, source: NodeId, offset: u32) -> bool {
        let t = &self.nodes[target.index()];
        let s = &self.nodes[source.index()];
        let (t_collapsed, s_collapsed) = (t.is_offset_collapsed(), s.is_offset_collapsed());
        let (t_array, s_array) = (t.is_array(), s.is_array());
        let (t_size, s_size) = (t.size, s.size);

        if t_collapsed != s_collapsed {
            let open = if t_collapsed { source } else { target };
            self.collapse(open);
            return self.unify_cells(Cell::new(target, offset), Cell::new(source, 0));
        }
        if t_collapsed {
            self.absorb(target, source, 0);
            return false;
        }

        match (t_array, s_array) {
            (false, false) => {
                if offset.checked_add(s_size).is_none() {
                    return self.collapse_pair(target, source);
                }
                self.absorb(target, source, offset);
                false
            }
            (true, false) => {
                // the plain object fits one element, or folds onto the
                // stride from an element boundary
                let stride = t_size.max(1);
                let local = offset % stride;
                let fits = local.checked_add(s_size).is_some_and(|end| end <= t_size);
                if fits || (local == 0 && s_size % stride == 0) {
                    self.absorb(target, source, local);
                    false
                } else {
                    self.collapse_pair(target, source)
                }
            }
            (false, true) => {
                // a plain object laid over a repeating region: only an
                // unfolding of the array at its origin keeps the layout
                if offset == 0 && (t_size <= s_size || t_size % s_size.max(1) == 0) {
                    self.absorb(source, target, 0);
                    false
                } else {
                    self.collapse_pair(target, source)
                }
            }
            (true, true) => {
                let (t_stride, s_stride) = (t_size.max(1), s_size.max(1));
                if offset % t_stride != 0 {
                    self.collapse_pair(target, source)
                } else if t_stride == s_stride {
                    self.absorb(target, source, 0);
                    false
                } else if t_stride % s_stride == 0 || s_stride % t_stride == 0 {
                    // refine the coarser array, then merge equal strides
                    let (coarse, fine) = if t_stride > s_stride {
                        (target, s_stride)
                    } else {
                        (source, t_stride)
                    };
                    self.restride(coarse, fine);
                    self.unify_cells(Cell::new(target, offset), Cell::new(source, 0))
                } else {
                    self.collapse_pair(target, source)
                }
            }
        }
    }

    fn collapse_pair(&mut self, a: NodeId, b: NodeId) -> bool {
        self.collapse(a);
        self.collapse(b);
        self.unify_cells(Cell::new(a, 0), Cell::new(b, 0));
        true
    }

    /// Move everything `source` knows into `target` at `offset` and forward it
    fn absorb(&mut self, target: NodeId, source: NodeId, offset: u32) {
        debug_assert_ne!(target, source);
        let Node {
            size,
            flags,
            links,
            alloc_sites,
        } = std::mem::take(&mut self.nodes[source.index()]);

        let t = &mut self.nodes[target.index()];
        t.flags |= flags;
        t.alloc_sites.extend(alloc_sites);
        if !t.is_array() {
            t.size = t.size.max(offset.saturating_add(size));
        }
        self.uf.link(source.0, target.0, offset);

        let mut conflict = false;
        for (field, cell) in links {
            let at = Cell::new(target, offset).shifted(field.offset);
            conflict |= self.add_link(at, field.ty, cell);
        }

        // a field pair that could not be reconciled takes its parent down too
        if conflict {
            self.collapse(target);
        }
    }

    /// Destroy the field structure of a node. Monotone.
    pub fn collapse(&mut self, node: NodeId) {
        let root = self.find(node);
        if self.nodes[root.index()].is_offset_collapsed() {
            return;
        }
        self.collapses += 1;

        let width = self.pointer_width;
        let n = &mut self.nodes[root.index()];
        n.size = n.size.max(n.link_extent(width));
        n.flags |= NodeFlags::OFFSET_COLLAPSED;
        let links = std::mem::take(&mut n.links);

        for (_, cell) in links {
            self.add_link(Cell::new(root, 0), FieldType::Omni, cell);
        }
    }

    /// Turn a node into an array of the given stride, folding its links
    ///
    /// `stride` must divide the current stride of an array node, or the
    /// size of a plain one.
    fn restride(&mut self, node: NodeId, stride: u32) {
        let n = &mut self.nodes[node.index()];
        n.flags |= NodeFlags::ARRAY;
        n.size = stride;
        let links = std::mem::take(&mut n.links);
        for (field, cell) in links {
            self.add_link(Cell::new(node, field.offset), field.ty, cell);
        }
    }

    /// The object at `at` is indexed with a runtime index of `stride` bytes
    ///
    /// Returns the resolved cell for the indexed address.
    pub fn mark_array(&mut self, at: Cell, stride: u32) -> Cell {
        let stride = stride.max(1);
        let at = self.resolve(at);
        let node = &self.nodes[at.node.index()];
        if node.is_offset_collapsed() {
            return at;
        }

        let size = node.size;
        if !node.is_array() {
            if at.offset != 0 {
                self.collapse(at.node);
            } else if size <= stride {
                let n = &mut self.nodes[at.node.index()];
                n.flags |= NodeFlags::ARRAY;
                n.size = stride;
            } else if size % stride == 0 {
                self.restride(at.node, stride);
            } else {
                self.collapse(at.node);
            }
        } else if stride % size == 0 {
            // coarser index over the same elements
        } else if size % stride == 0 {
            self.restride(at.node, stride);
        } else {
            self.collapse(at.node);
        }
        self.resolve(at)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Value bindings
    // ═══════════════════════════════════════════════════════════════════════

    /// Cell bound to a local value or a global
    pub fn cell(&self, value: ValueId) -> Option<Cell> {
        self.values
            .get(&value)
            .or_else(|| self.globals.get(&value))
            .copied()
    }

    /// Bind `value` to `cell`, unifying with any previous binding
    pub fn bind_value(&mut self, value: ValueId, cell: Cell) {
        if self.globals.contains_key(&value) {
            return self.bind_global(value, cell);
        }
        match self.values.get(&value).copied() {
            Some(existing) => self.unify(existing, cell),
            None => {
                self.values.insert(value, cell);
            }
        }
    }

    /// Cell of `value`, pointing to a fresh node if unbound
    pub fn cell_or_fresh(&mut self, value: ValueId) -> Cell {
        if let Some(c) = self.cell(value) {
            return c;
        }
        let c = Cell::new(self.mk_node(), 0);
        self.values.insert(value, c);
        c
    }

    /// Local value bindings (globals excluded)
    pub fn values(&self) -> impl Iterator<Item = (ValueId, Cell)> + '_ {
        self.values.iter().map(|(v, c)| (*v, *c))
    }

    pub fn global_cell(&self, value: ValueId) -> Option<Cell> {
        self.globals.get(&value).copied()
    }

    pub fn bind_global(&mut self, value: ValueId, cell: Cell) {
        match self.globals.get(&value).copied() {
            Some(existing) => self.unify(existing, cell),
            None => {
                self.globals.insert(value, cell);
            }
        }
    }

    /// Cell of a global, creating its node on first use
    pub fn global_or_insert(&mut self, value: ValueId, size: u32) -> Cell {
        if let Some(c) = self.global_cell(value) {
            return c;
        }
        let c = self.mk_alloc(size, NodeFlags::GLOBAL, AllocSite::Global(value));
        self.globals.insert(value, c);
        c
    }

    pub fn globals(&self) -> impl Iterator<Item = (ValueId, Cell)> + '_ {
        self.globals.iter().map(|(v, c)| (*v, *c))
    }

    pub fn add_function(&mut self, func: FuncId) {
        self.functions.insert(func);
    }

    pub fn functions(&self) -> impl Iterator<Item = FuncId> + '_ {
        self.functions.iter().copied()
    }

    pub fn formal(&self, func: FuncId, index: u32) -> Option<Cell> {
        self.formals.get(&(func, index)).copied()
    }

    pub fn bind_formal(&mut self, func: FuncId, index: u32, cell: Cell) {
        match self.formal(func, index) {
            Some(existing) => self.unify(existing, cell),
            None => {
                self.formals.insert((func, index), cell);
            }
        }
    }

    /// Formal parameter cells of `func`, by parameter index
    pub fn formals_of(&self, func: FuncId) -> impl Iterator<Item = (u32, Cell)> + '_ {
        self.formals
            .range((func, 0)..=(func, u32::MAX))
            .map(|((_, i), c)| (*i, *c))
    }

    pub fn return_cell(&self, func: FuncId) -> Option<Cell> {
        self.returns.get(&func).copied()
    }

    pub fn bind_return(&mut self, func: FuncId, cell: Cell) {
        match self.return_cell(func) {
            Some(existing) => self.unify(existing, cell),
            None => {
                self.returns.insert(func, cell);
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Reporting
    // ═══════════════════════════════════════════════════════════════════════

    pub fn stats(&self) -> GraphStats {
        let mut stats = GraphStats {
            nodes: self.nodes.len(),
            live_nodes: self.uf.count(),
            unifications: self.unifications,
            collapses: self.collapses,
            ..Default::default()
        };
        for id in self.live_nodes() {
            let n = &self.nodes[id.index()];
            stats.links += n.links.len();
            if n.is_offset_collapsed() {
                stats.collapsed += 1;
            } else if n.is_array() {
                stats.arrays += 1;
            }
        }
        stats
    }

    /// Dense, stable numbering of every resolved cell the graph refers to
    ///
    /// Two accesses tagged with cells that resolve to the same number
    /// alias under the final graph.
    pub fn cell_numbering(&self) -> BTreeMap<Cell, u32> {
        let mut cells = BTreeSet::new();
        let bound = self
            .values
            .values()
            .chain(self.globals.values())
            .chain(self.formals.values())
            .chain(self.returns.values());
        for c in bound {
            cells.insert(self.resolve_readonly(*c));
        }
        for id in self.live_nodes() {
            for (field, target) in &self.nodes[id.index()].links {
                cells.insert(Cell::new(id, field.offset));
                cells.insert(self.resolve_readonly(*target));
            }
        }
        cells
            .into_iter()
            .enumerate()
            .map(|(i, c)| (c, i as u32))
            .collect()
    }

    pub fn snapshot(&self) -> GraphSnapshot {
        let nodes = self
            .live_nodes()
            .map(|id| {
                let n = &self.nodes[id.index()];
                NodeSnapshot {
                    id,
                    size: n.size,
                    flags: n.flags,
                    links: n
                        .links
                        .iter()
                        .map(|(f, c)| (*f, self.resolve_readonly(*c)))
                        .collect(),
                    alloc_sites: n.alloc_sites.iter().copied().collect(),
                }
            })
            .collect();

        let mut values: Vec<_> = self
            .values()
            .map(|(v, c)| (v, self.resolve_readonly(c)))
            .collect();
        values.sort();

        GraphSnapshot {
            nodes,
            values,
            globals: self
                .globals()
                .map(|(v, c)| (v, self.resolve_readonly(c)))
                .collect(),
            formals: self
                .formals
                .iter()
                .map(|((f, i), c)| (*f, *i, self.resolve_readonly(*c)))
                .collect(),
            returns: self
                .returns
                .iter()
                .map(|(f, c)| (*f, self.resolve_readonly(*c)))
                .collect(),
        }
    }
}
