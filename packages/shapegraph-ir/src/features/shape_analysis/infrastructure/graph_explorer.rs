//! Safety coloring of a callee graph
//!
//! A cell is *safe* when everything reachable from it has purely local
//! effects: its node is not modified, not visible to external code, not
//! converted to an integer, and every cell it links to is safe as well.
//! Safe callee nodes may be summarized into a caller without forcing an
//! extra unification there.
//!
//! `mark_copy` is an optimistic DFS with three colors. Reaching a gray cell
//! closes a cycle; the cycle is treated as unsafe and `propagate_not_copy`
//! retroactively clears every cell reachable from the closing cell, so the
//! already-discovered part of the path does not have to be re-explored.

use super::simulation_mapper::{compute_callee_caller_mapping, SimulationRelation};
use crate::features::shape_analysis::domain::{CallSite, Cell, Graph, NodeFlags, NodeId};
use rustc_hash::FxHashMap;
use std::collections::{BTreeMap, BTreeSet};

/// Effects that make a node unsafe to keep local
const UNSAFE: NodeFlags = NodeFlags::MODIFIED
    .union(NodeFlags::EXTERNAL)
    .union(NodeFlags::ESCAPES_TO_INT);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    /// Not visited
    White,
    /// On the DFS stack
    Gray,
    /// Done
    Black,
}

/// DFS state over one graph; lives for one call site
#[derive(Debug)]
pub struct GraphExplorer<'g> {
    graph: &'g Graph,
    colors: FxHashMap<Cell, Color>,
    safe: BTreeSet<Cell>,
}

impl<'g> GraphExplorer<'g> {
    pub fn new(graph: &'g Graph) -> Self {
        Self {
            graph,
            colors: FxHashMap::default(),
            safe: BTreeSet::new(),
        }
    }

    pub fn color(&self, cell: Cell) -> Color {
        let cell = self.graph.resolve_readonly(cell);
        self.color_of(cell)
    }

    fn color_of(&self, cell: Cell) -> Color {
        self.colors.get(&cell).copied().unwrap_or(Color::White)
    }

    /// Resolved targets of every link of the cell's node
    fn successors(&self, cell: Cell) -> Vec<Cell> {
        self.graph
            .node(cell.node)
            .links()
            .map(|(_, target)| self.graph.resolve_readonly(*target))
            .collect()
    }

    /// Explore from `cell`, inserting the cells believed safe
    pub fn mark_copy(&mut self, cell: Cell) {
        let cell = self.graph.resolve_readonly(cell);
        if self.color_of(cell) != Color::White {
            return;
        }
        self.colors.insert(cell, Color::Gray);

        let mut safe = !self.graph.node(cell.node).flags().intersects(UNSAFE);
        for next in self.successors(cell) {
            match self.color_of(next) {
                Color::White => self.mark_copy(next),
                Color::Gray => self.propagate_not_copy(next),
                Color::Black => {}
            }
            safe &= self.is_safe(next);
        }

        // a cycle through this cell may already have finished it
        if self.color_of(cell) == Color::Gray {
            self.colors.insert(cell, Color::Black);
            if safe {
                self.safe.insert(cell);
            }
        }
    }

    /// Mark everything reachable from `cell` unsafe and done
    pub fn propagate_not_copy(&mut self, cell: Cell) {
        let mut worklist = vec![self.graph.resolve_readonly(cell)];
        while let Some(c) = worklist.pop() {
            if self.color_of(c) == Color::Black && !self.safe.contains(&c) {
                continue;
            }
            self.safe.remove(&c);
            self.colors.insert(c, Color::Black);
            worklist.extend(self.successors(c));
        }
    }

    pub fn is_safe(&self, cell: Cell) -> bool {
        self.safe.contains(&self.graph.resolve_readonly(cell))
    }

    /// Nodes whose every visited cell is safe
    pub fn safe_nodes(&self) -> BTreeSet<NodeId> {
        let mut verdict: BTreeMap<NodeId, bool> = BTreeMap::new();
        for cell in self.colors.keys() {
            let ok = self.safe.contains(cell);
            *verdict.entry(cell.node).or_insert(true) &= ok;
        }
        verdict
            .into_iter()
            .filter_map(|(n, ok)| ok.then_some(n))
            .collect()
    }

    pub fn into_safe_cells(self) -> BTreeSet<Cell> {
        self.safe
    }
}

/// Per-call-site safety verdict
#[derive(Debug, Clone, Default)]
pub struct ColoredGraph {
    pub relation: SimulationRelation,
    /// Callee cells with purely local effects
    pub safe_cells: BTreeSet<Cell>,
    /// Callee nodes whose visited cells are all safe
    pub safe_nodes: BTreeSet<NodeId>,
    /// Caller nodes whose simulated callee counterparts are all safe
    pub caller_safe: BTreeSet<NodeId>,
    /// Callee node -> color of its caller counterpart
    pub colors: BTreeMap<NodeId, u32>,
}

impl ColoredGraph {
    pub fn is_callee_safe(&self, node: NodeId) -> bool {
        self.safe_nodes.contains(&node)
    }

    pub fn is_caller_safe(&self, node: NodeId) -> bool {
        self.caller_safe.contains(&node)
    }

    /// Caller cell a callee node may be folded onto without unification
    ///
    /// Requires a safe callee node with exactly one caller image that is
    /// still safe.
    pub fn direct_image(&self, node: NodeId) -> Option<Cell> {
        if !self.relation.simulated || !self.is_callee_safe(node) {
            return None;
        }
        let mut images = self.relation.mapper.images(node);
        let (n2, offset) = images.next()?;
        if images.next().is_some() || !self.is_caller_safe(n2) {
            return None;
        }
        Some(Cell::new(n2, offset))
    }
}

/// Safety coloring of `callee` against `caller` at one call site
///
/// Roots are the callee's formals. Unsafety is contagious from callee to
/// caller through the simulation relation; when no simulation exists no
/// caller node is safe.
pub fn color_graph(cs: &CallSite, callee: &Graph, caller: &Graph) -> ColoredGraph {
    let relation = compute_callee_caller_mapping(cs, callee, caller);

    let mut explorer = GraphExplorer::new(callee);
    for (_, formal) in callee.formals_of(cs.callee) {
        explorer.mark_copy(formal);
    }
    let safe_nodes = explorer.safe_nodes();
    let safe_cells = explorer.into_safe_cells();

    let mut caller_safe = BTreeSet::new();
    let mut colors = BTreeMap::new();
    if relation.simulated {
        caller_safe = relation.mapper.iter().map(|(_, n2, _)| n2).collect();
        let palette: BTreeMap<NodeId, u32> = caller_safe
            .iter()
            .enumerate()
            .map(|(i, n)| (*n, i as u32))
            .collect();

        for (n1, n2, _) in relation.mapper.iter() {
            colors.insert(n1, palette[&n2]);
            if !safe_nodes.contains(&n1) {
                caller_safe.remove(&n2);
            }
        }
    }

    tracing::trace!(
        "colored {} at {}: {} safe callee nodes, {} safe caller nodes, injective on writes: {}",
        cs.callee,
        cs.caller,
        safe_nodes.len(),
        caller_safe.len(),
        relation.mapper.is_injective(callee, true)
    );

    ColoredGraph {
        relation,
        safe_cells,
        safe_nodes,
        caller_safe,
        colors,
    }
}
