//! Simulation relation between a callee graph and a caller graph
//!
//! `SimulationMapper` records `callee node -> (caller node, offset)` pairs
//! meaning: byte 0 of the callee node corresponds to byte `offset` of the
//! caller node, and every field reachable from the callee node is also
//! reachable, consistently offset, from the caller node.
//!
//! The relation is all-or-nothing. The first incompatibility clears it and
//! `insert` returns `false`; callers fall back to plain unification (or
//! leave an indirect call unresolved).
//!
//! Termination: each `(callee node, caller node)` pair is expanded at most
//! once, so the work is bounded by the number of pairs reachable from the
//! roots.
//!
//! `FunctionalMapper` is the single-valued restriction used when copying one
//! graph into another.

use crate::features::shape_analysis::domain::{
    CallSite, Cell, Field, FieldType, Graph, NodeId, NodeView,
};
use rustc_hash::FxHashMap;
use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, BTreeSet};

/// Callee node -> caller node -> offset
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimulationMapper {
    sim: BTreeMap<NodeId, BTreeMap<NodeId, u32>>,
}

impl SimulationMapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `n1` (callee) at offset 0 is simulated by `n2` (caller)
    /// at `offset`, and recursively everything reachable from `n1`.
    ///
    /// On failure the whole relation is cleared.
    pub fn insert(
        &mut self,
        callee: &Graph,
        n1: NodeId,
        caller: &Graph,
        n2: NodeId,
        offset: u32,
    ) -> bool {
        if self.insert_rec(callee, n1, caller, n2, offset) {
            true
        } else {
            self.sim.clear();
            false
        }
    }

    /// Cell form of `insert`: the callee cell `c1` must land at or before
    /// the caller cell `c2` (modulo array wraparound or collapse on the
    /// caller side).
    pub fn insert_cells(&mut self, callee: &Graph, c1: Cell, caller: &Graph, c2: Cell) -> bool {
        let c1 = callee.resolve_readonly(c1);
        let c2 = caller.resolve_readonly(c2);
        match relative_offset(caller.node(c2.node), c1.offset, c2.offset) {
            Some(offset) => self.insert(callee, c1.node, caller, c2.node, offset),
            None => {
                self.sim.clear();
                false
            }
        }
    }

    fn insert_rec(
        &mut self,
        callee: &Graph,
        n1: NodeId,
        caller: &Graph,
        n2: NodeId,
        offset: u32,
    ) -> bool {
        let v1 = callee.node(n1);
        let v2 = caller.node(n2);
        let (n1, n2) = (v1.id(), v2.id());
        let mut offset = v2.offset(offset).value();

        if let Some(&recorded) = self.sim.get(&n1).and_then(|m| m.get(&n2)) {
            return recorded == offset;
        }

        if v2.is_offset_collapsed() {
            // top: absorbs anything at offset 0
            offset = 0;
        } else if v1.is_offset_collapsed() {
            return false;
        } else {
            match (v1.is_array(), v2.is_array()) {
                (false, true) => {
                    let unfolds = v2.size() == 0
                        || v1.size() <= v2.size()
                        || v1.size() % v2.size() == 0;
                    if offset != 0 || !unfolds {
                        return false;
                    }
                }
                (true, false) => return false,
                (true, true) => {
                    let divides = v2.size() == 0 || v1.size() % v2.size() == 0;
                    if offset != 0 || !divides {
                        return false;
                    }
                }
                (false, false) => {}
            }
        }

        self.sim.entry(n1).or_default().insert(n2, offset);

        for (field, target) in v1.links() {
            let at = offset.saturating_add(field.offset);
            let Some(caller_target) = find_link(v2, at, field.ty) else {
                return false;
            };

            let t1 = callee.resolve_readonly(*target);
            let t2 = caller.resolve_readonly(caller_target);
            let Some(child_offset) = relative_offset(caller.node(t2.node), t1.offset, t2.offset)
            else {
                return false;
            };
            if !self.insert_rec(callee, t1.node, caller, t2.node, child_offset) {
                return false;
            }
        }
        true
    }

    /// Caller images of a callee node
    pub fn images(&self, n1: NodeId) -> impl Iterator<Item = (NodeId, u32)> + '_ {
        self.sim
            .get(&n1)
            .into_iter()
            .flat_map(|m| m.iter().map(|(n, o)| (*n, *o)))
    }

    pub fn contains(&self, n1: NodeId, n2: NodeId) -> bool {
        self.sim.get(&n1).is_some_and(|m| m.contains_key(&n2))
    }

    /// All `(callee node, caller node, offset)` triples, ordered
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, NodeId, u32)> + '_ {
        self.sim
            .iter()
            .flat_map(|(n1, m)| m.iter().map(move |(n2, o)| (*n1, *n2, *o)))
    }

    /// Number of recorded pairs
    pub fn len(&self) -> usize {
        self.sim.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.sim.is_empty()
    }

    pub fn clear(&mut self) {
        self.sim.clear();
    }

    /// Every callee node maps to at most one caller node
    pub fn is_function(&self) -> bool {
        self.sim.values().all(|m| m.len() <= 1)
    }

    /// No two callee nodes map to the same caller cell
    ///
    /// With `only_modified`, callee nodes without the modified flag are
    /// ignored.
    pub fn is_injective(&self, callee: &Graph, only_modified: bool) -> bool {
        let mut seen: BTreeSet<(NodeId, u32)> = BTreeSet::new();
        for (n1, n2, offset) in self.iter() {
            if only_modified && !callee.node(n1).is_modified() {
                continue;
            }
            if !seen.insert((n2, offset)) {
                return false;
            }
        }
        true
    }
}

/// Link of `node` at `offset` (folded through the node) whose type is
/// compatible with `ty`
fn find_link(node: NodeView<'_>, offset: u32, ty: FieldType) -> Option<Cell> {
    if node.is_offset_collapsed() {
        return node.links().next().map(|(_, c)| *c);
    }
    let offset = node.offset(offset).value();
    let exact = Field::new(offset, ty);
    node.links()
        .find(|(f, _)| **f == exact)
        .or_else(|| {
            node.links().find(|(f, _)| {
                f.offset == offset && (f.ty.absorbs(&ty) || ty.absorbs(&f.ty))
            })
        })
        .map(|(_, c)| *c)
}

/// Offset of the caller node at which the callee node starts, given that
/// callee byte `k1` corresponds to caller byte `k2`
fn relative_offset(caller: NodeView<'_>, k1: u32, k2: u32) -> Option<u32> {
    if caller.is_offset_collapsed() {
        Some(0)
    } else if k2 >= k1 {
        Some(k2 - k1)
    } else if caller.is_array() && caller.size() > 0 {
        let stride = caller.size() as i64;
        Some((k2 as i64 - k1 as i64).rem_euclid(stride) as u32)
    } else {
        None
    }
}

/// Result of matching a callee graph against a caller graph at one call site
#[derive(Debug, Clone, Default)]
pub struct SimulationRelation {
    pub mapper: SimulationMapper,
    /// `false` when no consistent simulation exists
    pub simulated: bool,
}

/// Match the callee's formals and shared globals against the call site's
/// actuals and the caller's globals
///
/// Scalar arguments contribute nothing, so a call passing no pointers is
/// trivially simulated by an empty relation.
pub fn compute_callee_caller_mapping(
    cs: &CallSite,
    callee: &Graph,
    caller: &Graph,
) -> SimulationRelation {
    let mut mapper = SimulationMapper::new();

    let mut roots = Vec::new();
    for (index, arg) in cs.args.iter().enumerate() {
        let Some(actual) = arg.and_then(|v| caller.cell(v)) else {
            continue;
        };
        if let Some(formal) = callee.formal(cs.callee, index as u32) {
            roots.push((formal, actual));
        }
    }
    for (global, c1) in callee.globals() {
        if let Some(c2) = caller.global_cell(global) {
            roots.push((c1, c2));
        }
    }

    let simulated = roots
        .into_iter()
        .all(|(c1, c2)| mapper.insert_cells(callee, c1, caller, c2));

    tracing::trace!(
        "simulation {} -> {}: simulated={} pairs={} function={}",
        cs.callee,
        cs.caller,
        simulated,
        mapper.len(),
        mapper.is_function()
    );

    SimulationRelation { mapper, simulated }
}

/// Single-valued node map used to copy one graph into another
///
/// Keys are source nodes (resolved in the source graph); each maps to the
/// destination cell that byte 0 of the source node corresponds to.
#[derive(Debug, Clone, Default)]
pub struct FunctionalMapper {
    map: FxHashMap<NodeId, Cell>,
}

impl FunctionalMapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `src` onto `dst`
    ///
    /// Panics if `src.offset > dst.offset` or if the source node is already
    /// mapped somewhere else.
    pub fn insert(&mut self, src: Cell, dst: Cell) {
        assert!(
            src.offset <= dst.offset,
            "functional mapper: source offset {} exceeds destination offset {}",
            src.offset,
            dst.offset
        );
        let base = Cell::new(dst.node, dst.offset - src.offset);
        match self.map.entry(src.node) {
            Entry::Occupied(e) => assert_eq!(
                *e.get(),
                base,
                "functional mapper: {} mapped twice",
                src.node
            ),
            Entry::Vacant(e) => {
                e.insert(base);
            }
        }
    }

    /// Destination of byte 0 of `node`
    pub fn get(&self, node: NodeId) -> Option<Cell> {
        self.map.get(&node).copied()
    }

    /// Destination of a (resolved) source cell
    pub fn map_cell(&self, src: Cell) -> Option<Cell> {
        self.get(src.node).map(|base| base.shifted(src.offset))
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
