//! Copying graph regions between graphs
//!
//! Bottom-up: the part of a callee graph reachable from its formals, its
//! return cell and its globals is copied into the caller, then the copies
//! are unified with the actual arguments, the call result and the caller's
//! globals. With a `ColoredGraph`, safe and simulated callee nodes are folded
//! straight onto their caller image instead of being copied.
//!
//! Top-down: the caller's actuals, call result and globals are copied into
//! the callee and unified with its formals, return cell and globals.
//!
//! Source nodes are tracked in a `FunctionalMapper`, so shared structure and
//! cycles in the source are copied once.

use super::graph_explorer::ColoredGraph;
use super::simulation_mapper::FunctionalMapper;
use crate::features::shape_analysis::domain::{CallSite, Cell, Graph};

/// Counters for one or more clone operations
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CloneStats {
    /// Fresh nodes created in the destination
    pub copied: usize,
    /// Source nodes folded onto an existing destination node
    pub folded: usize,
}

pub struct Cloner<'a> {
    src: &'a Graph,
    dst: &'a mut Graph,
    map: FunctionalMapper,
    colored: Option<&'a ColoredGraph>,
    stats: CloneStats,
}

impl<'a> Cloner<'a> {
    pub fn new(src: &'a Graph, dst: &'a mut Graph) -> Self {
        Self {
            src,
            dst,
            map: FunctionalMapper::new(),
            colored: None,
            stats: CloneStats::default(),
        }
    }

    /// Fold safe simulated nodes onto their caller images
    pub fn with_coloring(mut self, colored: &'a ColoredGraph) -> Self {
        self.colored = Some(colored);
        self
    }

    pub fn stats(&self) -> CloneStats {
        self.stats
    }

    /// Destination cell for a source cell, copying its region on first use
    pub fn clone_cell(&mut self, cell: Cell) -> Cell {
        let src = self.src;
        let cell = src.resolve_readonly(cell);
        if let Some(image) = self.map.map_cell(cell) {
            return image;
        }

        let view = src.node(cell.node);
        let base = match self.colored.and_then(|c| c.direct_image(cell.node)) {
            Some(image) => {
                self.dst.set_flags(image, view.flags());
                self.dst
                    .add_alloc_sites(image.node, view.alloc_sites().copied());
                self.stats.folded += 1;
                image
            }
            None => {
                let id = self.dst.mk_node_with(view.size(), view.flags());
                self.dst.add_alloc_sites(id, view.alloc_sites().copied());
                self.stats.copied += 1;
                Cell::new(id, 0)
            }
        };
        self.map.insert(Cell::new(cell.node, 0), base);

        for (field, target) in view.links() {
            let image = self.clone_cell(*target);
            self.dst.add_link(base.shifted(field.offset), field.ty, image);
        }
        base.shifted(cell.offset)
    }

    /// Copy a callee summary into the caller at `cs`
    pub fn clone_callee_into_caller(&mut self, cs: &CallSite) {
        let src = self.src;
        for (index, arg) in cs.args.iter().enumerate() {
            let (Some(actual), Some(formal)) = (arg, src.formal(cs.callee, index as u32)) else {
                continue;
            };
            let image = self.clone_cell(formal);
            let actual = self.dst.cell_or_fresh(*actual);
            self.dst.unify(image, actual);
        }

        if let (Some(result), Some(ret)) = (cs.result, src.return_cell(cs.callee)) {
            let image = self.clone_cell(ret);
            let result = self.dst.cell_or_fresh(result);
            self.dst.unify(image, result);
        }

        for (global, cell) in src.globals() {
            let image = self.clone_cell(cell);
            self.dst.bind_global(global, image);
        }
    }

    /// Push caller context at `cs` into the callee graph
    pub fn clone_caller_into_callee(&mut self, cs: &CallSite) {
        let src = self.src;
        for (index, arg) in cs.args.iter().enumerate() {
            let Some(actual) = arg.and_then(|v| src.cell(v)) else {
                continue;
            };
            let Some(formal) = self.dst.formal(cs.callee, index as u32) else {
                continue;
            };
            let image = self.clone_cell(actual);
            self.dst.unify(formal, image);
        }

        if let Some(result) = cs.result.and_then(|v| src.cell(v)) {
            if let Some(ret) = self.dst.return_cell(cs.callee) {
                let image = self.clone_cell(result);
                self.dst.unify(ret, image);
            }
        }

        // only globals the callee already knows about
        for (global, cell) in src.globals() {
            if let Some(own) = self.dst.global_cell(global) {
                let image = self.clone_cell(cell);
                self.dst.unify(own, image);
            }
        }
    }

    /// Copy every binding of the source graph (values, formals, returns,
    /// globals, summarized functions) into the destination
    pub fn clone_all(&mut self) {
        let src = self.src;
        for func in src.functions() {
            self.dst.add_function(func);
            for (index, cell) in src.formals_of(func) {
                let image = self.clone_cell(cell);
                self.dst.bind_formal(func, index, image);
            }
            if let Some(ret) = src.return_cell(func) {
                let image = self.clone_cell(ret);
                self.dst.bind_return(func, image);
            }
        }

        let mut values: Vec<_> = src.values().collect();
        values.sort();
        for (value, cell) in values {
            let image = self.clone_cell(cell);
            self.dst.bind_value(value, image);
        }

        for (global, cell) in src.globals() {
            let image = self.clone_cell(cell);
            self.dst.bind_global(global, image);
        }
    }
}
