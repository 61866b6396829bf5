//! Intraprocedural graph construction
//!
//! Walks one function's instructions once, in order, and applies the
//! unification transfer function of each. Flow-insensitive: the order only
//! affects which nodes are created first, never the final aliasing.
//!
//! Calls to analyzed functions only make sure the argument and result cells
//! exist; wiring them to the callee is the job of the global analyses.

use crate::features::shape_analysis::domain::{
    AllocKind, AllocSite, Callee, Cell, FieldType, Function, Graph, Instruction, NodeFlags,
    Program, ValueId,
};

pub struct LocalBuilder<'a> {
    program: &'a Program,
    graph: &'a mut Graph,
}

impl<'a> LocalBuilder<'a> {
    pub fn new(program: &'a Program, graph: &'a mut Graph) -> Self {
        Self { program, graph }
    }

    /// Cell of a value; globals live in the graph's global map
    fn cell(&mut self, value: ValueId) -> Cell {
        match self.program.global(value) {
            Some(g) => self.graph.global_or_insert(value, g.size),
            None => self.graph.cell_or_fresh(value),
        }
    }

    fn bind(&mut self, value: ValueId, cell: Cell) {
        if self.program.is_global(value) {
            self.graph.bind_global(value, cell);
        } else {
            self.graph.bind_value(value, cell);
        }
    }

    fn fresh(&mut self, flags: NodeFlags) -> Cell {
        Cell::new(self.graph.mk_node_with(0, flags), 0)
    }

    pub fn build(&mut self, function: &Function) {
        tracing::debug!(
            "building local graph for {} ({} instructions)",
            function.name,
            function.body.len()
        );

        self.graph.add_function(function.id);
        for (index, param) in function.params.iter().enumerate() {
            if param.pointer {
                let cell = self.cell(param.value);
                self.graph.bind_formal(function.id, index as u32, cell);
            }
        }

        for inst in &function.body {
            self.visit(function, inst);
        }
    }

    fn visit(&mut self, function: &Function, inst: &Instruction) {
        match inst {
            Instruction::Alloc {
                dst,
                site,
                size,
                kind,
                array,
            } => {
                let flags = match kind {
                    AllocKind::Stack => NodeFlags::STACK,
                    AllocKind::Heap => NodeFlags::HEAP,
                };
                let mut cell = self.graph.mk_alloc(*size, flags, AllocSite::Alloc(*site));
                if *array {
                    cell = self.graph.mark_array(cell, *size);
                }
                self.bind(*dst, cell);
            }
            Instruction::Copy { dst, src } => {
                let cell = self.cell(*src);
                self.bind(*dst, cell);
            }
            Instruction::FieldAddr { dst, base, offset } => {
                let cell = self.cell(*base);
                self.bind(*dst, cell.shifted(*offset));
            }
            Instruction::IndexAddr { dst, base, stride } => {
                let cell = self.cell(*base);
                let cell = self.graph.mark_array(cell, *stride);
                self.bind(*dst, cell);
            }
            Instruction::Load {
                dst,
                addr,
                size,
                ty,
                pointer,
            } => {
                let at = self.cell(*addr);
                self.graph.access(at, *size, NodeFlags::READ);
                if *pointer {
                    let target = self.graph.link(at, *ty);
                    self.bind(*dst, target);
                }
            }
            Instruction::Store {
                addr,
                value,
                size,
                ty,
                pointer,
            } => {
                let at = self.cell(*addr);
                self.graph.access(at, *size, NodeFlags::MODIFIED);
                if *pointer {
                    let target = self.cell(*value);
                    self.graph.add_link(at, *ty, target);
                }
            }
            Instruction::Memcpy { dst, src, len } => {
                let to = self.cell(*dst);
                let from = self.cell(*src);
                self.graph.access(to, *len, NodeFlags::MODIFIED);
                self.graph.access(from, *len, NodeFlags::READ);
                self.graph.unify(to, from);
            }
            Instruction::PtrToInt { src } => {
                let cell = self.cell(*src);
                self.graph.set_flags(cell, NodeFlags::ESCAPES_TO_INT);
            }
            Instruction::IntToPtr { dst } => {
                let cell = self.fresh(NodeFlags::EXTERNAL);
                self.bind(*dst, cell);
            }
            Instruction::FuncAddr { dst, func } => {
                let cell = self
                    .graph
                    .mk_alloc(0, NodeFlags::FUNCTION, AllocSite::Function(*func));
                self.bind(*dst, cell);
            }
            Instruction::Call { dst, callee, args } => match callee {
                Callee::External(name) => {
                    tracing::trace!("external call to {} from {}", name, function.name);
                    let escaped = NodeFlags::EXTERNAL | NodeFlags::MODIFIED | NodeFlags::READ;
                    for arg in args.iter().flatten() {
                        let cell = self.cell(*arg);
                        self.graph.set_flags(cell, escaped);
                    }
                    if let Some(dst) = dst {
                        let cell = self.fresh(NodeFlags::EXTERNAL);
                        self.bind(*dst, cell);
                    }
                }
                Callee::Direct(_) | Callee::Indirect { .. } => {
                    if let Callee::Indirect { pointer, .. } = callee {
                        self.cell(*pointer);
                    }
                    for arg in args.iter().flatten() {
                        self.cell(*arg);
                    }
                    if let Some(dst) = dst {
                        self.cell(*dst);
                    }
                }
            },
            Instruction::Return { value } => {
                if let Some(value) = value {
                    let cell = self.cell(*value);
                    self.graph.bind_return(function.id, cell);
                }
            }
        }
    }
}
