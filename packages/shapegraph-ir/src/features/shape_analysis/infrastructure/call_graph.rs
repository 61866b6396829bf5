//! Call graph and bottom-up SCC order
//!
//! Edges come from the call sites of each function: direct targets,
//! explicit indirect targets, and, for indirect calls without explicit
//! targets, the functions whose address reaches the called pointer in the
//! caller's own graph.
//!
//! # References
//! - Tarjan, R. "Depth-First Search and Linear Graph Algorithms" (1972)

use crate::features::shape_analysis::domain::{
    CallSite, Callee, FuncId, Function, Graph, Instruction, Program,
};
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{BTreeMap, BTreeSet};

/// Call sites of `function`, completing target-less indirect calls from
/// the function sites visible in `graph`
pub fn discover_call_sites(program: &Program, function: &Function, graph: &Graph) -> Vec<CallSite> {
    let mut sites = CallSite::collect(function);

    for (index, inst) in function.calls() {
        let Instruction::Call {
            dst,
            callee: Callee::Indirect { pointer, targets },
            args,
        } = inst
        else {
            continue;
        };
        if !targets.is_empty() {
            continue;
        }
        let Some(cell) = graph.cell(*pointer) else {
            continue;
        };

        let found: BTreeSet<FuncId> = graph
            .node(cell.node)
            .functions()
            .filter(|f| program.function(*f).is_some())
            .collect();
        for target in found {
            sites.push(
                CallSite::new(function.id, index, target)
                    .with_args(args.clone())
                    .with_result(*dst),
            );
        }
    }
    sites
}

#[derive(Debug, Clone, Default)]
pub struct CallGraph {
    graph: DiGraph<FuncId, ()>,
    index: BTreeMap<FuncId, NodeIndex>,
}

impl CallGraph {
    /// One vertex per function, one edge per (caller, callee) pair
    pub fn build<'a>(
        functions: impl IntoIterator<Item = FuncId>,
        sites: impl IntoIterator<Item = &'a CallSite>,
    ) -> Self {
        let mut cg = Self::default();
        for f in functions {
            cg.vertex(f);
        }
        let mut seen = BTreeSet::new();
        for cs in sites {
            if seen.insert((cs.caller, cs.callee)) {
                let (a, b) = (cg.vertex(cs.caller), cg.vertex(cs.callee));
                cg.graph.add_edge(a, b, ());
            }
        }
        cg
    }

    fn vertex(&mut self, f: FuncId) -> NodeIndex {
        if let Some(&ix) = self.index.get(&f) {
            return ix;
        }
        let ix = self.graph.add_node(f);
        self.index.insert(f, ix);
        ix
    }

    pub fn function_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Strongly connected components, callees before callers
    ///
    /// Members of each component are sorted so the order is reproducible.
    pub fn sccs_bottom_up(&self) -> Vec<Vec<FuncId>> {
        tarjan_scc(&self.graph)
            .into_iter()
            .map(|scc| {
                let mut members: Vec<FuncId> = scc.into_iter().map(|n| self.graph[n]).collect();
                members.sort();
                members
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::shape_analysis::domain::ValueId;
    use crate::features::shape_analysis::infrastructure::local_builder::LocalBuilder;

    fn site(caller: u32, callee: u32) -> CallSite {
        CallSite::new(FuncId(caller), 0, FuncId(callee))
    }

    #[test]
    fn test_sccs_put_callees_first() {
        // 0 -> 1 -> 2 -> 1, 0 -> 3
        let sites = vec![site(0, 1), site(1, 2), site(2, 1), site(0, 3)];
        let cg = CallGraph::build((0..4).map(FuncId), &sites);
        let sccs = cg.sccs_bottom_up();

        assert_eq!(sccs.len(), 3);
        let pos = |f: u32| sccs.iter().position(|s| s.contains(&FuncId(f))).unwrap();
        assert_eq!(pos(1), pos(2));
        assert!(pos(1) < pos(0));
        assert!(pos(3) < pos(0));
        assert_eq!(sccs[pos(1)], vec![FuncId(1), FuncId(2)]);
    }

    #[test]
    fn test_duplicate_edges_collapse() {
        let sites = vec![site(0, 1), site(0, 1)];
        let cg = CallGraph::build([FuncId(0), FuncId(1)], &sites);
        assert_eq!(cg.edge_count(), 1);
        assert_eq!(cg.function_count(), 2);
    }

    #[test]
    fn test_indirect_targets_from_function_sites() {
        let text = r#"{"functions": [
            {"id": 0, "name": "main", "body": [
                {"op": "func_addr", "dst": 1, "func": 1},
                {"op": "copy", "dst": 2, "src": 1},
                {"op": "call", "callee": {"indirect": {"pointer": 2}}, "args": []}
            ]},
            {"id": 1, "name": "target"}
        ]}"#;
        let program = Program::from_json(text).unwrap();
        let main = &program.functions[0];
        let mut graph = Graph::default();
        LocalBuilder::new(&program, &mut graph).build(main);

        let sites = discover_call_sites(&program, main, &graph);
        assert_eq!(sites.len(), 1);
        assert_eq!(sites[0].callee, FuncId(1));
        assert_eq!(sites[0].index, 2);
        assert!(graph.cell(ValueId(2)).is_some());
    }
}
