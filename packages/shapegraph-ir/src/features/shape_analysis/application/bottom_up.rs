//! Bottom-up and bottom-up/top-down strategies
//!
//! 1. Local graphs are built per function (in parallel on a rayon pool).
//! 2. The call graph is condensed into SCCs, visited callees first. The
//!    members of an SCC share one graph; calls inside it unify in place.
//! 3. Calls leaving the SCC clone the callee's (already final) graph into
//!    the SCC graph, folding safe simulated nodes when enabled.
//! 4. Top-down (optional): SCCs in reverse order clone each caller's
//!    context into the graphs of its callees.

use super::analyzer::{AnalysisStats, ShapeAnalysisResult};
use super::context_insensitive::unify_call_site;
use crate::config::{ShapeConfig, ShapeMode};
use crate::errors::{Result, ShapeGraphError};
use crate::features::shape_analysis::domain::{CallSite, FuncId, Function, Graph, Program};
use crate::features::shape_analysis::infrastructure::{
    color_graph, discover_call_sites, CallGraph, Cloner, LocalBuilder,
};
use rayon::prelude::*;
use std::collections::BTreeMap;

/// One local graph per function, in program order
pub fn build_local_graphs(program: &Program, config: &ShapeConfig) -> Result<Vec<Graph>> {
    let build = |function: &Function| {
        let mut graph = Graph::new(config.type_awareness, config.pointer_width);
        LocalBuilder::new(program, &mut graph).build(function);
        graph
    };

    if !config.enable_parallel || program.functions.len() < 2 {
        return Ok(program.functions.iter().map(build).collect());
    }

    let workers = config.effective_workers();
    tracing::debug!(
        "building {} local graphs on {} workers",
        program.functions.len(),
        workers
    );
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("shapegraph-worker-{}", i))
        .build()
        .map_err(|e| ShapeGraphError::analysis(format!("failed to build thread pool: {}", e)))?;

    Ok(pool.install(|| program.functions.par_iter().map(build).collect()))
}

/// Mutable and shared access to two distinct graphs
fn pair_mut(graphs: &mut [Graph], write: usize, read: usize) -> (&mut Graph, &Graph) {
    assert_ne!(write, read, "a graph cannot be cloned into itself");
    if write < read {
        let (lo, hi) = graphs.split_at_mut(read);
        (&mut lo[write], &hi[0])
    } else {
        let (lo, hi) = graphs.split_at_mut(write);
        (&mut hi[0], &lo[read])
    }
}

pub(crate) fn analyze(
    program: &Program,
    config: &ShapeConfig,
    top_down: bool,
) -> Result<ShapeAnalysisResult> {
    let locals = build_local_graphs(program, config)?;

    let mut call_sites = Vec::new();
    for (function, graph) in program.functions.iter().zip(&locals) {
        call_sites.extend(discover_call_sites(program, function, graph));
    }
    let call_graph = CallGraph::build(program.functions.iter().map(|f| f.id), &call_sites);
    let sccs = call_graph.sccs_bottom_up();
    tracing::debug!(
        "call graph: {} functions, {} edges, {} SCCs",
        call_graph.function_count(),
        call_graph.edge_count(),
        sccs.len()
    );

    let mut by_caller: BTreeMap<FuncId, Vec<&CallSite>> = BTreeMap::new();
    for cs in &call_sites {
        by_caller.entry(cs.caller).or_default().push(cs);
    }

    let position: BTreeMap<FuncId, usize> = program
        .functions
        .iter()
        .enumerate()
        .map(|(i, f)| (f.id, i))
        .collect();
    let mut locals: Vec<Option<Graph>> = locals.into_iter().map(Some).collect();

    let mut stats = AnalysisStats {
        sccs: sccs.len(),
        call_sites: call_sites.len(),
        ..Default::default()
    };
    let mut graphs: Vec<Graph> = Vec::with_capacity(sccs.len());
    let mut graph_of: BTreeMap<FuncId, usize> = BTreeMap::new();

    for scc in &sccs {
        let k = graphs.len();
        let mut members = scc
            .iter()
            .filter_map(|f| position.get(f).and_then(|&i| locals[i].take()));

        let graph = if scc.len() == 1 {
            members
                .next()
                .unwrap_or_else(|| Graph::new(config.type_awareness, config.pointer_width))
        } else {
            let mut merged = Graph::new(config.type_awareness, config.pointer_width);
            for local in members {
                let mut cloner = Cloner::new(&local, &mut merged);
                cloner.clone_all();
                stats.copied_nodes += cloner.stats().copied;
            }
            merged
        };
        graphs.push(graph);
        for f in scc {
            graph_of.insert(*f, k);
        }

        for cs in scc.iter().flat_map(|f| by_caller.get(f).into_iter().flatten()) {
            let Some(&j) = graph_of.get(&cs.callee) else {
                continue;
            };
            if j == k {
                unify_call_site(&mut graphs[k], cs);
                stats.intra_scc_calls += 1;
                continue;
            }

            let (caller, callee) = pair_mut(&mut graphs, k, j);
            let clone_stats = if config.use_simulation_cloning {
                let colored = color_graph(cs, callee, caller);
                if colored.relation.simulated {
                    stats.simulated += 1;
                } else {
                    stats.not_simulated += 1;
                }
                let mut cloner = Cloner::new(callee, caller).with_coloring(&colored);
                cloner.clone_callee_into_caller(cs);
                cloner.stats()
            } else {
                let mut cloner = Cloner::new(callee, caller);
                cloner.clone_callee_into_caller(cs);
                cloner.stats()
            };
            stats.cloned_calls += 1;
            stats.copied_nodes += clone_stats.copied;
            stats.folded_nodes += clone_stats.folded;
        }
    }

    if top_down {
        for k in (0..graphs.len()).rev() {
            let scc = &sccs[k];
            for cs in scc.iter().flat_map(|f| by_caller.get(f).into_iter().flatten()) {
                let Some(&j) = graph_of.get(&cs.callee) else {
                    continue;
                };
                if j == k {
                    continue;
                }
                let (callee, caller) = pair_mut(&mut graphs, j, k);
                Cloner::new(caller, callee).clone_caller_into_callee(cs);
                stats.top_down_clones += 1;
            }
        }
    }

    let mode = if top_down {
        ShapeMode::BottomUpTopDown
    } else {
        ShapeMode::BottomUp
    };
    Ok(ShapeAnalysisResult {
        mode,
        graphs,
        graph_of,
        call_sites,
        stats,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Preset;
    use crate::features::shape_analysis::domain::{NodeFlags, ValueId};

    /// f and g call each other; main calls f
    const RECURSIVE: &str = r#"{"functions": [
        {"id": 0, "name": "main", "body": [
            {"op": "alloc", "dst": 1, "site": 0, "size": 16, "kind": "heap"},
            {"op": "call", "callee": {"direct": 1}, "args": [1]}
        ]},
        {"id": 1, "name": "f", "params": [{"value": 10, "pointer": true}], "body": [
            {"op": "load", "dst": 11, "addr": 10, "size": 8, "pointer": true},
            {"op": "call", "callee": {"direct": 2}, "args": [11]}
        ]},
        {"id": 2, "name": "g", "params": [{"value": 20, "pointer": true}], "body": [
            {"op": "store", "addr": 20, "value": 20, "size": 8, "pointer": true},
            {"op": "call", "callee": {"direct": 1}, "args": [20]}
        ]}
    ]}"#;

    #[test]
    fn test_recursive_functions_share_a_graph() {
        let program = Program::from_json(RECURSIVE).unwrap();
        let config = ShapeConfig::from_preset(Preset::Balanced).enable_parallel(false);
        let result = analyze(&program, &config, false).unwrap();

        assert_eq!(result.graph_index(FuncId(1)), result.graph_index(FuncId(2)));
        assert_ne!(result.graph_index(FuncId(0)), result.graph_index(FuncId(1)));
        assert_eq!(result.stats.intra_scc_calls, 2);
        assert_eq!(result.stats.cloned_calls, 1);

        // g stores its formal into itself, and f passes *p to g, which
        // calls f back with it: p and *p end up the same object
        let graph = result.graph_for(FuncId(1)).unwrap();
        let p = graph.formal(FuncId(1), 0).unwrap();
        let q = graph.formal(FuncId(2), 0).unwrap();
        assert!(graph.may_alias(p, q));
        assert!(graph.node(p.node).is_modified());

        let main = result.graph_for(FuncId(0)).unwrap();
        let obj = main.cell(ValueId(1)).unwrap();
        assert!(main.node(obj.node).is_modified());
        assert!(main.node(obj.node).flags().contains(NodeFlags::HEAP));
    }

    #[test]
    fn test_parallel_and_sequential_builds_agree() {
        let program = Program::from_json(RECURSIVE).unwrap();
        let seq = ShapeConfig::default().enable_parallel(false);
        let par = ShapeConfig::default().enable_parallel(true).num_workers(2);

        let a = build_local_graphs(&program, &seq).unwrap();
        let b = build_local_graphs(&program, &par).unwrap();
        assert_eq!(a.len(), 3);
        for (x, y) in a.iter().zip(&b) {
            assert_eq!(x.snapshot(), y.snapshot());
        }
    }

    #[test]
    fn test_top_down_pushes_caller_flags_into_callee() {
        let text = r#"{"functions": [
            {"id": 0, "name": "main", "body": [
                {"op": "int_to_ptr", "dst": 1},
                {"op": "call", "callee": {"direct": 1}, "args": [1]}
            ]},
            {"id": 1, "name": "use", "params": [{"value": 10, "pointer": true}], "body": [
                {"op": "load", "dst": 11, "addr": 10, "size": 8}
            ]}
        ]}"#;
        let program = Program::from_json(text).unwrap();
        let config = ShapeConfig::from_preset(Preset::Thorough).enable_parallel(false);
        let result = analyze(&program, &config, true).unwrap();
        assert_eq!(result.stats.top_down_clones, 1);

        let callee = result.graph_for(FuncId(1)).unwrap();
        let formal = callee.formal(FuncId(1), 0).unwrap();
        assert!(callee.node(formal.node).flags().contains(NodeFlags::EXTERNAL));
    }

    #[test]
    fn test_pair_mut_orders() {
        let mut graphs = vec![Graph::default(), Graph::default(), Graph::default()];
        graphs[2].mk_node();
        let (w, r) = pair_mut(&mut graphs, 0, 2);
        assert_eq!(r.node_count(), 1);
        w.mk_node();
        let (w, r) = pair_mut(&mut graphs, 2, 0);
        assert_eq!(r.node_count(), 1);
        assert_eq!(w.node_count(), 1);
    }
}
