//! Context-insensitive strategy
//!
//! Every function is built into one shared graph and every call site
//! unifies formals with actuals and the return cell with the call result.
//! Unification can make new functions reach an indirect call's pointer, so
//! call sites are rediscovered until no new (call, target) pair shows up.

use super::analyzer::{AnalysisStats, ShapeAnalysisResult};
use crate::config::{ShapeConfig, ShapeMode};
use crate::features::shape_analysis::domain::{CallSite, FuncId, Graph, Program};
use crate::features::shape_analysis::infrastructure::{discover_call_sites, LocalBuilder};
use std::collections::{BTreeMap, BTreeSet};

/// Unify a call site in place; caller and callee live in `graph`
pub fn unify_call_site(graph: &mut Graph, cs: &CallSite) {
    for (index, arg) in cs.args.iter().enumerate() {
        let (Some(actual), Some(formal)) = (arg, graph.formal(cs.callee, index as u32)) else {
            continue;
        };
        let actual = graph.cell_or_fresh(*actual);
        graph.unify(formal, actual);
    }

    if let (Some(result), Some(ret)) = (cs.result, graph.return_cell(cs.callee)) {
        let result = graph.cell_or_fresh(result);
        graph.unify(ret, result);
    }
}

pub(crate) fn analyze(program: &Program, config: &ShapeConfig) -> ShapeAnalysisResult {
    let mut graph = Graph::new(config.type_awareness, config.pointer_width);
    for function in &program.functions {
        LocalBuilder::new(program, &mut graph).build(function);
    }

    let mut seen: BTreeSet<(FuncId, usize, FuncId)> = BTreeSet::new();
    let mut call_sites = Vec::new();
    let mut rounds = 0;
    loop {
        rounds += 1;
        let mut fresh = Vec::new();
        for function in &program.functions {
            for cs in discover_call_sites(program, function, &graph) {
                if seen.insert((cs.caller, cs.index, cs.callee)) {
                    fresh.push(cs);
                }
            }
        }
        if fresh.is_empty() {
            break;
        }
        for cs in &fresh {
            unify_call_site(&mut graph, cs);
        }
        call_sites.extend(fresh);
    }
    tracing::debug!(
        "context-insensitive: {} call sites resolved in {} rounds",
        call_sites.len(),
        rounds
    );

    let graph_of: BTreeMap<FuncId, usize> = program.functions.iter().map(|f| (f.id, 0)).collect();
    let stats = AnalysisStats {
        sccs: 1,
        call_sites: call_sites.len(),
        intra_scc_calls: call_sites.len(),
        ..Default::default()
    };

    ShapeAnalysisResult {
        mode: ShapeMode::ContextInsensitive,
        graphs: vec![graph],
        graph_of,
        call_sites,
        stats,
    }
}
