//! Indirect-call candidate filtering
//!
//! A function whose address reaches the called pointer is only a plausible
//! target if its graph is simulated by the caller's graph at the call:
//! whatever the candidate expects of its arguments must already be present
//! in the caller.

use super::analyzer::ShapeAnalysisResult;
use crate::errors::{Result, ShapeGraphError};
use crate::features::shape_analysis::domain::{CallSite, Callee, FuncId, Instruction, Program};
use crate::features::shape_analysis::infrastructure::compute_callee_caller_mapping;
use std::collections::BTreeSet;

/// Candidate targets of the indirect call at `call_index` in `function`
///
/// Candidates come from the function sites on the called pointer's node.
/// Candidates sharing the caller's graph are kept as they are already
/// unified with it.
pub fn resolve_indirect_call(
    program: &Program,
    result: &ShapeAnalysisResult,
    function: FuncId,
    call_index: usize,
) -> Result<Vec<FuncId>> {
    let f = program
        .function(function)
        .ok_or_else(|| ShapeGraphError::analysis(format!("unknown function {}", function)))?;

    let Some(Instruction::Call {
        dst,
        callee: Callee::Indirect { pointer, .. },
        args,
    }) = f.body.get(call_index)
    else {
        return Err(ShapeGraphError::analysis(format!(
            "instruction #{} of {} is not an indirect call",
            call_index, f.name
        )));
    };

    let (Some(caller), Some(k)) = (result.graph_for(function), result.graph_index(function))
    else {
        return Err(ShapeGraphError::analysis(format!(
            "{} was not analyzed",
            f.name
        )));
    };
    let Some(cell) = caller.cell(*pointer) else {
        return Ok(Vec::new());
    };

    let candidates: BTreeSet<FuncId> = caller
        .node(cell.node)
        .functions()
        .filter(|t| program.function(*t).is_some())
        .collect();

    let mut targets = Vec::new();
    for target in candidates {
        let (Some(callee), Some(j)) = (result.graph_for(target), result.graph_index(target)) else {
            continue;
        };
        if j == k {
            targets.push(target);
            continue;
        }
        let cs = CallSite::new(function, call_index, target)
            .with_args(args.clone())
            .with_result(*dst);
        let relation = compute_callee_caller_mapping(&cs, callee, caller);
        tracing::trace!(
            "indirect call #{} in {}: candidate {} simulated={}",
            call_index,
            f.name,
            target,
            relation.simulated
        );
        if relation.simulated {
            targets.push(target);
        }
    }
    Ok(targets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Preset, ShapeConfig};
    use crate::features::shape_analysis::application::bottom_up::build_local_graphs;
    use crate::features::shape_analysis::application::ShapeAnalyzer;

    /// `fp` may be `shallow` or `deep`; only `shallow` fits an argument
    /// without any pointer field
    const PROGRAM: &str = r#"{"functions": [
        {"id": 0, "name": "main", "body": [
            {"op": "func_addr", "dst": 1, "func": 1},
            {"op": "func_addr", "dst": 2, "func": 2},
            {"op": "copy", "dst": 3, "src": 1},
            {"op": "copy", "dst": 3, "src": 2},
            {"op": "alloc", "dst": 4, "site": 0, "size": 8},
            {"op": "call", "callee": {"indirect": {"pointer": 3}}, "args": [4]}
        ]},
        {"id": 1, "name": "shallow", "params": [{"value": 10, "pointer": true}], "body": [
            {"op": "load", "dst": 11, "addr": 10, "size": 8}
        ]},
        {"id": 2, "name": "deep", "params": [{"value": 20, "pointer": true}], "body": [
            {"op": "load", "dst": 21, "addr": 20, "size": 8, "pointer": true},
            {"op": "load", "dst": 22, "addr": 21, "size": 8}
        ]}
    ]}"#;

    #[test]
    fn test_candidates_filtered_by_simulation() {
        // against the local graphs, main's argument has no pointer field
        let program = Program::from_json(PROGRAM).unwrap();
        let config = ShapeConfig::default().enable_parallel(false);
        let result = ShapeAnalysisResult {
            mode: config.mode,
            graphs: build_local_graphs(&program, &config).unwrap(),
            graph_of: (0..3).map(|i| (FuncId(i), i as usize)).collect(),
            call_sites: Vec::new(),
            stats: Default::default(),
        };

        let targets = resolve_indirect_call(&program, &result, FuncId(0), 5).unwrap();
        assert_eq!(targets, vec![FuncId(1)]);
    }

    #[test]
    fn test_final_graphs_accept_cloned_targets() {
        let program = Program::from_json(PROGRAM).unwrap();
        let result = ShapeAnalyzer::new(ShapeConfig::from_preset(Preset::Balanced))
            .analyze(&program)
            .unwrap();
        assert_eq!(result.stats.call_sites, 2);

        // cloning `deep` gave main's argument the field it dereferences
        let targets = resolve_indirect_call(&program, &result, FuncId(0), 5).unwrap();
        assert_eq!(targets, vec![FuncId(1), FuncId(2)]);
    }

    #[test]
    fn test_not_an_indirect_call() {
        let program = Program::from_json(PROGRAM).unwrap();
        let result = ShapeAnalyzer::new(ShapeConfig::default())
            .analyze(&program)
            .unwrap();
        assert!(resolve_indirect_call(&program, &result, FuncId(0), 0).is_err());
        assert!(resolve_indirect_call(&program, &result, FuncId(7), 0).is_err());
    }

    #[test]
    fn test_context_insensitive_keeps_every_candidate() {
        let program = Program::from_json(PROGRAM).unwrap();
        let result = ShapeAnalyzer::new(ShapeConfig::from_preset(Preset::Fast))
            .analyze(&program)
            .unwrap();
        let targets = resolve_indirect_call(&program, &result, FuncId(0), 5).unwrap();
        assert_eq!(targets, vec![FuncId(1), FuncId(2)]);
    }
}
