//! High-level shape analyzer
//!
//! Unified entry point over the three interprocedural strategies:
//! - **ContextInsensitive**: one graph for the whole program
//! - **BottomUp**: per-SCC graphs, callee summaries cloned into callers
//! - **BottomUpTopDown**: bottom-up, then caller context pushed into callees
//!
//! # Usage
//! ```text
//! use shapegraph_ir::config::{Preset, ShapeConfig};
//! use shapegraph_ir::features::shape_analysis::ShapeAnalyzer;
//!
//! let program = Program::from_json(&text)?;
//! let result = ShapeAnalyzer::new(ShapeConfig::from_preset(Preset::Balanced))
//!     .analyze(&program)?;
//! assert!(result.may_alias(main, ValueId(1), ValueId(3)));
//! ```

use super::{bottom_up, context_insensitive};
use crate::config::{ShapeConfig, ShapeMode};
use crate::errors::Result;
use crate::features::shape_analysis::domain::{
    CallSite, Cell, FuncId, Graph, GraphSnapshot, GraphStats, Program, ValueId,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Instant;

/// Counters for one analysis run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisStats {
    pub functions: usize,
    pub sccs: usize,
    /// Resolved (call, target) pairs
    pub call_sites: usize,
    /// Calls unified in place (same graph on both sides)
    pub intra_scc_calls: usize,
    /// Callee summaries cloned into a caller
    pub cloned_calls: usize,
    /// Call sites where the callee graph was simulated by the caller
    pub simulated: usize,
    pub not_simulated: usize,
    pub copied_nodes: usize,
    pub folded_nodes: usize,
    /// Caller contexts cloned into a callee
    pub top_down_clones: usize,
    pub duration_ms: f64,
}

/// Final graphs of a run and where each function's facts live
#[derive(Debug, Clone)]
pub struct ShapeAnalysisResult {
    pub mode: ShapeMode,
    pub(crate) graphs: Vec<Graph>,
    pub(crate) graph_of: BTreeMap<FuncId, usize>,
    pub call_sites: Vec<CallSite>,
    pub stats: AnalysisStats,
}

/// Per-graph part of a summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphSummary {
    pub functions: Vec<FuncId>,
    pub stats: GraphStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<GraphSnapshot>,
}

/// Serializable report of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSummary {
    pub mode: ShapeMode,
    pub stats: AnalysisStats,
    pub graphs: Vec<GraphSummary>,
}

impl ShapeAnalysisResult {
    /// Graph holding the facts of `func`
    pub fn graph_for(&self, func: FuncId) -> Option<&Graph> {
        self.graph_of.get(&func).map(|&i| &self.graphs[i])
    }

    /// Index of the graph holding `func`; functions of one SCC share it
    pub fn graph_index(&self, func: FuncId) -> Option<usize> {
        self.graph_of.get(&func).copied()
    }

    pub fn graphs(&self) -> &[Graph] {
        &self.graphs
    }

    /// Resolved cell of a value as seen from `func`
    pub fn cell_of(&self, func: FuncId, value: ValueId) -> Option<Cell> {
        let graph = self.graph_for(func)?;
        graph.cell(value).map(|c| graph.resolve_readonly(c))
    }

    /// Whether two values of `func` may point into the same object
    pub fn may_alias(&self, func: FuncId, a: ValueId, b: ValueId) -> bool {
        let Some(graph) = self.graph_for(func) else {
            return false;
        };
        match (graph.cell(a), graph.cell(b)) {
            (Some(ca), Some(cb)) => graph.may_alias(ca, cb),
            _ => false,
        }
    }

    pub fn summary(&self, with_snapshots: bool) -> AnalysisSummary {
        let mut members: Vec<Vec<FuncId>> = vec![Vec::new(); self.graphs.len()];
        for (func, &i) in &self.graph_of {
            members[i].push(*func);
        }

        let graphs = self
            .graphs
            .iter()
            .zip(members)
            .map(|(graph, functions)| GraphSummary {
                functions,
                stats: graph.stats(),
                snapshot: with_snapshots.then(|| graph.snapshot()),
            })
            .collect();

        AnalysisSummary {
            mode: self.mode,
            stats: self.stats.clone(),
            graphs,
        }
    }
}

/// Shape analyzer for a whole program
#[derive(Debug, Clone, Default)]
pub struct ShapeAnalyzer {
    config: ShapeConfig,
}

impl ShapeAnalyzer {
    pub fn new(config: ShapeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ShapeConfig {
        &self.config
    }

    /// Validate configuration and program, then run the configured strategy
    pub fn analyze(&self, program: &Program) -> Result<ShapeAnalysisResult> {
        self.config.validate()?;
        program.validate()?;

        let start = Instant::now();
        tracing::info!(
            "shape analysis: {} functions, {} globals, mode {}",
            program.functions.len(),
            program.globals.len(),
            self.config.mode
        );

        let mut result = match self.config.mode {
            ShapeMode::ContextInsensitive => context_insensitive::analyze(program, &self.config),
            ShapeMode::BottomUp => bottom_up::analyze(program, &self.config, false)?,
            ShapeMode::BottomUpTopDown => bottom_up::analyze(program, &self.config, true)?,
        };
        result.stats.functions = program.functions.len();
        result.stats.duration_ms = start.elapsed().as_secs_f64() * 1000.0;

        tracing::info!(
            "shape analysis done in {:.2}ms: {} graphs, {} call sites ({} cloned, {} simulated)",
            result.stats.duration_ms,
            result.graphs.len(),
            result.stats.call_sites,
            result.stats.cloned_calls,
            result.stats.simulated
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Preset;

    /// main allocates two objects and passes both through `id`
    const PROGRAM: &str = r#"{"functions": [
        {"id": 0, "name": "main", "body": [
            {"op": "alloc", "dst": 1, "site": 0, "size": 8, "kind": "heap"},
            {"op": "alloc", "dst": 2, "site": 1, "size": 8, "kind": "heap"},
            {"op": "call", "dst": 3, "callee": {"direct": 1}, "args": [1]},
            {"op": "call", "dst": 4, "callee": {"direct": 1}, "args": [2]}
        ]},
        {"id": 1, "name": "id", "params": [{"value": 10, "pointer": true}], "body": [
            {"op": "return", "value": 10}
        ]}
    ]}"#;

    fn run(config: ShapeConfig) -> ShapeAnalysisResult {
        let program = Program::from_json(PROGRAM).unwrap();
        ShapeAnalyzer::new(config).analyze(&program).unwrap()
    }

    #[test]
    fn test_context_insensitive_merges_through_callee() {
        let result = run(ShapeConfig::from_preset(Preset::Fast));
        assert_eq!(result.graphs().len(), 1);
        assert!(result.may_alias(FuncId(0), ValueId(1), ValueId(2)));
        assert_eq!(result.stats.functions, 2);
        assert_eq!(result.stats.call_sites, 2);
    }

    #[test]
    fn test_bottom_up_keeps_call_sites_apart() {
        let result = run(ShapeConfig::from_preset(Preset::Balanced));
        let main = FuncId(0);
        assert!(result.may_alias(main, ValueId(1), ValueId(3)));
        assert!(result.may_alias(main, ValueId(2), ValueId(4)));
        assert!(!result.may_alias(main, ValueId(1), ValueId(2)));
        assert_eq!(result.stats.cloned_calls, 2);
        assert_eq!(result.stats.sccs, 2);
        assert_ne!(result.graph_index(FuncId(0)), result.graph_index(FuncId(1)));
    }

    #[test]
    fn test_summary_lists_graph_members() {
        let result = run(ShapeConfig::from_preset(Preset::Thorough));
        let summary = result.summary(true);
        assert_eq!(summary.mode, ShapeMode::BottomUpTopDown);
        let all: Vec<FuncId> = summary
            .graphs
            .iter()
            .flat_map(|g| g.functions.clone())
            .collect();
        assert_eq!(all.len(), 2);
        assert!(summary.graphs.iter().all(|g| g.snapshot.is_some()));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let program = Program::from_json(PROGRAM).unwrap();
        let config = ShapeConfig::default().pointer_width(3);
        assert!(ShapeAnalyzer::new(config).analyze(&program).is_err());
    }

    #[test]
    fn test_unknown_function_queries() {
        let result = run(ShapeConfig::default());
        assert!(result.graph_for(FuncId(9)).is_none());
        assert!(!result.may_alias(FuncId(9), ValueId(1), ValueId(1)));
        assert!(result.cell_of(FuncId(0), ValueId(99)).is_none());
    }
}
