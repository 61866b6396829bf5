//! Application layer for Shape Analysis
//!
//! - **ShapeAnalyzer**: runs the configured interprocedural strategy
//! - **context_insensitive**: one whole-program graph
//! - **bottom_up**: per-SCC graphs with callee cloning, optional top-down pass
//! - **resolve_indirect_call**: simulation-filtered indirect call targets

pub mod analyzer;
pub mod bottom_up;
pub mod call_resolution;
pub mod context_insensitive;

pub use analyzer::{
    AnalysisStats, AnalysisSummary, GraphSummary, ShapeAnalysisResult, ShapeAnalyzer,
};
pub use bottom_up::build_local_graphs;
pub use call_resolution::resolve_indirect_call;
pub use context_insensitive::unify_call_site;
