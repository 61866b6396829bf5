//! Infrastructure layer for Shape Analysis
//!
//! Algorithms over the heap graph:
//! - **OffsetUnionFind**: node forwarding with accumulated byte offsets
//! - **SimulationMapper**: callee/caller structural correspondence
//! - **GraphExplorer**: three-color safety marking of callee graphs
//! - **Cloner**: copying graph regions across call sites
//! - **LocalBuilder**: per-function graph construction
//! - **CallGraph**: petgraph call graph with bottom-up SCC order

pub mod call_graph;
pub mod cloner;
pub mod graph_explorer;
pub mod local_builder;
pub mod simulation_mapper;
pub mod union_find;

pub use call_graph::{discover_call_sites, CallGraph};
pub use cloner::{CloneStats, Cloner};
pub use graph_explorer::{color_graph, Color, ColoredGraph, GraphExplorer};
pub use local_builder::LocalBuilder;
pub use simulation_mapper::{
    compute_callee_caller_mapping, FunctionalMapper, SimulationMapper, SimulationRelation,
};
pub use union_find::OffsetUnionFind;
