//! Domain models for Shape Analysis
//!
//! Core abstractions shared by every analysis mode:
//! - Field: (offset, type) key of a sub-object
//! - Cell: (node, offset) reference, the unit of "points to"
//! - Node: abstract memory object with links and flags
//! - Graph: node arena plus the unification engine
//! - Program: the pointer-relevant IR the analysis consumes

pub mod cell;
pub mod field;
pub mod graph;
pub mod node;
pub mod program;

pub use cell::{Cell, NodeId};
pub use field::{Field, FieldType, TypeAwareness, TypeTag};
pub use graph::{Graph, GraphSnapshot, GraphStats, NodeSnapshot, DEFAULT_POINTER_WIDTH};
pub use node::{AllocSite, NodeFlags, NodeView, Offset};
pub use program::{
    AllocKind, CallSite, Callee, FuncId, Function, Global, Instruction, Param, Program, ValueId,
};
