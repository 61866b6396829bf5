/*
 * Shapegraph IR - Unification-based Shape Analysis
 *
 * Feature-First Hexagonal Architecture:
 * - features/    : Vertical slices (shape_analysis: domain → infrastructure → application)
 * - config/      : Presets, stage config, YAML I/O
 * - errors       : Crate-level error type
 *
 * Performance:
 * - Arena-allocated nodes, union-find with path compression
 * - Rayon for per-function graph construction
 */

// Crate-level lint configuration
#![allow(clippy::type_complexity)] // Complex types are necessary for analysis
#![allow(clippy::new_without_default)] // Default impl not always needed
#![allow(clippy::module_inception)] // Module naming intentional

/// Feature modules
pub mod features;

/// Configuration system
pub mod config;

/// Error types
pub mod errors;

// ═══════════════════════════════════════════════════════════════════════════
// Re-exports for Public API
// ═══════════════════════════════════════════════════════════════════════════

pub use config::{Preset, ShapeConfig, ShapeMode};
pub use errors::{Result, ShapeGraphError};
pub use features::shape_analysis::{
    resolve_indirect_call, AnalysisSummary, Program, ShapeAnalysisResult, ShapeAnalyzer,
};
