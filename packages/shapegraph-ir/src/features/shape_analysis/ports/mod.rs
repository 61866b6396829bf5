//! Ports (Interfaces) for Shape Analysis
//!
//! - **ShapeAnalysisPass**: anything that turns a `Program` into final graphs
//! - **AliasOracle**: alias queries over an analysis result
//! - **ShapeAnalysisFactory**: strategy selection from a mode or config

use crate::config::{ShapeConfig, ShapeMode};
use crate::errors::Result;
use crate::features::shape_analysis::application::{ShapeAnalysisResult, ShapeAnalyzer};
use crate::features::shape_analysis::domain::{FuncId, Program, ValueId};

/// Whole-program shape analysis
///
/// # Example (Generic - Zero-cost)
/// ```ignore
/// fn run<P: ShapeAnalysisPass>(pass: &P, program: &Program) -> Result<usize> {
///     Ok(pass.run(program)?.graphs().len())
/// }
/// ```
pub trait ShapeAnalysisPass: Send + Sync {
    fn name(&self) -> &'static str;

    fn mode(&self) -> ShapeMode;

    fn run(&self, program: &Program) -> Result<ShapeAnalysisResult>;
}

/// Alias queries over analysis output
pub trait AliasOracle {
    /// Whether two values of `func` may point into the same object
    fn may_alias(&self, func: FuncId, a: ValueId, b: ValueId) -> bool;

    /// Whether two values of `func` point to the same byte
    fn must_alias(&self, func: FuncId, a: ValueId, b: ValueId) -> bool;
}

impl ShapeAnalysisPass for ShapeAnalyzer {
    fn name(&self) -> &'static str {
        match self.config().mode {
            ShapeMode::ContextInsensitive => "shape-ci",
            ShapeMode::BottomUp => "shape-bu",
            ShapeMode::BottomUpTopDown => "shape-butd",
        }
    }

    fn mode(&self) -> ShapeMode {
        self.config().mode
    }

    fn run(&self, program: &Program) -> Result<ShapeAnalysisResult> {
        self.analyze(program)
    }
}

impl AliasOracle for ShapeAnalysisResult {
    fn may_alias(&self, func: FuncId, a: ValueId, b: ValueId) -> bool {
        ShapeAnalysisResult::may_alias(self, func, a, b)
    }

    fn must_alias(&self, func: FuncId, a: ValueId, b: ValueId) -> bool {
        let (Some(graph), Some(ca), Some(cb)) =
            (self.graph_for(func), self.cell_of(func, a), self.cell_of(func, b))
        else {
            return false;
        };
        if ca != cb {
            return false;
        }
        // folded offsets stand for many bytes
        let node = graph.node(ca.node);
        !node.is_array() && !node.is_offset_collapsed()
    }
}

/// Factory for creating analysis passes
pub struct ShapeAnalysisFactory;

impl ShapeAnalysisFactory {
    /// Pass for `mode` on top of the balanced preset
    pub fn create_boxed(mode: ShapeMode) -> Box<dyn ShapeAnalysisPass> {
        let mut config = ShapeConfig::default().mode(mode);
        if mode == ShapeMode::ContextInsensitive {
            config = config.use_simulation_cloning(false);
        }
        Box::new(ShapeAnalyzer::new(config))
    }

    /// Pass for a complete configuration, validated up front
    pub fn from_config(config: ShapeConfig) -> Result<Box<dyn ShapeAnalysisPass>> {
        config.validate()?;
        Ok(Box::new(ShapeAnalyzer::new(config)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROGRAM: &str = r#"{"functions": [
        {"id": 0, "name": "main", "body": [
            {"op": "alloc", "dst": 1, "site": 0, "size": 16},
            {"op": "field_addr", "dst": 2, "base": 1, "offset": 8},
            {"op": "copy", "dst": 3, "src": 2}
        ]}
    ]}"#;

    #[test]
    fn test_factory_modes() {
        let program = Program::from_json(PROGRAM).unwrap();
        for mode in [
            ShapeMode::ContextInsensitive,
            ShapeMode::BottomUp,
            ShapeMode::BottomUpTopDown,
        ] {
            let pass = ShapeAnalysisFactory::create_boxed(mode);
            assert_eq!(pass.mode(), mode);
            let result = pass.run(&program).unwrap();
            assert_eq!(result.mode, mode);
        }
    }

    #[test]
    fn test_from_config_validates() {
        let bad = ShapeConfig::default().num_workers(1000);
        assert!(ShapeAnalysisFactory::from_config(bad).is_err());
        let pass = ShapeAnalysisFactory::from_config(ShapeConfig::default()).unwrap();
        assert_eq!(pass.name(), "shape-bu");
    }

    #[test]
    fn test_alias_oracle() {
        let program = Program::from_json(PROGRAM).unwrap();
        let result = ShapeAnalysisFactory::create_boxed(ShapeMode::BottomUp)
            .run(&program)
            .unwrap();
        let oracle: &dyn AliasOracle = &result;
        let main = FuncId(0);
        assert!(oracle.may_alias(main, ValueId(1), ValueId(2)));
        assert!(!oracle.must_alias(main, ValueId(1), ValueId(2)));
        assert!(oracle.must_alias(main, ValueId(2), ValueId(3)));
    }
}
