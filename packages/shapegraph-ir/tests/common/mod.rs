//! Common test utilities for shapegraph-ir
//!
//! Builders for small programs and a one-call analysis helper.

#![allow(dead_code)]

use shapegraph_ir::config::{ShapeConfig, ShapeMode};
use shapegraph_ir::features::shape_analysis::domain::{
    AllocKind, Callee, FieldType, FuncId, Function, Global, Instruction, Param, Program, ValueId,
};
use shapegraph_ir::{ShapeAnalysisResult, ShapeAnalyzer};

pub const WIDTH: u32 = 8;

pub fn v(id: u32) -> ValueId {
    ValueId(id)
}

/// Builder for one function body
#[derive(Debug)]
pub struct FunctionBuilder {
    function: Function,
}

impl FunctionBuilder {
    pub fn new(id: u32, name: &str) -> Self {
        Self {
            function: Function {
                id: FuncId(id),
                name: name.to_string(),
                params: Vec::new(),
                body: Vec::new(),
            },
        }
    }

    pub fn pointer_param(mut self, value: u32) -> Self {
        self.function.params.push(Param {
            value: v(value),
            pointer: true,
        });
        self
    }

    pub fn scalar_param(mut self, value: u32) -> Self {
        self.function.params.push(Param {
            value: v(value),
            pointer: false,
        });
        self
    }

    fn push(mut self, inst: Instruction) -> Self {
        self.function.body.push(inst);
        self
    }

    pub fn heap(self, dst: u32, site: u32, size: u32) -> Self {
        self.push(Instruction::Alloc {
            dst: v(dst),
            site,
            size,
            kind: AllocKind::Heap,
            array: false,
        })
    }

    pub fn field(self, dst: u32, base: u32, offset: u32) -> Self {
        self.push(Instruction::FieldAddr {
            dst: v(dst),
            base: v(base),
            offset,
        })
    }

    /// `dst = *addr` of a pointer
    pub fn load(self, dst: u32, addr: u32) -> Self {
        self.push(Instruction::Load {
            dst: v(dst),
            addr: v(addr),
            size: WIDTH,
            ty: FieldType::Unknown,
            pointer: true,
        })
    }

    /// `*addr = value` of a pointer
    pub fn store(self, addr: u32, value: u32) -> Self {
        self.push(Instruction::Store {
            addr: v(addr),
            value: v(value),
            size: WIDTH,
            ty: FieldType::Unknown,
            pointer: true,
        })
    }

    /// Scalar write of `size` bytes
    pub fn write(self, addr: u32, size: u32) -> Self {
        self.push(Instruction::Store {
            addr: v(addr),
            value: v(0),
            size,
            ty: FieldType::Unknown,
            pointer: false,
        })
    }

    pub fn call(self, dst: Option<u32>, callee: u32, args: &[Option<u32>]) -> Self {
        self.push(Instruction::Call {
            dst: dst.map(v),
            callee: Callee::Direct(FuncId(callee)),
            args: args.iter().map(|a| a.map(v)).collect(),
        })
    }

    pub fn external(self, name: &str, args: &[u32]) -> Self {
        self.push(Instruction::Call {
            dst: None,
            callee: Callee::External(name.to_string()),
            args: args.iter().map(|a| Some(v(*a))).collect(),
        })
    }

    pub fn ret(self, value: u32) -> Self {
        self.push(Instruction::Return {
            value: Some(v(value)),
        })
    }

    pub fn build(self) -> Function {
        self.function
    }
}

/// Builder for a whole program
#[derive(Debug, Default)]
pub struct ProgramBuilder {
    program: Program,
}

impl ProgramBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn global(mut self, value: u32, name: &str, size: u32) -> Self {
        self.program.globals.push(Global {
            value: v(value),
            name: name.to_string(),
            size,
        });
        self
    }

    pub fn function(mut self, function: FunctionBuilder) -> Self {
        self.program.functions.push(function.build());
        self
    }

    pub fn build(self) -> Program {
        self.program
    }
}

/// Analyze with the balanced preset switched to `mode`
pub fn analyze(program: &Program, mode: ShapeMode) -> ShapeAnalysisResult {
    let mut config = ShapeConfig::default().mode(mode).enable_parallel(false);
    if mode == ShapeMode::ContextInsensitive {
        config = config.use_simulation_cloning(false);
    }
    ShapeAnalyzer::new(config)
        .analyze(program)
        .expect("analysis succeeds")
}
