//! Program model consumed by the analysis
//!
//! A deliberately small, memory-centric IR: only the instructions that move
//! or dereference pointers are represented. Front-ends lower their own IR
//! into this form (one `Instruction` per pointer-relevant operation).
//!
//! Value ids are program-wide, so the same `ValueId` never names two
//! different SSA values in two functions.

use super::field::FieldType;
use crate::errors::{Result, ShapeGraphError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Program-wide SSA value identifier
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub struct ValueId(pub u32);

/// Function identifier
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub struct FuncId(pub u32);

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

impl fmt::Display for FuncId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// Where an allocation lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AllocKind {
    #[default]
    Stack,
    Heap,
}

/// Target of a call instruction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Callee {
    Direct(FuncId),
    /// Call through a pointer; `targets` are supplied by an external call graph
    Indirect {
        pointer: ValueId,
        #[serde(default)]
        targets: Vec<FuncId>,
    },
    /// Code outside the analyzed program
    External(String),
}

/// Pointer-relevant instruction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Instruction {
    /// `dst = alloc(size)`; `array` for runtime-sized repeating regions
    Alloc {
        dst: ValueId,
        site: u32,
        size: u32,
        #[serde(default)]
        kind: AllocKind,
        #[serde(default)]
        array: bool,
    },
    /// `dst = src` (also casts, phis, selects)
    Copy { dst: ValueId, src: ValueId },
    /// `dst = &base->field` at a constant byte offset
    FieldAddr {
        dst: ValueId,
        base: ValueId,
        offset: u32,
    },
    /// `dst = &base[i]` with a runtime index and element stride
    IndexAddr {
        dst: ValueId,
        base: ValueId,
        stride: u32,
    },
    /// `dst = *addr`; `dst` only gets a cell when `pointer` is set
    Load {
        dst: ValueId,
        addr: ValueId,
        size: u32,
        #[serde(default)]
        ty: FieldType,
        #[serde(default)]
        pointer: bool,
    },
    /// `*addr = value`
    Store {
        addr: ValueId,
        value: ValueId,
        size: u32,
        #[serde(default)]
        ty: FieldType,
        #[serde(default)]
        pointer: bool,
    },
    /// `memcpy(dst, src, len)`
    Memcpy {
        dst: ValueId,
        src: ValueId,
        len: u32,
    },
    /// Pointer converted to an integer
    PtrToInt { src: ValueId },
    /// Integer converted to a pointer
    IntToPtr { dst: ValueId },
    /// `dst = &func`
    FuncAddr { dst: ValueId, func: FuncId },
    /// Call; `None` arguments are scalars
    Call {
        #[serde(default)]
        dst: Option<ValueId>,
        callee: Callee,
        #[serde(default)]
        args: Vec<Option<ValueId>>,
    },
    Return {
        #[serde(default)]
        value: Option<ValueId>,
    },
}

/// Formal parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Param {
    pub value: ValueId,
    #[serde(default)]
    pub pointer: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Function {
    pub id: FuncId,
    pub name: String,
    #[serde(default)]
    pub params: Vec<Param>,
    #[serde(default)]
    pub body: Vec<Instruction>,
}

impl Function {
    /// Call instructions with their position in the body
    pub fn calls(&self) -> impl Iterator<Item = (usize, &Instruction)> + '_ {
        self.body
            .iter()
            .enumerate()
            .filter(|(_, inst)| matches!(inst, Instruction::Call { .. }))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Global {
    pub value: ValueId,
    pub name: String,
    #[serde(default)]
    pub size: u32,
}

/// Whole program
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Program {
    #[serde(default)]
    pub functions: Vec<Function>,
    #[serde(default)]
    pub globals: Vec<Global>,
}

impl Program {
    pub fn function(&self, id: FuncId) -> Option<&Function> {
        self.functions.iter().find(|f| f.id == id)
    }

    pub fn global(&self, value: ValueId) -> Option<&Global> {
        self.globals.iter().find(|g| g.value == value)
    }

    #[inline]
    pub fn is_global(&self, value: ValueId) -> bool {
        self.global(value).is_some()
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let program: Program = serde_json::from_str(text)?;
        program.validate()?;
        Ok(program)
    }

    /// Check id uniqueness and that every direct/indirect target exists
    pub fn validate(&self) -> Result<()> {
        let mut ids = BTreeSet::new();
        for f in &self.functions {
            if !ids.insert(f.id) {
                return Err(ShapeGraphError::invalid_program(format!(
                    "duplicate function id {}",
                    f.id
                )));
            }
        }

        let mut globals = BTreeSet::new();
        for g in &self.globals {
            if !globals.insert(g.value) {
                return Err(ShapeGraphError::invalid_program(format!(
                    "duplicate global {}",
                    g.value
                )));
            }
        }

        for f in &self.functions {
            for (index, inst) in f.calls() {
                let Instruction::Call { callee, .. } = inst else {
                    continue;
                };
                let targets: Vec<FuncId> = match callee {
                    Callee::Direct(t) => vec![*t],
                    Callee::Indirect { targets, .. } => targets.clone(),
                    Callee::External(_) => Vec::new(),
                };
                for t in targets {
                    if !ids.contains(&t) {
                        return Err(ShapeGraphError::invalid_program(format!(
                            "call #{} in {} targets unknown function {}",
                            index, f.name, t
                        )));
                    }
                }
            }
        }

        Ok(())
    }
}

/// One resolved edge of the call graph: a call instruction and one target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSite {
    pub caller: FuncId,
    /// Position of the call in the caller's body
    pub index: usize,
    pub callee: FuncId,
    pub args: Vec<Option<ValueId>>,
    pub result: Option<ValueId>,
}

impl CallSite {
    pub fn new(caller: FuncId, index: usize, callee: FuncId) -> Self {
        Self {
            caller,
            index,
            callee,
            args: Vec::new(),
            result: None,
        }
    }

    pub fn with_args(mut self, args: Vec<Option<ValueId>>) -> Self {
        self.args = args;
        self
    }

    pub fn with_result(mut self, result: Option<ValueId>) -> Self {
        self.result = result;
        self
    }

    /// Every (call, statically known target) pair of a function
    pub fn collect(function: &Function) -> Vec<CallSite> {
        let mut sites = Vec::new();
        for (index, inst) in function.calls() {
            let Instruction::Call { dst, callee, args } = inst else {
                continue;
            };
            let targets: &[FuncId] = match callee {
                Callee::Direct(t) => std::slice::from_ref(t),
                Callee::Indirect { targets, .. } => targets,
                Callee::External(_) => &[],
            };
            for &t in targets {
                sites.push(
                    CallSite::new(function.id, index, t)
                        .with_args(args.clone())
                        .with_result(*dst),
                );
            }
        }
        sites
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(dst: Option<u32>, callee: Callee, args: Vec<Option<u32>>) -> Instruction {
        Instruction::Call {
            dst: dst.map(ValueId),
            callee,
            args: args.into_iter().map(|a| a.map(ValueId)).collect(),
        }
    }

    #[test]
    fn test_program_json_roundtrip_shape() {
        let text = r#"{
            "functions": [
                {"id": 0, "name": "main", "params": [], "body": [
                    {"op": "alloc", "dst": 1, "site": 0, "size": 8, "kind": "heap"},
                    {"op": "call", "dst": null, "callee": {"direct": 1}, "args": [1]}
                ]},
                {"id": 1, "name": "callee", "params": [{"value": 2, "pointer": true}], "body": [
                    {"op": "store", "addr": 2, "value": 2, "size": 8, "pointer": true}
                ]}
            ]
        }"#;

        let program = Program::from_json(text).unwrap();
        assert_eq!(program.functions.len(), 2);
        assert_eq!(CallSite::collect(&program.functions[0]).len(), 1);
    }

    #[test]
    fn test_validate_rejects_unknown_callee() {
        let program = Program {
            functions: vec![Function {
                id: FuncId(0),
                name: "main".into(),
                params: vec![],
                body: vec![call(None, Callee::Direct(FuncId(9)), vec![])],
            }],
            globals: vec![],
        };

        let err = program.validate().unwrap_err();
        assert!(err.to_string().contains("unknown function"));
    }

    #[test]
    fn test_validate_rejects_duplicate_ids() {
        let f = Function {
            id: FuncId(3),
            name: "f".into(),
            params: vec![],
            body: vec![],
        };
        let program = Program {
            functions: vec![f.clone(), f],
            globals: vec![],
        };
        assert!(program.validate().is_err());
    }

    #[test]
    fn test_collect_expands_indirect_targets() {
        let f = Function {
            id: FuncId(0),
            name: "main".into(),
            params: vec![],
            body: vec![
                call(
                    Some(5),
                    Callee::Indirect {
                        pointer: ValueId(4),
                        targets: vec![FuncId(1), FuncId(2)],
                    },
                    vec![Some(1), None],
                ),
                call(None, Callee::External("free".into()), vec![Some(1)]),
            ],
        };

        let sites = CallSite::collect(&f);
        assert_eq!(sites.len(), 2);
        assert_eq!(sites[0].callee, FuncId(1));
        assert_eq!(sites[1].callee, FuncId(2));
        assert_eq!(sites[1].result, Some(ValueId(5)));
        assert_eq!(sites[0].args, vec![Some(ValueId(1)), None]);
    }
}
