//! Fields: (offset, type) keys addressing the sub-objects of a node
//!
//! Type tracking is a per-graph setting (`TypeAwareness`), never a
//! process-wide switch. Fields stored in a graph are always normalized
//! under that graph's mode, so the derived ordering can be used directly as
//! a map key.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Concrete element type of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TypeTag {
    /// Front-end type identifier
    pub id: u32,

    /// Whether the element holds a pointer (as opposed to plain data)
    pub pointer: bool,
}

impl TypeTag {
    #[inline]
    pub fn data(id: u32) -> Self {
        Self { id, pointer: false }
    }

    #[inline]
    pub fn pointer(id: u32) -> Self {
        Self { id, pointer: true }
    }
}

/// Type component of a field
///
/// Variant order matters: `Unknown` is the bottom extreme of the ordering
/// and `Omni` the top one.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    /// No type information available
    #[default]
    Unknown,

    /// Type tracking disabled for the owning graph
    NotTypeAware,

    /// Concrete element type
    Typed(TypeTag),

    /// Wildcard: the single field of an offset-collapsed node
    Omni,
}

impl FieldType {
    /// `Omni` absorbs any other type; everything else matches only itself.
    #[inline]
    pub fn absorbs(&self, other: &FieldType) -> bool {
        *self == FieldType::Omni || self == other
    }
}

/// Whether field types participate in field identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TypeAwareness {
    #[default]
    Aware,
    NotAware,
}

impl TypeAwareness {
    /// Normalize a field type under this mode
    #[inline]
    pub fn normalize(self, ty: FieldType) -> FieldType {
        match (self, ty) {
            (_, FieldType::Omni) => FieldType::Omni,
            (TypeAwareness::NotAware, _) => FieldType::NotTypeAware,
            (TypeAwareness::Aware, FieldType::NotTypeAware) => FieldType::Unknown,
            (TypeAwareness::Aware, ty) => ty,
        }
    }
}

/// A (byte offset, type) key into a node's links
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Field {
    pub offset: u32,
    pub ty: FieldType,
}

impl Field {
    #[inline]
    pub fn new(offset: u32, ty: FieldType) -> Self {
        Self { offset, ty }
    }

    /// The only field of an offset-collapsed node
    #[inline]
    pub fn collapsed() -> Self {
        Self::new(0, FieldType::Omni)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ty {
            FieldType::Unknown => write!(f, "{}:?", self.offset),
            FieldType::NotTypeAware => write!(f, "{}", self.offset),
            FieldType::Typed(t) if t.pointer => write!(f, "{}:*t{}", self.offset, t.id),
            FieldType::Typed(t) => write!(f, "{}:t{}", self.offset, t.id),
            FieldType::Omni => write!(f, "{}:omni", self.offset),
        }
    }
}
