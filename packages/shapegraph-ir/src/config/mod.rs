//! Shape analysis configuration
//!
//! Three levels, each building on the previous one:
//! - Preset: `ShapeConfig::from_preset(Preset::Fast)`
//! - Builder overrides: `ShapeConfig::default().pointer_width(4)`
//! - YAML: `ShapeConfig::from_yaml("shape.yaml")`, a preset plus a patch
//!
//! # Examples
//!
//! ```rust,ignore
//! use shapegraph_ir::config::{Preset, ShapeConfig, ShapeMode};
//!
//! let config = ShapeConfig::from_preset(Preset::Balanced)
//!     .mode(ShapeMode::BottomUpTopDown)
//!     .num_workers(4);
//! config.validate()?;
//! ```

pub mod error;
pub mod io;
pub mod patch;
pub mod preset;
pub mod stage_configs;
pub mod validation;

// Re-exports
pub use error::{ConfigError, ConfigResult};
pub use io::{ConfigExportV1, SUPPORTED_VERSIONS};
pub use patch::ShapeConfigPatch;
pub use preset::Preset;
pub use stage_configs::{ShapeConfig, ShapeMode};
pub use validation::{check, Validatable};
