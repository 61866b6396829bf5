//! Patch types with all-optional fields
//!
//! Used for partial overrides on top of a preset (YAML `overrides:`).

use super::stage_configs::{ShapeConfig, ShapeMode};
use crate::features::shape_analysis::domain::TypeAwareness;
use serde::{Deserialize, Serialize};

/// Patch type for ShapeConfig (all fields optional)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShapeConfigPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<ShapeMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub type_awareness: Option<TypeAwareness>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pointer_width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_parallel: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_workers: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_simulation_cloning: Option<bool>,
}

impl ShapeConfigPatch {
    /// Fields of `config` that differ from `base`
    pub fn diff(base: &ShapeConfig, config: &ShapeConfig) -> Self {
        fn changed<T: PartialEq + Copy>(a: T, b: T) -> Option<T> {
            (a != b).then_some(b)
        }
        Self {
            mode: changed(base.mode, config.mode),
            type_awareness: changed(base.type_awareness, config.type_awareness),
            pointer_width: changed(base.pointer_width, config.pointer_width),
            enable_parallel: changed(base.enable_parallel, config.enable_parallel),
            num_workers: changed(base.num_workers, config.num_workers),
            use_simulation_cloning: changed(
                base.use_simulation_cloning,
                config.use_simulation_cloning,
            ),
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl ShapeConfig {
    /// Apply a patch over this configuration
    pub fn patch(mut self, patch: &ShapeConfigPatch) -> Self {
        if let Some(v) = patch.mode {
            self.mode = v;
        }
        if let Some(v) = patch.type_awareness {
            self.type_awareness = v;
        }
        if let Some(v) = patch.pointer_width {
            self.pointer_width = v;
        }
        if let Some(v) = patch.enable_parallel {
            self.enable_parallel = v;
        }
        if let Some(v) = patch.num_workers {
            self.num_workers = v;
        }
        if let Some(v) = patch.use_simulation_cloning {
            self.use_simulation_cloning = v;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Preset;

    #[test]
    fn test_partial_patch_keeps_preset_values() {
        let config = ShapeConfig::from_preset(Preset::Thorough).patch(&ShapeConfigPatch {
            pointer_width: Some(4),
            ..Default::default()
        });
        assert_eq!(config.pointer_width, 4);
        assert_eq!(config.mode, ShapeMode::BottomUpTopDown);
    }

    #[test]
    fn test_diff_then_patch_restores() {
        let base = ShapeConfig::from_preset(Preset::Balanced);
        let target = base.clone().mode(ShapeMode::ContextInsensitive).use_simulation_cloning(false);
        let diff = ShapeConfigPatch::diff(&base, &target);
        assert_eq!(diff.pointer_width, None);
        assert_eq!(base.patch(&diff), target);
        assert!(ShapeConfigPatch::diff(&target, &target).is_empty());
    }
}
