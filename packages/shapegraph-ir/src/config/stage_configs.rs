//! Stage configuration for shape analysis
//!
//! Each setting has a preset default, a builder setter and range validation.

use super::error::{ConfigError, ConfigResult};
use super::preset::Preset;
use super::validation::Validatable;
use crate::features::shape_analysis::domain::TypeAwareness;
use serde::{Deserialize, Serialize};

/// Interprocedural strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ShapeMode {
    /// One graph for the whole program; calls unify directly
    ContextInsensitive,
    /// Per-SCC graphs, callee summaries cloned into callers
    #[default]
    BottomUp,
    /// Bottom-up, then caller context cloned into callees
    BottomUpTopDown,
}

impl ShapeMode {
    pub fn parse(s: &str) -> ConfigResult<Self> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "context-insensitive" | "ci" => Ok(Self::ContextInsensitive),
            "bottom-up" | "bu" => Ok(Self::BottomUp),
            "bottom-up-top-down" | "butd" => Ok(Self::BottomUpTopDown),
            _ => Err(ConfigError::UnknownMode(s.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ContextInsensitive => "context-insensitive",
            Self::BottomUp => "bottom-up",
            Self::BottomUpTopDown => "bottom-up-top-down",
        }
    }
}

impl std::fmt::Display for ShapeMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Shape analysis configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShapeConfig {
    /// Interprocedural strategy
    pub mode: ShapeMode,

    /// Whether field types take part in field identity
    pub type_awareness: TypeAwareness,

    /// Pointer size in bytes (4 or 8)
    pub pointer_width: u32,

    /// Build per-function graphs on the rayon pool
    pub enable_parallel: bool,

    /// Worker threads for parallel construction (0=all cores, 1..=256)
    pub num_workers: usize,

    /// Fold safe simulated callee nodes onto caller nodes when cloning
    pub use_simulation_cloning: bool,
}

impl ShapeConfig {
    /// Keys accepted by `set`
    pub const FIELDS: [&'static str; 6] = [
        "mode",
        "type_awareness",
        "pointer_width",
        "enable_parallel",
        "num_workers",
        "use_simulation_cloning",
    ];

    /// Validate configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.pointer_width != 4 && self.pointer_width != 8 {
            return Err(ConfigError::range_with_hint(
                "pointer_width",
                self.pointer_width,
                4,
                8,
                "Pointer width must be 4 or 8 bytes",
            ));
        }

        if self.num_workers > 256 {
            return Err(ConfigError::range_with_hint(
                "num_workers",
                self.num_workers,
                0,
                256,
                "Number of workers must be reasonable (0=auto)",
            ));
        }

        if self.use_simulation_cloning && self.mode == ShapeMode::ContextInsensitive {
            return Err(ConfigError::Validation(
                "use_simulation_cloning requires a bottom-up mode".to_string(),
            ));
        }

        Ok(())
    }

    /// Builder: Set mode
    pub fn mode(mut self, v: ShapeMode) -> Self {
        self.mode = v;
        self
    }

    /// Builder: Set type_awareness
    pub fn type_awareness(mut self, v: TypeAwareness) -> Self {
        self.type_awareness = v;
        self
    }

    /// Builder: Set pointer_width
    pub fn pointer_width(mut self, v: u32) -> Self {
        self.pointer_width = v;
        self
    }

    /// Builder: Set enable_parallel
    pub fn enable_parallel(mut self, v: bool) -> Self {
        self.enable_parallel = v;
        self
    }

    /// Builder: Set num_workers
    pub fn num_workers(mut self, v: usize) -> Self {
        self.num_workers = v;
        self
    }

    /// Builder: Set use_simulation_cloning
    pub fn use_simulation_cloning(mut self, v: bool) -> Self {
        self.use_simulation_cloning = v;
        self
    }

    /// Set one field from its textual form (`key=value` overrides)
    pub fn set(&mut self, key: &str, value: &str) -> ConfigResult<()> {
        let invalid = |expected: &str| {
            ConfigError::Validation(format!("{} expects {}, got '{}'", key, expected, value))
        };

        match key {
            "mode" => self.mode = ShapeMode::parse(value)?,
            "type_awareness" => {
                self.type_awareness = match value {
                    "aware" => TypeAwareness::Aware,
                    "not_aware" | "not-aware" => TypeAwareness::NotAware,
                    _ => return Err(invalid("aware|not_aware")),
                }
            }
            "pointer_width" => self.pointer_width = value.parse().map_err(|_| invalid("u32"))?,
            "enable_parallel" => {
                self.enable_parallel = value.parse().map_err(|_| invalid("bool"))?
            }
            "num_workers" => self.num_workers = value.parse().map_err(|_| invalid("usize"))?,
            "use_simulation_cloning" => {
                self.use_simulation_cloning = value.parse().map_err(|_| invalid("bool"))?
            }
            _ => {
                return Err(ConfigError::unknown_field_with_suggestion(
                    key,
                    "shape",
                    Self::FIELDS.iter().map(|f| f.to_string()).collect(),
                ))
            }
        }
        Ok(())
    }

    /// Worker count with 0 resolved to the number of cores
    pub fn effective_workers(&self) -> usize {
        if self.num_workers == 0 {
            num_cpus::get()
        } else {
            self.num_workers
        }
    }

    /// Get preset configuration
    pub fn from_preset(preset: Preset) -> Self {
        match preset {
            Preset::Fast => Self {
                mode: ShapeMode::ContextInsensitive,
                type_awareness: TypeAwareness::NotAware,
                pointer_width: 8,
                enable_parallel: true,
                num_workers: 0,
                use_simulation_cloning: false,
            },
            Preset::Balanced => Self {
                mode: ShapeMode::BottomUp,
                type_awareness: TypeAwareness::Aware,
                pointer_width: 8,
                enable_parallel: true,
                num_workers: 0,
                use_simulation_cloning: true,
            },
            Preset::Thorough => Self {
                mode: ShapeMode::BottomUpTopDown,
                type_awareness: TypeAwareness::Aware,
                pointer_width: 8,
                enable_parallel: true,
                num_workers: 0,
                use_simulation_cloning: true,
            },
            Preset::Custom => Self::default(),
        }
    }
}

impl Default for ShapeConfig {
    fn default() -> Self {
        Self::from_preset(Preset::Balanced)
    }
}

impl Validatable for ShapeConfig {
    fn validate(&self) -> ConfigResult<()> {
        ShapeConfig::validate(self)
    }

    fn config_name(&self) -> &'static str {
        "ShapeConfig"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_validate() {
        for preset in [Preset::Fast, Preset::Balanced, Preset::Thorough, Preset::Custom] {
            assert!(ShapeConfig::from_preset(preset).validate().is_ok(), "{}", preset);
        }
        assert_eq!(ShapeConfig::default().mode, ShapeMode::BottomUp);
    }

    #[test]
    fn test_pointer_width_validation() {
        let config = ShapeConfig::default().pointer_width(4);
        assert!(config.validate().is_ok());

        let config = ShapeConfig::default().pointer_width(2);
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Range { .. }));
    }

    #[test]
    fn test_simulation_cloning_needs_bottom_up() {
        let config = ShapeConfig::from_preset(Preset::Fast).use_simulation_cloning(true);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_num_workers_range() {
        assert!(ShapeConfig::default().num_workers(256).validate().is_ok());
        assert!(ShapeConfig::default().num_workers(257).validate().is_err());
        assert_eq!(ShapeConfig::default().num_workers(3).effective_workers(), 3);
        assert!(ShapeConfig::default().effective_workers() >= 1);
    }

    #[test]
    fn test_set_fields() {
        let mut config = ShapeConfig::default();
        config.set("mode", "bottom_up_top_down").unwrap();
        config.set("pointer_width", "4").unwrap();
        config.set("type_awareness", "not_aware").unwrap();
        config.set("enable_parallel", "false").unwrap();
        assert_eq!(config.mode, ShapeMode::BottomUpTopDown);
        assert_eq!(config.pointer_width, 4);
        assert_eq!(config.type_awareness, TypeAwareness::NotAware);
        assert!(!config.enable_parallel);

        assert!(matches!(
            config.set("pointer_widht", "8"),
            Err(ConfigError::UnknownField { .. })
        ));
        assert!(config.set("num_workers", "many").is_err());
    }

    #[test]
    fn test_mode_parse() {
        assert_eq!(ShapeMode::parse("ci").unwrap(), ShapeMode::ContextInsensitive);
        assert_eq!(ShapeMode::parse("Bottom-Up").unwrap(), ShapeMode::BottomUp);
        assert!(ShapeMode::parse("sideways").is_err());
        assert_eq!(ShapeMode::BottomUpTopDown.to_string(), "bottom-up-top-down");
    }
}
