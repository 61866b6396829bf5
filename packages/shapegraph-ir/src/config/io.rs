//! Configuration I/O (YAML loading and export)

use super::error::{ConfigError, ConfigResult};
use super::patch::ShapeConfigPatch;
use super::preset::Preset;
use super::stage_configs::{ShapeConfig, ShapeMode};
use super::validation;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Supported schema versions
pub const SUPPORTED_VERSIONS: [u32; 1] = [1];

/// YAML Schema v1
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigExportV1 {
    /// Schema version (always 1 for v1)
    pub version: Option<u32>,

    /// Base preset
    pub preset: String,

    /// Fine-grained overrides
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overrides: Option<ShapeConfigPatch>,
}

impl ShapeConfig {
    /// Load from a YAML file
    pub fn from_yaml(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Load from YAML text: preset first, then overrides, then validation
    pub fn from_yaml_str(content: &str) -> ConfigResult<Self> {
        let export: ConfigExportV1 = serde_yaml::from_str(content)?;

        let version = export.version.ok_or(ConfigError::MissingVersion)?;
        if !SUPPORTED_VERSIONS.contains(&version) {
            return Err(ConfigError::UnsupportedVersion {
                found: version,
                supported: SUPPORTED_VERSIONS.to_vec(),
            });
        }

        let preset = Preset::parse(&export.preset)?;
        let mut config = ShapeConfig::from_preset(preset);
        if let Some(overrides) = &export.overrides {
            config = config.patch(overrides);
        }
        validation::check(&config)?;
        Ok(config)
    }

    /// Export as YAML: the preset matching the mode plus the differing fields
    pub fn to_yaml(&self) -> ConfigResult<String> {
        let preset = match self.mode {
            ShapeMode::ContextInsensitive => Preset::Fast,
            ShapeMode::BottomUp => Preset::Balanced,
            ShapeMode::BottomUpTopDown => Preset::Thorough,
        };
        let diff = ShapeConfigPatch::diff(&ShapeConfig::from_preset(preset), self);

        let export = ConfigExportV1 {
            version: Some(1),
            preset: preset.as_str().to_string(),
            overrides: (!diff.is_empty()).then_some(diff),
        };
        Ok(serde_yaml::to_string(&export)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::shape_analysis::domain::TypeAwareness;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_yaml_roundtrip() {
        let config = ShapeConfig::from_preset(Preset::Thorough).pointer_width(4);

        let yaml = config.to_yaml().unwrap();
        assert!(yaml.contains("version: 1"));
        assert!(yaml.contains("preset: thorough"));
        assert!(yaml.contains("pointer_width: 4"));

        assert_eq!(ShapeConfig::from_yaml_str(&yaml).unwrap(), config);
    }

    #[test]
    fn test_yaml_loading() {
        let yaml_content = r#"
version: 1
preset: fast
overrides:
  type_awareness: aware
  num_workers: 2
"#;
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(yaml_content.as_bytes()).unwrap();

        let config = ShapeConfig::from_yaml(file.path()).unwrap();
        assert_eq!(config.mode, ShapeMode::ContextInsensitive);
        assert_eq!(config.type_awareness, TypeAwareness::Aware);
        assert_eq!(config.num_workers, 2);
    }

    #[test]
    fn test_missing_version() {
        let result = ShapeConfig::from_yaml_str("preset: balanced\n");
        assert!(matches!(result, Err(ConfigError::MissingVersion)));
    }

    #[test]
    fn test_unsupported_version() {
        let result = ShapeConfig::from_yaml_str("version: 2\npreset: balanced\n");
        assert!(matches!(
            result,
            Err(ConfigError::UnsupportedVersion { found: 2, .. })
        ));
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let yaml = "version: 1\npreset: balanced\noverrides:\n  max_depth: 3\n";
        assert!(matches!(
            ShapeConfig::from_yaml_str(yaml),
            Err(ConfigError::Yaml(_))
        ));
    }

    #[test]
    fn test_overrides_are_validated() {
        let yaml = "version: 1\npreset: balanced\noverrides:\n  pointer_width: 3\n";
        assert!(matches!(
            ShapeConfig::from_yaml_str(yaml),
            Err(ConfigError::Range { .. })
        ));
    }

    #[test]
    fn test_missing_file() {
        let result = ShapeConfig::from_yaml("/nonexistent/shape.yaml");
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}
