//! Property-based tests for shape analysis configuration
//!
//! Tests invariants that should hold for ALL possible inputs:
//! - Roundtrip: from_yaml(to_yaml(x)) == x
//! - Validity: values inside the documented ranges always validate
//! - Patches: applying the diff between two configs recovers the target

use proptest::prelude::*;
use quickcheck::TestResult;
use quickcheck_macros::quickcheck;
use shapegraph_ir::config::*;
use shapegraph_ir::features::shape_analysis::TypeAwareness;
use std::io::Write;
use tempfile::NamedTempFile;

fn preset_from(idx: u8) -> Preset {
    match idx % 4 {
        0 => Preset::Fast,
        1 => Preset::Balanced,
        2 => Preset::Thorough,
        _ => Preset::Custom,
    }
}

fn mode_from(idx: u8) -> ShapeMode {
    match idx % 3 {
        0 => ShapeMode::ContextInsensitive,
        1 => ShapeMode::BottomUp,
        _ => ShapeMode::BottomUpTopDown,
    }
}

// ============================================================================
// QuickCheck Tests (simpler, faster)
// ============================================================================

#[quickcheck]
fn qc_worker_range_invariant(workers: usize, narrow: bool) -> TestResult {
    if workers > 256 {
        return TestResult::discard();
    }
    let config = ShapeConfig::default()
        .num_workers(workers)
        .pointer_width(if narrow { 4 } else { 8 });
    TestResult::from_bool(config.validate().is_ok())
}

#[quickcheck]
fn qc_pointer_width_only_four_or_eight(width: u32) -> bool {
    let mut config = ShapeConfig::default();
    if config.set("pointer_width", &width.to_string()).is_err() {
        return false;
    }
    config.validate().is_ok() == (width == 4 || width == 8)
}

#[quickcheck]
fn qc_preset_yaml_file_roundtrip(preset_idx: u8) -> bool {
    let config = ShapeConfig::from_preset(preset_from(preset_idx));
    let Ok(yaml) = config.to_yaml() else {
        return false;
    };

    let mut file = NamedTempFile::new().unwrap();
    file.write_all(yaml.as_bytes()).unwrap();
    matches!(ShapeConfig::from_yaml(file.path()), Ok(recovered) if recovered == config)
}

// ============================================================================
// Proptest Tests (more control over generation)
// ============================================================================

fn config_strategy() -> impl Strategy<Value = ShapeConfig> {
    (
        any::<u8>(),
        any::<bool>(),
        prop_oneof![Just(4u32), Just(8u32)],
        any::<bool>(),
        0usize..=256,
        any::<bool>(),
    )
        .prop_map(|(mode, aware, width, parallel, workers, sim)| {
            let mode = mode_from(mode);
            ShapeConfig::default()
                .mode(mode)
                .type_awareness(if aware {
                    TypeAwareness::Aware
                } else {
                    TypeAwareness::NotAware
                })
                .pointer_width(width)
                .enable_parallel(parallel)
                .num_workers(workers)
                .use_simulation_cloning(sim && mode != ShapeMode::ContextInsensitive)
        })
}

proptest! {
    #[test]
    fn prop_generated_configs_validate(config in config_strategy()) {
        prop_assert!(config.validate().is_ok());
    }

    #[test]
    fn prop_yaml_roundtrip(config in config_strategy()) {
        let yaml = config.to_yaml().unwrap();
        prop_assert_eq!(ShapeConfig::from_yaml_str(&yaml).unwrap(), config);
    }

    #[test]
    fn prop_patch_diff_recovers_target(base in config_strategy(), target in config_strategy()) {
        let diff = ShapeConfigPatch::diff(&base, &target);
        prop_assert_eq!(base.patch(&diff), target);
    }

    #[test]
    fn prop_workers_above_limit_rejected(workers in 257usize..10_000) {
        let config = ShapeConfig::default().num_workers(workers);
        let rejected = matches!(config.validate(), Err(ConfigError::Range { .. }));
        prop_assert!(rejected);
    }

    #[test]
    fn prop_unknown_keys_get_suggestions(key in "[a-z_]{3,20}") {
        prop_assume!(!ShapeConfig::FIELDS.contains(&key.as_str()));
        let mut config = ShapeConfig::default();
        let is_unknown = matches!(
            config.set(&key, "1"),
            Err(ConfigError::UnknownField { .. })
        );
        prop_assert!(is_unknown);
    }
}
