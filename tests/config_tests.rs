// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for configuration module

use medview::config::PowerPreference;
use medview::{Config, PlaneType, SliceConfig, SliceSelection};
use std::path::PathBuf;

fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("medview_{}_{}.json", name, uuid::Uuid::new_v4()))
}

#[test]
fn test_config_default() {
    let config = Config::default();

    assert_eq!(config.slice.slice, SliceSelection::Auto);
    assert_eq!(config.slice.plane, PlaneType::Z);
    assert_eq!(config.slice.window, None);
    assert_eq!(config.slice.level, None);
    assert_eq!(config.power_preference, PowerPreference::HighPerformance);
    assert!(config.validate().is_ok());
}

#[test]
fn test_config_save_load_preserves_settings() {
    let path = temp_path("roundtrip");
    let config = Config {
        slice: SliceConfig {
            plane: PlaneType::Y,
            slice: SliceSelection::Index(12),
            window: Some(400.0),
            level: Some(40.0),
        },
        output_size: 256,
        power_preference: PowerPreference::LowPower,
    };

    config.save(&path).unwrap();
    let loaded = Config::load(&path).unwrap();
    let _ = std::fs::remove_file(&path);

    assert_eq!(loaded, config);
}

#[test]
fn test_config_load_rejects_invalid_window() {
    let path = temp_path("invalid");
    std::fs::write(&path, r#"{ "slice": { "window": -1.0 } }"#).unwrap();
    let result = Config::load(&path);
    let _ = std::fs::remove_file(&path);

    assert!(matches!(result, Err(medview::RenderError::InvalidConfig(_))));
}

#[test]
fn test_config_load_missing_file() {
    let result = Config::load(&temp_path("missing"));
    assert!(matches!(result, Err(medview::RenderError::Io(_))));
}

#[test]
fn test_zero_output_size_rejected() {
    let config = Config {
        output_size: 0,
        ..Config::default()
    };
    assert!(config.validate().is_err());
}
