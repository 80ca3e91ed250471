use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use mediamirror_core::config::{load_from_layers, Config};
use mediamirror_core::ConfigError;
use tempfile::TempDir;

fn write(dir: &TempDir, name: &str, body: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, body).expect("write config");
    path
}

#[test]
fn no_layers_present_yields_defaults() {
    let dir = TempDir::new().expect("dir");
    let candidates = vec![dir.path().join("system.conf"), dir.path().join("local.conf")];

    let config = load_from_layers(None, &candidates).expect("load");
    assert_eq!(config, Config::default());
    assert!(config.origin.is_none());
}

#[test]
fn first_existing_layer_wins_and_later_layers_are_ignored() {
    let dir = TempDir::new().expect("dir");
    let system = write(&dir, "system.conf", "POLL_INTERVAL=7\n");
    let local = write(&dir, "local.conf", "POLL_INTERVAL=9\nIMAGE_WIDTH=99\n");

    let config = load_from_layers(None, &[system.clone(), local]).expect("load");
    assert_eq!(config.poll_interval, Duration::from_secs(7));
    // Not merged: IMAGE_WIDTH from the local layer is never read.
    assert_eq!(config.image_width, Config::default().image_width);
    assert_eq!(config.origin, Some(system));
}

#[test]
fn missing_system_layer_falls_through_to_local() {
    let dir = TempDir::new().expect("dir");
    let local = write(&dir, "local.conf", "SOURCE_DIR=/in\n");

    let config =
        load_from_layers(None, &[dir.path().join("absent.conf"), local.clone()]).expect("load");
    assert_eq!(config.source_dir, PathBuf::from("/in"));
    assert_eq!(config.origin, Some(local));
}

#[test]
fn explicit_path_overrides_every_layer() {
    let dir = TempDir::new().expect("dir");
    let system = write(&dir, "system.conf", "DEST_DIR=/system\n");
    let explicit = write(&dir, "override.conf", "DEST_DIR=/override\n");

    let config = load_from_layers(Some(&explicit), &[system]).expect("load");
    assert_eq!(config.dest_dir, PathBuf::from("/override"));
}

#[test]
fn explicit_path_must_exist() {
    let dir = TempDir::new().expect("dir");
    let system = write(&dir, "system.conf", "DEST_DIR=/system\n");
    let missing = dir.path().join("nope.conf");

    let err = load_from_layers(Some(&missing), &[system]).expect_err("should fail");
    assert!(matches!(err, ConfigError::NotFound { path } if path == missing));
}

#[test]
fn invalid_layer_is_reported_with_its_path() {
    let dir = TempDir::new().expect("dir");
    let broken = write(&dir, "system.conf", "IMAGE_WIDTH=huge\n");

    let err = load_from_layers(None, &[broken.clone()]).expect_err("should fail");
    assert!(err.to_string().contains(&broken.display().to_string()));
    assert!(err.to_string().contains("IMAGE_WIDTH"));
}
