#![allow(clippy::unwrap_used)]

use pretty_assertions::assert_eq;
use vpnbypass_config::{Config, load_config_from, save_config_to};
use vpnbypass_core::Settings;

#[test]
fn missing_file_loads_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = load_config_from(&dir.path().join("absent.json")).unwrap();
    assert_eq!(cfg, Config::default());
}

#[test]
fn saved_settings_survive_reload() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("config.json");

    let mut settings: Settings = Config::default().to_settings();
    settings.add_domain("https://Example.com/login").unwrap();
    settings.set_service_enabled("Signal", true).unwrap();
    settings.preferences.manage_hosts = true;

    let mut cfg = Config::default();
    cfg.update_from_settings(&settings);
    save_config_to(&cfg, &path).unwrap();

    assert!(!path.with_extension("json.tmp").exists());
    let reloaded = load_config_from(&path).unwrap().to_settings();
    assert_eq!(reloaded, settings);
}

#[test]
fn partial_document_fills_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(
        &path,
        r#"{"domains": [{"domain": "Example.org."}], "engine": {"batch_size": 50}}"#,
    )
    .unwrap();

    let cfg = load_config_from(&path).unwrap();
    assert_eq!(cfg.engine.batch_size, 50);
    assert_eq!(cfg.engine.elevation, vec!["sudo", "-n"]);

    let settings = cfg.to_settings();
    let entry = settings.domains.values().next().unwrap();
    assert_eq!(entry.domain, "example.org");
    assert!(entry.enabled);
}

#[test]
fn corrupt_document_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, "{ not json").unwrap();
    assert!(load_config_from(&path).is_err());
}
