// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

use mte_server::config;

#[test]
fn load_falls_back_to_defaults_when_file_is_missing() {
    let result = config::load("/nonexistent/path/to/mte.toml").unwrap();
    assert_eq!(result.file_missing.as_deref(), Some("/nonexistent/path/to/mte.toml"));
    assert_eq!(result.config.server.address, "127.0.0.1:4545");
    assert_eq!(result.config.session.stable_partial_count, 3);
}

#[test]
fn load_reads_toml_overrides() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mte.toml");
    std::fs::write(&path, "[server]\naddress = \"0.0.0.0:9000\"\n").unwrap();

    let result = config::load(path.to_str().unwrap()).unwrap();
    assert!(result.file_missing.is_none());
    assert_eq!(result.config.server.address, "0.0.0.0:9000");
}

#[test]
fn generate_default_produces_parseable_toml() {
    let toml_string = config::generate_default().unwrap();
    let reparsed: toml::Value = toml::from_str(&toml_string).unwrap();
    assert!(reparsed.get("server").is_some());
}
