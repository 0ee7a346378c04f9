use sieve::SieveError;
use sieve::config::{Config, NeighborMethod, OracleMode};
use tempfile::tempdir;

#[test]
fn test_project_file_overrides_defaults() {
    let root = tempdir().unwrap();
    std::fs::write(
        root.path().join("config.toml"),
        r#"
        [limits]
        max_active_buckets = 3

        [model]
        oracle = { mode = "active_learning", ratio = 0.2 }
        "#,
    )
    .unwrap();
    let explicit = root.path().join("missing.toml");

    // an explicit path that does not exist means defaults only
    let config = Config::load(Some(&explicit), root.path()).unwrap();
    assert_eq!(config.limits.max_active_buckets, 7);

    let project = root.path().join("config.toml");
    let config = Config::load(Some(&project), root.path()).unwrap();
    assert_eq!(config.limits.max_active_buckets, 3);
    assert_eq!(config.model.oracle, OracleMode::ActiveLearning { ratio: 0.2 });
    assert_eq!(
        config.model.exploration.map(|e| e.method),
        Some(NeighborMethod::Ann)
    );
}

#[test]
fn test_malformed_file_is_a_config_error() {
    let root = tempdir().unwrap();
    let path = root.path().join("config.toml");
    std::fs::write(&path, "[session\ngrid_rows = ").unwrap();
    let err = Config::load(Some(&path), root.path()).unwrap_err();
    assert!(matches!(err, SieveError::Config(_)));
    assert_eq!(err.code(), "config_error");
}

#[test]
fn test_grid_larger_than_its_maximum_is_rejected() {
    let err = Config::from_toml_str("[session]\ngrid_rows = 12\n").unwrap_err();
    assert!(err.to_string().contains("grid"));
}
