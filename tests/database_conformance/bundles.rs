//! Bundle layout, storage engine selection and missing databases

use docstore::{Database, DatabaseConfig, DatabaseFlags, ErrorCode};
use tempfile::TempDir;

#[test]
fn test_open_bundle() {
    let dir = TempDir::new().unwrap();
    let bundle_path = dir.path().join("docstore_test_bundle");
    let mut config = DatabaseConfig::with_flags(DatabaseFlags::CREATE | DatabaseFlags::BUNDLED);

    assert!(!Database::delete_at_path(&bundle_path, &config).unwrap());
    let bundle = Database::open(&bundle_path, &config).unwrap();
    assert_eq!(bundle.path(), bundle_path.as_path());
    assert!(bundle_path.is_dir());
    bundle.close().unwrap();

    // Reopen without the create flag
    config.flags = DatabaseFlags::BUNDLED;
    let bundle = Database::open(&bundle_path, &config).unwrap();
    bundle.close().unwrap();

    // Reopen with the wrong storage engine
    let bogus = config.clone().storage_engine("b0gus");
    let err = Database::open(&bundle_path, &bogus).unwrap_err();
    assert!(err.is(ErrorCode::WrongFormat));

    // Open a nonexistent bundle
    let err = Database::open(dir.path().join("no_such_bundle"), &config).unwrap_err();
    assert!(err.is(ErrorCode::CantOpenFile));

    assert!(Database::delete_at_path(&bundle_path, &config).unwrap());
    assert!(!bundle_path.exists());
}

#[test]
fn test_delete_open_database_is_busy() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("busy.db");
    let config = DatabaseConfig::default();
    let db = Database::open(&path, &config).unwrap();

    assert!(Database::delete_at_path(&path, &config)
        .unwrap_err()
        .is(ErrorCode::Busy));
    db.close().unwrap();
    assert!(Database::delete_at_path(&path, &config).unwrap());
}

#[test]
fn test_config_from_toml() {
    let dir = TempDir::new().unwrap();
    let config = DatabaseConfig::from_toml_str(
        r#"
        flags = "CREATE | BUNDLED"
        storage_engine = "log"
        "#,
    )
    .unwrap();
    assert!(config.is_bundled());

    let db = Database::open(dir.path().join("from_toml"), &config).unwrap();
    assert!(dir.path().join("from_toml").is_dir());
    db.close().unwrap();
}
