use loom_core::{ActorIdentity, FailureKind, Visibility};
use loom_storage::{SqliteStore, StoreConfig, StoreError};
use rusqlite::{Connection, params};
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn toml_config_fills_defaults() {
    let config = StoreConfig::from_toml_str(r#"storage_dir = "/var/lib/storyloom""#)
        .expect("minimal config should parse");
    assert_eq!(config.db_file, "storyloom.db");
    assert_eq!(config.busy_timeout(), Duration::from_millis(5_000));
    assert!(config.journal_mode_wal);
    assert!(config.db_path().ends_with("storyloom.db"));
}

#[test]
fn toml_config_rejects_unknown_keys_and_paths() {
    let err = StoreConfig::from_toml_str(
        r#"
        storage_dir = "/tmp/x"
        cache_size = 10
        "#,
    )
    .expect_err("unknown keys must be rejected");
    assert!(matches!(err, StoreError::Config(_)), "got {err:?}");
    assert_eq!(err.kind(), FailureKind::InvalidInput);

    let err = StoreConfig::from_toml_str(
        r#"
        storage_dir = "/tmp/x"
        db_file = "../escape.db"
        "#,
    )
    .expect_err("db_file must be a bare file name");
    assert_eq!(err.code(), "INVALID_INPUT");
}

#[test]
fn loaded_config_opens_the_named_database() {
    let dir = TempDir::new().expect("temp dir must be creatable");
    let config_path = dir.path().join("store.toml");
    let storage_dir = dir.path().join("data");
    std::fs::write(
        &config_path,
        format!(
            "storage_dir = {:?}\ndb_file = \"tales.db\"\nbusy_timeout_ms = 250\njournal_mode_wal = false\n",
            storage_dir.display().to_string()
        ),
    )
    .expect("config should be written");

    let config = StoreConfig::load(&config_path).expect("config should load");
    let mut store = SqliteStore::open_with_config(config).expect("store should open");
    assert_eq!(store.db_path(), storage_dir.join("tales.db"));
    assert_eq!(store.storage_dir(), storage_dir.as_path());

    let actor = ActorIdentity::try_new("alice").expect("actor id must be valid");
    let story = store
        .story_create(&actor, "Saga", Visibility::Private)
        .expect("story should be created");
    drop(store);

    let reopened = SqliteStore::open_with_config(
        StoreConfig::load(&config_path).expect("config should load"),
    )
    .expect("store should reopen");
    assert!(
        reopened
            .story_get(&story.id)
            .expect("get should succeed")
            .is_some()
    );
}

#[test]
fn open_is_fail_closed_on_foreign_schema() {
    let dir = TempDir::new().expect("temp dir must be creatable");
    let conn = Connection::open(dir.path().join("storyloom.db")).expect("legacy db must open");
    conn.execute("CREATE TABLE legacy_stories(id TEXT PRIMARY KEY)", [])
        .expect("legacy table should be created");
    drop(conn);

    let err = SqliteStore::open(dir.path()).expect_err("legacy storage must be rejected");
    assert_eq!(err.code(), "RESET_REQUIRED");
    assert!(matches!(
        err,
        StoreError::InvalidInput(message) if message.starts_with("RESET_REQUIRED")
    ));
}

#[test]
fn open_is_fail_closed_on_schema_version_mismatch() {
    let dir = TempDir::new().expect("temp dir must be creatable");
    let store = SqliteStore::open(dir.path()).expect("fresh storage should open");
    let db_path = store.db_path();
    drop(store);

    let conn = Connection::open(&db_path).expect("db should open");
    conn.execute(
        "UPDATE store_state SET schema_version=?1 WHERE singleton=1",
        params![99_i64],
    )
    .expect("version should update");
    drop(conn);

    let err = SqliteStore::open(dir.path()).expect_err("future schema must be rejected");
    assert_eq!(err.code(), "RESET_REQUIRED");
}

#[test]
fn reopening_a_current_store_keeps_its_data() {
    let dir = TempDir::new().expect("temp dir must be creatable");
    let actor = ActorIdentity::try_new("alice").expect("actor id must be valid");
    let story_id = {
        let mut store = SqliteStore::open(dir.path()).expect("fresh storage should open");
        store
            .story_create(&actor, "Saga", Visibility::Public)
            .expect("story should be created")
            .id
    };

    let mut store = SqliteStore::open(dir.path()).expect("storage should reopen");
    let story = store
        .story_get(&story_id)
        .expect("get should succeed")
        .expect("story must persist");
    assert_eq!(story.visibility, Visibility::Public);

    let next = store
        .story_create(&actor, "Sequel", Visibility::Private)
        .expect("story should be created");
    assert_ne!(next.id, story_id, "id counters must survive reopen");
}
