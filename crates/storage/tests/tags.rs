use loom_core::{ActorIdentity, StoryId, TagScope, Visibility};
use loom_storage::{SqliteStore, StoreError, TagCount};
use rusqlite::Connection;
use tempfile::TempDir;

fn open_store() -> (TempDir, SqliteStore) {
    let dir = TempDir::new().expect("temp dir must be creatable");
    let store = SqliteStore::open(dir.path()).expect("fresh storage should open");
    (dir, store)
}

fn owner() -> ActorIdentity {
    ActorIdentity::try_new("alice").expect("actor id must be valid")
}

fn new_story(store: &mut SqliteStore) -> StoryId {
    store
        .story_create(&owner(), "Saga", Visibility::Private)
        .expect("story should be created")
        .id
}

fn counts(store: &SqliteStore, scope: &TagScope) -> Vec<(String, i64)> {
    store
        .tag_list(scope)
        .expect("tag list should succeed")
        .into_iter()
        .map(|TagCount { key, usage_count, .. }| (key, usage_count))
        .collect()
}

#[test]
fn new_tags_are_created_and_shared_tags_incremented() {
    let (_dir, mut store) = open_store();
    let story_id = new_story(&mut store);
    let scope = TagScope::Story(story_id.clone());

    let outcome = store
        .reconcile_tags(&scope, &[] as &[&str], &["pirate", "ship"])
        .expect("reconcile should succeed");
    assert_eq!(outcome.created, ["pirate", "ship"]);

    let outcome = store
        .reconcile_tags(&scope, &[] as &[&str], &["Pirate"])
        .expect("reconcile should succeed");
    assert_eq!(outcome.incremented, ["pirate"]);
    assert_eq!(
        counts(&store, &scope),
        [("pirate".to_string(), 2), ("ship".to_string(), 1)]
    );

    let outcome = store
        .reconcile_tags(&scope, &["pirate", "ship"], &["pirate"])
        .expect("reconcile should succeed");
    assert_eq!(outcome.deleted, ["ship"]);
    assert!(outcome.decremented.is_empty());

    let outcome = store
        .reconcile_tags(&scope, &["pirate"], &[] as &[&str])
        .expect("reconcile should succeed");
    assert_eq!(outcome.decremented, ["pirate"]);
    assert_eq!(counts(&store, &scope), [("pirate".to_string(), 1)]);
}

#[test]
fn removing_an_unknown_tag_never_goes_negative() {
    let (_dir, mut store) = open_store();
    let story_id = new_story(&mut store);
    let scope = TagScope::Story(story_id);

    let outcome = store
        .reconcile_tags(&scope, &["kraken"], &[] as &[&str])
        .expect("reconcile should succeed");
    assert_eq!(outcome.missing, ["kraken"]);
    assert_eq!(outcome.writes(), 0);
    assert!(
        store
            .tag_get(&scope, "kraken")
            .expect("tag get should succeed")
            .is_none()
    );
}

#[test]
fn unchanged_tag_sets_write_nothing() {
    let (_dir, mut store) = open_store();
    let story_id = new_story(&mut store);
    let scope = TagScope::Story(story_id.clone());
    store
        .reconcile_tags(&scope, &[] as &[&str], &["pirate"])
        .expect("reconcile should succeed");

    let conn = Connection::open(store.db_path()).expect("db should open");
    conn.execute_batch(
        r#"
        CREATE TRIGGER forbid_tag_insert BEFORE INSERT ON tags
        BEGIN SELECT RAISE(ABORT, 'tags are frozen'); END;
        CREATE TRIGGER forbid_tag_update BEFORE UPDATE ON tags
        BEGIN SELECT RAISE(ABORT, 'tags are frozen'); END;
        CREATE TRIGGER forbid_tag_delete BEFORE DELETE ON tags
        BEGIN SELECT RAISE(ABORT, 'tags are frozen'); END;
        "#,
    )
    .expect("triggers should install");
    drop(conn);

    let outcome = store
        .reconcile_tags(&scope, &["pirate", " PIRATE "], &["pirate"])
        .expect("unchanged sets must not touch the table");
    assert_eq!(outcome.writes(), 0);

    let card = store
        .card_create(&story_id, &owner(), "Bare", &[] as &[&str])
        .expect("untagged card should not touch tags");
    store
        .card_set_tags(&card.id, &owner(), &[] as &[&str])
        .expect("unchanged card tags must not touch the table");
}

#[test]
fn card_lifecycle_keeps_story_counts_in_step() {
    let (_dir, mut store) = open_store();
    let story_id = new_story(&mut store);
    let scope = TagScope::Story(story_id.clone());

    let hook = store
        .card_create(&story_id, &owner(), "Hook", &["pirate", "villain"])
        .expect("card should be created");
    let crew = store
        .card_create(&story_id, &owner(), "Crew", &["pirate", "ship"])
        .expect("card should be created");
    assert_eq!(
        counts(&store, &scope),
        [
            ("pirate".to_string(), 2),
            ("ship".to_string(), 1),
            ("villain".to_string(), 1)
        ]
    );

    let crew = store
        .card_set_tags(&crew.id, &owner(), &["ship"])
        .expect("retag should succeed");
    assert_eq!(crew.tags.iter().collect::<Vec<_>>(), ["ship"]);
    store
        .card_delete(&hook.id, &owner())
        .expect("delete should succeed");

    assert_eq!(counts(&store, &scope), [("ship".to_string(), 1)]);
    assert_eq!(store.card_get(&hook.id).expect("get should succeed"), None);
}

#[test]
fn story_tags_count_globally() {
    let (_dir, mut store) = open_store();
    let first = new_story(&mut store);
    let second = new_story(&mut store);

    store
        .story_set_tags(&first, &owner(), &["fantasy", "sea"])
        .expect("tags should be set");
    let story = store
        .story_set_tags(&second, &owner(), &["sea"])
        .expect("tags should be set");
    assert!(story.tags.contains("sea"));
    assert_eq!(
        counts(&store, &TagScope::Global),
        [("fantasy".to_string(), 1), ("sea".to_string(), 2)]
    );

    store
        .story_set_tags(&first, &owner(), &[] as &[&str])
        .expect("tags should be cleared");
    assert_eq!(counts(&store, &TagScope::Global), [("sea".to_string(), 1)]);
}

#[test]
fn invalid_tags_and_unknown_stories_are_rejected() {
    let (_dir, mut store) = open_store();
    let story_id = new_story(&mut store);

    let err = store
        .reconcile_tags(
            &TagScope::Story(story_id),
            &[] as &[&str],
            &["bad\u{7}tag"],
        )
        .expect_err("control characters must be rejected");
    assert!(matches!(err, StoreError::InvalidInput(_)), "got {err:?}");

    let ghost = StoryId::try_new("STORY-999999").expect("id is valid");
    let err = store
        .reconcile_tags(&TagScope::Story(ghost), &[] as &[&str], &["pirate"])
        .expect_err("unknown story must be rejected");
    assert_eq!(err.code(), "NOT_FOUND");
}
