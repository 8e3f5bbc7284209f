#![forbid(unsafe_code)]

use super::StoreError;
use rusqlite::{Connection, OptionalExtension, params};
use std::collections::BTreeSet;

pub(super) const SCHEMA_VERSION: i64 = 1;

const TABLES: &[&str] = &[
    "store_state",
    "counters",
    "stories",
    "collaborations",
    "collaboration_invites",
    "collaboration_requests",
    "timeline_nodes",
    "events",
    "notes",
    "cards",
    "tags",
    "global_tags",
];

/// Refuses databases written by something else or by another schema version.
pub(super) fn preflight_gate(conn: &Connection) -> Result<(), StoreError> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
    )?;
    let tables = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<BTreeSet<_>, _>>()?;

    if tables.is_empty() {
        return Ok(());
    }

    let known: BTreeSet<&str> = TABLES.iter().copied().collect();
    if tables.iter().any(|table| !known.contains(table.as_str())) {
        return Err(StoreError::InvalidInput(
            "RESET_REQUIRED: unsupported tables detected",
        ));
    }
    if !tables.contains("store_state") {
        return Err(StoreError::InvalidInput(
            "RESET_REQUIRED: schema state table is missing",
        ));
    }

    let version = conn
        .query_row(
            "SELECT schema_version FROM store_state WHERE singleton=1",
            [],
            |row| row.get::<_, i64>(0),
        )
        .optional()?;

    match version {
        Some(v) if v == SCHEMA_VERSION => Ok(()),
        Some(_) => Err(StoreError::InvalidInput(
            "RESET_REQUIRED: schema version mismatch",
        )),
        None => Err(StoreError::InvalidInput(
            "RESET_REQUIRED: schema state row is missing",
        )),
    }
}

pub(super) fn install_schema(conn: &Connection, now_ms: i64) -> Result<(), StoreError> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS store_state (
          singleton INTEGER PRIMARY KEY CHECK(singleton = 1),
          schema_version INTEGER NOT NULL,
          created_at_ms INTEGER NOT NULL,
          updated_at_ms INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS counters (
          name TEXT PRIMARY KEY,
          value INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS stories (
          id TEXT PRIMARY KEY,
          owner_id TEXT NOT NULL,
          title TEXT NOT NULL,
          visibility TEXT NOT NULL CHECK(visibility IN ('private', 'public')),
          tags_json TEXT NOT NULL DEFAULT '[]',
          created_at_ms INTEGER NOT NULL,
          updated_at_ms INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_stories_owner ON stories(owner_id);

        CREATE TABLE IF NOT EXISTS collaborations (
          story_id TEXT NOT NULL,
          user_id TEXT NOT NULL,
          role TEXT NOT NULL,
          accepted INTEGER NOT NULL DEFAULT 0 CHECK(accepted IN (0, 1)),
          created_at_ms INTEGER NOT NULL,
          PRIMARY KEY(story_id, user_id),
          FOREIGN KEY(story_id) REFERENCES stories(id) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS collaboration_invites (
          id TEXT PRIMARY KEY,
          story_id TEXT NOT NULL,
          user_id TEXT NOT NULL,
          role TEXT NOT NULL,
          created_at_ms INTEGER NOT NULL,
          UNIQUE(story_id, user_id),
          FOREIGN KEY(story_id) REFERENCES stories(id) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS collaboration_requests (
          id TEXT PRIMARY KEY,
          story_id TEXT NOT NULL,
          user_id TEXT NOT NULL,
          role TEXT NOT NULL,
          created_at_ms INTEGER NOT NULL,
          UNIQUE(story_id, user_id),
          FOREIGN KEY(story_id) REFERENCES stories(id) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS timeline_nodes (
          id TEXT PRIMARY KEY,
          story_id TEXT NOT NULL,
          parent_id TEXT,
          position TEXT NOT NULL,
          name TEXT NOT NULL,
          title TEXT,
          level INTEGER NOT NULL CHECK(level >= 1),
          created_at_ms INTEGER NOT NULL,
          updated_at_ms INTEGER NOT NULL,
          UNIQUE(story_id, position),
          FOREIGN KEY(story_id) REFERENCES stories(id) ON DELETE CASCADE,
          FOREIGN KEY(parent_id) REFERENCES timeline_nodes(id) ON DELETE RESTRICT,
          CHECK((level = 1) = (parent_id IS NULL))
        );

        CREATE INDEX IF NOT EXISTS idx_timeline_nodes_story
          ON timeline_nodes(story_id, level);

        CREATE TABLE IF NOT EXISTS events (
          id TEXT PRIMARY KEY,
          story_id TEXT NOT NULL,
          timeline_id TEXT,
          event_order INTEGER NOT NULL DEFAULT 0,
          title TEXT NOT NULL,
          created_at_ms INTEGER NOT NULL,
          updated_at_ms INTEGER NOT NULL,
          FOREIGN KEY(story_id) REFERENCES stories(id) ON DELETE CASCADE,
          FOREIGN KEY(timeline_id) REFERENCES timeline_nodes(id) ON DELETE RESTRICT
        );

        CREATE INDEX IF NOT EXISTS idx_events_timeline ON events(timeline_id, event_order);

        CREATE TABLE IF NOT EXISTS notes (
          id TEXT PRIMARY KEY,
          story_id TEXT NOT NULL,
          timeline_id TEXT,
          body TEXT NOT NULL,
          display_title TEXT NOT NULL,
          created_at_ms INTEGER NOT NULL,
          updated_at_ms INTEGER NOT NULL,
          FOREIGN KEY(story_id) REFERENCES stories(id) ON DELETE CASCADE,
          FOREIGN KEY(timeline_id) REFERENCES timeline_nodes(id) ON DELETE RESTRICT
        );

        CREATE INDEX IF NOT EXISTS idx_notes_timeline ON notes(timeline_id);

        CREATE TABLE IF NOT EXISTS cards (
          id TEXT PRIMARY KEY,
          story_id TEXT NOT NULL,
          title TEXT NOT NULL,
          tags_json TEXT NOT NULL DEFAULT '[]',
          created_at_ms INTEGER NOT NULL,
          updated_at_ms INTEGER NOT NULL,
          FOREIGN KEY(story_id) REFERENCES stories(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_cards_story ON cards(story_id);

        CREATE TABLE IF NOT EXISTS tags (
          story_id TEXT NOT NULL,
          key TEXT NOT NULL,
          usage_count INTEGER NOT NULL CHECK(usage_count > 0),
          PRIMARY KEY(story_id, key),
          FOREIGN KEY(story_id) REFERENCES stories(id) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS global_tags (
          key TEXT PRIMARY KEY,
          usage_count INTEGER NOT NULL CHECK(usage_count > 0)
        );
        "#,
    )?;

    conn.execute(
        "INSERT INTO store_state(singleton, schema_version, created_at_ms, updated_at_ms) \
         VALUES (1, ?1, ?2, ?2) \
         ON CONFLICT(singleton) DO UPDATE SET updated_at_ms=excluded.updated_at_ms",
        params![SCHEMA_VERSION, now_ms],
    )?;

    Ok(())
}
