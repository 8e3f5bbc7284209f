#![forbid(unsafe_code)]

use super::stories::ensure_story_exists_tx;
use super::{SqliteStore, StoreError, TagCount, TagReconcileOutcome};
use loom_core::tags::{TagDelta, TagScope, normalize_tags};
use rusqlite::{OptionalExtension, Transaction, params};
use std::collections::BTreeSet;

/// SQL for one counter table. Story tags are keyed by (story_id, key); global tags by key.
struct CounterSql {
    increment: &'static str,
    current: &'static str,
    decrement: &'static str,
    delete: &'static str,
}

static STORY_TAGS: CounterSql = CounterSql {
    increment: "INSERT INTO tags(story_id, key, usage_count) VALUES (?1, ?2, 1) \
                ON CONFLICT(story_id, key) DO UPDATE SET usage_count=usage_count + 1 \
                RETURNING usage_count",
    current: "SELECT usage_count FROM tags WHERE story_id=?1 AND key=?2",
    decrement: "UPDATE tags SET usage_count=usage_count - 1 WHERE story_id=?1 AND key=?2",
    delete: "DELETE FROM tags WHERE story_id=?1 AND key=?2",
};

static GLOBAL_TAGS: CounterSql = CounterSql {
    increment: "INSERT INTO global_tags(key, usage_count) VALUES (?2, 1) \
                ON CONFLICT(key) DO UPDATE SET usage_count=usage_count + 1 \
                RETURNING usage_count",
    current: "SELECT usage_count FROM global_tags WHERE key=?2",
    decrement: "UPDATE global_tags SET usage_count=usage_count - 1 WHERE key=?2",
    delete: "DELETE FROM global_tags WHERE key=?2",
};

impl SqliteStore {
    /// Brings the counters for `scope` in line with an entity whose tags went from `old` to `new`.
    ///
    /// An unchanged set returns before any transaction is opened.
    #[tracing::instrument(skip_all, fields(scope = ?scope))]
    pub fn reconcile_tags<S: AsRef<str>>(
        &mut self,
        scope: &TagScope,
        old: &[S],
        new: &[S],
    ) -> Result<TagReconcileOutcome, StoreError> {
        let old = normalize_tags(old)?;
        let new = normalize_tags(new)?;
        if TagDelta::between(&old, &new).is_empty() {
            return Ok(TagReconcileOutcome::default());
        }
        self.write("reconcile_tags", |tx| {
            if let TagScope::Story(story_id) = scope {
                ensure_story_exists_tx(tx, story_id)?;
            }
            reconcile_tags_tx(tx, scope, &old, &new)
        })
    }

    pub fn tag_get(&self, scope: &TagScope, key: &str) -> Result<Option<TagCount>, StoreError> {
        let key = key.trim().to_lowercase();
        self.read("tag_get", |tx| {
            let usage_count = tx
                .query_row(
                    counter_sql(scope).current,
                    params![scope_param(scope), key],
                    |row| row.get::<_, i64>(0),
                )
                .optional()?;
            Ok(usage_count.map(|usage_count| TagCount {
                scope: scope.clone(),
                key,
                usage_count,
            }))
        })
    }

    pub fn tag_list(&self, scope: &TagScope) -> Result<Vec<TagCount>, StoreError> {
        self.read("tag_list", |tx| {
            let rows = match scope {
                TagScope::Story(story_id) => {
                    let mut stmt = tx.prepare(
                        "SELECT key, usage_count FROM tags WHERE story_id=?1 ORDER BY key ASC",
                    )?;
                    stmt.query_map(params![story_id.as_str()], |row| {
                        Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
                    })?
                    .collect::<Result<Vec<_>, _>>()?
                }
                TagScope::Global => {
                    let mut stmt = tx
                        .prepare("SELECT key, usage_count FROM global_tags ORDER BY key ASC")?;
                    stmt.query_map([], |row| {
                        Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
                    })?
                    .collect::<Result<Vec<_>, _>>()?
                }
            };
            Ok(rows
                .into_iter()
                .map(|(key, usage_count)| TagCount {
                    scope: scope.clone(),
                    key,
                    usage_count,
                })
                .collect())
        })
    }
}

fn counter_sql(scope: &TagScope) -> &'static CounterSql {
    match scope {
        TagScope::Story(_) => &STORY_TAGS,
        TagScope::Global => &GLOBAL_TAGS,
    }
}

fn scope_param(scope: &TagScope) -> Option<&str> {
    scope.story_id().map(|id| id.as_str())
}

/// Applies the delta between two normalized tag sets inside the caller's transaction.
///
/// Counts never go below one: a key whose count would reach zero is deleted,
/// and a removed key with no counter row is left alone.
pub(super) fn reconcile_tags_tx(
    tx: &Transaction<'_>,
    scope: &TagScope,
    old: &BTreeSet<String>,
    new: &BTreeSet<String>,
) -> Result<TagReconcileOutcome, StoreError> {
    let delta = TagDelta::between(old, new);
    let mut outcome = TagReconcileOutcome::default();
    if delta.is_empty() {
        return Ok(outcome);
    }

    let sql = counter_sql(scope);
    let scope_id = scope_param(scope);

    for key in delta.added {
        let usage_count: i64 =
            tx.query_row(sql.increment, params![scope_id, key], |row| row.get(0))?;
        if usage_count == 1 {
            outcome.created.push(key);
        } else {
            outcome.incremented.push(key);
        }
    }

    for key in delta.removed {
        let current = tx
            .query_row(sql.current, params![scope_id, key], |row| row.get::<_, i64>(0))
            .optional()?;
        match current {
            None => outcome.missing.push(key),
            Some(count) if count <= 1 => {
                tx.execute(sql.delete, params![scope_id, key])?;
                outcome.deleted.push(key);
            }
            Some(_) => {
                tx.execute(sql.decrement, params![scope_id, key])?;
                outcome.decremented.push(key);
            }
        }
    }

    tracing::debug!(
        created = outcome.created.len(),
        incremented = outcome.incremented.len(),
        decremented = outcome.decremented.len(),
        deleted = outcome.deleted.len(),
        missing = outcome.missing.len(),
        "tag counters reconciled"
    );
    Ok(outcome)
}
