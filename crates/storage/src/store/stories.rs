#![forbid(unsafe_code)]

use super::access::require_access_tx;
use super::tags::reconcile_tags_tx;
use super::{
    SqliteStore, Story, StoreError, corrupt, next_id_tx, now_ms, tags_from_json, tags_to_json,
};
use loom_core::access::{RequiredRole, Visibility};
use loom_core::ids::{ActorIdentity, StoryId, UserId};
use loom_core::tags::{TagScope, normalize_tags};
use loom_core::timeline::{Position, ROOT_NODE_NAME};
use rusqlite::{OptionalExtension, Transaction, params};

impl SqliteStore {
    /// Creates a story owned by `actor` together with its root timeline node.
    #[tracing::instrument(skip_all, fields(actor = %actor.id, visibility = visibility.as_str()))]
    pub fn story_create(
        &mut self,
        actor: &ActorIdentity,
        title: &str,
        visibility: Visibility,
    ) -> Result<Story, StoreError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(StoreError::InvalidInput("story title must not be empty"));
        }
        let now_ms = now_ms();
        self.write("story_create", |tx| {
            let story_id = StoryId::try_new(next_id_tx(tx, "STORY")?)?;
            tx.execute(
                "INSERT INTO stories(id, owner_id, title, visibility, tags_json, created_at_ms, updated_at_ms) \
                 VALUES (?1, ?2, ?3, ?4, '[]', ?5, ?5)",
                params![
                    story_id.as_str(),
                    actor.id.as_str(),
                    title,
                    visibility.as_str(),
                    now_ms
                ],
            )?;

            let root_id = next_id_tx(tx, "TL")?;
            tx.execute(
                "INSERT INTO timeline_nodes(id, story_id, parent_id, position, name, title, level, created_at_ms, updated_at_ms) \
                 VALUES (?1, ?2, NULL, ?3, ?4, NULL, 1, ?5, ?5)",
                params![
                    root_id,
                    story_id.as_str(),
                    Position::root().encode(),
                    ROOT_NODE_NAME,
                    now_ms
                ],
            )?;
            tracing::info!(story_id = %story_id, root_id = %root_id, "story created");

            load_story_tx(tx, &story_id)?.ok_or(StoreError::NotFound("story"))
        })
    }

    pub fn story_get(&self, story_id: &StoryId) -> Result<Option<Story>, StoreError> {
        self.read("story_get", |tx| load_story_tx(tx, story_id))
    }

    #[tracing::instrument(skip_all, fields(story_id = %story_id, actor = %actor.id))]
    pub fn story_set_visibility(
        &mut self,
        story_id: &StoryId,
        actor: &ActorIdentity,
        visibility: Visibility,
    ) -> Result<Story, StoreError> {
        let now_ms = now_ms();
        self.write("story_set_visibility", |tx| {
            require_access_tx(tx, story_id, actor, RequiredRole::Owner)?;
            tx.execute(
                "UPDATE stories SET visibility=?2, updated_at_ms=?3 WHERE id=?1",
                params![story_id.as_str(), visibility.as_str(), now_ms],
            )?;
            load_story_tx(tx, story_id)?.ok_or(StoreError::NotFound("story"))
        })
    }

    /// Replaces the story's own tags; stories count towards the global tag table.
    #[tracing::instrument(skip_all, fields(story_id = %story_id, actor = %actor.id))]
    pub fn story_set_tags<S: AsRef<str>>(
        &mut self,
        story_id: &StoryId,
        actor: &ActorIdentity,
        tags: &[S],
    ) -> Result<Story, StoreError> {
        let new_tags = normalize_tags(tags)?;
        let now_ms = now_ms();
        self.write("story_set_tags", |tx| {
            require_access_tx(tx, story_id, actor, RequiredRole::Owner)?;
            let story = load_story_tx(tx, story_id)?.ok_or(StoreError::NotFound("story"))?;
            reconcile_tags_tx(tx, &TagScope::Global, &story.tags, &new_tags)?;
            tx.execute(
                "UPDATE stories SET tags_json=?2, updated_at_ms=?3 WHERE id=?1",
                params![story_id.as_str(), tags_to_json(&new_tags)?, now_ms],
            )?;
            load_story_tx(tx, story_id)?.ok_or(StoreError::NotFound("story"))
        })
    }
}

pub(super) fn load_story_tx(
    tx: &Transaction<'_>,
    story_id: &StoryId,
) -> Result<Option<Story>, StoreError> {
    let row = tx
        .query_row(
            "SELECT owner_id, title, visibility, tags_json, created_at_ms, updated_at_ms \
             FROM stories WHERE id=?1",
            params![story_id.as_str()],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, i64>(5)?,
                ))
            },
        )
        .optional()?;

    let Some((owner_id, title, visibility, tags_json, created_at_ms, updated_at_ms)) = row else {
        return Ok(None);
    };
    Ok(Some(Story {
        id: story_id.clone(),
        owner_id: UserId::try_new(owner_id).map_err(corrupt("stories.owner_id"))?,
        title,
        visibility: Visibility::parse(&visibility)
            .ok_or_else(|| corrupt("stories.visibility")(visibility))?,
        tags: tags_from_json(&tags_json)?,
        created_at_ms,
        updated_at_ms,
    }))
}

pub(super) fn ensure_story_exists_tx(
    tx: &Transaction<'_>,
    story_id: &StoryId,
) -> Result<(), StoreError> {
    let exists = tx
        .query_row(
            "SELECT 1 FROM stories WHERE id=?1",
            params![story_id.as_str()],
            |row| row.get::<_, i64>(0),
        )
        .optional()?
        .is_some();
    if exists {
        Ok(())
    } else {
        Err(StoreError::NotFound("story"))
    }
}
