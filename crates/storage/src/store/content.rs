#![forbid(unsafe_code)]

//! Events and notes: the records that hang off timeline nodes by weak reference.

use super::access::require_access_tx;
use super::timeline::load_node_tx;
use super::{Event, Note, SqliteStore, StoreError, corrupt, next_id_tx, now_ms};
use loom_core::access::RequiredRole;
use loom_core::ids::{ActorIdentity, EventId, NodeId, NoteId, StoryId};
use loom_core::timeline::TimelineNode;
use rusqlite::{OptionalExtension, Transaction, params};

const UNLINKED_NOTE_TITLE: &str = "Note";

impl SqliteStore {
    /// Creates an event, appended after the last event of `timeline_id` when given.
    #[tracing::instrument(skip_all, fields(story_id = %story_id, actor = %actor.id))]
    pub fn event_create(
        &mut self,
        story_id: &StoryId,
        actor: &ActorIdentity,
        timeline_id: Option<&NodeId>,
        title: &str,
    ) -> Result<Event, StoreError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(StoreError::InvalidInput("event title must not be empty"));
        }
        let now_ms = now_ms();
        self.write("event_create", |tx| {
            require_access_tx(tx, story_id, actor, RequiredRole::Edit)?;
            let order = match timeline_id {
                Some(timeline_id) => {
                    story_node_tx(tx, story_id, timeline_id)?;
                    tx.query_row(
                        "SELECT COALESCE(MAX(event_order) + 1, 0) FROM events WHERE timeline_id=?1",
                        params![timeline_id.as_str()],
                        |row| row.get::<_, i64>(0),
                    )?
                }
                None => 0,
            };

            let id = EventId::try_new(next_id_tx(tx, "EVT")?)?;
            tx.execute(
                "INSERT INTO events(id, story_id, timeline_id, event_order, title, created_at_ms, updated_at_ms) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                params![
                    id.as_str(),
                    story_id.as_str(),
                    timeline_id.map(NodeId::as_str),
                    order,
                    title,
                    now_ms
                ],
            )?;
            Ok(Event {
                id,
                story_id: story_id.clone(),
                timeline_id: timeline_id.cloned(),
                order,
                title: title.to_string(),
            })
        })
    }

    pub fn event_get(&self, event_id: &EventId) -> Result<Option<Event>, StoreError> {
        self.read("event_get", |tx| {
            let row = tx
                .query_row(
                    "SELECT story_id, timeline_id, event_order, title FROM events WHERE id=?1",
                    params![event_id.as_str()],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, Option<String>>(1)?,
                            row.get::<_, i64>(2)?,
                            row.get::<_, String>(3)?,
                        ))
                    },
                )
                .optional()?;
            let Some((story_id, timeline_id, order, title)) = row else {
                return Ok(None);
            };
            Ok(Some(Event {
                id: event_id.clone(),
                story_id: StoryId::try_new(story_id).map_err(corrupt("events.story_id"))?,
                timeline_id: timeline_id
                    .map(NodeId::try_new)
                    .transpose()
                    .map_err(corrupt("events.timeline_id"))?,
                order,
                title,
            }))
        })
    }

    /// Creates a note; a note linked to a timeline node carries that node's display title.
    #[tracing::instrument(skip_all, fields(story_id = %story_id, actor = %actor.id))]
    pub fn note_create(
        &mut self,
        story_id: &StoryId,
        actor: &ActorIdentity,
        timeline_id: Option<&NodeId>,
        body: &str,
    ) -> Result<Note, StoreError> {
        if body.trim().is_empty() {
            return Err(StoreError::InvalidInput("note body must not be empty"));
        }
        let now_ms = now_ms();
        self.write("note_create", |tx| {
            require_access_tx(tx, story_id, actor, RequiredRole::Comment)?;
            let display_title = match timeline_id {
                Some(timeline_id) => story_node_tx(tx, story_id, timeline_id)?.display_title(),
                None => UNLINKED_NOTE_TITLE.to_string(),
            };

            let id = NoteId::try_new(next_id_tx(tx, "NOTE")?)?;
            tx.execute(
                "INSERT INTO notes(id, story_id, timeline_id, body, display_title, created_at_ms, updated_at_ms) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                params![
                    id.as_str(),
                    story_id.as_str(),
                    timeline_id.map(NodeId::as_str),
                    body,
                    display_title,
                    now_ms
                ],
            )?;
            Ok(Note {
                id,
                story_id: story_id.clone(),
                timeline_id: timeline_id.cloned(),
                body: body.to_string(),
                display_title,
            })
        })
    }

    pub fn note_get(&self, note_id: &NoteId) -> Result<Option<Note>, StoreError> {
        self.read("note_get", |tx| {
            let row = tx
                .query_row(
                    "SELECT story_id, timeline_id, body, display_title FROM notes WHERE id=?1",
                    params![note_id.as_str()],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, Option<String>>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, String>(3)?,
                        ))
                    },
                )
                .optional()?;
            let Some((story_id, timeline_id, body, display_title)) = row else {
                return Ok(None);
            };
            Ok(Some(Note {
                id: note_id.clone(),
                story_id: StoryId::try_new(story_id).map_err(corrupt("notes.story_id"))?,
                timeline_id: timeline_id
                    .map(NodeId::try_new)
                    .transpose()
                    .map_err(corrupt("notes.timeline_id"))?,
                body,
                display_title,
            }))
        })
    }
}

/// Loads `node_id`, insisting it belongs to `story_id`.
fn story_node_tx(
    tx: &Transaction<'_>,
    story_id: &StoryId,
    node_id: &NodeId,
) -> Result<TimelineNode, StoreError> {
    let node = load_node_tx(tx, node_id)?.ok_or(StoreError::NotFound("timeline node"))?;
    if node.story_id != *story_id {
        return Err(StoreError::InvalidInput(
            "timeline node belongs to another story",
        ));
    }
    Ok(node)
}
