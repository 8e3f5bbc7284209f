#![forbid(unsafe_code)]

use super::access::require_access_tx;
use super::{SqliteStore, StoreError, TimelineDeleteSummary, corrupt, next_id_tx, now_ms};
use loom_core::access::RequiredRole;
use loom_core::ids::{ActorIdentity, NodeId, StoryId};
use loom_core::timeline::{
    EventRelocation, Position, TimelineNode, next_child_position, note_display_title,
    plan_removal,
};
use rusqlite::{OptionalExtension, Row, Transaction, params};

const NODE_COLUMNS: &str = "id, story_id, parent_id, position, name, title, level";

impl SqliteStore {
    /// Appends a child node under `parent_id`, after its last existing child.
    #[tracing::instrument(
        skip_all,
        fields(story_id = %story_id, parent_id = %parent_id, actor = %actor.id)
    )]
    pub fn timeline_add_node(
        &mut self,
        story_id: &StoryId,
        actor: &ActorIdentity,
        parent_id: &NodeId,
        name: &str,
        title: Option<&str>,
    ) -> Result<TimelineNode, StoreError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(StoreError::InvalidInput("timeline node name must not be empty"));
        }
        let title = title.map(str::trim).filter(|title| !title.is_empty());
        let now_ms = now_ms();

        self.write("timeline_add_node", |tx| {
            require_access_tx(tx, story_id, actor, RequiredRole::Edit)?;
            let parent =
                load_node_tx(tx, parent_id)?.ok_or(StoreError::NotFound("timeline node"))?;
            if parent.story_id != *story_id {
                return Err(StoreError::InvalidInput(
                    "parent timeline node belongs to another story",
                ));
            }

            let nodes = load_story_nodes_tx(tx, story_id)?;
            let position =
                next_child_position(&parent.position, nodes.iter().map(|node| &node.position));
            let node = TimelineNode {
                id: NodeId::try_new(next_id_tx(tx, "TL")?)?,
                story_id: story_id.clone(),
                parent_id: Some(parent.id.clone()),
                level: parent.level + 1,
                position,
                name: name.to_string(),
                title: title.map(str::to_string),
            };
            node.validate().map_err(corrupt("timeline_nodes"))?;

            tx.execute(
                "INSERT INTO timeline_nodes(id, story_id, parent_id, position, name, title, level, created_at_ms, updated_at_ms) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
                params![
                    node.id.as_str(),
                    node.story_id.as_str(),
                    node.parent_id.as_ref().map(NodeId::as_str),
                    node.position.encode(),
                    node.name,
                    node.title,
                    node.level,
                    now_ms
                ],
            )?;
            Ok(node)
        })
    }

    /// All nodes of a story in position order.
    pub fn timeline_list(
        &self,
        story_id: &StoryId,
        actor: &ActorIdentity,
    ) -> Result<Vec<TimelineNode>, StoreError> {
        self.read("timeline_list", |tx| {
            require_access_tx(tx, story_id, actor, RequiredRole::View)?;
            load_story_nodes_tx(tx, story_id)
        })
    }

    pub fn timeline_get(&self, node_id: &NodeId) -> Result<Option<TimelineNode>, StoreError> {
        self.read("timeline_get", |tx| load_node_tx(tx, node_id))
    }

    /// Sets the node's title and rewrites the display title of every note linked to it.
    ///
    /// A blank title clears it.
    #[tracing::instrument(skip_all, fields(node_id = %node_id, actor = %actor.id))]
    pub fn timeline_rename(
        &mut self,
        node_id: &NodeId,
        actor: &ActorIdentity,
        new_title: &str,
    ) -> Result<TimelineNode, StoreError> {
        let new_title = Some(new_title.trim()).filter(|title| !title.is_empty());
        let now_ms = now_ms();

        self.write("timeline_rename", |tx| {
            let mut node =
                load_node_tx(tx, node_id)?.ok_or(StoreError::NotFound("timeline node"))?;
            require_access_tx(tx, &node.story_id, actor, RequiredRole::Edit)?;

            tx.execute(
                "UPDATE timeline_nodes SET title=?2, updated_at_ms=?3 WHERE id=?1",
                params![node.id.as_str(), new_title, now_ms],
            )?;
            node.title = new_title.map(str::to_string);

            let notes = tx.execute(
                "UPDATE notes SET display_title=?2, updated_at_ms=?3 WHERE timeline_id=?1",
                params![
                    node.id.as_str(),
                    note_display_title(&node.name, new_title),
                    now_ms
                ],
            )?;
            tracing::debug!(notes, "timeline node renamed");
            Ok(node)
        })
    }

    /// Removes the node and every node beneath it.
    ///
    /// Events linked to removed nodes move to the story root at order 0, or
    /// are unlinked when the root itself is removed. Linked notes are deleted.
    #[tracing::instrument(skip_all, fields(node_id = %node_id, actor = %actor.id))]
    pub fn timeline_delete(
        &mut self,
        node_id: &NodeId,
        actor: &ActorIdentity,
    ) -> Result<TimelineDeleteSummary, StoreError> {
        let now_ms = now_ms();
        self.write("timeline_delete", |tx| {
            let target =
                load_node_tx(tx, node_id)?.ok_or(StoreError::NotFound("timeline node"))?;
            let story_id = &target.story_id;
            require_access_tx(tx, story_id, actor, RequiredRole::Edit)?;

            let nodes = load_story_nodes_tx(tx, story_id)?;
            let plan = plan_removal(&nodes, &target);

            let mut summary = TimelineDeleteSummary::default();
            for doomed_id in plan.doomed.iter() {
                let moved = match &plan.relocation {
                    EventRelocation::ToRoot { root_id } => tx.execute(
                        "UPDATE events SET timeline_id=?2, event_order=0, updated_at_ms=?3 \
                         WHERE timeline_id=?1",
                        params![doomed_id.as_str(), root_id.as_str(), now_ms],
                    )?,
                    EventRelocation::Unlink => tx.execute(
                        "UPDATE events SET timeline_id=NULL, event_order=0, updated_at_ms=?2 \
                         WHERE timeline_id=?1",
                        params![doomed_id.as_str(), now_ms],
                    )?,
                };
                match plan.relocation {
                    EventRelocation::ToRoot { .. } => summary.relocated_events += moved,
                    EventRelocation::Unlink => summary.unlinked_events += moved,
                }
            }

            for doomed_id in plan.doomed.iter() {
                summary.deleted_notes += tx.execute(
                    "DELETE FROM notes WHERE timeline_id=?1",
                    params![doomed_id.as_str()],
                )?;
            }

            for doomed_id in plan.doomed.iter() {
                tx.execute(
                    "DELETE FROM timeline_nodes WHERE id=?1 AND story_id=?2",
                    params![doomed_id.as_str(), story_id.as_str()],
                )?;
            }

            if let EventRelocation::ToRoot { root_id } = plan.relocation {
                summary.relocated_to = Some(root_id);
            }
            summary.deleted_node_ids = plan.doomed;

            tracing::info!(
                story_id = %story_id,
                deleted_nodes = summary.deleted_node_ids.len(),
                relocated_events = summary.relocated_events,
                unlinked_events = summary.unlinked_events,
                deleted_notes = summary.deleted_notes,
                "timeline subtree deleted"
            );
            Ok(summary)
        })
    }
}

pub(super) fn load_node_tx(
    tx: &Transaction<'_>,
    node_id: &NodeId,
) -> Result<Option<TimelineNode>, StoreError> {
    let row = tx
        .query_row(
            &format!("SELECT {NODE_COLUMNS} FROM timeline_nodes WHERE id=?1"),
            params![node_id.as_str()],
            node_row,
        )
        .optional()?;
    row.map(node_from_row).transpose()
}

pub(super) fn load_story_nodes_tx(
    tx: &Transaction<'_>,
    story_id: &StoryId,
) -> Result<Vec<TimelineNode>, StoreError> {
    let mut stmt = tx.prepare(&format!(
        "SELECT {NODE_COLUMNS} FROM timeline_nodes WHERE story_id=?1"
    ))?;
    let rows = stmt
        .query_map(params![story_id.as_str()], node_row)?
        .collect::<Result<Vec<_>, _>>()?;
    let mut nodes = rows
        .into_iter()
        .map(node_from_row)
        .collect::<Result<Vec<_>, _>>()?;
    nodes.sort_by(|a, b| a.position.cmp(&b.position));
    Ok(nodes)
}

type NodeRow = (String, String, Option<String>, String, String, Option<String>, u32);

fn node_row(row: &Row<'_>) -> rusqlite::Result<NodeRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
    ))
}

fn node_from_row(row: NodeRow) -> Result<TimelineNode, StoreError> {
    let (id, story_id, parent_id, position, name, title, level) = row;
    let node = TimelineNode {
        id: NodeId::try_new(id).map_err(corrupt("timeline_nodes.id"))?,
        story_id: StoryId::try_new(story_id).map_err(corrupt("timeline_nodes.story_id"))?,
        parent_id: parent_id
            .map(NodeId::try_new)
            .transpose()
            .map_err(corrupt("timeline_nodes.parent_id"))?,
        position: Position::parse(&position).map_err(corrupt("timeline_nodes.position"))?,
        name,
        title,
        level,
    };
    node.validate().map_err(corrupt("timeline_nodes"))?;
    Ok(node)
}
