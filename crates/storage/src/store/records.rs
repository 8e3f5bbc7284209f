#![forbid(unsafe_code)]

use loom_core::access::{CollaborationRole, Visibility};
use loom_core::ids::{CardId, EventId, InviteId, NodeId, NoteId, RequestId, StoryId, UserId};
use loom_core::tags::TagScope;
use std::collections::BTreeSet;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Story {
    pub id: StoryId,
    pub owner_id: UserId,
    pub title: String,
    pub visibility: Visibility,
    pub tags: BTreeSet<String>,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Collaboration {
    pub story_id: StoryId,
    pub user_id: UserId,
    /// Stored role name; may be a name this build does not recognize.
    pub role: String,
    pub accepted: bool,
    pub created_at_ms: i64,
}

impl Collaboration {
    pub fn role(&self) -> Option<CollaborationRole> {
        CollaborationRole::parse(&self.role)
    }
}

/// A pending proposal: an owner's invite or a user's request to collaborate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CollaborationProposal<Id> {
    pub id: Id,
    pub story_id: StoryId,
    pub user_id: UserId,
    pub role: CollaborationRole,
    pub created_at_ms: i64,
}

pub type CollaborationInvite = CollaborationProposal<InviteId>;
pub type CollaborationRequest = CollaborationProposal<RequestId>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Event {
    pub id: EventId,
    pub story_id: StoryId,
    pub timeline_id: Option<NodeId>,
    pub order: i64,
    pub title: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Note {
    pub id: NoteId,
    pub story_id: StoryId,
    pub timeline_id: Option<NodeId>,
    pub body: String,
    pub display_title: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Card {
    pub id: CardId,
    pub story_id: StoryId,
    pub title: String,
    pub tags: BTreeSet<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TagCount {
    pub scope: TagScope,
    pub key: String,
    pub usage_count: i64,
}

/// What one timeline delete did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TimelineDeleteSummary {
    pub deleted_node_ids: Vec<NodeId>,
    pub relocated_to: Option<NodeId>,
    pub relocated_events: usize,
    pub unlinked_events: usize,
    pub deleted_notes: usize,
}

/// Keys touched by one tag reconcile, by the change applied to each.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TagReconcileOutcome {
    pub created: Vec<String>,
    pub incremented: Vec<String>,
    pub decremented: Vec<String>,
    pub deleted: Vec<String>,
    pub missing: Vec<String>,
}

impl TagReconcileOutcome {
    pub fn writes(&self) -> usize {
        self.created.len() + self.incremented.len() + self.decremented.len() + self.deleted.len()
    }
}
