#![forbid(unsafe_code)]

pub mod access;
pub mod failure;
pub mod ids;
pub mod tags;
pub mod timeline;

pub use access::{
    AccessDecision, CollaborationGrant, CollaborationRole, EffectiveRole, RequiredRole,
    StoryAccess, Visibility,
};
pub use failure::FailureKind;
pub use ids::{
    ActorIdentity, CardId, EventId, IdError, InviteId, NodeId, NoteId, RequestId, StoryId, UserId,
};
pub use tags::{TagDelta, TagScope};
pub use timeline::{Position, TimelineNode};
