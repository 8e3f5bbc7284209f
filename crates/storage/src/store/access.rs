#![forbid(unsafe_code)]

use super::{SqliteStore, StoreError, corrupt};
use loom_core::access::{
    AccessDecision, CollaborationGrant, EffectiveRole, RequiredRole, StoryAccess, Visibility,
    decide,
};
use loom_core::failure::FailureKind;
use loom_core::ids::{ActorIdentity, StoryId, UserId};
use rusqlite::{OptionalExtension, Transaction, params};

impl SqliteStore {
    /// Decides whether `user_id` holds `required` on the story.
    ///
    /// Authorization outcomes, including malformed ids and unknown stories,
    /// come back as a decision; `Err` only reports store failures.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn check_access(
        &self,
        story_id: &str,
        user_id: &str,
        required: RequiredRole,
    ) -> Result<AccessDecision, StoreError> {
        let (Ok(story_id), Ok(user_id)) = (StoryId::try_new(story_id), UserId::try_new(user_id))
        else {
            return Ok(AccessDecision::denied(FailureKind::InvalidInput));
        };
        self.read("check_access", |tx| {
            access_decision_tx(tx, &story_id, &user_id, required)
        })
    }

    /// Like [`Self::check_access`] but turns a denial into a typed error.
    pub fn authorize(
        &self,
        story_id: &StoryId,
        actor: &ActorIdentity,
        required: RequiredRole,
    ) -> Result<EffectiveRole, StoreError> {
        self.read("authorize", |tx| {
            require_access_tx(tx, story_id, actor, required)
        })
    }
}

pub(super) fn access_decision_tx(
    tx: &Transaction<'_>,
    story_id: &StoryId,
    user_id: &UserId,
    required: RequiredRole,
) -> Result<AccessDecision, StoreError> {
    let story = tx
        .query_row(
            "SELECT owner_id, visibility FROM stories WHERE id=?1",
            params![story_id.as_str()],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
        )
        .optional()?;
    let Some((owner_id, visibility)) = story else {
        return Ok(decide(user_id.as_str(), required, None, None));
    };
    let visibility = Visibility::parse(&visibility)
        .ok_or_else(|| corrupt("stories.visibility")(visibility))?;
    let story = StoryAccess {
        owner_id: &owner_id,
        visibility,
    };

    let collaboration = if owner_id == user_id.as_str() || required == RequiredRole::Owner {
        None
    } else {
        tx.query_row(
            "SELECT role, accepted FROM collaborations WHERE story_id=?1 AND user_id=?2",
            params![story_id.as_str(), user_id.as_str()],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, bool>(1)?)),
        )
        .optional()?
    };
    let grant = collaboration
        .as_ref()
        .map(|(role, accepted)| CollaborationGrant {
            role,
            accepted: *accepted,
        });

    Ok(decide(user_id.as_str(), required, Some(&story), grant.as_ref()))
}

/// Gate for every mutating operation, evaluated inside the operation's own transaction.
pub(super) fn require_access_tx(
    tx: &Transaction<'_>,
    story_id: &StoryId,
    actor: &ActorIdentity,
    required: RequiredRole,
) -> Result<EffectiveRole, StoreError> {
    access_decision_tx(tx, story_id, &actor.id, required)?
        .into_result()
        .map_err(|kind| StoreError::from_denial(kind, required))
}
