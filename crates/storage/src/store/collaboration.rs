#![forbid(unsafe_code)]

//! Collaboration lifecycle: direct grants, owner invites and user requests.
//!
//! At most one of {collaboration, invite, request} exists per (story, user)
//! pair. Accepting an invite or a request converts it into an accepted
//! collaboration and clears every other proposal for the pair atomically.

use super::access::require_access_tx;
use super::{
    Collaboration, CollaborationInvite, CollaborationProposal, CollaborationRequest, SqliteStore,
    StoreError, corrupt, map_insert_conflict, next_id_tx, now_ms,
};
use loom_core::access::{CollaborationRole, RequiredRole};
use loom_core::ids::{ActorIdentity, IdError, InviteId, RequestId, StoryId, UserId};
use rusqlite::{OptionalExtension, Transaction, params};

/// Storage facts for one kind of pending proposal.
struct ProposalTable {
    table: &'static str,
    id_prefix: &'static str,
    what: &'static str,
}

static INVITES: ProposalTable = ProposalTable {
    table: "collaboration_invites",
    id_prefix: "INV",
    what: "invite",
};

static REQUESTS: ProposalTable = ProposalTable {
    table: "collaboration_requests",
    id_prefix: "REQ",
    what: "request",
};

impl SqliteStore {
    /// Grants `user_id` a pending collaboration they must accept themselves.
    #[tracing::instrument(
        skip_all,
        fields(story_id = %story_id, actor = %owner.id, user_id = %user_id, role = role.as_str())
    )]
    pub fn collaboration_invite(
        &mut self,
        story_id: &StoryId,
        owner: &ActorIdentity,
        user_id: &UserId,
        role: CollaborationRole,
    ) -> Result<Collaboration, StoreError> {
        let now_ms = now_ms();
        self.write("collaboration_invite", |tx| {
            require_access_tx(tx, story_id, owner, RequiredRole::Owner)?;
            if owner.id == *user_id {
                return Err(StoreError::InvalidInput("owner cannot collaborate on own story"));
            }
            ensure_pair_free_tx(tx, story_id, user_id)?;
            tx.execute(
                "INSERT INTO collaborations(story_id, user_id, role, accepted, created_at_ms) \
                 VALUES (?1, ?2, ?3, 0, ?4)",
                params![story_id.as_str(), user_id.as_str(), role.as_str(), now_ms],
            )
            .map_err(|err| map_insert_conflict(err, "collaboration already exists"))?;
            Ok(Collaboration {
                story_id: story_id.clone(),
                user_id: user_id.clone(),
                role: role.as_str().to_string(),
                accepted: false,
                created_at_ms: now_ms,
            })
        })
    }

    /// Accepts the caller's own pending collaboration. Already accepted rows are returned as is.
    #[tracing::instrument(skip_all, fields(story_id = %story_id, actor = %actor.id))]
    pub fn collaboration_accept(
        &mut self,
        story_id: &StoryId,
        actor: &ActorIdentity,
    ) -> Result<Collaboration, StoreError> {
        self.write("collaboration_accept", |tx| {
            let mut collaboration = load_collaboration_tx(tx, story_id, &actor.id)?
                .ok_or(StoreError::NotFound("pending collaboration"))?;
            if !collaboration.accepted {
                tx.execute(
                    "UPDATE collaborations SET accepted=1 WHERE story_id=?1 AND user_id=?2",
                    params![story_id.as_str(), actor.id.as_str()],
                )?;
                collaboration.accepted = true;
                tracing::info!(role = %collaboration.role, "collaboration accepted");
            }
            Ok(collaboration)
        })
    }

    #[tracing::instrument(
        skip_all,
        fields(story_id = %story_id, actor = %owner.id, user_id = %user_id, role = role.as_str())
    )]
    pub fn invite_create(
        &mut self,
        story_id: &StoryId,
        owner: &ActorIdentity,
        user_id: &UserId,
        role: CollaborationRole,
    ) -> Result<CollaborationInvite, StoreError> {
        let now_ms = now_ms();
        self.write("invite_create", |tx| {
            require_access_tx(tx, story_id, owner, RequiredRole::Owner)?;
            if owner.id == *user_id {
                return Err(StoreError::InvalidInput("owner cannot invite themselves"));
            }
            let id = insert_proposal_tx(tx, &INVITES, story_id, user_id, role, now_ms)?;
            Ok(CollaborationProposal {
                id: InviteId::try_new(id)?,
                story_id: story_id.clone(),
                user_id: user_id.clone(),
                role,
                created_at_ms: now_ms,
            })
        })
    }

    /// The invited user turns the invite into an accepted collaboration.
    #[tracing::instrument(skip_all, fields(invite_id = %invite_id, actor = %actor.id))]
    pub fn invite_accept(
        &mut self,
        invite_id: &InviteId,
        actor: &ActorIdentity,
    ) -> Result<Collaboration, StoreError> {
        let now_ms = now_ms();
        self.write("invite_accept", |tx| {
            let invite = load_proposal_tx(tx, &INVITES, invite_id.as_str(), InviteId::try_new)?
                .ok_or(StoreError::NotFound("invite"))?;
            if invite.user_id != actor.id {
                return Err(StoreError::Forbidden("only the invited user can accept"));
            }
            accept_pair_tx(tx, &invite.story_id, &invite.user_id, invite.role, now_ms)
        })
    }

    /// Withdrawn by the owner or refused by the invited user.
    #[tracing::instrument(skip_all, fields(invite_id = %invite_id, actor = %actor.id))]
    pub fn invite_decline(
        &mut self,
        invite_id: &InviteId,
        actor: &ActorIdentity,
    ) -> Result<(), StoreError> {
        self.write("invite_decline", |tx| {
            let invite = load_proposal_tx(tx, &INVITES, invite_id.as_str(), InviteId::try_new)?
                .ok_or(StoreError::NotFound("invite"))?;
            if invite.user_id != actor.id && !is_owner_tx(tx, &invite.story_id, &actor.id)? {
                return Err(StoreError::Forbidden(
                    "only the invited user or the owner can decline",
                ));
            }
            delete_proposal_tx(tx, &INVITES, invite_id.as_str())
        })
    }

    pub fn invite_get(
        &self,
        invite_id: &InviteId,
    ) -> Result<Option<CollaborationInvite>, StoreError> {
        self.read("invite_get", |tx| {
            load_proposal_tx(tx, &INVITES, invite_id.as_str(), InviteId::try_new)
        })
    }

    /// A non-owner who can see the story asks to collaborate on it.
    #[tracing::instrument(
        skip_all,
        fields(story_id = %story_id, actor = %actor.id, role = role.as_str())
    )]
    pub fn request_create(
        &mut self,
        story_id: &StoryId,
        actor: &ActorIdentity,
        role: CollaborationRole,
    ) -> Result<CollaborationRequest, StoreError> {
        let now_ms = now_ms();
        self.write("request_create", |tx| {
            if is_owner_tx(tx, story_id, &actor.id)? {
                return Err(StoreError::InvalidInput("owner cannot request collaboration"));
            }
            require_access_tx(tx, story_id, actor, RequiredRole::View)?;
            let id = insert_proposal_tx(tx, &REQUESTS, story_id, &actor.id, role, now_ms)?;
            Ok(CollaborationProposal {
                id: RequestId::try_new(id)?,
                story_id: story_id.clone(),
                user_id: actor.id.clone(),
                role,
                created_at_ms: now_ms,
            })
        })
    }

    #[tracing::instrument(skip_all, fields(request_id = %request_id, actor = %owner.id))]
    pub fn request_accept(
        &mut self,
        request_id: &RequestId,
        owner: &ActorIdentity,
    ) -> Result<Collaboration, StoreError> {
        let now_ms = now_ms();
        self.write("request_accept", |tx| {
            let request =
                load_proposal_tx(tx, &REQUESTS, request_id.as_str(), RequestId::try_new)?
                    .ok_or(StoreError::NotFound("request"))?;
            require_access_tx(tx, &request.story_id, owner, RequiredRole::Owner)?;
            accept_pair_tx(tx, &request.story_id, &request.user_id, request.role, now_ms)
        })
    }

    #[tracing::instrument(skip_all, fields(request_id = %request_id, actor = %actor.id))]
    pub fn request_decline(
        &mut self,
        request_id: &RequestId,
        actor: &ActorIdentity,
    ) -> Result<(), StoreError> {
        self.write("request_decline", |tx| {
            let request =
                load_proposal_tx(tx, &REQUESTS, request_id.as_str(), RequestId::try_new)?
                    .ok_or(StoreError::NotFound("request"))?;
            if request.user_id != actor.id && !is_owner_tx(tx, &request.story_id, &actor.id)? {
                return Err(StoreError::Forbidden(
                    "only the requester or the owner can decline",
                ));
            }
            delete_proposal_tx(tx, &REQUESTS, request_id.as_str())
        })
    }

    pub fn request_get(
        &self,
        request_id: &RequestId,
    ) -> Result<Option<CollaborationRequest>, StoreError> {
        self.read("request_get", |tx| {
            load_proposal_tx(tx, &REQUESTS, request_id.as_str(), RequestId::try_new)
        })
    }

    #[tracing::instrument(
        skip_all,
        fields(story_id = %story_id, actor = %owner.id, user_id = %user_id, role = role.as_str())
    )]
    pub fn collaboration_set_role(
        &mut self,
        story_id: &StoryId,
        owner: &ActorIdentity,
        user_id: &UserId,
        role: CollaborationRole,
    ) -> Result<Collaboration, StoreError> {
        self.write("collaboration_set_role", |tx| {
            require_access_tx(tx, story_id, owner, RequiredRole::Owner)?;
            let mut collaboration = load_collaboration_tx(tx, story_id, user_id)?
                .ok_or(StoreError::NotFound("collaboration"))?;
            tx.execute(
                "UPDATE collaborations SET role=?3 WHERE story_id=?1 AND user_id=?2",
                params![story_id.as_str(), user_id.as_str(), role.as_str()],
            )?;
            collaboration.role = role.as_str().to_string();
            Ok(collaboration)
        })
    }

    /// Removes a collaboration; the owner may remove anyone, a collaborator only themselves.
    #[tracing::instrument(
        skip_all,
        fields(story_id = %story_id, actor = %actor.id, user_id = %user_id)
    )]
    pub fn collaboration_remove(
        &mut self,
        story_id: &StoryId,
        actor: &ActorIdentity,
        user_id: &UserId,
    ) -> Result<(), StoreError> {
        self.write("collaboration_remove", |tx| {
            if actor.id != *user_id {
                require_access_tx(tx, story_id, actor, RequiredRole::Owner)?;
            }
            let removed = tx.execute(
                "DELETE FROM collaborations WHERE story_id=?1 AND user_id=?2",
                params![story_id.as_str(), user_id.as_str()],
            )?;
            if removed == 0 {
                return Err(StoreError::NotFound("collaboration"));
            }
            tracing::info!("collaboration removed");
            Ok(())
        })
    }

    pub fn collaboration_get(
        &self,
        story_id: &StoryId,
        user_id: &UserId,
    ) -> Result<Option<Collaboration>, StoreError> {
        self.read("collaboration_get", |tx| {
            load_collaboration_tx(tx, story_id, user_id)
        })
    }

    /// Every collaboration on the story, pending ones included, ordered by user.
    pub fn collaborations_list(
        &self,
        story_id: &StoryId,
        actor: &ActorIdentity,
    ) -> Result<Vec<Collaboration>, StoreError> {
        self.read("collaborations_list", |tx| {
            require_access_tx(tx, story_id, actor, RequiredRole::View)?;
            let mut stmt = tx.prepare(
                "SELECT user_id, role, accepted, created_at_ms FROM collaborations \
                 WHERE story_id=?1 ORDER BY user_id ASC",
            )?;
            let rows = stmt
                .query_map(params![story_id.as_str()], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, bool>(2)?,
                        row.get::<_, i64>(3)?,
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;

            let mut out = Vec::with_capacity(rows.len());
            for (user_id, role, accepted, created_at_ms) in rows {
                out.push(Collaboration {
                    story_id: story_id.clone(),
                    user_id: UserId::try_new(user_id).map_err(corrupt("collaborations.user_id"))?,
                    role,
                    accepted,
                    created_at_ms,
                });
            }
            Ok(out)
        })
    }
}

fn load_collaboration_tx(
    tx: &Transaction<'_>,
    story_id: &StoryId,
    user_id: &UserId,
) -> Result<Option<Collaboration>, StoreError> {
    let row = tx
        .query_row(
            "SELECT role, accepted, created_at_ms FROM collaborations \
             WHERE story_id=?1 AND user_id=?2",
            params![story_id.as_str(), user_id.as_str()],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, bool>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            },
        )
        .optional()?;
    Ok(row.map(|(role, accepted, created_at_ms)| Collaboration {
        story_id: story_id.clone(),
        user_id: user_id.clone(),
        role,
        accepted,
        created_at_ms,
    }))
}

fn is_owner_tx(
    tx: &Transaction<'_>,
    story_id: &StoryId,
    user_id: &UserId,
) -> Result<bool, StoreError> {
    let owner_id = tx
        .query_row(
            "SELECT owner_id FROM stories WHERE id=?1",
            params![story_id.as_str()],
            |row| row.get::<_, String>(0),
        )
        .optional()?
        .ok_or(StoreError::NotFound("story"))?;
    Ok(owner_id == user_id.as_str())
}

/// Conflict unless the pair has no collaboration, invite or request yet.
fn ensure_pair_free_tx(
    tx: &Transaction<'_>,
    story_id: &StoryId,
    user_id: &UserId,
) -> Result<(), StoreError> {
    let checks = [
        ("collaborations", "collaboration already exists"),
        (INVITES.table, "invite already pending"),
        (REQUESTS.table, "request already pending"),
    ];
    for (table, conflict) in checks {
        let taken = tx
            .query_row(
                &format!("SELECT 1 FROM {table} WHERE story_id=?1 AND user_id=?2"),
                params![story_id.as_str(), user_id.as_str()],
                |row| row.get::<_, i64>(0),
            )
            .optional()?
            .is_some();
        if taken {
            return Err(StoreError::Conflict(conflict));
        }
    }
    Ok(())
}

fn insert_proposal_tx(
    tx: &Transaction<'_>,
    kind: &ProposalTable,
    story_id: &StoryId,
    user_id: &UserId,
    role: CollaborationRole,
    now_ms: i64,
) -> Result<String, StoreError> {
    ensure_pair_free_tx(tx, story_id, user_id)?;
    let id = next_id_tx(tx, kind.id_prefix)?;
    tx.execute(
        &format!(
            "INSERT INTO {}(id, story_id, user_id, role, created_at_ms) VALUES (?1, ?2, ?3, ?4, ?5)",
            kind.table
        ),
        params![id, story_id.as_str(), user_id.as_str(), role.as_str(), now_ms],
    )
    .map_err(|err| map_insert_conflict(err, "proposal already pending"))?;
    tracing::info!(id = %id, kind = kind.what, "collaboration proposal created");
    Ok(id)
}

fn load_proposal_tx<Id>(
    tx: &Transaction<'_>,
    kind: &ProposalTable,
    id: &str,
    make_id: fn(String) -> Result<Id, IdError>,
) -> Result<Option<CollaborationProposal<Id>>, StoreError> {
    let row = tx
        .query_row(
            &format!(
                "SELECT story_id, user_id, role, created_at_ms FROM {} WHERE id=?1",
                kind.table
            ),
            params![id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                ))
            },
        )
        .optional()?;
    let Some((story_id, user_id, role, created_at_ms)) = row else {
        return Ok(None);
    };
    Ok(Some(CollaborationProposal {
        id: make_id(id.to_string()).map_err(corrupt("proposal.id"))?,
        story_id: StoryId::try_new(story_id).map_err(corrupt("proposal.story_id"))?,
        user_id: UserId::try_new(user_id).map_err(corrupt("proposal.user_id"))?,
        role: CollaborationRole::parse(&role).ok_or_else(|| corrupt("proposal.role")(role))?,
        created_at_ms,
    }))
}

fn delete_proposal_tx(
    tx: &Transaction<'_>,
    kind: &ProposalTable,
    id: &str,
) -> Result<(), StoreError> {
    tx.execute(
        &format!("DELETE FROM {} WHERE id=?1", kind.table),
        params![id],
    )?;
    tracing::info!(id, kind = kind.what, "collaboration proposal declined");
    Ok(())
}

/// Creates the accepted collaboration and clears every proposal for the pair.
fn accept_pair_tx(
    tx: &Transaction<'_>,
    story_id: &StoryId,
    user_id: &UserId,
    role: CollaborationRole,
    now_ms: i64,
) -> Result<Collaboration, StoreError> {
    for kind in [&INVITES, &REQUESTS] {
        tx.execute(
            &format!("DELETE FROM {} WHERE story_id=?1 AND user_id=?2", kind.table),
            params![story_id.as_str(), user_id.as_str()],
        )?;
    }
    tx.execute(
        "INSERT INTO collaborations(story_id, user_id, role, accepted, created_at_ms) \
         VALUES (?1, ?2, ?3, 1, ?4)",
        params![story_id.as_str(), user_id.as_str(), role.as_str(), now_ms],
    )
    .map_err(|err| map_insert_conflict(err, "collaboration already exists"))?;
    tracing::info!(
        story_id = %story_id,
        user_id = %user_id,
        role = role.as_str(),
        "collaboration accepted"
    );
    Ok(Collaboration {
        story_id: story_id.clone(),
        user_id: user_id.clone(),
        role: role.as_str().to_string(),
        accepted: true,
        created_at_ms: now_ms,
    })
}
