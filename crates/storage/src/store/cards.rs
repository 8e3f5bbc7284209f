#![forbid(unsafe_code)]

use super::access::require_access_tx;
use super::tags::reconcile_tags_tx;
use super::{
    Card, SqliteStore, StoreError, corrupt, next_id_tx, now_ms, tags_from_json, tags_to_json,
};
use loom_core::access::RequiredRole;
use loom_core::ids::{ActorIdentity, CardId, StoryId};
use loom_core::tags::{TagScope, normalize_tags};
use rusqlite::{OptionalExtension, Transaction, params};
use std::collections::BTreeSet;

impl SqliteStore {
    #[tracing::instrument(skip_all, fields(story_id = %story_id, actor = %actor.id))]
    pub fn card_create<S: AsRef<str>>(
        &mut self,
        story_id: &StoryId,
        actor: &ActorIdentity,
        title: &str,
        tags: &[S],
    ) -> Result<Card, StoreError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(StoreError::InvalidInput("card title must not be empty"));
        }
        let tags = normalize_tags(tags)?;
        let now_ms = now_ms();
        self.write("card_create", |tx| {
            require_access_tx(tx, story_id, actor, RequiredRole::Edit)?;
            let id = CardId::try_new(next_id_tx(tx, "CARD")?)?;
            tx.execute(
                "INSERT INTO cards(id, story_id, title, tags_json, created_at_ms, updated_at_ms) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                params![
                    id.as_str(),
                    story_id.as_str(),
                    title,
                    tags_to_json(&tags)?,
                    now_ms
                ],
            )?;
            let scope = TagScope::Story(story_id.clone());
            reconcile_tags_tx(tx, &scope, &BTreeSet::new(), &tags)?;
            Ok(Card {
                id,
                story_id: story_id.clone(),
                title: title.to_string(),
                tags,
            })
        })
    }

    /// Replaces a card's tag set and adjusts the story's tag counters in the same transaction.
    #[tracing::instrument(skip_all, fields(card_id = %card_id, actor = %actor.id))]
    pub fn card_set_tags<S: AsRef<str>>(
        &mut self,
        card_id: &CardId,
        actor: &ActorIdentity,
        tags: &[S],
    ) -> Result<Card, StoreError> {
        let new_tags = normalize_tags(tags)?;
        let now_ms = now_ms();
        self.write("card_set_tags", |tx| {
            let mut card =
                load_card_tx(tx, card_id)?.ok_or(StoreError::NotFound("card"))?;
            require_access_tx(tx, &card.story_id, actor, RequiredRole::Edit)?;
            if card.tags == new_tags {
                return Ok(card);
            }
            let scope = TagScope::Story(card.story_id.clone());
            reconcile_tags_tx(tx, &scope, &card.tags, &new_tags)?;
            tx.execute(
                "UPDATE cards SET tags_json=?2, updated_at_ms=?3 WHERE id=?1",
                params![card_id.as_str(), tags_to_json(&new_tags)?, now_ms],
            )?;
            card.tags = new_tags;
            Ok(card)
        })
    }

    /// Deletes a card, releasing its tags first.
    #[tracing::instrument(skip_all, fields(card_id = %card_id, actor = %actor.id))]
    pub fn card_delete(
        &mut self,
        card_id: &CardId,
        actor: &ActorIdentity,
    ) -> Result<(), StoreError> {
        self.write("card_delete", |tx| {
            let card = load_card_tx(tx, card_id)?.ok_or(StoreError::NotFound("card"))?;
            require_access_tx(tx, &card.story_id, actor, RequiredRole::Edit)?;
            let scope = TagScope::Story(card.story_id.clone());
            reconcile_tags_tx(tx, &scope, &card.tags, &BTreeSet::new())?;
            tx.execute("DELETE FROM cards WHERE id=?1", params![card_id.as_str()])?;
            Ok(())
        })
    }

    pub fn card_get(&self, card_id: &CardId) -> Result<Option<Card>, StoreError> {
        self.read("card_get", |tx| load_card_tx(tx, card_id))
    }
}

fn load_card_tx(tx: &Transaction<'_>, card_id: &CardId) -> Result<Option<Card>, StoreError> {
    let row = tx
        .query_row(
            "SELECT story_id, title, tags_json FROM cards WHERE id=?1",
            params![card_id.as_str()],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            },
        )
        .optional()?;
    let Some((story_id, title, tags_json)) = row else {
        return Ok(None);
    };
    Ok(Some(Card {
        id: card_id.clone(),
        story_id: StoryId::try_new(story_id).map_err(corrupt("cards.story_id"))?,
        title,
        tags: tags_from_json(&tags_json)?,
    }))
}
