#![forbid(unsafe_code)]

use std::fmt;

const MAX_ID_LEN: usize = 128;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IdError {
    Empty,
    TooLong,
    ContainsControl,
}

impl IdError {
    pub fn message(&self) -> &'static str {
        match self {
            Self::Empty => "id must not be empty",
            Self::TooLong => "id is too long",
            Self::ContainsControl => "id contains control characters",
        }
    }
}

impl fmt::Display for IdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

impl std::error::Error for IdError {}

fn canonical_id(value: String) -> Result<String, IdError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(IdError::Empty);
    }
    if trimmed.len() > MAX_ID_LEN {
        return Err(IdError::TooLong);
    }
    if trimmed.chars().any(|c| c.is_control()) {
        return Err(IdError::ContainsControl);
    }
    if trimmed.len() == value.len() {
        Ok(value)
    } else {
        Ok(trimmed.to_string())
    }
}

macro_rules! record_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(String);

        impl $name {
            pub fn try_new(value: impl Into<String>) -> Result<Self, IdError> {
                canonical_id(value.into()).map(Self)
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

record_id!(StoryId);
record_id!(
    /// An authenticated application user. Owners and collaborators are both users.
    UserId
);
record_id!(NodeId);
record_id!(EventId);
record_id!(NoteId);
record_id!(CardId);
record_id!(InviteId);
record_id!(RequestId);

/// The caller on whose behalf a store operation runs.
///
/// Adapters construct this after authentication; nothing below the adapter
/// looks identity up from ambient state.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ActorIdentity {
    pub id: UserId,
}

impl ActorIdentity {
    pub fn new(id: UserId) -> Self {
        Self { id }
    }

    pub fn try_new(value: impl Into<String>) -> Result<Self, IdError> {
        UserId::try_new(value).map(Self::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_reject_blank_and_control_values() {
        assert_eq!(StoryId::try_new("").unwrap_err(), IdError::Empty);
        assert_eq!(StoryId::try_new("   ").unwrap_err(), IdError::Empty);
        assert_eq!(
            NodeId::try_new("TL\u{0007}1").unwrap_err(),
            IdError::ContainsControl
        );
        assert_eq!(
            UserId::try_new("u".repeat(MAX_ID_LEN + 1)).unwrap_err(),
            IdError::TooLong
        );
    }

    #[test]
    fn ids_are_trimmed() {
        let id = UserId::try_new("  alice ").unwrap();
        assert_eq!(id.as_str(), "alice");
        assert_eq!(id.to_string(), "alice");
    }

    #[test]
    fn actor_identity_wraps_user_id() {
        let actor = ActorIdentity::try_new("bob").unwrap();
        assert_eq!(actor.id, UserId::try_new("bob").unwrap());
        assert!(ActorIdentity::try_new("").is_err());
    }
}
