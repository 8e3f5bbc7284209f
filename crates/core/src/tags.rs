#![forbid(unsafe_code)]

use crate::ids::StoryId;
use std::collections::BTreeSet;

const MAX_TAG_LEN: usize = 64;

/// Which counter table a tag delta applies to.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TagScope {
    Story(StoryId),
    Global,
}

impl TagScope {
    pub fn story_id(&self) -> Option<&StoryId> {
        match self {
            Self::Story(id) => Some(id),
            Self::Global => None,
        }
    }
}

pub fn normalize_tags<I, S>(tags: I) -> Result<BTreeSet<String>, TagError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out = BTreeSet::new();
    for tag in tags {
        let trimmed = tag.as_ref().trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed.chars().any(|c| c.is_control()) {
            return Err(TagError::ContainsControl);
        }
        if trimmed.len() > MAX_TAG_LEN {
            return Err(TagError::TooLong);
        }
        out.insert(trimmed.to_lowercase());
    }
    Ok(out)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TagError {
    ContainsControl,
    TooLong,
}

impl TagError {
    pub fn message(&self) -> &'static str {
        match self {
            Self::ContainsControl => "tag contains control characters",
            Self::TooLong => "tag is too long",
        }
    }
}

/// Keys that entered and left a tag set between two revisions of an entity.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TagDelta {
    pub added: BTreeSet<String>,
    pub removed: BTreeSet<String>,
}

impl TagDelta {
    pub fn between(old: &BTreeSet<String>, new: &BTreeSet<String>) -> Self {
        Self {
            added: new.difference(old).cloned().collect(),
            removed: old.difference(new).cloned().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(keys: &[&str]) -> BTreeSet<String> {
        keys.iter().map(|key| key.to_string()).collect()
    }

    #[test]
    fn normalize_tags_is_deterministic_and_safe() {
        let out = normalize_tags([" Pirate ", "pirate", "SHIP", ""]).unwrap();
        assert_eq!(out, set(&["pirate", "ship"]));
        assert_eq!(
            normalize_tags(["bad\ntag"]).unwrap_err(),
            TagError::ContainsControl
        );
        assert_eq!(
            normalize_tags(["x".repeat(MAX_TAG_LEN + 1)]).unwrap_err(),
            TagError::TooLong
        );
    }

    #[test]
    fn delta_is_a_pair_of_set_differences() {
        let delta = TagDelta::between(&set(&["pirate", "ship"]), &set(&["ship", "storm"]));
        assert_eq!(delta.added, set(&["storm"]));
        assert_eq!(delta.removed, set(&["pirate"]));
        assert!(!delta.is_empty());
    }

    #[test]
    fn unchanged_sets_produce_an_empty_delta() {
        let tags = set(&["pirate"]);
        assert!(TagDelta::between(&tags, &tags).is_empty());
        assert!(TagDelta::between(&BTreeSet::new(), &BTreeSet::new()).is_empty());
    }
}
