#![forbid(unsafe_code)]

//! Authorization decisions over ownership, collaboration role and story visibility.
//!
//! Everything here is pure: callers load the story and the caller's
//! collaboration row (ideally from one snapshot) and hand them to [`decide`].

use crate::failure::FailureKind;
use std::fmt;

/// Total order of collaboration roles. Unknown role names sit at level 0.
const ROLE_LEVELS: &[(&str, u8)] = &[("view", 1), ("comment", 2), ("edit", 3)];

pub fn role_level(raw: &str) -> u8 {
    let raw = raw.trim();
    ROLE_LEVELS
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(raw))
        .map(|(_, level)| *level)
        .unwrap_or(0)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CollaborationRole {
    View,
    Comment,
    Edit,
}

impl CollaborationRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::View => "view",
            Self::Comment => "comment",
            Self::Edit => "edit",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match role_level(raw) {
            1 => Some(Self::View),
            2 => Some(Self::Comment),
            3 => Some(Self::Edit),
            _ => None,
        }
    }

    pub fn level(self) -> u8 {
        role_level(self.as_str())
    }
}

impl fmt::Display for CollaborationRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The authority an operation demands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RequiredRole {
    View,
    Comment,
    Edit,
    Owner,
}

impl RequiredRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::View => "view",
            Self::Comment => "comment",
            Self::Edit => "edit",
            Self::Owner => "owner",
        }
    }

    fn collaboration_level(self) -> Option<u8> {
        match self {
            Self::View => Some(CollaborationRole::View.level()),
            Self::Comment => Some(CollaborationRole::Comment.level()),
            Self::Edit => Some(CollaborationRole::Edit.level()),
            Self::Owner => None,
        }
    }
}

impl fmt::Display for RequiredRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The authority the caller actually holds once a check succeeds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EffectiveRole {
    View,
    Comment,
    Edit,
    Owner,
}

impl EffectiveRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::View => "view",
            Self::Comment => "comment",
            Self::Edit => "edit",
            Self::Owner => "owner",
        }
    }
}

impl From<CollaborationRole> for EffectiveRole {
    fn from(value: CollaborationRole) -> Self {
        match value {
            CollaborationRole::View => Self::View,
            CollaborationRole::Comment => Self::Comment,
            CollaborationRole::Edit => Self::Edit,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum Visibility {
    #[default]
    Private,
    Public,
}

impl Visibility {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::Public => "public",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "private" => Some(Self::Private),
            "public" => Some(Self::Public),
            _ => None,
        }
    }
}

/// The parts of a story that matter for access.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoryAccess<'a> {
    pub owner_id: &'a str,
    pub visibility: Visibility,
}

/// The caller's collaboration row, role kept raw so unknown names stay representable.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CollaborationGrant<'a> {
    pub role: &'a str,
    pub accepted: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AccessDecision {
    pub authorized: bool,
    pub effective_role: Option<EffectiveRole>,
    pub error_kind: Option<FailureKind>,
    pub status_hint: u16,
}

impl AccessDecision {
    pub fn granted(role: EffectiveRole) -> Self {
        Self {
            authorized: true,
            effective_role: Some(role),
            error_kind: None,
            status_hint: 200,
        }
    }

    pub fn denied(kind: FailureKind) -> Self {
        Self {
            authorized: false,
            effective_role: None,
            error_kind: Some(kind),
            status_hint: kind.status_hint(),
        }
    }

    pub fn into_result(self) -> Result<EffectiveRole, FailureKind> {
        match (self.authorized, self.effective_role) {
            (true, Some(role)) => Ok(role),
            _ => Err(self.error_kind.unwrap_or(FailureKind::Forbidden)),
        }
    }
}

/// Decides whether `user_id` may act on a story at the `required` level.
///
/// `story` is `None` when the story does not exist. Owner-only requirements
/// never fall back to collaboration or visibility, and public visibility only
/// ever grants View.
pub fn decide(
    user_id: &str,
    required: RequiredRole,
    story: Option<&StoryAccess<'_>>,
    collaboration: Option<&CollaborationGrant<'_>>,
) -> AccessDecision {
    if user_id.trim().is_empty() {
        return AccessDecision::denied(FailureKind::InvalidInput);
    }
    let Some(story) = story else {
        return AccessDecision::denied(FailureKind::NotFound);
    };
    if story.owner_id == user_id {
        return AccessDecision::granted(EffectiveRole::Owner);
    }
    let Some(required_level) = required.collaboration_level() else {
        return AccessDecision::denied(FailureKind::Forbidden);
    };

    let grant = collaboration.filter(|grant| grant.accepted);
    let Some(grant) = grant else {
        if required == RequiredRole::View && story.visibility == Visibility::Public {
            return AccessDecision::granted(EffectiveRole::View);
        }
        return AccessDecision::denied(FailureKind::Forbidden);
    };

    if role_level(grant.role) < required_level {
        return AccessDecision::denied(FailureKind::Forbidden);
    }
    match CollaborationRole::parse(grant.role) {
        Some(role) => AccessDecision::granted(role.into()),
        None => AccessDecision::denied(FailureKind::Forbidden),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_REQUIRED: [RequiredRole; 4] = [
        RequiredRole::View,
        RequiredRole::Comment,
        RequiredRole::Edit,
        RequiredRole::Owner,
    ];

    fn story(visibility: Visibility) -> StoryAccess<'static> {
        StoryAccess {
            owner_id: "owner",
            visibility,
        }
    }

    fn grant(role: &str, accepted: bool) -> CollaborationGrant<'_> {
        CollaborationGrant { role, accepted }
    }

    #[test]
    fn owner_is_always_authorized() {
        for visibility in [Visibility::Private, Visibility::Public] {
            for required in ALL_REQUIRED {
                for collab in [None, Some(grant("view", false)), Some(grant("bogus", true))] {
                    let decision =
                        decide("owner", required, Some(&story(visibility)), collab.as_ref());
                    assert!(decision.authorized, "{required:?} {visibility:?}");
                    assert_eq!(decision.effective_role, Some(EffectiveRole::Owner));
                    assert_eq!(decision.status_hint, 200);
                }
            }
        }
    }

    #[test]
    fn owner_requirement_is_never_met_by_collaboration() {
        let decision = decide(
            "ed",
            RequiredRole::Owner,
            Some(&story(Visibility::Public)),
            Some(&grant("edit", true)),
        );
        assert!(!decision.authorized);
        assert_eq!(decision.error_kind, Some(FailureKind::Forbidden));
        assert_eq!(decision.status_hint, 403);
    }

    #[test]
    fn public_fallback_grants_view_only() {
        let public = story(Visibility::Public);
        let view = decide("stranger", RequiredRole::View, Some(&public), None);
        assert!(view.authorized);
        assert_eq!(view.effective_role, Some(EffectiveRole::View));

        for required in [RequiredRole::Comment, RequiredRole::Edit] {
            let decision = decide("stranger", required, Some(&public), None);
            assert_eq!(decision.error_kind, Some(FailureKind::Forbidden));
        }

        let private = decide(
            "stranger",
            RequiredRole::View,
            Some(&story(Visibility::Private)),
            None,
        );
        assert!(!private.authorized);
    }

    #[test]
    fn unaccepted_collaboration_counts_as_absent() {
        let pending = grant("edit", false);
        let private = decide(
            "pending",
            RequiredRole::View,
            Some(&story(Visibility::Private)),
            Some(&pending),
        );
        assert_eq!(private.error_kind, Some(FailureKind::Forbidden));

        let public = decide(
            "pending",
            RequiredRole::Edit,
            Some(&story(Visibility::Public)),
            Some(&pending),
        );
        assert_eq!(public.error_kind, Some(FailureKind::Forbidden));
    }

    #[test]
    fn role_order_is_strict() {
        let s = story(Visibility::Private);
        let viewer = grant("view", true);
        assert!(!decide("v", RequiredRole::Edit, Some(&s), Some(&viewer)).authorized);
        assert!(!decide("v", RequiredRole::Comment, Some(&s), Some(&viewer)).authorized);

        let editor = grant("edit", true);
        for required in [RequiredRole::View, RequiredRole::Comment, RequiredRole::Edit] {
            let decision = decide("e", required, Some(&s), Some(&editor));
            assert!(decision.authorized);
            assert_eq!(decision.effective_role, Some(EffectiveRole::Edit));
        }
    }

    #[test]
    fn unknown_role_grants_nothing() {
        assert_eq!(role_level("admin"), 0);
        let decision = decide(
            "x",
            RequiredRole::View,
            Some(&story(Visibility::Private)),
            Some(&grant("admin", true)),
        );
        assert!(!decision.authorized);
    }

    #[test]
    fn missing_story_and_blank_user_are_reported() {
        assert_eq!(
            decide("u", RequiredRole::View, None, None).error_kind,
            Some(FailureKind::NotFound)
        );
        let blank = decide(" ", RequiredRole::View, Some(&story(Visibility::Public)), None);
        assert_eq!(blank.error_kind, Some(FailureKind::InvalidInput));
        assert_eq!(blank.status_hint, 400);
    }

    #[test]
    fn decision_converts_to_result() {
        assert_eq!(
            AccessDecision::granted(EffectiveRole::Comment).into_result(),
            Ok(EffectiveRole::Comment)
        );
        assert_eq!(
            AccessDecision::denied(FailureKind::NotFound).into_result(),
            Err(FailureKind::NotFound)
        );
    }
}
