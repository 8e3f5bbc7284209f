#![forbid(unsafe_code)]

//! Position vectors and the pure half of timeline restructuring.
//!
//! A node's position is its path from the story root. A node is a descendant
//! of another exactly when the other's position is a prefix of its own, so
//! subtree membership never needs a parent-pointer walk.

use crate::ids::{NodeId, StoryId};
use std::fmt;

pub const ROOT_NODE_NAME: &str = "Story";

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Position {
    indices: Vec<u32>,
}

impl Position {
    pub fn root() -> Self {
        Self { indices: vec![0] }
    }

    pub fn try_from_indices(indices: Vec<u32>) -> Result<Self, PositionError> {
        if indices.is_empty() {
            return Err(PositionError::Empty);
        }
        Ok(Self { indices })
    }

    pub fn parse(value: &str) -> Result<Self, PositionError> {
        let value = value.trim();
        if value.is_empty() {
            return Err(PositionError::Empty);
        }
        let mut indices = Vec::new();
        for segment in value.split('.') {
            let index = segment
                .parse::<u32>()
                .map_err(|_| PositionError::InvalidIndex)?;
            indices.push(index);
        }
        Ok(Self { indices })
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    /// Number of elements; equals the level of the node holding this position.
    pub fn depth(&self) -> usize {
        self.indices.len()
    }

    pub fn child(&self, ordinal: u32) -> Self {
        let mut indices = self.indices.clone();
        indices.push(ordinal);
        Self { indices }
    }

    pub fn is_prefix_of(&self, other: &Position) -> bool {
        other.indices.len() >= self.indices.len()
            && other.indices[..self.indices.len()] == self.indices[..]
    }

    pub fn encode(&self) -> String {
        self.indices
            .iter()
            .map(|i| i.to_string())
            .collect::<Vec<_>>()
            .join(".")
    }

    fn last(&self) -> u32 {
        self.indices.last().copied().unwrap_or(0)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PositionError {
    Empty,
    InvalidIndex,
}

impl PositionError {
    pub fn message(&self) -> &'static str {
        match self {
            Self::Empty => "position must not be empty",
            Self::InvalidIndex => "position segments must be non-negative integers",
        }
    }
}

impl fmt::Display for PositionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TimelineNode {
    pub id: NodeId,
    pub story_id: StoryId,
    pub parent_id: Option<NodeId>,
    pub position: Position,
    pub name: String,
    pub title: Option<String>,
    pub level: u32,
}

impl TimelineNode {
    pub fn is_root(&self) -> bool {
        self.level == 1 && self.parent_id.is_none()
    }

    pub fn validate(&self) -> Result<(), TimelineNodeError> {
        if self.level < 1 {
            return Err(TimelineNodeError::LevelBelowOne);
        }
        if self.position.depth() != self.level as usize {
            return Err(TimelineNodeError::LevelMismatch);
        }
        if self.level == 1 && self.parent_id.is_some() {
            return Err(TimelineNodeError::RootWithParent);
        }
        if self.level > 1 && self.parent_id.is_none() {
            return Err(TimelineNodeError::MissingParent);
        }
        Ok(())
    }

    pub fn display_title(&self) -> String {
        note_display_title(&self.name, self.title.as_deref())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimelineNodeError {
    LevelBelowOne,
    LevelMismatch,
    RootWithParent,
    MissingParent,
}

impl TimelineNodeError {
    pub fn message(&self) -> &'static str {
        match self {
            Self::LevelBelowOne => "timeline level must be at least 1",
            Self::LevelMismatch => "timeline position length must equal its level",
            Self::RootWithParent => "level 1 timeline node must not have a parent",
            Self::MissingParent => "timeline node below level 1 needs a parent",
        }
    }
}

impl fmt::Display for TimelineNodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Display title stored on notes linked to a timeline node.
pub fn note_display_title(name: &str, title: Option<&str>) -> String {
    match title.map(str::trim).filter(|title| !title.is_empty()) {
        Some(title) => format!("{name}: {title}"),
        None => name.to_string(),
    }
}

/// Position for a new child of `parent`, one past the highest existing sibling.
pub fn next_child_position<'a>(
    parent: &Position,
    siblings: impl IntoIterator<Item = &'a Position>,
) -> Position {
    let next = siblings
        .into_iter()
        .filter(|sibling| {
            sibling.depth() == parent.depth() + 1 && parent.is_prefix_of(sibling)
        })
        .map(|sibling| sibling.last().saturating_add(1))
        .max()
        .unwrap_or(0);
    parent.child(next)
}

/// Every node whose position starts with `prefix`, the prefix holder included.
pub fn descendant_set<'a>(nodes: &'a [TimelineNode], prefix: &Position) -> Vec<&'a TimelineNode> {
    nodes
        .iter()
        .filter(|node| prefix.is_prefix_of(&node.position))
        .collect()
}

pub fn find_root(nodes: &[TimelineNode]) -> Option<&TimelineNode> {
    nodes
        .iter()
        .filter(|node| node.is_root())
        .min_by(|a, b| a.position.cmp(&b.position))
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EventRelocation {
    ToRoot { root_id: NodeId },
    Unlink,
}

/// What removing one node does to the rest of the story.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemovalPlan {
    /// Node ids to delete, deepest level first so children go before parents.
    pub doomed: Vec<NodeId>,
    pub relocation: EventRelocation,
}

impl RemovalPlan {
    pub fn contains(&self, node_id: &NodeId) -> bool {
        self.doomed.contains(node_id)
    }
}

pub fn plan_removal(nodes: &[TimelineNode], target: &TimelineNode) -> RemovalPlan {
    let mut doomed = descendant_set(nodes, &target.position);
    doomed.sort_by(|a, b| {
        b.position
            .depth()
            .cmp(&a.position.depth())
            .then_with(|| a.position.cmp(&b.position))
    });

    let mut plan = RemovalPlan {
        doomed: doomed.into_iter().map(|node| node.id.clone()).collect(),
        relocation: EventRelocation::Unlink,
    };
    // A target missing from `nodes` still goes, after anything listed beneath it.
    if !plan.contains(&target.id) {
        plan.doomed.push(target.id.clone());
    }
    if let Some(root) = find_root(nodes).filter(|root| !plan.contains(&root.id)) {
        plan.relocation = EventRelocation::ToRoot {
            root_id: root.id.clone(),
        };
    }
    plan
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(indices: &[u32]) -> Position {
        Position::try_from_indices(indices.to_vec()).unwrap()
    }

    fn id(raw: &str) -> NodeId {
        NodeId::try_new(raw).unwrap()
    }

    fn ids(raw: &[&str]) -> Vec<NodeId> {
        raw.iter().copied().map(id).collect()
    }

    fn node(raw_id: &str, parent: Option<&str>, indices: &[u32]) -> TimelineNode {
        TimelineNode {
            id: id(raw_id),
            story_id: StoryId::try_new("STORY-1").unwrap(),
            parent_id: parent.map(id),
            position: pos(indices),
            name: raw_id.to_string(),
            title: None,
            level: indices.len() as u32,
        }
    }

    fn sample() -> Vec<TimelineNode> {
        vec![
            node("root", None, &[0]),
            node("chapter", Some("root"), &[0, 0]),
            node("scene", Some("chapter"), &[0, 0, 0]),
            node("chapter2", Some("root"), &[0, 1]),
            node("scene2", Some("chapter2"), &[0, 1, 0]),
            node("chapter10", Some("root"), &[0, 10]),
        ]
    }

    #[test]
    fn position_parse_and_encode() {
        let p = Position::parse("0.12.3").unwrap();
        assert_eq!(p.indices(), &[0, 12, 3]);
        assert_eq!(p.encode(), "0.12.3");
        assert_eq!(Position::parse("").unwrap_err(), PositionError::Empty);
        assert_eq!(
            Position::parse("0.-1").unwrap_err(),
            PositionError::InvalidIndex
        );
        assert_eq!(
            Position::try_from_indices(Vec::new()).unwrap_err(),
            PositionError::Empty
        );
    }

    #[test]
    fn prefix_compares_elements_not_text() {
        assert!(pos(&[0, 1]).is_prefix_of(&pos(&[0, 1, 4])));
        assert!(pos(&[0, 1]).is_prefix_of(&pos(&[0, 1])));
        assert!(!pos(&[0, 1]).is_prefix_of(&pos(&[0, 10])));
        assert!(!pos(&[0, 1, 4]).is_prefix_of(&pos(&[0, 1])));
    }

    #[test]
    fn descendant_set_includes_target_and_skips_lookalikes() {
        let nodes = sample();
        let found: Vec<&str> = descendant_set(&nodes, &pos(&[0, 1]))
            .into_iter()
            .map(|node| node.id.as_str())
            .collect();
        assert_eq!(found, vec!["chapter2", "scene2"]);
    }

    #[test]
    fn descendant_set_is_independent_of_input_order() {
        let mut nodes = sample();
        nodes.reverse();
        let mut found: Vec<&str> = descendant_set(&nodes, &pos(&[0, 0]))
            .into_iter()
            .map(|node| node.id.as_str())
            .collect();
        found.sort();
        assert_eq!(found, vec!["chapter", "scene"]);
    }

    #[test]
    fn removing_a_chapter_relocates_to_root_deepest_first() {
        let nodes = sample();
        let plan = plan_removal(&nodes, &nodes[1]);
        assert_eq!(plan.doomed, ids(&["scene", "chapter"]));
        assert_eq!(plan.relocation, EventRelocation::ToRoot { root_id: id("root") });
    }

    #[test]
    fn removing_the_root_unlinks_events() {
        let nodes = sample();
        let plan = plan_removal(&nodes, &nodes[0]);
        assert_eq!(plan.doomed.len(), nodes.len());
        assert_eq!(plan.doomed.last(), Some(&id("root")));
        assert_eq!(plan.relocation, EventRelocation::Unlink);
    }

    #[test]
    fn removal_without_root_unlinks_events() {
        let nodes = vec![node("orphan", Some("gone"), &[0, 3])];
        let plan = plan_removal(&nodes, &nodes[0]);
        assert!(plan.contains(&id("orphan")));
        assert_eq!(plan.relocation, EventRelocation::Unlink);
    }

    #[test]
    fn target_absent_from_the_listing_is_still_removed_last() {
        let nodes = sample();
        let stray = node("stray", Some("chapter"), &[0, 0, 7]);
        let plan = plan_removal(&nodes, &stray);
        assert_eq!(plan.doomed, ids(&["stray"]));
        assert_eq!(plan.relocation, EventRelocation::ToRoot { root_id: id("root") });
    }

    #[test]
    fn next_child_position_appends_after_highest_sibling() {
        let nodes = sample();
        let positions: Vec<&Position> = nodes.iter().map(|node| &node.position).collect();
        assert_eq!(
            next_child_position(&pos(&[0]), positions.iter().copied()),
            pos(&[0, 11])
        );
        assert_eq!(
            next_child_position(&pos(&[0, 0, 0]), positions.iter().copied()),
            pos(&[0, 0, 0, 0])
        );
    }

    #[test]
    fn node_validation_checks_level_against_position() {
        assert!(node("root", None, &[0]).validate().is_ok());
        let mut bad = node("x", Some("root"), &[0, 1]);
        bad.level = 3;
        assert_eq!(bad.validate().unwrap_err(), TimelineNodeError::LevelMismatch);
        assert_eq!(
            node("x", None, &[0, 2]).validate().unwrap_err(),
            TimelineNodeError::MissingParent
        );
    }

    #[test]
    fn display_title_joins_name_and_title() {
        assert_eq!(note_display_title("Chapter 1", Some("The Storm")), "Chapter 1: The Storm");
        assert_eq!(note_display_title("Chapter 1", Some("  ")), "Chapter 1");
        assert_eq!(note_display_title("Chapter 1", None), "Chapter 1");
    }
}
