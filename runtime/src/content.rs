//! Content Registry
//!
//! Immutable, static list of the five book-report topics, in the fixed
//! dependency order they must be discussed. Injected at construction time
//! so a caller can swap in different content without touching the
//! coordination core.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier for one of the five fixed discussion topics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TopicId {
    Theme,
    Characters,
    Plot,
    Setting,
    Personal,
}

impl TopicId {
    /// The fixed dependency order topics are discussed in.
    pub const ORDER: [TopicId; 5] = [
        TopicId::Theme,
        TopicId::Characters,
        TopicId::Plot,
        TopicId::Setting,
        TopicId::Personal,
    ];

    pub fn index(&self) -> usize {
        Self::ORDER.iter().position(|t| t == self).expect("TopicId always in ORDER")
    }

    pub fn first() -> TopicId {
        Self::ORDER[0]
    }

    /// The topic that follows this one, or `None` if this is the last topic.
    pub fn next(&self) -> Option<TopicId> {
        Self::ORDER.get(self.index() + 1).copied()
    }
}

impl fmt::Display for TopicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TopicId::Theme => "theme",
            TopicId::Characters => "characters",
            TopicId::Plot => "plot",
            TopicId::Setting => "setting",
            TopicId::Personal => "personal",
        };
        write!(f, "{name}")
    }
}

/// Static description of a single discussion topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicInfo {
    pub id: TopicId,
    pub name: String,
    pub starter: String,
    pub depth_criteria: String,
}

/// Immutable collection of the book's five topics.
#[derive(Debug, Clone)]
pub struct ContentRegistry {
    topics: Vec<TopicInfo>,
}

impl ContentRegistry {
    /// Build a registry from an explicit set of topics, validated against
    /// the fixed `TopicId::ORDER`.
    pub fn new(topics: Vec<TopicInfo>) -> Self {
        debug_assert_eq!(topics.len(), TopicId::ORDER.len(), "content registry must cover every topic");
        Self { topics }
    }

    pub fn get(&self, id: TopicId) -> &TopicInfo {
        self.topics
            .iter()
            .find(|t| t.id == id)
            .expect("ContentRegistry is constructed with one entry per TopicId")
    }

    pub fn topics(&self) -> &[TopicInfo] {
        &self.topics
    }
}

impl Default for ContentRegistry {
    /// The default book-report content: a fixed book and five topics.
    fn default() -> Self {
        Self::new(vec![
            TopicInfo {
                id: TopicId::Theme,
                name: "Theme".into(),
                starter: "What do you think this book was really trying to say?".into(),
                depth_criteria: "Names a specific theme and connects it to at least one concrete moment in the book.".into(),
            },
            TopicInfo {
                id: TopicId::Characters,
                name: "Characters".into(),
                starter: "Who was your favorite character, and why?".into(),
                depth_criteria: "Describes how the character changes, not just what they did.".into(),
            },
            TopicInfo {
                id: TopicId::Plot,
                name: "Plot".into(),
                starter: "What was the most important turning point in the story?".into(),
                depth_criteria: "Explains why the turning point mattered to the rest of the plot.".into(),
            },
            TopicInfo {
                id: TopicId::Setting,
                name: "Setting".into(),
                starter: "How did the setting shape what happened in the book?".into(),
                depth_criteria: "Connects a specific setting detail to a specific plot or character effect.".into(),
            },
            TopicInfo {
                id: TopicId::Personal,
                name: "Personal Connection".into(),
                starter: "Did anything in this book remind you of your own life?".into(),
                depth_criteria: "Draws a genuine, specific parallel rather than a generic statement.".into(),
            },
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_is_fixed() {
        assert_eq!(TopicId::first(), TopicId::Theme);
        assert_eq!(TopicId::Theme.next(), Some(TopicId::Characters));
        assert_eq!(TopicId::Personal.next(), None);
    }

    #[test]
    fn default_registry_covers_all_topics() {
        let registry = ContentRegistry::default();
        for id in TopicId::ORDER {
            assert_eq!(registry.get(id).id, id);
        }
    }
}
