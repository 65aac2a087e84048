//! Post-to-entity matching
//!
//! [`match_post`] is a pure function of a post and a registry snapshot. It
//! returns every active entity the post matches together with how it matched.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::models::{EntityId, Post};
use crate::registry::RegistrySnapshot;
use crate::utils::normalize_whitespace;

/// How a post matched a tracked entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    /// Post author is the celebrity
    CelebrityAuthored,
    /// Celebrity appears in the post's mentions
    CelebrityMentioned,
    /// Keyword occurs in the post text
    KeywordInText,
    /// Keyword occurs in the post's hashtags
    KeywordInHashtag,
}

impl MatchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CelebrityAuthored => "celebrity_authored",
            Self::CelebrityMentioned => "celebrity_mentioned",
            Self::KeywordInText => "keyword_in_text",
            Self::KeywordInHashtag => "keyword_in_hashtag",
        }
    }
}

/// One matched entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityMatch {
    pub entity: EntityId,
    pub kinds: BTreeSet<MatchKind>,
}

/// All entities a post matched, ordered by entity id
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MatchResult {
    matches: Vec<EntityMatch>,
}

impl MatchResult {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EntityMatch> {
        self.matches.iter()
    }

    pub fn entities(&self) -> impl Iterator<Item = &EntityId> {
        self.matches.iter().map(|m| &m.entity)
    }

    #[must_use]
    pub fn contains(&self, entity: &EntityId) -> bool {
        self.matches.iter().any(|m| &m.entity == entity)
    }

    /// Match kinds recorded for an entity
    pub fn kinds_for(&self, entity: &EntityId) -> Option<&BTreeSet<MatchKind>> {
        self.matches
            .iter()
            .find(|m| &m.entity == entity)
            .map(|m| &m.kinds)
    }
}

/// Match a post against the active entities of a registry snapshot
pub fn match_post(post: &Post, registry: &RegistrySnapshot) -> MatchResult {
    let mut found: BTreeMap<EntityId, BTreeSet<MatchKind>> = BTreeMap::new();

    let author = post.author.username.to_lowercase();
    if registry.has_celebrity(&author) {
        found
            .entry(EntityId::celebrity(&author))
            .or_default()
            .insert(MatchKind::CelebrityAuthored);
    }
    for celebrity in registry.celebrities() {
        if post.mentions.iter().any(|m| m.eq_ignore_ascii_case(celebrity)) {
            found
                .entry(EntityId::celebrity(celebrity))
                .or_default()
                .insert(MatchKind::CelebrityMentioned);
        }
    }

    let text = normalize_whitespace(&post.text).to_lowercase();
    for keyword in registry.keywords() {
        if keyword.is_empty() {
            continue;
        }
        let id = || EntityId::keyword(keyword);
        if text.contains(keyword) {
            found.entry(id()).or_default().insert(MatchKind::KeywordInText);
        }
        if hashtag_matches(&post.hashtags, keyword) {
            found.entry(id()).or_default().insert(MatchKind::KeywordInHashtag);
        }
    }

    MatchResult {
        matches: found
            .into_iter()
            .map(|(entity, kinds)| EntityMatch { entity, kinds })
            .collect(),
    }
}

// Multi-word keywords also match their concatenated hashtag form ("shiba inu" ~ #shibainu)
fn hashtag_matches(hashtags: &BTreeSet<String>, keyword: &str) -> bool {
    let compact: String = keyword.split_whitespace().collect();
    hashtags
        .iter()
        .map(|tag| tag.trim_start_matches('#').to_lowercase())
        .any(|tag| tag == keyword || tag == compact)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Author;
    use crate::registry::EntityRegistry;
    use chrono::Utc;

    fn post(author: &str, text: &str) -> Post {
        Post::new("1", text, Utc::now(), Author::new(author))
    }

    fn registry(celebs: &[&str], keywords: &[&str]) -> EntityRegistry {
        let registry = EntityRegistry::new();
        for c in celebs {
            registry.add(EntityId::celebrity(c));
        }
        for k in keywords {
            registry.add(EntityId::keyword(k));
        }
        registry
    }

    #[test]
    fn test_celebrity_authored_case_insensitive() {
        let registry = registry(&["elonmusk"], &[]);
        let result = match_post(&post("ElonMusk", "hello"), &registry.snapshot());

        let id = EntityId::celebrity("elonmusk");
        assert!(result.contains(&id));
        assert!(result
            .kinds_for(&id)
            .unwrap()
            .contains(&MatchKind::CelebrityAuthored));
    }

    #[test]
    fn test_celebrity_mentioned() {
        let registry = registry(&["elonmusk"], &[]);
        let p = post("someone", "what do you think").with_mentions(["@ElonMusk"]);
        let result = match_post(&p, &registry.snapshot());

        let kinds = result.kinds_for(&EntityId::celebrity("elonmusk")).unwrap();
        assert_eq!(kinds.len(), 1);
        assert!(kinds.contains(&MatchKind::CelebrityMentioned));
    }

    #[test]
    fn test_keyword_in_text_substring() {
        let registry = registry(&[], &["doge"]);
        let result = match_post(&post("a", "Dogecoin to the MOON"), &registry.snapshot());
        assert!(result.contains(&EntityId::keyword("doge")));
    }

    #[test]
    fn test_keyword_in_hashtag() {
        let registry = registry(&[], &["shiba inu"]);
        let p = post("a", "look at this").with_hashtags(["#ShibaInu"]);
        let result = match_post(&p, &registry.snapshot());

        let kinds = result.kinds_for(&EntityId::keyword("shiba inu")).unwrap();
        assert!(kinds.contains(&MatchKind::KeywordInHashtag));
        assert!(!kinds.contains(&MatchKind::KeywordInText));
    }

    #[test]
    fn test_multiple_matches_returned() {
        let registry = registry(&["elonmusk"], &["doge", "pepe", "bonk"]);
        let p = post("elonmusk", "doge and pepe").with_hashtags(["doge"]);
        let result = match_post(&p, &registry.snapshot());

        assert_eq!(result.len(), 3);
        assert!(!result.contains(&EntityId::keyword("bonk")));
        let doge = result.kinds_for(&EntityId::keyword("doge")).unwrap();
        assert_eq!(doge.len(), 2);
    }

    #[test]
    fn test_no_match() {
        let registry = registry(&["elonmusk"], &["doge"]);
        let result = match_post(&post("vitalik", "ethereum merge"), &registry.snapshot());
        assert!(result.is_empty());
    }

    #[test]
    fn test_deactivated_entity_never_matches() {
        let registry = registry(&["elonmusk"], &[]);
        let id = EntityId::celebrity("elonmusk");
        assert!(match_post(&post("elonmusk", "hi"), &registry.snapshot()).contains(&id));

        registry.remove(&id).unwrap();
        assert!(match_post(&post("elonmusk", "hi again"), &registry.snapshot()).is_empty());
    }
}
