//! Dataset statistics over stored windows

use serde::Serialize;
use std::collections::BTreeMap;

use crate::analytics::window::{AggregateWindow, SentimentDistribution, TOP_INFLUENCERS};
use crate::models::{EntityId, EntityKind};

/// Mention totals for one entity
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityTotals {
    pub entity: EntityId,
    pub mentions: u64,
    pub mean_sentiment: Option<f64>,
    pub engagement: u64,
    /// Posts that also matched a tracked celebrity
    pub celebrity_mentions: u64,
    /// Most active co-matched celebrities, most posts first
    pub top_influencers: Vec<(String, u64)>,
}

/// Statistics report
#[derive(Debug, Clone, Default, Serialize)]
pub struct Summary {
    /// Posts recorded as ingested, matched or not
    pub total_posts: u64,
    pub matched_posts: u64,
    /// Label counts, one per post
    pub sentiment: SentimentDistribution,
    /// Celebrities by mentions, descending
    pub celebrities: Vec<EntityTotals>,
    /// Top keywords by mentions, descending
    pub top_keywords: Vec<EntityTotals>,
}

impl Summary {
    /// Build the per-entity part of a report from windows; `top` caps the keyword list
    ///
    /// Post totals come from the post records, see [`Summary::with_posts`].
    pub fn from_windows<'a>(
        windows: impl IntoIterator<Item = &'a AggregateWindow>,
        top: usize,
    ) -> Self {
        #[derive(Default)]
        struct Acc {
            mentions: u64,
            sentiment_micros: i64,
            sentiment_count: u64,
            engagement: u64,
            celebrity_mentions: u64,
            influencers: BTreeMap<String, u64>,
        }

        let mut per_entity: BTreeMap<EntityId, Acc> = BTreeMap::new();

        for window in windows {
            let acc = per_entity.entry(window.key.entity.clone()).or_default();
            acc.mentions += window.mention_count;
            acc.sentiment_micros += window.sentiment_sum_micros;
            acc.sentiment_count += window.sentiment_count;
            acc.engagement += window.engagement_sum();
            acc.celebrity_mentions += window.celebrity_mentions;
            for (name, n) in &window.influencers {
                *acc.influencers.entry(name.clone()).or_default() += n;
            }
        }

        let (mut celebrities, mut keywords): (Vec<_>, Vec<_>) = per_entity
            .into_iter()
            .map(|(entity, acc)| EntityTotals {
                entity,
                mentions: acc.mentions,
                mean_sentiment: (acc.sentiment_count > 0).then(|| {
                    acc.sentiment_micros as f64 / 1_000_000.0 / acc.sentiment_count as f64
                }),
                engagement: acc.engagement,
                celebrity_mentions: acc.celebrity_mentions,
                top_influencers: rank_influencers(acc.influencers),
            })
            .partition(|t| t.entity.kind() == EntityKind::Celebrity);

        let by_mentions = |a: &EntityTotals, b: &EntityTotals| {
            b.mentions.cmp(&a.mentions).then_with(|| a.entity.cmp(&b.entity))
        };
        celebrities.sort_by(by_mentions);
        keywords.sort_by(by_mentions);
        keywords.truncate(top);

        Self {
            celebrities,
            top_keywords: keywords,
            ..Self::default()
        }
    }

    /// Set the post-level totals: counts and one sentiment label per post
    #[must_use]
    pub fn with_posts(
        mut self,
        total: u64,
        matched: u64,
        sentiment: SentimentDistribution,
    ) -> Self {
        self.total_posts = total;
        self.matched_posts = matched;
        self.sentiment = sentiment;
        self
    }
}

fn rank_influencers(tally: BTreeMap<String, u64>) -> Vec<(String, u64)> {
    let mut ranked: Vec<(String, u64)> = tally.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(TOP_INFLUENCERS);
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::window::WindowSpec;
    use chrono::{TimeZone, Utc};

    fn window(entity: EntityId, hour: u32, mentions: u64, positive: u64) -> AggregateWindow {
        let spec = WindowSpec::from_secs(3600).unwrap();
        let ts = Utc.with_ymd_and_hms(2024, 1, 15, hour, 0, 0).unwrap();
        let mut w = AggregateWindow::empty(spec.key_for(&entity, ts));
        w.mention_count = mentions;
        w.sentiment_count = mentions;
        w.sentiment_sum_micros = (positive as i64) * 500_000;
        w.sentiment.positive = positive;
        w.sentiment.neutral = mentions - positive;
        w
    }

    #[test]
    fn test_summary_groups_and_ranks() {
        let windows = vec![
            window(EntityId::keyword("doge"), 10, 5, 2),
            window(EntityId::keyword("doge"), 11, 3, 1),
            window(EntityId::keyword("pepe"), 10, 4, 0),
            window(EntityId::keyword("bonk"), 10, 1, 1),
            window(EntityId::celebrity("elonmusk"), 10, 2, 2),
        ];

        let posts = SentimentDistribution {
            positive: 6,
            neutral: 10,
            negative: 4,
        };
        let summary = Summary::from_windows(&windows, 2).with_posts(20, 12, posts);

        assert_eq!(summary.total_posts, 20);
        assert_eq!(summary.matched_posts, 12);
        assert_eq!(summary.sentiment, posts);
        assert_eq!(summary.top_keywords.len(), 2);
        assert_eq!(summary.top_keywords[0].entity, EntityId::keyword("doge"));
        assert_eq!(summary.top_keywords[0].mentions, 8);
        assert_eq!(summary.celebrities.len(), 1);
        assert_eq!(summary.celebrities[0].mean_sentiment, Some(0.5));
    }

    #[test]
    fn test_empty_summary() {
        let summary = Summary::from_windows(&[], 10);
        assert!(summary.top_keywords.is_empty());
        assert_eq!(summary.sentiment.total(), 0);
    }

    #[test]
    fn test_influencers_merge_across_windows() {
        let doge = EntityId::keyword("doge");
        let mut first = window(doge.clone(), 10, 3, 0);
        first.celebrity_mentions = 2;
        first.influencers.insert("elonmusk".to_string(), 2);
        let mut second = window(doge, 11, 2, 0);
        second.celebrity_mentions = 2;
        second.influencers.insert("elonmusk".to_string(), 1);
        second.influencers.insert("snoopdogg".to_string(), 1);

        let summary = Summary::from_windows(&[first, second], 10);
        let doge = &summary.top_keywords[0];

        assert_eq!(doge.celebrity_mentions, 4);
        assert_eq!(
            doge.top_influencers,
            vec![("elonmusk".to_string(), 3), ("snoopdogg".to_string(), 1)]
        );
    }
}
