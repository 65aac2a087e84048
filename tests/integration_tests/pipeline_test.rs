//! End-to-end pipeline integration tests
//!
//! Tests the complete workflow:
//! 1. Post matching against the registry
//! 2. Sentiment scoring
//! 3. Window aggregation
//! 4. Trend detection
//! 5. Notification triggering and delivery
//! 6. Batch ingestion with checkpoints

use std::sync::Arc;

use memewatch::analytics::{AggregateWindow, WindowSpec};
use memewatch::matcher::MatchKind;
use memewatch::models::{EntityId, Post};
use memewatch::notifications::{
    CompareOp, HistoryChannel, Metric, NotificationDispatcher, NotificationTrigger, TriggerRule,
};
use memewatch::pipeline::{BatchOptions, BatchRunner, IngestOutcome, Pipeline};
use memewatch::sentiment::{SentimentLabel, SentimentScorer};
use memewatch::storage::{create_memory_store, create_sqlite_store, CheckpointManager};
use proptest::prelude::*;
use tempfile::TempDir;

use super::fixtures::{write_dataset, SAMPLE_DATASET_ARRAY, SAMPLE_DATASET_JSONL};
use crate::common::{
    at, create_pipeline_with, create_post_by, create_test_config, create_test_pipeline,
    create_test_post,
};

fn doge() -> EntityId {
    EntityId::keyword("doge")
}

fn doge_windows(pipeline: &Pipeline) -> Vec<AggregateWindow> {
    pipeline.windows(&doge(), None, None).unwrap()
}

// ============================================================================
// Core Properties
// ============================================================================

#[test]
fn test_doge_to_the_moon_example() {
    let pipeline = create_test_pipeline();

    let outcome = pipeline
        .ingest(&create_test_post("1", "doge to the moon!", at(10, 15, 0)))
        .unwrap();

    let windows = doge_windows(&pipeline);
    assert_eq!(windows.len(), 1);
    assert_eq!(windows[0].mention_count, 1);
    assert!(windows[0].mean_sentiment().unwrap() > 0.0);

    let events = outcome.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].entity_id, doge());
    assert_eq!(events[0].rule_triggered, "volume");
    assert_eq!(events[0].observed_value, 1.0);
    assert_eq!(events[0].threshold, 1.0);
    assert_eq!(events[0].window_start, at(10, 0, 0));
    assert_eq!(events[0].window_end, at(11, 0, 0));
}

#[test]
fn test_ingesting_twice_equals_ingesting_once() {
    let once = create_test_pipeline();
    let twice = create_test_pipeline();
    let post = create_test_post("1", "doge pumping", at(10, 0, 0)).with_engagement(5, 1, 0);

    once.ingest(&post).unwrap();
    twice.ingest(&post).unwrap();
    assert_eq!(twice.ingest(&post).unwrap(), IngestOutcome::Duplicate);

    assert_eq!(doge_windows(&once), doge_windows(&twice));
}

#[test]
fn test_fold_order_does_not_matter() {
    let a = create_test_post("a", "doge is great", at(10, 1, 0)).with_engagement(3, 0, 0);
    let b = create_test_post("b", "doge is a scam", at(10, 2, 0)).with_engagement(0, 7, 1);

    let ab = create_test_pipeline();
    ab.ingest(&a).unwrap();
    ab.ingest(&b).unwrap();

    let ba = create_test_pipeline();
    ba.ingest(&b).unwrap();
    ba.ingest(&a).unwrap();

    assert_eq!(doge_windows(&ab), doge_windows(&ba));
}

#[test]
fn test_celebrity_match_and_deactivation() {
    let pipeline = create_test_pipeline();
    let elon = EntityId::celebrity("elonmusk");

    let outcome = pipeline
        .ingest(&create_post_by("1", "elonmusk", "hello world", at(10, 0, 0)))
        .unwrap();
    match outcome {
        IngestOutcome::Processed { matches, .. } => {
            assert!(matches.contains(&elon));
            assert!(matches
                .kinds_for(&elon)
                .unwrap()
                .contains(&MatchKind::CelebrityAuthored));
        }
        other => panic!("expected a match, got {other:?}"),
    }

    pipeline.untrack(&elon).unwrap();
    let outcome = pipeline
        .ingest(&create_post_by("2", "elonmusk", "hello again", at(10, 5, 0)))
        .unwrap();
    assert_eq!(outcome, IngestOutcome::Unmatched);
}

#[test]
fn test_registry_changes_are_not_retroactive() {
    let pipeline = create_test_pipeline();
    let bonk = EntityId::keyword("bonk");

    pipeline
        .ingest(&create_test_post("1", "bonk", at(10, 0, 0)))
        .unwrap();
    pipeline.track(bonk.clone()).unwrap();
    pipeline
        .ingest(&create_test_post("2", "bonk", at(10, 1, 0)))
        .unwrap();

    let windows = pipeline.windows(&bonk, None, None).unwrap();
    assert_eq!(windows.len(), 1);
    assert_eq!(windows[0].mention_count, 1);
    assert!(windows[0].post_ids.contains("2"));
}

#[test]
fn test_sentiment_is_deterministic() {
    let scorer = SentimentScorer::default();
    let first = scorer.score("great news!!!");
    let second = scorer.score("great news!!!");

    assert_eq!(first, second);
    assert_eq!(first.label, SentimentLabel::Positive);
}

#[test]
fn test_window_boundaries() {
    let pipeline = create_test_pipeline();
    pipeline
        .ingest(&create_test_post("1", "doge", at(10, 0, 0)))
        .unwrap();
    pipeline
        .ingest(&create_test_post("2", "doge", at(10, 59, 59)))
        .unwrap();
    pipeline
        .ingest(&create_test_post("3", "doge", at(11, 0, 0)))
        .unwrap();

    let windows = doge_windows(&pipeline);
    assert_eq!(windows.len(), 2);
    assert_eq!(windows[0].key.start, at(10, 0, 0));
    assert_eq!(windows[0].mention_count, 2);
    assert_eq!(windows[1].key.start, at(11, 0, 0));
    assert_eq!(windows[1].mention_count, 1);
}

#[test]
fn test_late_post_folds_into_its_own_window() {
    let pipeline = create_test_pipeline();
    pipeline
        .ingest(&create_test_post("new", "doge", at(14, 0, 0)))
        .unwrap();
    pipeline
        .ingest(&create_test_post("old", "doge", at(9, 30, 0)))
        .unwrap();

    let windows = doge_windows(&pipeline);
    assert_eq!(windows.len(), 2);
    assert_eq!(windows[0].key.start, at(9, 0, 0));
    assert!(windows[0].post_ids.contains("old"));
    assert!(windows[0].is_closed(pipeline.aggregator().watermark()));
}

#[test]
fn test_zero_baseline_is_trending_at_min_volume() {
    let pipeline = create_test_pipeline();

    let mut last = None;
    for i in 0..3 {
        last = Some(
            pipeline
                .ingest(&create_test_post(&i.to_string(), "pepe", at(12, i, 0)))
                .unwrap(),
        );
    }

    let Some(IngestOutcome::Processed { trends, .. }) = last else {
        panic!("expected the last post to be processed");
    };
    assert_eq!(trends.len(), 1);
    assert_eq!(trends[0].baseline_mean, 0.0);
    assert!(trends[0].is_trending);
}

#[test]
fn test_below_min_volume_is_not_trending() {
    let pipeline = create_test_pipeline();
    pipeline
        .ingest(&create_test_post("1", "pepe", at(12, 0, 0)))
        .unwrap();
    let outcome = pipeline
        .ingest(&create_test_post("2", "pepe", at(12, 1, 0)))
        .unwrap();

    let IngestOutcome::Processed { trends, .. } = outcome else {
        panic!("expected a processed post");
    };
    assert!(trends[0].trend_score >= 1.0);
    assert!(!trends[0].is_trending);
}

#[test]
fn test_unchanged_window_fires_once() {
    let spec = WindowSpec::from_secs(3600).unwrap();
    let mut window = AggregateWindow::empty(spec.key_for(&doge(), at(10, 0, 0)));
    window.mention_count = 5;
    window.sentiment_count = 5;

    let trigger = NotificationTrigger::new(vec![TriggerRule::new(
        Metric::MentionCount,
        CompareOp::Ge,
        1.0,
    )]);

    let first = trigger.evaluate(&window, None);
    let second = trigger.evaluate(&window, None);
    assert_eq!(first.len() + second.len(), 1);
}

#[test]
fn test_rule_fires_once_per_window_across_posts() {
    let pipeline = create_test_pipeline();
    let mut total = 0;
    for i in 0..5 {
        total += pipeline
            .ingest(&create_test_post(&i.to_string(), "doge", at(10, i, 0)))
            .unwrap()
            .events()
            .len();
    }
    assert_eq!(total, 1);

    // Next window is a new de-duplication key
    let next = pipeline
        .ingest(&create_test_post("n", "doge", at(11, 0, 0)))
        .unwrap();
    assert_eq!(next.events().len(), 1);
}

#[test]
fn test_overlapping_celebrity_and_keyword_fire_independently() {
    let pipeline = create_test_pipeline();
    let outcome = pipeline
        .ingest(&create_post_by("1", "elonmusk", "doge", at(10, 0, 0)))
        .unwrap();

    let mut entities: Vec<String> = outcome
        .events()
        .iter()
        .map(|e| e.entity_id.to_string())
        .collect();
    entities.sort();
    assert_eq!(entities, vec!["@elonmusk", "doge"]);
}

#[test]
fn test_rules_fire_in_declaration_order() {
    let mut config = create_test_config();
    config.notifications.rules = vec![
        TriggerRule::new(Metric::EngagementSum, CompareOp::Ge, 10.0).named("engagement"),
        TriggerRule::new(Metric::MentionCount, CompareOp::Ge, 1.0).named("volume"),
        TriggerRule::new(Metric::TrendScore, CompareOp::Ge, 0.5).named("trend"),
    ];
    let pipeline = create_pipeline_with(&config, create_memory_store());

    let outcome = pipeline
        .ingest(&create_test_post("1", "doge", at(10, 0, 0)).with_engagement(20, 0, 0))
        .unwrap();
    let rules: Vec<&str> = outcome
        .events()
        .iter()
        .map(|e| e.rule_triggered.as_str())
        .collect();
    assert_eq!(rules, vec!["engagement", "volume", "trend"]);
}

// ============================================================================
// Persistence and Restart
// ============================================================================

#[test]
fn test_state_survives_restart_with_sqlite() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("memewatch.db");
    let config = create_test_config();

    {
        let pipeline = create_pipeline_with(&config, create_sqlite_store(&db).unwrap());
        pipeline
            .ingest(&create_test_post("1", "doge", at(10, 0, 0)))
            .unwrap();
        pipeline.track(EntityId::keyword("wojak")).unwrap();
        pipeline.untrack(&EntityId::keyword("pepe")).unwrap();
    }

    let pipeline = create_pipeline_with(&config, create_sqlite_store(&db).unwrap());
    assert_eq!(doge_windows(&pipeline)[0].mention_count, 1);
    assert!(pipeline.registry().get(&EntityId::keyword("wojak")).unwrap().active);
    assert!(!pipeline.registry().get(&EntityId::keyword("pepe")).unwrap().active);

    // Re-sent post is a duplicate; the fired rule is not re-emitted
    let again = pipeline
        .ingest(&create_test_post("1", "doge", at(10, 0, 0)))
        .unwrap();
    assert_eq!(again, IngestOutcome::Duplicate);
    let next = pipeline
        .ingest(&create_test_post("2", "doge", at(10, 10, 0)))
        .unwrap();
    assert!(next.events().is_empty());
}

#[test]
fn test_summary_over_stored_windows() {
    let pipeline = create_test_pipeline();
    pipeline
        .ingest(&create_test_post("1", "doge to the moon", at(10, 0, 0)))
        .unwrap();
    pipeline
        .ingest(&create_test_post("2", "doge and pepe", at(10, 5, 0)))
        .unwrap();
    pipeline
        .ingest(&create_post_by("3", "elonmusk", "lunch", at(10, 6, 0)))
        .unwrap();
    pipeline
        .ingest(&create_test_post("4", "nothing", at(10, 7, 0)))
        .unwrap();

    let summary = pipeline.summary(None, None, 10).unwrap();
    assert_eq!(summary.total_posts, 4);
    assert_eq!(summary.matched_posts, 3);
    assert_eq!(summary.top_keywords[0].entity, doge());
    assert_eq!(summary.top_keywords[0].mentions, 2);
    assert_eq!(summary.celebrities.len(), 1);

    assert_eq!(summary.sentiment.total(), 4);

    let later = pipeline.summary(Some(at(11, 0, 0)), None, 10).unwrap();
    assert_eq!(later.total_posts, 0);
    assert_eq!(later.sentiment.total(), 0);
    assert!(later.top_keywords.is_empty());
}

#[test]
fn test_summary_counts_each_post_sentiment_once() {
    let dir = TempDir::new().unwrap();
    let stores = [
        create_memory_store(),
        create_sqlite_store(dir.path().join("memewatch.db")).unwrap(),
    ];

    for store in stores {
        let pipeline = create_pipeline_with(&create_test_config(), store);
        let post = create_post_by("1", "elonmusk", "doge and pepe to the moon", at(10, 0, 0));
        match pipeline.ingest(&post).unwrap() {
            IngestOutcome::Processed { matches, .. } => assert_eq!(matches.len(), 3),
            other => panic!("expected a match, got {other:?}"),
        }

        let summary = pipeline.summary(None, None, 10).unwrap();
        assert_eq!(summary.total_posts, 1);
        assert_eq!(summary.sentiment.total(), 1);
        assert_eq!(summary.sentiment.positive, 1);
    }
}

#[test]
fn test_celebrity_mentions_survive_restart() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("memewatch.db");
    let config = create_test_config();

    {
        let pipeline = create_pipeline_with(&config, create_sqlite_store(&db).unwrap());
        pipeline
            .ingest(&create_post_by("1", "elonmusk", "doge to the moon", at(10, 0, 0)))
            .unwrap();
        pipeline
            .ingest(&create_test_post("2", "doge", at(10, 5, 0)).with_mentions(["elonmusk"]))
            .unwrap();
        pipeline
            .ingest(&create_test_post("3", "doge", at(10, 6, 0)))
            .unwrap();
    }

    let pipeline = create_pipeline_with(&config, create_sqlite_store(&db).unwrap());
    let windows = doge_windows(&pipeline);
    assert_eq!(windows[0].mention_count, 3);
    assert_eq!(windows[0].celebrity_mentions, 2);
    assert_eq!(windows[0].top_influencers(5), vec![("elonmusk", 2)]);

    let summary = pipeline.summary(None, None, 10).unwrap();
    assert_eq!(summary.top_keywords[0].celebrity_mentions, 2);
    assert_eq!(
        summary.top_keywords[0].top_influencers,
        vec![("elonmusk".to_string(), 2)]
    );
}

// ============================================================================
// Batch Ingestion
// ============================================================================

#[tokio::test]
async fn test_batch_ingest_json_lines() {
    let dir = TempDir::new().unwrap();
    let dataset = write_dataset(dir.path(), "posts.jsonl", SAMPLE_DATASET_JSONL);

    let history = Arc::new(HistoryChannel::new(dir.path().join("history.jsonl"), 10).unwrap());
    let dispatcher = Arc::new(NotificationDispatcher::new().with_channel(history.clone()));
    let pipeline = Arc::new(create_test_pipeline());

    let options = BatchOptions {
        workers: 1,
        ..BatchOptions::default()
    };
    let runner = BatchRunner::new(Arc::clone(&pipeline), dispatcher, options)
        .with_checkpoints(CheckpointManager::new(&dir.path().join("checkpoints")).unwrap());

    let report = runner.run(&dataset).await.unwrap();
    assert_eq!(report.stats.processed, 4);
    assert_eq!(report.stats.unmatched, 1);
    assert_eq!(report.stats.duplicates, 1);
    assert_eq!(report.stats.rejected, 1);
    assert_eq!(report.stats.notifications, 3);
    assert_eq!(report.lines_consumed, 8);

    let doge = doge_windows(&pipeline);
    assert_eq!(doge.len(), 1);
    assert_eq!(doge[0].mention_count, 2);
    assert_eq!(doge[0].engagement_sum(), 22);
    assert_eq!(doge[0].reach, 150);
    assert!(doge[0].mean_sentiment().unwrap() > 0.0);

    let pepe = pipeline
        .windows(&EntityId::keyword("pepe"), None, None)
        .unwrap();
    assert!(pepe[0].mean_sentiment().unwrap() < 0.0);
    assert_eq!(pepe[0].sentiment.negative, 1);

    let delivered = HistoryChannel::read_file(history.path().unwrap()).await.unwrap();
    assert_eq!(delivered.len(), 3);
}

#[tokio::test]
async fn test_batch_ingest_json_array_with_many_workers() {
    let dir = TempDir::new().unwrap();
    let dataset = write_dataset(dir.path(), "posts.json", SAMPLE_DATASET_ARRAY);
    let pipeline = Arc::new(create_test_pipeline());

    let options = BatchOptions {
        workers: 4,
        channel_buffer_size: 1,
        ..BatchOptions::default()
    };
    let runner = BatchRunner::new(
        Arc::clone(&pipeline),
        Arc::new(NotificationDispatcher::new()),
        options,
    );

    let report = runner.run(&dataset).await.unwrap();
    assert_eq!(report.stats.processed, 1);
    assert_eq!(report.stats.unmatched, 2);
    assert_eq!(report.lines_consumed, 3);

    let stats = pipeline.stats();
    assert_eq!(stats.matches, 2);
}

#[tokio::test]
async fn test_concurrent_ingest_of_same_window() {
    let pipeline = Arc::new(create_test_pipeline());
    let mut handles = Vec::new();
    for i in 0..32 {
        let pipeline = Arc::clone(&pipeline);
        handles.push(tokio::task::spawn_blocking(move || {
            pipeline
                .ingest(&create_test_post(&format!("p{i}"), "doge", at(10, i % 60, 0)))
                .unwrap()
        }));
    }

    let mut events = 0;
    for handle in handles {
        events += handle.await.unwrap().events().len();
    }

    assert_eq!(events, 1);
    assert_eq!(doge_windows(&pipeline)[0].mention_count, 32);
}

// ============================================================================
// Property Tests
// ============================================================================

const TEXTS: [&str; 5] = [
    "doge to the moon!",
    "pepe is dead, terrible",
    "doge and pepe both pumping",
    "nothing to see",
    "#doge great news",
];

fn posts_strategy() -> impl Strategy<Value = Vec<Post>> {
    prop::collection::vec((0..TEXTS.len(), 0u32..60, 0u64..50), 1..12).prop_map(|specs| {
        specs
            .into_iter()
            .enumerate()
            .map(|(i, (text, minute, likes))| {
                create_test_post(&format!("p{i}"), TEXTS[text], at(10, minute, 0))
                    .with_engagement(likes, 0, 0)
            })
            .collect()
    })
}

fn state(pipeline: &Pipeline) -> Vec<Vec<AggregateWindow>> {
    [doge(), EntityId::keyword("pepe")]
        .iter()
        .map(|e| pipeline.windows(e, None, None).unwrap())
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_fold_order_independent(
        (posts, shuffled) in posts_strategy()
            .prop_flat_map(|posts| (Just(posts.clone()), Just(posts).prop_shuffle()))
    ) {
        let a = create_test_pipeline();
        for post in &posts {
            a.ingest(post).unwrap();
        }
        let b = create_test_pipeline();
        for post in &shuffled {
            b.ingest(post).unwrap();
        }
        prop_assert_eq!(state(&a), state(&b));
    }

    #[test]
    fn prop_reingest_is_idempotent(posts in posts_strategy()) {
        let once = create_test_pipeline();
        for post in &posts {
            once.ingest(post).unwrap();
        }
        let twice = create_test_pipeline();
        for post in posts.iter().chain(posts.iter()) {
            twice.ingest(post).unwrap();
        }
        prop_assert_eq!(state(&once), state(&twice));
    }
}
