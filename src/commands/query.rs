use anyhow::Result;

use memewatch::analytics::TOP_INFLUENCERS;
use memewatch::config::Config;
use memewatch::models::EntityId;
use memewatch::sentiment::SentimentScorer;

use super::{open_pipeline, parse_time};

pub fn windows(
    config: &Config,
    entity: &str,
    since: Option<&str>,
    until: Option<&str>,
) -> Result<()> {
    let id: EntityId = entity.parse().map_err(anyhow::Error::msg)?;
    let from = parse_time(since, "since")?;
    let to = parse_time(until, "until")?;

    let pipeline = open_pipeline(config)?;
    let windows = pipeline.windows(&id, from, to)?;

    if windows.is_empty() {
        println!("No windows for {id}.");
        return Ok(());
    }

    println!(
        "{:<17} {:>8} {:>10} {:>6} {:>6} {:>6} {:>10} {:>6} {}",
        "WINDOW (UTC)", "MENTIONS", "SENTIMENT", "POS", "NEU", "NEG", "ENGAGEMENT", "CELEBS",
        "INFLUENCERS"
    );
    for w in &windows {
        println!(
            "{:<17} {:>8} {:>10} {:>6} {:>6} {:>6} {:>10} {:>6} {}",
            w.key.start.format("%Y-%m-%d %H:%M"),
            w.mention_count,
            w.mean_sentiment()
                .map_or_else(|| "-".to_string(), |s| format!("{s:+.3}")),
            w.sentiment.positive,
            w.sentiment.neutral,
            w.sentiment.negative,
            w.engagement_sum(),
            w.celebrity_mentions,
            format_influencers(
                w.top_influencers(TOP_INFLUENCERS)
                    .into_iter()
                    .map(|(name, n)| (name.to_string(), n))
            )
        );
    }
    Ok(())
}

pub fn trends(config: &Config, entity: Option<&str>, limit: usize) -> Result<()> {
    let pipeline = open_pipeline(config)?;

    let signals = match entity {
        Some(entity) => {
            let id: EntityId = entity.parse().map_err(anyhow::Error::msg)?;
            pipeline.trends(&id, None, None)?
        }
        None => pipeline.top_trending(limit),
    };

    if signals.is_empty() {
        println!("No trend signals.");
        return Ok(());
    }

    println!(
        "{:<24} {:<17} {:>8} {:>9} {:>8} {:>6} {:<16} {}",
        "ENTITY", "WINDOW (UTC)", "MENTIONS", "BASELINE", "SCORE", "CELEBS", "TOP INFLUENCER",
        "TRENDING"
    );
    for s in &signals {
        println!(
            "{:<24} {:<17} {:>8} {:>9.2} {:>8.2} {:>6} {:<16} {}",
            s.entity.to_string(),
            s.window_start.format("%Y-%m-%d %H:%M"),
            s.mention_count,
            s.baseline_mean,
            s.trend_score,
            s.celebrity_mentions,
            s.top_influencer
                .as_deref()
                .map_or_else(|| "-".to_string(), |name| format!("@{name}")),
            if s.is_trending { "🔥" } else { "" }
        );
    }
    Ok(())
}

pub fn stats(config: &Config, since: Option<&str>, until: Option<&str>, top: usize) -> Result<()> {
    let from = parse_time(since, "since")?;
    let to = parse_time(until, "until")?;

    let pipeline = open_pipeline(config)?;
    let summary = pipeline.summary(from, to, top)?;
    let store = pipeline.store_stats()?;

    println!("Dataset Statistics");
    println!("========================");
    println!("  Total posts:    {}", summary.total_posts);
    println!("  Matched posts:  {}", summary.matched_posts);
    println!("  Windows stored: {}", store.windows);
    println!("  Notifications:  {}", store.fired_notifications);
    println!(
        "  Sentiment:      {} positive / {} neutral / {} negative",
        summary.sentiment.positive, summary.sentiment.neutral, summary.sentiment.negative
    );

    if !summary.celebrities.is_empty() {
        println!("\nCelebrities:");
        for t in &summary.celebrities {
            println!("  {:<24} {:>8} mentions", t.entity.to_string(), t.mentions);
        }
    }

    if !summary.top_keywords.is_empty() {
        println!("\nTop keywords:");
        for (i, t) in summary.top_keywords.iter().enumerate() {
            println!(
                "  {:>2}. {:<20} {:>8} mentions  mean sentiment {}",
                i + 1,
                t.entity.to_string(),
                t.mentions,
                t.mean_sentiment
                    .map_or_else(|| "-".to_string(), |s| format!("{s:+.3}"))
            );
            if t.celebrity_mentions > 0 {
                println!(
                    "      {} celebrity mentions: {}",
                    t.celebrity_mentions,
                    format_influencers(t.top_influencers.iter().cloned())
                );
            }
        }
    }
    Ok(())
}

fn format_influencers(influencers: impl IntoIterator<Item = (String, u64)>) -> String {
    let listed: Vec<String> = influencers
        .into_iter()
        .map(|(name, n)| format!("@{name} ({n})"))
        .collect();
    if listed.is_empty() {
        "-".to_string()
    } else {
        listed.join(", ")
    }
}

pub fn score(config: &Config, text: &str) {
    let scorer = SentimentScorer::new(config.sentiment);
    let score = scorer.score(text);
    println!("{:+.4} {}", score.score, score.label);
}
