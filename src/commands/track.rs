use anyhow::{Context, Result};

use memewatch::config::Config;
use memewatch::models::{EntityId, EntityKind};

use super::open_pipeline;

pub fn track_add(config: &Config, kind: &str, id: &str) -> Result<()> {
    let kind: EntityKind = kind.parse().map_err(anyhow::Error::msg)?;
    let id = EntityId::new(kind, id);
    if id.name().is_empty() {
        anyhow::bail!("Entity identifier must not be empty");
    }

    let pipeline = open_pipeline(config)?;
    let entity = pipeline.track(id)?;
    println!("Tracking {} {}", entity.kind(), entity.id);
    Ok(())
}

pub fn track_remove(config: &Config, id: &str) -> Result<()> {
    let id: EntityId = id.parse().map_err(anyhow::Error::msg)?;

    let pipeline = open_pipeline(config)?;
    let entity = pipeline
        .untrack(&id)
        .with_context(|| format!("Cannot remove {id}"))?;
    println!("Stopped tracking {}", entity.id);
    Ok(())
}

pub fn track_list(config: &Config) -> Result<()> {
    let pipeline = open_pipeline(config)?;
    let mut entities = pipeline.tracked();
    entities.sort_by(|a, b| b.active.cmp(&a.active).then_with(|| a.id.cmp(&b.id)));

    if entities.is_empty() {
        println!("No tracked entities.");
        return Ok(());
    }

    println!("{:<24} {:<10} {:<8} {}", "ENTITY", "KIND", "ACTIVE", "ADDED");
    for entity in entities {
        println!(
            "{:<24} {:<10} {:<8} {}",
            entity.id.to_string(),
            entity.kind().as_str(),
            if entity.active { "yes" } else { "no" },
            entity.added_at.format("%Y-%m-%d %H:%M")
        );
    }
    Ok(())
}
