//! Checkpoints for resumable ingestion
//!
//! A checkpoint records how many leading lines of a dataset have been fully
//! processed. `ingest --resume` skips those lines; anything after them is
//! replayed, which is safe because folds are idempotent per post id.
//!
//! # Example
//!
//! ```no_run
//! use memewatch::storage::checkpoint::{checkpoint_name, CheckpointManager, IngestCheckpoint};
//! use std::path::Path;
//!
//! # fn example() -> anyhow::Result<()> {
//! let manager = CheckpointManager::new(Path::new("./data/checkpoints"))?;
//! let dataset = Path::new("posts.jsonl");
//! let name = checkpoint_name(dataset);
//!
//! let mut state = IngestCheckpoint::new(dataset);
//! state.advance(500);
//! manager.save(&name, &state)?;
//!
//! if let Some(restored) = manager.load::<IngestCheckpoint>(&name)? {
//!     println!("Resuming after line {}", restored.lines_consumed);
//! }
//! # Ok(())
//! # }
//! ```

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

// ============================================================================
// Checkpoint State Types
// ============================================================================

/// Progress of an ingestion run over one dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestCheckpoint {
    /// Session identifier
    pub session_id: String,

    /// Dataset being ingested
    pub dataset: PathBuf,

    /// Leading records fully processed (1-based line count)
    pub lines_consumed: usize,

    /// Outcome counts accumulated across sessions
    pub stats: CheckpointStats,

    /// Checkpoint creation time
    pub created_at: DateTime<Utc>,

    /// Last update time
    pub updated_at: DateTime<Utc>,
}

impl IngestCheckpoint {
    pub fn new(dataset: &Path) -> Self {
        let now = Utc::now();
        Self {
            session_id: generate_session_id(),
            dataset: dataset.to_path_buf(),
            lines_consumed: 0,
            stats: CheckpointStats::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Move the consumed-line mark forward; it never moves back
    pub fn advance(&mut self, lines_consumed: usize) {
        if lines_consumed > self.lines_consumed {
            self.lines_consumed = lines_consumed;
            self.updated_at = Utc::now();
        }
    }
}

/// Outcome counts stored with a checkpoint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointStats {
    pub processed: u64,
    pub unmatched: u64,
    pub duplicates: u64,
    pub rejected: u64,
    pub notifications: u64,
}

impl CheckpointStats {
    pub fn merge(&mut self, other: &Self) {
        self.processed += other.processed;
        self.unmatched += other.unmatched;
        self.duplicates += other.duplicates;
        self.rejected += other.rejected;
        self.notifications += other.notifications;
    }
}

/// Stable checkpoint name for a dataset path
pub fn checkpoint_name(dataset: &Path) -> String {
    let path = dataset
        .canonicalize()
        .unwrap_or_else(|_| dataset.to_path_buf());
    let digest = Sha256::digest(path.to_string_lossy().as_bytes());
    let hex: String = format!("{digest:x}").chars().take(16).collect();
    format!("ingest_{hex}")
}

fn generate_session_id() -> String {
    format!(
        "{}_{}",
        Utc::now().format("%Y%m%d%H%M%S"),
        &uuid::Uuid::new_v4().simple().to_string()[..8]
    )
}

// ============================================================================
// Checkpoint Manager
// ============================================================================

/// Manages checkpoint files in one directory
pub struct CheckpointManager {
    checkpoint_dir: PathBuf,
}

impl CheckpointManager {
    /// Create a new checkpoint manager
    pub fn new(checkpoint_dir: &Path) -> Result<Self> {
        fs::create_dir_all(checkpoint_dir).context("Failed to create checkpoint directory")?;

        Ok(Self {
            checkpoint_dir: checkpoint_dir.to_path_buf(),
        })
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.checkpoint_dir.join(format!("{name}.checkpoint.json"))
    }

    /// Save checkpoint state
    pub fn save<T: Serialize>(&self, name: &str, state: &T) -> Result<PathBuf> {
        let filepath = self.path_for(name);

        // Write to temp file first, then rename (atomic)
        let temp_path = self.checkpoint_dir.join(format!("{name}.checkpoint.json.tmp"));

        let file = File::create(&temp_path).with_context(|| {
            format!("Failed to create checkpoint file: {}", temp_path.display())
        })?;

        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, state).context("Failed to serialize checkpoint")?;

        fs::rename(&temp_path, &filepath)
            .with_context(|| format!("Failed to rename checkpoint file: {}", filepath.display()))?;

        tracing::debug!(path = %filepath.display(), "Checkpoint saved");
        Ok(filepath)
    }

    /// Load checkpoint state
    pub fn load<T: for<'de> Deserialize<'de>>(&self, name: &str) -> Result<Option<T>> {
        let filepath = self.path_for(name);

        if !filepath.exists() {
            return Ok(None);
        }

        let file = File::open(&filepath)
            .with_context(|| format!("Failed to open checkpoint file: {}", filepath.display()))?;

        let reader = BufReader::new(file);
        let state = serde_json::from_reader(reader).context("Failed to deserialize checkpoint")?;

        tracing::debug!(path = %filepath.display(), "Checkpoint loaded");
        Ok(Some(state))
    }

    /// Check if checkpoint exists
    pub fn exists(&self, name: &str) -> bool {
        self.path_for(name).exists()
    }

    /// Delete checkpoint
    pub fn delete(&self, name: &str) -> Result<()> {
        let filepath = self.path_for(name);

        if filepath.exists() {
            fs::remove_file(&filepath)
                .with_context(|| format!("Failed to delete checkpoint: {}", filepath.display()))?;
            tracing::debug!(path = %filepath.display(), "Checkpoint deleted");
        }

        Ok(())
    }

    /// List all checkpoints
    pub fn list(&self) -> Result<Vec<String>> {
        let mut checkpoints = Vec::new();

        for entry in fs::read_dir(&self.checkpoint_dir)? {
            let path = entry?.path();
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                if let Some(session) = name.strip_suffix(".checkpoint.json") {
                    checkpoints.push(session.to_string());
                }
            }
        }

        checkpoints.sort();
        Ok(checkpoints)
    }

    /// Get checkpoint directory
    pub fn checkpoint_dir(&self) -> &Path {
        &self.checkpoint_dir
    }
}

// ============================================================================
// Tests
// ============================================================================
