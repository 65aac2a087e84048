//! Notification history channel
//!
//! Appends each event as one JSON line and keeps the most recent events in
//! memory for the CLI to print after a run.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tokio::io::AsyncWriteExt;

use super::{Channel, ChannelError, ChannelResult, DeliveryStatus};
use crate::notifications::NotificationEvent;

pub struct HistoryChannel {
    path: Option<PathBuf>,
    limit: usize,
    recent: Mutex<VecDeque<NotificationEvent>>,
}

impl HistoryChannel {
    /// History backed by a JSON Lines file
    pub fn new(path: impl Into<PathBuf>, limit: usize) -> ChannelResult<Self> {
        if limit == 0 {
            return Err(ChannelError::InvalidConfig(
                "history limit must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            path: Some(path.into()),
            limit,
            recent: Mutex::new(VecDeque::with_capacity(limit)),
        })
    }

    /// History kept in memory only
    pub fn in_memory(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            path: None,
            limit,
            recent: Mutex::new(VecDeque::with_capacity(limit)),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Most recent events, oldest first
    pub fn recent(&self) -> Vec<NotificationEvent> {
        let recent = self.recent.lock().unwrap_or_else(PoisonError::into_inner);
        recent.iter().cloned().collect()
    }

    async fn append(&self, path: &Path, event: &NotificationEvent) -> ChannelResult<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut line = serde_json::to_vec(event)?;
        line.push(b'\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }

    /// Read a history file back
    pub async fn read_file(path: &Path) -> ChannelResult<Vec<NotificationEvent>> {
        let content = match tokio::fs::read_to_string(path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        content
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| serde_json::from_str(l).map_err(ChannelError::from))
            .collect()
    }
}

#[async_trait]
impl Channel for HistoryChannel {
    fn name(&self) -> &str {
        "history"
    }

    async fn send(&self, event: &NotificationEvent) -> ChannelResult<DeliveryStatus> {
        if let Some(path) = &self.path {
            self.append(path, event).await?;
        }

        let mut recent = self.recent.lock().unwrap_or_else(PoisonError::into_inner);
        if recent.len() == self.limit {
            recent.pop_front();
        }
        recent.push_back(event.clone());

        Ok(DeliveryStatus::success(self.name()))
    }
}
