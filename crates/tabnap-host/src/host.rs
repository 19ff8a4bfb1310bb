//! BrowserHost trait and CommandQueue (bridge-pulled command log).
//!
//! The daemon never touches the browser directly. Physical actions go through
//! [`BrowserHost`]; the shipped implementation records them in a sequenced
//! queue that the browser bridge drains with a cursor.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tabnap_core::TabId;

use crate::error::HostError;

/// Physical tab actions. Enables mock injection for testing.
pub trait BrowserHost: Send + Sync {
    /// Unload a tab, keeping its tab-strip entry.
    fn discard(&self, tab_id: TabId) -> Result<(), HostError>;

    /// Force a full navigation (restore fallback).
    fn navigate(&self, tab_id: TabId, url: &str) -> Result<(), HostError>;
}

impl<T: BrowserHost + ?Sized> BrowserHost for &T {
    fn discard(&self, tab_id: TabId) -> Result<(), HostError> {
        (**self).discard(tab_id)
    }

    fn navigate(&self, tab_id: TabId, url: &str) -> Result<(), HostError> {
        (**self).navigate(tab_id, url)
    }
}

// ─── Commands ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum HostCommand {
    Discard { tab_id: TabId },
    Navigate { tab_id: TabId, url: String },
}

impl HostCommand {
    pub fn tab_id(&self) -> TabId {
        match self {
            Self::Discard { tab_id } | Self::Navigate { tab_id, .. } => *tab_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequencedCommand {
    pub seq: u64,
    #[serde(flatten)]
    pub command: HostCommand,
}

/// Result of [`CommandQueue::pull`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandBatch {
    pub commands: Vec<SequencedCommand>,
    /// Pass back as `cursor` on the next pull.
    pub next_cursor: u64,
}

/// Default number of commands kept for slow bridges.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

#[derive(Debug)]
struct QueueInner {
    next_seq: u64,
    entries: VecDeque<SequencedCommand>,
}

/// Bounded, sequenced command log. Oldest entries are dropped on overflow.
#[derive(Debug)]
pub struct CommandQueue {
    inner: Mutex<QueueInner>,
    capacity: usize,
}

impl Default for CommandQueue {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_QUEUE_CAPACITY)
    }
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                next_seq: 1,
                entries: VecDeque::new(),
            }),
            capacity: capacity.max(1),
        }
    }

    fn push(&self, command: HostCommand) -> u64 {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.entries.push_back(SequencedCommand { seq, command });
        while inner.entries.len() > self.capacity {
            if let Some(dropped) = inner.entries.pop_front() {
                tracing::debug!("command queue full, dropping seq {}", dropped.seq);
            }
        }
        seq
    }

    /// Commands with `seq >= cursor`, at most `limit` of them.
    pub fn pull(&self, cursor: u64, limit: usize) -> CommandBatch {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let commands: Vec<SequencedCommand> = inner
            .entries
            .iter()
            .filter(|c| c.seq >= cursor)
            .take(limit)
            .cloned()
            .collect();
        let next_cursor = commands.last().map_or(cursor, |c| c.seq + 1);
        CommandBatch {
            commands,
            next_cursor,
        }
    }

    /// Total commands ever recorded.
    pub fn recorded(&self) -> u64 {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.next_seq - 1
    }
}

impl BrowserHost for CommandQueue {
    fn discard(&self, tab_id: TabId) -> Result<(), HostError> {
        let seq = self.push(HostCommand::Discard { tab_id });
        tracing::debug!("queued discard for tab {tab_id} (seq {seq})");
        Ok(())
    }

    fn navigate(&self, tab_id: TabId, url: &str) -> Result<(), HostError> {
        let seq = self.push(HostCommand::Navigate {
            tab_id,
            url: url.to_string(),
        });
        tracing::debug!("queued navigate for tab {tab_id} (seq {seq})");
        Ok(())
    }
}
