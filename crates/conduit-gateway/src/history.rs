//! Bounded per-conversation log of executed tool calls

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use conduit_tools::ToolResult;
use dashmap::DashMap;
use jiff::Timestamp;
use serde::Serialize;

/// Conversation used when a request does not name one
pub const DEFAULT_CONVERSATION: &str = "default";

/// One executed tool call
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub tool_name: String,
    pub arguments: serde_json::Value,
    pub result: ToolResult,
    pub timestamp: Timestamp,
}

impl HistoryEntry {
    pub fn new(tool_name: impl Into<String>, arguments: serde_json::Value, result: ToolResult) -> Self {
        Self {
            tool_name: tool_name.into(),
            arguments,
            result,
            timestamp: Timestamp::now(),
        }
    }
}

struct Conversation {
    entries: Mutex<VecDeque<HistoryEntry>>,
    /// Store clock value of the latest append
    last_active: AtomicU64,
}

/// Tool-call history keyed by conversation
///
/// Each conversation has its own lock, so appends to different
/// conversations never contend. The oldest entry is evicted once a
/// conversation holds `capacity` entries, and the least recently active
/// conversation is forgotten once more than `max_conversations` exist.
pub struct HistoryStore {
    capacity: usize,
    max_conversations: usize,
    conversations: DashMap<String, Arc<Conversation>>,
    clock: AtomicU64,
}

impl HistoryStore {
    pub fn new(capacity: usize, max_conversations: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            max_conversations: max_conversations.max(1),
            conversations: DashMap::new(),
            clock: AtomicU64::new(0),
        }
    }

    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of conversations currently holding history
    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }

    pub fn append(&self, conversation: &str, entry: HistoryEntry) {
        let tick = self.clock.fetch_add(1, Ordering::Relaxed);

        // Clone the handle out so the shard lock is released before locking the log
        let (log, created) = match self.conversations.get(conversation) {
            Some(existing) => (Arc::clone(existing.value()), false),
            None => {
                let log = Arc::clone(
                    self.conversations
                        .entry(conversation.to_owned())
                        .or_insert_with(|| {
                            Arc::new(Conversation {
                                entries: Mutex::new(VecDeque::new()),
                                last_active: AtomicU64::new(tick),
                            })
                        })
                        .value(),
                );
                (log, true)
            }
        };

        log.last_active.store(tick, Ordering::Relaxed);

        {
            let mut entries = log.entries.lock().unwrap_or_else(PoisonError::into_inner);
            entries.push_back(entry);
            while entries.len() > self.capacity {
                entries.pop_front();
            }
        }

        if created {
            self.evict_idle(conversation);
        }
    }

    /// Entries of `conversation`, oldest first
    pub fn get(&self, conversation: &str) -> Vec<HistoryEntry> {
        let Some(log) = self.conversations.get(conversation).map(|l| Arc::clone(l.value())) else {
            return Vec::new();
        };

        log.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// Forget everything recorded for `conversation`
    pub fn clear(&self, conversation: &str) -> bool {
        self.conversations.remove(conversation).is_some()
    }

    /// Drop the least recently active conversations above the limit, never `keep`
    fn evict_idle(&self, keep: &str) {
        while self.conversations.len() > self.max_conversations {
            // Pick the victim first; removing while iterating would deadlock the shard
            let victim = self
                .conversations
                .iter()
                .filter(|c| c.key() != keep)
                .min_by_key(|c| c.value().last_active.load(Ordering::Relaxed))
                .map(|c| c.key().clone());

            let Some(victim) = victim else {
                break;
            };

            tracing::debug!(conversation = %victim, "forgetting idle conversation history");
            self.conversations.remove(&victim);
        }
    }
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::new(50, 1_000)
    }
}
