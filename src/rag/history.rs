//! Bounded conversation history

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_HISTORY_MAX_ENTRIES: usize = 20;
pub const DEFAULT_HISTORY_TRIM_TO: usize = 10;

/// One completed question/answer turn
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub question: String,
    pub answer: String,
    pub source_count: usize,
    pub confidence: f32,
    pub timestamp: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
            source_count: 0,
            confidence: 0.0,
            timestamp: Utc::now(),
        }
    }
}

/// History capped at `max_entries`; once a push exceeds the cap, the
/// list is trimmed to the most recent `trim_to` entries
#[derive(Debug, Clone)]
pub struct ConversationHistory {
    entries: Vec<HistoryEntry>,
    max_entries: usize,
    trim_to: usize,
}

impl Default for ConversationHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_MAX_ENTRIES, DEFAULT_HISTORY_TRIM_TO)
    }
}

impl ConversationHistory {
    pub fn new(max_entries: usize, trim_to: usize) -> Self {
        let max_entries = max_entries.max(1);
        Self {
            entries: Vec::new(),
            max_entries,
            trim_to: trim_to.clamp(1, max_entries),
        }
    }

    pub fn push(&mut self, entry: HistoryEntry) {
        self.entries.push(entry);
        if self.entries.len() > self.max_entries {
            let excess = self.entries.len() - self.trim_to;
            self.entries.drain(..excess);
            tracing::debug!(kept = self.trim_to, "Trimmed conversation history");
        }
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// The most recent `turns` entries as a prompt transcript, oldest
    /// first; empty string when there is no history
    pub fn transcript(&self, turns: usize) -> String {
        let start = self.entries.len().saturating_sub(turns);
        self.entries[start..]
            .iter()
            .map(|e| format!("Q: {}\nA: {}", e.question, e.answer))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
