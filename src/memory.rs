use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};

use crate::traits::MemoryStore;

/// Memories kept per owner before the oldest are dropped
const PER_OWNER_CAPACITY: usize = 200;

const STOPWORDS: &[&str] = &["the", "and", "with", "about", "what", "that", "this", "you", "for", "are", "was"];

/// A single remembered event belonging to one agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub owner: String,
    pub content: String,
    pub importance: f32, // 0.0 to 1.0
    pub tags: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl MemoryRecord {
    pub fn new(owner: impl Into<String>, content: impl Into<String>, importance: f32) -> Self {
        Self {
            owner: owner.into(),
            content: content.into(),
            importance: importance.clamp(0.0, 1.0),
            tags: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }
}

/// A search hit with its relevance score
#[derive(Debug, Clone, Serialize)]
pub struct MemoryMatch {
    pub id: String,
    pub record: MemoryRecord,
    pub score: f32,
}

/// Keyword-overlap memory store kept in process
#[derive(Default)]
pub struct InMemoryStore {
    entries: Mutex<Vec<(String, MemoryRecord)>>,
    next_id: Mutex<u64>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All memories of `owner`, oldest first
    pub fn memories_of(&self, owner: &str) -> Vec<MemoryRecord> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(_, record)| record.owner == owner)
            .map(|(_, record)| record.clone())
            .collect()
    }
}

fn keywords(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|word| word.chars().count() > 2)
        .map(str::to_lowercase)
        .filter(|word| !STOPWORDS.contains(&word.as_str()))
        .collect()
}

/// Keyword overlap plus a small importance bonus
fn relevance(query: &HashSet<String>, record: &MemoryRecord) -> f32 {
    let mut words = keywords(&record.content);
    words.extend(record.tags.iter().map(|tag| tag.to_lowercase()));
    let overlap = query.intersection(&words).count() as f32;
    overlap + record.importance * 0.5
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    async fn store(&self, record: MemoryRecord) -> Result<String> {
        let id = {
            let mut next = self.next_id.lock().unwrap_or_else(PoisonError::into_inner);
            *next += 1;
            format!("mem-{}", *next)
        };

        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let owned = entries.iter().filter(|(_, r)| r.owner == record.owner).count();
        if owned >= PER_OWNER_CAPACITY {
            if let Some(oldest) = entries.iter().position(|(_, r)| r.owner == record.owner) {
                entries.remove(oldest);
            }
        }
        entries.push((id.clone(), record));
        Ok(id)
    }

    async fn search(&self, owner: &str, query: &str, limit: usize) -> Result<Vec<MemoryMatch>> {
        let query = keywords(query);
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);

        let mut matches: Vec<MemoryMatch> = entries
            .iter()
            .filter(|(_, record)| record.owner == owner)
            .map(|(id, record)| MemoryMatch {
                id: id.clone(),
                record: record.clone(),
                score: relevance(&query, record),
            })
            .filter(|m| m.score >= 1.0)
            .collect();

        // Highest score first, newest first on ties
        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(b.record.timestamp.cmp(&a.record.timestamp))
        });
        matches.truncate(limit);
        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn search_ranks_by_overlap_and_filters_owner() {
        let store = InMemoryStore::new();
        store.store(MemoryRecord::new("alice", "Talked with Bob about the bakery", 0.4)).await.unwrap();
        store.store(MemoryRecord::new("alice", "Walked to the park", 0.9)).await.unwrap();
        store.store(MemoryRecord::new("bob", "Baked bread at the bakery", 0.5)).await.unwrap();

        let hits = store.search("alice", "what about the bakery?", 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].record.content.contains("Bob"));
    }

    #[tokio::test]
    async fn tags_count_as_keywords() {
        let store = InMemoryStore::new();
        store
            .store(MemoryRecord::new("emma", "Spent the afternoon there", 0.3).with_tags(["library"]))
            .await
            .unwrap();
        let hits = store.search("emma", "library", 3).await.unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn oldest_memories_fall_off() {
        let store = InMemoryStore::new();
        for i in 0..PER_OWNER_CAPACITY + 5 {
            store.store(MemoryRecord::new("tom", format!("event {}", i), 0.1)).await.unwrap();
        }
        let memories = store.memories_of("tom");
        assert_eq!(memories.len(), PER_OWNER_CAPACITY);
        assert_eq!(memories[0].content, "event 5");
    }

    #[tokio::test]
    async fn equal_scores_prefer_newer_memories() {
        let store = InMemoryStore::new();
        let mut earlier = MemoryRecord::new("lisa", "Studied at the library", 0.4);
        earlier.timestamp = Utc::now() - chrono::Duration::hours(3);
        store.store(earlier).await.unwrap();
        store.store(MemoryRecord::new("lisa", "Returned books to the library", 0.4)).await.unwrap();

        let hits = store.search("lisa", "library", 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits[0].record.content.starts_with("Returned"));
    }

    #[test]
    fn importance_is_clamped() {
        assert_eq!(MemoryRecord::new("a", "b", 3.0).importance, 1.0);
        assert_eq!(MemoryRecord::new("a", "b", -1.0).importance, 0.0);
    }
}
