use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::memory::{MemoryMatch, MemoryRecord};
use crate::relationship::RelationshipSnapshot;
use crate::types::{ActionType, Agent, Mood};

/// The parts of an agent the scheduler and executor read
pub trait AgentView {
    fn name(&self) -> &str;
    fn profession(&self) -> &str;
    fn location(&self) -> &str;
    fn energy(&self) -> i32;
    fn mood(&self) -> Mood;
    fn last_action(&self) -> Option<ActionType>;
}

impl AgentView for Agent {
    fn name(&self) -> &str {
        &self.name
    }

    fn profession(&self) -> &str {
        &self.profession
    }

    fn location(&self) -> &str {
        &self.location
    }

    fn energy(&self) -> i32 {
        self.energy
    }

    fn mood(&self) -> Mood {
        self.mood
    }

    fn last_action(&self) -> Option<ActionType> {
        self.last_action
    }
}

/// Symmetric pairwise relationship storage.
///
/// Implementations decide how concurrent access is serialized; callers only
/// rely on each method being atomic with respect to the pair it touches.
pub trait RelationshipStore: Send + Sync {
    /// Current strength, or the configured default for an unknown pair
    fn get(&self, a: &str, b: &str) -> i32;

    /// Overwrites the strength, clamped to [0, 100], in both directions
    fn set(&self, a: &str, b: &str, value: i32);

    /// Adds `delta` (clamped) and returns `(old, new)`
    fn apply_delta(&self, a: &str, b: &str, delta: i32) -> (i32, i32);

    /// Applies time-based decay to every pair that is due
    fn decay_tick(&self, now: DateTime<Utc>);

    /// Pairwise throttle: `None` when the pair interacted within `window`,
    /// otherwise stamps the interaction and returns how many came before it
    fn claim_interaction(&self, a: &str, b: &str, now: DateTime<Utc>, window: chrono::Duration) -> Option<u32>;

    /// Nested `{a: {b: strength}}` view of every known pair
    fn snapshot(&self) -> RelationshipSnapshot;

    /// Seeds the store from a snapshot
    fn restore(&self, snapshot: &RelationshipSnapshot);
}

/// Long-term memory backend used for prompt context
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Stores a memory and returns its id
    async fn store(&self, record: MemoryRecord) -> Result<String>;

    /// Returns up to `limit` memories of `owner` ranked by relevance to `query`
    async fn search(&self, owner: &str, query: &str, limit: usize) -> Result<Vec<MemoryMatch>>;
}
