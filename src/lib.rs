//! # Social Town
//!
//! A small town of LLM-backed characters who wander between locations, talk to
//! each other and to users, and build up pairwise relationships over time.
//!
//! ## Features
//!
//! - **Relationships**: symmetric strengths in [0, 100] with levels, time decay and a per-pair throttle
//! - **Interactions**: weighted catalog of interaction effects, conflicts that escalate and resolve
//! - **Scheduler**: a background loop that picks an agent and a context-weighted action
//! - **Conversations**: pairwise and group exchanges with tone checks and canned fallbacks
//! - **LLM Integration**: bounded generation pool with timeouts, built-in Ollama support
//! - **Persistence**: JSON snapshots of relationships and agent state
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use social_town::{llm::OllamaClient, memory::InMemoryStore, SimulationConfig, Town, TownEngine};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let client = Arc::new(OllamaClient::new("llama3.2:latest")?);
//! let engine = TownEngine::new(
//!     SimulationConfig::load("./town.json")?,
//!     Town::sample(),
//!     client,
//!     Arc::new(InMemoryStore::new()),
//! )?;
//!
//! engine.start();
//! let reply = engine.chat("Emma", "What are you painting today?").await?;
//! println!("{}", reply.text);
//! engine.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod catalog;
pub mod config;
pub mod conflict;
pub mod engine;
pub mod error;
pub mod executor;
pub mod llm;
pub mod memory;
pub mod persistence;
pub mod prompts;
pub mod relationship;
pub mod sanitize;
pub mod scheduler;
pub mod sentiment;
pub mod town;
pub mod traits;
pub mod types;
pub mod workers;

// Re-export main types for convenience
pub use catalog::InteractionEffectCatalog;
pub use config::SimulationConfig;
pub use conflict::{ConflictScenario, ConflictTracker};
pub use engine::TownEngine;
pub use error::TownError;
pub use executor::InteractionExecutor;
pub use relationship::{classify, RelationshipLevel, RelationshipTable};
pub use scheduler::{ActionScheduler, RecentActionHistory};
pub use town::Town;
pub use traits::{AgentView, MemoryStore, RelationshipStore};
pub use types::{
    ActionType, Agent, ChatReply, Exchange, InteractionRecord, InteractionType, Location, LocationCategory, Mood,
    RelationshipChange,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
