use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Tunables for the whole simulation. Every field has a default, so a config
/// file only needs to name the values it changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub data_dir: PathBuf,
    pub relationship: RelationshipConfig,
    pub scheduler: SchedulerConfig,
    pub executor: ExecutorConfig,
    pub workers: WorkerConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            relationship: RelationshipConfig::default(),
            scheduler: SchedulerConfig::default(),
            executor: ExecutorConfig::default(),
            workers: WorkerConfig::default(),
        }
    }
}

impl SimulationConfig {
    /// Load a JSON config file. A missing file yields the defaults; a file that
    /// exists but does not parse is an error.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            log::debug!("No config at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {:?}", path))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config {:?}", path))
    }

    pub fn relationships_path(&self) -> PathBuf {
        self.data_dir.join("relationships.json")
    }

    pub fn agents_path(&self) -> PathBuf {
        self.data_dir.join("agents.json")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelationshipConfig {
    /// Strength reported for a pair that has never interacted
    pub default_strength: i32,
    pub decay: DecayConfig,
}

impl Default for RelationshipConfig {
    fn default() -> Self {
        Self {
            default_strength: 50,
            decay: DecayConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecayConfig {
    pub enabled: bool,
    pub interval_secs: u64,
    pub daily_rate: f64,
    /// Decay never takes a pair below this strength
    pub floor: i32,
    pub drift_probability: f64,
    pub drift_max: i32,
    pub level_factors: LevelFactors,
}

impl Default for DecayConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 600,
            daily_rate: 0.5,
            floor: 20,
            drift_probability: 0.15,
            drift_max: 3,
            level_factors: LevelFactors::default(),
        }
    }
}

impl DecayConfig {
    pub fn interval(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.interval_secs as i64)
    }
}

/// Per-level multipliers on the daily decay rate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelFactors {
    pub stranger: f64,
    pub acquaintance: f64,
    pub familiar: f64,
    pub close_friend: f64,
    pub intimate: f64,
}

impl Default for LevelFactors {
    fn default() -> Self {
        Self {
            stranger: 0.1,
            acquaintance: 0.3,
            familiar: 0.5,
            close_friend: 0.7,
            intimate: 0.4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub history_capacity: usize,
    /// Share of recent actions above which social actions get suppressed
    pub social_share_threshold: f64,
    /// History length required before the share check applies
    pub min_history_for_skew: usize,
    pub success_sleep_ms: (u64, u64),
    pub failure_sleep_ms: (u64, u64),
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            history_capacity: 200,
            social_share_threshold: 0.35,
            min_history_for_skew: 20,
            success_sleep_ms: (600, 1200),
            failure_sleep_ms: (250, 600),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    pub throttle_secs: u64,
    /// Exchanges kept per pair
    pub history_limit: usize,
    /// Exchanges quoted back into the opener prompt
    pub prompt_history: usize,
    pub group_context_turns: usize,
    pub feedback_probability: f64,
    pub conflicts_enabled: bool,
    pub max_tokens: u32,
    /// Memories recalled into each conversation prompt
    pub memory_context: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            throttle_secs: 8,
            history_limit: 10,
            prompt_history: 2,
            group_context_turns: 3,
            feedback_probability: 0.1,
            conflicts_enabled: true,
            max_tokens: 120,
            memory_context: 3,
        }
    }
}

impl ExecutorConfig {
    pub fn throttle(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.throttle_secs as i64)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub llm_concurrency: usize,
    pub queue_capacity: usize,
    pub generation_timeout_secs: u64,
    pub think_timeout_secs: u64,
    pub chat_timeout_secs: u64,
    pub snapshot_interval_secs: u64,
    pub shutdown_grace_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            llm_concurrency: 4,
            queue_capacity: 100,
            generation_timeout_secs: 15,
            think_timeout_secs: 10,
            chat_timeout_secs: 30,
            snapshot_interval_secs: 300,
            shutdown_grace_secs: 5,
        }
    }
}

impl WorkerConfig {
    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation_timeout_secs)
    }

    pub fn think_timeout(&self) -> Duration {
        Duration::from_secs(self.think_timeout_secs)
    }

    pub fn chat_timeout(&self) -> Duration {
        Duration::from_secs(self.chat_timeout_secs)
    }

    pub fn snapshot_interval(&self) -> Duration {
        Duration::from_secs(self.snapshot_interval_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}
