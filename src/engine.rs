use anyhow::{Context as _, Result};
use async_trait::async_trait;
use futures::future::join_all;
use rand::seq::SliceRandom;
use rand::Rng;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::config::{SimulationConfig, WorkerConfig};
use crate::conflict::ConflictTracker;
use crate::error::TownError;
use crate::executor::InteractionExecutor;
use crate::llm::{LlmClient, LlmGate};
use crate::memory::MemoryRecord;
use crate::persistence;
use crate::prompts::{canned, PromptBuilder, PromptLoader};
use crate::relationship::RelationshipTable;
use crate::sanitize::Sanitizer;
use crate::scheduler::{ActionDispatcher, ActionScheduler};
use crate::town::Town;
use crate::traits::{MemoryStore, RelationshipStore};
use crate::types::{ActionType, Agent, ChatReply, InteractionRecord, Mood};
use crate::workers::{run_worker, BackgroundTask, Snapshotter, TaskQueue};

/// Longest line a private thought may take
const THOUGHT_MAX_CHARS: usize = 140;
/// Longest answer to a user message
const CHAT_MAX_CHARS: usize = 280;
/// Memories pulled into a chat or thought prompt
const MEMORY_CONTEXT: usize = 3;

/// Writes relationships and agent states next to each other in the data dir
pub struct StateFiles {
    town: Arc<Town>,
    relationships: Arc<RelationshipTable>,
    relationships_path: PathBuf,
    agents_path: PathBuf,
}

impl Snapshotter for StateFiles {
    fn write_snapshot(&self) -> Result<()> {
        persistence::save_relationships(&self.relationships_path, &self.relationships.snapshot())?;
        persistence::save_agents(&self.agents_path, &self.town.agents())?;
        log::debug!("📝 Saved {} relationships", self.relationships.len());
        Ok(())
    }
}

/// The per-action handlers the scheduler dispatches to
pub struct TownActions {
    town: Arc<Town>,
    relationships: Arc<RelationshipTable>,
    executor: Arc<InteractionExecutor>,
    memory: Arc<dyn MemoryStore>,
    gate: LlmGate,
    prompts: Arc<PromptBuilder>,
    sanitizer: Sanitizer,
    queue: TaskQueue,
    workers: WorkerConfig,
    max_tokens: u32,
}

impl TownActions {
    async fn social(&self, agent: &Agent) -> Result<()> {
        let company = self.town.co_located(&agent.name)?;
        let partner = {
            let weighted: Vec<(String, f64)> = company
                .into_iter()
                .map(|other| {
                    let weight = self.relationships.get(&agent.name, &other.name) as f64 / 100.0 + 0.1;
                    (other.name, weight)
                })
                .collect();
            match weighted.choose_weighted(&mut rand::thread_rng(), |(_, w)| *w) {
                Ok((name, _)) => name.clone(),
                Err(_) => {
                    log::debug!("{} has nobody to talk to", agent.name);
                    return Ok(());
                }
            }
        };

        if let Some(record) = self.executor.converse(&agent.name, &partner).await? {
            self.remember_interaction(&record);
        }
        self.spend_energy(&agent.name)
    }

    async fn group_discussion(&self, agent: &Agent) -> Result<()> {
        let partners: Vec<String> = {
            let mut names: Vec<String> = self.town.co_located(&agent.name)?.into_iter().map(|a| a.name).collect();
            let mut rng = rand::thread_rng();
            names.shuffle(&mut rng);
            let wanted = rng.gen_range(2..=3);
            names.truncate(wanted);
            names
        };

        if let Some(record) = self.executor.group_discussion(&agent.name, &partners).await? {
            self.remember_interaction(&record);
        }
        self.spend_energy(&agent.name)
    }

    fn wander(&self, agent: &Agent) -> Result<()> {
        let destination = self
            .town
            .locations()
            .iter()
            .filter(|l| l.name != agent.location)
            .collect::<Vec<_>>()
            .choose(&mut rand::thread_rng())
            .map(|l| l.name.clone());
        let Some(destination) = destination else {
            return Ok(());
        };

        let (from, to) = self.town.move_agent(&agent.name, &destination)?;
        log::info!("🚶 {} walked from {} to {}", agent.name, from, to);
        self.queue.submit(BackgroundTask::SaveMemory(
            MemoryRecord::new(&agent.name, format!("Walked from the {} to the {}", from, to), 0.1)
                .with_tags(["move", to.as_str()]),
        ));
        self.spend_energy(&agent.name)
    }

    async fn think(&self, agent: &Agent) -> Result<()> {
        let recent = self.recall(&agent.name, &agent.location).await;
        let prompt = self.prompts.think(agent, &recent);

        let thought = match self.gate.generate(prompt, self.max_tokens, self.workers.think_timeout()).await {
            Ok(raw) => Some(self.sanitizer.clean(&raw, THOUGHT_MAX_CHARS)).filter(|t| !self.sanitizer.is_degenerate(t, 5)),
            Err(e) => {
                log::warn!("⚠️ Thought for {} failed: {}", agent.name, e);
                None
            }
        };
        let thought = thought.unwrap_or_else(|| canned::thought(&mut rand::thread_rng()));

        log::info!("💭 {} thinks: {}", agent.name, thought);
        self.queue.submit(BackgroundTask::SaveMemory(
            MemoryRecord::new(&agent.name, format!("Thought: {}", thought), 0.2).with_tags(["thought"]),
        ));
        self.spend_energy(&agent.name)
    }

    fn work(&self, agent: &Agent) -> Result<()> {
        let template = self.prompts.template(&agent.profession);
        let activity = template
            .work_activities
            .choose(&mut rand::thread_rng())
            .cloned()
            .unwrap_or_else(|| "getting some work done".to_string());
        let cost = rand::thread_rng().gen_range(5..=15);

        let updated = self.town.update(&agent.name, |a| {
            a.adjust_energy(-cost);
            a.mood = Mood::Focused;
        })?;
        log::info!("🔨 {} is {} (energy {})", agent.name, activity, updated.energy);
        Ok(())
    }

    fn relax(&self, agent: &Agent) -> Result<()> {
        let template = self.prompts.template(&agent.profession);
        let activity = template
            .relax_activities
            .choose(&mut rand::thread_rng())
            .cloned()
            .unwrap_or_else(|| "taking it easy".to_string());
        let gain = rand::thread_rng().gen_range(10..=20);

        let updated = self.town.update(&agent.name, |a| {
            a.adjust_energy(gain);
            if a.mood.is_strained() {
                a.mood = if a.mood == Mood::Anxious { Mood::Happy } else { Mood::Calm };
            }
        })?;
        log::info!("☕ {} is {} (energy {})", agent.name, activity, updated.energy);
        Ok(())
    }

    fn spend_energy(&self, name: &str) -> Result<()> {
        let cost = rand::thread_rng().gen_range(1..=5);
        self.town.update(name, |a| a.adjust_energy(-cost))?;
        Ok(())
    }

    /// Memory contents relevant to `query`; search failures count as nothing
    async fn recall(&self, owner: &str, query: &str) -> Vec<String> {
        match self.memory.search(owner, query, MEMORY_CONTEXT).await {
            Ok(matches) => matches.into_iter().map(|m| m.record.content).collect(),
            Err(e) => {
                log::warn!("⚠️ Memory search for {} failed: {:#}", owner, e);
                Vec::new()
            }
        }
    }

    /// One memory per side of every pair the interaction touched
    fn remember_interaction(&self, record: &InteractionRecord) {
        for memory in interaction_memories(record) {
            self.queue.submit(BackgroundTask::SaveMemory(memory));
        }
    }
}

#[async_trait]
impl ActionDispatcher for TownActions {
    async fn dispatch(&self, agent: &Agent, action: ActionType) -> Result<()> {
        match action {
            ActionType::Social => self.social(agent).await,
            ActionType::GroupDiscussion => self.group_discussion(agent).await,
            ActionType::Move => self.wander(agent),
            ActionType::Think => self.think(agent).await,
            ActionType::Work => self.work(agent),
            ActionType::Relax => self.relax(agent),
        }
    }
}

fn interaction_memories(record: &InteractionRecord) -> Vec<MemoryRecord> {
    let kind = record.interaction_type.as_str();
    let mut memories = Vec::new();

    for change in &record.changes {
        let importance = (change.delta().abs() as f32 / 10.0).clamp(0.1, 1.0);
        for (owner, other) in [(&change.agent_a, &change.agent_b), (&change.agent_b, &change.agent_a)] {
            let heard = record
                .lines
                .iter()
                .rev()
                .find(|e| &e.speaker == other && (&e.listener == owner || e.listener == "everyone"))
                .map(|e| format!(" {} said: \"{}\"", other, e.line))
                .unwrap_or_default();
            let content = format!("Had a {} with {} at the {}.{}", kind.replace('_', " "), other, record.location, heard);
            memories.push(MemoryRecord::new(owner.as_str(), content, importance).with_tags([kind, other.as_str()]));
        }
    }
    memories
}

/// Owns the town and every simulation component; the entry point for
/// starting, stopping and talking to the town.
pub struct TownEngine {
    /// Configuration the engine was built with
    config: SimulationConfig,

    /// Residents and places
    town: Arc<Town>,

    /// Pairwise relationship strengths
    relationships: Arc<RelationshipTable>,

    /// Open conflicts between pairs
    conflicts: Arc<ConflictTracker>,

    /// Generation pool shared by every prompt
    gate: LlmGate,

    prompts: Arc<PromptBuilder>,
    sanitizer: Sanitizer,
    memory: Arc<dyn MemoryStore>,
    executor: Arc<InteractionExecutor>,
    actions: Arc<TownActions>,
    scheduler: Arc<ActionScheduler>,
    state_files: Arc<StateFiles>,

    /// Producer side of the background queue
    queue: TaskQueue,
    queue_rx: Mutex<Option<mpsc::Receiver<BackgroundTask>>>,

    shutdown_tx: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl TownEngine {
    /// Builds the engine, loading prompt overrides and any saved state from
    /// `config.data_dir`
    pub fn new(
        config: SimulationConfig,
        town: Town,
        client: Arc<dyn LlmClient>,
        memory: Arc<dyn MemoryStore>,
    ) -> Result<Self> {
        let loader = PromptLoader::new(&config.data_dir);
        let prompts = Arc::new(PromptBuilder::new(
            loader.load_preamble()?,
            loader.load_registry().context("Failed to load profession templates")?,
        ));

        let town = Arc::new(town);
        let relationships = Arc::new(RelationshipTable::new(config.relationship.clone()));

        // 1. Restore saved state
        relationships.restore(&persistence::load_relationships(&config.relationships_path()));
        let restored = town.restore(persistence::load_agents(&config.agents_path()));
        log::info!(
            "📂 Town ready: {} agents ({} restored), {} relationships",
            town.agents().len(),
            restored,
            relationships.len()
        );

        // 2. Shared pieces
        let gate = LlmGate::new(client, config.workers.llm_concurrency);
        let conflicts = Arc::new(ConflictTracker::new());
        let sanitizer = Sanitizer::new(town.names());
        let (queue, queue_rx) = TaskQueue::bounded(config.workers.queue_capacity);

        // 3. Executor, handlers, scheduler
        let executor = Arc::new(InteractionExecutor::new(
            config.executor.clone(),
            config.workers.generation_timeout(),
            relationships.clone(),
            conflicts.clone(),
            town.clone(),
            gate.clone(),
            prompts.clone(),
            memory.clone(),
        ));
        let actions = Arc::new(TownActions {
            town: town.clone(),
            relationships: relationships.clone(),
            executor: executor.clone(),
            memory: memory.clone(),
            gate: gate.clone(),
            prompts: prompts.clone(),
            sanitizer: sanitizer.clone(),
            queue: queue.clone(),
            workers: config.workers.clone(),
            max_tokens: config.executor.max_tokens,
        });
        let scheduler = Arc::new(ActionScheduler::new(
            config.scheduler.clone(),
            town.clone(),
            relationships.clone(),
            actions.clone(),
        ));
        let state_files = Arc::new(StateFiles {
            town: town.clone(),
            relationships: relationships.clone(),
            relationships_path: config.relationships_path(),
            agents_path: config.agents_path(),
        });
        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            config,
            town,
            relationships,
            conflicts,
            gate,
            prompts,
            sanitizer,
            memory,
            executor,
            actions,
            scheduler,
            state_files,
            queue,
            queue_rx: Mutex::new(Some(queue_rx)),
            shutdown_tx,
            tasks: Mutex::new(Vec::new()),
        })
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn town(&self) -> &Arc<Town> {
        &self.town
    }

    pub fn relationships(&self) -> &Arc<RelationshipTable> {
        &self.relationships
    }

    pub fn conflicts(&self) -> &Arc<ConflictTracker> {
        &self.conflicts
    }

    pub fn executor(&self) -> &Arc<InteractionExecutor> {
        &self.executor
    }

    pub fn scheduler(&self) -> &Arc<ActionScheduler> {
        &self.scheduler
    }

    pub fn memory(&self) -> &Arc<dyn MemoryStore> {
        &self.memory
    }

    /// Runs one action for `name` right away, outside the scheduler
    pub async fn perform(&self, name: &str, action: ActionType) -> Result<()> {
        let agent = self.town.agent(name)?;
        self.actions.dispatch(&agent, action).await
    }

    /// A user talks to an agent. Generation problems produce a canned answer
    /// with `fallback` set; only an unknown agent is an error.
    pub async fn chat(&self, name: &str, message: &str) -> Result<ChatReply, TownError> {
        let agent = self.town.agent(name)?;
        log::info!("🤔 {} is thinking...", agent.name);

        let memories = self.actions.recall(&agent.name, message).await;
        let prompt = self.prompts.chat(&agent, message, &memories);

        let answer = match self
            .gate
            .generate(prompt, self.config.executor.max_tokens, self.config.workers.chat_timeout())
            .await
        {
            Ok(raw) => Some(self.sanitizer.clean(&raw, CHAT_MAX_CHARS)).filter(|t| !self.sanitizer.is_degenerate(t, 2)),
            Err(e) => {
                log::warn!("⚠️ Chat with {} failed: {}", agent.name, e);
                None
            }
        };
        let fallback = answer.is_none();
        let text = answer.unwrap_or_else(|| canned::chat_reply(&mut rand::thread_rng()));

        log::info!("🗨️ {}: {}", agent.name, text);
        self.queue.submit(BackgroundTask::SaveMemory(
            MemoryRecord::new(
                &agent.name,
                format!("A visitor said \"{}\" and I answered \"{}\"", message, text),
                0.4,
            )
            .with_tags(["chat"]),
        ));

        Ok(ChatReply {
            agent: agent.name,
            text,
            fallback,
        })
    }

    /// Moves an agent on request and returns `(from, to)`
    pub fn move_agent(&self, name: &str, location: &str) -> Result<(String, String), TownError> {
        let (from, to) = self.town.move_agent(name, location)?;
        log::info!("🚶 {} moved from {} to {}", name, from, to);
        self.queue.submit(BackgroundTask::SaveMemory(
            MemoryRecord::new(name, format!("Went from the {} to the {}", from, to), 0.1).with_tags(["move", to.as_str()]),
        ));
        Ok((from, to))
    }

    /// Asks the background worker for a snapshot
    pub fn request_snapshot(&self) -> bool {
        self.queue.submit(BackgroundTask::FlushSnapshot)
    }

    /// Writes relationships and agent states now
    pub fn write_snapshot(&self) -> Result<()> {
        self.state_files.write_snapshot()
    }

    /// Spawns the scheduler and the background worker. Calling it twice is a
    /// no-op.
    pub fn start(&self) {
        let Some(rx) = self.queue_rx.lock().unwrap_or_else(PoisonError::into_inner).take() else {
            log::warn!("⚠️ Town already started");
            return;
        };

        let scheduler = tokio::spawn(self.scheduler.clone().run(self.shutdown_tx.subscribe()));
        let worker = tokio::spawn(run_worker(
            rx,
            self.memory.clone(),
            self.state_files.clone(),
            self.config.workers.snapshot_interval(),
            self.shutdown_tx.subscribe(),
        ));

        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend([scheduler, worker]);
        log::info!("🏘️ Town started");
    }

    /// Signals every task, waits up to the grace period and writes a final
    /// snapshot
    pub async fn shutdown(&self) -> Result<()> {
        log::info!("🕊️ Shutting down town...");
        self.shutdown_tx.send_replace(true);

        let tasks: Vec<JoinHandle<()>> = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner));
        let grace = self.config.workers.shutdown_grace();
        match tokio::time::timeout(grace, join_all(tasks)).await {
            Ok(results) => {
                for result in results {
                    if let Err(e) = result {
                        log::error!("❌ Task ended abnormally: {}", e);
                    }
                }
            }
            Err(_) => log::warn!("⚠️ Tasks still running after {:?}, giving up on them", grace),
        }

        self.write_snapshot()?;
        log::info!(
            "🕊️ Town stopped with {} conflicts still open, state saved",
            self.conflicts.active_count()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedClient;
    use crate::memory::InMemoryStore;
    use crate::types::InteractionType;

    fn engine(dir: &std::path::Path, client: ScriptedClient) -> TownEngine {
        let config = SimulationConfig {
            data_dir: dir.to_path_buf(),
            ..SimulationConfig::default()
        };
        TownEngine::new(config, Town::sample(), Arc::new(client), Arc::new(InMemoryStore::new())).unwrap()
    }

    #[test]
    fn interaction_memories_cover_both_sides() {
        let record = InteractionRecord {
            location: "Cafe".to_string(),
            interaction_type: InteractionType::FriendlyChat,
            topic: None,
            lines: vec![
                crate::types::Exchange::new("Alex", "Emma", "Hi Emma!"),
                crate::types::Exchange::new("Emma", "Alex", "Hey, good to see you."),
            ],
            changes: vec![crate::types::RelationshipChange {
                agent_a: "Alex".to_string(),
                agent_b: "Emma".to_string(),
                old_strength: 50,
                new_strength: 57,
                old_level: crate::relationship::classify(50),
                new_level: crate::relationship::classify(57),
                explanation: String::new(),
            }],
        };

        let memories = interaction_memories(&record);
        assert_eq!(memories.len(), 2);
        assert!(memories[0].content.contains("Emma said: \"Hey, good to see you.\""));
        assert_eq!(memories[1].owner, "Emma");
        assert!((memories[0].importance - 0.7).abs() < 1e-6);
    }

    #[tokio::test]
    async fn work_and_relax_touch_energy_and_mood() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path(), ScriptedClient::new(Vec::<String>::new()));

        engine.town().update("Alex", |a| a.mood = Mood::Tired).unwrap();
        engine.perform("Alex", ActionType::Work).await.unwrap();
        let worked = engine.town().agent("Alex").unwrap();
        assert!(worked.energy <= 75 && worked.energy >= 65);
        assert_eq!(worked.mood, Mood::Focused);

        engine.town().update("Alex", |a| a.mood = Mood::Tired).unwrap();
        engine.perform("Alex", ActionType::Relax).await.unwrap();
        let rested = engine.town().agent("Alex").unwrap();
        assert!(rested.energy > worked.energy);
        assert_eq!(rested.mood, Mood::Calm);
    }

    #[tokio::test]
    async fn rest_lifts_every_strained_mood() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path(), ScriptedClient::new(Vec::<String>::new()));

        for (before, after) in [
            (Mood::Bored, Mood::Calm),
            (Mood::Anxious, Mood::Happy),
            (Mood::Excited, Mood::Excited),
        ] {
            engine.town().update("Lisa", |a| a.mood = before).unwrap();
            engine.perform("Lisa", ActionType::Relax).await.unwrap();
            assert_eq!(engine.town().agent("Lisa").unwrap().mood, after, "after resting {:?}", before);
        }
    }

    #[tokio::test]
    async fn think_falls_back_when_generation_fails() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path(), ScriptedClient::failing());
        engine.perform("Mike", ActionType::Think).await.unwrap();
        assert!(engine.town().agent("Mike").unwrap().energy < 80);
    }

    #[tokio::test]
    async fn social_without_company_is_quiet() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path(), ScriptedClient::new(Vec::<String>::new()));
        engine.perform("Tom", ActionType::Social).await.unwrap();
        assert!(engine.relationships().is_empty());
    }

    #[tokio::test]
    async fn saved_state_is_restored() {
        let dir = tempfile::tempdir().unwrap();
        {
            let engine = engine(dir.path(), ScriptedClient::new(Vec::<String>::new()));
            engine.relationships().set("Alex", "Emma", 77);
            engine.move_agent("Alex", "Cafe").unwrap();
            engine.write_snapshot().unwrap();
        }

        let engine = engine(dir.path(), ScriptedClient::new(Vec::<String>::new()));
        assert_eq!(engine.relationships().get("Emma", "Alex"), 77);
        assert_eq!(engine.town().agent("Alex").unwrap().location, "Cafe");
    }

    #[tokio::test]
    async fn malformed_profession_file_fails_startup() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("prompts")).unwrap();
        std::fs::write(dir.path().join("prompts").join("professions.json"), "[{").unwrap();

        let config = SimulationConfig {
            data_dir: dir.path().to_path_buf(),
            ..SimulationConfig::default()
        };
        let result = TownEngine::new(
            config,
            Town::sample(),
            Arc::new(ScriptedClient::new(Vec::<String>::new())),
            Arc::new(InMemoryStore::new()),
        );
        assert!(result.is_err());
    }
}
