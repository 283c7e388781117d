use std::sync::Arc;
use std::time::Duration;

use social_town::config::ExecutorConfig;
use social_town::conflict::Intensity;
use social_town::llm::{LlmGate, ScriptedClient};
use social_town::memory::InMemoryStore;
use social_town::prompts::PromptBuilder;
use social_town::sentiment::has_negative_markers;
use social_town::{
    ConflictScenario, ConflictTracker, InteractionExecutor, InteractionType, RelationshipStore, RelationshipTable,
    SimulationConfig, Town, TownEngine, TownError,
};

struct Harness {
    executor: InteractionExecutor,
    relationships: Arc<RelationshipTable>,
    town: Arc<Town>,
    conflicts: Arc<ConflictTracker>,
    client: Arc<ScriptedClient>,
}

fn harness(client: ScriptedClient) -> Harness {
    harness_with(
        client,
        ExecutorConfig {
            feedback_probability: 0.0,
            conflicts_enabled: false,
            ..ExecutorConfig::default()
        },
    )
}

fn harness_with(client: ScriptedClient, config: ExecutorConfig) -> Harness {
    let client = Arc::new(client);
    let relationships = Arc::new(RelationshipTable::default());
    let town = Arc::new(Town::sample());
    let conflicts = Arc::new(ConflictTracker::new());
    let executor = InteractionExecutor::new(
        config,
        Duration::from_secs(2),
        relationships.clone(),
        conflicts.clone(),
        town.clone(),
        LlmGate::new(client.clone(), 4),
        Arc::new(PromptBuilder::default()),
        Arc::new(InMemoryStore::new()),
    );
    Harness {
        executor,
        relationships,
        town,
        conflicts,
        client,
    }
}

fn feud_over_the_fence(turns: u32) -> ConflictScenario {
    ConflictScenario {
        topic: "the garden fence".to_string(),
        trigger: "one wants it painted, the other wants it torn down".to_string(),
        intensity: Intensity::Strong,
        remaining_turns: turns,
        resolution_probability: 0.0,
        relationship_impact: -25,
    }
}

fn engine_in(dir: &std::path::Path, client: ScriptedClient, memory: Arc<InMemoryStore>) -> TownEngine {
    let mut config = SimulationConfig {
        data_dir: dir.to_path_buf(),
        ..SimulationConfig::default()
    };
    config.workers.chat_timeout_secs = 1;
    config.workers.shutdown_grace_secs = 2;
    TownEngine::new(config, Town::sample(), Arc::new(client), memory).unwrap()
}

#[tokio::test]
async fn friendly_chat_at_eighty_strengthens() {
    let h = harness(ScriptedClient::new(Vec::<String>::new()).with_default("Always a pleasure to run into you."));
    h.relationships.set("Sarah", "Lisa", 80);

    let record = h
        .executor
        .converse_as("Sarah", "Lisa", InteractionType::FriendlyChat)
        .await
        .unwrap()
        .expect("not throttled");

    assert!(h.relationships.get("Lisa", "Sarah") > 80);
    assert_eq!(record.changes.len(), 1);
    assert!(record.changes[0].delta() > 0);
}

#[tokio::test]
async fn public_argument_between_strangers_hurts_by_at_least_twelve() {
    let h = harness(ScriptedClient::new(Vec::<String>::new()).with_default("That's wrong and you know it."));
    h.relationships.set("Anna", "Tom", 15);

    let record = h
        .executor
        .converse_as("Anna", "Tom", InteractionType::Argument)
        .await
        .unwrap()
        .expect("not throttled");

    assert_eq!(record.location, "Restaurant");
    assert_eq!(h.town.agent("Tom").unwrap().location, "Restaurant");
    assert!(15 - h.relationships.get("Anna", "Tom") >= 12);
}

#[tokio::test]
async fn positive_reply_to_argument_gets_one_regeneration_then_canned_line() {
    let h = harness(ScriptedClient::new([
        "Morning, have you seen the new cafe menu?",
        "Oh that's great, thanks for telling me!",
        "Wonderful, I'm so glad you mentioned it.",
    ]));

    let record = h
        .executor
        .converse_as("Alex", "David", InteractionType::Argument)
        .await
        .unwrap()
        .expect("not throttled");

    // opener, reply, one regeneration; feedback is canned
    assert_eq!(h.client.call_count(), 3);
    let reply = &record.lines[1];
    assert_eq!(reply.speaker, "David");
    assert!(has_negative_markers(&reply.line), "reply was {:?}", reply.line);
}

#[tokio::test]
async fn negative_reply_to_argument_is_kept() {
    let h = harness(ScriptedClient::new([
        "Morning, have you seen the new cafe menu?",
        "Honestly I disagree, the old one was better.",
    ]));

    let record = h
        .executor
        .converse_as("Alex", "David", InteractionType::Argument)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(h.client.call_count(), 2);
    assert!(record.lines[1].line.contains("disagree"));
}

#[tokio::test]
async fn pairs_are_throttled_in_both_directions() {
    let h = harness(ScriptedClient::new(Vec::<String>::new()));

    assert!(h.executor.converse("John", "Anna").await.unwrap().is_some());
    assert!(h.executor.converse("Anna", "John").await.unwrap().is_none());
    assert!(h.executor.converse("John", "Mike").await.unwrap().is_some());
}

#[tokio::test]
async fn feud_runs_its_course_then_resolves_separately() {
    let h = harness_with(
        ScriptedClient::new(Vec::<String>::new()).with_default("You're wrong about the fence and it's unfair."),
        ExecutorConfig {
            feedback_probability: 0.0,
            throttle_secs: 0,
            ..ExecutorConfig::default()
        },
    );
    h.relationships.set("Mike", "Lisa", 70);
    h.conflicts.start("Mike", "Lisa", feud_over_the_fence(3));

    // two turns of arguing while the feud is open
    for turn in 0..2 {
        let record = h.executor.converse("Mike", "Lisa").await.unwrap().unwrap();
        assert_eq!(record.interaction_type, InteractionType::Argument, "turn {}", turn);
        assert_eq!(record.topic.as_deref(), Some("the garden fence"));
        assert_eq!(record.changes.len(), 1);
    }
    assert!(h.client.prompts().iter().any(|p| p.contains("strong disagreement about the garden fence")));

    // the third exchange uses up the last turn
    let before = h.relationships.get("Mike", "Lisa");
    let record = h.executor.converse("Mike", "Lisa").await.unwrap().unwrap();
    assert_eq!(record.changes.len(), 2);
    assert_eq!(record.changes[0].old_strength, before);
    assert!(record.changes[0].explanation.contains("conflict over the garden fence ended"));
    assert!(!h.conflicts.has_active_conflict("Lisa", "Mike"));
    assert!(h.conflicts.tension("Mike", "Lisa") < 0.6);
}

#[tokio::test]
async fn unknown_listener_is_rejected_without_side_effects() {
    let h = harness(ScriptedClient::new(Vec::<String>::new()));

    assert!(h.executor.converse("Anna", "Ghost").await.is_err());
    assert!(!h.relationships.contains("Anna", "Ghost"));
    assert_eq!(h.client.call_count(), 0);
}

#[tokio::test]
async fn chat_with_unknown_agent_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_in(dir.path(), ScriptedClient::new(Vec::<String>::new()), Arc::new(InMemoryStore::new()));

    let err = engine.chat("Nobody", "hello?").await.unwrap_err();
    assert!(matches!(err, TownError::AgentNotFound(_)));
    assert!(err.is_not_found());
}

#[tokio::test]
async fn slow_model_falls_back_in_chat() {
    let dir = tempfile::tempdir().unwrap();
    let client = ScriptedClient::new(["This will arrive far too late."]).with_delay(Duration::from_secs(3));
    let engine = engine_in(dir.path(), client, Arc::new(InMemoryStore::new()));

    let reply = engine.chat("Emma", "How's the painting?").await.unwrap();
    assert!(reply.fallback);
    assert!(!reply.text.is_empty());
}

#[tokio::test]
async fn chat_is_remembered_once_the_worker_drains() {
    let dir = tempfile::tempdir().unwrap();
    let memory = Arc::new(InMemoryStore::new());
    let engine = engine_in(
        dir.path(),
        ScriptedClient::new(["I'm sketching the old bridge by the river."]),
        memory.clone(),
    );

    let reply = engine.chat("Emma", "What are you drawing?").await.unwrap();
    assert!(!reply.fallback);
    assert!(reply.text.contains("bridge"));

    engine.start();
    engine.shutdown().await.unwrap();

    let remembered = memory.memories_of("Emma");
    assert!(remembered.iter().any(|m| m.tags.iter().any(|t| t == "chat")));
    assert!(dir.path().join("relationships.json").exists());
    assert!(dir.path().join("agents.json").exists());
}

#[tokio::test]
async fn move_validates_agent_and_location() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_in(dir.path(), ScriptedClient::new(Vec::<String>::new()), Arc::new(InMemoryStore::new()));

    assert!(matches!(engine.move_agent("Nobody", "Park"), Err(TownError::AgentNotFound(_))));
    assert!(matches!(engine.move_agent("Lisa", "Mars"), Err(TownError::LocationNotFound(_))));

    let (from, to) = engine.move_agent("Lisa", "cafe").unwrap();
    assert_eq!((from.as_str(), to.as_str()), ("Library", "Cafe"));
    assert_eq!(engine.town().agent("Lisa").unwrap().location, "Cafe");
}

#[tokio::test]
async fn running_town_survives_a_failing_model() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = SimulationConfig {
        data_dir: dir.path().to_path_buf(),
        ..SimulationConfig::default()
    };
    config.scheduler.success_sleep_ms = (5, 10);
    config.scheduler.failure_sleep_ms = (5, 10);
    config.executor.throttle_secs = 0;
    let engine = TownEngine::new(
        config,
        Town::sample(),
        Arc::new(ScriptedClient::failing()),
        Arc::new(InMemoryStore::new()),
    )
    .unwrap();

    engine.start();
    tokio::time::sleep(Duration::from_millis(300)).await;
    engine.shutdown().await.unwrap();

    assert!(engine.scheduler().history().len() > 3);
    for agent in engine.town().agents() {
        assert!((0..=100).contains(&agent.energy));
    }
}
