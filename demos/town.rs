//! Runs the sample town for a while and prints what happens.
//!
//! With `OLLAMA_MODEL` set the agents talk through a local Ollama server;
//! otherwise a scripted client stands in so the demo runs anywhere.
//!
//! ```text
//! RUST_LOG=info cargo run --example town
//! OLLAMA_MODEL=llama3.2:latest RUST_LOG=info cargo run --example town
//! ```

use std::sync::Arc;
use std::time::Duration;

use social_town::llm::{LlmClient, OllamaClient, ScriptedClient};
use social_town::memory::InMemoryStore;
use social_town::{classify, RelationshipStore, SimulationConfig, Town, TownEngine};

const SCRIPTED_LINES: &[&str] = &[
    "Hey, how has your week been going?",
    "Pretty good, thanks for asking. Busy, but good.",
    "I'm not sure I agree with that, honestly.",
    "Have you tried the new place by the park?",
    "That sounds wonderful, I'd love to join.",
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    println!("=== Social Town ===\n");

    let client: Arc<dyn LlmClient> = match std::env::var("OLLAMA_MODEL") {
        Ok(model) => {
            println!("Using Ollama model {}\n", model);
            Arc::new(OllamaClient::new(model)?)
        }
        Err(_) => {
            println!("OLLAMA_MODEL not set, using scripted replies\n");
            let turn = std::sync::Mutex::new(0usize);
            Arc::new(ScriptedClient::from_fn(move |_prompt| {
                let mut turn = turn.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
                *turn += 1;
                SCRIPTED_LINES[*turn % SCRIPTED_LINES.len()].to_string()
            }))
        }
    };

    let data_dir = std::env::temp_dir().join("social_town_demo");
    let config = SimulationConfig {
        data_dir,
        ..SimulationConfig::load("town.json")?
    };

    let engine = TownEngine::new(config, Town::sample(), client, Arc::new(InMemoryStore::new()))?;
    engine.start();

    let reply = engine.chat("Emma", "What are you working on these days?").await?;
    println!("Emma says: {}\n", reply.text);

    tokio::time::sleep(Duration::from_secs(20)).await;
    engine.shutdown().await?;

    println!("\nRelationships after the run:");
    let names = engine.town().names();
    for (i, a) in names.iter().enumerate() {
        for b in &names[i + 1..] {
            if engine.relationships().contains(a, b) {
                let strength = engine.relationships().get(a, b);
                let level = classify(strength);
                println!("  {} ↔ {}: {} {} ({})", a, b, level.emoji(), level, strength);
            }
        }
    }

    Ok(())
}
