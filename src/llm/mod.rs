pub mod mock;
pub mod ollama;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

use crate::error::TownError;

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Completes `prompt`, producing at most roughly `max_tokens` tokens
    async fn generate(&self, prompt: String, max_tokens: u32) -> Result<String>;
}

pub use mock::ScriptedClient;
pub use ollama::OllamaClient;

/// Bounded pool in front of an [`LlmClient`].
///
/// Every call runs in its own task holding one permit. The caller stops
/// waiting at the timeout; the task itself runs to completion and its result
/// is discarded.
#[derive(Clone)]
pub struct LlmGate {
    client: Arc<dyn LlmClient>,
    permits: Arc<Semaphore>,
}

impl LlmGate {
    pub fn new(client: Arc<dyn LlmClient>, concurrency: usize) -> Self {
        Self {
            client,
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
        }
    }

    pub async fn generate(&self, prompt: String, max_tokens: u32, timeout: Duration) -> Result<String, TownError> {
        let client = Arc::clone(&self.client);
        let permits = Arc::clone(&self.permits);

        let handle = tokio::spawn(async move {
            let _permit = permits
                .acquire_owned()
                .await
                .map_err(|e| anyhow::anyhow!("generation pool closed: {}", e))?;
            client.generate(prompt, max_tokens).await
        });

        match tokio::time::timeout(timeout, handle).await {
            Err(_) => Err(TownError::GenerationTimeout(timeout)),
            Ok(Err(join_error)) => Err(TownError::Generation(join_error.to_string())),
            Ok(Ok(Err(e))) => Err(TownError::Generation(e.to_string())),
            Ok(Ok(Ok(text))) => Ok(text),
        }
    }

    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }
}
