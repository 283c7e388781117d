//! Deterministic client for tests and offline demos.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use super::LlmClient;

type Responder = Box<dyn Fn(&str) -> String + Send + Sync>;

/// Answers from a queue of scripted replies, then from a responder or a
/// fixed default. Every prompt it sees is recorded.
pub struct ScriptedClient {
    replies: Mutex<VecDeque<String>>,
    responder: Option<Responder>,
    default_reply: String,
    delay: Option<Duration>,
    fail: bool,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedClient {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            responder: None,
            default_reply: "Nice to see you around town.".to_string(),
            delay: None,
            fail: false,
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Builds replies from the prompt once the scripted queue is empty
    pub fn from_fn(responder: impl Fn(&str) -> String + Send + Sync + 'static) -> Self {
        let mut client = Self::new(Vec::<String>::new());
        client.responder = Some(Box::new(responder));
        client
    }

    /// Every call fails
    pub fn failing() -> Self {
        let mut client = Self::new(Vec::<String>::new());
        client.fail = true;
        client
    }

    pub fn with_default(mut self, reply: impl Into<String>) -> Self {
        self.default_reply = reply.into();
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[async_trait]
impl LlmClient for ScriptedClient {
    async fn generate(&self, prompt: String, _max_tokens: u32) -> Result<String> {
        self.prompts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(prompt.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            anyhow::bail!("scripted failure");
        }

        let scripted = self.replies.lock().unwrap_or_else(PoisonError::into_inner).pop_front();
        Ok(match (scripted, &self.responder) {
            (Some(reply), _) => reply,
            (None, Some(responder)) => responder(&prompt),
            (None, None) => self.default_reply.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_then_default() {
        let client = ScriptedClient::new(["first"]).with_default("fallback");
        assert_eq!(client.generate("a".into(), 10).await.unwrap(), "first");
        assert_eq!(client.generate("b".into(), 10).await.unwrap(), "fallback");
        assert_eq!(client.prompts(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn responder_sees_prompt() {
        let client = ScriptedClient::from_fn(|prompt| format!("echo {}", prompt.len()));
        assert_eq!(client.generate("abc".into(), 10).await.unwrap(), "echo 3");
        assert_eq!(client.call_count(), 1);
    }
}
