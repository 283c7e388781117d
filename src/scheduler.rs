//! The background loop that decides who acts next and what they do.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use futures::FutureExt;
use rand::seq::SliceRandom;
use rand::Rng;
use std::any::Any;
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;

use crate::config::SchedulerConfig;
use crate::town::Town;
use crate::traits::{AgentView, RelationshipStore};
use crate::types::{ActionType, Agent, LocationCategory};

/// Fixed-capacity record of the actions chosen most recently, town-wide
#[derive(Debug, Clone)]
pub struct RecentActionHistory {
    capacity: usize,
    actions: VecDeque<ActionType>,
}

impl RecentActionHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            actions: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, action: ActionType) {
        if self.actions.len() == self.capacity {
            self.actions.pop_front();
        }
        self.actions.push_back(action);
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn count(&self, action: ActionType) -> usize {
        self.actions.iter().filter(|a| **a == action).count()
    }

    /// Fraction of recorded actions equal to `action`; 0 when empty
    pub fn share(&self, action: ActionType) -> f64 {
        if self.actions.is_empty() {
            return 0.0;
        }
        self.count(action) as f64 / self.actions.len() as f64
    }
}

fn base_weight(action: ActionType) -> f64 {
    match action {
        ActionType::Social => 35.0,
        ActionType::GroupDiscussion => 20.0,
        ActionType::Move => 20.0,
        ActionType::Think => 10.0,
        ActionType::Work => 10.0,
        ActionType::Relax => 5.0,
    }
}

/// Weight of every action for `agent`, in `ActionType::ALL` order.
///
/// `alone` means nobody else shares the agent's location; social actions are
/// then impossible and get weight 0.
pub fn action_weights<A: AgentView + ?Sized>(
    agent: &A,
    category: Option<LocationCategory>,
    alone: bool,
    history: &RecentActionHistory,
    config: &SchedulerConfig,
) -> Vec<(ActionType, f64)> {
    ActionType::ALL
        .iter()
        .map(|&action| {
            let mut weight = base_weight(action);

            if agent.last_action() == Some(action) {
                weight = (weight - 15.0).max(1.0);
            }

            if agent.energy() < 30 {
                match action {
                    ActionType::Relax => weight += 20.0,
                    ActionType::Work => weight -= 5.0,
                    _ => {}
                }
            }

            match (category, action) {
                (Some(LocationCategory::Work), ActionType::Work) => weight += 15.0,
                (Some(LocationCategory::Leisure | LocationCategory::Private), ActionType::Relax) => weight += 10.0,
                (Some(LocationCategory::Social), ActionType::Social) => weight += 10.0,
                _ => {}
            }

            if action.is_social() && history.len() >= config.min_history_for_skew {
                let share = history.share(action);
                let threshold = config.social_share_threshold;
                if share > threshold && threshold < 1.0 {
                    weight *= 1.0 - (share - threshold) / (1.0 - threshold);
                }
            }

            if alone {
                match action {
                    ActionType::Social | ActionType::GroupDiscussion => weight = 0.0,
                    ActionType::Move => weight += 15.0,
                    ActionType::Think => weight += 10.0,
                    _ => {}
                }
            }

            (action, weight.max(0.0))
        })
        .collect()
}

/// Weighted draw; `Think` when every weight is zero
pub fn choose_action<R: Rng + ?Sized>(weights: &[(ActionType, f64)], rng: &mut R) -> ActionType {
    weights
        .choose_weighted(rng, |(_, weight)| *weight)
        .map(|(action, _)| *action)
        .unwrap_or(ActionType::Think)
}

/// Carries out a chosen action
#[async_trait]
pub trait ActionDispatcher: Send + Sync {
    async fn dispatch(&self, agent: &Agent, action: ActionType) -> Result<()>;
}

pub struct ActionScheduler {
    config: SchedulerConfig,
    town: Arc<Town>,
    relationships: Arc<dyn RelationshipStore>,
    dispatcher: Arc<dyn ActionDispatcher>,
    history: Mutex<RecentActionHistory>,
}

impl ActionScheduler {
    pub fn new(
        config: SchedulerConfig,
        town: Arc<Town>,
        relationships: Arc<dyn RelationshipStore>,
        dispatcher: Arc<dyn ActionDispatcher>,
    ) -> Self {
        let history = RecentActionHistory::new(config.history_capacity);
        Self {
            config,
            town,
            relationships,
            dispatcher,
            history: Mutex::new(history),
        }
    }

    fn history_guard(&self) -> MutexGuard<'_, RecentActionHistory> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn history(&self) -> RecentActionHistory {
        self.history_guard().clone()
    }

    /// Picks an action for `agent` from the current town state
    pub fn plan(&self, agent: &Agent) -> ActionType {
        let alone = self.town.co_located(&agent.name).map(|c| c.is_empty()).unwrap_or(true);
        let category = self.town.category_of(&agent.location);
        let history = self.history();
        let weights = action_weights(agent, category, alone, &history, &self.config);
        log::debug!(
            "Weights for {}: {}",
            agent.name,
            weights
                .iter()
                .map(|(a, w)| format!("{}={:.1}", a, w))
                .collect::<Vec<_>>()
                .join(" ")
        );
        choose_action(&weights, &mut rand::thread_rng())
    }

    /// One iteration: decay, pick an agent and an action, dispatch, record.
    /// Returns false when there was nobody to act or the action failed.
    pub async fn tick(&self) -> bool {
        self.relationships.decay_tick(Utc::now());

        let agent = {
            let agents = self.town.agents();
            match agents.choose(&mut rand::thread_rng()) {
                Some(agent) => agent.clone(),
                None => return false,
            }
        };
        let action = self.plan(&agent);

        // A panicking handler is a failed action, not a dead scheduler
        let outcome = match AssertUnwindSafe(self.dispatcher.dispatch(&agent, action))
            .catch_unwind()
            .await
        {
            Ok(outcome) => outcome,
            Err(panic) => Err(anyhow!("handler panicked: {}", panic_message(panic.as_ref()))),
        };

        self.history_guard().push(action);
        if let Err(e) = self.town.update(&agent.name, |a| a.last_action = Some(action)) {
            log::debug!("Could not record last action: {}", e);
        }

        match outcome {
            Ok(()) => true,
            Err(e) => {
                log::error!("❌ Action {} failed for {}: {:#}", action, agent.name, e);
                false
            }
        }
    }

    /// Ticks until the shutdown flag turns true
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        log::info!("⏱️ Scheduler started");
        loop {
            if *shutdown.borrow() {
                break;
            }

            let succeeded = self.tick().await;
            let (low, high) = if succeeded {
                self.config.success_sleep_ms
            } else {
                self.config.failure_sleep_ms
            };
            let pause = Duration::from_millis(rand::thread_rng().gen_range(low..=high.max(low)));

            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        log::info!("🧹 Scheduler stopped");
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic"
    }
}
