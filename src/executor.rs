//! Stages conversations between agents and turns them into relationship
//! changes.

use anyhow::Result;
use chrono::Utc;
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::catalog::{self, InteractionEffectCatalog};
use crate::config::ExecutorConfig;
use crate::conflict::{ConflictScenario, ConflictTracker, Resolution};
use crate::llm::LlmGate;
use crate::prompts::{canned, templates::GROUP_TOPICS, ExchangeContext, PromptBuilder};
use crate::relationship::{classify, PairKey, Tier};
use crate::sanitize::Sanitizer;
use crate::sentiment::{has_negative_markers, sentiment_bias};
use crate::town::Town;
use crate::traits::{MemoryStore, RelationshipStore};
use crate::types::{Agent, Exchange, InteractionRecord, InteractionType, LocationCategory, RelationshipChange};

/// Band for short reactions inside a group
const REACTION_BAND: (usize, usize) = (10, 60);

/// Picks the interaction kind for a pair: warmer pairs mostly chat, colder
/// pairs mostly clash.
pub fn choose_interaction_type<R: Rng + ?Sized>(strength: i32, rng: &mut R) -> InteractionType {
    let weights: [u32; 4] = if strength >= 70 {
        [65, 20, 12, 3]
    } else if strength >= 50 {
        [50, 25, 18, 7]
    } else if strength >= 30 {
        [30, 30, 25, 15]
    } else {
        [20, 25, 35, 20]
    };
    let kinds = [
        InteractionType::FriendlyChat,
        InteractionType::CasualMeeting,
        InteractionType::Misunderstanding,
        InteractionType::Argument,
    ];

    kinds
        .iter()
        .zip(weights)
        .collect::<Vec<_>>()
        .choose_weighted(rng, |(_, weight)| *weight)
        .map(|(kind, _)| **kind)
        .unwrap_or(InteractionType::CasualMeeting)
}

pub struct InteractionExecutor {
    config: ExecutorConfig,
    generation_timeout: Duration,
    relationships: Arc<dyn RelationshipStore>,
    conflicts: Arc<ConflictTracker>,
    town: Arc<Town>,
    gate: LlmGate,
    prompts: Arc<PromptBuilder>,
    memory: Arc<dyn MemoryStore>,
    sanitizer: Sanitizer,
    history: Mutex<HashMap<PairKey, VecDeque<Exchange>>>,
}

impl InteractionExecutor {
    pub fn new(
        config: ExecutorConfig,
        generation_timeout: Duration,
        relationships: Arc<dyn RelationshipStore>,
        conflicts: Arc<ConflictTracker>,
        town: Arc<Town>,
        gate: LlmGate,
        prompts: Arc<PromptBuilder>,
        memory: Arc<dyn MemoryStore>,
    ) -> Self {
        let sanitizer = Sanitizer::new(town.names());
        Self {
            config,
            generation_timeout,
            relationships,
            conflicts,
            town,
            gate,
            prompts,
            memory,
            sanitizer,
            history: Mutex::new(HashMap::new()),
        }
    }

    fn history_guard(&self) -> MutexGuard<'_, HashMap<PairKey, VecDeque<Exchange>>> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stored exchanges for the pair, oldest first
    pub fn history(&self, a: &str, b: &str) -> Vec<Exchange> {
        self.history_guard()
            .get(&PairKey::new(a, b))
            .map(|h| h.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn recent_history(&self, a: &str, b: &str, limit: usize) -> Vec<Exchange> {
        let history = self.history(a, b);
        let skip = history.len().saturating_sub(limit);
        history.into_iter().skip(skip).collect()
    }

    fn remember(&self, a: &str, b: &str, exchanges: &[Exchange]) {
        let limit = self.config.history_limit.max(1);
        let mut history = self.history_guard();
        let entry = history.entry(PairKey::new(a, b)).or_default();
        for exchange in exchanges {
            entry.push_back(exchange.clone());
            while entry.len() > limit {
                entry.pop_front();
            }
        }
    }

    /// Pairwise exchange with a randomly chosen interaction kind.
    ///
    /// Returns `Ok(None)` when the pair talked too recently.
    pub async fn converse(&self, initiator: &str, target: &str) -> Result<Option<InteractionRecord>> {
        self.run_pair(initiator, target, None).await
    }

    /// Pairwise exchange with the interaction kind fixed by the caller
    pub async fn converse_as(
        &self,
        initiator: &str,
        target: &str,
        kind: InteractionType,
    ) -> Result<Option<InteractionRecord>> {
        self.run_pair(initiator, target, Some(kind)).await
    }

    async fn run_pair(
        &self,
        initiator: &str,
        target: &str,
        forced: Option<InteractionType>,
    ) -> Result<Option<InteractionRecord>> {
        // 1. Both must exist before the pair is stamped
        self.town.agent(initiator)?;
        self.town.agent(target)?;

        // 2. Throttle
        let Some(previous_meetings) =
            self.relationships
                .claim_interaction(initiator, target, Utc::now(), self.config.throttle())
        else {
            log::debug!("{} and {} talked moments ago, skipping", initiator, target);
            return Ok(None);
        };

        // 3. Bring both to the same place
        let (speaker, listener) = self.co_locate(initiator, target)?;
        let location = speaker.location.clone();

        // 4. Relationship and length band
        let strength = self.relationships.get(initiator, target);
        let tier = Tier::from_strength(strength);
        let band = tier.length_band();
        let mut changes = Vec::new();

        // 5. Conflict bookkeeping
        let mut conflict_kind = None;
        let mut scenario = None;
        if self.config.conflicts_enabled {
            conflict_kind = self.advance_conflict(&speaker, &listener, strength, &mut changes);
            scenario = self.conflicts.active(initiator, target);
        }
        let conflict_context = scenario.as_ref().map(ConflictScenario::context);
        let strength = self.relationships.get(initiator, target);

        // 6. Opener, with what the initiator remembers of the other
        let history = self.recent_history(initiator, target, self.config.prompt_history);
        let speaker_memories = self.recall(initiator, target).await;
        let ctx = ExchangeContext {
            location: &location,
            strength,
            band,
            history: &history,
            conflict: conflict_context.as_deref(),
            memories: &speaker_memories,
        };
        let opener = match self
            .generate_line(self.prompts.opener(&speaker, &listener, &ctx), band, "opener")
            .await
        {
            Some(line) => line,
            None => match &scenario {
                Some(scenario) => scenario.canned_line(true, &mut rand::thread_rng()),
                None => canned::opener(tier, &mut rand::thread_rng()),
            },
        };

        // 7. Interaction kind
        let kind = forced
            .or(conflict_kind)
            .unwrap_or_else(|| choose_interaction_type(strength, &mut rand::thread_rng()));

        // 8. Reply, checked against the kind's tone
        let listener_memories = self.recall(target, initiator).await;
        let reply_ctx = ExchangeContext {
            memories: &listener_memories,
            ..ctx.clone()
        };
        let reply = self
            .reply_line(&listener, &speaker, kind, &opener, &reply_ctx, scenario.as_ref())
            .await;

        // 9. Feedback
        let wants_feedback = rand::thread_rng().gen_bool(self.config.feedback_probability.clamp(0.0, 1.0));
        let feedback = if wants_feedback {
            self.generate_line(self.prompts.feedback(&speaker, &listener, &reply, &ctx), REACTION_BAND, "feedback")
                .await
        } else {
            None
        };
        let feedback = feedback.unwrap_or_else(|| canned::acknowledgment(tier, &mut rand::thread_rng()));

        // 10. Relationship change
        let conditions = self.conditions(&speaker, &listener, kind, strength, previous_meetings == 0);
        let (base, explanation) = InteractionEffectCatalog::compute_effect(kind.as_str(), &conditions);
        let bias = sentiment_bias(&format!("{} {} {}", opener, reply, feedback));
        let explanation = format!("{} | tone {:+}", explanation, bias);
        let (delta, explanation) = modulate(&speaker, &listener, &location, kind, base + bias, explanation);
        changes.push(self.apply(initiator, target, delta, explanation));

        // 11. History and record
        let lines = vec![
            Exchange::new(initiator, target, opener),
            Exchange::new(target, initiator, reply),
            Exchange::new(initiator, target, feedback),
        ];
        self.remember(initiator, target, &lines);

        let record = InteractionRecord {
            location,
            interaction_type: kind,
            topic: scenario.map(|c| c.topic),
            lines,
            changes,
        };
        log::info!("\n{}", record);
        Ok(Some(record))
    }

    /// Group discussion led by `initiator`. With fewer than two partners it
    /// falls back to a pairwise exchange.
    pub async fn group_discussion(&self, initiator: &str, partners: &[String]) -> Result<Option<InteractionRecord>> {
        if partners.len() < 2 {
            return match partners.first() {
                Some(partner) => self.converse(initiator, partner).await,
                None => Ok(None),
            };
        }

        // 1. Everyone must exist; then throttle per pair, and partners who
        // just talked with the opener sit out
        let partners = &partners[..partners.len().min(3)];
        self.town.agent(initiator)?;
        for partner in partners {
            self.town.agent(partner)?;
        }
        let now = Utc::now();
        let claimed: Vec<(String, u32)> = partners
            .iter()
            .filter_map(|p| {
                self.relationships
                    .claim_interaction(initiator, p, now, self.config.throttle())
                    .map(|count| (p.clone(), count))
            })
            .collect();
        if claimed.is_empty() {
            log::debug!("Everyone around {} talked moments ago, skipping group", initiator);
            return Ok(None);
        }

        // 2. Gather everyone at the opener's location
        let mut members = Vec::new();
        let mut speaker = None;
        for (partner, _) in &claimed {
            let (opener, member) = self.co_locate(initiator, partner)?;
            speaker = Some(opener);
            members.push(member);
        }
        let Some(speaker) = speaker else {
            return Ok(None);
        };
        let location = speaker.location.clone();
        let topic = GROUP_TOPICS
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or("the weather")
            .to_string();

        // 3. Opening line
        let others: Vec<&Agent> = members.iter().collect();
        let neutral = Tier::Neutral.length_band();
        let opener_memories = self.recall(initiator, &topic).await;
        let ctx = ExchangeContext {
            location: &location,
            strength: self.relationships.get(initiator, &members[0].name),
            band: neutral,
            memories: &opener_memories,
            ..Default::default()
        };
        let opener = self
            .generate_line(self.prompts.group_opener(&speaker, &others, &topic, &ctx), neutral, "group opener")
            .await
            .unwrap_or_else(|| format!("Has anyone been following {}?", topic));
        let mut turns = vec![Exchange::new(initiator, "everyone", opener)];
        let mut changes = Vec::new();

        // 4. Each member speaks seeing only the last few turns; the opener reacts
        for member in &members {
            let strength = self.relationships.get(initiator, &member.name);
            let band = Tier::from_strength(strength).length_band();
            let skip = turns.len().saturating_sub(self.config.group_context_turns);
            let recent: Vec<Exchange> = turns[skip..].to_vec();
            let member_memories = self.recall(&member.name, &topic).await;

            let member_ctx = ExchangeContext {
                location: &location,
                strength,
                band,
                history: &recent,
                memories: &member_memories,
                ..Default::default()
            };
            let line = self
                .generate_line(self.prompts.group_reply(member, &topic, &member_ctx), band, "group reply")
                .await
                .unwrap_or_else(|| canned::reply(InteractionType::GroupDiscussion, &mut rand::thread_rng()));

            let reaction_ctx = ExchangeContext {
                band: REACTION_BAND,
                memories: &opener_memories,
                ..member_ctx.clone()
            };
            let reaction = self
                .generate_line(
                    self.prompts.group_reaction(&speaker, member, &line, &reaction_ctx),
                    REACTION_BAND,
                    "group reaction",
                )
                .await
                .unwrap_or_else(|| canned::acknowledgment(Tier::from_strength(strength), &mut rand::thread_rng()));

            let said = Exchange::new(&member.name, initiator, line);
            let answered = Exchange::new(initiator, &member.name, reaction);
            self.remember(initiator, &member.name, &[said.clone(), answered.clone()]);

            // 5. Only opener-member pairs move
            let mut conditions = vec![catalog::SAME_LOCATION];
            if same_profession(&speaker, member) {
                conditions.push(catalog::SAME_PROFESSION);
            }
            let (base, explanation) =
                InteractionEffectCatalog::compute_effect(InteractionType::GroupDiscussion.as_str(), &conditions);
            let bias = sentiment_bias(&said.line);
            let explanation = format!("{} | tone {:+}", explanation, bias);
            let (delta, explanation) = modulate(
                &speaker,
                member,
                &location,
                InteractionType::GroupDiscussion,
                base + bias,
                explanation,
            );
            changes.push(self.apply(initiator, &member.name, delta, explanation));

            turns.push(said);
            turns.push(answered);
        }

        let record = InteractionRecord {
            location,
            interaction_type: InteractionType::GroupDiscussion,
            topic: Some(topic),
            lines: turns,
            changes,
        };
        log::info!("\n{}", record);
        Ok(Some(record))
    }

    /// Moves `target` to `initiator` if needed and returns fresh copies of both
    fn co_locate(&self, initiator: &str, target: &str) -> Result<(Agent, Agent)> {
        let speaker = self.town.agent(initiator)?;
        let listener = self.town.agent(target)?;
        if listener.location != speaker.location {
            self.town.move_agent(target, &speaker.location)?;
            log::debug!("{} joined {} at {}", target, initiator, speaker.location);
        }
        Ok((speaker, self.town.agent(target)?))
    }

    /// Progresses or starts the pair's conflict. Returns the kind the conflict
    /// forces on this exchange, if any.
    fn advance_conflict(
        &self,
        speaker: &Agent,
        listener: &Agent,
        strength: i32,
        changes: &mut Vec<RelationshipChange>,
    ) -> Option<InteractionType> {
        let (a, b) = (speaker.name.as_str(), listener.name.as_str());

        if self.conflicts.has_active_conflict(a, b) {
            let progress = self.conflicts.update_conflict_progress(a, b, &mut rand::thread_rng())?;
            if !progress.resolved {
                return Some(InteractionType::Argument);
            }
            let outcome = match progress.resolution {
                Some(Resolution::Reconciliation) => "they made up",
                Some(Resolution::Damage) | None => "it left a mark",
            };
            let explanation = format!("conflict over {} ended, {}", progress.scenario.topic, outcome);
            changes.push(self.apply(a, b, progress.relationship_change, explanation));
            return None;
        }

        let recent = self.history(a, b).len() as u32;
        let triggered = self
            .conflicts
            .should_trigger_conflict(a, b, strength, recent, &mut rand::thread_rng());
        if !triggered {
            return None;
        }
        self.conflicts.create_conflict(
            a,
            b,
            strength,
            (speaker.profession.as_str(), listener.profession.as_str()),
            &mut rand::thread_rng(),
        );
        Some(InteractionType::Conflict)
    }

    /// The listener's answer. Negative kinds get one stronger regeneration
    /// when the answer reads friendly, then a canned line; during a conflict
    /// the canned line comes from the conflict itself.
    async fn reply_line(
        &self,
        speaker: &Agent,
        listener: &Agent,
        kind: InteractionType,
        heard: &str,
        ctx: &ExchangeContext<'_>,
        conflict: Option<&ConflictScenario>,
    ) -> String {
        let fallback = || match conflict {
            Some(scenario) => scenario.canned_line(false, &mut rand::thread_rng()),
            None => canned::reply(kind, &mut rand::thread_rng()),
        };

        let band = ctx.band;
        let prompt = self.prompts.reply(speaker, listener, kind, heard, ctx, false);
        let Some(reply) = self.generate_line(prompt, band, "reply").await else {
            return fallback();
        };

        if !kind.is_negative() || has_negative_markers(&reply) {
            return reply;
        }

        log::debug!("{}'s {} reply read friendly, regenerating: {}", speaker.name, kind, reply);
        let prompt = self.prompts.reply(speaker, listener, kind, heard, ctx, true);
        match self.generate_line(prompt, band, "reply").await {
            Some(reply) if has_negative_markers(&reply) => reply,
            _ => {
                log::warn!("⚠️ {} would not stay in a {} mood, using canned line", speaker.name, kind);
                fallback()
            }
        }
    }

    /// What `owner` remembers that bears on `about`; a failed search means
    /// no memories
    async fn recall(&self, owner: &str, about: &str) -> Vec<String> {
        match self.memory.search(owner, about, self.config.memory_context).await {
            Ok(matches) => matches.into_iter().map(|m| m.record.content).collect(),
            Err(e) => {
                log::warn!("⚠️ Memory search for {} failed: {:#}", owner, e);
                Vec::new()
            }
        }
    }

    /// Generates, sanitizes and validates one line. One retry when the first
    /// result is degenerate; `None` means the caller should fall back.
    async fn generate_line(&self, prompt: String, band: (usize, usize), what: &str) -> Option<String> {
        let min_len = (band.0 / 3).max(2);

        for attempt in 0..2 {
            let prompt = if attempt == 0 {
                prompt.clone()
            } else {
                format!("{}\n\nYour last answer was empty or unusable. Say one specific, concrete sentence.", prompt)
            };

            match self.gate.generate(prompt, self.config.max_tokens, self.generation_timeout).await {
                Ok(raw) => {
                    let line = self.sanitizer.clean(&raw, band.1);
                    if !self.sanitizer.is_degenerate(&line, min_len) {
                        return Some(line);
                    }
                    log::debug!("Degenerate {} (attempt {}): {:?}", what, attempt + 1, raw);
                }
                Err(e) => {
                    log::warn!("⚠️ {} generation failed: {}", what, e);
                    return None;
                }
            }
        }
        None
    }

    fn conditions(
        &self,
        speaker: &Agent,
        listener: &Agent,
        kind: InteractionType,
        strength: i32,
        first_meeting: bool,
    ) -> Vec<&'static str> {
        let mut conditions = vec![catalog::SAME_LOCATION];
        if same_profession(speaker, listener) {
            conditions.push(catalog::SAME_PROFESSION);
        }
        if first_meeting {
            conditions.push(catalog::FIRST_INTERACTION);
            if kind == InteractionType::Misunderstanding {
                conditions.push(catalog::BAD_FIRST_IMPRESSION);
            }
        }
        if strength >= 60 {
            conditions.push(catalog::STRONG_BOND);
        }
        match self.town.category_of(&speaker.location) {
            Some(LocationCategory::Public) | Some(LocationCategory::Social) => conditions.push(catalog::PUBLIC_LOCATION),
            Some(LocationCategory::Private) => conditions.push(catalog::PRIVATE_LOCATION),
            _ => {}
        }
        conditions
    }

    fn apply(&self, a: &str, b: &str, delta: i32, explanation: String) -> RelationshipChange {
        let (old, new) = self.relationships.apply_delta(a, b, delta);
        RelationshipChange {
            agent_a: a.to_string(),
            agent_b: b.to_string(),
            old_strength: old,
            new_strength: new,
            old_level: classify(old),
            new_level: classify(new),
            explanation,
        }
    }
}

fn same_profession(a: &Agent, b: &Agent) -> bool {
    a.profession.eq_ignore_ascii_case(&b.profession)
}

/// Scales a delta by the pair's professional affinity, then by what the place
/// does for this kind of interaction
fn modulate(
    speaker: &Agent,
    listener: &Agent,
    location: &str,
    kind: InteractionType,
    delta: i32,
    mut explanation: String,
) -> (i32, String) {
    let mut delta = delta;

    let compatibility = catalog::profession_compatibility(&speaker.profession, &listener.profession);
    if (compatibility - 1.0).abs() > f64::EPSILON {
        delta = catalog::scale_delta(delta, compatibility, catalog::PROFESSION_MAX_RELIEF);
        explanation.push_str(&format!(" | professions ×{}", compatibility));
    }

    let effect = catalog::location_effect(location, kind.as_str());
    if (effect - 1.0).abs() > f64::EPSILON {
        delta = catalog::scale_delta(delta, effect, catalog::LOCATION_MAX_RELIEF);
        explanation.push_str(&format!(" | {} ×{}", location, effect));
    }

    (delta, explanation)
}
