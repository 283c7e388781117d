//! Pairwise relationship strengths.
//!
//! Strength lives in [0, 100] and is stored once per unordered pair, so reads
//! from either side always agree. Pairs are created lazily and never removed.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::config::{DecayConfig, LevelFactors, RelationshipConfig};
use crate::traits::RelationshipStore;

pub const MIN_STRENGTH: i32 = 0;
pub const MAX_STRENGTH: i32 = 100;

/// `{a: {b: strength}}`, written in both directions
pub type RelationshipSnapshot = BTreeMap<String, BTreeMap<String, i32>>;

/// Unordered pair of agent names, stored in sorted order
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PairKey(String, String);

impl PairKey {
    pub fn new(a: &str, b: &str) -> Self {
        if a <= b {
            Self(a.to_string(), b.to_string())
        } else {
            Self(b.to_string(), a.to_string())
        }
    }

    pub fn first(&self) -> &str {
        &self.0
    }

    pub fn second(&self) -> &str {
        &self.1
    }
}

impl fmt::Display for PairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ↔ {}", self.0, self.1)
    }
}

/// Six contiguous bands over relationship strength
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipLevel {
    Hostile,
    Stranger,
    Acquaintance,
    Familiar,
    CloseFriend,
    Intimate,
}

/// Maps a strength onto its level. Total over all of `i32`.
pub fn classify(strength: i32) -> RelationshipLevel {
    match strength {
        i32::MIN..=-1 => RelationshipLevel::Hostile,
        0..=20 => RelationshipLevel::Stranger,
        21..=40 => RelationshipLevel::Acquaintance,
        41..=60 => RelationshipLevel::Familiar,
        61..=80 => RelationshipLevel::CloseFriend,
        _ => RelationshipLevel::Intimate,
    }
}

impl RelationshipLevel {
    pub fn emoji(&self) -> &'static str {
        match self {
            RelationshipLevel::Hostile => "😠",
            RelationshipLevel::Stranger => "😐",
            RelationshipLevel::Acquaintance => "🙂",
            RelationshipLevel::Familiar => "😊",
            RelationshipLevel::CloseFriend => "😄",
            RelationshipLevel::Intimate => "🥰",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            RelationshipLevel::Hostile => "on bad terms, clash often",
            RelationshipLevel::Stranger => "barely know each other",
            RelationshipLevel::Acquaintance => "have talked a few times",
            RelationshipLevel::Familiar => "know each other well enough to chat",
            RelationshipLevel::CloseFriend => "good friends who talk often",
            RelationshipLevel::Intimate => "can tell each other anything",
        }
    }

    fn decay_factor(&self, factors: &LevelFactors) -> f64 {
        match self {
            RelationshipLevel::Hostile => 0.0,
            RelationshipLevel::Stranger => factors.stranger,
            RelationshipLevel::Acquaintance => factors.acquaintance,
            RelationshipLevel::Familiar => factors.familiar,
            RelationshipLevel::CloseFriend => factors.close_friend,
            RelationshipLevel::Intimate => factors.intimate,
        }
    }
}

impl fmt::Display for RelationshipLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RelationshipLevel::Hostile => "hostile",
            RelationshipLevel::Stranger => "stranger",
            RelationshipLevel::Acquaintance => "acquaintance",
            RelationshipLevel::Familiar => "familiar",
            RelationshipLevel::CloseFriend => "close friend",
            RelationshipLevel::Intimate => "intimate",
        };
        f.write_str(name)
    }
}

/// Coarse warmth used to pick utterance lengths and canned lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    Cold,
    Neutral,
    Warm,
}

impl Tier {
    pub fn from_strength(strength: i32) -> Self {
        if strength < 30 {
            Tier::Cold
        } else if strength < 60 {
            Tier::Neutral
        } else {
            Tier::Warm
        }
    }

    /// (min, max) characters for a generated line; colder pairs talk less
    pub fn length_band(&self) -> (usize, usize) {
        match self {
            Tier::Cold => (15, 60),
            Tier::Neutral => (20, 100),
            Tier::Warm => (30, 140),
        }
    }
}

#[derive(Debug, Clone)]
struct PairState {
    strength: i32,
    last_decay: DateTime<Utc>,
    /// Fraction of a point owed by earlier decay passes
    decay_carry: f64,
    last_interaction: Option<DateTime<Utc>>,
    interactions: u32,
}

impl PairState {
    fn new(strength: i32, now: DateTime<Utc>) -> Self {
        Self {
            strength,
            last_decay: now,
            decay_carry: 0.0,
            last_interaction: None,
            interactions: 0,
        }
    }
}

/// In-process relationship store guarded by a single table-wide lock
pub struct RelationshipTable {
    config: RelationshipConfig,
    pairs: Mutex<HashMap<PairKey, PairState>>,
}

impl RelationshipTable {
    pub fn new(config: RelationshipConfig) -> Self {
        Self {
            config,
            pairs: Mutex::new(HashMap::new()),
        }
    }

    fn pairs(&self) -> MutexGuard<'_, HashMap<PairKey, PairState>> {
        self.pairs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn default_strength(&self) -> i32 {
        self.config.default_strength.clamp(MIN_STRENGTH, MAX_STRENGTH)
    }

    /// Whether the pair has ever been written
    pub fn contains(&self, a: &str, b: &str) -> bool {
        self.pairs().contains_key(&PairKey::new(a, b))
    }

    pub fn len(&self) -> usize {
        self.pairs().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Decay with an explicit random source
    pub fn decay_tick_with<R: Rng + ?Sized>(&self, now: DateTime<Utc>, rng: &mut R) {
        let decay = &self.config.decay;
        if !decay.enabled {
            return;
        }

        let interval = decay.interval();
        let mut pairs = self.pairs();
        for (key, state) in pairs.iter_mut() {
            if state.strength <= decay.floor {
                continue;
            }

            let elapsed = now - state.last_decay;
            if elapsed < interval {
                continue;
            }

            // Each due interval is evaluated once: drift is rolled here and
            // the fractional part is carried to the next pass.
            let owed = steady_decay(decay, state.strength, elapsed) + state.decay_carry;
            let drift = drift_roll(decay, rng);
            state.last_decay = now;
            state.decay_carry = owed.fract();

            let whole = owed.trunc() as i32 + drift;
            if whole <= 0 {
                continue;
            }

            let new_strength = (state.strength - whole).max(decay.floor);
            log::debug!(
                "Relationship decay {}: {} → {} (owed {:.2}, drift {})",
                key,
                state.strength,
                new_strength,
                owed,
                drift
            );
            state.strength = new_strength;
            if new_strength <= decay.floor {
                state.decay_carry = 0.0;
            }
        }
    }

    /// Interaction count recorded for the pair so far
    pub fn interaction_count(&self, a: &str, b: &str) -> u32 {
        self.pairs()
            .get(&PairKey::new(a, b))
            .map(|state| state.interactions)
            .unwrap_or(0)
    }
}

impl Default for RelationshipTable {
    fn default() -> Self {
        Self::new(RelationshipConfig::default())
    }
}

fn steady_decay(decay: &DecayConfig, strength: i32, elapsed: chrono::Duration) -> f64 {
    let days = elapsed.num_seconds() as f64 / 86_400.0;
    let factor = classify(strength).decay_factor(&decay.level_factors);
    (decay.daily_rate * factor * days).max(0.0)
}

/// Whole points of random drift for one decay pass
fn drift_roll<R: Rng + ?Sized>(decay: &DecayConfig, rng: &mut R) -> i32 {
    if rng.gen_bool(decay.drift_probability.clamp(0.0, 1.0)) {
        rng.gen_range(0..=decay.drift_max.max(0))
    } else {
        0
    }
}

impl RelationshipStore for RelationshipTable {
    fn get(&self, a: &str, b: &str) -> i32 {
        self.pairs()
            .get(&PairKey::new(a, b))
            .map(|state| state.strength)
            .unwrap_or_else(|| self.default_strength())
    }

    fn set(&self, a: &str, b: &str, value: i32) {
        let value = value.clamp(MIN_STRENGTH, MAX_STRENGTH);
        self.pairs()
            .entry(PairKey::new(a, b))
            .and_modify(|state| state.strength = value)
            .or_insert_with(|| PairState::new(value, Utc::now()));
    }

    fn apply_delta(&self, a: &str, b: &str, delta: i32) -> (i32, i32) {
        let default = self.default_strength();
        let mut pairs = self.pairs();
        let state = pairs
            .entry(PairKey::new(a, b))
            .or_insert_with(|| PairState::new(default, Utc::now()));

        let old = state.strength;
        state.strength = old.saturating_add(delta).clamp(MIN_STRENGTH, MAX_STRENGTH);
        (old, state.strength)
    }

    fn decay_tick(&self, now: DateTime<Utc>) {
        self.decay_tick_with(now, &mut rand::thread_rng());
    }

    fn claim_interaction(&self, a: &str, b: &str, now: DateTime<Utc>, window: chrono::Duration) -> Option<u32> {
        let default = self.default_strength();
        let mut pairs = self.pairs();
        let state = pairs
            .entry(PairKey::new(a, b))
            .or_insert_with(|| PairState::new(default, now));

        if let Some(last) = state.last_interaction {
            if now - last < window {
                return None;
            }
        }

        let previous = state.interactions;
        state.last_interaction = Some(now);
        state.interactions += 1;
        Some(previous)
    }

    fn snapshot(&self) -> RelationshipSnapshot {
        let mut snapshot = RelationshipSnapshot::new();
        for (key, state) in self.pairs().iter() {
            snapshot
                .entry(key.first().to_string())
                .or_default()
                .insert(key.second().to_string(), state.strength);
            snapshot
                .entry(key.second().to_string())
                .or_default()
                .insert(key.first().to_string(), state.strength);
        }
        snapshot
    }

    fn restore(&self, snapshot: &RelationshipSnapshot) {
        let now = Utc::now();
        let mut seen = HashSet::new();
        let mut pairs = self.pairs();

        // When the two directions disagree the row visited first wins
        for (a, row) in snapshot {
            for (b, strength) in row {
                if a == b {
                    continue;
                }
                let key = PairKey::new(a, b);
                if !seen.insert(key.clone()) {
                    continue;
                }
                let strength = (*strength).clamp(MIN_STRENGTH, MAX_STRENGTH);
                pairs
                    .entry(key)
                    .and_modify(|state| state.strength = strength)
                    .or_insert_with(|| PairState::new(strength, now));
            }
        }
        log::info!("🤝 Restored {} relationships", seen.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn no_drift_table() -> RelationshipTable {
        let mut config = RelationshipConfig::default();
        config.decay.drift_probability = 0.0;
        RelationshipTable::new(config)
    }

    #[test]
    fn unknown_pair_reads_neutral() {
        let table = RelationshipTable::default();
        assert_eq!(table.get("alice", "bob"), 50);
        assert!(!table.contains("alice", "bob"));
    }

    #[test]
    fn classify_band_edges() {
        assert_eq!(classify(-1), RelationshipLevel::Hostile);
        assert_eq!(classify(0), RelationshipLevel::Stranger);
        assert_eq!(classify(20), RelationshipLevel::Stranger);
        assert_eq!(classify(21), RelationshipLevel::Acquaintance);
        assert_eq!(classify(40), RelationshipLevel::Acquaintance);
        assert_eq!(classify(41), RelationshipLevel::Familiar);
        assert_eq!(classify(60), RelationshipLevel::Familiar);
        assert_eq!(classify(61), RelationshipLevel::CloseFriend);
        assert_eq!(classify(80), RelationshipLevel::CloseFriend);
        assert_eq!(classify(81), RelationshipLevel::Intimate);
        assert_eq!(classify(100), RelationshipLevel::Intimate);
    }

    #[test]
    fn bands_are_monotonic_over_range() {
        let mut previous = classify(0);
        for strength in 1..=100 {
            let level = classify(strength);
            assert!(level >= previous, "level went down at {}", strength);
            previous = level;
        }
    }

    #[test]
    fn apply_delta_is_symmetric_and_clamped() {
        let table = RelationshipTable::default();
        let (old, new) = table.apply_delta("alice", "bob", 70);
        assert_eq!((old, new), (50, 100));
        assert_eq!(table.get("bob", "alice"), 100);

        let (old, new) = table.apply_delta("bob", "alice", -250);
        assert_eq!((old, new), (100, 0));
        assert_eq!(table.get("alice", "bob"), 0);
    }

    #[test]
    fn set_clamps() {
        let table = RelationshipTable::default();
        table.set("alice", "bob", 140);
        assert_eq!(table.get("bob", "alice"), 100);
        table.set("alice", "bob", -3);
        assert_eq!(table.get("alice", "bob"), 0);
    }

    #[test]
    fn decay_waits_for_interval() {
        let table = no_drift_table();
        table.set("alice", "bob", 80);
        let mut rng = StdRng::seed_from_u64(7);

        table.decay_tick_with(Utc::now() + chrono::Duration::seconds(60), &mut rng);
        assert_eq!(table.get("alice", "bob"), 80);
    }

    #[test]
    fn decay_respects_floor_and_is_idempotent() {
        let table = no_drift_table();
        table.set("alice", "bob", 25);
        let mut rng = StdRng::seed_from_u64(7);

        // 40 days at the acquaintance rate is plenty to hit the floor
        let later = Utc::now() + chrono::Duration::days(40);
        table.decay_tick_with(later, &mut rng);
        assert_eq!(table.get("alice", "bob"), 20);

        table.decay_tick_with(later, &mut rng);
        assert_eq!(table.get("alice", "bob"), 20);
    }

    #[test]
    fn decay_applied_once_per_interval() {
        let table = no_drift_table();
        table.set("alice", "bob", 90);
        let mut rng = StdRng::seed_from_u64(1);

        // intimate: 0.5 * 0.4 * 10 days = 2 points
        let later = Utc::now() + chrono::Duration::days(10);
        table.decay_tick_with(later, &mut rng);
        assert_eq!(table.get("alice", "bob"), 88);

        table.decay_tick_with(later, &mut rng);
        assert_eq!(table.get("alice", "bob"), 88);
    }

    #[test]
    fn fractional_decay_accumulates_instead_of_vanishing() {
        let table = no_drift_table();
        table.set("alice", "bob", 70);
        let mut rng = StdRng::seed_from_u64(3);
        let start = Utc::now();

        // close friend: 0.35 points a day, nothing whole after one day
        table.decay_tick_with(start + chrono::Duration::days(1), &mut rng);
        assert_eq!(table.get("alice", "bob"), 70);

        // the 0.35 carried over plus two more days makes a whole point
        table.decay_tick_with(start + chrono::Duration::days(3), &mut rng);
        assert_eq!(table.get("alice", "bob"), 69);
    }

    #[test]
    fn frequent_ticks_lose_no_steady_decay() {
        let table = no_drift_table();
        table.set("alice", "bob", 70);
        let mut rng = StdRng::seed_from_u64(5);
        let start = Utc::now();

        // a check every minute for three days still owes 1.05 points
        for minute in 1..=3 * 24 * 60 {
            table.decay_tick_with(start + chrono::Duration::minutes(minute), &mut rng);
        }
        assert_eq!(table.get("alice", "bob"), 69);
    }

    #[test]
    fn drift_is_rolled_once_per_interval_at_scheduler_cadence() {
        let table = RelationshipTable::default();
        table.set("alice", "bob", 95);
        let mut rng = StdRng::seed_from_u64(29);
        let start = Utc::now();

        // Six hours of one-second ticks is 36 drift rolls: on average about
        // eight points, far from the 70 that rolling on every tick would cost.
        for second in 1..=6 * 60 * 60 {
            table.decay_tick_with(start + chrono::Duration::seconds(second), &mut rng);
        }
        let strength = table.get("alice", "bob");
        assert!(strength >= 75, "strength fell to {}", strength);
    }

    #[test]
    fn pairs_at_floor_never_drift() {
        let mut config = RelationshipConfig::default();
        config.decay.drift_probability = 1.0;
        let table = RelationshipTable::new(config);
        table.set("alice", "bob", 20);
        table.set("alice", "carol", 10);
        let mut rng = StdRng::seed_from_u64(11);

        table.decay_tick_with(Utc::now() + chrono::Duration::days(5), &mut rng);
        assert_eq!(table.get("alice", "bob"), 20);
        assert_eq!(table.get("alice", "carol"), 10);
    }

    #[test]
    fn claim_interaction_throttles_within_window() {
        let table = RelationshipTable::default();
        let now = Utc::now();
        let window = chrono::Duration::seconds(8);

        assert_eq!(table.claim_interaction("alice", "bob", now, window), Some(0));
        assert_eq!(table.claim_interaction("bob", "alice", now + chrono::Duration::seconds(3), window), None);
        assert_eq!(table.claim_interaction("alice", "bob", now + chrono::Duration::seconds(9), window), Some(1));
        assert_eq!(table.interaction_count("alice", "bob"), 2);
        // Claiming creates the pair at neutral strength
        assert_eq!(table.get("alice", "bob"), 50);
    }

    #[test]
    fn snapshot_round_trip() {
        let table = RelationshipTable::default();
        table.set("alice", "bob", 72);
        table.set("carol", "alice", 15);

        let snapshot = table.snapshot();
        assert_eq!(snapshot["alice"]["bob"], 72);
        assert_eq!(snapshot["bob"]["alice"], 72);
        assert_eq!(snapshot["alice"]["carol"], 15);

        let restored = RelationshipTable::default();
        restored.restore(&snapshot);
        assert_eq!(restored.get("bob", "alice"), 72);
        assert_eq!(restored.get("alice", "carol"), 15);
        assert_eq!(restored.len(), 2);
    }

    #[test]
    fn restore_clamps_and_skips_self_pairs() {
        let mut snapshot = RelationshipSnapshot::new();
        snapshot.entry("alice".into()).or_default().insert("alice".into(), 90);
        snapshot.entry("alice".into()).or_default().insert("bob".into(), 400);

        let table = RelationshipTable::default();
        table.restore(&snapshot);
        assert_eq!(table.len(), 1);
        assert_eq!(table.get("alice", "bob"), 100);
    }

    #[test]
    fn tiers_and_bands() {
        assert_eq!(Tier::from_strength(10), Tier::Cold);
        assert_eq!(Tier::from_strength(45), Tier::Neutral);
        assert_eq!(Tier::from_strength(85), Tier::Warm);
        assert!(Tier::Cold.length_band().1 < Tier::Warm.length_band().1);
    }
}
