//! Per-pair conflict state machine.
//!
//! A pair has at most one active conflict. Each staged exchange between the
//! pair moves it one turn closer to resolution; tension left behind by past
//! conflicts makes the next one more likely.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::relationship::PairKey;

const BASE_PROBABILITY: f64 = 0.15;
const MAX_PROBABILITY: f64 = 0.35;
const TENSION_RELIEF: f64 = 0.3;
const RECONCILIATION_CHANCE: f64 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Intensity {
    Mild,
    Moderate,
    Strong,
}

impl Intensity {
    fn index(&self) -> usize {
        match self {
            Intensity::Mild => 0,
            Intensity::Moderate => 1,
            Intensity::Strong => 2,
        }
    }

    fn base_resolution(&self) -> f64 {
        match self {
            Intensity::Mild => 0.8,
            Intensity::Moderate => 0.6,
            Intensity::Strong => 0.4,
        }
    }

    fn tension(&self) -> f64 {
        match self {
            Intensity::Mild => 0.2,
            Intensity::Moderate => 0.4,
            Intensity::Strong => 0.6,
        }
    }

    /// Strong bonds fall out harder; weak ones only bicker
    fn pick<R: Rng + ?Sized>(strength: i32, rng: &mut R) -> Self {
        let weighted: &[(Intensity, u32)] = if strength > 70 {
            &[(Intensity::Mild, 3), (Intensity::Moderate, 5), (Intensity::Strong, 2)]
        } else if strength > 40 {
            &[(Intensity::Mild, 5), (Intensity::Moderate, 4), (Intensity::Strong, 1)]
        } else {
            &[(Intensity::Mild, 7), (Intensity::Moderate, 3)]
        };

        weighted
            .choose_weighted(rng, |(_, weight)| *weight)
            .map(|(intensity, _)| *intensity)
            .unwrap_or(Intensity::Mild)
    }
}

impl fmt::Display for Intensity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Intensity::Mild => "mild",
            Intensity::Moderate => "moderate",
            Intensity::Strong => "strong",
        };
        f.write_str(name)
    }
}

struct ConflictTemplate {
    topic: &'static str,
    triggers: &'static [&'static str],
    /// Profession pairs with a built-in reason to clash
    profession_clashes: &'static [(&'static str, &'static str, &'static str)],
    /// (turns, relationship impact) for mild, moderate, strong
    intensity_table: [(u32, i32); 3],
}

impl ConflictTemplate {
    fn clash_for(&self, a: &str, b: &str) -> Option<&'static str> {
        self.profession_clashes
            .iter()
            .find(|(x, y, _)| (x.eq_ignore_ascii_case(a) && y.eq_ignore_ascii_case(b)) || (x.eq_ignore_ascii_case(b) && y.eq_ignore_ascii_case(a)))
            .map(|(_, _, reason)| *reason)
    }
}

const TEMPLATES: &[ConflictTemplate] = &[
    ConflictTemplate {
        topic: "how work should be done",
        triggers: &[
            "they see the problem from opposite ends",
            "one wants it fast, the other wants it right",
            "they disagree on how to work as a team",
            "nobody agrees on who is responsible for what",
        ],
        profession_clashes: &[
            ("programmer", "teacher", "the programmer chases efficiency while the teacher insists on process"),
            ("artist", "businessman", "the artist wants originality while the businessman wants something that sells"),
            ("doctor", "mechanic", "the doctor is careful while the mechanic just gets on with it"),
        ],
        intensity_table: [(2, -5), (4, -15), (6, -25)],
    },
    ConflictTemplate {
        topic: "where the town should be heading",
        triggers: &[
            "they weigh tradition against modernization differently",
            "they cannot agree on what comes first",
            "they argue over how community events are run",
            "they want the town's money spent on different things",
        ],
        profession_clashes: &[
            ("student", "retired", "the young want change while the old want things kept"),
            ("chef", "doctor", "the chef goes by feel while the doctor goes by evidence"),
            ("artist", "engineer", "the artist dreams while the engineer counts the cost"),
        ],
        intensity_table: [(3, -8), (5, -18), (7, -30)],
    },
    ConflictTemplate {
        topic: "how to live a good life",
        triggers: &[
            "they balance work and life very differently",
            "they spend their free time in opposite ways",
            "one takes risks the other would never take",
            "they disagree on how much company a person needs",
        ],
        profession_clashes: &[
            ("programmer", "chef", "the programmer likes quiet while the chef loves a crowd"),
            ("businessman", "artist", "the businessman wants success while the artist wants expression"),
            ("teacher", "mechanic", "the teacher is patient while the mechanic wants results now"),
        ],
        intensity_table: [(2, -6), (4, -16), (5, -28)],
    },
    ConflictTemplate {
        topic: "what matters most",
        triggers: &[
            "they have a basic disagreement about priorities",
            "their moral lines sit in different places",
            "they define success differently",
            "their principles keep rubbing against each other",
        ],
        profession_clashes: &[
            ("doctor", "businessman", "the doctor puts health first while the businessman puts profit first"),
            ("teacher", "artist", "the teacher values rules while the artist values freedom"),
            ("student", "mechanic", "the student trusts theory while the mechanic trusts practice"),
        ],
        intensity_table: [(3, -7), (5, -17), (6, -27)],
    },
    ConflictTemplate {
        topic: "how they talk to each other",
        triggers: &[
            "something was said the wrong way",
            "they expect different things from a conversation",
            "they clash over how to talk a problem through",
            "their temperaments get in the way",
        ],
        profession_clashes: &[
            ("retired", "student", "the elder shares stories while the youngster wants to move on"),
            ("chef", "programmer", "the chef speaks from the heart while the programmer analyzes"),
            ("mechanic", "teacher", "the mechanic is blunt while the teacher is tactful"),
        ],
        intensity_table: [(2, -4), (3, -12), (4, -20)],
    },
    ConflictTemplate {
        topic: "who gets time and resources",
        triggers: &[
            "they rank the use of scarce resources differently",
            "they disagree on where time should go",
            "they see duties and obligations differently",
            "personal needs collide with the common good",
        ],
        profession_clashes: &[
            ("businessman", "teacher", "the businessman values efficiency while the teacher values fairness"),
            ("artist", "doctor", "the artist guards studio time while the doctor gives time to patients"),
            ("engineer", "chef", "the engineer invests in tools while the chef invests in people"),
        ],
        intensity_table: [(3, -6), (4, -14), (5, -24)],
    },
];

#[derive(Debug, Clone, Serialize)]
pub struct ConflictScenario {
    pub topic: String,
    pub trigger: String,
    pub intensity: Intensity,
    pub remaining_turns: u32,
    pub resolution_probability: f64,
    /// Negative strength change the conflict threatens if it ends badly
    pub relationship_impact: i32,
}

impl ConflictScenario {
    /// One-sentence summary used in prompts
    pub fn context(&self) -> String {
        format!(
            "They are in a {} disagreement about {}: {}.",
            self.intensity, self.topic, self.trigger
        )
    }

    /// A canned line for when a model cannot voice the conflict
    pub fn canned_line<R: Rng + ?Sized>(&self, initiator: bool, rng: &mut R) -> String {
        let options: Vec<String> = match (self.intensity, initiator) {
            (Intensity::Mild, true) => vec![
                format!("About {}, I see it a bit differently.", self.topic),
                "I'm not sure I agree with doing it that way.".to_string(),
            ],
            (Intensity::Mild, false) => vec![
                "I hear you, but I disagree a little.".to_string(),
                "Hmm, that's not true the way I see it.".to_string(),
            ],
            (Intensity::Moderate, true) => vec![
                format!("Honestly, we're far apart on {}.", self.topic),
                "Sorry, but I can't go along with that.".to_string(),
            ],
            (Intensity::Moderate, false) => vec![
                "I disagree. You're not seeing the whole picture.".to_string(),
                "Honestly, it's frustrating that you keep pushing this.".to_string(),
            ],
            (Intensity::Strong, true) => vec![
                format!("I'm really disappointed in how you handled {}.", self.topic),
                "I just can't understand what you were thinking.".to_string(),
            ],
            (Intensity::Strong, false) => vec![
                "I'm sorry you're upset, but I had my reasons.".to_string(),
                "Whatever. You're overreacting, and I stand by it.".to_string(),
            ],
        };
        options
            .choose(rng)
            .cloned()
            .unwrap_or_else(|| "I don't agree.".to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    Reconciliation,
    Damage,
}

/// Outcome of advancing a conflict by one turn
#[derive(Debug, Clone, Serialize)]
pub struct ConflictProgress {
    pub scenario: ConflictScenario,
    pub resolved: bool,
    pub resolution: Option<Resolution>,
    /// Strength change to apply when the conflict resolved this turn
    pub relationship_change: i32,
}

/// Pure trigger probability, capped at 0.35
pub fn trigger_probability(strength: i32, recent_interactions: u32, tension: f64) -> f64 {
    let mut probability = BASE_PROBABILITY;

    if strength > 70 {
        probability *= 1.8;
    } else if strength > 40 && strength < 70 {
        probability *= 1.3;
    }
    if recent_interactions > 5 {
        probability *= 1.5;
    }
    if tension > 0.3 {
        probability *= 2.0;
    }

    probability.min(MAX_PROBABILITY)
}

#[derive(Default)]
struct ConflictState {
    active: HashMap<PairKey, ConflictScenario>,
    tension: HashMap<PairKey, f64>,
}

/// Active conflicts and leftover tension, behind one lock
#[derive(Default)]
pub struct ConflictTracker {
    state: Mutex<ConflictState>,
}

impl ConflictTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, ConflictState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Rolls for a new conflict. Always false while one is already running.
    pub fn should_trigger_conflict<R: Rng + ?Sized>(
        &self,
        a: &str,
        b: &str,
        strength: i32,
        recent_interactions: u32,
        rng: &mut R,
    ) -> bool {
        let key = PairKey::new(a, b);
        let tension = {
            let state = self.state();
            if state.active.contains_key(&key) {
                return false;
            }
            state.tension.get(&key).copied().unwrap_or(0.0)
        };

        let probability = trigger_probability(strength, recent_interactions, tension);
        let triggered = rng.gen_bool(probability);
        if triggered {
            log::debug!("Conflict triggered for {} (p={:.2})", key, probability);
        }
        triggered
    }

    /// Starts a conflict between the pair. An already active one is returned
    /// unchanged.
    pub fn create_conflict<R: Rng + ?Sized>(
        &self,
        a: &str,
        b: &str,
        strength: i32,
        professions: (&str, &str),
        rng: &mut R,
    ) -> ConflictScenario {
        if let Some(existing) = self.active(a, b) {
            return existing;
        }

        let (template, clash) = select_template(professions, rng);
        let intensity = Intensity::pick(strength, rng);
        let (turns, impact) = template.intensity_table[intensity.index()];
        let trigger = clash
            .or_else(|| template.triggers.choose(rng).copied())
            .unwrap_or("they simply see things differently");

        let scenario = ConflictScenario {
            topic: template.topic.to_string(),
            trigger: trigger.to_string(),
            intensity,
            remaining_turns: turns,
            resolution_probability: (intensity.base_resolution() + strength as f64 / 100.0 * 0.3).min(0.95),
            relationship_impact: impact,
        };
        self.start(a, b, scenario)
    }

    /// Makes `scenario` the pair's active conflict and raises their tension.
    /// A conflict that is already running wins and is returned instead.
    pub fn start(&self, a: &str, b: &str, scenario: ConflictScenario) -> ConflictScenario {
        let key = PairKey::new(a, b);
        let mut state = self.state();
        if let Some(existing) = state.active.get(&key) {
            return existing.clone();
        }

        let tension = state.tension.entry(key.clone()).or_insert(0.0);
        *tension = (*tension + scenario.intensity.tension()).min(1.0);
        state.active.insert(key.clone(), scenario.clone());

        log::info!("⚡ Conflict: {} over '{}' ({})", key, scenario.topic, scenario.intensity);
        scenario
    }

    /// Advances the pair's conflict by one turn, resolving it when the turns
    /// run out or the resolution roll succeeds.
    pub fn update_conflict_progress<R: Rng + ?Sized>(&self, a: &str, b: &str, rng: &mut R) -> Option<ConflictProgress> {
        let key = PairKey::new(a, b);
        let mut state = self.state();
        let scenario = state.active.get_mut(&key)?;

        scenario.remaining_turns = scenario.remaining_turns.saturating_sub(1);
        let resolved = scenario.remaining_turns == 0 || rng.gen_bool(scenario.resolution_probability.clamp(0.0, 1.0));

        if !resolved {
            return Some(ConflictProgress {
                scenario: scenario.clone(),
                resolved: false,
                resolution: None,
                relationship_change: 0,
            });
        }

        let scenario = state.active.remove(&key)?;
        let (resolution, change) = if rng.gen_bool(RECONCILIATION_CHANCE) {
            (Resolution::Reconciliation, rng.gen_range(3..=8))
        } else {
            (Resolution::Damage, scenario.relationship_impact / 2)
        };

        if let Some(tension) = state.tension.get_mut(&key) {
            *tension = (*tension - TENSION_RELIEF).max(0.0);
        }

        log::info!("🕊️ Conflict over '{}' resolved for {}: {:?} ({:+})", scenario.topic, key, resolution, change);
        Some(ConflictProgress {
            scenario,
            resolved: true,
            resolution: Some(resolution),
            relationship_change: change,
        })
    }

    pub fn active(&self, a: &str, b: &str) -> Option<ConflictScenario> {
        self.state().active.get(&PairKey::new(a, b)).cloned()
    }

    pub fn has_active_conflict(&self, a: &str, b: &str) -> bool {
        self.state().active.contains_key(&PairKey::new(a, b))
    }

    pub fn tension(&self, a: &str, b: &str) -> f64 {
        self.state().tension.get(&PairKey::new(a, b)).copied().unwrap_or(0.0)
    }

    pub fn active_count(&self) -> usize {
        self.state().active.len()
    }
}

fn select_template<R: Rng + ?Sized>(
    professions: (&str, &str),
    rng: &mut R,
) -> (&'static ConflictTemplate, Option<&'static str>) {
    let matching: Vec<(&'static ConflictTemplate, &'static str)> = TEMPLATES
        .iter()
        .filter_map(|template| template.clash_for(professions.0, professions.1).map(|clash| (template, clash)))
        .collect();

    if let Some((template, clash)) = matching.choose(rng) {
        return (*template, Some(*clash));
    }

    let index = rng.gen_range(0..TEMPLATES.len());
    (&TEMPLATES[index], None)
}
