use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Default preamble placed at the top of every prompt
pub const PREAMBLE_DEFAULT: &str = r#"You are a resident of a small town, speaking as yourself in everyday conversation.

Rules:
- Reply with exactly what you say out loud, nothing else.
- No stage directions, no narration, no quotation marks, no name labels.
- Stay in character; never mention being an AI or a model.
- Write in English."#;

/// Topics a group discussion can open with
pub const GROUP_TOPICS: &[&str] = &[
    "the town fair next weekend",
    "the new menu at the cafe",
    "whether the park needs more benches",
    "the rainy weather this week",
    "a book everyone seems to be reading",
    "the rumor about a new shop opening",
    "how busy work has been lately",
    "plans for the holidays",
];

/// How a profession talks and what it does with its time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfessionTemplate {
    pub profession: String,
    pub traits: Vec<String>,
    pub speaking_style: String,
    pub work_activities: Vec<String>,
    pub relax_activities: Vec<String>,
}

impl ProfessionTemplate {
    fn new(profession: &str, traits: &[&str], speaking_style: &str, work: &[&str], relax: &[&str]) -> Self {
        Self {
            profession: profession.to_string(),
            traits: traits.iter().map(|t| t.to_string()).collect(),
            speaking_style: speaking_style.to_string(),
            work_activities: work.iter().map(|w| w.to_string()).collect(),
            relax_activities: relax.iter().map(|r| r.to_string()).collect(),
        }
    }

    /// Used for professions the registry does not know
    pub fn generic(profession: &str) -> Self {
        Self::new(
            profession,
            &["friendly", "down to earth"],
            "plain and natural",
            &["getting some work done", "tidying up loose ends"],
            &["taking a walk", "enjoying a cup of tea", "sitting in the sun"],
        )
    }

    /// The nine built-in professions
    pub fn builtin() -> Vec<Self> {
        vec![
            Self::new(
                "programmer",
                &["introverted", "logical", "enjoys thinking things through alone"],
                "short, precise, the occasional technical term",
                &["writing code", "testing a program", "fixing a bug", "tuning performance"],
                &["reading a tech blog", "going for a quiet walk", "playing a puzzle game"],
            ),
            Self::new(
                "artist",
                &["outgoing", "emotional", "creative"],
                "vivid and passionate, full of images",
                &["painting", "sketching a design", "mixing colors", "studying composition"],
                &["visiting the park for inspiration", "listening to music", "people-watching"],
            ),
            Self::new(
                "teacher",
                &["patient", "responsible", "caring"],
                "clear and encouraging, likes to explain",
                &["preparing a lesson", "grading homework", "making slides", "reading about teaching"],
                &["reading a novel", "having tea", "gardening"],
            ),
            Self::new(
                "doctor",
                &["rigorous", "compassionate", "safety-minded"],
                "calm and careful, a little formal",
                &["reviewing patient files", "making a diagnosis", "planning a treatment", "reading medical journals"],
                &["taking a walk", "stretching", "a quiet coffee"],
            ),
            Self::new(
                "student",
                &["curious", "lively", "eager to learn"],
                "energetic, asks lots of questions",
                &["doing homework", "reviewing notes", "reading ahead", "studying for an exam"],
                &["chatting online", "listening to music", "lying in the grass"],
            ),
            Self::new(
                "businessman",
                &["shrewd", "ambitious", "sociable"],
                "confident and persuasive, talks numbers",
                &["analyzing reports", "calling clients", "drafting a plan", "doing market research"],
                &["reading the paper", "a long lunch", "a round of golf talk"],
            ),
            Self::new(
                "chef",
                &["warm", "creative", "opinionated about food"],
                "lively and sensory, talks about flavors",
                &["prepping ingredients", "cooking a dish", "testing a new recipe", "cleaning the kitchen"],
                &["visiting the market", "tasting street food", "a nap in the afternoon"],
            ),
            Self::new(
                "mechanic",
                &["practical", "hands-on", "straightforward"],
                "blunt and plain spoken",
                &["inspecting equipment", "replacing parts", "tuning a machine", "maintaining tools"],
                &["tinkering at home", "a cold drink", "watching the game"],
            ),
            Self::new(
                "retired",
                &["kind", "wise", "full of stories"],
                "gentle and unhurried, fond of anecdotes",
                &["tidying the house", "reading", "gardening", "exercising"],
                &["feeding the birds", "a long walk", "sitting on a bench in the sun"],
            ),
        ]
    }
}

/// Profession templates keyed by lowercase profession name
#[derive(Debug, Clone)]
pub struct TemplateRegistry {
    templates: HashMap<String, ProfessionTemplate>,
}

impl TemplateRegistry {
    pub fn new(templates: impl IntoIterator<Item = ProfessionTemplate>) -> Self {
        let mut registry = Self {
            templates: HashMap::new(),
        };
        registry.extend(templates);
        registry
    }

    /// Adds templates, replacing any with the same profession
    pub fn extend(&mut self, templates: impl IntoIterator<Item = ProfessionTemplate>) {
        for template in templates {
            self.templates.insert(template.profession.to_lowercase(), template);
        }
    }

    pub fn get(&self, profession: &str) -> Option<&ProfessionTemplate> {
        self.templates.get(&profession.to_lowercase())
    }

    /// Known template or a generic one for `profession`
    pub fn get_or_generic(&self, profession: &str) -> ProfessionTemplate {
        self.get(profession)
            .cloned()
            .unwrap_or_else(|| ProfessionTemplate::generic(profession))
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

impl Default for TemplateRegistry {
    fn default() -> Self {
        Self::new(ProfessionTemplate::builtin())
    }
}
