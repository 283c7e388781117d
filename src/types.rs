use serde::{Deserialize, Serialize};
use std::fmt;

use crate::relationship::RelationshipLevel;

pub type AgentId = String;

/// A town resident with the runtime state the simulation mutates
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub name: AgentId,
    pub profession: String,
    pub location: String,
    pub mood: Mood,
    pub energy: i32,
    pub last_action: Option<ActionType>,
}

impl Agent {
    /// Creates an agent at full-ish energy and a calm mood
    pub fn new(name: impl Into<String>, profession: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            profession: profession.into(),
            location: location.into(),
            mood: Mood::Calm,
            energy: 80,
            last_action: None,
        }
    }

    pub fn with_energy(mut self, energy: i32) -> Self {
        self.energy = energy.clamp(0, 100);
        self
    }

    pub fn with_mood(mut self, mood: Mood) -> Self {
        self.mood = mood;
        self
    }

    /// Adds `delta` to energy, keeping it in [0, 100]
    pub fn adjust_energy(&mut self, delta: i32) {
        self.energy = (self.energy + delta).clamp(0, 100);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mood {
    Happy,
    Calm,
    Tired,
    Excited,
    Thoughtful,
    Focused,
    Anxious,
    Bored,
    Curious,
}

impl Mood {
    /// Moods that a rest should lift
    pub fn is_strained(&self) -> bool {
        matches!(self, Mood::Tired | Mood::Anxious | Mood::Bored)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Mood::Happy => "happy",
            Mood::Calm => "calm",
            Mood::Tired => "tired",
            Mood::Excited => "excited",
            Mood::Thoughtful => "thoughtful",
            Mood::Focused => "focused",
            Mood::Anxious => "anxious",
            Mood::Bored => "bored",
            Mood::Curious => "curious",
        }
    }
}

impl fmt::Display for Mood {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the scheduler can make an agent do on a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Social,
    GroupDiscussion,
    Move,
    Think,
    Work,
    Relax,
}

impl ActionType {
    pub const ALL: [ActionType; 6] = [
        ActionType::Social,
        ActionType::GroupDiscussion,
        ActionType::Move,
        ActionType::Think,
        ActionType::Work,
        ActionType::Relax,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Social => "social",
            ActionType::GroupDiscussion => "group_discussion",
            ActionType::Move => "move",
            ActionType::Think => "think",
            ActionType::Work => "work",
            ActionType::Relax => "relax",
        }
    }

    /// Actions that need somebody else at the same location
    pub fn is_social(&self) -> bool {
        matches!(self, ActionType::Social | ActionType::GroupDiscussion)
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationCategory {
    /// Offices, workshops
    Work,
    /// Parks and other places to unwind
    Leisure,
    /// Cafes, libraries
    Social,
    /// Streets, squares, restaurants
    Public,
    /// Homes
    Private,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Location {
    pub name: String,
    pub category: LocationCategory,
}

impl Location {
    pub fn new(name: impl Into<String>, category: LocationCategory) -> Self {
        Self {
            name: name.into(),
            category,
        }
    }
}

/// The interaction kinds the executor stages between two agents.
///
/// Catalog lookups are keyed by [`InteractionType::as_str`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionType {
    FriendlyChat,
    CasualMeeting,
    Misunderstanding,
    Argument,
    Conflict,
    GroupDiscussion,
}

impl InteractionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionType::FriendlyChat => "friendly_chat",
            InteractionType::CasualMeeting => "casual_meeting",
            InteractionType::Misunderstanding => "misunderstanding",
            InteractionType::Argument => "argument",
            InteractionType::Conflict => "conflict",
            InteractionType::GroupDiscussion => "group_discussion",
        }
    }

    /// Interaction kinds whose replies must read as negative
    pub fn is_negative(&self) -> bool {
        matches!(
            self,
            InteractionType::Misunderstanding | InteractionType::Argument | InteractionType::Conflict
        )
    }

    pub fn icon(&self) -> &'static str {
        match self {
            InteractionType::FriendlyChat => "💫",
            InteractionType::CasualMeeting => "💭",
            InteractionType::Misunderstanding => "❓",
            InteractionType::Argument => "💥",
            InteractionType::Conflict => "⚡",
            InteractionType::GroupDiscussion => "👥",
        }
    }
}

impl fmt::Display for InteractionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One spoken line in a conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Exchange {
    pub speaker: AgentId,
    pub listener: AgentId,
    pub line: String,
}

impl Exchange {
    pub fn new(speaker: impl Into<String>, listener: impl Into<String>, line: impl Into<String>) -> Self {
        Self {
            speaker: speaker.into(),
            listener: listener.into(),
            line: line.into(),
        }
    }
}

/// Relationship movement between two agents caused by one interaction
#[derive(Debug, Clone, Serialize)]
pub struct RelationshipChange {
    pub agent_a: AgentId,
    pub agent_b: AgentId,
    pub old_strength: i32,
    pub new_strength: i32,
    pub old_level: RelationshipLevel,
    pub new_level: RelationshipLevel,
    pub explanation: String,
}

impl RelationshipChange {
    pub fn delta(&self) -> i32 {
        self.new_strength - self.old_strength
    }

    pub fn level_changed(&self) -> bool {
        self.old_level != self.new_level
    }
}

impl fmt::Display for RelationshipChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ↔ {}: {} {} ({:+})",
            self.agent_a,
            self.agent_b,
            self.new_level.emoji(),
            self.new_level,
            self.delta()
        )?;
        if self.level_changed() {
            write!(f, " 🌟 {} → {}", self.old_level, self.new_level)?;
        }
        Ok(())
    }
}

/// Everything that happened in one staged interaction, ready to display or persist
#[derive(Debug, Clone, Serialize)]
pub struct InteractionRecord {
    pub location: String,
    pub interaction_type: InteractionType,
    pub topic: Option<String>,
    pub lines: Vec<Exchange>,
    pub changes: Vec<RelationshipChange>,
}

impl fmt::Display for InteractionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let title = match self.interaction_type {
            InteractionType::GroupDiscussion => "👥 Group discussion",
            _ => "💬 Conversation",
        };
        writeln!(f, "━━━ {} ━━━", title)?;
        write!(f, "📍 {}", self.location)?;
        if let Some(topic) = &self.topic {
            write!(f, " · about '{}'", topic)?;
        }
        writeln!(f)?;
        for exchange in &self.lines {
            writeln!(f, "  {} → {}: {}", exchange.speaker, exchange.listener, exchange.line)?;
        }
        for change in &self.changes {
            writeln!(f, "  {} {}", self.interaction_type.icon(), change)?;
        }
        Ok(())
    }
}

/// A user-facing chat answer
#[derive(Debug, Clone, Serialize)]
pub struct ChatReply {
    pub agent: AgentId,
    pub text: String,
    /// True when the agent's model did not answer in time and a canned line was used
    pub fallback: bool,
}
