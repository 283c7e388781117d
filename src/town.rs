use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::TownError;
use crate::types::{Agent, Location, LocationCategory};

/// Residents and places. Agent state sits behind one lock; locations are fixed
/// once the town is built.
pub struct Town {
    agents: Mutex<BTreeMap<String, Agent>>,
    locations: Vec<Location>,
}

impl Town {
    pub fn new(locations: Vec<Location>, agents: Vec<Agent>) -> Self {
        Self {
            agents: Mutex::new(agents.into_iter().map(|a| (a.name.clone(), a)).collect()),
            locations,
        }
    }

    /// Eight places and nine residents, one per built-in profession
    pub fn sample() -> Self {
        let locations = vec![
            Location::new("Cafe", LocationCategory::Social),
            Location::new("Library", LocationCategory::Social),
            Location::new("Park", LocationCategory::Leisure),
            Location::new("Office", LocationCategory::Work),
            Location::new("Home", LocationCategory::Private),
            Location::new("Hospital", LocationCategory::Work),
            Location::new("Restaurant", LocationCategory::Public),
            Location::new("Repair Shop", LocationCategory::Work),
        ];
        let agents = vec![
            Agent::new("Alex", "programmer", "Office"),
            Agent::new("Emma", "artist", "Park"),
            Agent::new("Sarah", "teacher", "Library"),
            Agent::new("David", "businessman", "Office"),
            Agent::new("Lisa", "student", "Library"),
            Agent::new("Mike", "retired", "Park"),
            Agent::new("John", "doctor", "Hospital"),
            Agent::new("Anna", "chef", "Restaurant"),
            Agent::new("Tom", "mechanic", "Repair Shop"),
        ];
        Self::new(locations, agents)
    }

    fn agents_guard(&self) -> MutexGuard<'_, BTreeMap<String, Agent>> {
        self.agents.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of every agent, ordered by name
    pub fn agents(&self) -> Vec<Agent> {
        self.agents_guard().values().cloned().collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.agents_guard().keys().cloned().collect()
    }

    pub fn agent(&self, name: &str) -> Result<Agent, TownError> {
        self.agents_guard()
            .get(name)
            .cloned()
            .ok_or_else(|| TownError::AgentNotFound(name.to_string()))
    }

    pub fn locations(&self) -> &[Location] {
        &self.locations
    }

    pub fn location(&self, name: &str) -> Result<&Location, TownError> {
        self.locations
            .iter()
            .find(|l| l.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| TownError::LocationNotFound(name.to_string()))
    }

    pub fn category_of(&self, location: &str) -> Option<LocationCategory> {
        self.location(location).ok().map(|l| l.category)
    }

    /// Everyone except `name` at `name`'s location
    pub fn co_located(&self, name: &str) -> Result<Vec<Agent>, TownError> {
        let agents = self.agents_guard();
        let agent = agents.get(name).ok_or_else(|| TownError::AgentNotFound(name.to_string()))?;
        Ok(agents
            .values()
            .filter(|other| other.name != agent.name && other.location == agent.location)
            .cloned()
            .collect())
    }

    /// Moves an agent and returns `(from, to)`
    pub fn move_agent(&self, name: &str, location: &str) -> Result<(String, String), TownError> {
        let target = self.location(location)?.name.clone();
        let mut agents = self.agents_guard();
        let agent = agents.get_mut(name).ok_or_else(|| TownError::AgentNotFound(name.to_string()))?;
        let from = std::mem::replace(&mut agent.location, target.clone());
        Ok((from, target))
    }

    /// Applies `f` to the agent under the lock and returns the updated copy
    pub fn update<F>(&self, name: &str, f: F) -> Result<Agent, TownError>
    where
        F: FnOnce(&mut Agent),
    {
        let mut agents = self.agents_guard();
        let agent = agents.get_mut(name).ok_or_else(|| TownError::AgentNotFound(name.to_string()))?;
        f(agent);
        Ok(agent.clone())
    }

    /// Takes saved runtime state for agents the town already has. Unknown
    /// agents and unknown locations are skipped.
    pub fn restore(&self, saved: Vec<Agent>) -> usize {
        let known: Vec<String> = self.locations.iter().map(|l| l.name.clone()).collect();
        let mut agents = self.agents_guard();
        let mut restored = 0;
        for state in saved {
            let Some(agent) = agents.get_mut(&state.name) else {
                continue;
            };
            if known.contains(&state.location) {
                agent.location = state.location;
            }
            agent.mood = state.mood;
            agent.energy = state.energy.clamp(0, 100);
            agent.last_action = state.last_action;
            restored += 1;
        }
        restored
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Mood;

    #[test]
    fn sample_town_is_consistent() {
        let town = Town::sample();
        assert_eq!(town.agents().len(), 9);
        for agent in town.agents() {
            assert!(town.location(&agent.location).is_ok(), "{} at unknown place", agent.name);
        }
    }

    #[test]
    fn unknown_lookups_are_not_found() {
        let town = Town::sample();
        assert!(matches!(town.agent("Zed"), Err(TownError::AgentNotFound(_))));
        assert!(matches!(town.move_agent("Alex", "Moon"), Err(TownError::LocationNotFound(_))));
        assert!(matches!(town.move_agent("Zed", "Park"), Err(TownError::AgentNotFound(_))));
    }

    #[test]
    fn move_changes_company() {
        let town = Town::sample();
        let names = |agents: Vec<Agent>| agents.into_iter().map(|a| a.name).collect::<Vec<_>>();
        assert_eq!(names(town.co_located("Alex").unwrap()), vec!["David"]);

        let (from, to) = town.move_agent("Alex", "park").unwrap();
        assert_eq!((from.as_str(), to.as_str()), ("Office", "Park"));
        assert_eq!(names(town.co_located("Alex").unwrap()), vec!["Emma", "Mike"]);
        assert!(town.co_located("David").unwrap().is_empty());
    }

    #[test]
    fn restore_skips_unknowns() {
        let town = Town::sample();
        let saved = vec![
            Agent::new("Alex", "programmer", "Cafe").with_energy(12).with_mood(Mood::Tired),
            Agent::new("Ghost", "none", "Cafe"),
            Agent::new("Emma", "artist", "Atlantis"),
        ];
        assert_eq!(town.restore(saved), 2);
        let alex = town.agent("Alex").unwrap();
        assert_eq!((alex.location.as_str(), alex.energy, alex.mood), ("Cafe", 12, Mood::Tired));
        assert_eq!(town.agent("Emma").unwrap().location, "Park");
    }
}
