//! Player record store boundary.
//!
//! The world record store is an external collaborator with get/update-by-id
//! semantics. The coordinators only ever see the [`PlayerStore`] trait;
//! [`MemoryPlayerStore`] is the volatile in-process implementation used by
//! the [`World`](crate::world::World) facade and by tests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Counters that reset at season rollover.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeasonalCounters {
    pub instance_completions: u32,
    pub quest_points: i64,
    pub clan_contribution: i64,
    /// Seasonal rank snapshot for the ascension category, refreshed on each
    /// leaderboard recompute.
    pub rank: Option<u32>,
}

/// One player record as the external store exposes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerProfile {
    pub id: String,
    pub name: String,
    pub class: String,
    pub level: u32,
    pub clan: Option<String>,
    pub ascension_points: i64,
    #[serde(default)]
    pub seasonal: SeasonalCounters,
    pub created_at: DateTime<Utc>,
}

impl PlayerProfile {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        class: impl Into<String>,
        level: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            class: class.into(),
            level,
            clan: None,
            ascension_points: 0,
            seasonal: SeasonalCounters::default(),
            created_at: now,
        }
    }
}

/// External key-value record store for player profiles.
pub trait PlayerStore {
    fn get(&self, player_id: &str) -> Option<&PlayerProfile>;

    /// Apply a mutation to one record. Returns false when the id is unknown.
    fn update(&mut self, player_id: &str, apply: &mut dyn FnMut(&mut PlayerProfile)) -> bool;

    /// Snapshot of the live population, ordered by id so that downstream
    /// recomputation is deterministic.
    fn players(&self) -> Vec<&PlayerProfile>;
}

/// In-memory store. State is volatile; a process restart forfeits it.
#[derive(Debug, Clone, Default)]
pub struct MemoryPlayerStore {
    records: HashMap<String, PlayerProfile>,
}

impl MemoryPlayerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, profile: PlayerProfile) {
        self.records.insert(profile.id.clone(), profile);
    }

    pub fn remove(&mut self, player_id: &str) -> Option<PlayerProfile> {
        self.records.remove(player_id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl PlayerStore for MemoryPlayerStore {
    fn get(&self, player_id: &str) -> Option<&PlayerProfile> {
        self.records.get(player_id)
    }

    fn update(&mut self, player_id: &str, apply: &mut dyn FnMut(&mut PlayerProfile)) -> bool {
        match self.records.get_mut(player_id) {
            Some(profile) => {
                apply(profile);
                true
            }
            None => false,
        }
    }

    fn players(&self) -> Vec<&PlayerProfile> {
        let mut all: Vec<&PlayerProfile> = self.records.values().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    #[test]
    fn test_insert_and_get() {
        let mut store = MemoryPlayerStore::new();
        store.insert(PlayerProfile::new("p1", "Kael", "mage", 12, now()));

        assert_eq!(store.get("p1").unwrap().level, 12);
        assert!(store.get("missing").is_none());
    }

    #[test]
    fn test_update_by_id() {
        let mut store = MemoryPlayerStore::new();
        store.insert(PlayerProfile::new("p1", "Kael", "mage", 12, now()));

        let hit = store.update("p1", &mut |p| p.ascension_points += 25);
        assert!(hit);
        assert_eq!(store.get("p1").unwrap().ascension_points, 25);

        assert!(!store.update("missing", &mut |p| p.level += 1));
    }

    #[test]
    fn test_players_snapshot_is_ordered() {
        let mut store = MemoryPlayerStore::new();
        store.insert(PlayerProfile::new("b", "B", "rogue", 1, now()));
        store.insert(PlayerProfile::new("a", "A", "mage", 1, now()));

        let ids: Vec<&str> = store.players().iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }
}
