//! Skill ratings, tiers and the per-player rating directory.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Every record starts here at registration and after a season reset.
pub const BASE_RATING: i32 = 1000;

/// Named rating bracket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Novice,
    Adept,
    Warrior,
    Champion,
    Legendary,
    Apex,
}

impl Tier {
    pub fn from_rating(rating: i32) -> Self {
        match rating {
            r if r >= 5000 => Tier::Apex,
            r if r >= 4000 => Tier::Legendary,
            r if r >= 3000 => Tier::Champion,
            r if r >= 2000 => Tier::Warrior,
            r if r >= 1000 => Tier::Adept,
            _ => Tier::Novice,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Tier::Novice => "novice",
            Tier::Adept => "adept",
            Tier::Warrior => "warrior",
            Tier::Champion => "champion",
            Tier::Legendary => "legendary",
            Tier::Apex => "apex",
        }
    }
}

/// Per-player match outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Win,
    Loss,
    Draw,
}

/// One skill-rating record. Mutated only by the match coordinator on match
/// resolution; lives for the process lifetime and resets at season rollover.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingRecord {
    pub player_id: String,
    pub name: String,
    pub rating: i32,
    pub wins: u32,
    pub losses: u32,
    pub draws: u32,
    pub streak: u32,
    pub best_streak: u32,
    pub last_match: Option<DateTime<Utc>>,
    pub tier: Tier,
}

impl RatingRecord {
    pub fn new(player_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            player_id: player_id.into(),
            name: name.into(),
            rating: BASE_RATING,
            wins: 0,
            losses: 0,
            draws: 0,
            streak: 0,
            best_streak: 0,
            last_match: None,
            tier: Tier::from_rating(BASE_RATING),
        }
    }

    /// Fold a resolved match into the record: counters, streaks, rating and
    /// the derived tier move together.
    pub fn apply(&mut self, outcome: Outcome, points: i32, now: DateTime<Utc>) {
        match outcome {
            Outcome::Win => {
                self.wins += 1;
                self.streak += 1;
                if self.streak > self.best_streak {
                    self.best_streak = self.streak;
                }
            }
            Outcome::Loss => {
                self.losses += 1;
                self.streak = 0;
            }
            Outcome::Draw => {
                self.draws += 1;
            }
        }
        // No enforced rating floor or ceiling.
        self.rating += points;
        self.tier = Tier::from_rating(self.rating);
        self.last_match = Some(now);
    }
}

/// Points for one side of a resolved match.
///
/// Win +15 / loss -5, draw +5 flat. Facing an opponent rated more than 100
/// above adds +10 to a win and +5 to a loss. Win streaks entering the match
/// stack bonuses at 3 / 5 / 10. Losses never cost more than 10 points.
pub fn points_for(outcome: Outcome, player: &RatingRecord, opponent: &RatingRecord) -> i32 {
    if outcome == Outcome::Draw {
        return 5;
    }

    let won = outcome == Outcome::Win;
    let mut points = if won { 15 } else { -5 };

    if opponent.rating > player.rating + 100 {
        points += if won { 10 } else { 5 };
    }

    if won && player.streak > 0 {
        if player.streak >= 3 {
            points += 5;
        }
        if player.streak >= 5 {
            points += 10;
        }
        if player.streak >= 10 {
            points += 20;
        }
    }

    if !won && points < -10 {
        points = -10;
    }

    points
}

/// Holds one [`RatingRecord`] per player.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RatingDirectory {
    records: HashMap<String, RatingRecord>,
}

impl RatingDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fresh record unless one already exists.
    pub fn ensure(&mut self, player_id: &str, name: &str) -> &RatingRecord {
        self.records
            .entry(player_id.to_string())
            .or_insert_with(|| RatingRecord::new(player_id, name))
    }

    pub fn get(&self, player_id: &str) -> Option<&RatingRecord> {
        self.records.get(player_id)
    }

    pub fn get_mut(&mut self, player_id: &str) -> Option<&mut RatingRecord> {
        self.records.get_mut(player_id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records ordered by rating (descending), ties broken by id so that
    /// repeated reads produce identical output.
    pub fn standings(&self) -> Vec<&RatingRecord> {
        let mut all: Vec<&RatingRecord> = self.records.values().collect();
        all.sort_by(|a, b| b.rating.cmp(&a.rating).then_with(|| a.player_id.cmp(&b.player_id)));
        all
    }

    /// 1-based rank by rating, or None when unranked.
    pub fn rank_of(&self, player_id: &str) -> Option<u32> {
        self.standings()
            .iter()
            .position(|r| r.player_id == player_id)
            .map(|idx| idx as u32 + 1)
    }

    /// Season rollover: every record restarts from the base rating with
    /// zeroed counters, keeping only identity.
    pub fn reset_for_new_season(&mut self) {
        for record in self.records.values_mut() {
            *record = RatingRecord::new(record.player_id.clone(), record.name.clone());
        }
    }
}
