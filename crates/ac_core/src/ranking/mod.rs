//! Leaderboard aggregation across ranking categories.
//!
//! Boards are recomputed from the player store and the rating directory on a
//! fixed cadence and served from cache in between. Recomputation is a pure
//! function of its inputs: running it twice against unchanged state yields
//! identical boards.

pub mod season;

use crate::arena::rating::{RatingDirectory, Tier};
use crate::events::{CategorySlices, EventSink, PushEvent};
use crate::store::PlayerStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

pub use season::{
    Season, SeasonPhase, SeasonTracker, GRACE_HOURS, REWARD_RANK_CUTOFF, SEASON_LENGTH_DAYS,
};

/// Boards refresh at most this often.
pub const RECOMPUTE_INTERVAL_SECS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Ascension,
    Arena,
    Clan,
    Instance,
    Quest,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Ascension,
        Category::Arena,
        Category::Clan,
        Category::Instance,
        Category::Quest,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Category::Ascension => "ascension",
            Category::Arena => "arena",
            Category::Clan => "clan",
            Category::Instance => "instance",
            Category::Quest => "quest",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Category::ALL.into_iter().find(|c| c.key() == key)
    }

    /// How many entries a board retains after a recompute.
    pub fn cap(&self) -> usize {
        match self {
            Category::Ascension => 1000,
            Category::Arena => 500,
            Category::Clan => 100,
            Category::Instance => 500,
            Category::Quest => 500,
        }
    }
}

/// One ranked row. `rank_change` is reserved for cross-snapshot deltas and
/// is always zero today, so recomputes stay a pure read of current state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub rank: u32,
    pub id: String,
    pub name: String,
    pub points: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<Tier>,
    pub rank_change: i32,
}

/// Full cached board for one category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryView {
    pub category: Category,
    pub season: u32,
    pub updated_at: DateTime<Utc>,
    pub entries: Vec<LeaderboardEntry>,
}

/// Windowed read of a cached board, with the podium and the season clock
/// attached for client headers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardPage {
    pub category: String,
    pub season: u32,
    pub season_time_remaining_ms: i64,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
    pub updated_at: Option<DateTime<Utc>>,
    pub top3: Vec<LeaderboardEntry>,
    pub entries: Vec<LeaderboardEntry>,
}

/// Caches category boards and drives the season lifecycle.
#[derive(Debug)]
pub struct RankingHub {
    seasons: SeasonTracker,
    cached: BTreeMap<Category, CategoryView>,
    last_recompute: Option<DateTime<Utc>>,
}

impl RankingHub {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self { seasons: SeasonTracker::new(now), cached: BTreeMap::new(), last_recompute: None }
    }

    pub fn season(&self) -> &Season {
        self.seasons.current()
    }

    pub fn phase(&self) -> &SeasonPhase {
        self.seasons.phase()
    }

    fn clear_cache(&mut self) {
        self.cached.clear();
        self.last_recompute = None;
    }

    /// Rebuild every category board and broadcast the refreshed slices.
    /// Ascension standing is also written back to each profile's seasonal
    /// rank so other surfaces can read it without a board lookup.
    pub fn recompute_all(
        &mut self,
        store: &mut dyn PlayerStore,
        ratings: &RatingDirectory,
        events: &mut dyn EventSink,
        now: DateTime<Utc>,
    ) {
        self.last_recompute = Some(now);
        let season = self.seasons.current().number;

        let mut slices: BTreeMap<String, CategorySlices> = BTreeMap::new();
        for category in Category::ALL {
            let entries = build_entries(category, store, ratings);
            if category == Category::Ascension {
                let ranks: Vec<(String, u32)> =
                    entries.iter().map(|e| (e.id.clone(), e.rank)).collect();
                for (player_id, rank) in ranks {
                    store.update(&player_id, &mut |p| p.seasonal.rank = Some(rank));
                }
            }
            slices.insert(
                category.key().to_string(),
                CategorySlices {
                    top10: entries.iter().take(10).cloned().collect(),
                    top100: entries.iter().take(100).cloned().collect(),
                    updated_at: now,
                },
            );
            self.cached.insert(
                category,
                CategoryView { category, season, updated_at: now, entries },
            );
        }

        debug!(season, "leaderboards recomputed");
        events.broadcast(PushEvent::LeaderboardsUpdated { season, categories: slices });
    }

    pub fn view(&self, category: Category) -> Option<&CategoryView> {
        self.cached.get(&category)
    }

    /// Windowed read of a board by category key. Unknown keys and
    /// not-yet-computed boards read as empty.
    pub fn page(
        &self,
        category_key: &str,
        limit: usize,
        offset: usize,
        now: DateTime<Utc>,
    ) -> LeaderboardPage {
        let limit = limit.clamp(1, 100);
        let season = self.seasons.current();
        let view = Category::from_key(category_key).and_then(|c| self.cached.get(&c));

        match view {
            Some(view) => LeaderboardPage {
                category: category_key.to_string(),
                season: view.season,
                season_time_remaining_ms: season.time_remaining_ms(now),
                total: view.entries.len(),
                limit,
                offset,
                updated_at: Some(view.updated_at),
                top3: view.entries.iter().take(3).cloned().collect(),
                entries: view.entries.iter().skip(offset).take(limit).cloned().collect(),
            },
            None => LeaderboardPage {
                category: category_key.to_string(),
                season: season.number,
                season_time_remaining_ms: season.time_remaining_ms(now),
                total: 0,
                limit,
                offset,
                updated_at: None,
                top3: Vec::new(),
                entries: Vec::new(),
            },
        }
    }

    /// Find one player's row on a cached board.
    pub fn standing_of(&self, category: Category, id: &str) -> Option<&LeaderboardEntry> {
        self.cached.get(&category)?.entries.iter().find(|e| e.id == id)
    }

    /// Every category rank one id currently holds, over the cached views.
    /// Ids absent from a board simply have no entry for that category.
    pub fn search_player_rank(&self, id: &str) -> BTreeMap<Category, u32> {
        Category::ALL
            .into_iter()
            .filter_map(|c| self.standing_of(c, id).map(|e| (c, e.rank)))
            .collect()
    }

    /// Final ascension standings for the closing season, read from the
    /// cached board. Payout must come from the board the players saw, not
    /// from per-profile rank snapshots, which can be stale for anyone the
    /// last recompute did not touch.
    fn ascension_top(&self, limit: usize) -> Vec<(String, u32)> {
        self.cached
            .get(&Category::Ascension)
            .map(|view| view.entries.iter().take(limit).map(|e| (e.id.clone(), e.rank)).collect())
            .unwrap_or_default()
    }

    /// Season bookkeeping plus the periodic recompute. Order matters: a
    /// rollover resets the inputs, so the recompute that follows it must see
    /// the reset state.
    pub fn tick(
        &mut self,
        store: &mut dyn PlayerStore,
        ratings: &mut RatingDirectory,
        rewards: &mut dyn crate::rewards::RewardSink,
        events: &mut dyn EventSink,
        now: DateTime<Utc>,
    ) {
        let final_standings = if self.seasons.boundary_due(now) {
            self.ascension_top(REWARD_RANK_CUTOFF as usize)
        } else {
            Vec::new()
        };
        if self.seasons.tick(store, ratings, rewards, events, &final_standings, now) {
            self.clear_cache();
        }

        let due = match self.last_recompute {
            Some(last) => (now - last).num_seconds() >= RECOMPUTE_INTERVAL_SECS,
            None => true,
        };
        if due {
            self.recompute_all(store, ratings, events, now);
        }
    }
}

/// Assemble one category's board: collect, sort by points descending with id
/// as the tie-break, cap, then stamp 1-based ranks.
fn build_entries(
    category: Category,
    store: &dyn PlayerStore,
    ratings: &RatingDirectory,
) -> Vec<LeaderboardEntry> {
    let mut rows: Vec<LeaderboardEntry> = match category {
        Category::Ascension => store
            .players()
            .into_iter()
            .filter(|p| p.ascension_points > 0)
            .map(|p| row(&p.id, &p.name, p.ascension_points, None))
            .collect(),
        Category::Arena => ratings
            .standings()
            .into_iter()
            .filter(|r| r.wins > 0)
            .map(|r| row(&r.player_id, &r.name, i64::from(r.rating), Some(r.tier)))
            .collect(),
        Category::Clan => {
            let mut by_clan: BTreeMap<String, i64> = BTreeMap::new();
            for profile in store.players() {
                if let Some(clan) = &profile.clan {
                    *by_clan.entry(clan.clone()).or_default() +=
                        profile.seasonal.clan_contribution;
                }
            }
            by_clan.into_iter().map(|(clan, points)| row(&clan, &clan, points, None)).collect()
        }
        Category::Instance => store
            .players()
            .into_iter()
            .filter(|p| p.seasonal.instance_completions > 0)
            .map(|p| row(&p.id, &p.name, i64::from(p.seasonal.instance_completions), None))
            .collect(),
        Category::Quest => store
            .players()
            .into_iter()
            .filter(|p| p.seasonal.quest_points > 0)
            .map(|p| row(&p.id, &p.name, p.seasonal.quest_points, None))
            .collect(),
    };

    rows.sort_by(|a, b| b.points.cmp(&a.points).then_with(|| a.id.cmp(&b.id)));
    rows.truncate(category.cap());
    for (idx, entry) in rows.iter_mut().enumerate() {
        entry.rank = idx as u32 + 1;
    }
    rows
}

fn row(id: &str, name: &str, points: i64, tier: Option<Tier>) -> LeaderboardEntry {
    LeaderboardEntry {
        rank: 0,
        id: id.to_string(),
        name: name.to_string(),
        points,
        tier,
        rank_change: 0,
    }
}
