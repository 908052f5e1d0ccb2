//! Season lifecycle: end-of-season reward distribution and rollover.

use crate::arena::rating::RatingDirectory;
use crate::events::{EventSink, PushEvent};
use crate::rewards::{RewardGrant, RewardSink};
use crate::store::{PlayerStore, SeasonalCounters};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

pub const SEASON_LENGTH_DAYS: i64 = 30;

/// Time between a season ending and the next one starting. Rewards are
/// distributed at the boundary; the rollover happens after the grace.
pub const GRACE_HOURS: i64 = 24;

/// Only the ascension top 100 is paid at the boundary.
pub const REWARD_RANK_CUTOFF: u32 = 100;

const SEASON_NAMES: [&str; 6] = [
    "Dawn of Aether",
    "Clash of Shards",
    "Reign of Embers",
    "Tide of Ruin",
    "Crown of Storms",
    "Veil of Crystal",
];

fn season_name(number: u32) -> String {
    SEASON_NAMES[((number - 1) as usize) % SEASON_NAMES.len()].to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Season {
    pub number: u32,
    pub name: String,
    pub started_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
}

impl Season {
    fn open(number: u32, now: DateTime<Utc>) -> Self {
        Self {
            number,
            name: season_name(number),
            started_at: now,
            ends_at: now + Duration::days(SEASON_LENGTH_DAYS),
        }
    }

    pub fn time_remaining_ms(&self, now: DateTime<Utc>) -> i64 {
        (self.ends_at - now).num_milliseconds().max(0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeasonPhase {
    Active,
    /// Rewards already went out; the next season opens at `next_start`.
    AwaitingRollover { next_start: DateTime<Utc> },
}

/// End-of-season rewards for one final standing on the ascension board.
pub fn tier_rewards(season: u32, rank: u32) -> Vec<RewardGrant> {
    match rank {
        1 => vec![
            RewardGrant::Currency { amount: 100_000 },
            RewardGrant::AscensionPoints { amount: 5_000 },
            RewardGrant::Item { item_id: "seasonal_mount_apex".into() },
            RewardGrant::Title { title: format!("Season {season} Champion") },
        ],
        2..=3 => vec![
            RewardGrant::Currency { amount: 50_000 },
            RewardGrant::AscensionPoints { amount: 3_000 },
            RewardGrant::Item { item_id: "seasonal_weapon_epic".into() },
            RewardGrant::Title { title: format!("Season {season} Contender") },
        ],
        4..=10 => vec![
            RewardGrant::Currency { amount: 25_000 },
            RewardGrant::AscensionPoints { amount: 1_500 },
            RewardGrant::Item { item_id: "seasonal_armor_rare".into() },
        ],
        11..=50 => vec![
            RewardGrant::Currency { amount: 10_000 },
            RewardGrant::AscensionPoints { amount: 800 },
        ],
        51..=100 => vec![
            RewardGrant::Currency { amount: 5_000 },
            RewardGrant::AscensionPoints { amount: 400 },
        ],
        _ => vec![
            RewardGrant::Currency { amount: 1_000 },
            RewardGrant::AscensionPoints { amount: 100 },
        ],
    }
}

/// Owns the current season and its phase transitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonTracker {
    current: Season,
    phase: SeasonPhase,
}

impl SeasonTracker {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self { current: Season::open(1, now), phase: SeasonPhase::Active }
    }

    pub fn current(&self) -> &Season {
        &self.current
    }

    pub fn phase(&self) -> &SeasonPhase {
        &self.phase
    }

    /// True when the current season has run out and the boundary payout has
    /// not fired yet. Callers use this to decide whether to snapshot final
    /// standings before ticking.
    pub fn boundary_due(&self, now: DateTime<Utc>) -> bool {
        matches!(self.phase, SeasonPhase::Active) && now >= self.current.ends_at
    }

    /// Advance the season state machine. `final_standings` is the final
    /// ascension board as (id, rank) pairs; it is only read at the season
    /// boundary. Returns true when a rollover happened, so callers can
    /// invalidate anything derived from season state. The phase guard makes
    /// both transitions one-shot: a boundary crossed twice distributes
    /// rewards once, and a rollover fires once.
    pub fn tick(
        &mut self,
        store: &mut dyn PlayerStore,
        ratings: &mut RatingDirectory,
        rewards: &mut dyn RewardSink,
        events: &mut dyn EventSink,
        final_standings: &[(String, u32)],
        now: DateTime<Utc>,
    ) -> bool {
        match self.phase {
            SeasonPhase::Active if now >= self.current.ends_at => {
                let next_start = self.current.ends_at + Duration::hours(GRACE_HOURS);
                self.distribute(final_standings, rewards, events, next_start);
                self.phase = SeasonPhase::AwaitingRollover { next_start };
                false
            }
            SeasonPhase::AwaitingRollover { next_start } if now >= next_start => {
                self.rollover(store, ratings, events, now);
                true
            }
            _ => false,
        }
    }

    /// Pay out the final ascension standings, top [`REWARD_RANK_CUTOFF`]
    /// only. Standings come from the board itself, never from per-profile
    /// rank snapshots, so a stale snapshot can never earn a payout.
    fn distribute(
        &self,
        final_standings: &[(String, u32)],
        rewards: &mut dyn RewardSink,
        events: &mut dyn EventSink,
        next_season_start: DateTime<Utc>,
    ) {
        let season = self.current.number;
        let recipients: Vec<&(String, u32)> = final_standings
            .iter()
            .filter(|(_, rank)| *rank <= REWARD_RANK_CUTOFF)
            .collect();

        info!(season, recipients = recipients.len(), "season ended, distributing rewards");
        for (player_id, rank) in recipients {
            let grants = tier_rewards(season, *rank);
            rewards.grant(player_id, &grants);
            events.send_to(
                player_id,
                PushEvent::SeasonRewardsReceived {
                    season,
                    rank: *rank,
                    rewards: grants,
                    next_season_start,
                },
            );
        }
    }

    /// Open the next season: seasonal progress, ascension points and arena
    /// ratings all restart from zero.
    fn rollover(
        &mut self,
        store: &mut dyn PlayerStore,
        ratings: &mut RatingDirectory,
        events: &mut dyn EventSink,
        now: DateTime<Utc>,
    ) {
        let ids: Vec<String> = store.players().into_iter().map(|p| p.id.clone()).collect();
        for player_id in ids {
            store.update(&player_id, &mut |p| {
                p.ascension_points = 0;
                p.seasonal = SeasonalCounters::default();
            });
        }
        ratings.reset_for_new_season();

        self.current = Season::open(self.current.number + 1, now);
        self.phase = SeasonPhase::Active;

        info!(season = self.current.number, name = %self.current.name, "season started");
        events.broadcast(PushEvent::SeasonStarted {
            season: self.current.number,
            name: self.current.name.clone(),
            time_remaining_ms: self.current.time_remaining_ms(now),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventQueue;
    use crate::rewards::RecordingRewardSink;
    use crate::store::{MemoryPlayerStore, PlayerProfile};

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-08-01T00:00:00Z").unwrap().with_timezone(&Utc)
    }

    struct Fixture {
        tracker: SeasonTracker,
        store: MemoryPlayerStore,
        ratings: RatingDirectory,
        rewards: RecordingRewardSink,
        events: EventQueue,
        /// Final ascension board handed to the tracker at the boundary.
        standings: Vec<(String, u32)>,
    }

    fn fixture() -> Fixture {
        let mut store = MemoryPlayerStore::new();
        let mut standings = Vec::new();
        for (id, rank) in [("kael", 1), ("mira", 7), ("oren", 100), ("sera", 140)] {
            let mut profile = PlayerProfile::new(id, id.to_uppercase(), "mage", 20, now());
            profile.ascension_points = 1000;
            profile.seasonal.rank = Some(rank);
            profile.seasonal.quest_points = 50;
            store.insert(profile);
            standings.push((id.to_string(), rank));
        }
        Fixture {
            tracker: SeasonTracker::new(now()),
            store,
            ratings: RatingDirectory::new(),
            rewards: RecordingRewardSink::new(),
            events: EventQueue::new(),
            standings,
        }
    }

    impl Fixture {
        fn tick(&mut self, at: DateTime<Utc>) -> bool {
            self.tracker.tick(
                &mut self.store,
                &mut self.ratings,
                &mut self.rewards,
                &mut self.events,
                &self.standings,
                at,
            )
        }
    }

    #[test]
    fn test_reward_tiers() {
        let champion = tier_rewards(3, 1);
        assert!(champion.contains(&RewardGrant::Currency { amount: 100_000 }));
        assert!(champion.contains(&RewardGrant::Title { title: "Season 3 Champion".into() }));

        assert!(tier_rewards(1, 2).contains(&RewardGrant::Currency { amount: 50_000 }));
        assert!(tier_rewards(1, 10).contains(&RewardGrant::AscensionPoints { amount: 1_500 }));
        assert!(tier_rewards(1, 50).contains(&RewardGrant::Currency { amount: 10_000 }));
        assert!(tier_rewards(1, 100).contains(&RewardGrant::Currency { amount: 5_000 }));
        assert!(tier_rewards(1, 101).contains(&RewardGrant::Currency { amount: 1_000 }));
    }

    #[test]
    fn test_season_names_rotate() {
        assert_eq!(season_name(1), "Dawn of Aether");
        assert_eq!(season_name(6), "Veil of Crystal");
        assert_eq!(season_name(7), "Dawn of Aether");
    }

    #[test]
    fn test_boundary_distributes_once() {
        let mut fx = fixture();
        let boundary = now() + Duration::days(SEASON_LENGTH_DAYS);

        assert!(!fx.tick(boundary));
        // sera sits at rank 140, past the payout cutoff.
        assert_eq!(fx.rewards.granted.len(), 3);
        assert!(matches!(fx.tracker.phase(), SeasonPhase::AwaitingRollover { .. }));

        // A second tick inside the grace window pays nothing further.
        assert!(!fx.tick(boundary + Duration::hours(1)));
        assert_eq!(fx.rewards.granted.len(), 3);
    }

    #[test]
    fn test_distribution_matches_rank_tier() {
        let mut fx = fixture();
        fx.tick(now() + Duration::days(SEASON_LENGTH_DAYS));

        assert!(fx
            .rewards
            .grants_for("kael")
            .contains(&&RewardGrant::Currency { amount: 100_000 }));
        assert!(fx
            .rewards
            .grants_for("mira")
            .contains(&&RewardGrant::Currency { amount: 25_000 }));

        let to_kael = fx.events.visible_to("kael");
        assert!(to_kael.iter().any(|e| matches!(
            e,
            PushEvent::SeasonRewardsReceived { season: 1, rank: 1, .. }
        )));
    }

    #[test]
    fn test_payout_stops_at_rank_cutoff() {
        let mut fx = fixture();
        fx.tick(now() + Duration::days(SEASON_LENGTH_DAYS));

        // Rank 100 is still paid, rank 140 is not.
        assert!(fx
            .rewards
            .grants_for("oren")
            .contains(&&RewardGrant::Currency { amount: 5_000 }));
        assert!(fx.rewards.grants_for("sera").is_empty());
        assert!(fx
            .events
            .visible_to("sera")
            .iter()
            .all(|e| !matches!(e, PushEvent::SeasonRewardsReceived { .. })));
    }

    #[test]
    fn test_distribution_ignores_profile_rank_snapshots() {
        // A profile may hold a stale seasonal rank (written on an earlier
        // recompute and never cleared); only the final board decides payout.
        let mut fx = fixture();
        let mut ghost = PlayerProfile::new("ghost", "GHOST", "mage", 20, now());
        ghost.seasonal.rank = Some(2);
        fx.store.insert(ghost);

        fx.tick(now() + Duration::days(SEASON_LENGTH_DAYS));
        assert!(fx.rewards.grants_for("ghost").is_empty());
        assert_eq!(fx.rewards.granted.len(), 3);
    }

    #[test]
    fn test_rollover_after_grace_resets_everything() {
        let mut fx = fixture();
        fx.ratings.ensure("kael", "KAEL");
        fx.ratings.get_mut("kael").unwrap().rating = 2400;

        let boundary = now() + Duration::days(SEASON_LENGTH_DAYS);
        fx.tick(boundary);
        // Still inside the grace window.
        assert!(!fx.tick(boundary + Duration::hours(GRACE_HOURS - 1)));

        let rollover_at = boundary + Duration::hours(GRACE_HOURS);
        assert!(fx.tick(rollover_at));

        let season = fx.tracker.current();
        assert_eq!(season.number, 2);
        assert_eq!(season.name, "Clash of Shards");
        assert_eq!(season.ends_at, rollover_at + Duration::days(SEASON_LENGTH_DAYS));
        assert_eq!(*fx.tracker.phase(), SeasonPhase::Active);

        let kael = fx.store.get("kael").unwrap();
        assert_eq!(kael.ascension_points, 0);
        assert_eq!(kael.seasonal, SeasonalCounters::default());
        assert_eq!(fx.ratings.get("kael").unwrap().rating, 1000);

        assert!(fx.events.broadcasts().iter().any(|e| matches!(
            e,
            PushEvent::SeasonStarted { season: 2, .. }
        )));
    }

    #[test]
    fn test_active_season_does_nothing_before_boundary() {
        let mut fx = fixture();
        assert!(!fx.tick(now() + Duration::days(SEASON_LENGTH_DAYS) - Duration::seconds(1)));
        assert!(fx.rewards.granted.is_empty());
        assert_eq!(*fx.tracker.phase(), SeasonPhase::Active);
    }
}
