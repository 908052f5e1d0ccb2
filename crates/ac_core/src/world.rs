//! Top-level facade wiring the coordinators together.
//!
//! Everything runs on one cooperative worker: inbound player actions and the
//! periodic [`World::tick`] interleave only at call boundaries, so no
//! coordinator needs interior locking. Hosts call an action, then drain the
//! queued events and deliver them however they transport pushes.

use crate::arena::rating::RatingDirectory;
use crate::arena::{ArenaInfo, MatchCoordinator, MatchRequestOutcome};
use crate::error::Result;
use crate::events::{Envelope, EventQueue};
use crate::ranking::{Category, LeaderboardEntry, LeaderboardPage, RankingHub, Season};
use crate::rewards::{NullRewardSink, RewardSink};
use crate::shard::instance::{InstanceCoordinator, InstanceEndReason, InstanceSession};
use crate::shard::schedule::{InstanceScheduler, ShardSchedule};
use crate::shard::template::TemplateRegistry;
use crate::store::{MemoryPlayerStore, PlayerProfile, PlayerStore};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

/// Per-player clan summary for the read-only query surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClanInfo {
    pub clan: String,
    pub contribution: i64,
    pub clan_rank: Option<u32>,
    pub clan_points: Option<i64>,
}

pub struct World {
    store: MemoryPlayerStore,
    ratings: RatingDirectory,
    arena: MatchCoordinator,
    templates: TemplateRegistry,
    scheduler: InstanceScheduler,
    instances: InstanceCoordinator,
    rankings: RankingHub,
    events: EventQueue,
    rewards: Box<dyn RewardSink>,
    last_daily_reset: NaiveDate,
}

impl World {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self::build(now, InstanceScheduler::new(now), InstanceCoordinator::new())
    }

    /// Deterministic construction for tests and replay tooling.
    pub fn with_seed(now: DateTime<Utc>, seed: u64) -> Self {
        Self::build(
            now,
            InstanceScheduler::with_seed(now, seed),
            InstanceCoordinator::with_seed(seed),
        )
    }

    fn build(
        now: DateTime<Utc>,
        scheduler: InstanceScheduler,
        instances: InstanceCoordinator,
    ) -> Self {
        Self {
            store: MemoryPlayerStore::new(),
            ratings: RatingDirectory::new(),
            arena: MatchCoordinator::new(),
            templates: TemplateRegistry::with_defaults(),
            scheduler,
            instances,
            rankings: RankingHub::new(now),
            events: EventQueue::new(),
            rewards: Box::new(NullRewardSink),
            last_daily_reset: now.date_naive(),
        }
    }

    /// Swap in the host's reward-application collaborator.
    pub fn set_reward_sink(&mut self, sink: Box<dyn RewardSink>) {
        self.rewards = sink;
    }

    // ---- players ----------------------------------------------------------

    /// Returns false when the id is already taken.
    pub fn register_player(
        &mut self,
        id: &str,
        name: &str,
        class: &str,
        level: u32,
        now: DateTime<Utc>,
    ) -> bool {
        if self.store.get(id).is_some() {
            return false;
        }
        self.store.insert(PlayerProfile::new(id, name, class, level, now));
        info!(player = id, "player registered");
        true
    }

    pub fn player(&self, id: &str) -> Option<&PlayerProfile> {
        self.store.get(id)
    }

    /// Quest completions feed the quest leaderboard.
    pub fn record_quest_points(&mut self, player_id: &str, points: i64) -> bool {
        self.store.update(player_id, &mut |p| p.seasonal.quest_points += points)
    }

    /// Clan donations feed the aggregated clan leaderboard.
    pub fn record_clan_contribution(&mut self, player_id: &str, amount: i64) -> bool {
        self.store.update(player_id, &mut |p| p.seasonal.clan_contribution += amount)
    }

    pub fn set_clan(&mut self, player_id: &str, clan: Option<String>) -> bool {
        self.store.update(player_id, &mut |p| p.clan = clan.clone())
    }

    /// Clan summary for one player, with the clan's cached board standing.
    pub fn clan_info(&self, player_id: &str) -> Option<ClanInfo> {
        let profile = self.store.get(player_id)?;
        let clan = profile.clan.clone()?;
        let standing = self.rankings.standing_of(Category::Clan, &clan);
        Some(ClanInfo {
            clan,
            contribution: profile.seasonal.clan_contribution,
            clan_rank: standing.map(|e| e.rank),
            clan_points: standing.map(|e| e.points),
        })
    }

    // ---- arena ------------------------------------------------------------

    pub fn request_match(
        &mut self,
        player_id: &str,
        now: DateTime<Utc>,
    ) -> Result<MatchRequestOutcome> {
        self.arena.request_match(player_id, &mut self.ratings, &self.store, &mut self.events, now)
    }

    pub fn record_damage(
        &mut self,
        match_id: &str,
        player_id: &str,
        amount: u32,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.arena.record_damage(
            match_id,
            player_id,
            amount,
            &mut self.ratings,
            &mut self.store,
            &mut self.events,
            now,
        )
    }

    pub fn arena_info(&self, player_id: &str) -> Option<ArenaInfo> {
        self.arena.arena_info(player_id, &self.ratings)
    }

    // ---- shard echoes -----------------------------------------------------

    pub fn enter_instance(
        &mut self,
        player_id: &str,
        instance_id: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.instances.enter(player_id, instance_id, &self.store, &mut self.events, now)
    }

    pub fn record_instance_combat(
        &mut self,
        instance_id: &str,
        player_id: &str,
        kills: u32,
        damage_dealt: u64,
        damage_taken: u64,
    ) -> Result<()> {
        self.instances.record_combat(instance_id, player_id, kills, damage_dealt, damage_taken)
    }

    /// Objective cleared: resolve the instance now instead of at timeout.
    pub fn complete_instance(&mut self, instance_id: &str, now: DateTime<Utc>) -> Result<()> {
        self.instances.complete(
            instance_id,
            InstanceEndReason::Objective,
            &mut self.store,
            &mut *self.rewards,
            &mut self.events,
            now,
        )
    }

    pub fn active_instances(&self) -> Vec<&InstanceSession> {
        self.instances.active_sessions()
    }

    pub fn shard_schedules(&self) -> impl Iterator<Item = &ShardSchedule> {
        self.scheduler.schedules()
    }

    // ---- rankings ---------------------------------------------------------

    pub fn leaderboard(
        &self,
        category: &str,
        limit: usize,
        offset: usize,
        now: DateTime<Utc>,
    ) -> LeaderboardPage {
        self.rankings.page(category, limit, offset, now)
    }

    pub fn standing_of(&self, category: Category, id: &str) -> Option<&LeaderboardEntry> {
        self.rankings.standing_of(category, id)
    }

    pub fn search_player_rank(&self, player_id: &str) -> BTreeMap<Category, u32> {
        self.rankings.search_player_rank(player_id)
    }

    pub fn season(&self) -> &Season {
        self.rankings.season()
    }

    // ---- lifecycle --------------------------------------------------------

    /// One cooperative heartbeat. Hosts call this on a short cadence (one
    /// second is typical); every subsystem applies its own internal gate.
    pub fn tick(&mut self, now: DateTime<Utc>) {
        let today = now.date_naive();
        if today > self.last_daily_reset {
            self.last_daily_reset = today;
            self.arena.reset_daily();
        }

        self.arena.tick(&mut self.ratings, &mut self.store, &mut self.events, now);
        self.scheduler.tick(&mut self.templates, &mut self.instances, &mut self.events, now);
        self.instances.tick(&mut self.store, &mut *self.rewards, &mut self.events, now);
        self.rankings.tick(
            &mut self.store,
            &mut self.ratings,
            &mut *self.rewards,
            &mut self.events,
            now,
        );
    }

    /// Hand the queued push events to the host transport.
    pub fn drain_events(&mut self) -> Vec<Envelope> {
        self.events.drain()
    }

    pub fn pending_events(&self) -> usize {
        self.events.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::EndReason;
    use crate::events::{Audience, PushEvent};
    use crate::ranking::Category;
    use chrono::Duration;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-08-01T12:00:00Z").unwrap().with_timezone(&Utc)
    }

    fn world_with_players() -> World {
        let mut world = World::with_seed(now(), 42);
        world.register_player("kael", "Kael", "warrior", 20, now());
        world.register_player("mira", "Mira", "mage", 22, now());
        world
    }

    #[test]
    fn test_register_rejects_duplicate_id() {
        let mut world = World::with_seed(now(), 1);
        assert!(world.register_player("kael", "Kael", "warrior", 20, now()));
        assert!(!world.register_player("kael", "Other", "rogue", 5, now()));
        assert_eq!(world.player("kael").unwrap().name, "Kael");
    }

    #[test]
    fn test_duel_end_to_end() {
        let mut world = world_with_players();

        assert!(matches!(
            world.request_match("kael", now()).unwrap(),
            MatchRequestOutcome::Queued { position: 1 }
        ));
        let MatchRequestOutcome::Paired { match_id, opponent_id } =
            world.request_match("mira", now()).unwrap()
        else {
            panic!("expected a pairing");
        };
        assert_eq!(opponent_id, "kael");

        // Mira takes three straight rounds.
        let mut at = now();
        for _ in 0..3 {
            world.record_damage(&match_id, "mira", 100, at).unwrap();
            at += Duration::seconds(1);
        }

        let events = world.drain_events();
        assert!(events.iter().any(|e| matches!(
            &e.event,
            PushEvent::MatchEnded { winner: Some(w), reason: EndReason::Victory, .. }
                if w == "mira"
        )));
        assert_eq!(world.player("mira").unwrap().ascension_points, 15);
        assert_eq!(world.arena_info("mira").unwrap().record.wins, 1);
        assert_eq!(world.arena_info("mira").unwrap().daily_matches_remaining, 9);
    }

    #[test]
    fn test_tick_opens_shard_windows_and_instances() {
        let mut world = world_with_players();
        world.tick(now());

        assert_eq!(world.active_instances().len(), 3);
        assert_eq!(world.shard_schedules().filter(|s| s.active).count(), 3);
        let events = world.drain_events();
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(&e.event, PushEvent::ShardEchoActivated { .. }))
                .count(),
            3
        );
        assert!(events
            .iter()
            .all(|e| !matches!(&e.event, PushEvent::ShardEchoActivated { .. })
                || e.audience == Audience::Everyone));
    }

    #[test]
    fn test_instance_entry_and_completion_through_facade() {
        let mut world = world_with_players();
        world.tick(now());
        let water_id = world
            .active_instances()
            .iter()
            .find(|s| s.template.id == "shard_echo_water")
            .map(|s| s.instance_id.clone())
            .unwrap();

        world.enter_instance("kael", &water_id, now()).unwrap();
        world.complete_instance(&water_id, now() + Duration::seconds(60)).unwrap();

        assert_eq!(world.player("kael").unwrap().seasonal.instance_completions, 1);
        assert!(world.active_instances().iter().all(|s| s.instance_id != water_id));
    }

    #[test]
    fn test_tick_recomputes_leaderboards() {
        let mut world = world_with_players();
        world.record_quest_points("kael", 300);
        world.tick(now());

        let page = world.leaderboard("quest", 10, 0, now());
        assert_eq!(page.entries.len(), 1);
        assert_eq!(page.entries[0].id, "kael");
        assert_eq!(world.standing_of(Category::Quest, "kael").unwrap().rank, 1);
        assert_eq!(world.search_player_rank("kael").get(&Category::Quest), Some(&1));
        // Quest points alone do not put kael on the ascension board.
        assert_eq!(world.player("kael").unwrap().seasonal.rank, None);
    }

    #[test]
    fn test_ascension_rank_requires_earned_points() {
        let mut world = world_with_players();
        world.request_match("kael", now()).unwrap();
        let MatchRequestOutcome::Paired { match_id, .. } =
            world.request_match("mira", now()).unwrap()
        else {
            panic!("expected a pairing");
        };
        let mut at = now();
        for _ in 0..3 {
            world.record_damage(&match_id, "mira", 100, at).unwrap();
            at += Duration::seconds(1);
        }
        world.tick(at);

        // The duel winner earned ascension points and ranks; the loser has
        // none and stays off the board entirely.
        assert_eq!(world.player("mira").unwrap().seasonal.rank, Some(1));
        assert_eq!(world.player("kael").unwrap().seasonal.rank, None);
        let page = world.leaderboard("ascension", 10, 0, at);
        assert_eq!(page.entries.len(), 1);
        assert_eq!(page.entries[0].id, "mira");
    }

    #[test]
    fn test_daily_reset_on_date_boundary() {
        let mut world = world_with_players();
        world.request_match("kael", now()).unwrap();
        world.request_match("mira", now()).unwrap();
        assert_eq!(world.arena_info("kael").unwrap().daily_matches_played, 1);

        // Same day: counters stand.
        world.tick(now() + Duration::hours(2));
        assert_eq!(world.arena_info("kael").unwrap().daily_matches_played, 1);

        // Past midnight UTC they reset.
        world.tick(now() + Duration::hours(13));
        assert_eq!(world.arena_info("kael").unwrap().daily_matches_played, 0);
    }

    #[test]
    fn test_clan_info_reads_cached_board() {
        let mut world = world_with_players();
        world.set_clan("kael", Some("Stormborn".into()));
        world.record_clan_contribution("kael", 450);
        world.tick(now());

        let info = world.clan_info("kael").unwrap();
        assert_eq!(info.clan, "Stormborn");
        assert_eq!(info.contribution, 450);
        assert_eq!(info.clan_rank, Some(1));
        assert_eq!(info.clan_points, Some(450));
        // Mira has no clan.
        assert!(world.clan_info("mira").is_none());
    }

    #[test]
    fn test_season_is_exposed() {
        let world = World::with_seed(now(), 9);
        let season = world.season();
        assert_eq!(season.number, 1);
        assert_eq!(season.name, "Dawn of Aether");
    }
}
